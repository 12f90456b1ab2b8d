//! Core of the media relay: eligibility rules, backfill and tail loops,
//! checkpoint persistence and run control.
//!
//! Transports (source channel reader, destination sender, operator chat) sit
//! behind ports implemented in the adapter crates.

pub mod backfill;
pub mod checkpoint;
pub mod classifier;
pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod formatting;
pub mod intake;
pub mod links;
pub mod logging;
pub mod messaging;
pub mod ports;
pub mod progress;
pub mod registry;
pub mod relay;
pub mod security;
pub mod status;
pub mod tail;
pub mod utils;

#[cfg(test)]
mod testing;

pub use errors::{Error, Result};
