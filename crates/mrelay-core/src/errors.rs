use std::time::Duration;

/// Core error type for the relay.
///
/// Transport adapters map their failures into this type. `RateLimited` is the
/// one variant the engine treats specially: it suspends and retries instead of
/// counting a skip.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("rate limited, retry after {}s", .0.as_secs())]
    RateLimited(Duration),

    #[error("invalid link: {0}")]
    InvalidLink(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
