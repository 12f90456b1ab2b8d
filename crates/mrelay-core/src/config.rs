use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

/// Pacing and heuristics for the relay loops.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelayTuning {
    /// Sleep after every relay attempt during backfill.
    pub backfill_delay: Duration,
    /// Sleep after every relay attempt inside a tail delta.
    pub tail_item_delay: Duration,
    pub poll_interval: Duration,
    /// Consecutive gaps that end a backfill early. 0 disables the breaker.
    pub max_consecutive_gaps: u32,
    /// Emit a progress event on positions divisible by this.
    pub progress_every: i64,
    /// How many recent messages feed the progress estimate.
    pub estimate_limit: usize,
    /// Persist the tail checkpoint after every position instead of once per cycle.
    pub checkpoint_every_message: bool,
}

impl Default for RelayTuning {
    fn default() -> Self {
        Self {
            backfill_delay: Duration::from_secs(5),
            tail_item_delay: Duration::from_secs(2),
            poll_interval: Duration::from_secs(10),
            max_consecutive_gaps: 100,
            progress_every: 5,
            estimate_limit: 1000,
            checkpoint_every_message: false,
        }
    }
}

/// Typed configuration, loaded from the environment (and `.env` if present).
#[derive(Clone, Debug)]
pub struct Config {
    // Operator front-end
    pub bot_token: String,
    pub allowed_users: Vec<i64>,

    // Destination
    pub target_channel: i64,

    // Transport gateway
    pub gateway_url: String,
    pub gateway_token: Option<String>,
    pub gateway_timeout: Duration,
    pub api_id: Option<i64>,
    pub api_hash: Option<String>,
    pub session_string: Option<String>,

    // Liveness
    pub port: u16,

    // Persistence
    pub checkpoint_file: PathBuf,

    pub tuning: RelayTuning,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let bot_token = env_str("BOT_TOKEN").unwrap_or_default();
        if bot_token.trim().is_empty() {
            return Err(Error::Config(
                "BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        // OWNER_ID is the single-operator form; ALLOWED_USERS extends it.
        let mut allowed_users = parse_csv_i64(env_str("OWNER_ID"));
        for id in parse_csv_i64(env_str("ALLOWED_USERS")) {
            if !allowed_users.contains(&id) {
                allowed_users.push(id);
            }
        }
        if allowed_users.is_empty() {
            return Err(Error::Config(
                "OWNER_ID or ALLOWED_USERS environment variable is required".to_string(),
            ));
        }

        let target_channel = env_i64("TARGET_CHANNEL").ok_or_else(|| {
            Error::Config("TARGET_CHANNEL environment variable is required".to_string())
        })?;

        let gateway_url = env_str("GATEWAY_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| "http://127.0.0.1:8081".to_string());
        let gateway_token = env_str("GATEWAY_TOKEN").and_then(non_empty);
        let gateway_timeout = Duration::from_secs(env_u64("GATEWAY_TIMEOUT_SECS").unwrap_or(60));
        let api_id = env_i64("API_ID");
        let api_hash = env_str("API_HASH").and_then(non_empty);
        let session_string = env_str("SESSION_STRING").and_then(non_empty);

        let port = env_str("PORT")
            .and_then(|s| s.trim().parse::<u16>().ok())
            .unwrap_or(8000);

        let checkpoint_file = env_path("CHECKPOINT_FILE")
            .unwrap_or_else(|| PathBuf::from("monitored_channels.json"));

        let defaults = RelayTuning::default();
        let tuning = RelayTuning {
            backfill_delay: env_secs("BACKFILL_DELAY_SECS").unwrap_or(defaults.backfill_delay),
            tail_item_delay: env_secs("TAIL_ITEM_DELAY_SECS").unwrap_or(defaults.tail_item_delay),
            poll_interval: env_secs("POLL_INTERVAL_SECS").unwrap_or(defaults.poll_interval),
            max_consecutive_gaps: env_u32("MAX_CONSECUTIVE_GAPS")
                .unwrap_or(defaults.max_consecutive_gaps),
            progress_every: env_i64("PROGRESS_EVERY")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.progress_every),
            estimate_limit: env_usize("ESTIMATE_LIMIT").unwrap_or(defaults.estimate_limit),
            checkpoint_every_message: env_bool("CHECKPOINT_EVERY_MESSAGE")
                .unwrap_or(defaults.checkpoint_every_message),
        };

        Ok(Self {
            bot_token,
            allowed_users,
            target_channel,
            gateway_url,
            gateway_token,
            gateway_timeout,
            api_id,
            api_hash,
            session_string,
            port,
            checkpoint_file,
            tuning,
        })
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, strip_quotes(v.trim()));
    }
}

fn strip_quotes(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return &val[1..val.len() - 1];
    }
    val
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| parse_bool(&s))
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_i64(key: &str) -> Option<i64> {
    env_str(key).and_then(|s| s.trim().parse::<i64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_secs(key: &str) -> Option<Duration> {
    env_u64(key).map(Duration::from_secs)
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_ids_skip_garbage() {
        assert_eq!(
            parse_csv_i64(Some(" 1, x,,-100200 ".to_string())),
            vec![1, -100200]
        );
        assert!(parse_csv_i64(None).is_empty());
    }

    #[test]
    fn quotes_are_stripped_from_dotenv_values() {
        assert_eq!(strip_quotes("\"abc\""), "abc");
        assert_eq!(strip_quotes("'abc'"), "abc");
        assert_eq!(strip_quotes("\"abc"), "\"abc");
    }

    #[test]
    fn bool_parsing_accepts_common_truthy_values() {
        for v in ["1", "true", "YES", " on "] {
            assert!(parse_bool(v));
        }
        assert!(!parse_bool("off"));
    }

    #[test]
    fn default_tuning_matches_documented_constants() {
        let t = RelayTuning::default();
        assert_eq!(t.backfill_delay, Duration::from_secs(5));
        assert_eq!(t.tail_item_delay, Duration::from_secs(2));
        assert_eq!(t.poll_interval, Duration::from_secs(10));
        assert_eq!(t.max_consecutive_gaps, 100);
        assert_eq!(t.progress_every, 5);
    }
}
