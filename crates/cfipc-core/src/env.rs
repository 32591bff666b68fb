//! Environment variable helpers
//!
//! Used by `IpcConfig::from_env` and the logging setup.
//!
//! ```ignore
//! use cfipc_core::env::{env_get, env_get_str};
//!
//! let timeout_ms: u64 = env_get("CFIPC_CALL_TIMEOUT_MS", 120_000);
//! let share_path = env_get_str("CFIPC_SHARE_PATH", "/tmp");
//! ```

use std::str::FromStr;
use std::time::Duration;

/// Parse `key` as `T`, falling back to `default` when unset or unparsable.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Boolean flag: "1", "true", "yes", "on" (any case) are true.
/// Any other value is false; unset returns `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// String value or `default`. Empty values count as unset.
#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(val) if !val.is_empty() => val,
        _ => default.to_string(),
    }
}

/// Millisecond duration or `default_ms`.
#[inline]
pub fn env_get_millis(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_get(key, default_ms))
}
