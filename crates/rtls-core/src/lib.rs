pub mod ingest_contracts;
pub mod registry_contracts;

use chrono::Duration;
use serde::{Deserialize, Deserializer};

pub const DEFAULT_STALE_SECONDS: i64 = 5;
pub const DEFAULT_HYSTERESIS_DB: i32 = 8;
pub const DEFAULT_DWELL_SECONDS: i64 = 2;

/// Process-wide thresholds of the location resolver. There is no per-tag override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Maximum age of a stored sighting that still counts as live.
    pub stale_window: Duration,
    /// Minimum advantage (dB) a challenger needs over the incumbent reader.
    pub hysteresis_db: i32,
    /// Minimum time a challenger must stay the pending candidate before a switch commits.
    pub dwell: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            stale_window: Duration::seconds(DEFAULT_STALE_SECONDS),
            hysteresis_db: DEFAULT_HYSTERESIS_DB,
            dwell: Duration::seconds(DEFAULT_DWELL_SECONDS),
        }
    }
}

impl ResolverConfig {
    pub fn from_seconds(stale_seconds: u64, hysteresis_db: i32, dwell_seconds: u64) -> Self {
        Self {
            stale_window: Duration::seconds(clamp_seconds(stale_seconds)),
            hysteresis_db,
            dwell: Duration::seconds(clamp_seconds(dwell_seconds)),
        }
    }
}

fn clamp_seconds(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX).min(i64::MAX / 1_000)
}

/// Deserialize an identifier that can be either a string or a number into a String
pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let val: serde_json::Value = serde_json::Value::deserialize(deserializer)?;
    match val {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        _ => Err(serde::de::Error::custom(
            "expected string or number for identifier",
        )),
    }
}
