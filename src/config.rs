use serde::{Deserialize, Serialize};

use crate::limits::{MAX_CASCADE_DEPTH, MAX_RECORDS_PER_GROUP};
use crate::model::{MINUTE_MS, Ms};

/// Tunables for chain maintenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Distance between a predecessor's `date_to` and its successor's `date_from`.
    pub gap_ms: Ms,
    pub max_records_per_group: usize,
    /// Saves nested deeper than this fail with `LimitExceeded`.
    pub max_cascade_depth: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            gap_ms: MINUTE_MS,
            max_records_per_group: MAX_RECORDS_PER_GROUP,
            max_cascade_depth: MAX_CASCADE_DEPTH,
        }
    }
}

impl ChainConfig {
    /// Defaults overridden by `CHAINKEEP_GAP_MS`,
    /// `CHAINKEEP_MAX_RECORDS_PER_GROUP` and `CHAINKEEP_MAX_CASCADE_DEPTH`.
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let gap_ms: Ms = lookup("CHAINKEEP_GAP_MS")
            .and_then(|s| s.parse().ok())
            .filter(|gap: &Ms| *gap >= 0)
            .unwrap_or(defaults.gap_ms);
        let max_records_per_group: usize = lookup("CHAINKEEP_MAX_RECORDS_PER_GROUP")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_records_per_group);
        let max_cascade_depth: usize = lookup("CHAINKEEP_MAX_CASCADE_DEPTH")
            .and_then(|s| s.parse().ok())
            .filter(|depth: &usize| *depth > 0)
            .unwrap_or(defaults.max_cascade_depth);
        Self {
            gap_ms,
            max_records_per_group,
            max_cascade_depth,
        }
    }
}
