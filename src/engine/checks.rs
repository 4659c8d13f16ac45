use crate::config::ChainConfig;
use crate::limits::*;
use crate::model::*;

use super::EngineError;

fn in_range(t: Ms) -> bool {
    (MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS).contains(&t)
}

pub(crate) fn validate_record(record: &IntervalRecord) -> Result<(), EngineError> {
    if !in_range(record.date_from) || record.date_to.is_some_and(|t| !in_range(t)) {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    Ok(())
}

/// A new component must fit under the per-group cap.
pub(crate) fn check_group_capacity(chain_len: usize, config: &ChainConfig) -> Result<(), EngineError> {
    if chain_len >= config.max_records_per_group {
        return Err(EngineError::LimitExceeded("too many components in group"));
    }
    Ok(())
}

/// Nested saves past the configured depth are refused.
pub(crate) fn check_cascade_depth(depth: usize, config: &ChainConfig) -> Result<(), EngineError> {
    if depth > config.max_cascade_depth {
        return Err(EngineError::LimitExceeded("neighbour cascade too deep"));
    }
    Ok(())
}
