use crate::model::Ms;

/// 1970-01-01T00:00:00Z. Negative instants are rejected.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;

/// 9999-12-31T23:59:59.999Z.
pub const MAX_VALID_TIMESTAMP_MS: Ms = 253_402_300_799_999;

/// Default cap on persisted components per group.
pub const MAX_RECORDS_PER_GROUP: usize = 10_000;

/// Default cap on nested saves one operation may run. Every predecessor
/// closed by a save can close its own predecessor in turn, one async frame
/// per level.
pub const MAX_CASCADE_DEPTH: usize = 64;
