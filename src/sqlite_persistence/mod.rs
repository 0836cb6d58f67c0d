mod versioned_schema;

pub use versioned_schema::*;

/// Offset added to every schema version stored in `PRAGMA user_version`, so a
/// database that was never touched by this crate (user_version 0) is never
/// mistaken for schema version 0.
pub const BASE_DB_VERSION: usize = 1000;
