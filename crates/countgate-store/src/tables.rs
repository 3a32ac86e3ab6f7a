//! redb table definitions for the embedded store.

use redb::TableDefinition;

/// Counter values keyed by the caller's key, stored as decimal strings.
pub const COUNTERS: TableDefinition<&str, &str> = TableDefinition::new("counters");
