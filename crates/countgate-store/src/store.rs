//! The store interface consumed by the gateway.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use crate::error::StoreResult;

/// Boxed future alias for store operation results.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// A remote (or embedded) key-value store with atomic counters.
///
/// Implementations must be safe to share across many in-flight requests;
/// the gateway holds one `Arc<dyn KvStore>` and never locks around it.
pub trait KvStore: Send + Sync {
    /// Raw value for `key`, or `None` when absent.
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

    /// Unconditionally overwrite `key`.
    fn set<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a, ()>;

    /// Atomically add `delta`, creating the key at `delta` if absent.
    fn incr_by<'a>(&'a self, key: &'a str, delta: i64) -> StoreFuture<'a, i64>;

    /// Atomically subtract `delta`, creating the key at `-delta` if absent.
    fn decr_by<'a>(&'a self, key: &'a str, delta: i64) -> StoreFuture<'a, i64>;

    /// Remove `key`. Returns true if it existed.
    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool>;

    fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool>;

    /// Number of keys in the store. Potentially expensive; use sparingly.
    fn dbsize(&self) -> StoreFuture<'_, u64>;

    /// Server metadata, optionally restricted to one section (e.g. "memory").
    fn info<'a>(&'a self, section: Option<&'a str>) -> StoreFuture<'a, ServerInfo>;

    /// Lightweight liveness probe.
    fn ping(&self) -> StoreFuture<'_, ()>;

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;
}

/// Flat `field -> value` view of server metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerInfo {
    fields: BTreeMap<String, String>,
}

impl ServerInfo {
    /// Parse the text reply of a Redis `INFO` command.
    pub fn parse(raw: &str) -> Self {
        let fields = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once(':'))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self { fields }
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl ToString) {
        self.fields.insert(field.into(), value.to_string());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn version(&self) -> Option<&str> {
        self.get(fields::VERSION)
            .or_else(|| self.get(fields::EMBEDDED_VERSION))
    }

    pub fn connected_clients(&self) -> Option<u64> {
        self.get(fields::CONNECTED_CLIENTS)?.parse().ok()
    }

    pub fn used_memory_human(&self) -> Option<&str> {
        self.get(fields::USED_MEMORY_HUMAN)
    }

    pub fn total_commands_processed(&self) -> Option<u64> {
        self.get(fields::TOTAL_COMMANDS_PROCESSED)?
            .parse()
            .ok()
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn into_fields(self) -> BTreeMap<String, String> {
        self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Field names shared by every backend's `INFO` output.
pub mod fields {
    pub const VERSION: &str = "redis_version";
    pub const EMBEDDED_VERSION: &str = "embedded_version";
    pub const CONNECTED_CLIENTS: &str = "connected_clients";
    pub const USED_MEMORY: &str = "used_memory";
    pub const USED_MEMORY_HUMAN: &str = "used_memory_human";
    pub const TOTAL_COMMANDS_PROCESSED: &str = "total_commands_processed";
    pub const KEYS: &str = "keys";
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "# Server\r\n\
redis_version:7.2.4\r\n\
redis_mode:standalone\r\n\
\r\n\
# Clients\r\n\
connected_clients:3\r\n\
\r\n\
# Memory\r\n\
used_memory:1048576\r\n\
used_memory_human:1.00M\r\n\
\r\n\
# Stats\r\n\
total_commands_processed:12345\r\n";

    #[test]
    fn parse_info_reply() {
        let info = ServerInfo::parse(SAMPLE);
        assert_eq!(info.version(), Some("7.2.4"));
        assert_eq!(info.connected_clients(), Some(3));
        assert_eq!(info.used_memory_human(), Some("1.00M"));
        assert_eq!(info.total_commands_processed(), Some(12345));
        assert_eq!(info.get("redis_mode"), Some("standalone"));
    }

    #[test]
    fn parse_skips_headers_and_blank_lines() {
        let info = ServerInfo::parse(SAMPLE);
        assert!(info.fields().keys().all(|k| !k.starts_with('#')));
        assert_eq!(info.fields().len(), 6);
    }

    #[test]
    fn values_may_contain_colons() {
        let info = ServerInfo::parse("executable:/usr/bin/redis-server\nconfig_file:C:\\redis.conf\n");
        assert_eq!(info.get("config_file"), Some("C:\\redis.conf"));
    }

    #[test]
    fn missing_fields_are_none() {
        let info = ServerInfo::default();
        assert!(info.is_empty());
        assert_eq!(info.version(), None);
        assert_eq!(info.connected_clients(), None);
        assert_eq!(info.total_commands_processed(), None);
    }

    #[test]
    fn embedded_version_is_a_fallback() {
        let mut info = ServerInfo::default();
        info.insert("embedded_version", "redb 3");
        assert_eq!(info.version(), Some("redb 3"));
    }
}
