//! Counter gateway: validated counter operations over the shared store.
//!
//! Each operation validates its input before touching the store, issues at
//! most the store calls it needs, and returns a typed result. Nothing here
//! knows about HTTP; the handlers own the transport mapping.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use countgate_core::{Amount, Key, PAGE_HITS_KEY, StoredValue, parse_counter};
use countgate_health::{HealthChecker, HealthReport};
use countgate_store::KvStore;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{GatewayError, GatewayResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyValue {
    pub key: String,
    pub value: StoredValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetOutcome {
    pub key: String,
    pub value: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<StoredValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyInfo {
    pub key: String,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<StoredValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Deleted {
    pub key: String,
    pub deleted: bool,
}

/// Store-reported metadata included in the status report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreStats {
    pub backend: &'static str,
    pub version: Option<String>,
    pub connected_clients: Option<u64>,
    pub used_memory: Option<String>,
    pub commands_processed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Status {
    pub uptime_seconds: u64,
    pub uptime: String,
    pub page_hits: StoredValue,
    pub total_keys: u64,
    pub store: StoreStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryStatus {
    pub used_memory: BTreeMap<String, String>,
}

/// The counter gateway. One instance is shared by every request.
pub struct Gateway {
    store: Arc<dyn KvStore>,
    health: HealthChecker,
    started_at: Instant,
}

impl Gateway {
    pub fn new(store: Arc<dyn KvStore>, health_timeout: Duration) -> Self {
        let health = HealthChecker::new(Arc::clone(&store), health_timeout);
        Self {
            store,
            health,
            started_at: Instant::now(),
        }
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub async fn get_value(&self, key: &str) -> GatewayResult<KeyValue> {
        let key = Key::parse(key)?;
        let raw = self
            .store
            .get(key.as_str())
            .await
            .map_err(|e| GatewayError::from_store(Some(key.as_str()), e))?;
        match raw {
            Some(raw) => Ok(KeyValue {
                key: key.to_string(),
                value: StoredValue::from_raw(raw),
            }),
            None => Err(GatewayError::NotFound {
                key: key.to_string(),
            }),
        }
    }

    /// Overwrite `key` with an integer. The prior value is read best-effort
    /// and only echoed back.
    pub async fn set_value(&self, key: &str, value: Option<&str>) -> GatewayResult<SetOutcome> {
        let key = Key::parse(key)?;
        let value = parse_counter(value)?;

        let old_value = match self.store.get(key.as_str()).await {
            Ok(old) => old.map(StoredValue::from_raw),
            Err(e) => {
                warn!(%key, error = %e, "could not read prior value");
                None
            }
        };

        self.store
            .set(key.as_str(), &value.to_string())
            .await
            .map_err(|e| GatewayError::from_store(Some(key.as_str()), e))?;
        debug!(%key, value, "value set");

        Ok(SetOutcome {
            key: key.to_string(),
            value,
            old_value,
        })
    }

    pub async fn increment_value(&self, key: &str, amount: Option<&str>) -> GatewayResult<KeyValue> {
        let key = Key::parse(key)?;
        let amount = Amount::parse(amount)?;
        let value = self
            .store
            .incr_by(key.as_str(), amount.get())
            .await
            .map_err(|e| GatewayError::from_store(Some(key.as_str()), e))?;
        debug!(%key, amount = amount.get(), value, "value incremented");
        Ok(KeyValue {
            key: key.to_string(),
            value: value.into(),
        })
    }

    pub async fn decrement_value(&self, key: &str, amount: Option<&str>) -> GatewayResult<KeyValue> {
        let key = Key::parse(key)?;
        let amount = Amount::parse(amount)?;
        let value = self
            .store
            .decr_by(key.as_str(), amount.get())
            .await
            .map_err(|e| GatewayError::from_store(Some(key.as_str()), e))?;
        debug!(%key, amount = amount.get(), value, "value decremented");
        Ok(KeyValue {
            key: key.to_string(),
            value: value.into(),
        })
    }

    pub async fn delete_key(&self, key: &str) -> GatewayResult<Deleted> {
        let key = Key::parse(key)?;
        let deleted = self
            .store
            .delete(key.as_str())
            .await
            .map_err(|e| GatewayError::from_store(Some(key.as_str()), e))?;
        debug!(%key, deleted, "key deleted");
        Ok(Deleted {
            key: key.to_string(),
            deleted,
        })
    }

    pub async fn key_info(&self, key: &str) -> GatewayResult<KeyInfo> {
        let key = Key::parse(key)?;
        let exists = self
            .store
            .exists(key.as_str())
            .await
            .map_err(|e| GatewayError::from_store(Some(key.as_str()), e))?;
        if !exists {
            return Ok(KeyInfo {
                key: key.to_string(),
                exists: false,
                value: None,
            });
        }

        // The key can vanish between the two calls; report what we saw last.
        let value = self
            .store
            .get(key.as_str())
            .await
            .map_err(|e| GatewayError::from_store(Some(key.as_str()), e))?
            .map(StoredValue::from_raw);
        Ok(KeyInfo {
            key: key.to_string(),
            exists: value.is_some(),
            value,
        })
    }

    /// Aggregate stats. Runs a full key count on the store; use sparingly.
    pub async fn status(&self) -> GatewayResult<Status> {
        let uptime = self.uptime();
        let page_hits = self
            .store
            .get(PAGE_HITS_KEY)
            .await?
            .map(StoredValue::from_raw)
            .unwrap_or(StoredValue::Integer(0));
        let total_keys = self.store.dbsize().await?;
        let info = self.store.info(None).await?;

        Ok(Status {
            uptime_seconds: uptime.as_secs(),
            uptime: format_uptime(uptime),
            page_hits,
            total_keys,
            store: StoreStats {
                backend: self.store.backend(),
                version: info.version().map(str::to_string),
                connected_clients: info.connected_clients(),
                used_memory: info.used_memory_human().map(str::to_string),
                commands_processed: info.total_commands_processed(),
            },
        })
    }

    pub async fn memory_status(&self) -> GatewayResult<MemoryStatus> {
        let info = self.store.info(Some("memory")).await?;
        Ok(MemoryStatus {
            used_memory: info.into_fields(),
        })
    }

    pub async fn health_check(&self) -> HealthReport {
        self.health.check().await
    }

    /// Bump the ambient page-hit counter.
    pub async fn record_page_hit(&self) -> GatewayResult<i64> {
        Ok(self.store.incr_by(PAGE_HITS_KEY, 1).await?)
    }
}

/// Render an uptime as e.g. `2d 3h 4m 5s`, dropping leading zero units.
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let (days, hours, mins, secs) = (secs / 86_400, secs / 3_600 % 24, secs / 60 % 60, secs % 60);
    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if days > 0 || hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if days > 0 || hours > 0 || mins > 0 {
        parts.push(format!("{mins}m"));
    }
    parts.push(format!("{secs}s"));
    parts.join(" ")
}
