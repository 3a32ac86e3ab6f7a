//! Store liveness probe logic.
//!
//! Performs a timeout-bounded ping against the shared store and tracks the
//! resulting status across calls.

use std::sync::Arc;
use std::time::Duration;

use countgate_store::KvStore;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Result of a single liveness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// The store answered the ping.
    Healthy,
    /// The store returned an error or the connection failed.
    Failed(String),
    /// No answer within the probe timeout.
    TimedOut,
}

impl ProbeResult {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeResult::Healthy)
    }

    /// Human-readable failure reason, if any.
    pub fn reason(&self) -> Option<String> {
        match self {
            ProbeResult::Healthy => None,
            ProbeResult::Failed(reason) => Some(reason.clone()),
            ProbeResult::TimedOut => Some("store did not answer ping in time".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Unhealthy,
}

/// Tracks consecutive probe results for the store connection.
#[derive(Debug)]
pub struct HealthTracker {
    /// Current health status.
    status: HealthStatus,
    /// Consecutive failure count.
    consecutive_failures: u32,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            status: HealthStatus::Unknown,
            consecutive_failures: 0,
        }
    }

    /// Record a probe result and return the new health status.
    pub fn record(&mut self, result: &ProbeResult) -> HealthStatus {
        if result.is_healthy() {
            if self.status == HealthStatus::Unhealthy {
                info!(
                    after_failures = self.consecutive_failures,
                    "store recovered to healthy"
                );
            }
            self.consecutive_failures = 0;
            self.status = HealthStatus::Healthy;
        } else {
            self.consecutive_failures += 1;
            if self.status != HealthStatus::Unhealthy {
                warn!(reason = ?result.reason(), "store marked unhealthy");
            }
            self.status = HealthStatus::Unhealthy;
        }
        self.status
    }

    /// Current health status.
    pub fn status(&self) -> HealthStatus {
        self.status
    }

    /// Current number of consecutive failures.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

/// Outcome of a health check, as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub consecutive_failures: u32,
}

/// Ping the store, giving up after `timeout`.
pub async fn probe_store(store: &dyn KvStore, timeout: Duration) -> ProbeResult {
    match tokio::time::timeout(timeout, store.ping()).await {
        Ok(Ok(())) => ProbeResult::Healthy,
        Ok(Err(e)) => {
            debug!(error = %e, backend = store.backend(), "store ping failed");
            ProbeResult::Failed(e.to_string())
        }
        Err(_) => {
            debug!(?timeout, backend = store.backend(), "store ping timed out");
            ProbeResult::TimedOut
        }
    }
}

/// Runs liveness probes against the shared store.
pub struct HealthChecker {
    store: Arc<dyn KvStore>,
    timeout: Duration,
    tracker: Mutex<HealthTracker>,
}

impl HealthChecker {
    pub fn new(store: Arc<dyn KvStore>, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            tracker: Mutex::new(HealthTracker::new()),
        }
    }

    /// Probe now and report. Reflects this probe only, never a cached result.
    pub async fn check(&self) -> HealthReport {
        let result = probe_store(self.store.as_ref(), self.timeout).await;
        let mut tracker = self.tracker.lock().await;
        let status = tracker.record(&result);
        HealthReport {
            healthy: result.is_healthy(),
            status,
            reason: result.reason(),
            consecutive_failures: tracker.consecutive_failures(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use countgate_store::{EmbeddedStore, ServerInfo, StoreError, StoreFuture};

    /// Embedded store whose ping can be switched off or slowed down.
    struct SwitchableStore {
        inner: EmbeddedStore,
        reachable: AtomicBool,
        ping_delay: Duration,
    }

    impl SwitchableStore {
        fn new(ping_delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                inner: EmbeddedStore::open_in_memory().unwrap(),
                reachable: AtomicBool::new(true),
                ping_delay,
            })
        }
    }

    impl KvStore for SwitchableStore {
        fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
            self.inner.get(key)
        }
        fn set<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a, ()> {
            self.inner.set(key, value)
        }
        fn incr_by<'a>(&'a self, key: &'a str, delta: i64) -> StoreFuture<'a, i64> {
            self.inner.incr_by(key, delta)
        }
        fn decr_by<'a>(&'a self, key: &'a str, delta: i64) -> StoreFuture<'a, i64> {
            self.inner.decr_by(key, delta)
        }
        fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
            self.inner.delete(key)
        }
        fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
            self.inner.exists(key)
        }
        fn dbsize(&self) -> StoreFuture<'_, u64> {
            self.inner.dbsize()
        }
        fn info<'a>(&'a self, section: Option<&'a str>) -> StoreFuture<'a, ServerInfo> {
            self.inner.info(section)
        }
        fn ping(&self) -> StoreFuture<'_, ()> {
            Box::pin(async move {
                tokio::time::sleep(self.ping_delay).await;
                if self.reachable.load(Ordering::SeqCst) {
                    Ok(())
                } else {
                    Err(StoreError::Unavailable("connection refused".to_string()))
                }
            })
        }
        fn backend(&self) -> &'static str {
            "switchable"
        }
    }

    #[test]
    fn tracker_starts_unknown() {
        let tracker = HealthTracker::new();
        assert_eq!(tracker.status(), HealthStatus::Unknown);
        assert_eq!(tracker.consecutive_failures(), 0);
    }

    #[test]
    fn tracker_flips_on_first_failure() {
        let mut tracker = HealthTracker::new();
        tracker.record(&ProbeResult::Healthy);
        let status = tracker.record(&ProbeResult::TimedOut);
        assert_eq!(status, HealthStatus::Unhealthy);
        assert_eq!(tracker.consecutive_failures(), 1);
    }

    #[test]
    fn tracker_counts_consecutive_failures_and_recovers() {
        let mut tracker = HealthTracker::new();
        for _ in 0..3 {
            tracker.record(&ProbeResult::Failed("down".to_string()));
        }
        assert_eq!(tracker.consecutive_failures(), 3);

        let status = tracker.record(&ProbeResult::Healthy);
        assert_eq!(status, HealthStatus::Healthy);
        assert_eq!(tracker.consecutive_failures(), 0);
    }

    #[test]
    fn probe_reasons() {
        assert_eq!(ProbeResult::Healthy.reason(), None);
        assert_eq!(
            ProbeResult::Failed("boom".to_string()).reason().as_deref(),
            Some("boom")
        );
        assert!(ProbeResult::TimedOut.reason().is_some());
    }

    #[tokio::test]
    async fn embedded_store_is_healthy() {
        let store: Arc<dyn KvStore> = Arc::new(EmbeddedStore::open_in_memory().unwrap());
        let checker = HealthChecker::new(store, Duration::from_secs(1));
        let report = checker.check().await;
        assert!(report.healthy);
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.reason, None);
    }

    #[tokio::test]
    async fn unhealthy_immediately_after_store_goes_away() {
        let store = SwitchableStore::new(Duration::ZERO);
        let checker = HealthChecker::new(store.clone(), Duration::from_secs(1));
        assert!(checker.check().await.healthy);

        store.reachable.store(false, Ordering::SeqCst);
        let report = checker.check().await;
        assert!(!report.healthy);
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert!(report.reason.unwrap().contains("connection refused"));

        store.reachable.store(true, Ordering::SeqCst);
        assert!(checker.check().await.healthy);
    }

    #[tokio::test]
    async fn slow_ping_times_out() {
        let store = SwitchableStore::new(Duration::from_millis(500));
        let result = probe_store(store.as_ref(), Duration::from_millis(20)).await;
        assert_eq!(result, ProbeResult::TimedOut);
    }

    #[test]
    fn report_omits_reason_when_healthy() {
        let report = HealthReport {
            healthy: true,
            status: HealthStatus::Healthy,
            reason: None,
            consecutive_failures: 0,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "healthy");
        assert!(json.get("reason").is_none());
    }
}
