//! countgate-health: store liveness checking for countgate.
//!
//! A health check is a single bounded `PING` against the shared store. The
//! result is reported as-is, so the endpoint flips to unhealthy on the very
//! first failed probe and back on the first success. [`HealthTracker`] only
//! remembers enough history to log transitions and count consecutive
//! failures.
//!
//! ```text
//! HealthChecker
//!   ├── probe_store() → ProbeResult   (timeout-bounded ping)
//!   └── HealthTracker                  (transition logging)
//! ```

pub mod checker;

pub use checker::{HealthChecker, HealthReport, HealthStatus, HealthTracker, ProbeResult};
