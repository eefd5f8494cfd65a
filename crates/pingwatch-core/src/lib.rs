//! pingwatch-core: shared types for the pingwatch remediation loop.
//!
//! Everything the watcher knows about the outside world flows through
//! the collaborator traits in [`cloud`]: the identity catalog (regions),
//! the per-region compute service (machines, reboots) and the monitoring
//! service (entities, ping checks, metrics, alarms). The other crates
//! only ever hold `Arc<dyn _>` handles to these, so tests can swap in the
//! in-memory fakes from [`testing`].
//!
//! # Data flow
//!
//! ```text
//! Catalog ── regions ──► ComputeProvider ── Machine ──►
//!     Monitoring: Entity → Check → Metric → DataPoint → Sample
//!         → availability score → RemediationDecision → Compute::reboot
//! ```

pub mod cloud;
pub mod config;
pub mod deadline;
pub mod error;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cloud::{Catalog, Compute, ComputeProvider, Monitoring};
pub use config::{RegionErrorPolicy, WatchConfig};
pub use deadline::with_deadline;
pub use error::{PingwatchError, PingwatchResult, Stage};
pub use types::*;
