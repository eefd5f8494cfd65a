//! pingwatch-scheduler: the outer remediation loop.
//!
//! The `Scheduler` walks every region of the catalog, one at a time, and
//! spreads each pass over the configured interval. Within a region the
//! `FleetScanner` runs one check per machine on a shared, bounded
//! `WorkerPool` and waits for all of them before the region is done.
//!
//! # Architecture
//!
//! ```text
//! Scheduler (one pass per interval)
//!   ├── Catalog::regions()                re-read every pass
//!   └── for each region, sequentially:
//!       ├── FleetScanner::scan_region()
//!       │   ├── Compute::list_machines()
//!       │   └── WorkerPool fan-out, one MachineCheck per machine
//!       │       └── ProbeLocator → evaluate → RemediationPolicy
//!       └── sleep(interval / regions)
//! ```
//!
//! Per-machine failures are logged and counted in the `RegionReport`;
//! they never abort a region. Catalog and region failures follow
//! [`RegionErrorPolicy`](pingwatch_core::RegionErrorPolicy).

pub mod error;
pub mod pool;
pub mod scanner;
pub mod scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use pool::WorkerPool;
pub use scanner::{FleetScanner, MachineOutcome, RegionReport};
pub use scheduler::{PassOutcome, Scheduler, per_region_delay};
