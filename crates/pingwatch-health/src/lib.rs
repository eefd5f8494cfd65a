//! pingwatch-health: decide, per machine, whether a reboot is due.
//!
//! Three steps, each a module:
//!
//! ```text
//! Machine
//!   ├── probe::ProbeLocator       entity → ping check (created if missing)
//!   │     └── sample_availability  *.available series in the window
//!   ├── availability::evaluate    mean of all samples, or None
//!   └── policy::RemediationPolicy threshold + eligibility → decision (+ reboot)
//! ```
//!
//! # Fresh probes
//!
//! A ping check created by the locator has no history yet. The locator
//! reports it as [`ProbeLookup::Created`] and [`ProbeLocator::find_probe`]
//! returns `None` for it, so the machine is skipped for the cycle rather
//! than scored as 0% available.

pub mod availability;
pub mod policy;
pub mod probe;

pub use availability::evaluate;
pub use policy::RemediationPolicy;
pub use probe::{ProbeLocator, ProbeLookup};
