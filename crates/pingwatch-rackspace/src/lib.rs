//! pingwatch-rackspace: the cloud collaborators over the Rackspace APIs.
//!
//! [`RackspaceClient`] authenticates against the identity service and
//! implements [`Catalog`](pingwatch_core::Catalog),
//! [`ComputeProvider`](pingwatch_core::ComputeProvider) and
//! [`Monitoring`](pingwatch_core::Monitoring) from the service catalog it
//! gets back.
//!
//! ```text
//! identity  POST /tokens                          → token + service catalog
//! compute   GET  /servers/detail?marker=…         (per region, paginated)
//!           POST /servers/{id}/action  {reboot}
//! monitor   GET  /entities, …/checks, …/metrics    (paginated by next_marker)
//!           GET  …/metrics/{name}/plot?from&to&resolution=FULL
//!           POST …/checks, …/alarms                (id from Location header)
//!           GET  /notification_plans
//! ```
//!
//! The service catalog is refreshed every time the region list is read,
//! which also renews the token once per pass.

pub mod client;
pub mod compute;
pub mod error;
pub mod identity;
pub mod monitoring;
mod wire;

pub use client::RackspaceClient;
pub use compute::RegionCompute;
pub use error::{RackspaceError, RackspaceResult};
pub use identity::{Credentials, DEFAULT_AUTH_URL, Session};
