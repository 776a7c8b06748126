//! Snapshot retention policy engine, configuration loader, and orchestration loop for a
//! copy-on-write storage manager, plus the replication selector and digest collaborator used by
//! neighboring tools.
//!
//! The core is pure: [`filter`] and [`policy`] never perform I/O. Everything that talks to the
//! storage manager lives behind the [`driver::StorageDriver`] trait.

pub mod config;
pub mod digest;
pub mod driver;
pub mod error;
pub mod filter;
pub mod orchestrator;
pub mod policy;
pub mod replication;
pub mod snapshot;

pub use error::{Error, Result};
pub use filter::Filter;
pub use orchestrator::RESERVED_PREFIX;
pub use policy::{default_policy, filter_snapshots, Cutoff, Decision, Policy};
pub use snapshot::Snapshot;
