//! # queuectl-core
//!
//! Durable job queue primitives: a [`Job`] model, the [`JobStore`] trait a storage backend
//! implements, a pure [`decide`] scheduler policy, and the small [`Clock`]/[`QueueConfig`]
//! seams that let the rest of the workspace stay backend-agnostic and testable.
//!
//! ## Key invariants
//!
//! 1. **The Store is the only shared mutable state** - Workers never share job data directly.
//! 2. **Claim is the sole atomicity boundary** - at most one caller ever holds a given job's
//!    lock at once; see [`JobStore::claim`].
//! 3. **Scheduler Policy is pure** - [`decide`] takes no IO and is fully covered by unit tests.
//! 4. **Job values are passed by value** - no shared mutable handles cross worker/store
//!    boundaries.
//!
//! This crate has no IO of its own: [`queuectl-store-sqlite`](../queuectl_store_sqlite/index.html)
//! and [`queuectl-exec`](../queuectl_exec/index.html) provide the concrete backends that
//! implement these traits.

mod clock;
mod config;
mod error;
mod job;
mod policy;
mod store;

pub use clock::{Clock, SystemClock};
pub use config::QueueConfig;
pub use error::QueueError;
pub use job::{Job, JobState};
pub use policy::{decide, ExecutionOutcome, Transition};
pub use store::JobStore;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, QueueError>;
