//! `Worker` and `WorkerPool`: the concurrency model tying a [`JobStore`] + [`Executor`]
//! + scheduler policy together. No direct inter-worker communication; the Store is
//! the only shared mutable state outside each worker's own subsystem.

mod pool;
mod worker;

pub use pool::WorkerPool;
pub use worker::Worker;
