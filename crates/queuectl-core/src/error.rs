use thiserror::Error;

/// Core-visible error taxonomy. Storage backends and the executor map their own
/// failure modes onto this set at the boundary.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("job {0} already exists")]
    AlreadyExists(String),

    #[error("job {0} not found")]
    NotFound(String),

    #[error("requeue requires state=dead, job {id} is in state {state}")]
    InvalidState { id: String, state: String },

    #[error("storage error: {0}")]
    Storage(#[source] anyhow::Error),

    #[error("failed to spawn command: {0}")]
    SpawnError(String),

    #[error("command exceeded its timeout")]
    Timeout,

    #[error("command was canceled")]
    Canceled,
}
