//! Error types for the task runtime

use core::fmt;

/// Result type for runtime operations.
pub type TaskResult<T> = Result<T, TaskError>;

/// Errors that can occur in scheduler, channel, and task-handle operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Operation was cancelled via a `CancellationToken`.
    Cancelled,

    /// Operation timed out.
    Timeout,

    /// Channel was closed.
    ChannelClosed,

    /// Channel is full (for `try_send`).
    ChannelFull,

    /// Channel is empty (for `try_recv`).
    ChannelEmpty,

    /// Runtime has not been initialized (no scheduler running).
    NotInitialized,

    /// Runtime was already initialized.
    AlreadyInitialized,

    /// Reserved for embedder-facing handle wrappers that can't rely on
    /// Rust's move checker to reject a second join/detach/cancel (e.g. a
    /// handle reached through a generational [`crate::pool::Pool`] slot
    /// rather than held by value). `JoinHandle` itself consumes `self` on
    /// `join`/`cancel`/`detach`, so double-consumption there is a compile
    /// error and never produces this variant.
    HandleAlreadyConsumed,

    /// A task panicked; carries the captured panic message.
    TaskPanicked(String),

    /// Worker thread error.
    Worker(WorkerError),

    /// Handle-pool or construction error (non-positive element size,
    /// invalid generation, stale handle, ...).
    Pool(PoolError),

    /// The underlying I/O engine reported an OS error.
    Io(i32),
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::Cancelled => write!(f, "operation cancelled"),
            TaskError::Timeout => write!(f, "operation timed out"),
            TaskError::ChannelClosed => write!(f, "channel closed"),
            TaskError::ChannelFull => write!(f, "channel full"),
            TaskError::ChannelEmpty => write!(f, "channel empty"),
            TaskError::NotInitialized => write!(f, "runtime not initialized"),
            TaskError::AlreadyInitialized => write!(f, "runtime already initialized"),
            TaskError::HandleAlreadyConsumed => write!(f, "task handle already consumed"),
            TaskError::TaskPanicked(msg) => write!(f, "task panicked: {}", msg),
            TaskError::Worker(e) => write!(f, "worker error: {}", e),
            TaskError::Pool(e) => write!(f, "pool error: {}", e),
            TaskError::Io(code) => write!(f, "i/o error (errno {})", code),
        }
    }
}

impl std::error::Error for TaskError {}

/// Worker thread related errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    SpawnFailed,
    Panicked,
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerError::SpawnFailed => write!(f, "failed to spawn worker thread"),
            WorkerError::Panicked => write!(f, "worker thread panicked"),
        }
    }
}

impl From<WorkerError> for TaskError {
    fn from(e: WorkerError) -> Self {
        TaskError::Worker(e)
    }
}

/// Errors from the generational handle pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Element size passed to `Pool::new` was zero.
    ZeroElementSize,
    /// A handle's generation did not match the slot's current generation
    /// (stale handle — the slot has been reused or removed).
    StaleHandle,
    /// A handle's index was out of range for the pool.
    InvalidIndex,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::ZeroElementSize => write!(f, "pool element size must be positive"),
            PoolError::StaleHandle => write!(f, "stale handle (generation mismatch)"),
            PoolError::InvalidIndex => write!(f, "handle index out of range"),
        }
    }
}

impl From<PoolError> for TaskError {
    fn from(e: PoolError) -> Self {
        TaskError::Pool(e)
    }
}

/// Error returned when trying to send on a full channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrySendError<T>(pub T);

impl<T> fmt::Display for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel full")
    }
}

/// Error returned when trying to receive from an empty (or closed-and-drained)
/// channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    Empty,
    Closed,
}

impl fmt::Display for TryRecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryRecvError::Empty => write!(f, "channel empty"),
            TryRecvError::Closed => write!(f, "channel closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = TaskError::Cancelled;
        assert_eq!(format!("{}", e), "operation cancelled");

        let e = TaskError::Pool(PoolError::StaleHandle);
        assert_eq!(format!("{}", e), "pool error: stale handle (generation mismatch)");
    }

    #[test]
    fn test_error_conversion() {
        let pool_err = PoolError::ZeroElementSize;
        let task_err: TaskError = pool_err.into();
        assert!(matches!(task_err, TaskError::Pool(PoolError::ZeroElementSize)));
    }
}
