//! Task lifecycle state
//!
//! Matches the four states a task moves through at the scheduler level.
//! There is no notion of task priority: the scheduler treats every
//! runnable task uniformly and relies on work stealing for balance.

use core::fmt;

/// Lifecycle state of a task, as observed by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    /// In a ready queue (local deque or global injection queue), not yet
    /// polled or ready to be polled again after a wakeup.
    Ready = 0,

    /// Currently being polled on a worker.
    Running = 1,

    /// Polled and returned `Pending`; waiting on a waker (I/O completion,
    /// timer, channel, or another task) to move it back to `Ready`.
    Waiting = 2,

    /// Poll returned `Ready`, or the task panicked, or it was cancelled.
    /// Terminal; no further scheduling occurs.
    Complete = 3,
}

impl TaskState {
    #[inline]
    pub const fn is_runnable(&self) -> bool {
        matches!(self, TaskState::Ready)
    }

    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Complete)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Ready => "READY",
            TaskState::Running => "RUNNING",
            TaskState::Waiting => "WAITING",
            TaskState::Complete => "COMPLETE",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert!(TaskState::Ready.is_runnable());
        assert!(!TaskState::Running.is_runnable());
        assert!(!TaskState::Waiting.is_runnable());

        assert!(TaskState::Complete.is_terminal());
        assert!(!TaskState::Running.is_terminal());
    }

    #[test]
    fn test_display() {
        assert_eq!(TaskState::Ready.to_string(), "READY");
        assert_eq!(TaskState::Complete.to_string(), "COMPLETE");
    }
}
