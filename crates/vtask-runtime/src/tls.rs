//! Thread-local worker and task identity
//!
//! Each worker OS thread records its own worker index and the id of the
//! task it's currently running, so code deep inside a future (the
//! logging macros, a cancellation check, an I/O submission) can answer
//! "which worker / which task am I" without threading an explicit
//! context parameter through every call.

use std::cell::{Cell, RefCell};
use std::sync::Arc;
use vtask_core::id::TaskId;

use crate::task::Runnable;

thread_local! {
    static WORKER_ID: Cell<Option<usize>> = const { Cell::new(None) };
    static CURRENT_TASK: Cell<TaskId> = const { Cell::new(TaskId::NONE) };
    static CURRENT_RUNNABLE: RefCell<Option<Arc<dyn Runnable>>> = const { RefCell::new(None) };
}

/// Mark the calling thread as worker `id`. Called once from
/// `worker_entry` before the run loop starts.
pub fn set_worker_id(id: usize) {
    WORKER_ID.with(|cell| cell.set(Some(id)));
}

/// The current thread's worker index, or `None` if this thread isn't a
/// scheduler worker (e.g. the thread that called `block_on`).
pub fn worker_id() -> Option<usize> {
    WORKER_ID.with(|cell| cell.get())
}

pub fn set_current_task(id: TaskId) {
    CURRENT_TASK.with(|cell| cell.set(id));
}

pub fn clear_current_task() {
    CURRENT_TASK.with(|cell| cell.set(TaskId::NONE));
}

/// The id of the task currently executing on this thread, if any.
pub fn current_task_id() -> TaskId {
    CURRENT_TASK.with(|cell| cell.get())
}

pub fn is_in_task() -> bool {
    current_task_id().is_some()
}

/// Record the `Runnable` currently executing on this thread, so code deep
/// inside its future (a `defer`/cleanup-hook helper, a cancellation check)
/// can reach it without an explicit context parameter.
pub fn set_current_runnable(runnable: Arc<dyn Runnable>) {
    CURRENT_RUNNABLE.with(|cell| *cell.borrow_mut() = Some(runnable));
}

pub fn clear_current_runnable() {
    CURRENT_RUNNABLE.with(|cell| *cell.borrow_mut() = None);
}

/// The `Runnable` currently executing on this thread, if any.
pub fn current_runnable() -> Option<Arc<dyn Runnable>> {
    CURRENT_RUNNABLE.with(|cell| cell.borrow().clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_id_roundtrip() {
        assert_eq!(worker_id(), None);
        set_worker_id(3);
        assert_eq!(worker_id(), Some(3));
    }

    #[test]
    fn test_current_task_roundtrip() {
        assert!(!is_in_task());
        set_current_task(TaskId::new(7));
        assert!(is_in_task());
        assert_eq!(current_task_id(), TaskId::new(7));
        clear_current_task();
        assert!(!is_in_task());
    }
}
