//! Task representation
//!
//! A task is a boxed, pinned `Future` plus the bookkeeping the scheduler
//! needs to run it cooperatively: a join slot for whoever is waiting on
//! the result, a cancellation token, and a waker that re-enqueues the
//! task when something it's waiting on becomes ready.
//!
//! Polling happens behind `catch_unwind`: a panicking future does not
//! take down the worker thread, it turns into `Outcome::Failed` and is
//! delivered to the task's `JoinHandle` the same way a normal error
//! would be, mirroring how the old setjmp/longjmp panic boundary kept a
//! single task's crash from corrupting the rest of the run queue.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::task::{Context, Poll, Wake, Waker};

use vtask_core::cancel::CancellationToken;
use vtask_core::id::TaskId;
use vtask_core::kprint::{LogLevel, _klog_impl};
use vtask_core::{TaskError, TaskResult, TaskState};

/// Where a task's execution landed after one `poll` call.
#[derive(Debug)]
pub enum Outcome<T> {
    Ready(T),
    Pending,
    Cancelled,
    Failed(String),
}

/// Anything the scheduler can put back to work: a deque or global queue
/// holds `Arc<dyn Runnable>`, type-erased over the task's output type.
pub trait Runnable: Send + Sync {
    fn id(&self) -> TaskId;
    fn run(self: Arc<Self>);
    fn cancel_token(&self) -> &CancellationToken;
    fn is_complete(&self) -> bool;
    /// Push a cleanup hook onto this task's LIFO stack. Hooks run, most
    /// recently pushed first, once the task reaches a terminal outcome
    /// (ready, cancelled, or failed) — before the outcome is delivered
    /// to any `JoinHandle`.
    fn push_cleanup(&self, hook: Box<dyn FnOnce() + Send>);
}

/// Where a spawned task gets rescheduled once it's ready to make
/// progress again (woken, or freshly spawned).
pub trait Schedule: Send + Sync + 'static {
    fn schedule(&self, task: Arc<dyn Runnable>);
}

struct Join<T> {
    outcome: Mutex<Option<Outcome<T>>>,
    done: Condvar,
}

/// A spawned unit of work: a pinned, boxed future, plus the bookkeeping
/// the scheduler and any `JoinHandle` need to track it.
pub struct Task<T, S: Schedule> {
    id: TaskId,
    future: Mutex<Option<Pin<Box<dyn Future<Output = T> + Send>>>>,
    stage: AtomicU8,
    join: Join<T>,
    cancel: CancellationToken,
    scheduler: Arc<S>,
    cleanup: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl<T: Send + 'static, S: Schedule> Task<T, S> {
    pub fn spawn(
        id: TaskId,
        future: impl Future<Output = T> + Send + 'static,
        cancel: CancellationToken,
        scheduler: Arc<S>,
    ) -> (Arc<Task<T, S>>, JoinHandle<T>) {
        let task = Arc::new(Task {
            id,
            future: Mutex::new(Some(Box::pin(future))),
            stage: AtomicU8::new(TaskState::Ready as u8),
            join: Join { outcome: Mutex::new(None), done: Condvar::new() },
            cancel,
            scheduler,
            cleanup: Mutex::new(Vec::new()),
        });
        let handle = JoinHandle { task: task.clone() };
        (task, handle)
    }

    /// Run this task's cleanup hooks LIFO, most recently pushed first.
    fn run_cleanup(&self) {
        let hooks: Vec<_> = std::mem::take(&mut *self.cleanup.lock().unwrap());
        for hook in hooks.into_iter().rev() {
            hook();
        }
    }

    fn set_stage(&self, stage: TaskState) {
        self.stage.store(stage as u8, Ordering::Release);
    }

    fn stage(&self) -> TaskState {
        match self.stage.load(Ordering::Acquire) {
            0 => TaskState::Ready,
            1 => TaskState::Running,
            2 => TaskState::Waiting,
            _ => TaskState::Complete,
        }
    }

    fn finish(&self, outcome: Outcome<T>) {
        self.run_cleanup();
        self.set_stage(TaskState::Complete);
        *self.join.outcome.lock().unwrap() = Some(outcome);
        self.join.done.notify_all();
        // The future (and anything it's holding, including further
        // scheduler references) can be dropped now that it's done.
        *self.future.lock().unwrap() = None;
    }
}

impl<T: Send + 'static, S: Schedule + 'static> Runnable for Task<T, S> {
    fn id(&self) -> TaskId {
        self.id
    }

    fn is_complete(&self) -> bool {
        self.stage() == TaskState::Complete
    }

    fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn push_cleanup(&self, hook: Box<dyn FnOnce() + Send>) {
        self.cleanup.lock().unwrap().push(hook);
    }

    fn run(self: Arc<Self>) {
        if self.is_complete() {
            return;
        }
        if self.cancel.is_cancelled() {
            self.finish(Outcome::Cancelled);
            return;
        }

        let mut guard = self.future.lock().unwrap();
        let fut = match guard.as_mut() {
            Some(f) => f,
            None => return,
        };

        self.set_stage(TaskState::Running);
        let waker = Waker::from(self.clone());
        let mut cx = Context::from_waker(&waker);

        let poll_result =
            std::panic::catch_unwind(AssertUnwindSafe(|| fut.as_mut().poll(&mut cx)));
        drop(guard);

        match poll_result {
            Ok(Poll::Ready(value)) => self.finish(Outcome::Ready(value)),
            Ok(Poll::Pending) => {
                if self.cancel.is_cancelled() {
                    self.finish(Outcome::Cancelled);
                } else {
                    self.set_stage(TaskState::Waiting);
                }
            }
            Err(payload) => {
                let message = panic_message(&payload);
                _klog_impl(LogLevel::Error, format_args!("task {} panicked: {}", self.id, message));
                self.finish(Outcome::Failed(message));
            }
        }
    }
}

impl<T: Send + 'static, S: Schedule + 'static> Wake for Task<T, S> {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref()
    }

    fn wake_by_ref(self: &Arc<Self>) {
        if self.is_complete() {
            return;
        }
        self.set_stage(TaskState::Ready);
        self.scheduler.schedule(self.clone() as Arc<dyn Runnable>);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Handle to a spawned task's eventual result.
pub struct JoinHandle<T> {
    task: Arc<dyn JoinableInner<T>>,
}

/// Object-safe subset of `Task<T, S>` needed by `JoinHandle<T>`, erasing
/// the scheduler type parameter.
trait JoinableInner<T>: Send + Sync {
    fn id(&self) -> TaskId;
    fn cancel(&self);
    fn is_complete(&self) -> bool;
    fn wait(&self) -> TaskResult<T>;
    fn try_take(&self) -> Option<TaskResult<T>>;
}

impl<T: Send + 'static, S: Schedule + 'static> JoinableInner<T> for Task<T, S> {
    fn id(&self) -> TaskId {
        self.id
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }

    fn is_complete(&self) -> bool {
        Runnable::is_complete(self)
    }

    fn wait(&self) -> TaskResult<T> {
        let mut guard = self.join.outcome.lock().unwrap();
        while guard.is_none() {
            guard = self.join.done.wait(guard).unwrap();
        }
        outcome_to_result(guard.take().unwrap())
    }

    fn try_take(&self) -> Option<TaskResult<T>> {
        let mut guard = self.join.outcome.lock().unwrap();
        guard.take().map(outcome_to_result)
    }
}

fn outcome_to_result<T>(outcome: Outcome<T>) -> TaskResult<T> {
    match outcome {
        Outcome::Ready(value) => Ok(value),
        Outcome::Cancelled => Err(TaskError::Cancelled),
        Outcome::Failed(message) => Err(TaskError::TaskPanicked(message)),
        Outcome::Pending => unreachable!("wait() only resolves a completed join slot"),
    }
}

impl<T> JoinHandle<T> {
    pub fn id(&self) -> TaskId {
        self.task.id()
    }

    /// Return the result if the task has already finished, without
    /// blocking, leaving the handle usable for a later `join`/`cancel`/
    /// `detach`. Once the outcome has been observed (by this or by
    /// `join`), subsequent calls return `None` — the outcome is consumed
    /// exactly once.
    pub fn try_join(&self) -> Option<TaskResult<T>> {
        self.task.try_take()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_complete()
    }

    /// Consume the handle, blocking the calling OS thread until the task
    /// finishes. The handle is affine: it must be consumed by exactly one
    /// of `join`, `cancel`, or `detach`. Rust's move semantics make a
    /// second consumption a compile error rather than the source's
    /// runtime-fatal "consumed TaskHandle" check.
    pub fn join(self) -> TaskResult<T> {
        self.task.wait()
    }

    /// Consume the handle, requesting cooperative cancellation and then
    /// behaving as `join`: the task observes the cancel flag the next time
    /// it checks, and this call blocks for whatever outcome it ultimately
    /// reaches (normally `Err(TaskError::Cancelled)`, but a task that
    /// completes or fails before noticing cancellation reports that
    /// outcome instead).
    pub fn cancel(self) -> TaskResult<T> {
        self.task.cancel();
        self.task.wait()
    }

    /// Consume the handle without observing the task's result; the task
    /// keeps running to completion on its own and nobody reaps its
    /// outcome.
    pub fn detach(self) {}
}

/// Register `hook` on the calling task's cleanup stack. Hooks run in
/// reverse push order (most recently pushed first) once the task reaches
/// a terminal outcome — ready, cancelled, or failed — before that outcome
/// is delivered to the `JoinHandle`.
///
/// A no-op outside any task (e.g. called from the thread driving
/// `block_on`, which isn't itself a scheduled `Runnable`).
pub fn push_cleanup(hook: impl FnOnce() + Send + 'static) {
    if let Some(runnable) = crate::tls::current_runnable() {
        runnable.push_cleanup(Box::new(hook));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct Inline {
        queue: StdMutex<Vec<Arc<dyn Runnable>>>,
    }

    impl Schedule for Inline {
        fn schedule(&self, task: Arc<dyn Runnable>) {
            self.queue.lock().unwrap().push(task);
        }
    }

    fn run_to_completion(sched: &Arc<Inline>, task: Arc<dyn Runnable>) {
        task.run();
        loop {
            let next = sched.queue.lock().unwrap().pop();
            match next {
                Some(t) => t.run(),
                None => break,
            }
        }
    }

    #[test]
    fn test_ready_future_completes_immediately() {
        let sched = Arc::new(Inline { queue: StdMutex::new(Vec::new()) });
        let (task, handle) = Task::spawn(
            TaskId::new(1),
            async { 42 },
            CancellationToken::new(),
            sched.clone(),
        );
        run_to_completion(&sched, task as Arc<dyn Runnable>);
        assert_eq!(handle.join().unwrap(), 42);
    }

    #[test]
    fn test_panicking_future_yields_failed_outcome() {
        let sched = Arc::new(Inline { queue: StdMutex::new(Vec::new()) });
        let (task, handle) = Task::spawn(
            TaskId::new(1),
            async {
                panic!("boom");
                #[allow(unreachable_code)]
                0
            },
            CancellationToken::new(),
            sched.clone(),
        );
        run_to_completion(&sched, task as Arc<dyn Runnable>);
        match handle.join() {
            Err(TaskError::TaskPanicked(msg)) => assert_eq!(msg, "boom"),
            other => panic!("expected TaskPanicked, got {:?}", other),
        }
    }

    #[test]
    fn test_cancelled_before_poll_yields_cancelled() {
        let sched = Arc::new(Inline { queue: StdMutex::new(Vec::new()) });
        let token = CancellationToken::new();
        token.cancel();
        let (task, handle) =
            Task::spawn(TaskId::new(1), async { 1 }, token, sched.clone());
        run_to_completion(&sched, task as Arc<dyn Runnable>);
        assert!(matches!(handle.join(), Err(TaskError::Cancelled)));
    }

    #[test]
    fn test_try_join_before_completion_is_none() {
        let sched = Arc::new(Inline { queue: StdMutex::new(Vec::new()) });
        let (task, handle) = Task::spawn(
            TaskId::new(1),
            std::future::pending::<i32>(),
            CancellationToken::new(),
            sched.clone(),
        );
        task.run();
        assert!(handle.try_join().is_none());
        assert!(!handle.is_finished());
    }
}
