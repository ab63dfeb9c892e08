//! # vtask
//!
//! An M:N green-task runtime: a work-stealing scheduler over OS-thread
//! workers, a completion-based async I/O engine (submission-ring `io_uring`
//! preferred, readiness-poll `epoll` fallback), structured panic handling,
//! and a small set of task synchronization primitives (channels, a
//! closure-invocation mutex, cooperative cancellation, a generational
//! handle pool).
//!
//! Tasks are ordinary `Future`s, driven by [`Scheduler`] the same way any
//! other Rust executor drives them — `spawn`/`.await`/`yield_now().await`
//! rather than closures over a raw `poll(state, ctx)` pointer. [`spawn_fn`]
//! is kept for closures that don't need to suspend mid-body.
//!
//! ## Quick start
//!
//! ```ignore
//! use vtask::Runtime;
//!
//! fn main() {
//!     let rt = Runtime::new(Default::default());
//!     let result = rt.block_on(async {
//!         let handle = vtask::spawn_fn(|| 1 + 1);
//!         handle.join().unwrap()
//!     });
//!     assert_eq!(result, 2);
//! }
//! ```

use std::future::Future;
use std::os::unix::io::RawFd;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

// Platform-agnostic types.
pub use vtask_core::{
    channel, rendezvous, CancellationToken, DataMutex, Handle, Pool, Receiver, Sender,
    SharedData, TaskError, TaskId, TaskResult, TryRecvError, TrySendError,
};

// Debug-logging macros and the `kprint` configuration surface.
pub use vtask_core::{kdebug, kerror, kinfo, kprint, kprintln, ktrace, kwarn};
pub use vtask_core::kprint::{init as init_logging, set_flush_enabled, set_log_level, set_time_enabled, LogLevel};

// Environment-variable configuration helpers.
pub use vtask_core::env::{env_get, env_get_bool, env_get_opt, env_get_str, env_is_set};

// Scheduler and task types.
pub use vtask_runtime::{push_cleanup, JoinHandle, Outcome, Scheduler, SchedulerConfig};
pub use vtask_runtime::io::yield_now;

static RUNTIME: OnceLock<Arc<Scheduler>> = OnceLock::new();

/// Owns a [`Scheduler`] and its worker threads. Dropping the last `Runtime`
/// does not stop the scheduler — call [`Runtime::shutdown`] (or
/// [`Runtime::block_on`], which calls it for you) explicitly.
pub struct Runtime {
    scheduler: Arc<Scheduler>,
}

impl Runtime {
    /// Start a scheduler with the given configuration.
    pub fn new(config: SchedulerConfig) -> Self {
        Self { scheduler: Scheduler::new(config) }
    }

    /// Borrow the underlying scheduler handle, e.g. to pass to code that
    /// wants `Arc<Scheduler>` directly instead of going through the free
    /// functions below.
    pub fn handle(&self) -> Arc<Scheduler> {
        self.scheduler.clone()
    }

    pub fn spawn<T, F>(&self, future: F) -> JoinHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        self.scheduler.spawn(future)
    }

    pub fn spawn_fn<T, F>(&self, f: F) -> JoinHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        self.scheduler.spawn_fn(f)
    }

    /// Run `future` to completion, then shut the scheduler down.
    pub fn block_on<T, F>(&self, future: F) -> T
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        let result = self.scheduler.block_on(future);
        self.shutdown();
        result
    }

    /// Stop accepting new idle time: signal every worker to exit once its
    /// queues drain, and join their threads.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}

/// Install `config` as the process-wide default scheduler used by the free
/// functions below ([`spawn`], [`yield_now`], the I/O ops). Panics if a
/// global runtime has already been installed (by this call or by the
/// free functions' own lazy `OnceLock::get_or_init`).
pub fn init_global_runtime(config: SchedulerConfig) -> Arc<Scheduler> {
    let scheduler = Scheduler::new(config);
    RUNTIME
        .set(scheduler.clone())
        .unwrap_or_else(|_| panic!("vtask: global runtime already initialized"));
    scheduler
}

/// The process-wide default scheduler, lazily started from
/// `SchedulerConfig::from_env()` on first use if [`init_global_runtime`]
/// was never called explicitly.
fn global() -> &'static Arc<Scheduler> {
    RUNTIME.get_or_init(|| Scheduler::new(SchedulerConfig::from_env()))
}

/// Spawn a future on the global scheduler.
pub fn spawn<T, F>(future: F) -> JoinHandle<T>
where
    T: Send + 'static,
    F: Future<Output = T> + Send + 'static,
{
    global().spawn(future)
}

/// Spawn a future as a child of `parent`'s cancellation scope.
pub fn spawn_child<T, F>(future: F, parent: &CancellationToken) -> JoinHandle<T>
where
    T: Send + 'static,
    F: Future<Output = T> + Send + 'static,
{
    global().spawn_child(future, parent)
}

/// Spawn a plain closure on the global scheduler (resolves on first poll;
/// cannot suspend mid-body — see [`Scheduler::spawn_fn`]).
pub fn spawn_fn<T, F>(f: F) -> JoinHandle<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    global().spawn_fn(f)
}

/// Run `future` to completion on the calling thread via the global
/// scheduler.
pub fn block_on<T, F>(future: F) -> T
where
    T: Send + 'static,
    F: Future<Output = T> + Send + 'static,
{
    global().block_on(future)
}

/// Read from `fd` into `buf` via the global scheduler's I/O engine,
/// suspending the calling task until the read completes.
///
/// # Safety
/// `buf` must remain valid for the duration of the returned future (it
/// does, since the future borrows it).
pub fn read(fd: RawFd, buf: &mut [u8]) -> impl Future<Output = std::io::Result<usize>> + '_ {
    vtask_runtime::io::read(global().io(), fd, buf)
}

/// Write `buf` to `fd` via the global scheduler's I/O engine, suspending
/// the calling task until the write completes.
pub fn write(fd: RawFd, buf: &[u8]) -> impl Future<Output = std::io::Result<usize>> + '_ {
    vtask_runtime::io::write(global().io(), fd, buf)
}

/// Accept a connection on `listen_fd` via the global scheduler's I/O
/// engine, suspending the calling task until one arrives.
pub fn accept(listen_fd: RawFd) -> impl Future<Output = std::io::Result<RawFd>> {
    vtask_runtime::io::accept(global().io(), listen_fd)
}

/// Suspend the calling task for at least `duration`, without blocking the
/// worker thread it's running on.
pub fn sleep(duration: Duration) -> impl Future<Output = ()> {
    vtask_runtime::io::sleep(global().io(), duration)
}

/// The current task's id, or [`TaskId::NONE`] if not running inside a task.
#[inline]
pub fn current_task_id() -> TaskId {
    vtask_runtime::tls::current_task_id()
}

/// Whether the calling thread is currently executing a task.
#[inline]
pub fn is_in_task() -> bool {
    vtask_runtime::tls::is_in_task()
}
