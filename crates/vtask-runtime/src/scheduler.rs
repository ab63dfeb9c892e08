//! Work-stealing scheduler
//!
//! Each worker owns a Chase-Lev deque ([`crate::deque`]), injects foreign
//! spawns and deque overflow into a shared global queue
//! ([`crate::global_queue`]), and when both are empty steals from a
//! uniformly random peer rather than scanning in order (avoids every idle
//! worker hammering worker 0). The steal-target RNG is a XorShift32 seeded
//! `(worker_id + 1) * 2654435761` (Knuth's multiplicative constant). After
//! `IDLE_SPIN_LIMIT` consecutive empty rounds a worker parks on a condvar
//! with a short timeout rather than spinning forever.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::task::{Context, Poll};
use std::thread::JoinHandle as ThreadHandle;
use std::time::Duration;

use vtask_core::cancel::CancellationToken;
use vtask_core::id::TaskIdAllocator;
use vtask_core::io::IoBackend;
use vtask_core::kinfo;

use crate::config::SchedulerConfig;
use crate::deque::{Deque, Steal};
use crate::global_queue::GlobalQueue;
use crate::io as io_engine;
use crate::panic as panic_plane;
use crate::task::{JoinHandle, Runnable, Schedule, Task};
use crate::tls;

type RunQueueItem = Arc<dyn Runnable>;

/// `green.c`'s `tl_rng_state` xorshift, seeded identically.
struct XorShift32(u32);

impl XorShift32 {
    fn seeded_for_worker(worker_id: usize) -> Self {
        let seed = ((worker_id as u32).wrapping_add(1)).wrapping_mul(2654435761);
        Self(if seed == 0 { 1 } else { seed })
    }

    fn next(&mut self) -> u32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        x
    }
}

struct Park {
    mutex: Mutex<()>,
    cond: Condvar,
}

impl Park {
    fn new() -> Self {
        Self { mutex: Mutex::new(()), cond: Condvar::new() }
    }

    fn park(&self, timeout: Duration) {
        let guard = self.mutex.lock().unwrap();
        let _ = self.cond.wait_timeout(guard, timeout).unwrap();
    }

    fn unpark_all(&self) {
        self.cond.notify_all();
    }
}

/// An M:N work-stealing scheduler: `config.resolved_workers()` OS threads,
/// each driving an independent local run queue, cooperating through a
/// shared global injection queue and an I/O engine.
pub struct Scheduler {
    workers: Vec<Arc<Deque<RunQueueItem>>>,
    global: Arc<GlobalQueue<RunQueueItem>>,
    park: Arc<Park>,
    shutdown: Arc<AtomicBool>,
    active_tasks: Arc<AtomicUsize>,
    threads: Mutex<Vec<ThreadHandle<()>>>,
    ids: TaskIdAllocator,
    io: Arc<dyn IoBackend>,
    config: SchedulerConfig,
}

impl Scheduler {
    /// Start a scheduler with `config.resolved_workers()` worker threads
    /// and the auto-detected I/O engine (submission-ring, falling back to
    /// readiness-poll).
    pub fn new(config: SchedulerConfig) -> Arc<Self> {
        panic_plane::install_hook();

        let n = config.resolved_workers();
        let mut workers = Vec::with_capacity(n);
        for _ in 0..n {
            workers.push(Arc::new(Deque::new(config.deque_capacity)));
        }

        let io = io_engine::create(config.prefer_io_uring);

        let scheduler = Arc::new(Self {
            workers,
            global: Arc::new(GlobalQueue::new()),
            park: Arc::new(Park::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
            active_tasks: Arc::new(AtomicUsize::new(0)),
            threads: Mutex::new(Vec::with_capacity(n)),
            ids: TaskIdAllocator::new(),
            io,
            config,
        });

        let mut threads = Vec::with_capacity(n);
        for worker_id in 0..n {
            let sched = scheduler.clone();
            threads.push(
                std::thread::Builder::new()
                    .name(format!("vtask-worker-{worker_id}"))
                    .spawn(move || worker_entry(worker_id, sched))
                    .expect("failed to spawn vtask worker thread"),
            );
        }
        *scheduler.threads.lock().unwrap() = threads;
        kinfo!("scheduler started with {} workers", n);
        scheduler
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// The I/O engine backing this scheduler's I/O futures
    /// ([`crate::io::read`], [`crate::io::sleep`], etc).
    pub fn io(&self) -> Arc<dyn IoBackend> {
        self.io.clone()
    }

    /// Spawn a future as a new task, returning a handle to its eventual
    /// result.
    pub fn spawn<T, F>(self: &Arc<Self>, future: F) -> JoinHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        self.spawn_with_cancel(future, CancellationToken::new())
    }

    /// Spawn a future as a child of `parent`'s cancellation scope: cancelling
    /// `parent` also cancels this task.
    pub fn spawn_child<T, F>(self: &Arc<Self>, future: F, parent: &CancellationToken) -> JoinHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        self.spawn_with_cancel(future, parent.child())
    }

    fn spawn_with_cancel<T, F>(self: &Arc<Self>, future: F, cancel: CancellationToken) -> JoinHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        let id = self.ids.alloc();
        let (task, handle) = Task::spawn(id, future, cancel, self.clone());

        self.active_tasks.fetch_add(1, Ordering::SeqCst);
        let active_tasks = self.active_tasks.clone();
        let park = self.park.clone();
        task.push_cleanup(Box::new(move || {
            active_tasks.fetch_sub(1, Ordering::SeqCst);
            park.unpark_all();
        }));

        self.schedule(task as RunQueueItem);
        handle
    }

    /// Spawn a plain closure as a task: it resolves on its first poll and
    /// cannot suspend mid-body. Prefer [`Scheduler::spawn`] for anything
    /// that needs to await I/O, a timer, or a channel.
    pub fn spawn_fn<T, F>(self: &Arc<Self>, f: F) -> JoinHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        self.spawn(ClosureFuture { f: Some(f), _marker: std::marker::PhantomData })
    }

    /// Run `future` to completion on the calling thread, outside the
    /// worker pool. Useful for a program's `main` to bridge into the
    /// scheduler once and wait for the result.
    pub fn block_on<T, F>(self: &Arc<Self>, future: F) -> T
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        let handle = self.spawn(future);
        handle.join().unwrap_or_else(|e| panic!("block_on task failed: {e}"))
    }

    /// Signal every worker to stop once its run queue (and the global
    /// queue) drains, then join all worker threads. Blocks until every
    /// spawned-and-not-yet-complete task has finished or been cancelled.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.park.unpark_all();
        let threads = std::mem::take(&mut *self.threads.lock().unwrap());
        for t in threads {
            let _ = t.join();
        }
        kinfo!("scheduler shut down");
    }

    pub fn active_task_count(&self) -> usize {
        self.active_tasks.load(Ordering::Acquire)
    }
}

impl Schedule for Scheduler {
    /// Routes like `green.c`'s `sched_enqueue`: push onto the calling
    /// worker's own deque when called from inside the pool (the common
    /// case: a task waking itself, or spawning a child), otherwise push
    /// onto the global queue (an external spawn, or a full local deque).
    fn schedule(&self, task: RunQueueItem) {
        let routed = match tls::worker_id() {
            Some(idx) if idx < self.workers.len() => self.workers[idx].push(task),
            _ => Err(task),
        };
        if let Err(task) = routed {
            self.global.push(task);
        }
        self.park.unpark_all();
    }
}

struct ClosureFuture<F, T> {
    f: Option<F>,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<F, T> Future for ClosureFuture<F, T>
where
    F: FnOnce() -> T + Unpin,
{
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<T> {
        let f = self.f.take().expect("ClosureFuture polled after completion");
        Poll::Ready(f())
    }
}

fn worker_entry(id: usize, scheduler: Arc<Scheduler>) {
    tls::set_worker_id(id);
    vtask_core::kprint::set_worker_id(id as u32);
    let mut rng = XorShift32::seeded_for_worker(id);
    let mut idle_spins: u32 = 0;
    let peers = scheduler.workers.len();

    loop {
        if let Some(task) = scheduler.workers[id].pop() {
            run_one(task);
            idle_spins = 0;
            continue;
        }

        if peers > 1 {
            let victim = (rng.next() as usize) % peers;
            if victim != id {
                match scheduler.workers[victim].steal() {
                    Steal::Success(task) => {
                        run_one(task);
                        idle_spins = 0;
                        continue;
                    }
                    Steal::Retry => continue,
                    Steal::Empty => {}
                }
            }
        }

        if let Some(task) = scheduler.global.pop() {
            run_one(task);
            idle_spins = 0;
            continue;
        }

        if scheduler.io.poll(0) > 0 {
            idle_spins = 0;
            continue;
        }

        if scheduler.shutdown.load(Ordering::Acquire) && scheduler.active_tasks.load(Ordering::Acquire) == 0 {
            break;
        }

        idle_spins += 1;
        if idle_spins < scheduler.config.idle_spin_limit {
            std::thread::yield_now();
        } else {
            scheduler.park.park(scheduler.config.park_timeout);
        }
    }

    vtask_core::kprint::clear_worker_id();
}

fn run_one(task: RunQueueItem) {
    let id = task.id();
    tls::set_current_task(id);
    vtask_core::kprint::set_task_id(id.as_u32());
    tls::set_current_runnable(task.clone());

    task.run();

    tls::clear_current_runnable();
    tls::clear_current_task();
    vtask_core::kprint::clear_task_id();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn test_config() -> SchedulerConfig {
        let mut cfg = SchedulerConfig::default();
        cfg.workers = 2;
        cfg
    }

    #[test]
    fn test_spawn_and_join_returns_value() {
        let sched = Scheduler::new(test_config());
        let handle = sched.spawn(async { 1 + 1 });
        assert_eq!(handle.join().unwrap(), 2);
        sched.shutdown();
    }

    #[test]
    fn test_spawn_fn_resolves_immediately() {
        let sched = Scheduler::new(test_config());
        let handle = sched.spawn_fn(|| 42);
        assert_eq!(handle.join().unwrap(), 42);
        sched.shutdown();
    }

    #[test]
    fn test_many_tasks_all_complete() {
        let sched = Scheduler::new(test_config());
        let counter = Arc::new(AtomicU32::new(0));
        let mut handles = Vec::new();
        for _ in 0..500 {
            let counter = counter.clone();
            handles.push(sched.spawn(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 500);
        sched.shutdown();
    }

    #[test]
    fn test_task_can_yield_and_resume() {
        let sched = Scheduler::new(test_config());
        let handle = sched.spawn(async {
            crate::io::yield_now().await;
            crate::io::yield_now().await;
            7
        });
        assert_eq!(handle.join().unwrap(), 7);
        sched.shutdown();
    }

    #[test]
    fn test_cancelled_task_join_returns_cancelled_error() {
        let sched = Scheduler::new(test_config());
        // A task that keeps re-polling itself (unlike `future::pending()`,
        // which never wakes) so it gets a chance to observe cancellation.
        let handle: JoinHandle<()> = sched.spawn(async {
            loop {
                crate::io::yield_now().await;
            }
        });
        match handle.cancel() {
            Err(vtask_core::TaskError::Cancelled) => {}
            other => panic!("expected Cancelled, got {:?}", other.is_err()),
        }
        sched.shutdown();
    }

    #[test]
    fn test_block_on_drives_future_to_completion() {
        let sched = Scheduler::new(test_config());
        let result = sched.block_on(async { 99 });
        assert_eq!(result, 99);
        sched.shutdown();
    }

    #[test]
    fn test_cancellation_runs_cleanup_hooks_lifo() {
        let sched = Scheduler::new(test_config());
        let order = Arc::new(Mutex::new(Vec::new()));
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<()>();

        let handle: JoinHandle<()> = sched.spawn({
            let order = order.clone();
            async move {
                for label in ["H1", "H2", "H3"] {
                    let order = order.clone();
                    crate::task::push_cleanup(move || order.lock().unwrap().push(label));
                }
                let _ = ready_tx.send(());
                loop {
                    crate::io::yield_now().await;
                }
            }
        });

        // Wait for the task's first poll (where it registers its hooks)
        // before requesting cancellation, so the race between "cancelled
        // before ever polled" and "cancelled mid-loop" doesn't matter here.
        ready_rx.recv().unwrap();
        match handle.cancel() {
            Err(vtask_core::TaskError::Cancelled) => {}
            other => panic!("expected Cancelled, got {:?}", other.is_err()),
        }
        assert_eq!(*order.lock().unwrap(), vec!["H3", "H2", "H1"]);
        sched.shutdown();
    }

    #[test]
    fn test_fan_out_fan_in_sum() {
        // 8 senders each push [1..1000] into one receiver; drain until all
        // senders dropped. Expected sum 8 * 500500 = 4004000.
        let sched = Scheduler::new(test_config());
        let (tx, rx) = vtask_core::channel::<i64>(64);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let tx = tx.clone();
            handles.push(sched.spawn_fn(move || {
                for i in 1..=1000i64 {
                    tx.send(i).unwrap();
                }
            }));
        }
        drop(tx);

        let mut sum = 0i64;
        loop {
            match rx.recv() {
                Ok(v) => sum += v,
                Err(_) => break,
            }
        }

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(sum, 8 * 500_500);
        assert_eq!(sched.active_task_count(), 0);
        sched.shutdown();
    }
}
