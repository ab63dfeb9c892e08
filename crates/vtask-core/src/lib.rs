//! # vtask-core
//!
//! Platform-agnostic types used by the vtask task runtime.
//!
//! This crate contains no scheduling logic and no OS-specific code; the
//! work-stealing scheduler and I/O backends live in `vtask-runtime`.
//!
//! ## Modules
//!
//! - `id` - task identifier type
//! - `state` - task lifecycle state
//! - `cancel` - cooperative cancellation token
//! - `channel` - buffered and rendezvous channels
//! - `mutex` - closure-invocation mutex / shared-data lock
//! - `pool` - generational handle pool
//! - `error` - error types
//! - `spinlock` - internal spinlock primitive
//! - `kprint` - kernel-style debug printing macros
//! - `env` - environment variable utilities
//! - `io` - abstract I/O engine capability set (`IoBackend`)

#![allow(dead_code)]

pub mod id;
pub mod state;
pub mod channel;
pub mod mutex;
pub mod cancel;
pub mod pool;
pub mod error;
pub mod spinlock;
pub mod kprint;
pub mod env;
pub mod io;

pub use id::{TaskId, TaskIdAllocator};
pub use state::TaskState;
pub use channel::{channel, rendezvous, Sender, Receiver};
pub use mutex::{DataMutex, SharedData};
pub use cancel::CancellationToken;
pub use pool::{Handle, Pool};
pub use error::{TaskError, TaskResult, TryRecvError, TrySendError};
pub use spinlock::SpinLock;
pub use env::{env_get, env_get_bool, env_get_opt, env_get_str, env_is_set};
pub use io::{IoBackend, IoCallback};

/// Runtime-wide constants.
pub mod constants {
    /// Maximum number of worker threads the scheduler will spawn.
    pub const MAX_WORKERS: usize = 64;

    /// Capacity of each worker's local Chase-Lev deque.
    pub const DEQUE_CAPACITY: usize = 1024;

    /// Cache line size, used to pad hot atomics against false sharing.
    pub const CACHE_LINE_SIZE: usize = 64;

    /// Consecutive `sched_yield`-equivalent spins a worker performs before
    /// parking on its condition variable.
    pub const IDLE_SPIN_LIMIT: u32 = 64;

    /// Timeout used when a worker parks waiting for new work.
    pub const PARK_TIMEOUT: core::time::Duration = core::time::Duration::from_millis(1);
}
