//! Scheduler configuration
//!
//! `SchedulerConfig::from_env()` reads the same `VTASK_*` variables that
//! `vtask_core::env` already knows how to parse, with `VTASK_WORKERS=0`
//! (the default) meaning "use the number of available CPUs".

use std::time::Duration;
use vtask_core::env::{env_get, env_get_bool};

/// Tunables for a `Scheduler`. Build one with `SchedulerConfig::from_env()`
/// or `SchedulerConfig::default()` and override fields before calling
/// `Scheduler::new`.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of worker OS threads. `0` means "detect from
    /// `std::thread::available_parallelism`".
    pub workers: usize,
    /// Timeout used for blocking join calls when the caller doesn't
    /// specify one.
    pub join_timeout: Duration,
    /// Capacity of each worker's local Chase-Lev deque.
    pub deque_capacity: usize,
    /// Consecutive failed steal rounds before a worker parks.
    pub idle_spin_limit: u32,
    /// How long a parked worker waits before checking the global queue
    /// again even without being woken.
    pub park_timeout: Duration,
    /// Prefer the io_uring I/O backend when available (Linux only; has
    /// no effect when the crate is built without the `io-uring` feature
    /// or on non-Linux targets).
    pub prefer_io_uring: bool,
    /// Emit verbose per-task scheduling logs via the `kprint` machinery.
    pub debug_logging: bool,
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.workers = env_get("VTASK_WORKERS", cfg.workers);
        let timeout_ms: u64 = env_get("VTASK_TIMEOUT_MS", cfg.join_timeout.as_millis() as u64);
        cfg.join_timeout = Duration::from_millis(timeout_ms);
        cfg.prefer_io_uring = env_get_bool("VTASK_IO_URING", cfg.prefer_io_uring);
        cfg.debug_logging = env_get_bool("VTASK_DEBUG", cfg.debug_logging);
        cfg
    }

    /// Resolve `workers == 0` to the detected parallelism, clamped to
    /// `vtask_core::constants::MAX_WORKERS`.
    pub fn resolved_workers(&self) -> usize {
        let n = if self.workers == 0 {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        } else {
            self.workers
        };
        n.min(vtask_core::constants::MAX_WORKERS)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            join_timeout: Duration::from_secs(30),
            deque_capacity: vtask_core::constants::DEQUE_CAPACITY,
            idle_spin_limit: vtask_core::constants::IDLE_SPIN_LIMIT,
            park_timeout: vtask_core::constants::PARK_TIMEOUT,
            prefer_io_uring: true,
            debug_logging: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_workers_resolve_to_parallelism() {
        let cfg = SchedulerConfig::default();
        assert!(cfg.resolved_workers() >= 1);
    }

    #[test]
    fn test_explicit_worker_count_is_respected() {
        let mut cfg = SchedulerConfig::default();
        cfg.workers = 3;
        assert_eq!(cfg.resolved_workers(), 3);
    }

    #[test]
    fn test_worker_count_clamped_to_max() {
        let mut cfg = SchedulerConfig::default();
        cfg.workers = 10_000;
        assert_eq!(cfg.resolved_workers(), vtask_core::constants::MAX_WORKERS);
    }

    #[test]
    fn test_from_env_picks_up_timeout_override() {
        std::env::set_var("VTASK_TIMEOUT_MS", "500");
        let cfg = SchedulerConfig::from_env();
        assert_eq!(cfg.join_timeout, Duration::from_millis(500));
        std::env::remove_var("VTASK_TIMEOUT_MS");
    }
}
