//! Completion-based asynchronous I/O engine.
//!
//! Two interchangeable backends live here: [`uring::UringEngine`] (the
//! preferred submission-ring backend) and [`epoll::EpollEngine`] (the
//! readiness-poll fallback). [`create`] auto-detects which one to use: try
//! the submission ring, fall back to epoll if setup fails for any reason.
//!
//! Both backends are Linux-only (`io_uring` and `epoll` are Linux kernel
//! interfaces with no portable equivalent); the crate has no I/O engine on
//! other targets.

use std::sync::Arc;

use vtask_core::io::IoBackend;

pub use futures::{accept, read, sleep, write, yield_now, AcceptFuture, ReadFuture, Sleep, WriteFuture, YieldNow};

mod futures;

#[cfg(all(target_os = "linux", feature = "io-uring"))]
pub mod uring;

#[cfg(target_os = "linux")]
pub mod epoll;

/// Construct the best available I/O engine: the submission-ring backend if
/// the crate was built with the `io-uring` feature and the running kernel
/// supports it, the readiness-poll backend otherwise.
#[cfg(target_os = "linux")]
pub fn create(prefer_io_uring: bool) -> Arc<dyn IoBackend> {
    cfg_if::cfg_if! {
        if #[cfg(feature = "io-uring")] {
            if prefer_io_uring {
                if let Some(engine) = uring::UringEngine::try_new() {
                    return Arc::new(engine);
                }
            }
        }
    }
    match epoll::EpollEngine::try_new() {
        Some(engine) => Arc::new(engine),
        None => panic!("vtask: failed to initialize both io_uring and epoll I/O backends"),
    }
}

#[cfg(not(target_os = "linux"))]
pub fn create(_prefer_io_uring: bool) -> Arc<dyn IoBackend> {
    panic!("vtask: no I/O engine backend available on this platform (Linux only)")
}
