//! Abstract I/O engine capability set
//!
//! `vtask-core` only defines the *shape* of an I/O backend — the concrete
//! submission-ring (`io_uring`) and readiness-poll (`epoll`) engines live in
//! `vtask-runtime`, which depends on this crate rather than the other way
//! around. Keeping the trait here lets task-facing code (and tests) refer to
//! `IoBackend` without pulling in either platform backend.
//!
//! Every submit call takes a one-shot completion callback plus an opaque
//! `user_data` tag, mirroring the C ABI this runtime is modeled on
//! (`rask_io_cb`, `void *ud`): the callback is invoked at most once, with
//! `result` (bytes transferred / accepted fd / 0 for a timer) and `err` (0 on
//! success, a POSIX errno otherwise). Callbacks must be safe to invoke from
//! any worker thread and must not assume the engine's internal lock is held
//! — in fact backends must guarantee it is *not* held, so a callback is free
//! to submit further operations without deadlocking.

use std::os::raw::c_int;

/// A one-shot I/O completion callback. Invoked exactly once, from whichever
/// thread reaps the completion — never while the engine holds its internal
/// lock.
pub type IoCallback = Box<dyn FnOnce(i64, c_int) + Send>;

/// Capability set the scheduler (or any other caller) needs from an I/O
/// engine. Both backends in `vtask-runtime` (`UringEngine`, `EpollEngine`)
/// implement this identically from the caller's point of view — either one
/// can back a given `Scheduler` without the rest of the runtime noticing.
pub trait IoBackend: Send + Sync {
    /// Submit a read. `buf` must stay valid until `cb` fires.
    ///
    /// # Safety
    /// `buf` must point to at least `len` writable bytes that remain valid
    /// (not moved, not freed) until the callback fires.
    unsafe fn submit_read(&self, fd: c_int, buf: *mut u8, len: usize, cb: IoCallback);

    /// Submit a write. `buf` must stay valid until `cb` fires.
    ///
    /// # Safety
    /// `buf` must point to at least `len` readable bytes that remain valid
    /// until the callback fires.
    unsafe fn submit_write(&self, fd: c_int, buf: *const u8, len: usize, cb: IoCallback);

    /// Submit an accept on a listening socket. `result` on completion is the
    /// newly accepted descriptor.
    fn submit_accept(&self, listen_fd: c_int, cb: IoCallback);

    /// Submit a timer. `result` on completion is always `0`.
    fn submit_timeout(&self, nanos: u64, cb: IoCallback);

    /// Drive completions. `timeout_ms == 0` is a non-blocking peek,
    /// `timeout_ms < 0` blocks until at least one completion is available,
    /// positive values bound the wait. Returns the number of completions
    /// dispatched.
    fn poll(&self, timeout_ms: i64) -> usize;

    /// Number of operations submitted but not yet completed.
    fn pending(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// A trivial in-memory `IoBackend` used only to exercise the trait
    /// object boundary (the real backends are tested in `vtask-runtime`,
    /// which is the only crate linking against `io_uring`/`nix`).
    struct Inert;

    impl IoBackend for Inert {
        unsafe fn submit_read(&self, _fd: c_int, _buf: *mut u8, _len: usize, cb: IoCallback) {
            cb(0, 0);
        }
        unsafe fn submit_write(&self, _fd: c_int, _buf: *const u8, _len: usize, cb: IoCallback) {
            cb(0, 0);
        }
        fn submit_accept(&self, _listen_fd: c_int, cb: IoCallback) {
            cb(-1, libc_enosys());
        }
        fn submit_timeout(&self, _nanos: u64, cb: IoCallback) {
            cb(0, 0);
        }
        fn poll(&self, _timeout_ms: i64) -> usize {
            0
        }
        fn pending(&self) -> usize {
            0
        }
    }

    fn libc_enosys() -> c_int {
        38
    }

    #[test]
    fn test_trait_object_dispatch() {
        let engine: Arc<dyn IoBackend> = Arc::new(Inert);
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        engine.submit_timeout(
            0,
            Box::new(move |result, err| {
                assert_eq!(result, 0);
                assert_eq!(err, 0);
                fired2.store(true, Ordering::SeqCst);
            }),
        );
        assert!(fired.load(Ordering::SeqCst));
    }
}
