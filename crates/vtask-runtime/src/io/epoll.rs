//! Readiness-poll (`epoll`) I/O engine backend — used when `io_uring`
//! setup fails, or the crate is built without the `io-uring` feature.
//!
//! Fds are set non-blocking and the operation is tried immediately; only on
//! `EAGAIN`/`EWOULDBLOCK` does it get registered with epoll (`EPOLLONESHOT`,
//! re-armed per attempt rather than left level-triggered). Timeouts use a
//! `BinaryHeap` ordered by deadline rather than an intrusive linked list.

use std::collections::HashMap;
use std::collections::BinaryHeap;
use std::os::fd::BorrowedFd;
use std::os::raw::c_int;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};

use vtask_core::io::{IoBackend, IoCallback};
use vtask_core::kdebug;

const MAX_EVENTS: usize = 64;

enum OpKind {
    Read { buf: *mut u8, len: usize },
    Write { buf: *const u8, len: usize },
    Accept,
}

// SAFETY: the pointers inside `OpKind` are only ever dereferenced on the
// thread that calls `poll`, and the caller of `submit_read`/`submit_write`
// already promises (per `IoBackend`'s safety contract) that the buffer
// stays valid until the callback fires.
unsafe impl Send for OpKind {}

struct PendingOp {
    kind: OpKind,
    fd: RawFd,
    cb: IoCallback,
}

/// Min-heap entry ordered by deadline, ties broken by insertion sequence
/// so same-deadline timers fire in submission order.
struct TimerOp {
    deadline: Instant,
    seq: u64,
    cb: IoCallback,
}

impl PartialEq for TimerOp {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}
impl Eq for TimerOp {}
impl PartialOrd for TimerOp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for TimerOp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reversed so `BinaryHeap` (a max-heap) pops the earliest deadline.
        match other.deadline.cmp(&self.deadline) {
            std::cmp::Ordering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }
}

struct Inner {
    fd_ops: HashMap<RawFd, PendingOp>,
    timers: BinaryHeap<TimerOp>,
}

/// The fallback I/O engine backend. See module docs.
pub struct EpollEngine {
    epoll: Epoll,
    inner: Mutex<Inner>,
    pending: AtomicUsize,
    timer_seq: AtomicU64,
}

fn set_nonblocking(fd: RawFd) -> nix::Result<()> {
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    let flags = fcntl(borrowed, FcntlArg::F_GETFL)?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(borrowed, FcntlArg::F_SETFL(flags))?;
    Ok(())
}

fn would_block(e: Errno) -> bool {
    e == Errno::EAGAIN || e == Errno::EWOULDBLOCK
}

impl EpollEngine {
    pub fn try_new() -> Option<Self> {
        match Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC) {
            Ok(epoll) => Some(Self {
                epoll,
                inner: Mutex::new(Inner { fd_ops: HashMap::new(), timers: BinaryHeap::new() }),
                pending: AtomicUsize::new(0),
                timer_seq: AtomicU64::new(0),
            }),
            Err(e) => {
                kdebug!("epoll_create1 failed: {}", e);
                None
            }
        }
    }

    fn register(&self, fd: RawFd, events: EpollFlags) {
        let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
        let mut ev = EpollEvent::new(events | EpollFlags::EPOLLONESHOT, fd as u64);
        if self.epoll.add(borrowed, ev).is_err() {
            // Already registered from a previous attempt on this fd; rearm.
            let _ = self.epoll.modify(borrowed, &mut ev);
        }
    }

    fn queue_fd_op(&self, fd: RawFd, op: PendingOp, events: EpollFlags) {
        let mut inner = self.inner.lock().unwrap();
        inner.fd_ops.insert(fd, op);
        self.register(fd, events);
        self.pending.fetch_add(1, Ordering::Relaxed);
    }

    fn retry(op: PendingOp) {
        match op.kind {
            OpKind::Read { buf, len } => {
                let res = unsafe { libc::read(op.fd, buf as *mut libc::c_void, len) };
                if res >= 0 {
                    (op.cb)(res as i64, 0);
                } else {
                    (op.cb)(-1, std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO));
                }
            }
            OpKind::Write { buf, len } => {
                let res = unsafe { libc::write(op.fd, buf as *const libc::c_void, len) };
                if res >= 0 {
                    (op.cb)(res as i64, 0);
                } else {
                    (op.cb)(-1, std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO));
                }
            }
            OpKind::Accept => {
                let client = unsafe {
                    libc::accept4(
                        op.fd,
                        std::ptr::null_mut(),
                        std::ptr::null_mut(),
                        libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                    )
                };
                if client >= 0 {
                    (op.cb)(client as i64, 0);
                } else {
                    (op.cb)(-1, std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO));
                }
            }
        }
    }
}

impl IoBackend for EpollEngine {
    unsafe fn submit_read(&self, fd: c_int, buf: *mut u8, len: usize, cb: IoCallback) {
        let _ = set_nonblocking(fd);
        let res = libc::read(fd, buf as *mut libc::c_void, len);
        if res >= 0 {
            return cb(res as i64, 0);
        }
        let errno = Errno::last();
        if !would_block(errno) {
            return cb(-1, errno as c_int);
        }
        self.queue_fd_op(fd, PendingOp { kind: OpKind::Read { buf, len }, fd, cb }, EpollFlags::EPOLLIN);
    }

    unsafe fn submit_write(&self, fd: c_int, buf: *const u8, len: usize, cb: IoCallback) {
        let _ = set_nonblocking(fd);
        let res = libc::write(fd, buf as *const libc::c_void, len);
        if res >= 0 {
            return cb(res as i64, 0);
        }
        let errno = Errno::last();
        if !would_block(errno) {
            return cb(-1, errno as c_int);
        }
        self.queue_fd_op(fd, PendingOp { kind: OpKind::Write { buf, len }, fd, cb }, EpollFlags::EPOLLOUT);
    }

    fn submit_accept(&self, listen_fd: c_int, cb: IoCallback) {
        let _ = set_nonblocking(listen_fd);
        let client = unsafe {
            libc::accept4(
                listen_fd,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
            )
        };
        if client >= 0 {
            return cb(client as i64, 0);
        }
        let errno = Errno::last();
        if !would_block(errno) {
            return cb(-1, errno as c_int);
        }
        self.queue_fd_op(listen_fd, PendingOp { kind: OpKind::Accept, fd: listen_fd, cb }, EpollFlags::EPOLLIN);
    }

    fn submit_timeout(&self, nanos: u64, cb: IoCallback) {
        let deadline = Instant::now() + Duration::from_nanos(nanos);
        let seq = self.timer_seq.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock().unwrap();
        inner.timers.push(TimerOp { deadline, seq, cb });
        self.pending.fetch_add(1, Ordering::Relaxed);
    }

    fn poll(&self, timeout_ms: i64) -> usize {
        let mut fired = 0usize;

        // Expired timers first, same as the C original's pre-wait sweep.
        let mut due = Vec::new();
        let epoll_timeout_ms = {
            let mut inner = self.inner.lock().unwrap();
            let now = Instant::now();
            while matches!(inner.timers.peek(), Some(t) if t.deadline <= now) {
                due.push(inner.timers.pop().unwrap());
            }
            let bound = match inner.timers.peek() {
                Some(t) => {
                    let until = t.deadline.saturating_duration_since(now).as_millis() as i64;
                    if timeout_ms < 0 { until } else { timeout_ms.min(until) }
                }
                None => timeout_ms,
            };
            self.pending.fetch_sub(due.len(), Ordering::Relaxed);
            bound
        };
        for t in due {
            (t.cb)(0, 0);
            fired += 1;
        }
        if fired > 0 && timeout_ms == 0 {
            return fired;
        }

        let mut events = [EpollEvent::empty(); MAX_EVENTS];
        let nfds = match self.epoll.wait(&mut events, to_epoll_timeout(epoll_timeout_ms)) {
            Ok(n) => n,
            Err(_) => 0,
        };

        let mut ready = Vec::with_capacity(nfds);
        {
            let mut inner = self.inner.lock().unwrap();
            for ev in &events[..nfds] {
                let fd = ev.data() as RawFd;
                if let Some(op) = inner.fd_ops.remove(&fd) {
                    let _ = self.epoll.delete(unsafe { BorrowedFd::borrow_raw(fd) });
                    ready.push(op);
                }
            }
            self.pending.fetch_sub(ready.len(), Ordering::Relaxed);
        }
        fired += ready.len();
        for op in ready {
            Self::retry(op);
        }

        // epoll_wait may have taken a while; sweep again (C original does
        // the same second pass).
        let mut due = Vec::new();
        {
            let mut inner = self.inner.lock().unwrap();
            let now = Instant::now();
            while matches!(inner.timers.peek(), Some(t) if t.deadline <= now) {
                due.push(inner.timers.pop().unwrap());
            }
            self.pending.fetch_sub(due.len(), Ordering::Relaxed);
        }
        fired += due.len();
        for t in due {
            (t.cb)(0, 0);
        }

        fired
    }

    fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }
}

fn to_epoll_timeout(ms: i64) -> EpollTimeout {
    if ms < 0 {
        EpollTimeout::NONE
    } else {
        EpollTimeout::try_from(ms.min(i32::MAX as i64) as i32).unwrap_or(EpollTimeout::NONE)
    }
}

unsafe impl Send for EpollEngine {}
unsafe impl Sync for EpollEngine {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[test]
    fn test_try_new_succeeds_on_linux() {
        assert!(EpollEngine::try_new().is_some());
    }

    #[test]
    fn test_timeout_fires_without_any_fd_registered() {
        let engine = EpollEngine::try_new().unwrap();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        engine.submit_timeout(0, Box::new(move |result, err| {
            assert_eq!(result, 0);
            assert_eq!(err, 0);
            fired2.store(true, Ordering::SeqCst);
        }));
        assert_eq!(engine.pending(), 1);
        let n = engine.poll(50);
        assert_eq!(n, 1);
        assert!(fired.load(Ordering::SeqCst));
        assert_eq!(engine.pending(), 0);
    }

    #[test]
    fn test_read_from_pipe_fast_path_completes_without_polling() {
        let (r, w) = nix::unistd::pipe().unwrap();
        use std::os::fd::IntoRawFd;
        let rfd = r.into_raw_fd();
        let wfd = w.into_raw_fd();
        unsafe {
            libc::write(wfd, b"x".as_ptr() as *const libc::c_void, 1);
        }
        let mut buf = [0u8; 1];
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        unsafe {
            EpollEngine::try_new().unwrap().submit_read(
                rfd,
                buf.as_mut_ptr(),
                1,
                Box::new(move |result, err| {
                    assert_eq!(result, 1);
                    assert_eq!(err, 0);
                    fired2.store(true, Ordering::SeqCst);
                }),
            );
        }
        assert!(fired.load(Ordering::SeqCst));
        unsafe {
            libc::close(rfd);
            libc::close(wfd);
        }
    }

    #[test]
    fn test_read_pipe_after_write_delivers_completion() {
        // Submit a read on a pipe, then write "hello" into the other end;
        // expect the staging slot to observe result = 5.
        let (r, w) = nix::unistd::pipe().unwrap();
        use std::os::fd::IntoRawFd;
        let rfd = r.into_raw_fd();
        let wfd = w.into_raw_fd();
        let engine = EpollEngine::try_new().unwrap();

        let mut buf = [0u8; 5];
        let result = Arc::new(Mutex::new(None));
        let result2 = result.clone();
        unsafe {
            engine.submit_read(
                rfd,
                buf.as_mut_ptr(),
                5,
                Box::new(move |n, err| {
                    *result2.lock().unwrap() = Some((n, err));
                }),
            );
        }
        assert_eq!(engine.pending(), 1);

        unsafe {
            libc::write(wfd, b"hello".as_ptr() as *const libc::c_void, 5);
        }
        assert_eq!(engine.poll(100), 1);
        assert_eq!(*result.lock().unwrap(), Some((5, 0)));

        unsafe {
            libc::close(rfd);
            libc::close(wfd);
        }
    }

    #[test]
    fn test_timer_ordering_fires_by_deadline_not_submission_order() {
        // Submit deadlines 10ms, 30ms, 20ms in that order; expect callback
        // order 10ms, 20ms, 30ms regardless of submission order.
        let engine = EpollEngine::try_new().unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        for (label, ms) in [("10ms", 10u64), ("30ms", 30u64), ("20ms", 20u64)] {
            let order = order.clone();
            engine.submit_timeout(ms * 1_000_000, Box::new(move |_, _| {
                order.lock().unwrap().push(label);
            }));
        }

        let deadline = Instant::now() + Duration::from_millis(500);
        while order.lock().unwrap().len() < 3 && Instant::now() < deadline {
            engine.poll(50);
        }

        assert_eq!(*order.lock().unwrap(), vec!["10ms", "20ms", "30ms"]);
    }
}
