//! `Future` adapters over `IoBackend`.
//!
//! Each future submits its operation on first poll and stores the result in
//! a small shared cell the completion callback writes into — the callback
//! may run on any worker thread (whichever one reaps the completion), so
//! the cell is the synchronization point between that thread and whichever
//! thread is polling the future.

use std::future::Future;
use std::os::raw::c_int;
use std::os::unix::io::RawFd;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use vtask_core::io::{IoBackend, IoCallback};

struct CompletionInner {
    result: Option<(i64, c_int)>,
    waker: Option<Waker>,
}

/// Shared between a submitted future and the callback that resolves it.
struct Completion {
    inner: Mutex<CompletionInner>,
}

impl Completion {
    fn new() -> Arc<Self> {
        Arc::new(Self { inner: Mutex::new(CompletionInner { result: None, waker: None }) })
    }

    fn callback(self: &Arc<Self>) -> IoCallback {
        let this = self.clone();
        Box::new(move |result, err| {
            let mut inner = this.inner.lock().unwrap();
            inner.result = Some((result, err));
            if let Some(waker) = inner.waker.take() {
                waker.wake();
            }
        })
    }

    fn poll(&self, cx: &mut Context<'_>) -> Poll<(i64, c_int)> {
        let mut inner = self.inner.lock().unwrap();
        match inner.result {
            Some(r) => Poll::Ready(r),
            None => {
                inner.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

fn result_to_io(result: i64, err: c_int) -> std::io::Result<usize> {
    if err != 0 {
        Err(std::io::Error::from_raw_os_error(err))
    } else {
        Ok(result as usize)
    }
}

/// Future produced by [`read`]. `buf` is referenced, not copied, and must
/// stay alive (it does — the reference keeps it alive) for the future's
/// whole lifetime.
pub struct ReadFuture<'a> {
    engine: Arc<dyn IoBackend>,
    fd: RawFd,
    buf: &'a mut [u8],
    completion: Arc<Completion>,
    submitted: bool,
}

impl Future for ReadFuture<'_> {
    type Output = std::io::Result<usize>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if !this.submitted {
            this.submitted = true;
            let cb = this.completion.callback();
            // Safety: `buf` outlives the completion (it's borrowed for the
            // future's whole lifetime, and the future isn't dropped while
            // the operation is outstanding without also cancelling it at
            // the scheduler level).
            unsafe { this.engine.submit_read(this.fd, this.buf.as_mut_ptr(), this.buf.len(), cb) };
        }
        this.completion.poll(cx).map(|(result, err)| result_to_io(result, err))
    }
}

/// Submit a read on `fd` into `buf`, suspending the calling task until it
/// completes.
pub fn read<'a>(engine: Arc<dyn IoBackend>, fd: RawFd, buf: &'a mut [u8]) -> ReadFuture<'a> {
    ReadFuture { engine, fd, buf, completion: Completion::new(), submitted: false }
}

/// Future produced by [`write`].
pub struct WriteFuture<'a> {
    engine: Arc<dyn IoBackend>,
    fd: RawFd,
    buf: &'a [u8],
    completion: Arc<Completion>,
    submitted: bool,
}

impl Future for WriteFuture<'_> {
    type Output = std::io::Result<usize>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if !this.submitted {
            this.submitted = true;
            let cb = this.completion.callback();
            unsafe { this.engine.submit_write(this.fd, this.buf.as_ptr(), this.buf.len(), cb) };
        }
        this.completion.poll(cx).map(|(result, err)| result_to_io(result, err))
    }
}

/// Submit a write of `buf` to `fd`, suspending the calling task until it
/// completes.
pub fn write<'a>(engine: Arc<dyn IoBackend>, fd: RawFd, buf: &'a [u8]) -> WriteFuture<'a> {
    WriteFuture { engine, fd, buf, completion: Completion::new(), submitted: false }
}

/// Future produced by [`accept`]. Resolves to the accepted connection's fd.
pub struct AcceptFuture {
    engine: Arc<dyn IoBackend>,
    listen_fd: RawFd,
    completion: Arc<Completion>,
    submitted: bool,
}

impl Future for AcceptFuture {
    type Output = std::io::Result<RawFd>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if !this.submitted {
            this.submitted = true;
            let cb = this.completion.callback();
            this.engine.submit_accept(this.listen_fd, cb);
        }
        this.completion.poll(cx).map(|(result, err)| {
            if err != 0 {
                Err(std::io::Error::from_raw_os_error(err))
            } else {
                Ok(result as RawFd)
            }
        })
    }
}

/// Accept a connection on `listen_fd`, suspending the calling task until
/// one arrives.
pub fn accept(engine: Arc<dyn IoBackend>, listen_fd: RawFd) -> AcceptFuture {
    AcceptFuture { engine, listen_fd, completion: Completion::new(), submitted: false }
}

/// Future produced by [`sleep`].
pub struct Sleep {
    engine: Arc<dyn IoBackend>,
    nanos: u64,
    completion: Arc<Completion>,
    submitted: bool,
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if !this.submitted {
            this.submitted = true;
            let cb = this.completion.callback();
            this.engine.submit_timeout(this.nanos, cb);
        }
        this.completion.poll(cx).map(|_| ())
    }
}

/// Suspend the calling task for at least `duration`, driven by the I/O
/// engine's timer op rather than blocking the worker thread.
pub fn sleep(engine: Arc<dyn IoBackend>, duration: std::time::Duration) -> Sleep {
    Sleep {
        engine,
        nanos: duration.as_nanos().min(u64::MAX as u128) as u64,
        completion: Completion::new(),
        submitted: false,
    }
}

/// Yields once to the scheduler, giving other runnable tasks a chance to
/// run before this task continues. Unlike [`sleep`] this never touches the
/// I/O engine — it re-enqueues via the waker alone.
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}
