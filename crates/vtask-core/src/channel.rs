//! Bounded and rendezvous channels
//!
//! `channel(capacity)` creates a **buffered** channel holding up to
//! `capacity` items; `rendezvous()` (capacity 0) creates a **rendezvous**
//! channel where a send only completes once a receiver has actually taken
//! the value — there is no intermediate buffering. Both share a mutex plus
//! a pair of condition variables (`not_full`/`not_empty`) rather than
//! building on an external MPMC crate: the condvar-pair-under-a-mutex
//! approach is what the rest of this codebase's synchronization
//! primitives already use.
//!
//! Status codes returned by the non-blocking variants follow the external
//! ABI convention used throughout this crate: `OK`, `CLOSED`, `FULL`,
//! `EMPTY` (see [`crate::error::TryRecvError`] / [`crate::error::TrySendError`]).

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use crate::error::{TaskError, TaskResult, TryRecvError, TrySendError};

/// Create a buffered channel with room for `capacity` in-flight items.
pub fn channel<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    build(Mode::Buffered(capacity))
}

/// Create a rendezvous channel: `send` blocks until a receiver has taken
/// the value (capacity zero, no buffering).
pub fn rendezvous<T>() -> (Sender<T>, Receiver<T>) {
    build(Mode::Rendezvous)
}

fn build<T>(mode: Mode) -> (Sender<T>, Receiver<T>) {
    let inner = Arc::new(Inner {
        mode,
        state: Mutex::new(State {
            buffer: VecDeque::new(),
            handoff: None,
            taken: false,
            waiting_receivers: 0,
            closed: false,
            senders: 1,
            receivers: 1,
        }),
        not_full: Condvar::new(),
        not_empty: Condvar::new(),
    });
    (Sender { inner: inner.clone() }, Receiver { inner })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Buffered(usize),
    Rendezvous,
}

struct State<T> {
    /// Ring buffer, used only in `Mode::Buffered`.
    buffer: VecDeque<T>,
    /// Single in-flight value, used only in `Mode::Rendezvous`.
    handoff: Option<T>,
    /// Set by the receiver once it has copied `handoff` out.
    taken: bool,
    /// Receivers currently parked in `recv()`'s wait loop (rendezvous
    /// mode only) — lets `try_send` tell whether a handoff can complete
    /// without itself blocking.
    waiting_receivers: usize,
    closed: bool,
    senders: usize,
    receivers: usize,
}

struct Inner<T> {
    mode: Mode,
    state: Mutex<State<T>>,
    not_full: Condvar,
    not_empty: Condvar,
}

pub struct Sender<T> {
    inner: Arc<Inner<T>>,
}

pub struct Receiver<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Sender<T> {
    /// Send a value, blocking the calling OS thread until there is room
    /// (buffered) or a receiver takes it (rendezvous), or the channel
    /// closes.
    ///
    /// Rendezvous close-race semantics: if the handoff completes (the
    /// receiver sets `taken`) before the last receiver drops, this returns
    /// `Ok(())` even though the channel may be observed as closed
    /// immediately afterward — the value was genuinely delivered.
    pub fn send(&self, value: T) -> TaskResult<()> {
        let mut guard = self.inner.state.lock().unwrap();
        match self.inner.mode {
            Mode::Buffered(capacity) => {
                loop {
                    if guard.closed {
                        return Err(TaskError::ChannelClosed);
                    }
                    if guard.buffer.len() < capacity {
                        guard.buffer.push_back(value);
                        self.inner.not_empty.notify_one();
                        return Ok(());
                    }
                    guard = self.inner.not_full.wait(guard).unwrap();
                }
            }
            Mode::Rendezvous => {
                // Wait for any prior pending handoff to clear.
                while guard.handoff.is_some() && !guard.closed {
                    guard = self.inner.not_full.wait(guard).unwrap();
                }
                if guard.closed {
                    return Err(TaskError::ChannelClosed);
                }
                guard.handoff = Some(value);
                guard.taken = false;
                self.inner.not_empty.notify_one();

                while !guard.taken && !guard.closed {
                    guard = self.inner.not_full.wait(guard).unwrap();
                }
                if guard.taken {
                    Ok(())
                } else {
                    Err(TaskError::ChannelClosed)
                }
            }
        }
    }

    /// Attempt to send without blocking.
    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        let mut guard = self.inner.state.lock().unwrap();
        if guard.closed {
            return Err(TrySendError(value));
        }
        match self.inner.mode {
            Mode::Buffered(capacity) => {
                if guard.buffer.len() < capacity {
                    guard.buffer.push_back(value);
                    self.inner.not_empty.notify_one();
                    Ok(())
                } else {
                    Err(TrySendError(value))
                }
            }
            Mode::Rendezvous => {
                // Only succeeds if a receiver is already parked in
                // `recv()` waiting for a value — otherwise there is no
                // way to hand the value off without blocking.
                if guard.handoff.is_some() || guard.waiting_receivers == 0 {
                    return Err(TrySendError(value));
                }
                guard.handoff = Some(value);
                guard.taken = false;
                self.inner.not_empty.notify_one();
                Ok(())
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().unwrap().closed
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().unwrap().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Receiver<T> {
    /// Receive a value, blocking the calling OS thread until one is
    /// available or the channel closes with nothing left to deliver.
    pub fn recv(&self) -> TaskResult<T> {
        let mut guard = self.inner.state.lock().unwrap();
        match self.inner.mode {
            Mode::Buffered(_) => loop {
                if let Some(value) = guard.buffer.pop_front() {
                    self.inner.not_full.notify_one();
                    return Ok(value);
                }
                if guard.closed {
                    return Err(TaskError::ChannelClosed);
                }
                guard = self.inner.not_empty.wait(guard).unwrap();
            },
            Mode::Rendezvous => loop {
                if guard.handoff.is_some() {
                    let value = guard.handoff.take().unwrap();
                    guard.taken = true;
                    self.inner.not_full.notify_one();
                    return Ok(value);
                }
                if guard.closed {
                    return Err(TaskError::ChannelClosed);
                }
                guard.waiting_receivers += 1;
                guard = self.inner.not_empty.wait(guard).unwrap();
                guard.waiting_receivers -= 1;
            },
        }
    }

    /// Attempt to receive without blocking.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        let mut guard = self.inner.state.lock().unwrap();
        match self.inner.mode {
            Mode::Buffered(_) => {
                if let Some(value) = guard.buffer.pop_front() {
                    self.inner.not_full.notify_one();
                    Ok(value)
                } else if guard.closed {
                    Err(TryRecvError::Closed)
                } else {
                    Err(TryRecvError::Empty)
                }
            }
            Mode::Rendezvous => {
                if guard.handoff.is_some() {
                    let value = guard.handoff.take().unwrap();
                    guard.taken = true;
                    self.inner.not_full.notify_one();
                    Ok(value)
                } else if guard.closed {
                    Err(TryRecvError::Closed)
                } else {
                    Err(TryRecvError::Empty)
                }
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().unwrap().closed
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().unwrap().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        self.inner.state.lock().unwrap().senders += 1;
        Sender { inner: Arc::clone(&self.inner) }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        let mut guard = self.inner.state.lock().unwrap();
        guard.senders -= 1;
        if guard.senders == 0 {
            guard.closed = true;
            self.inner.not_empty.notify_all();
            self.inner.not_full.notify_all();
        }
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        self.inner.state.lock().unwrap().receivers += 1;
        Receiver { inner: Arc::clone(&self.inner) }
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        let mut guard = self.inner.state.lock().unwrap();
        guard.receivers -= 1;
        if guard.receivers == 0 {
            guard.closed = true;
            self.inner.not_full.notify_all();
            self.inner.not_empty.notify_all();
        }
    }
}

unsafe impl<T: Send> Send for Sender<T> {}
unsafe impl<T: Send> Sync for Sender<T> {}
unsafe impl<T: Send> Send for Receiver<T> {}
unsafe impl<T: Send> Sync for Receiver<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_basic_send_recv() {
        let (tx, rx) = channel(10);
        tx.try_send(42).unwrap();
        assert_eq!(rx.try_recv().unwrap(), 42);
    }

    #[test]
    fn test_buffer_full_then_drains() {
        let (tx, rx) = channel(2);
        tx.try_send(1).unwrap();
        tx.try_send(2).unwrap();
        assert!(tx.try_send(3).is_err());
        rx.try_recv().unwrap();
        tx.try_send(3).unwrap();
    }

    #[test]
    fn test_empty_recv() {
        let (_tx, rx) = channel::<i32>(10);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn test_sender_drop_closes_after_drain() {
        let (tx, rx) = channel::<i32>(10);
        tx.try_send(1).unwrap();
        drop(tx);
        assert_eq!(rx.try_recv().unwrap(), 1);
        assert!(rx.is_closed());
        assert_eq!(rx.try_recv(), Err(TryRecvError::Closed));
    }

    #[test]
    fn test_clone_sender() {
        let (tx1, rx) = channel(10);
        let tx2 = tx1.clone();
        tx1.try_send(1).unwrap();
        tx2.try_send(2).unwrap();
        assert_eq!(rx.len(), 2);
    }

    #[test]
    fn test_rendezvous_handoff_order() {
        let (tx, rx) = rendezvous::<i32>();
        let handle = thread::spawn(move || {
            let mut out = Vec::new();
            for _ in 0..3 {
                out.push(rx.recv().unwrap());
            }
            out
        });
        thread::sleep(Duration::from_millis(10));
        tx.send(10).unwrap();
        tx.send(20).unwrap();
        tx.send(30).unwrap();
        assert_eq!(handle.join().unwrap(), vec![10, 20, 30]);
    }

    #[test]
    fn test_rendezvous_send_blocks_until_taken() {
        let (tx, rx) = rendezvous::<i32>();
        let handle = thread::spawn(move || {
            tx.send(99).unwrap();
        });
        thread::sleep(Duration::from_millis(20));
        assert_eq!(rx.recv().unwrap(), 99);
        handle.join().unwrap();
    }

    #[test]
    fn test_recv_blocks_until_sent() {
        let (tx, rx) = channel::<i32>(1);
        let handle = thread::spawn(move || rx.recv().unwrap());
        thread::sleep(Duration::from_millis(20));
        tx.send(7).unwrap();
        assert_eq!(handle.join().unwrap(), 7);
    }
}
