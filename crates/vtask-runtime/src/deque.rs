//! Chase-Lev work-stealing deque
//!
//! The owning worker pushes and pops from the bottom without contention
//! (only a release-ordered store publishes new work); stealers contend on
//! the top via a compare-and-swap. The fence pattern follows the
//! published Chase-Lev algorithm (and the scheduler's own C rendering of
//! it): a `SeqCst` fence between reading `bottom` and reading `top` in
//! `pop`, and a `SeqCst` CAS guarding the case where `pop` races a stealer
//! for the last element.
//!
//! Capacity is fixed at construction time (matching the scheduler's own
//! `DEQUE_CAP`); a push against a full deque is dropped with a log
//! message rather than growing the backing array. Production-grade
//! deques typically resize via an atomic buffer swap instead — see
//! `DESIGN.md` for why this crate keeps the fixed-capacity behavior.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicIsize, Ordering};
use vtask_core::kerror;

struct Buffer<T> {
    mask: isize,
    slots: Box<[UnsafeCell<Option<T>>]>,
}

impl<T> Buffer<T> {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.next_power_of_two();
        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(UnsafeCell::new(None));
        }
        Self { mask: capacity as isize - 1, slots: slots.into_boxed_slice() }
    }

    #[inline]
    unsafe fn read(&self, index: isize) -> Option<T> {
        let slot = &self.slots[(index & self.mask) as usize];
        (*slot.get()).take()
    }

    #[inline]
    unsafe fn write(&self, index: isize, value: T) {
        let slot = &self.slots[(index & self.mask) as usize];
        *slot.get() = Some(value);
    }
}

/// A single worker's local deque. Owned by exactly one worker thread;
/// other workers steal from it through `&Deque<T>` shared references.
pub struct Deque<T> {
    top: AtomicIsize,
    bottom: AtomicIsize,
    buffer: Buffer<T>,
}

// Safety: the owner is the only thread that calls push/pop; steal() uses
// atomics and a CAS to synchronize with the owner.
unsafe impl<T: Send> Send for Deque<T> {}
unsafe impl<T: Send> Sync for Deque<T> {}

impl<T> Deque<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            top: AtomicIsize::new(0),
            bottom: AtomicIsize::new(0),
            buffer: Buffer::new(capacity),
        }
    }

    /// Owner-only. Push a task onto the bottom of the deque. If the
    /// deque is at capacity, the task is dropped (logged) rather than
    /// growing the buffer.
    pub fn push(&self, value: T) -> Result<(), T> {
        let bottom = self.bottom.load(Ordering::Relaxed);
        let top = self.top.load(Ordering::Acquire);
        let size = bottom - top;
        if size >= self.buffer.mask + 1 {
            kerror!("deque full (capacity {}), dropping task", self.buffer.mask + 1);
            return Err(value);
        }
        unsafe { self.buffer.write(bottom, value) };
        self.bottom.store(bottom + 1, Ordering::Release);
        Ok(())
    }

    /// Owner-only. Pop a task from the bottom of the deque.
    pub fn pop(&self) -> Option<T> {
        let bottom = self.bottom.load(Ordering::Relaxed) - 1;
        self.bottom.store(bottom, Ordering::SeqCst);
        let top = self.top.load(Ordering::SeqCst);

        if top > bottom {
            // Deque was empty; restore bottom.
            self.bottom.store(bottom + 1, Ordering::Relaxed);
            return None;
        }

        let value = unsafe { self.buffer.read(bottom) };
        if top == bottom {
            // Last element: race with stealers for it.
            if self
                .top
                .compare_exchange(top, top + 1, Ordering::SeqCst, Ordering::Relaxed)
                .is_err()
            {
                // A stealer won the race.
                self.bottom.store(bottom + 1, Ordering::Relaxed);
                return None;
            }
            self.bottom.store(bottom + 1, Ordering::Relaxed);
        }
        value
    }

    /// Any thread. Attempt to steal a task from the top of the deque.
    pub fn steal(&self) -> Steal<T> {
        let top = self.top.load(Ordering::Acquire);
        std::sync::atomic::fence(Ordering::SeqCst);
        let bottom = self.bottom.load(Ordering::Acquire);

        if top >= bottom {
            return Steal::Empty;
        }

        let value = unsafe { self.buffer.read(top) };
        match self.top.compare_exchange(top, top + 1, Ordering::SeqCst, Ordering::Relaxed) {
            Ok(_) => match value {
                Some(v) => Steal::Success(v),
                None => Steal::Empty,
            },
            Err(_) => Steal::Retry,
        }
    }

    pub fn len(&self) -> usize {
        let bottom = self.bottom.load(Ordering::Relaxed);
        let top = self.top.load(Ordering::Relaxed);
        (bottom - top).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of a steal attempt.
pub enum Steal<T> {
    Empty,
    /// Lost a race with another stealer or the owner; the caller should
    /// retry.
    Retry,
    Success(T),
}
