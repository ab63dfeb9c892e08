//! Closure-invocation mutex and shared-data lock
//!
//! These wrap `std::sync::Mutex`/`RwLock` but expose the protected value
//! only to a closure invoked while the lock is held — the reference never
//! escapes — matching the closure-based access pattern used throughout
//! this codebase's synchronization primitives (no `lock()` returning a
//! guard the caller can stash and forget about).

use std::sync::{Mutex, RwLock};

/// A mutex whose protected value is only ever visible inside a closure.
pub struct DataMutex<T> {
    inner: Mutex<T>,
}

impl<T> DataMutex<T> {
    pub fn new(value: T) -> Self {
        Self { inner: Mutex::new(value) }
    }

    /// Acquire the lock, run `f` with exclusive access, and return its
    /// result. Blocks the calling OS thread if contended.
    pub fn lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    /// Like `lock`, but returns `None` instead of blocking if the mutex is
    /// already held.
    pub fn try_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        match self.inner.try_lock() {
            Ok(mut guard) => Some(f(&mut guard)),
            Err(std::sync::TryLockError::WouldBlock) => None,
            Err(std::sync::TryLockError::Poisoned(e)) => Some(f(&mut e.into_inner())),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for DataMutex<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.inner.try_lock() {
            Ok(guard) => f.debug_struct("DataMutex").field("data", &*guard).finish(),
            Err(_) => f.debug_struct("DataMutex").field("data", &"<locked>").finish(),
        }
    }
}

/// A reader-writer lock whose protected value is only ever visible inside
/// a closure.
pub struct SharedData<T> {
    inner: RwLock<T>,
}

impl<T> SharedData<T> {
    pub fn new(value: T) -> Self {
        Self { inner: RwLock::new(value) }
    }

    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        f(&guard)
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    pub fn try_read<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        match self.inner.try_read() {
            Ok(guard) => Some(f(&guard)),
            Err(std::sync::TryLockError::WouldBlock) => None,
            Err(std::sync::TryLockError::Poisoned(e)) => Some(f(&e.into_inner())),
        }
    }

    pub fn try_write<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        match self.inner.try_write() {
            Ok(mut guard) => Some(f(&mut guard)),
            Err(std::sync::TryLockError::WouldBlock) => None,
            Err(std::sync::TryLockError::Poisoned(e)) => Some(f(&mut e.into_inner())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_mutex_basic() {
        let m = DataMutex::new(0);
        m.lock(|v| *v = 42);
        assert_eq!(m.lock(|v| *v), 42);
    }

    #[test]
    fn test_mutex_try_lock_contended() {
        let m = Arc::new(DataMutex::new(0));
        let m2 = Arc::clone(&m);
        let (tx, rx) = std::sync::mpsc::channel();
        let handle = thread::spawn(move || {
            m2.lock(|v| {
                tx.send(()).unwrap();
                *v += 1;
                thread::sleep(std::time::Duration::from_millis(50));
            });
        });
        rx.recv().unwrap();
        assert!(m.try_lock(|_| ()).is_none());
        handle.join().unwrap();
        assert!(m.try_lock(|_| ()).is_some());
    }

    #[test]
    fn test_mutex_concurrent_increment() {
        let mutex = Arc::new(DataMutex::new(0));
        let mut handles = vec![];
        for _ in 0..4 {
            let mutex = Arc::clone(&mutex);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    mutex.lock(|v| *v += 1);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(mutex.lock(|v| *v), 4000);
    }

    #[test]
    fn test_shared_data_read_write() {
        let s = SharedData::new(vec![1, 2, 3]);
        s.write(|v| v.push(4));
        let sum: i32 = s.read(|v| v.iter().sum());
        assert_eq!(sum, 10);
    }

    #[test]
    fn test_shared_data_concurrent_readers() {
        let s = Arc::new(SharedData::new(100));
        let mut handles = vec![];
        for _ in 0..4 {
            let s = Arc::clone(&s);
            handles.push(thread::spawn(move || s.read(|v| *v)));
        }
        for h in handles {
            assert_eq!(h.join().unwrap(), 100);
        }
    }
}
