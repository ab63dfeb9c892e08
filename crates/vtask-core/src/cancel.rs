//! Cooperative cancellation token
//!
//! Tasks can check for cancellation via their token and exit gracefully.
//! Tokens can be linked to form parent-child relationships so cancelling a
//! parent also cancels every descendant.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use crate::error::{TaskError, TaskResult};

/// Token for checking and triggering cancellation.
///
/// Every spawned task receives a token (or a `dummy()` one if cancellation
/// isn't wired up for it). The token can be checked at any point; a task
/// observing cancellation should unwind its own state and return without
/// completing its remaining work.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Inner,
}

#[derive(Clone)]
enum Inner {
    Owned(Arc<Owned>),
    /// Never cancels; used for tasks spawned without a parent scope.
    Dummy,
}

struct Owned {
    cancelled: AtomicBool,
    parent: Option<CancellationToken>,
}

impl CancellationToken {
    /// Create a new, independent cancellation token.
    pub fn new() -> Self {
        Self {
            inner: Inner::Owned(Arc::new(Owned {
                cancelled: AtomicBool::new(false),
                parent: None,
            })),
        }
    }

    /// Create a token that never cancels.
    pub fn dummy() -> Self {
        Self { inner: Inner::Dummy }
    }

    /// Create a child token linked to this one.
    ///
    /// If this token is cancelled, checking the child also observes
    /// cancellation. Cancelling the child does not affect the parent.
    pub fn child(&self) -> Self {
        Self {
            inner: Inner::Owned(Arc::new(Owned {
                cancelled: AtomicBool::new(false),
                parent: Some(self.clone()),
            })),
        }
    }

    /// Check whether cancellation was requested, walking the parent chain.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        match &self.inner {
            Inner::Owned(o) => {
                if o.cancelled.load(Ordering::Acquire) {
                    return true;
                }
                match &o.parent {
                    Some(parent) => parent.is_cancelled(),
                    None => false,
                }
            }
            Inner::Dummy => false,
        }
    }

    /// Request cancellation.
    ///
    /// Only sets this token's own flag; descendants observe it through
    /// `is_cancelled`'s parent-chain walk.
    pub fn cancel(&self) {
        if let Inner::Owned(o) = &self.inner {
            o.cancelled.store(true, Ordering::Release);
        }
    }

    /// Check cancellation, converting it into `Err(TaskError::Cancelled)`.
    ///
    /// Typical usage inside a hand-written `Future::poll` or a spawned
    /// closure's loop body:
    /// ```ignore
    /// fn step(token: &CancellationToken) -> TaskResult<()> {
    ///     token.check()?;
    ///     // ... do one unit of work ...
    ///     Ok(())
    /// }
    /// ```
    #[inline]
    pub fn check(&self) -> TaskResult<()> {
        if self.is_cancelled() {
            Err(TaskError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_cancellation() {
        let token = CancellationToken::new();

        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());

        token.cancel();

        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(TaskError::Cancelled)));
    }

    #[test]
    fn test_child_token() {
        let parent = CancellationToken::new();
        let child = parent.child();

        assert!(!child.is_cancelled());

        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_child_independent_cancel() {
        let parent = CancellationToken::new();
        let child = parent.child();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn test_deep_hierarchy() {
        let root = CancellationToken::new();
        let level1 = root.child();
        let level2 = level1.child();
        let level3 = level2.child();

        assert!(!level3.is_cancelled());

        root.cancel();
        assert!(level1.is_cancelled());
        assert!(level2.is_cancelled());
        assert!(level3.is_cancelled());
    }

    #[test]
    fn test_clone_shares_state() {
        let token1 = CancellationToken::new();
        let token2 = token1.clone();

        token1.cancel();
        assert!(token2.is_cancelled());
    }

    #[test]
    fn test_dummy_token() {
        let token = CancellationToken::dummy();
        assert!(!token.is_cancelled());
        token.cancel(); // no-op
        assert!(!token.is_cancelled());
    }
}
