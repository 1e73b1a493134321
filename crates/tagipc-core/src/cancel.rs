//! Cancellation of a blocked `receive`.
//!
//! There is no timeout parameter in the external call surface (§5); instead a caller-supplied
//! [`CancellationToken`] models external interruption (e.g. a delivered signal). Tripping the
//! token always wakes whatever level it is currently registered against, following the
//! teacher's futex contract note that a contended wake must always happen rather than being
//! skipped as an optimization — the waiter re-checks its predicate on every wake, so a
//! redundant wake is harmless.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::level::Level;

struct Inner {
    cancelled: bool,
    waiting: Option<Weak<Level>>,
}

/// A shareable, clonable cancellation flag for one `receive` call (or a family of related
/// calls that should all be interrupted together, e.g. a subsystem shutdown).
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Mutex<Inner>>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                cancelled: false,
                waiting: None,
            })),
        }
    }

    /// Trip the token and, if it is currently registered against a level, wake that level's
    /// waiters immediately.
    pub fn cancel(&self) {
        let level = {
            let mut guard = self.inner.lock();
            guard.cancelled = true;
            guard.waiting.as_ref().and_then(Weak::upgrade)
        };
        if let Some(level) = level {
            level.notify_all_for_cancel();
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.lock().cancelled
    }

    /// Register this token as currently waiting on `level`, for the duration of the returned
    /// guard.
    pub(crate) fn register<'a>(&'a self, level: &Level) -> Registration<'a> {
        self.inner.lock().waiting = Some(level.weak_self());
        Registration { token: self }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard unregistering a token's level association on drop.
pub(crate) struct Registration<'a> {
    token: &'a CancellationToken,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.token.inner.lock().waiting = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_not_cancelled() {
        assert!(!CancellationToken::new().is_cancelled());
    }

    #[test]
    fn cancel_is_observable() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(token.is_cancelled());
    }
}
