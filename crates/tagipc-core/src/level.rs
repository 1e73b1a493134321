//! Level records and the per-tag level table.
//!
//! A [`Level`] is a single rendezvous point for one level number within one tag. A
//! [`LevelTable`] is the set of live level records for one tag. Publication replaces a level
//! record with a fresh empty successor rather than resetting it in place (§4.2, §9): this is a
//! direct translation of the original kernel module's `update_level`/`delete_level`, which
//! build a new `level_t`, swap it in with `list_replace_rcu`, and `synchronize_rcu` + `kfree`
//! the old one.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Condvar, Mutex};

use crate::cancel::CancellationToken;
use crate::error::TagError;
use crate::reclaim::Domain;

/// Message slot state for one level record. Transitions exactly once, from `Empty` to either
/// `Message` (a `send` won) or `Woken` (an `awake-all` won); the containing [`Level`] is never
/// reused afterward — the table replaces it with a fresh `Empty` level under the same number.
enum LevelState {
    Empty,
    Message(Arc<[u8]>),
    Woken,
}

/// A single rendezvous point for one level number.
pub struct Level {
    number: i32,
    state: Mutex<LevelState>,
    condvar: Condvar,
    waiters: AtomicUsize,
    self_weak: Weak<Level>,
}

/// Outcome of a `receive` wait that did not yield a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Woken by cancellation, or by a `ctl/AWAKE_ALL` racing ahead of any `send`.
    Interrupted,
}

impl Level {
    fn new_arc(number: i32) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            number,
            state: Mutex::new(LevelState::Empty),
            condvar: Condvar::new(),
            waiters: AtomicUsize::new(0),
            self_weak: weak.clone(),
        })
    }

    /// A weak handle to this level, used by [`CancellationToken`] to wake a specific waiter
    /// without keeping the level alive on its own.
    pub(crate) fn weak_self(&self) -> Weak<Level> {
        self.self_weak.clone()
    }

    /// Current level number.
    #[must_use]
    pub fn number(&self) -> i32 {
        self.number
    }

    /// Current count of receivers blocked on this level (§4.3 "waiters").
    #[must_use]
    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::Acquire)
    }

    /// Compare-and-swap the message slot from empty to `bytes`. `Ok` wakes every waiter;
    /// `Err(Busy)` means a concurrent publisher (or `awake-all`) already won.
    pub(crate) fn try_publish(&self, bytes: Arc<[u8]>) -> Result<(), TagError> {
        let mut guard = self.state.lock();
        match *guard {
            LevelState::Empty => {
                *guard = LevelState::Message(bytes);
                drop(guard);
                self.condvar.notify_all();
                Ok(())
            }
            LevelState::Message(_) | LevelState::Woken => {
                tracing::debug!(level = self.number, "publish: slot already taken");
                Err(TagError::Busy)
            }
        }
    }

    /// Compare-and-swap the message slot from empty to the distinguished "woken" token used by
    /// `ctl/AWAKE_ALL`. Returns `true` if this call performed the transition.
    pub(crate) fn try_wake_empty(&self) -> bool {
        let mut guard = self.state.lock();
        if matches!(*guard, LevelState::Empty) {
            *guard = LevelState::Woken;
            drop(guard);
            self.condvar.notify_all();
            true
        } else {
            false
        }
    }

    /// Wake every current waiter without changing the message state — used to propagate
    /// cancellation immediately (§4.3 "genuinely interruptible").
    pub(crate) fn notify_all_for_cancel(&self) {
        let _guard = self.state.lock();
        self.condvar.notify_all();
    }

    /// Receiver protocol (§4.3): block until a message is published, the level is woken by
    /// `awake-all`, or `token` is cancelled.
    pub(crate) fn wait_for_message(
        &self,
        token: &CancellationToken,
    ) -> Result<Arc<[u8]>, WaitOutcome> {
        self.waiters.fetch_add(1, Ordering::AcqRel);
        let _registration = token.register(self);
        let mut guard = self.state.lock();
        loop {
            match &*guard {
                LevelState::Empty => {
                    if token.is_cancelled() {
                        self.waiters.fetch_sub(1, Ordering::AcqRel);
                        return Err(WaitOutcome::Interrupted);
                    }
                    self.condvar.wait(&mut guard);
                }
                LevelState::Message(bytes) => {
                    let bytes = bytes.clone();
                    self.waiters.fetch_sub(1, Ordering::AcqRel);
                    return Ok(bytes);
                }
                LevelState::Woken => {
                    self.waiters.fetch_sub(1, Ordering::AcqRel);
                    return Err(WaitOutcome::Interrupted);
                }
            }
        }
    }
}

/// The set of live level records for one tag.
pub struct LevelTable {
    levels: Mutex<Vec<Arc<Level>>>,
    domain: Domain,
}

/// A point-in-time (level number, waiter count) pair for the status exporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelSnapshot {
    pub number: i32,
    pub waiters: usize,
}

impl LevelTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            levels: Mutex::new(Vec::new()),
            domain: Domain::new(),
        }
    }

    /// Read-side critical section; linear scan for `number`.
    #[must_use]
    pub fn find(&self, number: i32) -> Option<Arc<Level>> {
        let _guard = self.domain.pin();
        self.levels.lock().iter().find(|l| l.number == number).cloned()
    }

    /// Lazily create an empty level for `number`. Racing callers that both observed
    /// `find(number) == None` are reconciled here under the write lock: whichever one gets
    /// there first creates the level, the other sees it already exists and no-ops, so exactly
    /// one `Level` record ever exists per number (§8 invariant 2).
    pub fn insert(&self, number: i32, max_levels: usize) -> Result<(), TagError> {
        let mut levels = self.levels.lock();
        if levels.iter().any(|l| l.number == number) {
            return Ok(());
        }
        if levels.len() >= max_levels {
            return Err(TagError::Capacity);
        }
        levels.push(Level::new_arc(number));
        Ok(())
    }

    /// Locate `number`, publish `bytes` on it, wake its waiters, and replace it with a fresh
    /// empty successor.
    pub fn publish(&self, number: i32, bytes: Arc<[u8]>) -> Result<(), TagError> {
        let level = self.find(number).ok_or(TagError::NotFound)?;
        level.try_publish(bytes)?;
        self.replace_with_fresh(number, &level);
        Ok(())
    }

    /// Wake every level currently waiting empty, replacing each with a fresh successor.
    /// Levels that a racing `send` already published to are left untouched — their own
    /// publisher performs the replacement.
    pub fn wake_all(&self) {
        let snapshot: Vec<Arc<Level>> = {
            let _guard = self.domain.pin();
            self.levels.lock().clone()
        };
        for level in snapshot {
            if level.try_wake_empty() {
                self.replace_with_fresh(level.number, &level);
            }
        }
    }

    /// Tear down every level. If `force` is false and any level still has waiters, fails with
    /// `Busy` and leaves the table untouched (the strict `REMOVE` path, §4.4).
    pub fn cleanup(&self, force: bool) -> Result<(), TagError> {
        let mut levels = self.levels.lock();
        if !force && levels.iter().any(|l| l.waiters() > 0) {
            return Err(TagError::Busy);
        }
        let drained = std::mem::take(&mut *levels);
        drop(levels);
        for level in drained {
            self.domain.defer(Box::new(move || drop(level)));
        }
        self.domain.synchronize();
        Ok(())
    }

    /// Point-in-time snapshot of (level number, waiter count) for every live level, used by
    /// the status exporter.
    #[must_use]
    pub fn snapshot(&self) -> Vec<LevelSnapshot> {
        let _guard = self.domain.pin();
        self.levels
            .lock()
            .iter()
            .map(|l| LevelSnapshot {
                number: l.number,
                waiters: l.waiters(),
            })
            .collect()
    }

    fn replace_with_fresh(&self, number: i32, old: &Arc<Level>) {
        {
            let mut levels = self.levels.lock();
            if let Some(pos) = levels.iter().position(|l| Arc::ptr_eq(l, old)) {
                levels[pos] = Level::new_arc(number);
            }
        }
        let old = Arc::clone(old);
        self.domain.defer(Box::new(move || drop(old)));
        self.domain.synchronize();
    }
}

impl Default for LevelTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn publish_wakes_and_replaces() {
        let table = LevelTable::new();
        table.insert(1, 16).unwrap();
        assert!(table.find(1).is_some());

        let before = table.find(1).unwrap();
        table.publish(1, Arc::from(b"hi".as_slice())).unwrap();
        let after = table.find(1).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn lost_publication_is_not_observed_by_later_receiver() {
        let table = LevelTable::new();
        table.insert(2, 16).unwrap();
        table.publish(2, Arc::from(b"x".as_slice())).unwrap();

        // A fresh receiver after the publish sees the replaced, empty successor.
        let token = CancellationToken::new();
        let level = table.find(2).unwrap();
        let t = token.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            t.cancel();
        });
        let outcome = level.wait_for_message(&token);
        assert_eq!(outcome.unwrap_err(), WaitOutcome::Interrupted);
    }

    #[test]
    fn multi_receiver_broadcast_sees_same_bytes() {
        let table = Arc::new(LevelTable::new());
        table.insert(1, 16).unwrap();

        let mut handles = Vec::new();
        for _ in 0..5 {
            let table = table.clone();
            handles.push(thread::spawn(move || {
                let level = table.find(1).unwrap();
                let token = CancellationToken::new();
                level.wait_for_message(&token).unwrap()
            }));
        }
        thread::sleep(Duration::from_millis(50));
        table.publish(1, Arc::from(b"hello".as_slice())).unwrap();

        for h in handles {
            let bytes = h.join().unwrap();
            assert_eq!(&*bytes, b"hello");
        }
    }

    #[test]
    fn cleanup_fails_when_waiters_present_unless_forced() {
        let table = Arc::new(LevelTable::new());
        table.insert(1, 16).unwrap();
        let level = table.find(1).unwrap();

        let token = Arc::new(CancellationToken::new());
        let token_clone = token.clone();
        let handle = thread::spawn(move || level.wait_for_message(&token_clone));
        thread::sleep(Duration::from_millis(20));

        assert_eq!(table.cleanup(false).unwrap_err(), TagError::Busy);
        token.cancel();
        handle.join().unwrap().unwrap_err();
        assert!(table.cleanup(false).is_ok());
    }
}
