//! The process-wide (well, `Registry`-instance-wide) fixed-capacity table of tags.
//!
//! Grounded on `examples/original_source/lib/tag1.c`'s `desc_list` / `start` rotating hint /
//! `insert_tag` / `delete_tag` for the exact slot-scan and descriptor-reuse discipline, and on
//! the teacher's process-wide `RwLock`-guarded registry shape (`crates/glibc_rust/src/safety/
//! registry.rs`) for the concurrent-table style — generalized here to a `parking_lot::Mutex`
//! since every registry operation in this spec is a short read-or-write critical section, not
//! a long-held read lock.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::{Config, OWNER_ANY};
use crate::error::{TagError, TagResult};
use crate::level::{LevelSnapshot, LevelTable};
use crate::tag::TagHandle;

struct TagSlot {
    key: i32,
    is_private: bool,
    owner_uid: Option<i32>,
    use_count: usize,
    removing: bool,
    levels: Arc<LevelTable>,
}

struct RegistryState {
    slots: Vec<Option<TagSlot>>,
    hint: usize,
}

/// A point-in-time view of one live tag, used by the status exporter.
pub struct TagSnapshot {
    pub desc: i32,
    pub key: i32,
    pub owner_uid: Option<i32>,
    pub levels: Vec<LevelSnapshot>,
}

/// The fixed-capacity, key-unique table of live tags for one service instance.
///
/// Cheap to clone (an `Arc` handle internally), matching the teacher's convention of passing
/// shared subsystem state by value rather than behind a further layer of reference-counting at
/// every call site.
#[derive(Clone)]
pub struct Registry {
    state: Arc<Mutex<RegistryState>>,
    config: Config,
}

impl Registry {
    #[must_use]
    pub fn new(config: Config) -> Self {
        let mut slots = Vec::with_capacity(config.max_tags);
        slots.resize_with(config.max_tags, || None);
        Self {
            state: Arc::new(Mutex::new(RegistryState { slots, hint: 0 })),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> Config {
        self.config
    }

    /// `insert(key, private_flag, owner_uid) → descriptor | error` (§4.1).
    pub fn insert(&self, key: i32, is_private: bool, owner_uid: Option<i32>) -> TagResult<i32> {
        let mut state = self.state.lock();

        if !is_private && state.slots.iter().flatten().any(|t| !t.is_private && t.key == key) {
            tracing::warn!(key, "create rejected: key already exists");
            return Err(TagError::KeyExists);
        }

        let n = state.slots.len();
        if n == 0 {
            return Err(TagError::Capacity);
        }
        let hint = state.hint;
        for i in 0..n {
            let idx = (hint + i) % n;
            if state.slots[idx].is_none() {
                state.slots[idx] = Some(TagSlot {
                    key,
                    is_private,
                    owner_uid,
                    use_count: 0,
                    removing: false,
                    levels: Arc::new(LevelTable::new()),
                });
                state.hint = (idx + 1) % n;
                tracing::debug!(desc = idx as i32, key, is_private, "tag created");
                return Ok(idx as i32);
            }
        }
        tracing::warn!(max_tags = n, "create rejected: registry at capacity");
        Err(TagError::Capacity)
    }

    /// `lookup_by_key(key) → descriptor | error` (§4.1).
    pub fn lookup_by_key(&self, key: i32, requester_uid: i32) -> TagResult<i32> {
        let state = self.state.lock();
        for (idx, slot) in state.slots.iter().enumerate() {
            let Some(tag) = slot else { continue };
            if tag.key != key {
                continue;
            }
            if tag.is_private {
                tracing::debug!(key, "open rejected: tag is private");
                return Err(TagError::PrivateTag);
            }
            if let Some(owner) = tag.owner_uid {
                if requester_uid != OWNER_ANY && owner != requester_uid {
                    tracing::warn!(desc = idx as i32, key, requester_uid, "open rejected: permission");
                    return Err(TagError::Permission);
                }
            }
            return Ok(idx as i32);
        }
        Err(TagError::NotFound)
    }

    /// `acquire(desc, uid) → tag-handle | error` (§4.1). Every successful call must be paired
    /// with one [`Registry::release`]; [`TagHandle::drop`] performs that pairing.
    pub fn acquire(&self, desc: i32, uid: i32) -> TagResult<TagHandle> {
        let mut state = self.state.lock();
        let slot = Self::slot_mut(&mut state, desc)?;
        if slot.removing {
            return Err(TagError::Removing);
        }
        if let Some(owner) = slot.owner_uid {
            if uid != OWNER_ANY && owner != uid {
                return Err(TagError::Permission);
            }
        }
        slot.use_count += 1;
        Ok(TagHandle {
            desc,
            owner_uid: slot.owner_uid,
            is_private: slot.is_private,
            levels: slot.levels.clone(),
            registry: self.clone(),
        })
    }

    /// `release(tag-handle)` (§4.1). Called by [`TagHandle::drop`]; not part of the public API
    /// since every acquire is paired automatically.
    pub(crate) fn release(&self, desc: i32) {
        let mut state = self.state.lock();
        if let Some(slot) = state.slots.get_mut(desc as usize).and_then(Option::as_mut) {
            slot.use_count = slot.use_count.saturating_sub(1);
        }
    }

    /// `begin_remove(desc, uid) → tag-handle | error` (§4.1). Does not block: a nonzero
    /// use-count fails immediately with `Busy`. Returns the tag's level table so the caller can
    /// run `cleanup` outside the registry lock; on failure the caller must call
    /// [`Registry::abort_remove`] to clear the `removing` flag.
    pub fn begin_remove(&self, desc: i32, uid: i32) -> TagResult<Arc<LevelTable>> {
        let mut state = self.state.lock();
        let slot = Self::slot_mut(&mut state, desc)?;
        if slot.removing {
            return Err(TagError::Removing);
        }
        if let Some(owner) = slot.owner_uid {
            if uid != OWNER_ANY && owner != uid {
                return Err(TagError::Permission);
            }
        }
        if slot.use_count > 0 {
            return Err(TagError::Busy);
        }
        slot.removing = true;
        Ok(slot.levels.clone())
    }

    /// Clear `removing` after a strict `cleanup` aborted the removal (§4.4 "the remove is then
    /// aborted and `removing` cleared").
    pub fn abort_remove(&self, desc: i32) {
        let mut state = self.state.lock();
        if let Some(slot) = state.slots.get_mut(desc as usize).and_then(Option::as_mut) {
            slot.removing = false;
        }
    }

    /// `finalize_remove(tag-handle)` (§4.1): detach the slot and point the hint at it.
    pub fn finalize_remove(&self, desc: i32) {
        let mut state = self.state.lock();
        let n = state.slots.len();
        if desc >= 0 && (desc as usize) < n {
            state.slots[desc as usize] = None;
            state.hint = desc as usize;
            tracing::debug!(desc, "tag removed");
        }
    }

    /// Subsystem shutdown (§4.5): mark every live tag removing, drain receivers, force-cleanup
    /// every level table, then detach every slot. No permission check.
    pub fn shutdown(&self) {
        let level_tables: Vec<Arc<LevelTable>> = {
            let mut state = self.state.lock();
            state
                .slots
                .iter_mut()
                .flatten()
                .map(|slot| {
                    slot.removing = true;
                    slot.levels.clone()
                })
                .collect()
        };
        for levels in &level_tables {
            levels.wake_all();
            let _ = levels.cleanup(true);
        }
        let mut state = self.state.lock();
        for slot in &mut state.slots {
            *slot = None;
        }
        state.hint = 0;
        tracing::debug!("registry shut down");
    }

    /// Point-in-time snapshot of every live tag and its levels, for the status exporter.
    #[must_use]
    pub fn snapshot(&self) -> Vec<TagSnapshot> {
        let entries: Vec<(i32, i32, Option<i32>, Arc<LevelTable>)> = {
            let state = self.state.lock();
            state
                .slots
                .iter()
                .enumerate()
                .filter_map(|(idx, slot)| {
                    slot.as_ref()
                        .map(|t| (idx as i32, t.key, t.owner_uid, t.levels.clone()))
                })
                .collect()
        };
        entries
            .into_iter()
            .map(|(desc, key, owner_uid, levels)| TagSnapshot {
                desc,
                key,
                owner_uid,
                levels: levels.snapshot(),
            })
            .collect()
    }

    fn slot_mut<'a>(state: &'a mut RegistryState, desc: i32) -> TagResult<&'a mut TagSlot> {
        if desc < 0 {
            return Err(TagError::NotFound);
        }
        state
            .slots
            .get_mut(desc as usize)
            .and_then(Option::as_mut)
            .ok_or(TagError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_open_by_key() {
        let registry = Registry::new(Config::default());
        let desc = registry.insert(7, false, Some(1000)).unwrap();
        assert_eq!(desc, 0);
        assert_eq!(registry.lookup_by_key(7, 1000).unwrap(), 0);
    }

    #[test]
    fn duplicate_key_rejected() {
        let registry = Registry::new(Config::default());
        registry.insert(7, false, None).unwrap();
        assert_eq!(registry.insert(7, false, None).unwrap_err(), TagError::KeyExists);
    }

    #[test]
    fn private_tag_is_never_matched_by_lookup() {
        let registry = Registry::new(Config::default());
        registry.insert(-1, true, None).unwrap();
        assert_eq!(registry.lookup_by_key(-1, 0).unwrap_err(), TagError::PrivateTag);
    }

    #[test]
    fn permission_gates_open() {
        let registry = Registry::new(Config::default());
        registry.insert(7, false, Some(1000)).unwrap();
        assert_eq!(registry.lookup_by_key(7, 1001).unwrap_err(), TagError::Permission);
        assert!(registry.lookup_by_key(7, 1000).is_ok());
    }

    #[test]
    fn descriptor_is_reused_after_removal() {
        let registry = Registry::new(Config::default());
        let desc = registry.insert(7, false, None).unwrap();
        registry.finalize_remove(desc);
        let desc2 = registry.insert(9, false, None).unwrap();
        assert_eq!(desc, desc2);
    }

    #[test]
    fn begin_remove_fails_busy_while_acquired() {
        let registry = Registry::new(Config::default());
        let desc = registry.insert(7, false, None).unwrap();
        let handle = registry.acquire(desc, 0).unwrap();
        assert_eq!(registry.begin_remove(desc, 0).unwrap_err(), TagError::Busy);
        drop(handle);
        assert!(registry.begin_remove(desc, 0).is_ok());
    }

    #[test]
    fn acquire_fails_once_removing() {
        let registry = Registry::new(Config::default());
        let desc = registry.insert(7, false, None).unwrap();
        registry.begin_remove(desc, 0).unwrap();
        assert_eq!(registry.acquire(desc, 0).unwrap_err(), TagError::Removing);
    }

    #[test]
    fn capacity_is_enforced() {
        let registry = Registry::new(Config {
            max_tags: 1,
            ..Config::default()
        });
        registry.insert(1, false, None).unwrap();
        assert_eq!(registry.insert(2, false, None).unwrap_err(), TagError::Capacity);
    }
}
