//! Borrowed handles into one registry slot.
//!
//! A [`TagHandle`] is what [`crate::registry::Registry::acquire`] hands back: the tag's
//! immutable identity plus a cloned `Arc` to its level table, obtained while the registry's
//! write lock is held and usable after it has been released (§4, "the façade releases the
//! registry lock and operates on the tag's level table"). Dropping the handle releases the
//! use-count it is holding.

use std::sync::Arc;

use crate::level::LevelTable;
use crate::registry::Registry;

/// A use-counted borrow of one live tag, returned by [`Registry::acquire`].
///
/// Exactly one [`Registry::release`] call happens per handle, performed on drop. Holding this
/// handle guarantees the tag will not be destroyed underneath the caller: `begin_remove`
/// refuses to proceed while any handle's use-count contribution is outstanding.
pub struct TagHandle {
    pub(crate) desc: i32,
    pub(crate) owner_uid: Option<i32>,
    pub(crate) is_private: bool,
    pub(crate) levels: Arc<LevelTable>,
    pub(crate) registry: Registry,
}

impl TagHandle {
    /// The descriptor this handle was acquired against.
    #[must_use]
    pub fn desc(&self) -> i32 {
        self.desc
    }

    /// `true` if the tag was created with the private sentinel key.
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.is_private
    }

    /// The tag's owner uid, or `None` if it was created with [`crate::config::OWNER_ANY`].
    #[must_use]
    pub fn owner_uid(&self) -> Option<i32> {
        self.owner_uid
    }

    /// Borrowed access to this tag's level table.
    #[must_use]
    pub fn levels(&self) -> &LevelTable {
        &self.levels
    }
}

impl Drop for TagHandle {
    fn drop(&mut self) {
        self.registry.release(self.desc);
    }
}
