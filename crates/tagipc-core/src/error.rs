//! The service's error taxonomy and its boundary conversion to negative status codes.

use thiserror::Error;

/// Every way a façade call can fail.
///
/// Internal APIs return `Result<T, TagError>` throughout; nothing is recovered silently.
/// Only the boundary functions mirroring §6's external call surface collapse this into a
/// negative `i32` via [`TagError::to_code`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TagError {
    /// `key < 0` on `CREATE`; `level` out of `[0, MAX_LEVELS)`; unknown command code.
    #[error("invalid argument")]
    InvalidArgument,
    /// `send` with `size > MAX_MESSAGE_SIZE`.
    #[error("message too big")]
    MessageTooBig,
    /// Descriptor refers to an empty slot, or `OPEN` found no tag with that key.
    #[error("not found")]
    NotFound,
    /// `CREATE` with a non-private key already in use.
    #[error("key already exists")]
    KeyExists,
    /// No free descriptor, or the level table for a tag is full.
    #[error("capacity exceeded")]
    Capacity,
    /// Caller's uid does not match a non-"any" owner.
    #[error("permission denied")]
    Permission,
    /// `OPEN` targeted a private tag.
    #[error("tag is private")]
    PrivateTag,
    /// The tag is currently being removed.
    #[error("tag is being removed")]
    Removing,
    /// Strict `REMOVE` found live waiters, or `send` lost the publish race.
    #[error("busy")]
    Busy,
    /// A blocked receiver was woken by cancellation before any message arrived.
    #[error("interrupted")]
    Interrupted,
    /// Allocation failure constructing a tag, level, wait queue, or message copy.
    #[error("out of memory")]
    OutOfMemory,
}

impl TagError {
    /// Negative boundary code, one per variant, stable across calls.
    #[must_use]
    pub const fn to_code(self) -> i32 {
        match self {
            Self::InvalidArgument => -1,
            Self::MessageTooBig => -2,
            Self::NotFound => -3,
            Self::KeyExists => -4,
            Self::Capacity => -5,
            Self::Permission => -6,
            Self::PrivateTag => -7,
            Self::Removing => -8,
            Self::Busy => -9,
            Self::Interrupted => -10,
            Self::OutOfMemory => -11,
        }
    }
}

pub type TagResult<T> = Result<T, TagError>;
