//! Compile-/load-time capacity constants for the rendezvous service.

/// Sentinel key reserved for private tags, mirroring the original module's reuse of
/// `IPC_PRIVATE`. A tag created with this key is never matched by `OPEN`.
pub const PRIVATE_SENTINEL: i32 = -1;

/// Sentinel owner uid meaning "any caller", mirroring the original module's `perm = -1`
/// no-permission-check marker. Distinct axis from [`PRIVATE_SENTINEL`] even though both
/// happen to be `-1`: one gates key visibility, the other gates the uid check.
pub const OWNER_ANY: i32 = -1;

/// Default maximum number of concurrently live tags.
pub const DEFAULT_MAX_TAGS: usize = 256;

/// Default maximum number of distinct level numbers per tag.
pub const DEFAULT_MAX_LEVELS: usize = 16;

/// Default maximum message length, in bytes.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4096;

/// Default waiter-count hint used only to pre-size the status-line histogram; advisory,
/// never enforced as a hard cap.
pub const DEFAULT_MAX_WAITERS_HINT: usize = 64;

/// Capacity and size limits for one [`crate::registry::Registry`] instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Maximum number of live tags. At most this many descriptors exist at once.
    pub max_tags: usize,
    /// Maximum number of distinct level numbers per tag.
    pub max_levels: usize,
    /// Maximum message length accepted by `send`.
    pub max_message_size: usize,
    /// Advisory pre-sizing hint for the status snapshot; never a hard cap.
    pub max_waiters_hint: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_tags: DEFAULT_MAX_TAGS,
            max_levels: DEFAULT_MAX_LEVELS,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_waiters_hint: DEFAULT_MAX_WAITERS_HINT,
        }
    }
}
