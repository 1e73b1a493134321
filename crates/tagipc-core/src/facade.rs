//! The service façade: the four entry points (`get`, `send`, `receive`, `ctl`) that
//! coordinate the registry and a tag's level table and translate internal outcomes into the
//! error taxonomy of §7.
//!
//! Grounded on `examples/original_source/lib/service.c` (the original's single dispatch file
//! binding registry and level operations together) and the teacher's ABI-layer habit of a thin
//! dispatch function translating internal states into POSIX-style codes
//! (`frankenlibc-abi/src/pthread_abi.rs`).

use std::sync::Arc;

use crate::cancel::CancellationToken;
use crate::config::{Config, OWNER_ANY, PRIVATE_SENTINEL};
use crate::error::{TagError, TagResult};
use crate::level::WaitOutcome;
use crate::registry::{Registry, TagSnapshot};

/// `get` command codes (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetCommand {
    Create,
    Open,
}

impl TryFrom<i32> for GetCommand {
    type Error = TagError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Create),
            2 => Ok(Self::Open),
            _ => Err(TagError::InvalidArgument),
        }
    }
}

/// `ctl` command codes (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtlCommand {
    AwakeAll,
    Remove,
}

impl TryFrom<i32> for CtlCommand {
    type Error = TagError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            3 => Ok(Self::AwakeAll),
            4 => Ok(Self::Remove),
            _ => Err(TagError::InvalidArgument),
        }
    }
}

/// The tag-based rendezvous service: one `Registry` plus the façade operations over it.
///
/// Cheap to clone, like [`Registry`] itself — callers embedding this in a CLI or a test
/// harness can share one instance across threads without an extra `Arc` wrapper.
#[derive(Clone)]
pub struct Service {
    registry: Registry,
}

impl Service {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            registry: Registry::new(config),
        }
    }

    #[must_use]
    pub fn config(&self) -> Config {
        self.registry.config()
    }

    /// `get(key, command, uid_arg)` (§4.4).
    pub fn get(&self, key: i32, command: i32, uid_arg: i32) -> TagResult<i32> {
        match GetCommand::try_from(command)? {
            GetCommand::Create => {
                if key < 0 {
                    return Err(TagError::InvalidArgument);
                }
                let is_private = key == PRIVATE_SENTINEL;
                let owner_uid = if uid_arg == OWNER_ANY { None } else { Some(uid_arg) };
                self.registry.insert(key, is_private, owner_uid)
            }
            GetCommand::Open => self.registry.lookup_by_key(key, uid_arg),
        }
    }

    /// `send(desc, level, buffer, size)` (§4.4). `size == 0` publishes the empty byte sequence.
    pub fn send(&self, desc: i32, level: i32, caller_uid: i32, buffer: &[u8]) -> TagResult<()> {
        if buffer.len() > self.registry.config().max_message_size {
            tracing::warn!(desc, level, size = buffer.len(), "send: message too big");
            return Err(TagError::MessageTooBig);
        }
        let handle = self.registry.acquire(desc, caller_uid)?;
        let owned: Arc<[u8]> = Arc::from(buffer);
        let result = handle.levels().publish(level, owned);
        if let Err(err) = result {
            tracing::debug!(desc, level, ?err, "send: publish lost the race");
        }
        result
    }

    /// `receive(desc, level, buffer, size)` (§4.4). Blocks until a message is published on
    /// `(desc, level)`, the tag is woken via `ctl/AWAKE_ALL`, or `token` is cancelled.
    pub fn receive(
        &self,
        desc: i32,
        level: i32,
        caller_uid: i32,
        buffer: &mut [u8],
        token: &CancellationToken,
    ) -> TagResult<usize> {
        let max_levels = self.registry.config().max_levels as i32;
        if !(0..max_levels).contains(&level) {
            tracing::warn!(desc, level, "receive: level out of range");
            return Err(TagError::InvalidArgument);
        }

        let handle = self.registry.acquire(desc, caller_uid)?;
        let levels = handle.levels();
        let level_ref = match levels.find(level) {
            Some(l) => l,
            None => {
                levels.insert(level, self.registry.config().max_levels)?;
                levels.find(level).ok_or(TagError::NotFound)?
            }
        };

        match level_ref.wait_for_message(token) {
            Ok(bytes) => {
                let n = bytes.len().min(buffer.len());
                buffer[..n].copy_from_slice(&bytes[..n]);
                Ok(n)
            }
            Err(WaitOutcome::Interrupted) => {
                tracing::debug!(desc, level, "receive: interrupted");
                Err(TagError::Interrupted)
            }
        }
    }

    /// `ctl(desc, command)` (§4.4).
    pub fn ctl(&self, desc: i32, command: i32, caller_uid: i32) -> TagResult<()> {
        match CtlCommand::try_from(command)? {
            CtlCommand::AwakeAll => {
                let handle = self.registry.acquire(desc, caller_uid)?;
                handle.levels().wake_all();
                Ok(())
            }
            CtlCommand::Remove => {
                let levels = self.registry.begin_remove(desc, caller_uid)?;
                match levels.cleanup(false) {
                    Ok(()) => {
                        self.registry.finalize_remove(desc);
                        Ok(())
                    }
                    Err(err) => {
                        self.registry.abort_remove(desc);
                        tracing::debug!(desc, ?err, "ctl/remove: busy, aborted");
                        Err(err)
                    }
                }
            }
        }
    }

    /// Subsystem shutdown (§4.5): drain every receiver and tear down every tag.
    pub fn shutdown(&self) {
        self.registry.shutdown();
    }

    /// Point-in-time snapshot of the registry, for the status exporter.
    #[must_use]
    pub fn snapshot(&self) -> Vec<TagSnapshot> {
        self.registry.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;
    use std::thread;
    use std::time::Duration;

    const CREATE: i32 = 1;
    const OPEN: i32 = 2;
    const AWAKE_ALL: i32 = 3;
    const REMOVE: i32 = 4;

    #[test]
    fn create_open_remove_then_not_found() {
        let svc = Service::new(Config::default());
        let desc = svc.get(7, CREATE, 1000).unwrap();
        assert_eq!(desc, 0);
        assert_eq!(svc.get(7, OPEN, OWNER_ANY).unwrap(), 0);
        svc.ctl(desc, REMOVE, 1000).unwrap();
        assert_eq!(svc.get(7, OPEN, OWNER_ANY).unwrap_err(), TagError::NotFound);
    }

    #[test]
    fn private_tag_is_invisible_to_open() {
        let svc = Service::new(Config::default());
        svc.get(PRIVATE_SENTINEL, CREATE, 1000).unwrap();
        assert_eq!(
            svc.get(PRIVATE_SENTINEL, OPEN, OWNER_ANY).unwrap_err(),
            TagError::PrivateTag
        );
    }

    #[test]
    fn permission_gates_open_end_to_end() {
        let svc = Service::new(Config::default());
        svc.get(7, CREATE, 1000).unwrap();
        assert_eq!(svc.get(7, OPEN, 1001).unwrap_err(), TagError::Permission);
        assert!(svc.get(7, OPEN, 1000).is_ok());
    }

    #[test]
    fn multi_receiver_broadcast() {
        let svc = StdArc::new(Service::new(Config::default()));
        let desc = svc.get(0, CREATE, OWNER_ANY).unwrap();

        let mut handles = Vec::new();
        for _ in 0..5 {
            let svc = svc.clone();
            handles.push(thread::spawn(move || {
                let mut buf = [0u8; 5];
                let token = CancellationToken::new();
                let n = svc.receive(desc, 1, OWNER_ANY, &mut buf, &token).unwrap();
                (n, buf)
            }));
        }
        thread::sleep(Duration::from_millis(50));
        svc.send(desc, 1, OWNER_ANY, b"hello").unwrap();

        for h in handles {
            let (n, buf) = h.join().unwrap();
            assert_eq!(n, 5);
            assert_eq!(&buf[..n], b"hello");
        }
    }

    #[test]
    fn lost_publication_is_not_observed_by_later_receiver() {
        let svc = StdArc::new(Service::new(Config::default()));
        let desc = svc.get(0, CREATE, OWNER_ANY).unwrap();

        // A first receiver lazily creates level 2, then is cancelled before any message
        // arrives; the level itself survives cancellation (still empty).
        let token = CancellationToken::new();
        let first_token = token.clone();
        let svc2 = svc.clone();
        let first = thread::spawn(move || {
            let mut buf = [0u8; 8];
            svc2.receive(desc, 2, OWNER_ANY, &mut buf, &first_token)
        });
        thread::sleep(Duration::from_millis(20));
        token.cancel();
        assert_eq!(first.join().unwrap().unwrap_err(), TagError::Interrupted);

        // Now publish with nobody waiting: the send succeeds and the level is replaced by a
        // fresh empty successor. A receiver that arrives afterward does not observe it.
        svc.send(desc, 2, OWNER_ANY, b"x").unwrap();

        let later_token = CancellationToken::new();
        let t = later_token.clone();
        let svc3 = svc.clone();
        let later = thread::spawn(move || {
            let mut buf = [0u8; 8];
            svc3.receive(desc, 2, OWNER_ANY, &mut buf, &t)
        });
        thread::sleep(Duration::from_millis(20));
        later_token.cancel();
        assert_eq!(later.join().unwrap().unwrap_err(), TagError::Interrupted);
    }

    #[test]
    fn strict_remove_then_awake_all_then_remove() {
        let svc = StdArc::new(Service::new(Config::default()));
        let desc = svc.get(0, CREATE, OWNER_ANY).unwrap();

        let token = CancellationToken::new();
        let wait_token = token.clone();
        let svc2 = svc.clone();
        let handle = thread::spawn(move || {
            let mut buf = [0u8; 8];
            svc2.receive(desc, 1, OWNER_ANY, &mut buf, &wait_token)
        });
        thread::sleep(Duration::from_millis(30));

        assert_eq!(svc.ctl(desc, REMOVE, OWNER_ANY).unwrap_err(), TagError::Busy);
        svc.ctl(desc, AWAKE_ALL, OWNER_ANY).unwrap();
        assert_eq!(handle.join().unwrap().unwrap_err(), TagError::Interrupted);
        svc.ctl(desc, REMOVE, OWNER_ANY).unwrap();
    }

    #[test]
    fn message_too_big_is_rejected() {
        let svc = Service::new(Config {
            max_message_size: 4,
            ..Config::default()
        });
        let desc = svc.get(0, CREATE, OWNER_ANY).unwrap();
        assert_eq!(
            svc.send(desc, 0, OWNER_ANY, b"too long").unwrap_err(),
            TagError::MessageTooBig
        );
    }

    #[test]
    fn invalid_level_is_rejected() {
        let svc = Service::new(Config::default());
        let desc = svc.get(0, CREATE, OWNER_ANY).unwrap();
        let token = CancellationToken::new();
        let mut buf = [0u8; 1];
        assert_eq!(
            svc.receive(desc, -1, OWNER_ANY, &mut buf, &token).unwrap_err(),
            TagError::InvalidArgument
        );
    }

    #[test]
    fn shutdown_drains_blocked_receivers() {
        let svc = StdArc::new(Service::new(Config::default()));
        let desc = svc.get(0, CREATE, OWNER_ANY).unwrap();
        let token = CancellationToken::new();
        let wait_token = token.clone();
        let svc2 = svc.clone();
        let handle = thread::spawn(move || {
            let mut buf = [0u8; 8];
            svc2.receive(desc, 0, OWNER_ANY, &mut buf, &wait_token)
        });
        thread::sleep(Duration::from_millis(30));
        svc.shutdown();
        assert_eq!(handle.join().unwrap().unwrap_err(), TagError::Interrupted);
    }
}
