//! In-process tag-based rendezvous message-passing engine.
//!
//! A multicast, non-persistent, zero-queue primitive: a publisher deposits one message at a
//! `(tag, level)` coordinate and every receiver currently blocked on that coordinate wakes up
//! and receives a copy. Nothing is buffered for receivers that arrive after the publish.
//!
//! The entry point is [`Service`]: construct one with [`Service::new`], share it (it is cheap
//! to clone) across the threads that call [`Service::get`], [`Service::send`],
//! [`Service::receive`], and [`Service::ctl`].

mod cancel;
mod config;
mod error;
mod facade;
mod level;
mod reclaim;
mod registry;
mod status;
mod tag;

pub use cancel::CancellationToken;
pub use config::{Config, DEFAULT_MAX_LEVELS, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_MAX_TAGS, DEFAULT_MAX_WAITERS_HINT, OWNER_ANY, PRIVATE_SENTINEL};
pub use error::{TagError, TagResult};
pub use facade::{CtlCommand, GetCommand, Service};
pub use level::{LevelSnapshot, WaitOutcome};
pub use registry::TagSnapshot;
pub use status::render as render_status;
