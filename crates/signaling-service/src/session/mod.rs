//! Session state: live per-room sessions, their snapshots, and durability.

mod persistence;
mod record;
mod redis_store;
mod screens;
mod store;

pub use persistence::{mock, InMemorySessionPersistence, SessionPersistence};
pub use record::{ScreenShare, SessionRecord, SessionStatus};
pub use redis_store::RedisSessionPersistence;
pub use screens::{ScreenBoard, StartOutcome, StopOutcome};
pub use store::{LiveSession, SessionStore};
