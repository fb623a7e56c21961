//! Redis-backed session persistence.
//!
//! # Key Patterns
//!
//! - `signaling:session:{session_id}` - Session record (JSON), expires after the configured TTL
//! - `signaling:room:{room_id}:active` - ID of the room's active session
//!
//! Saves go through [`SAVE_UNLESS_ENDED`], a Lua script that writes both
//! keys atomically and refuses to overwrite a record already stored as
//! `ENDED`. Ending a session rewrites the record and deletes the pointer in
//! one `MULTI` pipeline.
//!
//! The `MultiplexedConnection` is cheap to clone and safe to use
//! concurrently; each call clones it rather than locking.

use super::persistence::SessionPersistence;
use super::record::SessionRecord;
use crate::errors::SignalingError;
use common::types::{RoomId, SessionId};
use redis::aio::MultiplexedConnection;
use redis::{Client, Script};
use tracing::{debug, error, instrument, warn};

/// Write the active record and room pointer unless the stored record has
/// already ended.
///
/// KEYS[1] = session key, KEYS[2] = room active key
/// ARGV[1] = record JSON, ARGV[2] = session ID, ARGV[3] = TTL seconds
///
/// Returns 1 on write, 0 if the stored record is ended.
pub const SAVE_UNLESS_ENDED: &str = r#"
local stored = redis.call('GET', KEYS[1])
if stored then
    local ok, decoded = pcall(cjson.decode, stored)
    if ok and decoded['status'] == 'ENDED' then
        return 0
    end
end

redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[3])
redis.call('SET', KEYS[2], ARGV[2], 'EX', ARGV[3])
return 1
"#;

/// Session persistence on a Redis server.
#[derive(Clone)]
pub struct RedisSessionPersistence {
    connection: MultiplexedConnection,
    ttl_seconds: u64,
    save_script: Script,
}

impl RedisSessionPersistence {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns `SignalingError::Redis` if the URL is invalid or the
    /// connection fails.
    pub async fn connect(redis_url: &str, ttl_seconds: u64) -> Result<Self, SignalingError> {
        // The URL may embed a password; never log it.
        let client = Client::open(redis_url).map_err(|e| {
            error!(target: "sig.persistence", error = %e, "Failed to open Redis client");
            SignalingError::Redis(format!("Failed to open Redis client: {e}"))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!(target: "sig.persistence", error = %e, "Failed to connect to Redis");
                SignalingError::Redis(format!("Failed to connect to Redis: {e}"))
            })?;

        Ok(Self {
            connection,
            ttl_seconds,
            save_script: Script::new(SAVE_UNLESS_ENDED),
        })
    }

    fn encode(record: &SessionRecord) -> Result<String, SignalingError> {
        serde_json::to_string(record)
            .map_err(|e| SignalingError::Internal(format!("Failed to encode session record: {e}")))
    }
}

pub(crate) fn session_key(session_id: &SessionId) -> String {
    format!("signaling:session:{session_id}")
}

pub(crate) fn room_active_key(room_id: &RoomId) -> String {
    format!("signaling:room:{room_id}:active")
}

#[async_trait::async_trait]
impl SessionPersistence for RedisSessionPersistence {
    #[instrument(skip_all, fields(room_id = %record.room_id, session_id = %record.session_id))]
    async fn save(&self, record: &SessionRecord) -> Result<(), SignalingError> {
        let json = Self::encode(record)?;
        let mut conn = self.connection.clone();

        let written: i64 = self
            .save_script
            .key(session_key(&record.session_id))
            .key(room_active_key(&record.room_id))
            .arg(json)
            .arg(record.session_id.to_string())
            .arg(self.ttl_seconds)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                error!(target: "sig.persistence", error = %e, "Failed to save session record");
                SignalingError::Redis(format!("Failed to save session record: {e}"))
            })?;

        if written == 0 {
            warn!(target: "sig.persistence", "Skipped save of an ended session");
            return Ok(());
        }

        debug!(target: "sig.persistence", "Session record saved");
        Ok(())
    }

    #[instrument(skip_all, fields(room_id = %record.room_id, session_id = %record.session_id))]
    async fn mark_ended(&self, record: &SessionRecord) -> Result<(), SignalingError> {
        let json = Self::encode(record)?;
        let mut conn = self.connection.clone();

        let _: () = redis::pipe()
            .atomic()
            .set_ex(session_key(&record.session_id), json, self.ttl_seconds)
            .del(room_active_key(&record.room_id))
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!(target: "sig.persistence", error = %e, "Failed to mark session ended");
                SignalingError::Redis(format!("Failed to mark session ended: {e}"))
            })?;

        debug!(target: "sig.persistence", "Session marked ended");
        Ok(())
    }
}
