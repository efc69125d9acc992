//! Redis Rotation Lock
//!
//! Cross-process lease around key maintenance. Acquire is `SET key token NX PX
//! ttl`; release deletes the key only if it still holds our token, so an
//! expired lease taken over by another process is never released by us.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::RedisSettings;
use crate::domain::{LockLease, RotationLock};
use crate::shared::error::AppError;

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Redis-backed [`RotationLock`].
#[derive(Clone)]
pub struct RedisRotationLock {
    conn: ConnectionManager,
    key: String,
    ttl_ms: u64,
}

impl RedisRotationLock {
    pub fn new(conn: ConnectionManager, key: impl Into<String>, ttl_ms: u64) -> Self {
        Self {
            conn,
            key: key.into(),
            ttl_ms,
        }
    }

    pub fn from_settings(conn: ConnectionManager, settings: &RedisSettings) -> Self {
        Self::new(conn, settings.lock_key.clone(), settings.lock_ttl_secs * 1000)
    }
}

#[async_trait]
impl RotationLock for RedisRotationLock {
    #[instrument(skip(self), fields(key = %self.key), level = "debug")]
    async fn try_acquire(&self) -> Result<Option<LockLease>, AppError> {
        let token = Uuid::new_v4().to_string();
        let mut conn = self.conn.clone();

        let result: Option<String> = redis::cmd("SET")
            .arg(&self.key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(self.ttl_ms)
            .query_async(&mut conn)
            .await?;

        debug!(acquired = result.is_some(), "Rotation lease attempt");
        Ok(result.map(|_| LockLease { token }))
    }

    #[instrument(skip(self, lease), fields(key = %self.key), level = "debug")]
    async fn release(&self, lease: LockLease) -> Result<(), AppError> {
        let mut conn = self.conn.clone();

        let deleted: i64 = Script::new(RELEASE_SCRIPT)
            .key(&self.key)
            .arg(&lease.token)
            .invoke_async(&mut conn)
            .await?;

        if deleted == 0 {
            warn!("Rotation lease expired before release");
        }
        Ok(())
    }
}
