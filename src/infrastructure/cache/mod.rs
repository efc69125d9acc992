//! Cache Module
//!
//! Redis connection management and the cross-process rotation lock.
//!
//! Redis is optional: without `redis.url` key maintenance is serialized only
//! within the process, with the wrapped secret's version check as the last
//! line between concurrent writers.
//!
//! # Example
//!
//! ```rust,ignore
//! use delta_server::infrastructure::cache::{create_redis_client, RedisRotationLock};
//!
//! let conn = create_redis_client("redis://localhost:6379").await?;
//! let lock = RedisRotationLock::from_settings(conn, &settings.redis);
//! ```

mod rotation_lock;

pub use rotation_lock::RedisRotationLock;

use redis::aio::ConnectionManager;
use redis::Client;
use tracing::{info, instrument};

/// Creates a Redis connection manager with automatic reconnection.
#[instrument(skip(url))]
pub async fn create_redis_client(url: &str) -> Result<ConnectionManager, redis::RedisError> {
    info!("Connecting to Redis...");
    let client = Client::open(url)?;
    let manager = ConnectionManager::new(client).await?;
    info!("Redis connection established");
    Ok(manager)
}
