use std::time::Duration;

use redis::{Client, Script, aio::MultiplexedConnection};
use tracing::{debug, info};

#[derive(Clone)]
pub struct RedisService {
    client: Client,
}

impl RedisService {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = Client::open(connection_string)?;

        // Test connection
        let _conn = client.get_multiplexed_async_connection().await?;

        info!("✅ Connected to Redis");
        Ok(Self { client })
    }

    pub async fn get_conn(&self) -> Result<MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    /// `SET key token NX PX ttl`. Returns false when another holder owns the key.
    pub async fn set_lock(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, redis::RedisError> {
        let mut conn = self.get_conn().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    /// Delete `key` only if it still holds `token`.
    pub async fn release_lock(&self, key: &str, token: &str) -> Result<bool, redis::RedisError> {
        let mut conn = self.get_conn().await?;
        let script = Script::new(
            r#"
            if redis.call('GET', KEYS[1]) == ARGV[1] then
                return redis.call('DEL', KEYS[1])
            else
                return 0
            end
            "#,
        );
        let deleted: i32 = script.key(key).arg(token).invoke_async(&mut conn).await?;
        debug!(key = %key, released = deleted == 1, "Released lock");
        Ok(deleted == 1)
    }
}
