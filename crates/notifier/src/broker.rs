//! Message broker — Redis Streams.
//!
//! One stream per topic. Each entry carries the resource id under `key` and
//! the serialized notification under `payload`. Consumers read with
//! `XREAD`/`XREADGROUP` and deduplicate on the payload's `(id, occurred_at)`.

use async_trait::async_trait;
use redis::aio::ConnectionManager;

#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Publish one message. `Ok` means the broker acknowledged it.
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> anyhow::Result<()>;
}

/// Publishes with `XADD`, optionally trimming each stream to roughly
/// `max_len` entries.
#[derive(Clone)]
pub struct RedisStreamBroker {
    redis: ConnectionManager,
    max_len: Option<usize>,
}

impl RedisStreamBroker {
    pub fn new(redis: ConnectionManager, max_len: Option<usize>) -> Self {
        Self { redis, max_len }
    }

    /// `XADD topic [MAXLEN ~ n] * key <key> payload <payload>`
    pub fn xadd_command(topic: &str, key: &str, payload: &str, max_len: Option<usize>) -> redis::Cmd {
        let mut cmd = redis::cmd("XADD");
        cmd.arg(topic);
        if let Some(max_len) = max_len {
            cmd.arg("MAXLEN").arg("~").arg(max_len);
        }
        cmd.arg("*").arg("key").arg(key).arg("payload").arg(payload);
        cmd
    }
}

#[async_trait]
impl MessageBroker for RedisStreamBroker {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> anyhow::Result<()> {
        // ConnectionManager clones share one multiplexed connection.
        let mut redis = self.redis.clone();
        let entry_id: String = Self::xadd_command(topic, key, payload, self.max_len)
            .query_async(&mut redis)
            .await?;

        tracing::debug!(topic, key, entry_id = %entry_id, "Published to stream");
        Ok(())
    }
}
