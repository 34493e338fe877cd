use async_trait::async_trait;
use berth_core::{AvailabilityCache, CoreError, CoreResult, InventoryKey, SeatInventory};
use redis::AsyncCommands;
use tracing::debug;

// Each key is a hash of `version` and `record`. The version survives invalidation as a
// floor, so a snapshot read before a commit cannot be written back after it.
const PUT_SCRIPT: &str = r#"
    local floor = tonumber(redis.call("HGET", KEYS[1], "version") or "-1")
    if floor > tonumber(ARGV[1]) then
        return 0
    end
    redis.call("HSET", KEYS[1], "version", ARGV[1], "record", ARGV[2])
    redis.call("EXPIRE", KEYS[1], ARGV[3])
    return 1
"#;

const INVALIDATE_SCRIPT: &str = r#"
    local floor = tonumber(redis.call("HGET", KEYS[1], "version") or "-1")
    if tonumber(ARGV[1]) > floor then
        redis.call("HSET", KEYS[1], "version", ARGV[1])
    end
    redis.call("HDEL", KEYS[1], "record")
    redis.call("EXPIRE", KEYS[1], ARGV[2])
    return 1
"#;

/// Read-through cache of inventory counters, keyed per (train, date, class).
///
/// Entries expire on their own; commits also delete them eagerly.
#[derive(Clone)]
pub struct RedisAvailabilityCache {
    client: redis::Client,
    ttl_seconds: u64,
}

impl RedisAvailabilityCache {
    pub async fn new(connection_string: &str, ttl_seconds: u64) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client, ttl_seconds })
    }

    fn cache_key(key: &InventoryKey) -> String {
        format!("avail:{}:{}:{}", key.train_number, key.journey_date, key.coach_class.code())
    }
}

fn cache_error(err: redis::RedisError) -> CoreError {
    CoreError::StorageError(format!("availability cache: {}", err))
}

#[async_trait]
impl AvailabilityCache for RedisAvailabilityCache {
    async fn get(&self, key: &InventoryKey) -> CoreResult<Option<SeatInventory>> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(cache_error)?;
        let raw: Option<String> = conn.hget(Self::cache_key(key), "record").await.map_err(cache_error)?;
        match raw {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| CoreError::StorageError(format!("corrupt cache entry for {}: {}", key, e))),
            None => Ok(None),
        }
    }

    async fn put(&self, record: &SeatInventory) -> CoreResult<()> {
        let json = serde_json::to_string(record).map_err(|e| CoreError::StorageError(e.to_string()))?;
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(cache_error)?;
        let stored: i32 = redis::Script::new(PUT_SCRIPT)
            .key(Self::cache_key(&record.key))
            .arg(record.version)
            .arg(json)
            .arg(self.ttl_seconds)
            .invoke_async(&mut conn)
            .await
            .map_err(cache_error)?;
        debug!(key = %record.key, version = record.version, stored = stored == 1, "availability cached");
        Ok(())
    }

    async fn invalidate(&self, key: &InventoryKey, committed_version: u64) -> CoreResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(cache_error)?;
        let _: i32 = redis::Script::new(INVALIDATE_SCRIPT)
            .key(Self::cache_key(key))
            .arg(committed_version)
            .arg(self.ttl_seconds)
            .invoke_async(&mut conn)
            .await
            .map_err(cache_error)?;
        Ok(())
    }
}
