// =============================================================================
// Event Log — durable append-only streams with consumer-group semantics
// =============================================================================
//
// Abstract contract every worker in this pipeline talks to. Production traffic
// runs over Redis Streams (`redis_log`); tests and infra-free demo runs use an
// in-process double (`memory_log`) with identical at-least-once/PEL behavior.
//
// =============================================================================

pub mod memory_log;
pub mod redis_log;

pub use memory_log::InMemoryEventLog;
pub use redis_log::RedisEventLog;

use anyhow::Result;
use async_trait::async_trait;

/// Opaque, stream-local identifier. Monotone within one stream; not comparable across streams.
pub type EntryId = String;

/// One delivered entry: its id and the raw payload bytes published alongside it.
#[derive(Debug, Clone)]
pub struct StreamEntry {
    pub id: EntryId,
    pub payload: Vec<u8>,
}

/// Durable, ordered, append-only log with consumer-group delivery.
///
/// Implementations MUST provide at-least-once delivery: an entry returned by `read_group` stays
/// in that group's pending-entries list, assigned to `consumer`, until `ack` is called for it.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append `payload` to `stream`, trimming to approximately `max_length` if the stream grows
    /// past it. Returns the new entry's id.
    async fn publish(&self, stream: &str, payload: &[u8], max_length: i64) -> Result<EntryId>;

    /// Idempotently create `group` on `stream`, starting delivery from the beginning of the
    /// stream. Safe to call every time a worker starts.
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<()>;

    /// Block up to `block_ms` for new (never-delivered-to-`group`) entries, returning at most
    /// `count` of them. An empty result means the block timed out with nothing new.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: i64,
        block_ms: u64,
    ) -> Result<Vec<StreamEntry>>;

    /// Acknowledge `id`, removing it from `group`'s pending-entries list.
    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<()>;

    /// Total entries currently retained in `stream`.
    async fn stream_length(&self, stream: &str) -> Result<i64>;

    /// Number of entries in `group`'s pending-entries list on `stream`.
    async fn pending_count(&self, stream: &str, group: &str) -> Result<i64>;
}

/// Generate a consumer identity unique to this process run, so that restarting a worker never
/// collides with a stale consumer left behind in a group's pending-entries list.
pub fn new_consumer_name(worker: &str) -> String {
    format!("{worker}-{}", uuid::Uuid::new_v4())
}
