// =============================================================================
// Redis Streams EventLog — production transport
// =============================================================================
//
// Issues the same XADD/XGROUP CREATE/XREADGROUP/XACK/XLEN/XPENDING sequence the
// original event bus issued over redis.asyncio, via `redis`'s raw `cmd()`
// interface (no higher-level streams wrapper exists for this crate).
//
// =============================================================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

use super::{EntryId, EventLog, StreamEntry};

pub struct RedisEventLog {
    conn: ConnectionManager,
}

impl RedisEventLog {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .with_context(|| format!("invalid redis url: {url}"))?;
        let conn = ConnectionManager::new(client)
            .await
            .context("failed to establish redis connection manager")?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl EventLog for RedisEventLog {
    async fn publish(&self, stream: &str, payload: &[u8], max_length: i64) -> Result<EntryId> {
        let mut conn = self.conn.clone();
        let id: String = redis::cmd("XADD")
            .arg(stream)
            .arg("MAXLEN")
            .arg("~")
            .arg(max_length)
            .arg("*")
            .arg("payload")
            .arg(payload)
            .query_async(&mut conn)
            .await
            .with_context(|| format!("XADD failed on stream {stream}"))?;
        Ok(id)
    }

    async fn ensure_group(&self, stream: &str, group: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(stream, group, "consumer group already exists");
                Ok(())
            }
            Err(e) => {
                Err(e).with_context(|| format!("XGROUP CREATE failed on stream {stream}"))
            }
        }
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: i64,
        block_ms: u64,
    ) -> Result<Vec<StreamEntry>> {
        let mut conn = self.conn.clone();
        let reply: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(group)
            .arg(consumer)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(stream)
            .arg(">")
            .query_async(&mut conn)
            .await
            .with_context(|| format!("XREADGROUP failed on stream {stream}"))?;

        let mut entries = Vec::new();
        for stream_key in reply.keys {
            for id in stream_key.ids {
                let payload: Vec<u8> = id
                    .map
                    .get("payload")
                    .and_then(|v| match v {
                        redis::Value::BulkString(bytes) => Some(bytes.clone()),
                        _ => None,
                    })
                    .unwrap_or_default();
                entries.push(StreamEntry { id: id.id, payload });
            }
        }
        Ok(entries)
    }

    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .xack(stream, group, &[id])
            .await
            .with_context(|| format!("XACK failed on stream {stream} id {id}"))?;
        Ok(())
    }

    async fn stream_length(&self, stream: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        let len: i64 = conn
            .xlen(stream)
            .await
            .with_context(|| format!("XLEN failed on stream {stream}"))?;
        Ok(len)
    }

    async fn pending_count(&self, stream: &str, group: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        let reply: redis::streams::StreamPendingReply = redis::cmd("XPENDING")
            .arg(stream)
            .arg(group)
            .query_async(&mut conn)
            .await
            .with_context(|| format!("XPENDING failed on stream {stream}"))?;

        Ok(match reply {
            redis::streams::StreamPendingReply::Empty => 0,
            redis::streams::StreamPendingReply::Data(data) => data.count as i64,
        })
    }
}
