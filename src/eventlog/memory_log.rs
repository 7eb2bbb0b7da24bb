// =============================================================================
// In-process EventLog — test double with the same at-least-once/PEL contract
// =============================================================================
//
// Backs unit and integration tests (and an infra-free demo run) with the exact
// delivery semantics `RedisEventLog` provides against a real server, without
// needing one running. Entries are keyed by a monotonically increasing
// sequence number per stream, formatted as the entry id.
//
// Note: `read_group`'s `block_ms` is not honored with a real sleep — callers
// in tests either publish before reading or accept an empty result. A
// production-accuracy blocking wait belongs to `RedisEventLog`, not this
// double.
//
// =============================================================================

use std::collections::{BTreeMap, HashMap};

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::RwLock;

use super::{EntryId, EventLog, StreamEntry};

#[derive(Default)]
struct GroupState {
    last_delivered_seq: u64,
    pending: HashMap<u64, Vec<u8>>,
}

#[derive(Default)]
struct StreamState {
    entries: BTreeMap<u64, Vec<u8>>,
    next_seq: u64,
    groups: HashMap<String, GroupState>,
}

#[derive(Default)]
pub struct InMemoryEventLog {
    streams: RwLock<HashMap<String, StreamState>>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn publish(&self, stream: &str, payload: &[u8], max_length: i64) -> Result<EntryId> {
        let mut streams = self.streams.write();
        let state = streams.entry(stream.to_string()).or_default();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(seq, payload.to_vec());

        let max_length = max_length.max(0) as usize;
        while state.entries.len() > max_length && max_length > 0 {
            if let Some((&oldest, _)) = state.entries.iter().next() {
                state.entries.remove(&oldest);
            } else {
                break;
            }
        }

        Ok(seq.to_string())
    }

    async fn ensure_group(&self, stream: &str, group: &str) -> Result<()> {
        let mut streams = self.streams.write();
        let state = streams.entry(stream.to_string()).or_default();
        state.groups.entry(group.to_string()).or_default();
        Ok(())
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        _consumer: &str,
        count: i64,
        _block_ms: u64,
    ) -> Result<Vec<StreamEntry>> {
        let mut streams = self.streams.write();
        let Some(state) = streams.get_mut(stream) else {
            return Ok(Vec::new());
        };
        let Some(group_state) = state.groups.get_mut(group) else {
            bail!("no such consumer group {group} on stream {stream}; call ensure_group first");
        };

        let count = count.max(0) as usize;
        let mut out = Vec::new();
        for (&seq, payload) in state
            .entries
            .range((group_state.last_delivered_seq + 1)..)
        {
            if out.len() >= count {
                break;
            }
            group_state.pending.insert(seq, payload.clone());
            group_state.last_delivered_seq = group_state.last_delivered_seq.max(seq);
            out.push(StreamEntry {
                id: seq.to_string(),
                payload: payload.clone(),
            });
        }
        Ok(out)
    }

    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<()> {
        let seq: u64 = id.parse().with_context_msg(stream, group, id)?;
        let mut streams = self.streams.write();
        if let Some(state) = streams.get_mut(stream) {
            if let Some(group_state) = state.groups.get_mut(group) {
                group_state.pending.remove(&seq);
            }
        }
        Ok(())
    }

    async fn stream_length(&self, stream: &str) -> Result<i64> {
        let streams = self.streams.read();
        Ok(streams.get(stream).map(|s| s.entries.len()).unwrap_or(0) as i64)
    }

    async fn pending_count(&self, stream: &str, group: &str) -> Result<i64> {
        let streams = self.streams.read();
        Ok(streams
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .map(|g| g.pending.len())
            .unwrap_or(0) as i64)
    }
}

trait ParseIdContext<T> {
    fn with_context_msg(self, stream: &str, group: &str, id: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> ParseIdContext<T> for std::result::Result<T, E> {
    fn with_context_msg(self, stream: &str, group: &str, id: &str) -> Result<T> {
        self.map_err(|e| {
            anyhow::anyhow!("invalid entry id {id} for stream {stream} group {group}: {e}")
        })
    }
}
