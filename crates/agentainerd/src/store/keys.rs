//! Keys — the complete Redis keyspace, in one place.
//!
//! Layout:
//!   agent:<id>                          JSON agent record (no TTL)
//!   agents                              set of all agent IDs
//!   agent:<id>:requests:<reqID>         JSON request record (TTL)
//!   agent:<id>:requests:{pending|completed|failed}   list of request IDs
//!   agent:<id>:requests:by-time         zset of request IDs scored by creation time
//!   agent:status:<id>                   pub/sub channel for status changes

/// Index set of all agent IDs.
pub const AGENTS_SET: &str = "agents";

/// Pattern matching every per-agent pending queue.
pub const PENDING_QUEUE_PATTERN: &str = "agent:*:requests:pending";

/// Pattern matching every per-agent time-scored request index.
pub const REQUEST_INDEX_PATTERN: &str = "agent:*:requests:by-time";

/// Pattern matching every status-change channel.
pub const STATUS_CHANNEL_PATTERN: &str = "agent:status:*";

/// Per-agent request queue names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Queue {
    Pending,
    Completed,
    Failed,
}

impl Queue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Queue::Pending => "pending",
            Queue::Completed => "completed",
            Queue::Failed => "failed",
        }
    }
}

pub fn agent(id: &str) -> String {
    format!("agent:{}", id)
}

pub fn request(agent_id: &str, request_id: &str) -> String {
    format!("agent:{}:requests:{}", agent_id, request_id)
}

pub fn queue(agent_id: &str, queue: Queue) -> String {
    format!("agent:{}:requests:{}", agent_id, queue.as_str())
}

/// Prefix owned by one agent; deleted wholesale on Remove.
pub fn agent_prefix_pattern(agent_id: &str) -> String {
    format!("agent:{}:*", agent_id)
}

/// Time-scored index of an agent's request IDs, used to prune queue entries
/// whose records have expired.
pub fn request_index(agent_id: &str) -> String {
    format!("agent:{}:requests:by-time", agent_id)
}

/// Recover the agent ID from a request-index key produced by [`request_index`].
pub fn agent_id_from_index_key(key: &str) -> Option<&str> {
    key.strip_prefix("agent:")?
        .strip_suffix(":requests:by-time")
}

pub fn status_channel(agent_id: &str) -> String {
    format!("agent:status:{}", agent_id)
}

/// Recover the agent ID from a pending-queue key produced by [`queue`].
pub fn agent_id_from_pending_key(key: &str) -> Option<&str> {
    key.strip_prefix("agent:")?
        .strip_suffix(":requests:pending")
}

/// Recover the agent ID from a status channel name.
pub fn agent_id_from_status_channel(channel: &str) -> Option<&str> {
    channel.strip_prefix("agent:status:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_shapes() {
        assert_eq!(agent("agent-1"), "agent:agent-1");
        assert_eq!(request("agent-1", "req-9"), "agent:agent-1:requests:req-9");
        assert_eq!(
            queue("agent-1", Queue::Pending),
            "agent:agent-1:requests:pending"
        );
        assert_eq!(
            queue("agent-1", Queue::Failed),
            "agent:agent-1:requests:failed"
        );
        assert_eq!(status_channel("agent-1"), "agent:status:agent-1");
    }

    #[test]
    fn pending_key_round_trips() {
        let key = queue("agent-xyz", Queue::Pending);
        assert_eq!(agent_id_from_pending_key(&key), Some("agent-xyz"));
    }

    #[test]
    fn pending_key_rejects_other_queues() {
        let key = queue("agent-xyz", Queue::Completed);
        assert_eq!(agent_id_from_pending_key(&key), None);
    }

    #[test]
    fn status_channel_round_trips() {
        let channel = status_channel("agent-7");
        assert_eq!(agent_id_from_status_channel(&channel), Some("agent-7"));
    }

    #[test]
    fn request_index_round_trips() {
        let key = request_index("agent-3");
        assert_eq!(key, "agent:agent-3:requests:by-time");
        assert_eq!(agent_id_from_index_key(&key), Some("agent-3"));
        assert_eq!(agent_id_from_index_key("agent:x:requests:pending"), None);
    }

    #[test]
    fn pending_key_with_colons_in_id() {
        // IDs are UUID-based and never contain colons, but the parser must
        // not panic on arbitrary keys matched by SCAN.
        assert_eq!(agent_id_from_pending_key("agent:requests:pending"), None);
        assert_eq!(agent_id_from_pending_key("bogus"), None);
    }
}
