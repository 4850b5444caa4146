use std::time::Duration;

/// Peer/self identity. Raft nodes are addressed by name, not a synthetic
/// numeric id -- the cluster config is a map keyed by name.
pub type NodeId = String;

pub type Term = u64;

/// Signed so that "no entries yet" can be represented as `-1`, matching the
/// `(0, -1)` sentinel used for an empty log's (term, index).
pub type LogIndex = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

/// Static tuning parameters for a Raft node. `heartbeat_interval` is the
/// only one of these that can be retuned at runtime (`set_heartbeat_interval`,
/// the administrative operations below); the election timeout range is
/// fixed for the node's lifetime, though the concrete timeout is re-drawn
/// from this range on every election.
#[derive(Debug, Clone)]
pub struct RaftConfig {
    pub election_timeout_min: Duration,
    pub election_timeout_max: Duration,
    pub heartbeat_interval: Duration,
    /// Per-call timeout for outbound vote/append-entries/probe RPCs.
    pub rpc_timeout: Duration,
}

impl Default for RaftConfig {
    fn default() -> Self {
        RaftConfig {
            election_timeout_min: Duration::from_millis(150),
            election_timeout_max: Duration::from_millis(300),
            heartbeat_interval: Duration::from_millis(50),
            rpc_timeout: Duration::from_millis(100),
        }
    }
}
