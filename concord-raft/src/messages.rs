use serde_derive::{Deserialize, Serialize};

use concord_core::store::LogEntry;

use crate::node::{LogIndex, NodeId, Term};

/// An RPC sent by candidates to gather votes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRequest {
    pub candidate_id: NodeId,
    pub term: Term,
    pub last_log_term: Term,
    pub last_log_index: LogIndex,
}

/// The response to a `VoteRequest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteResponse {
    /// The responding node's current term, for the candidate to update itself.
    pub term: Term,
    pub granted: bool,
}

/// An RPC sent by a cluster leader to replicate log entries, and as a
/// heartbeat when `entries` is empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntriesRequest {
    pub term: Term,
    pub leader_id: NodeId,
    pub prev_log_index: LogIndex,
    pub prev_log_term: Term,
    pub entries: Vec<LogEntry>,
    pub leader_commit: LogIndex,
}

/// The response to an `AppendEntriesRequest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntriesResponse {
    pub term: Term,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsLeaderResponse {
    pub is_leader: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatIntervalResponse {
    pub seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetHeartbeatIntervalRequest {
    pub seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetReplicationSimulationRequest {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckResponse {
    pub ack: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitValueRequest {
    pub value: String,
}

/// The user-visible result of `submit_value`: one of the enumerated
/// "Success: ..."/"Error: ..." strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitValueResponse {
    pub message: String,
}

impl SubmitValueResponse {
    pub fn success(detail: impl std::fmt::Display) -> SubmitValueResponse {
        SubmitValueResponse {
            message: format!("Success: {}", detail),
        }
    }

    pub fn error(detail: impl std::fmt::Display) -> SubmitValueResponse {
        SubmitValueResponse {
            message: format!("Error: {}", detail),
        }
    }

    pub fn is_success(&self) -> bool {
        self.message.starts_with("Success")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteLogFileResponse {
    pub deleted: bool,
}
