pub mod election;
pub mod messages;
pub mod node;
pub mod raft;
pub mod replication;
pub mod server;

pub use node::{LogIndex, NodeId, RaftConfig, Role, Term};
pub use raft::RaftNode;
