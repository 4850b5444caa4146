use std::sync::Arc;

use concord_core::error::Result;
use concord_core::rpc::RpcServer;

use crate::messages::{
    AckResponse, AppendEntriesRequest, AppendEntriesResponse, DeleteLogFileResponse,
    HeartbeatIntervalResponse, IsLeaderResponse, SetHeartbeatIntervalRequest,
    SetReplicationSimulationRequest, SubmitValueRequest, SubmitValueResponse, VoteRequest, VoteResponse,
};
use crate::raft::RaftNode;

/// Registers every Raft endpoint on `server`, dispatching
/// into `node`. The election timer and heartbeat worker are started
/// separately by the caller before `listen` blocks the calling thread.
pub fn register_routes(server: &mut RpcServer, node: Arc<RaftNode>) {
    let n = Arc::clone(&node);
    server.route("/raft/vote", "raft_vote", move |request: VoteRequest| -> VoteResponse {
        n.handle_vote_request(request)
    });

    let n = Arc::clone(&node);
    server.route(
        "/raft/append_entries",
        "raft_append_entries",
        move |request: AppendEntriesRequest| -> AppendEntriesResponse { n.handle_append_entries(request) },
    );

    let n = Arc::clone(&node);
    server.route("/raft/is_leader", "raft_is_leader", move |_: ()| -> IsLeaderResponse {
        IsLeaderResponse {
            is_leader: n.is_leader(),
        }
    });

    let n = Arc::clone(&node);
    server.route(
        "/raft/heartbeat_interval",
        "raft_get_heartbeat_interval",
        move |_: ()| -> HeartbeatIntervalResponse {
            HeartbeatIntervalResponse {
                seconds: n.get_heartbeat_interval().as_secs_f64(),
            }
        },
    );

    let n = Arc::clone(&node);
    server.route(
        "/raft/set_heartbeat_interval",
        "raft_set_heartbeat_interval",
        move |request: SetHeartbeatIntervalRequest| -> AckResponse {
            n.set_heartbeat_interval(std::time::Duration::from_secs_f64(request.seconds));
            AckResponse { ack: true }
        },
    );

    let n = Arc::clone(&node);
    server.route(
        "/raft/set_replication_simulation",
        "raft_set_replication_simulation",
        move |request: SetReplicationSimulationRequest| -> AckResponse {
            n.set_replication_simulation(request.enabled);
            AckResponse { ack: true }
        },
    );

    let n = Arc::clone(&node);
    server.route(
        "/raft/submit_value",
        "raft_submit_value",
        move |request: SubmitValueRequest| -> SubmitValueResponse { n.submit_value(request.value) },
    );

    let n = Arc::clone(&node);
    server.route(
        "/raft/delete_log_file",
        "raft_delete_log_file",
        move |_: ()| -> DeleteLogFileResponse {
            DeleteLogFileResponse {
                deleted: n.delete_log_file(),
            }
        },
    );
}

/// Binds the Raft RPC surface and starts the election timer, without
/// blocking. Returns the resolved local address (useful when `node.address`
/// is `"127.0.0.1:0"`, as in tests) and the thread serving requests forever.
pub fn spawn(node: Arc<RaftNode>) -> Result<(String, std::thread::JoinHandle<()>)> {
    let mut server = RpcServer::new();
    register_routes(&mut server, Arc::clone(&node));
    let bound = server.bind(&node.address)?;
    let address = bound.local_addr();

    let timer_node = Arc::clone(&node);
    std::thread::spawn(move || timer_node.run_election_timer());

    let handle = std::thread::spawn(move || bound.serve_forever());
    Ok((address, handle))
}

/// Starts the election timer on a background thread and serves the Raft
/// RPC surface, blocking the calling thread forever.
pub fn run(node: Arc<RaftNode>) -> Result<()> {
    let mut server = RpcServer::new();
    register_routes(&mut server, Arc::clone(&node));

    let timer_node = Arc::clone(&node);
    std::thread::spawn(move || timer_node.run_election_timer());

    server.listen(&node.address)
}
