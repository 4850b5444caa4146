use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use concord_core::logging::get_test_logger;
use concord_raft::node::RaftConfig;
use concord_raft::RaftNode;

mod common;

/// Builds a three-node cluster with fixed, pre-reserved addresses and
/// spawns each node's RPC surface and election timer.
fn spawn_cluster() -> Vec<Arc<RaftNode>> {
    let names = vec!["n1".to_string(), "n2".to_string(), "n3".to_string()];
    let addresses: HashMap<String, String> = names
        .iter()
        .map(|name| (name.clone(), format!("127.0.0.1:{}", common::reserve_port())))
        .collect();

    let config = RaftConfig {
        election_timeout_min: Duration::from_millis(150),
        election_timeout_max: Duration::from_millis(300),
        heartbeat_interval: Duration::from_millis(30),
        rpc_timeout: Duration::from_millis(100),
    };

    let mut nodes = Vec::new();
    for name in &names {
        let peers: HashMap<String, String> = addresses
            .iter()
            .filter(|(n, _)| *n != name)
            .map(|(n, a)| (n.clone(), a.clone()))
            .collect();
        let log_store = common::log_store(name);
        let node = RaftNode::new(
            name.clone(),
            addresses[name].clone(),
            "test-cluster".to_string(),
            peers,
            config.clone(),
            get_test_logger(),
            log_store,
        )
        .unwrap();
        let (_resolved, _handle) = concord_raft::server::spawn(Arc::clone(&node)).unwrap();
        nodes.push(node);
    }
    nodes
}

fn wait_for_leader(nodes: &[Arc<RaftNode>], timeout: Duration) -> Option<Arc<RaftNode>> {
    let start = Instant::now();
    while start.elapsed() < timeout {
        let leaders: Vec<&Arc<RaftNode>> = nodes.iter().filter(|n| n.is_leader()).collect();
        if leaders.len() == 1 {
            return Some(Arc::clone(leaders[0]));
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    None
}

/// A fresh three-node cluster elects exactly one leader, replicates a
/// submitted value to every log, and a follower whose log file is deleted
/// fully resynchronizes on the next AppendEntries round.
#[test]
fn leader_election_replication_and_log_repair() {
    let nodes = spawn_cluster();

    let leader = wait_for_leader(&nodes, Duration::from_secs(5)).expect("cluster should elect exactly one leader");

    let response = leader.submit_value("x".to_string());
    assert!(response.is_success());

    let start = Instant::now();
    loop {
        let all_have_entry = nodes
            .iter()
            .all(|n| n.log_store.load_all().unwrap().iter().any(|e| e.command == "x"));
        if all_have_entry {
            break;
        }
        assert!(start.elapsed() < Duration::from_secs(3), "replication did not converge");
        std::thread::sleep(Duration::from_millis(20));
    }

    let leader_term = nodes
        .iter()
        .find(|n| Arc::ptr_eq(n, &leader))
        .unwrap()
        .log_store
        .load_all()
        .unwrap()[0]
        .term;
    for node in &nodes {
        let entries = node.log_store.load_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].term, leader_term);
        assert_eq!(entries[0].command, "x");
    }

    let follower = nodes.iter().find(|n| !Arc::ptr_eq(n, &leader)).unwrap();
    assert!(follower.delete_log_file());
    assert!(follower.log_store.load_all().unwrap().is_empty());

    let start = Instant::now();
    loop {
        if follower.log_store.load_all().unwrap().iter().any(|e| e.command == "x") {
            break;
        }
        assert!(start.elapsed() < Duration::from_secs(3), "follower did not resynchronize");
        std::thread::sleep(Duration::from_millis(20));
    }
}
