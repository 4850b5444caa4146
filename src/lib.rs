use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use concord_core::config::{ClusterConfig, ParticipantsConfig};
use concord_core::error::Result;
use concord_core::logging::get_root_logger;
use concord_core::store::{DurableAccountStore, DurableLogStore, DurableTransactionJournal};
use concord_raft::node::RaftConfig;
use concord_raft::RaftNode;
use concord_txn::{AuditLog, Coordinator, Participant};

/// Starts a Raft cluster member and serves forever: resolves this node's
/// address and peers from `config_path`, opens its durable log, and runs
/// the election timer plus the RPC surface.
pub fn run_raft(cluster: &str, node: &str, config_path: &str) -> Result<()> {
    let logger = get_root_logger();
    let config = ClusterConfig::from_file(config_path)?;
    let address = config
        .node_address(cluster, node)
        .ok_or_else(|| concord_core::error::ConcordError::Fatal(format!("no address for {}/{}", cluster, node)))?;
    let peers = config.peers(cluster, node);

    let log_path = format!("{}-{}.raftlog", cluster, node);
    let log_store = Arc::new(DurableLogStore::new(log_path, logger.clone())?);

    slog::info!(logger, "starting raft node"; "cluster" => cluster, "node" => node, "address" => address.clone());

    let raft_node = RaftNode::new(
        node.to_string(),
        address,
        cluster.to_string(),
        peers,
        RaftConfig::default(),
        logger,
        log_store,
    )?;

    concord_raft::server::run(raft_node)
}

/// Starts a single 2PC participant, optionally pushing its own audit
/// records to a Raft cluster named in `raft_peers`.
pub fn run_participant(
    address: &str,
    account: &str,
    initial_balance: i64,
    raft_peers: Option<HashMap<String, String>>,
) -> Result<()> {
    let logger = get_root_logger();
    let account_path = format!("{}.account", account);
    let store = Arc::new(DurableAccountStore::new(account_path, initial_balance, logger.clone())?);

    slog::info!(logger, "starting participant"; "account" => account, "address" => address);

    let mut participant = Participant::new(account, address, account, store, logger.clone());
    if let Some(peers) = raft_peers {
        let addresses: Vec<String> = peers.into_values().collect();
        participant = participant.with_audit_log(AuditLog::new(addresses, Duration::from_millis(500)));
    }

    concord_txn::server::run_participant(address.to_string(), Arc::new(participant))
}

/// Starts a 2PC coordinator over the participants named in `participants_path`,
/// optionally pushing commit audit records to a Raft cluster in
/// `raft_peers`.
pub fn run_coordinator(
    address: &str,
    timeout_ms: u64,
    participants_path: &str,
    raft_peers: Option<HashMap<String, String>>,
) -> Result<()> {
    let logger = get_root_logger();
    let participants = ParticipantsConfig::from_file(participants_path)?;
    let journal_path = format!("{}.journal", address.replace(':', "_"));
    let journal = Arc::new(DurableTransactionJournal::new(journal_path, logger.clone())?);

    let audit_log = raft_peers.map(|peers| {
        let addresses: Vec<String> = peers.into_values().collect();
        AuditLog::new(addresses, Duration::from_millis(500))
    });

    slog::info!(logger, "starting coordinator"; "address" => address, "timeout_ms" => timeout_ms);

    let coordinator = Coordinator::new(
        address,
        Duration::from_millis(timeout_ms),
        participants.participants,
        journal,
        logger,
        audit_log,
    );

    concord_txn::server::run_coordinator(address.to_string(), Arc::new(coordinator))
}
