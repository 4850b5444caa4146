use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use slog::Logger;

use concord_core::error::ConcordError;
use concord_core::rpc::RpcClient;
use concord_core::store::{DurableLogStore, LogEntry};

use crate::election::{Election, ElectionStatus};
use crate::messages::{AppendEntriesRequest, AppendEntriesResponse, SubmitValueResponse, VoteRequest, VoteResponse};
use crate::node::{LogIndex, NodeId, RaftConfig, Role, Term};
use crate::replication::ReplicationProgress;

struct RaftState {
    current_term: Term,
    voted_for: Option<NodeId>,
    role: Role,
    commit_index: LogIndex,
    last_applied: LogIndex,
    last_heartbeat: Instant,
    election_timeout: Duration,
    heartbeat_interval: Duration,
    election: Election,
    progress: ReplicationProgress,
    replication_failure_simulation: bool,
    heartbeat_epoch: u64,
}

/// A single Raft node: election, heartbeats, log replication and repair,
/// client submission, and the administrative test hooks.
pub struct RaftNode {
    pub id: NodeId,
    pub address: String,
    pub cluster_name: String,
    pub peers: HashMap<NodeId, String>,
    pub config: RaftConfig,
    pub logger: Logger,
    pub log_store: Arc<DurableLogStore>,
    rpc: RpcClient,
    state: Mutex<RaftState>,
    heartbeat_epoch_counter: AtomicU64,
}

const VOTE_PATH: &str = "/raft/vote";
const APPEND_ENTRIES_PATH: &str = "/raft/append_entries";
const IS_LEADER_PATH: &str = "/raft/is_leader";
const SUBMIT_VALUE_PATH: &str = "/raft/submit_value";

impl RaftNode {
    pub fn new(
        id: NodeId,
        address: String,
        cluster_name: String,
        peers: HashMap<NodeId, String>,
        config: RaftConfig,
        logger: Logger,
        log_store: Arc<DurableLogStore>,
    ) -> concord_core::error::Result<Arc<RaftNode>> {
        let meta = log_store.load_meta()?;
        let election_timeout = Self::draw_election_timeout(&config);
        let heartbeat_interval = config.heartbeat_interval;
        let state = RaftState {
            current_term: meta.current_term,
            voted_for: meta.voted_for,
            role: Role::Follower,
            commit_index: -1,
            last_applied: -1,
            last_heartbeat: Instant::now(),
            election_timeout,
            heartbeat_interval,
            election: Election::new(peers.len() + 1),
            progress: ReplicationProgress::default(),
            replication_failure_simulation: false,
            heartbeat_epoch: 0,
        };

        Ok(Arc::new(RaftNode {
            id,
            address,
            cluster_name,
            peers,
            config,
            logger,
            log_store,
            rpc: RpcClient::new(),
            state: Mutex::new(state),
            heartbeat_epoch_counter: AtomicU64::new(0),
        }))
    }

    fn draw_election_timeout(config: &RaftConfig) -> Duration {
        let min = config.election_timeout_min.as_millis() as u64;
        let max = config.election_timeout_max.as_millis() as u64;
        let millis = if max > min {
            rand::thread_rng().gen_range(min..max)
        } else {
            min
        };
        Duration::from_millis(millis)
    }

    fn fatal(&self, err: ConcordError) -> ! {
        slog::error!(self.logger, "fatal error, shutting down"; "error" => format!("{}", err));
        std::process::exit(1);
    }

    /// Starts the election-timer worker. Intended to be spawned on a
    /// dedicated thread; runs for the lifetime of the process.
    pub fn run_election_timer(self: &Arc<Self>) {
        loop {
            thread::sleep(Duration::from_millis(10));
            let should_elect = {
                let state = self.state.lock().unwrap();
                state.role != Role::Leader && state.last_heartbeat.elapsed() > state.election_timeout
            };
            if should_elect {
                self.start_election();
            }
        }
    }

    fn last_log_term_index(&self) -> concord_core::error::Result<(Term, LogIndex)> {
        let entries = self.log_store.load_all()?;
        match entries.last() {
            Some(e) => Ok((e.term, (entries.len() - 1) as LogIndex)),
            None => Ok((0, -1)),
        }
    }

    /// Candidate-for-term-T election procedure.
    pub fn start_election(self: &Arc<Self>) {
        let (term, peers) = {
            let mut state = self.state.lock().unwrap();
            state.current_term += 1;
            state.voted_for = Some(self.id.clone());
            state.role = Role::Candidate;
            state.election = Election::new(self.peers.len() + 1);
            state.election.vote(self.id.clone(), true);
            state.election_timeout = Self::draw_election_timeout(&self.config);
            state.last_heartbeat = Instant::now();
            let term = state.current_term;
            if let Err(e) = self.log_store.save_meta(concord_core::store::PersistedMeta {
                current_term: term,
                voted_for: state.voted_for.clone(),
            }) {
                drop(state);
                self.fatal(e);
            }
            (term, self.peers.clone())
        };

        slog::info!(self.logger, "seeking election"; "term" => term, "node" => self.id.clone());

        let (last_log_term, last_log_index) = match self.last_log_term_index() {
            Ok(v) => v,
            Err(e) => self.fatal(e),
        };

        for (peer_name, peer_addr) in peers {
            let this = Arc::clone(self);
            let request = VoteRequest {
                candidate_id: this.id.clone(),
                term,
                last_log_term,
                last_log_index,
            };
            let rpc_timeout = this.config.rpc_timeout;
            thread::spawn(move || {
                let result: concord_core::error::Result<VoteResponse> =
                    this.rpc.call(&peer_addr, VOTE_PATH, &request, rpc_timeout);
                match result {
                    Ok(response) => this.handle_vote_response(term, peer_name, response),
                    Err(e) => {
                        if e.is_transient() {
                            slog::debug!(this.logger, "vote request failed (transient)"; "peer" => peer_name, "error" => format!("{}", e));
                        }
                    }
                }
            });
        }
    }

    fn handle_vote_response(self: &Arc<Self>, requested_term: Term, from: NodeId, response: VoteResponse) {
        let mut state = self.state.lock().unwrap();
        if response.term > state.current_term {
            self.step_down_locked(&mut state, response.term);
            return;
        }
        if state.role != Role::Candidate || state.current_term != requested_term {
            return;
        }
        state.election.vote(from.clone(), response.granted);
        slog::info!(self.logger, "received vote"; "from" => from, "granted" => response.granted);
        match state.election.status() {
            ElectionStatus::Elected => {
                self.become_leader_locked(&mut state);
            }
            ElectionStatus::Defeated => {
                state.role = Role::Follower;
            }
            ElectionStatus::Voting => {}
        }
    }

    fn become_leader_locked(self: &Arc<Self>, state: &mut RaftState) {
        slog::info!(self.logger, "elected leader"; "term" => state.current_term);
        state.role = Role::Leader;
        let log_len = self.log_store.load_all().map(|v| v.len()).unwrap_or(0);
        state.progress = ReplicationProgress::new(self.peers.keys(), log_len);
        let epoch = self.heartbeat_epoch_counter.fetch_add(1, Ordering::SeqCst) + 1;
        state.heartbeat_epoch = epoch;

        let this = Arc::clone(self);
        thread::spawn(move || this.run_heartbeat_worker(epoch));
    }

    fn step_down_locked(&self, state: &mut RaftState, new_term: Term) {
        if new_term > state.current_term {
            state.current_term = new_term;
            state.voted_for = None;
            if let Err(e) = self.log_store.save_meta(concord_core::store::PersistedMeta {
                current_term: new_term,
                voted_for: None,
            }) {
                self.fatal(e);
            }
        }
        state.role = Role::Follower;
    }

    fn run_heartbeat_worker(self: Arc<Self>, epoch: u64) {
        loop {
            let (interval, alive) = {
                let state = self.state.lock().unwrap();
                (
                    state.heartbeat_interval,
                    state.role == Role::Leader && state.heartbeat_epoch == epoch,
                )
            };
            if !alive {
                return;
            }
            self.replicate_all();
            thread::sleep(interval);
        }
    }

    /// Fans out AppendEntries (heartbeat or replication) to every peer in
    /// parallel, one worker per peer.
    pub fn replicate_all(self: &Arc<Self>) {
        let (simulate_failure, term) = {
            let state = self.state.lock().unwrap();
            (state.replication_failure_simulation, state.current_term)
        };
        if simulate_failure {
            return;
        }
        for (peer_name, peer_addr) in self.peers.clone() {
            let this = Arc::clone(self);
            thread::spawn(move || this.replicate_to_peer(term, peer_name, peer_addr));
        }
    }

    fn replicate_to_peer(self: Arc<Self>, term: Term, peer_name: NodeId, peer_addr: String) {
        let next_index = {
            let state = self.state.lock().unwrap();
            if state.role != Role::Leader || state.current_term != term {
                return;
            }
            state.progress.next_index(&peer_name)
        };

        let entries = match self.log_store.load_all() {
            Ok(e) => e,
            Err(e) => self.fatal(e),
        };
        let prev_log_index = next_index as LogIndex - 1;
        let prev_log_term = if prev_log_index >= 0 {
            entries
                .get(prev_log_index as usize)
                .map(|e| e.term)
                .unwrap_or(0)
        } else {
            0
        };
        let to_send: Vec<LogEntry> = entries.get(next_index..).map(|s| s.to_vec()).unwrap_or_default();

        let commit_index = self.state.lock().unwrap().commit_index;
        let request = AppendEntriesRequest {
            term,
            leader_id: self.id.clone(),
            prev_log_index,
            prev_log_term,
            entries: to_send.clone(),
            leader_commit: commit_index,
        };

        let result: concord_core::error::Result<AppendEntriesResponse> =
            self.rpc.call(&peer_addr, APPEND_ENTRIES_PATH, &request, self.config.rpc_timeout);

        let mut state = self.state.lock().unwrap();
        if state.role != Role::Leader || state.current_term != term {
            return;
        }
        match result {
            Ok(response) => {
                if response.term > state.current_term {
                    self.step_down_locked(&mut state, response.term);
                    return;
                }
                if response.success {
                    state
                        .progress
                        .record_success(&peer_name, prev_log_index, to_send.len());
                    self.advance_commit_index(&mut state);
                } else {
                    state.progress.record_failure(&peer_name);
                }
            }
            Err(e) => {
                if e.is_transient() {
                    slog::debug!(self.logger, "append entries failed (transient)"; "peer" => peer_name, "error" => format!("{}", e));
                }
            }
        }
    }

    fn advance_commit_index(&self, state: &mut RaftState) {
        let members: Vec<NodeId> = self.peers.keys().cloned().collect();
        let entries = match self.log_store.load_all() {
            Ok(e) => e,
            Err(e) => self.fatal(e),
        };
        let self_match = entries.len() as LogIndex - 1;
        let candidate = state.progress.majority_match_index(&members, self_match);
        if candidate > state.commit_index
            && candidate >= 0
            && (candidate as usize) < entries.len()
            && entries[candidate as usize].term == state.current_term
        {
            state.commit_index = candidate;
            self.apply_committed(state, &entries);
        }
    }

    fn apply_committed(&self, state: &mut RaftState, entries: &[LogEntry]) {
        let mut idx = state.last_applied + 1;
        while idx <= state.commit_index {
            if let Some(entry) = entries.get(idx as usize) {
                slog::info!(self.logger, "applying committed entry"; "index" => idx, "term" => entry.term, "command" => entry.command.clone());
            }
            idx += 1;
        }
        state.last_applied = state.commit_index;
    }

    /// Handles an inbound `RequestVote` RPC.
    pub fn handle_vote_request(&self, request: VoteRequest) -> VoteResponse {
        let mut state = self.state.lock().unwrap();

        if request.term < state.current_term {
            return VoteResponse {
                term: state.current_term,
                granted: false,
            };
        }

        let (my_last_term, my_last_index) = match self.last_log_term_index() {
            Ok(v) => v,
            Err(e) => {
                drop(state);
                self.fatal(e);
            }
        };
        let candidate_up_to_date = request.last_log_term > my_last_term
            || (request.last_log_term == my_last_term && request.last_log_index >= my_last_index);

        if !candidate_up_to_date {
            if request.term > state.current_term {
                state.current_term = request.term;
                state.voted_for = None;
                state.role = Role::Follower;
                if let Err(e) = self.log_store.save_meta(concord_core::store::PersistedMeta {
                    current_term: request.term,
                    voted_for: None,
                }) {
                    drop(state);
                    self.fatal(e);
                }
            }
            return VoteResponse {
                term: state.current_term,
                granted: false,
            };
        }

        let may_grant = request.term > state.current_term
            || (request.term == state.current_term
                && match &state.voted_for {
                    None => true,
                    Some(c) => *c == request.candidate_id,
                });

        if may_grant {
            state.current_term = request.term;
            state.voted_for = Some(request.candidate_id.clone());
            state.role = Role::Follower;
            state.last_heartbeat = Instant::now();
            if let Err(e) = self.log_store.save_meta(concord_core::store::PersistedMeta {
                current_term: request.term,
                voted_for: Some(request.candidate_id.clone()),
            }) {
                drop(state);
                self.fatal(e);
            }
            slog::info!(self.logger, "granted vote"; "candidate" => request.candidate_id.clone(), "term" => request.term);
            VoteResponse {
                term: state.current_term,
                granted: true,
            }
        } else {
            VoteResponse {
                term: state.current_term,
                granted: false,
            }
        }
    }

    /// Handles an inbound `AppendEntries` RPC, heartbeat or replication
    /// (term check, prev-index/term check, truncate-on-conflict, append, commit).
    pub fn handle_append_entries(&self, request: AppendEntriesRequest) -> AppendEntriesResponse {
        if let Err(e) = self.log_store.refresh() {
            self.fatal(e);
        }

        let mut state = self.state.lock().unwrap();
        if request.term < state.current_term {
            return AppendEntriesResponse {
                term: state.current_term,
                success: false,
            };
        }

        if request.term > state.current_term {
            state.current_term = request.term;
            state.voted_for = None;
        }
        state.role = Role::Follower;
        state.last_heartbeat = Instant::now();
        if let Err(e) = self.log_store.save_meta(concord_core::store::PersistedMeta {
            current_term: state.current_term,
            voted_for: state.voted_for.clone(),
        }) {
            drop(state);
            self.fatal(e);
        }

        let mut entries = match self.log_store.load_all() {
            Ok(e) => e,
            Err(e) => {
                drop(state);
                self.fatal(e);
            }
        };

        if request.prev_log_index >= entries.len() as LogIndex {
            return AppendEntriesResponse {
                term: state.current_term,
                success: false,
            };
        }

        if request.prev_log_index >= 0 {
            let prev_term = entries[request.prev_log_index as usize].term;
            if prev_term != request.prev_log_term {
                entries.truncate(request.prev_log_index as usize);
                if let Err(e) = self.log_store.replace_all(entries) {
                    drop(state);
                    self.fatal(e);
                }
                return AppendEntriesResponse {
                    term: state.current_term,
                    success: false,
                };
            }
        }

        let mut idx = request.prev_log_index + 1;
        for entry in request.entries {
            if (idx as usize) < entries.len() {
                if entries[idx as usize].term != entry.term {
                    entries.truncate(idx as usize);
                    entries.push(entry);
                }
            } else {
                entries.push(entry);
            }
            idx += 1;
        }

        if let Err(e) = self.log_store.replace_all(entries.clone()) {
            drop(state);
            self.fatal(e);
        }

        if request.leader_commit > state.commit_index {
            state.commit_index = request.leader_commit.min(entries.len() as LogIndex - 1);
            self.apply_committed(&mut state, &entries);
        }

        AppendEntriesResponse {
            term: state.current_term,
            success: true,
        }
    }

    pub fn is_leader(&self) -> bool {
        self.state.lock().unwrap().role == Role::Leader
    }

    pub fn get_heartbeat_interval(&self) -> Duration {
        self.state.lock().unwrap().heartbeat_interval
    }

    pub fn set_heartbeat_interval(&self, interval: Duration) {
        self.state.lock().unwrap().heartbeat_interval = interval;
    }

    pub fn set_replication_simulation(&self, enabled: bool) {
        self.state.lock().unwrap().replication_failure_simulation = enabled;
    }

    pub fn delete_log_file(&self) -> bool {
        self.log_store.delete().is_ok()
    }

    /// Submits a value to the cluster. If this node is the leader, appends
    /// it locally and kicks off replication; otherwise probes peers for the
    /// current leader and forwards.
    pub fn submit_value(self: &Arc<Self>, value: String) -> SubmitValueResponse {
        let (is_leader, term) = {
            let state = self.state.lock().unwrap();
            (state.role == Role::Leader, state.current_term)
        };

        if is_leader {
            let entry = LogEntry::new(term, value.clone());
            if let Err(e) = self.log_store.append(entry) {
                self.fatal(e);
            }
            {
                // A leader is trivially its own majority, so a peerless
                // cluster commits immediately rather than waiting on
                // AppendEntries responses that will never arrive.
                let mut state = self.state.lock().unwrap();
                if state.role == Role::Leader && state.current_term == term {
                    self.advance_commit_index(&mut state);
                }
            }
            self.replicate_all();
            return SubmitValueResponse::success(format!("submitted '{}' at term {}", value, term));
        }

        match self.find_leader() {
            Some(addr) => {
                let request = crate::messages::SubmitValueRequest { value };
                match self
                    .rpc
                    .call::<_, SubmitValueResponse>(&addr, SUBMIT_VALUE_PATH, &request, self.config.rpc_timeout)
                {
                    Ok(response) => response,
                    Err(e) => SubmitValueResponse::error(format!("failed to forward to leader: {}", e)),
                }
            }
            None => SubmitValueResponse::error("no leader"),
        }
    }

    fn find_leader(&self) -> Option<String> {
        for addr in self.peers.values() {
            let result: concord_core::error::Result<crate::messages::IsLeaderResponse> =
                self.rpc.call(addr, IS_LEADER_PATH, &(), self.config.rpc_timeout);
            if let Ok(response) = result {
                if response.is_leader {
                    return Some(addr.clone());
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_core::logging::get_test_logger;
    use std::sync::atomic::{AtomicU64 as TestCounter, Ordering as TestOrdering};

    static COUNTER: TestCounter = TestCounter::new(0);

    fn temp_log_path(name: &str) -> std::path::PathBuf {
        let n = COUNTER.fetch_add(1, TestOrdering::SeqCst);
        std::env::temp_dir().join(format!("concord-raft-test-{}-{}-{}", std::process::id(), n, name))
    }

    fn new_node(id: &str, peers: HashMap<NodeId, String>) -> Arc<RaftNode> {
        let path = temp_log_path(id);
        let store = Arc::new(DurableLogStore::new(path, get_test_logger()).unwrap());
        RaftNode::new(
            id.to_string(),
            "127.0.0.1:0".to_string(),
            "test-cluster".to_string(),
            peers,
            RaftConfig::default(),
            get_test_logger(),
            store,
        )
        .unwrap()
    }

    #[test]
    fn fresh_node_starts_as_follower() {
        let node = new_node("n1", HashMap::new());
        assert!(!node.is_leader());
    }

    #[test]
    fn vote_denied_for_stale_term() {
        let node = new_node("n1", HashMap::new());
        {
            let mut state = node.state.lock().unwrap();
            state.current_term = 5;
        }
        let response = node.handle_vote_request(VoteRequest {
            candidate_id: "n2".to_string(),
            term: 3,
            last_log_term: 0,
            last_log_index: -1,
        });
        assert!(!response.granted);
        assert_eq!(response.term, 5);
    }

    #[test]
    fn vote_granted_once_per_term() {
        let node = new_node("n1", HashMap::new());
        let first = node.handle_vote_request(VoteRequest {
            candidate_id: "n2".to_string(),
            term: 1,
            last_log_term: 0,
            last_log_index: -1,
        });
        assert!(first.granted);

        let second = node.handle_vote_request(VoteRequest {
            candidate_id: "n3".to_string(),
            term: 1,
            last_log_term: 0,
            last_log_index: -1,
        });
        assert!(!second.granted);
    }

    #[test]
    fn append_entries_rejects_gap() {
        let node = new_node("n1", HashMap::new());
        let response = node.handle_append_entries(AppendEntriesRequest {
            term: 1,
            leader_id: "leader".to_string(),
            prev_log_index: 5,
            prev_log_term: 0,
            entries: vec![],
            leader_commit: -1,
        });
        assert!(!response.success);
    }

    #[test]
    fn append_entries_populates_empty_log() {
        let node = new_node("n1", HashMap::new());
        let response = node.handle_append_entries(AppendEntriesRequest {
            term: 1,
            leader_id: "leader".to_string(),
            prev_log_index: -1,
            prev_log_term: 0,
            entries: vec![LogEntry::new(1, "x")],
            leader_commit: 0,
        });
        assert!(response.success);
        assert_eq!(node.log_store.load_all().unwrap(), vec![LogEntry::new(1, "x")]);
    }

    #[test]
    fn append_entries_truncates_conflicting_suffix() {
        let node = new_node("n1", HashMap::new());
        node.handle_append_entries(AppendEntriesRequest {
            term: 1,
            leader_id: "leader".to_string(),
            prev_log_index: -1,
            prev_log_term: 0,
            entries: vec![LogEntry::new(1, "a"), LogEntry::new(1, "b")],
            leader_commit: -1,
        });

        // A new leader for term 2 says index 0 still matches at term 1, but
        // offers a different entry for index 1.
        let response = node.handle_append_entries(AppendEntriesRequest {
            term: 2,
            leader_id: "leader2".to_string(),
            prev_log_index: 0,
            prev_log_term: 1,
            entries: vec![LogEntry::new(2, "c")],
            leader_commit: -1,
        });
        assert!(response.success);
        assert_eq!(
            node.log_store.load_all().unwrap(),
            vec![LogEntry::new(1, "a"), LogEntry::new(2, "c")]
        );
    }

    #[test]
    fn submit_value_as_leader_appends_locally() {
        let node = new_node("n1", HashMap::new());
        {
            let mut state = node.state.lock().unwrap();
            state.role = Role::Leader;
            state.progress = ReplicationProgress::new(std::iter::empty(), 0);
        }
        let response = node.submit_value("hello".to_string());
        assert!(response.is_success());
        assert_eq!(node.log_store.load_all().unwrap(), vec![LogEntry::new(0, "hello")]);
    }

    #[test]
    fn submit_value_on_peerless_cluster_commits_immediately() {
        let node = new_node("n1", HashMap::new());
        {
            let mut state = node.state.lock().unwrap();
            state.role = Role::Leader;
            state.progress = ReplicationProgress::new(std::iter::empty(), 0);
        }
        node.submit_value("solo".to_string());
        let state = node.state.lock().unwrap();
        assert_eq!(state.commit_index, 0);
        assert_eq!(state.last_applied, 0);
    }

    #[test]
    fn submit_value_with_no_leader_errors() {
        let mut peers = HashMap::new();
        peers.insert("n2".to_string(), "127.0.0.1:1".to_string());
        let node = new_node("n1", peers);
        let response = node.submit_value("hello".to_string());
        assert!(!response.is_success());
    }
}
