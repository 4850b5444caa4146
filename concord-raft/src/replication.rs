use std::collections::HashMap;

use crate::node::{LogIndex, NodeId};

/// Per-peer replication bookkeeping a leader keeps: `next_index` is the next
/// log index to send that peer, `match_index` is the highest index known
/// replicated there.
#[derive(Debug, Clone, Default)]
pub struct ReplicationProgress {
    next_index: HashMap<NodeId, usize>,
    match_index: HashMap<NodeId, LogIndex>,
}

impl ReplicationProgress {
    /// Initializes progress for a freshly elected leader: every peer starts
    /// at `next_index = log length`, `match_index = 0`.
    pub fn new<'a>(peers: impl IntoIterator<Item = &'a NodeId>, log_len: usize) -> ReplicationProgress {
        let mut next_index = HashMap::new();
        let mut match_index = HashMap::new();
        for peer in peers {
            next_index.insert(peer.clone(), log_len);
            match_index.insert(peer.clone(), 0);
        }
        ReplicationProgress {
            next_index,
            match_index,
        }
    }

    pub fn next_index(&self, peer: &str) -> usize {
        self.next_index.get(peer).copied().unwrap_or(0)
    }

    pub fn match_index(&self, peer: &str) -> LogIndex {
        self.match_index.get(peer).copied().unwrap_or(0)
    }

    pub fn record_success(&mut self, peer: &str, prev_log_index: LogIndex, entries_sent: usize) {
        let new_match = prev_log_index + entries_sent as LogIndex;
        self.match_index.insert(peer.to_string(), new_match);
        self.next_index
            .insert(peer.to_string(), (new_match + 1).max(0) as usize);
    }

    /// Backtracking log-repair: decrement `next_index` by one (floor 0) so
    /// the next AppendEntries probes one entry earlier.
    pub fn record_failure(&mut self, peer: &str) {
        let entry = self.next_index.entry(peer.to_string()).or_insert(0);
        *entry = entry.saturating_sub(1);
    }

    /// The largest index `I` such that a strict majority of `members`
    /// (self included, always considered caught up to `self_match_index`)
    /// have `match_index >= I`. The caller is responsible for additionally
    /// checking that `log[I].term == current_term` before committing (the
    /// commit-safety invariant).
    ///
    /// `members` is the peer set excluding self, so the majority threshold
    /// is derived from the full cluster size (`members.len() + 1`), not
    /// from `members.len()` alone -- halving the peer count undercounts
    /// quorum on even-sized clusters.
    pub fn majority_match_index(&self, members: &[NodeId], self_match_index: LogIndex) -> LogIndex {
        let cluster_size = members.len() + 1;
        let majority = cluster_size / 2 + 1;
        let mut candidates: Vec<LogIndex> = members
            .iter()
            .map(|m| self.match_index(m))
            .collect();
        candidates.push(self_match_index);
        candidates.sort_unstable_by(|a, b| b.cmp(a));
        candidates
            .get(majority.saturating_sub(1))
            .copied()
            .unwrap_or(-1)
    }
}
