use std::collections::HashMap;

use serde_derive::{Deserialize, Serialize};

use crate::error::Result;

/// A static map from cluster name -> node name -> network address
/// ("host:port"). Loading the file is the caller's concern; this struct
/// is simply the parsed shape the core accepts.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ClusterConfig {
    #[serde(flatten)]
    pub clusters: HashMap<String, HashMap<String, String>>,
}

impl ClusterConfig {
    pub fn from_file(path: &str) -> Result<ClusterConfig> {
        let mut raw = config::Config::new();
        raw.merge(config::File::with_name(path))?;
        let parsed: ClusterConfig = raw.try_into()?;
        Ok(parsed)
    }

    pub fn node_address(&self, cluster: &str, node: &str) -> Option<String> {
        self.clusters.get(cluster)?.get(node).cloned()
    }

    /// Peers of `node` within `cluster`: every other node's name -> address.
    pub fn peers(&self, cluster: &str, node: &str) -> HashMap<String, String> {
        match self.clusters.get(cluster) {
            Some(members) => members
                .iter()
                .filter(|(name, _)| name.as_str() != node)
                .map(|(name, addr)| (name.clone(), addr.clone()))
                .collect(),
            None => HashMap::new(),
        }
    }
}

/// A known 2PC participant, as the coordinator sees it: where to reach it,
/// and which account it owns.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ParticipantRef {
    pub address: String,
    pub account: String,
}

/// The coordinator's static view of its participants, keyed by node id.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ParticipantsConfig {
    #[serde(flatten)]
    pub participants: HashMap<String, ParticipantRef>,
}

impl ParticipantsConfig {
    pub fn from_file(path: &str) -> Result<ParticipantsConfig> {
        let mut raw = config::Config::new();
        raw.merge(config::File::with_name(path))?;
        let parsed: ParticipantsConfig = raw.try_into()?;
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peers_excludes_self() {
        let mut members = HashMap::new();
        members.insert("node1".to_string(), "127.0.0.1:9001".to_string());
        members.insert("node2".to_string(), "127.0.0.1:9002".to_string());
        members.insert("node3".to_string(), "127.0.0.1:9003".to_string());
        let mut clusters = HashMap::new();
        clusters.insert("cluster-a".to_string(), members);
        let config = ClusterConfig { clusters };

        let peers = config.peers("cluster-a", "node1");
        assert_eq!(peers.len(), 2);
        assert!(!peers.contains_key("node1"));
        assert_eq!(peers.get("node2").unwrap(), "127.0.0.1:9002");
    }

    #[test]
    fn node_address_missing_cluster_is_none() {
        let config = ClusterConfig::default();
        assert!(config.node_address("nope", "node1").is_none());
    }
}
