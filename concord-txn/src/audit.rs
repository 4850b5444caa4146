use std::time::Duration;

use slog::Logger;

use concord_core::model::Transaction;
use concord_core::rpc::RpcClient;

use crate::messages::{SubmitValueRequest, SubmitValueResponse};

/// Best-effort audit trail: after applying or deciding a transfer, a
/// coordinator or participant may push
/// `"transfer:{source}:{destination}:{amount}"` onto a Raft cluster's
/// leader. Neither side tracks which node is leader, so each candidate
/// address is tried in turn and the first success accepted; failures are
/// logged and swallowed -- this must never affect the 2PC protocol's own
/// result.
pub struct AuditLog {
    rpc: RpcClient,
    raft_addresses: Vec<String>,
    timeout: Duration,
}

impl AuditLog {
    pub fn new(raft_addresses: Vec<String>, timeout: Duration) -> AuditLog {
        AuditLog {
            rpc: RpcClient::new(),
            raft_addresses,
            timeout,
        }
    }

    pub fn record(&self, logger: &Logger, tx: &Transaction) {
        let request = SubmitValueRequest {
            value: format!("transfer:{}:{}:{}", tx.source, tx.destination, tx.amount),
        };
        for address in &self.raft_addresses {
            let result: concord_core::error::Result<SubmitValueResponse> =
                self.rpc.call(address, "/raft/submit_value", &request, self.timeout);
            match result {
                Ok(response) if response.message.starts_with("Success") => return,
                _ => continue,
            }
        }
        slog::warn!(logger, "audit log push failed: no reachable raft leader"; "value" => request.value);
    }
}
