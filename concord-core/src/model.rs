use serde_derive::{Deserialize, Serialize};

/// Flags controlling a transaction's 2PC fault-injection behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionFlags {
    /// Terminate the coordinator process abruptly after journaling the
    /// commit decision but before broadcasting it.
    #[serde(default)]
    pub simulate_crash: bool,
    /// Request a crash-recovery pass before/with this transaction.
    #[serde(default)]
    pub recover: bool,
}

/// A tagged transaction record -- a simple transfer of `amount` from
/// `source` to `destination`, replacing the loose string-keyed maps a
/// first pass at this often reaches for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub source: String,
    pub destination: String,
    pub amount: i64,
    #[serde(default)]
    pub flags: TransactionFlags,
}

impl Transaction {
    pub fn new(source: impl Into<String>, destination: impl Into<String>, amount: i64) -> Transaction {
        Transaction {
            source: source.into(),
            destination: destination.into(),
            amount,
            flags: TransactionFlags::default(),
        }
    }
}

/// The outcome a coordinator has journaled for its most recent transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Prepared,
    Committed,
    Aborted,
}
