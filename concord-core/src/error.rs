use thiserror::Error;

/// The error kinds a `concord` node can surface, per the error-handling design:
/// transient network trouble is retried or treated as a "no" vote, stale
/// terms force a step-down, log inconsistency drives leader back-off, business
/// rejections are reported cleanly to callers, and fatal errors mean the
/// durable state is corrupt and the node must stop serving.
#[derive(Error, Debug)]
pub enum ConcordError {
    #[error("transient network error: {0}")]
    Transient(String),

    #[error("stale term: observed {observed}, have {current}")]
    StaleTerm { observed: u64, current: u64 },

    #[error("log inconsistency at index {index}: {reason}")]
    LogInconsistency { index: i64, reason: String },

    #[error("rejected: {0}")]
    BusinessRejection(String),

    #[error("fatal: durable state is corrupt: {0}")]
    Fatal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("rpc error: {0}")]
    Rpc(#[from] reqwest::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, ConcordError>;

impl ConcordError {
    /// True for errors that the Raft/2PC protocols treat as transient: the
    /// caller should count this as a timeout/no-vote rather than propagate it.
    pub fn is_transient(&self) -> bool {
        matches!(self, ConcordError::Transient(_) | ConcordError::Rpc(_))
    }
}
