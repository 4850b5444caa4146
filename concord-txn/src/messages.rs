use serde_derive::{Deserialize, Serialize};

use concord_core::model::Transaction;

/// The crash scenario a participant is armed with. `None` is the steady
/// state; `BeforeResponse`/`AfterResponse` are one-shot injections that fire
/// the next time their corresponding operation is called, then disarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrashScenario {
    None,
    BeforeResponse,
    AfterResponse,
}

impl Default for CrashScenario {
    fn default() -> Self {
        CrashScenario::None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareRequest {
    pub transaction: Transaction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteResponse {
    pub vote: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRequest {
    pub transaction: Transaction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbortRequest {
    pub transaction: Transaction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub balance: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetInitialBalanceRequest {
    pub balance: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetCrashScenarioRequest {
    pub scenario: Option<CrashScenario>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartTransactionRequest {
    pub transaction: Transaction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartTransactionResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoverFromCrashRequest {
    pub replay: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoverFromCrashResponse {
    pub success: bool,
}

/// The audit-log RPC a coordinator best-effort pushes to a Raft cluster's
/// leader after a successful commit. Declared locally rather than imported
/// from `concord-raft` so the two protocols stay uncoupled; the wire shape
/// matches `concord_raft::messages::{SubmitValueRequest, SubmitValueResponse}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitValueRequest {
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitValueResponse {
    pub message: String,
}
