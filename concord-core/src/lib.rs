//! Ambient stack shared by every `concord` node: typed errors, structured
//! logging, cluster/participant configuration, the three durable stores, and
//! the HTTP RPC transport. Protocol logic (Raft, 2PC) lives in the sibling
//! `concord-raft` and `concord-txn` crates.

pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod rpc;
pub mod store;

pub use error::{ConcordError, Result};
