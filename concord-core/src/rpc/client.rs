use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ConcordError, Result};

/// A blocking RPC client: one call, one HTTP POST, with a caller-supplied
/// timeout. Every exposed operation on every component goes through
/// this rather than holding a live proxy/connection per peer -- addresses
/// are cheap, transport clients are constructed per call.
#[derive(Clone)]
pub struct RpcClient {
    http: reqwest::blocking::Client,
}

impl Default for RpcClient {
    fn default() -> Self {
        RpcClient::new()
    }
}

impl RpcClient {
    pub fn new() -> RpcClient {
        RpcClient {
            http: reqwest::blocking::Client::new(),
        }
    }

    /// POSTs `body` as JSON to `http://{address}{path}` and decodes the JSON
    /// response, failing with `ConcordError::Transient` on anything that
    /// should be treated as a timeout/unreachable-peer condition by the
    /// calling protocol as a transient, retryable failure.
    pub fn call<Req, Resp>(&self, address: &str, path: &str, body: &Req, timeout: Duration) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("http://{}{}", address, path);
        let response = self
            .http
            .post(&url)
            .timeout(timeout)
            .json(body)
            .send()
            .map_err(|e| ConcordError::Transient(e.to_string()))?;

        let response = response
            .error_for_status()
            .map_err(|e| ConcordError::Transient(e.to_string()))?;

        response
            .json::<Resp>()
            .map_err(|e| ConcordError::Transient(e.to_string()))
    }
}
