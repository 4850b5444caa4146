use std::io::Read;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use iron::prelude::*;
use iron::status;
use router::Router;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ConcordError, Result};

/// A generic JSON request/response HTTP server. Every Raft/2PC method named
/// a node exposes is registered here as a path plus a handler closure; framing
/// (JSON-over-HTTP, message-per-method) is handled once, in one place,
/// rather than per component. Dispatch is thread-per-request, following
/// `iron`'s own threaded model -- no async runtime involved.
pub struct RpcServer {
    router: Router,
}

impl Default for RpcServer {
    fn default() -> Self {
        RpcServer::new()
    }
}

impl RpcServer {
    pub fn new() -> RpcServer {
        RpcServer {
            router: Router::new(),
        }
    }

    /// Registers a handler for `POST {path}`. The handler receives the
    /// deserialized request body and returns the response to serialize;
    /// it must be safe to call concurrently from many request threads.
    pub fn route<F, Req, Resp>(&mut self, path: &str, route_id: &str, handler: F) -> &mut Self
    where
        F: Fn(Req) -> Resp + Send + Sync + 'static,
        Req: DeserializeOwned,
        Resp: Serialize,
    {
        let handler = Arc::new(handler);
        self.router.post(
            path,
            move |req: &mut Request| -> IronResult<Response> {
                let mut raw = String::new();
                req.body
                    .read_to_string(&mut raw)
                    .map_err(|e| IronError::new(e, status::BadRequest))?;
                let parsed: Req = serde_json::from_str(&raw)
                    .map_err(|e| IronError::new(e, status::BadRequest))?;
                let response = handler(parsed);
                let encoded = serde_json::to_string(&response)
                    .map_err(|e| IronError::new(e, status::InternalServerError))?;
                Ok(Response::with((status::Ok, encoded)))
            },
            route_id,
        );
        self
    }

    /// Binds `address` without blocking, returning a handle that reports the
    /// resolved local address (useful for tests that bind to `127.0.0.1:0`
    /// and need to discover the assigned port).
    pub fn bind(self, address: &str) -> Result<BoundServer> {
        let listening = Iron::new(self.router)
            .http(address)
            .map_err(|e| ConcordError::Fatal(format!("failed to bind {}: {}", address, e)))?;
        Ok(BoundServer { listening })
    }

    /// Starts serving on `address` and blocks the calling thread forever.
    /// Intended to be the last call in a node process's main function, or
    /// to be run on a dedicated thread.
    pub fn listen(self, address: &str) -> Result<()> {
        self.bind(address)?.serve_forever()
    }
}

/// A server that has bound its socket but not yet started blocking.
pub struct BoundServer {
    listening: iron::Listening,
}

impl BoundServer {
    pub fn local_addr(&self) -> String {
        self.listening.socket.to_string()
    }

    /// Blocks the calling thread forever. `iron`'s own request dispatch
    /// already runs on its threadpool; this just keeps the owning process
    /// (or test thread) alive so the bound socket isn't dropped.
    pub fn serve_forever(self) -> ! {
        loop {
            thread::sleep(Duration::from_secs(60 * 60));
        }
    }
}
