pub mod client;
pub mod server;

pub use client::RpcClient;
pub use server::{BoundServer, RpcServer};
