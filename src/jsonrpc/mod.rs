//! JSON-RPC framing, server-side dispatch and a small client
//!
//! Responses carry either `result` or `error` next to the echoed request `id`.

pub mod client;
pub mod envelope;
pub mod server;
