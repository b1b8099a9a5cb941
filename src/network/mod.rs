//! Outbound HTTP and JSON-RPC.

pub mod node_manager;

pub use node_manager::{NodeManager, RpcError};
