//! Chain layer: per-family adapters behind [`traits::ChainAdapter`], the
//! provider directory they share, and the engine that routes sends.

pub mod bitcoin;
pub mod directory;
pub mod engine;
pub mod ethereum;
pub mod signing;
pub mod solana;
pub mod traits;
pub mod tron;
pub mod units;

pub use directory::ChainDirectory;
pub use engine::TransactionEngine;
pub use traits::{ChainAdapter, FeeEstimate, FeeLevel, SendRequest, TxErrorKind, TxResult};
