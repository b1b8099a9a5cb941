// src/lib.rs
//! Self-custodial multi-chain wallet backend.
//!
//! - [`core`] - HD derivation, coin registry, config and the [`WalletManager`] API
//! - [`storage`] - encrypted wallet vault
//! - [`blockchain`] - chain adapters and the [`TransactionEngine`]
//! - [`market`] - cached prices and balances

pub mod blockchain;
pub mod core;
pub mod crypto;
pub mod market;
pub mod network;
pub mod security;
pub mod storage;

pub use crate::blockchain::TransactionEngine;
pub use crate::core::{WalletError, WalletManager};
pub use crate::market::MarketDataAggregator;
