//! UTXO chains (BTC, LTC, DOGE, BCH)
//!
//! - `address` - Base58Check, bech32/bech32m and cashaddr encodings, WIF
//! - `fees` - sat/vB oracle with static fallback
//! - `adapter` - provider-assisted build, local signing, broadcast

pub mod adapter;
pub mod address;
pub mod fees;

pub use adapter::UtxoAdapter;
