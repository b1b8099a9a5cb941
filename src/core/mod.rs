pub mod bip44;
pub mod coins;
pub mod config;
pub mod errors;
pub mod key_derivation;
pub mod validation;
pub mod wallet_info;
pub mod wallet_manager;

pub use errors::{Result, WalletError};
pub use wallet_info::{AddressRecord, WalletPayload};
pub use wallet_manager::WalletManager;
