//! Wallet Manager Core Module
//!
//! The API surface external collaborators use. Orchestrates the vault, the
//! key derivation engine, persisted configuration and the shared
//! [`ChainDirectory`].
//!
//! ## Module Structure
//! - `lifecycle` - create, import, unlock, lock, password changes, auto-lock
//! - `address` - address and key access, on-demand derivation, formats
//! - `coins` - custom coins and custom RPC overrides
//! - `tx_history` - contacts and the local transaction log
//! - `backup` - backup export and import

pub mod address;
pub mod backup;
pub mod coins;
pub mod lifecycle;
pub mod tx_history;

use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::blockchain::directory::ChainDirectory;
use crate::blockchain::engine::TransactionEngine;
use crate::core::config::{AppConfig, NetworkConfig, SecurityConfig};
use crate::core::errors::{Result, WalletError};
use crate::core::wallet_info::WalletPayload;
use crate::market::MarketDataAggregator;
use crate::storage::Vault;

/// The one unlocked wallet. Dropping it zeroizes the payload secrets.
pub(crate) struct Session {
    pub(crate) id: String,
    pub(crate) payload: WalletPayload,
    pub(crate) password: Zeroizing<String>,
    pub(crate) last_activity: Instant,
}

/// Wallet manager
///
/// Holds at most one unlocked wallet. Every mutation of that wallet is
/// re-encrypted and saved before the call returns.
pub struct WalletManager {
    vault: Vault,
    directory: Arc<ChainDirectory>,
    market: Arc<MarketDataAggregator>,
    network: NetworkConfig,
    config: RwLock<AppConfig>,
    session: RwLock<Option<Session>>,
}

impl WalletManager {
    /// Open (or create) the data directory and apply persisted custom coins
    /// and RPC overrides to a fresh [`ChainDirectory`].
    ///
    /// # Errors
    /// * `WalletError::ConfigError` - If an iteration count or timeout is zero
    /// * `WalletError::StorageError` - If the data directory cannot be created
    pub fn new(data_dir: impl Into<PathBuf>, security: SecurityConfig, network: NetworkConfig) -> Result<Self> {
        security.validate()?;
        network.validate()?;
        let vault = Vault::open(data_dir, &security)?;
        let config = vault.load_config();
        let directory = Arc::new(ChainDirectory::new(network.endpoints.clone()));
        let market = Arc::new(MarketDataAggregator::new(Arc::clone(&directory), &network)?);
        market.set_currency(&config.currency);

        for symbol in &config.custom_coins_order {
            let Some(spec) = config.custom_coins.get(symbol) else {
                continue;
            };
            if let Err(e) = directory.add_custom_coin(spec) {
                warn!(%symbol, error = %e, "skipping unusable custom coin from config");
            }
        }
        for (symbol, rpc) in &config.custom_rpc {
            directory.set_override(symbol, rpc.clone());
        }
        info!(
            root = %vault.root().display(),
            custom_coins = config.custom_coins_order.len(),
            "wallet manager ready"
        );

        Ok(Self {
            vault,
            directory,
            market,
            network,
            config: RwLock::new(config),
            session: RwLock::new(None),
        })
    }

    /// Shared with every engine and aggregator built from this manager.
    pub fn directory(&self) -> Arc<ChainDirectory> {
        Arc::clone(&self.directory)
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    pub fn config(&self) -> AppConfig {
        self.config.read().clone()
    }

    /// Engine over this manager's directory, so overrides apply to sends.
    /// Sends are checked against balances the shared aggregator has cached.
    pub fn transaction_engine(&self) -> Result<TransactionEngine> {
        Ok(TransactionEngine::new(self.directory(), &self.network)?.with_balance_cache(self.market_data()))
    }

    /// The manager's aggregator, quoting in the configured currency. Its
    /// caches are shared by every caller.
    pub fn market_data(&self) -> Arc<MarketDataAggregator> {
        Arc::clone(&self.market)
    }

    pub(crate) fn vault(&self) -> &Vault {
        &self.vault
    }

    /// Apply `f` to the config and persist it.
    pub(crate) fn update_config<R>(&self, f: impl FnOnce(&mut AppConfig) -> R) -> Result<R> {
        let mut config = self.config.write();
        let out = f(&mut config);
        self.vault.save_config(&config)?;
        Ok(out)
    }

    /// Read access to the unlocked wallet.
    pub(crate) fn with_session<R>(&self, f: impl FnOnce(&Session) -> Result<R>) -> Result<R> {
        let session = self.session.read();
        match session.as_ref() {
            Some(s) => f(s),
            None => Err(WalletError::WalletLocked),
        }
    }

    /// Mutate the unlocked wallet and save it. The session lock is held
    /// across the save so two mutations never interleave.
    pub(crate) fn mutate_session<R>(&self, f: impl FnOnce(&mut WalletPayload) -> Result<R>) -> Result<R> {
        let mut session = self.session.write();
        let s = session.as_mut().ok_or(WalletError::WalletLocked)?;
        let out = f(&mut s.payload)?;
        self.vault.save(&s.id, &s.payload, &s.password)?;
        s.last_activity = Instant::now();
        Ok(out)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::core::config::Endpoints;
    use crate::core::key_derivation::MnemonicStrength;
    use tempfile::TempDir;

    pub const TEST_MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    pub fn manager() -> (TempDir, WalletManager) {
        let dir = TempDir::new().unwrap();
        let network = NetworkConfig { endpoints: Endpoints::under("http://127.0.0.1:9"), ..NetworkConfig::default() };
        let wm = WalletManager::new(dir.path(), SecurityConfig::insecure_for_tests(), network).unwrap();
        (dir, wm)
    }

    /// Manager with the test mnemonic imported and unlocked.
    pub fn unlocked() -> (TempDir, WalletManager, String) {
        let (dir, wm) = manager();
        let created = wm.create_wallet("pw", "Main", Some(TEST_MNEMONIC), MnemonicStrength::Bits128).unwrap();
        (dir, wm, created.id)
    }
}
