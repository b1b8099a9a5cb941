//! Custom coins and provider overrides.
//!
//! Both are persisted in `config.json` and applied to the shared
//! [`ChainDirectory`](crate::blockchain::directory::ChainDirectory) at once,
//! so engines and aggregators built earlier see the change.

use std::collections::BTreeMap;
use tracing::info;

use super::WalletManager;
use crate::core::coins::{AddressFormat, CoinConfig};
use crate::core::config::{CustomCoin, CustomRpc};
use crate::core::errors::{Result, WalletError};

impl WalletManager {
    /// Every known coin, base set first, then custom coins in insertion order.
    pub fn coins(&self) -> Vec<CoinConfig> {
        self.directory.registry().iter().cloned().collect()
    }

    /// Register a custom EVM chain or ERC-20 token. It shares ETH's address;
    /// the unlocked wallet gains a copy of ETH's record under the new symbol.
    pub fn add_custom_coin(&self, spec: CustomCoin) -> Result<CoinConfig> {
        let config = self.directory.add_custom_coin(&spec)?;
        let symbol = config.symbol.clone();
        self.update_config(|c| {
            c.custom_coins.insert(symbol.clone(), CustomCoin { symbol: symbol.clone(), ..spec });
            if !c.custom_coins_order.contains(&symbol) {
                c.custom_coins_order.push(symbol.clone());
            }
        })?;

        if self.is_unlocked() {
            self.mutate_session(|payload| {
                let eth = payload
                    .addresses
                    .get("ETH")
                    .and_then(|f| f.get(&AddressFormat::Single))
                    .cloned()
                    .ok_or_else(|| WalletError::NotFoundError("ETH address missing from wallet".to_string()))?;
                let mut record = eth;
                record.shared_from = Some("ETH".to_string());
                payload
                    .addresses
                    .insert(symbol.clone(), BTreeMap::from([(AddressFormat::Single, record)]));
                Ok(())
            })?;
        }
        info!(%symbol, "custom coin added");
        Ok(config)
    }

    /// Returns whether a custom coin was removed. Built-in coins are refused.
    pub fn remove_custom_coin(&self, symbol: &str) -> Result<bool> {
        let symbol = symbol.trim().to_ascii_uppercase();
        if self.directory.coin(&symbol).is_some_and(|c| !c.is_custom) {
            return Err(WalletError::ValidationError(format!("{} is a built-in coin", symbol)));
        }
        if !self.directory.remove_custom_coin(&symbol) {
            return Ok(false);
        }
        self.update_config(|c| {
            c.custom_coins.remove(&symbol);
            c.custom_coins_order.retain(|s| s != &symbol);
            c.selected_formats.remove(&symbol);
        })?;
        if self.is_unlocked() {
            self.mutate_session(|payload| {
                payload.addresses.remove(&symbol);
                Ok(())
            })?;
        }
        info!(%symbol, "custom coin removed");
        Ok(true)
    }

    /// Override the RPC and/or explorer for one symbol. Empty strings fall
    /// back to the defaults for that half of the override.
    pub fn set_custom_rpc(&self, symbol: &str, rpc: &str, explorer: &str) -> Result<()> {
        let coin = self.coin(symbol)?;
        let entry = CustomRpc { rpc: rpc.trim().to_string(), explorer: explorer.trim().to_string() };
        self.update_config(|c| {
            c.custom_rpc.insert(coin.symbol.clone(), entry.clone());
        })?;
        self.directory.set_override(&coin.symbol, entry);
        info!(symbol = %coin.symbol, "custom RPC set");
        Ok(())
    }

    pub fn get_custom_rpc(&self, symbol: &str) -> Option<CustomRpc> {
        self.directory.get_override(symbol)
    }

    /// Returns whether an override existed.
    pub fn reset_custom_rpc(&self, symbol: &str) -> Result<bool> {
        let symbol = symbol.trim().to_ascii_uppercase();
        self.update_config(|c| {
            c.custom_rpc.remove(&symbol);
        })?;
        Ok(self.directory.clear_override(&symbol))
    }

    /// Quote currency for prices (`USD`, `EUR`, ...).
    pub fn set_currency(&self, currency: &str) -> Result<()> {
        let currency = currency.trim().to_ascii_uppercase();
        if currency.is_empty() {
            return Err(WalletError::ValidationError("Currency must not be empty".to_string()));
        }
        self.market.set_currency(&currency);
        self.update_config(|c| c.currency = currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{CustomCoinKind, NetworkConfig, SecurityConfig};
    use crate::core::wallet_manager::testing::{manager, unlocked};

    fn arb() -> CustomCoin {
        CustomCoin {
            symbol: "arb".into(),
            name: "Arbitrum".into(),
            decimals: 18,
            kind: CustomCoinKind::Evm { rpc: "https://arb1.arbitrum.io/rpc".into(), chain_id: Some(42161) },
            coingecko_id: Some("arbitrum".into()),
            explorer: Some("https://arbiscan.io".into()),
        }
    }

    #[test]
    fn custom_coin_shares_eth_address_and_persists() {
        let (dir, wm, id) = unlocked();
        let added = wm.add_custom_coin(arb()).unwrap();
        assert_eq!(added.symbol, "ARB");
        assert_eq!(wm.get_address("ARB", None).unwrap(), wm.get_address("ETH", None).unwrap());
        assert_eq!(wm.coins().last().map(|c| c.symbol.clone()), Some("ARB".to_string()));

        // A second manager over the same directory reloads the coin from config.
        drop(wm);
        let reopened =
            WalletManager::new(dir.path(), SecurityConfig::insecure_for_tests(), NetworkConfig::default()).unwrap();
        assert!(reopened.directory().coin("ARB").is_some());
        reopened.unlock(&id, "pw").unwrap();
        assert!(reopened.get_address("ARB", None).is_ok());
    }

    #[test]
    fn custom_coin_removal_and_builtin_guard() {
        let (_d, wm) = manager();
        wm.add_custom_coin(arb()).unwrap();
        assert!(wm.remove_custom_coin("arb").unwrap());
        assert!(!wm.remove_custom_coin("ARB").unwrap());
        assert!(wm.config().custom_coins_order.is_empty());
        assert!(matches!(wm.remove_custom_coin("ETH"), Err(WalletError::ValidationError(_))));
    }

    #[test]
    fn rpc_override_reaches_directory() {
        let (_d, wm) = manager();
        wm.set_custom_rpc("eth", "https://my-node.example/", "").unwrap();
        let eth = wm.directory().coin("ETH").unwrap();
        assert_eq!(wm.directory().primary_rpc(&eth).as_deref(), Some("https://my-node.example"));
        assert_eq!(wm.get_custom_rpc("ETH").map(|r| r.explorer), Some(String::new()));

        assert!(wm.reset_custom_rpc("ETH").unwrap());
        assert!(!wm.reset_custom_rpc("ETH").unwrap());
        assert!(wm.config().custom_rpc.is_empty());
        assert!(wm.set_custom_rpc("NOPE", "x", "").is_err());
    }
}
