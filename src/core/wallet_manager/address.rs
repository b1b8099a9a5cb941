//! Address derivation
//!
//! Read access to the unlocked wallet's address book, preferred formats,
//! and extra addresses derived at custom (account, index) pairs.

use std::collections::BTreeMap;
use tracing::debug;
use zeroize::Zeroizing;

use super::WalletManager;
use crate::core::coins::{AddressFormat, CoinConfig};
use crate::core::errors::{Result, WalletError};
use crate::core::key_derivation::KeyDerivationEngine;
use crate::core::wallet_info::{AddressRecord, WalletPayload};

/// Locate the record for `coin` in `format`. Coins sharing another coin's
/// address resolve to that coin's SINGLE record.
fn find_record<'a>(payload: &'a WalletPayload, coin: &CoinConfig, format: AddressFormat) -> Result<&'a AddressRecord> {
    let (symbol, format) = match coin.shares_with() {
        Some(parent) => (parent, AddressFormat::Single),
        None => (coin.symbol.as_str(), format),
    };
    payload
        .addresses
        .get(symbol)
        .and_then(|formats| formats.get(&format))
        .ok_or_else(|| WalletError::NotFoundError(format!("No {} address for {}", format, coin.symbol)))
}

impl WalletManager {
    pub(super) fn coin(&self, symbol: &str) -> Result<CoinConfig> {
        self.directory
            .coin(symbol)
            .ok_or_else(|| WalletError::UnsupportedCoin(symbol.trim().to_string()))
    }

    /// Preferred format from config, else the coin's default. A stale config
    /// entry naming an unregistered format is ignored.
    pub fn get_selected_format(&self, symbol: &str) -> Result<AddressFormat> {
        let coin = self.coin(symbol)?;
        let selected = self.config.read().selected_formats.get(&coin.symbol).copied();
        Ok(selected
            .filter(|f| coin.formats().contains(f))
            .unwrap_or_else(|| coin.default_format()))
    }

    pub fn set_selected_format(&self, symbol: &str, format: AddressFormat) -> Result<()> {
        let coin = self.coin(symbol)?;
        if !coin.formats().contains(&format) {
            return Err(WalletError::ValidationError(format!(
                "Format {} is not registered for {}",
                format, coin.symbol
            )));
        }
        self.update_config(|c| {
            c.selected_formats.insert(coin.symbol.clone(), format);
        })
    }

    /// Address in `format`, or in the selected format when `None`.
    pub fn get_address(&self, symbol: &str, format: Option<AddressFormat>) -> Result<String> {
        let coin = self.coin(symbol)?;
        let format = match format {
            Some(f) => f,
            None => self.get_selected_format(&coin.symbol)?,
        };
        self.with_session(|s| Ok(find_record(&s.payload, &coin, format)?.address.clone()))
    }

    pub fn get_private_key(&self, symbol: &str, format: Option<AddressFormat>) -> Result<Zeroizing<String>> {
        let coin = self.coin(symbol)?;
        let format = match format {
            Some(f) => f,
            None => self.get_selected_format(&coin.symbol)?,
        };
        self.with_session(|s| Ok(Zeroizing::new(find_record(&s.payload, &coin, format)?.private_key.clone())))
    }

    pub fn get_mnemonic(&self) -> Result<Zeroizing<String>> {
        self.with_session(|s| Ok(Zeroizing::new(s.payload.mnemonic.clone())))
    }

    /// Every stored format of one coin, secrets blanked.
    pub fn get_all_formats_for_coin(&self, symbol: &str) -> Result<BTreeMap<AddressFormat, AddressRecord>> {
        let coin = self.coin(symbol)?;
        self.with_session(|s| {
            let lookup = coin.shares_with().unwrap_or(&coin.symbol);
            Ok(s.payload
                .addresses
                .get(lookup)
                .map(|formats| formats.iter().map(|(f, r)| (*f, r.public_view())).collect())
                .unwrap_or_default())
        })
    }

    /// Symbol and address in the selected format, in display order.
    /// Coins without a stored address are skipped.
    pub fn get_all_active_addresses(&self) -> Result<Vec<(String, String)>> {
        let symbols = self.directory.symbols();
        let mut out = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            match self.get_address(&symbol, None) {
                Ok(address) => out.push((symbol, address)),
                Err(WalletError::WalletLocked) => return Err(WalletError::WalletLocked),
                Err(e) => debug!(%symbol, error = %e, "no active address"),
            }
        }
        Ok(out)
    }

    /// Derive without storing. Only coins that own their keys qualify.
    pub fn derive_custom_address(
        &self,
        symbol: &str,
        format: AddressFormat,
        account: u32,
        index: u32,
    ) -> Result<AddressRecord> {
        let coin = self.coin(symbol)?;
        if let Some(parent) = coin.shares_with() {
            return Err(WalletError::ValidationError(format!(
                "{} uses the {} address; derive from {} instead",
                coin.symbol, parent, parent
            )));
        }
        self.with_session(|s| KeyDerivationEngine::derive_address(&s.payload.mnemonic, &coin, format, account, index))
    }

    /// Derive and store. Adding a path that is already stored returns the
    /// existing record without saving.
    pub fn add_derived_address(
        &self,
        symbol: &str,
        format: AddressFormat,
        account: u32,
        index: u32,
    ) -> Result<AddressRecord> {
        let record = self.derive_custom_address(symbol, format, account, index)?;
        let symbol = self.coin(symbol)?.symbol;
        let existing = self.with_session(|s| {
            Ok(s.payload
                .custom_addresses
                .get(&symbol)
                .and_then(|list| list.iter().find(|r| r.path == record.path).cloned()))
        })?;
        if let Some(existing) = existing {
            return Ok(existing);
        }
        self.mutate_session(|payload| {
            payload.custom_addresses.entry(symbol).or_default().push(record.clone());
            Ok(())
        })?;
        debug!(path = %record.path, "derived address stored");
        Ok(record)
    }

    /// Returns whether a record with `path` was removed.
    pub fn remove_derived_address(&self, symbol: &str, path: &str) -> Result<bool> {
        let symbol = self.coin(symbol)?.symbol;
        let present = self.with_session(|s| {
            Ok(s.payload
                .custom_addresses
                .get(&symbol)
                .is_some_and(|list| list.iter().any(|r| r.path == path)))
        })?;
        if !present {
            return Ok(false);
        }
        self.mutate_session(|payload| {
            if let Some(list) = payload.custom_addresses.get_mut(&symbol) {
                list.retain(|r| r.path != path);
                if list.is_empty() {
                    payload.custom_addresses.remove(&symbol);
                }
            }
            Ok(true)
        })
    }

    /// Stored extra addresses, secrets blanked.
    pub fn get_custom_addresses(&self, symbol: &str) -> Result<Vec<AddressRecord>> {
        let symbol = self.coin(symbol)?.symbol;
        self.with_session(|s| {
            Ok(s.payload
                .custom_addresses
                .get(&symbol)
                .map(|list| list.iter().map(AddressRecord::public_view).collect())
                .unwrap_or_default())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::wallet_manager::testing::unlocked;
    use pretty_assertions::assert_eq;

    #[test]
    fn evm_siblings_resolve_to_eth() {
        let (_d, wm, _id) = unlocked();
        let eth = wm.get_address("ETH", None).unwrap();
        for sym in ["BNB", "MATIC", "USDT", "usdc"] {
            assert_eq!(wm.get_address(sym, None).unwrap(), eth);
            assert_eq!(*wm.get_private_key(sym, None).unwrap(), *wm.get_private_key("ETH", None).unwrap());
        }
    }

    #[test]
    fn btc_bip84_default_and_selection() {
        let (_d, wm, _id) = unlocked();
        assert_eq!(wm.get_selected_format("BTC").unwrap(), AddressFormat::Bip84);
        assert_eq!(wm.get_address("BTC", None).unwrap(), "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu");

        wm.set_selected_format("BTC", AddressFormat::Bip44).unwrap();
        assert_eq!(wm.get_address("BTC", None).unwrap(), "1LqBGSKuX5yYUonjxT5qGfpUsXKYYWeabA");
        assert!(wm.set_selected_format("DOGE", AddressFormat::Bip84).is_err());
    }

    #[test]
    fn all_formats_hide_private_keys() {
        let (_d, wm, _id) = unlocked();
        let formats = wm.get_all_formats_for_coin("BTC").unwrap();
        assert_eq!(formats.len(), 4);
        assert!(formats.values().all(|r| r.private_key.is_empty()));
    }

    #[test]
    fn active_addresses_follow_display_order() {
        let (_d, wm, _id) = unlocked();
        let symbols: Vec<_> = wm.get_all_active_addresses().unwrap().into_iter().map(|(s, _)| s).collect();
        assert_eq!(
            symbols,
            vec!["BTC", "ETH", "BNB", "MATIC", "SOL", "TRX", "LTC", "DOGE", "BCH", "USDT", "USDC"]
        );
        wm.lock();
        assert!(matches!(wm.get_all_active_addresses(), Err(WalletError::WalletLocked)));
    }

    #[test]
    fn derived_addresses_dedupe_and_persist() {
        let (_d, wm, id) = unlocked();
        let first = wm.add_derived_address("BTC", AddressFormat::Bip84, 0, 1).unwrap();
        assert_eq!(first.path, "m/84'/0'/0'/0/1");
        assert_eq!(first.address, "bc1qnjg0jd8228aq7egyzacy8cys3knf9xvrerkf9g");
        wm.add_derived_address("BTC", AddressFormat::Bip84, 0, 1).unwrap();
        assert_eq!(wm.get_custom_addresses("BTC").unwrap().len(), 1);

        wm.lock();
        wm.unlock(&id, "pw").unwrap();
        assert_eq!(wm.get_custom_addresses("BTC").unwrap()[0].address, first.address);

        assert!(wm.remove_derived_address("BTC", &first.path).unwrap());
        assert!(!wm.remove_derived_address("BTC", &first.path).unwrap());
        assert!(wm.get_custom_addresses("BTC").unwrap().is_empty());
    }

    #[test]
    fn sharing_coins_cannot_derive_independently() {
        let (_d, wm, _id) = unlocked();
        assert!(matches!(
            wm.derive_custom_address("USDT", AddressFormat::Single, 0, 1),
            Err(WalletError::ValidationError(_))
        ));
        assert!(matches!(wm.get_address("NOPE", None), Err(WalletError::UnsupportedCoin(_))));
    }
}
