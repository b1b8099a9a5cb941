//! Wallet lifecycle management
//!
//! Creation and import, unlock/lock transitions, password changes,
//! deletion and the idle auto-lock.

use chrono::Utc;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::info;
use uuid::Uuid;
use zeroize::Zeroizing;

use super::{Session, WalletManager};
use crate::core::errors::{Result, WalletError};
use crate::core::key_derivation::{normalize_mnemonic, KeyDerivationEngine, MnemonicStrength};
use crate::core::wallet_info::{WalletIndexEntry, WalletPayload};

pub const DEFAULT_WALLET_NAME: &str = "My Wallet";

/// Result of [`WalletManager::create_wallet`]. The phrase is shown to the
/// user once and then dropped.
pub struct CreatedWallet {
    pub id: String,
    pub mnemonic: Zeroizing<String>,
}

fn require_password(password: &str) -> Result<()> {
    if password.is_empty() {
        return Err(WalletError::ValidationError("Password must not be empty".to_string()));
    }
    Ok(())
}

impl WalletManager {
    /// Create a wallet, or import one when `mnemonic` is given.
    ///
    /// Derives every registered format of every coin at account 0, index 0,
    /// stores the encrypted payload, appends the index entry, and leaves the
    /// new wallet active and unlocked.
    ///
    /// # Errors
    /// * `WalletError::ValidationError` - Empty password
    /// * `WalletError::MnemonicError` - Supplied phrase fails its checksum
    /// * `WalletError::StorageError` - Vault write failed
    pub fn create_wallet(
        &self,
        password: &str,
        name: &str,
        mnemonic: Option<&str>,
        strength: MnemonicStrength,
    ) -> Result<CreatedWallet> {
        require_password(password)?;
        let phrase = match mnemonic {
            Some(phrase) => {
                if !KeyDerivationEngine::validate_mnemonic(phrase) {
                    return Err(WalletError::MnemonicError("Invalid mnemonic".to_string()));
                }
                normalize_mnemonic(phrase)
            }
            None => KeyDerivationEngine::generate_mnemonic(strength)?,
        };

        let name = match name.trim() {
            "" => DEFAULT_WALLET_NAME.to_string(),
            trimmed => trimmed.to_string(),
        };
        let addresses = KeyDerivationEngine::derive_all(&phrase, &self.directory.registry(), 0, 0)?;
        let created_at = Utc::now();
        let payload = WalletPayload {
            name: name.clone(),
            mnemonic: phrase.to_string(),
            addresses,
            custom_addresses: BTreeMap::new(),
            created_at,
        };

        let id = Uuid::new_v4().simple().to_string();
        self.vault.save(&id, &payload, password)?;
        self.vault.add_to_index(WalletIndexEntry { id: id.clone(), name, created_at })?;
        self.open_session(&id, payload, password)?;
        info!(wallet_id = %id, imported = mnemonic.is_some(), "wallet created");
        Ok(CreatedWallet { id, mnemonic: phrase })
    }

    /// # Errors
    /// * `WalletError::InvalidPassword` - Wrong password; the current session is kept
    /// * `WalletError::NotFoundError` - No wallet file for `id`
    pub fn unlock(&self, id: &str, password: &str) -> Result<()> {
        let payload: WalletPayload = self.vault.load(id, password)?;
        self.open_session(id, payload, password)?;
        info!(wallet_id = %id, "wallet unlocked");
        Ok(())
    }

    fn open_session(&self, id: &str, payload: WalletPayload, password: &str) -> Result<()> {
        *self.session.write() = Some(Session {
            id: id.to_string(),
            payload,
            password: Zeroizing::new(password.to_string()),
            last_activity: Instant::now(),
        });
        self.update_config(|c| c.active_wallet = Some(id.to_string()))
    }

    /// Drop the decrypted payload. Idempotent.
    pub fn lock(&self) {
        if let Some(session) = self.session.write().take() {
            info!(wallet_id = %session.id, "wallet locked");
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.session.read().is_some()
    }

    /// The unlocked wallet, or the last one activated.
    pub fn active_wallet_id(&self) -> Option<String> {
        match self.session.read().as_ref() {
            Some(s) => Some(s.id.clone()),
            None => self.config.read().active_wallet.clone(),
        }
    }

    /// Check `password` against the active wallet's stored verifier.
    pub fn verify_password(&self, password: &str) -> bool {
        match self.active_wallet_id() {
            Some(id) => self.vault.verify(&id, password),
            None => false,
        }
    }

    /// Re-encrypt the unlocked wallet under `new_password`.
    pub fn change_password(&self, old_password: &str, new_password: &str) -> Result<()> {
        require_password(new_password)?;
        let mut session = self.session.write();
        let s = session.as_mut().ok_or(WalletError::WalletLocked)?;
        if !self.vault.verify(&s.id, old_password) {
            return Err(WalletError::InvalidPassword);
        }
        self.vault.save(&s.id, &s.payload, new_password)?;
        s.password = Zeroizing::new(new_password.to_string());
        s.last_activity = Instant::now();
        info!(wallet_id = %s.id, "wallet password changed");
        Ok(())
    }

    /// Permanently remove a wallet. The password must match.
    pub fn delete_wallet(&self, id: &str, password: &str) -> Result<()> {
        if !self.vault.exists(id) {
            return Err(WalletError::NotFoundError(format!("Wallet {} not found", id)));
        }
        if !self.vault.verify(id, password) {
            return Err(WalletError::InvalidPassword);
        }
        {
            let mut session = self.session.write();
            if session.as_ref().is_some_and(|s| s.id == id) {
                *session = None;
            }
        }
        self.vault.delete(id)?;
        self.update_config(|c| {
            if c.active_wallet.as_deref() == Some(id) {
                c.active_wallet = None;
            }
        })
    }

    pub fn list_wallets(&self) -> Result<Vec<WalletIndexEntry>> {
        self.vault.list_wallets()
    }

    /// Record user activity for the auto-lock timer.
    pub fn touch(&self) {
        if let Some(s) = self.session.write().as_mut() {
            s.last_activity = Instant::now();
        }
    }

    /// Lock if idle longer than `auto_lock_seconds` (0 disables). Returns
    /// whether this call locked the wallet.
    pub fn check_auto_lock(&self) -> bool {
        let limit = self.config.read().auto_lock_seconds;
        if limit == 0 {
            return false;
        }
        let idle = match self.session.read().as_ref() {
            Some(s) => s.last_activity.elapsed(),
            None => return false,
        };
        if idle <= Duration::from_secs(limit) {
            return false;
        }
        self.lock();
        true
    }

    pub fn set_auto_lock_seconds(&self, seconds: u64) -> Result<()> {
        self.update_config(|c| c.auto_lock_seconds = seconds)
    }

    #[cfg(test)]
    pub(crate) fn backdate_activity(&self, by: Duration) {
        if let Some(s) = self.session.write().as_mut() {
            if let Some(earlier) = Instant::now().checked_sub(by) {
                s.last_activity = earlier;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::wallet_manager::testing::{manager, unlocked, TEST_MNEMONIC};

    #[test]
    fn create_then_unlock_roundtrip() {
        let (_d, wm, id) = unlocked();
        assert!(wm.is_unlocked());
        assert_eq!(wm.active_wallet_id().as_deref(), Some(id.as_str()));

        wm.lock();
        assert!(!wm.is_unlocked());
        assert!(matches!(wm.get_mnemonic(), Err(WalletError::WalletLocked)));
        // Active id survives the lock.
        assert_eq!(wm.active_wallet_id().as_deref(), Some(id.as_str()));

        assert!(matches!(wm.unlock(&id, "nope"), Err(WalletError::InvalidPassword)));
        wm.unlock(&id, "pw").unwrap();
        assert_eq!(wm.get_mnemonic().unwrap().as_str(), TEST_MNEMONIC);
    }

    #[test]
    fn generated_wallet_uses_requested_strength() {
        let (_d, wm) = manager();
        let created = wm.create_wallet("pw", "  ", None, MnemonicStrength::Bits256).unwrap();
        assert_eq!(created.mnemonic.split_whitespace().count(), 24);
        let listed = wm.list_wallets().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, DEFAULT_WALLET_NAME);
    }

    #[test]
    fn import_rejects_bad_checksum() {
        let (_d, wm) = manager();
        let bad = TEST_MNEMONIC.replace("about", "abandon");
        assert!(matches!(
            wm.create_wallet("pw", "x", Some(&bad), MnemonicStrength::Bits128),
            Err(WalletError::MnemonicError(_))
        ));
        assert!(wm.list_wallets().unwrap().is_empty());
    }

    #[test]
    fn change_password_requires_old_one() {
        let (_d, wm, id) = unlocked();
        assert!(matches!(wm.change_password("wrong", "new"), Err(WalletError::InvalidPassword)));
        wm.change_password("pw", "new").unwrap();
        assert!(wm.verify_password("new"));
        assert!(!wm.verify_password("pw"));
        wm.lock();
        wm.unlock(&id, "new").unwrap();
    }

    #[test]
    fn delete_clears_session_and_active_id() {
        let (_d, wm, id) = unlocked();
        assert!(matches!(wm.delete_wallet(&id, "bad"), Err(WalletError::InvalidPassword)));
        wm.delete_wallet(&id, "pw").unwrap();
        assert!(!wm.is_unlocked());
        assert_eq!(wm.active_wallet_id(), None);
        assert!(wm.list_wallets().unwrap().is_empty());
        assert!(matches!(wm.delete_wallet(&id, "pw"), Err(WalletError::NotFoundError(_))));
    }

    #[test]
    fn auto_lock_after_idle() {
        let (_d, wm, _id) = unlocked();
        wm.set_auto_lock_seconds(60).unwrap();
        assert!(!wm.check_auto_lock());
        wm.backdate_activity(Duration::from_secs(120));
        assert!(wm.check_auto_lock());
        assert!(!wm.is_unlocked());
        assert!(!wm.check_auto_lock());
    }

    #[test]
    fn auto_lock_disabled_by_zero() {
        let (_d, wm, _id) = unlocked();
        wm.set_auto_lock_seconds(0).unwrap();
        wm.backdate_activity(Duration::from_secs(10_000));
        assert!(!wm.check_auto_lock());
        assert!(wm.is_unlocked());
    }
}
