//! Backup and recovery
//!
//! A backup is the wallet's encrypted envelope wrapped with a type marker
//! and timestamp; it never holds plaintext.

use chrono::Utc;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

use super::WalletManager;
use crate::core::errors::Result;
use crate::core::wallet_info::{WalletIndexEntry, WalletPayload};

impl WalletManager {
    /// Export the unlocked wallet to `dest`.
    ///
    /// # Errors
    /// * `WalletError::WalletLocked` - No wallet is unlocked
    /// * `WalletError::InvalidPassword` - `password` does not match the wallet
    pub fn export_backup(&self, dest: &Path, password: &str) -> Result<()> {
        let id = self.with_session(|s| Ok(s.id.clone()))?;
        self.vault().export_backup(&id, password, dest)
    }

    /// Restore a backup as a new wallet with a fresh id. The restored wallet
    /// keeps the backup's password and is not unlocked.
    ///
    /// # Errors
    /// * `WalletError::InvalidPassword` - Wrong password for the backup
    /// * `WalletError::CorruptData` - Not a wallet backup, or unreadable
    pub fn import_backup(&self, src: &Path, password: &str, name: Option<&str>) -> Result<String> {
        let mut payload: WalletPayload = self.vault().import_backup(src, password)?;
        if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
            payload.name = name.to_string();
        }

        let id = Uuid::new_v4().simple().to_string();
        self.vault().save(&id, &payload, password)?;
        self.vault().add_to_index(WalletIndexEntry {
            id: id.clone(),
            name: payload.name.clone(),
            created_at: Utc::now(),
        })?;
        info!(wallet_id = %id, "wallet restored from backup");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::WalletError;
    use crate::core::wallet_manager::testing::unlocked;

    #[test]
    fn export_then_import_as_new_wallet() {
        let (dir, wm, id) = unlocked();
        let eth = wm.get_address("ETH", None).unwrap();
        let dest = dir.path().join("main.backup.json");

        assert!(matches!(wm.export_backup(&dest, "wrong"), Err(WalletError::InvalidPassword)));
        wm.export_backup(&dest, "pw").unwrap();

        let restored = wm.import_backup(&dest, "pw", Some("Restored")).unwrap();
        assert_ne!(restored, id);
        let names: Vec<_> = wm.list_wallets().unwrap().into_iter().map(|w| w.name).collect();
        assert_eq!(names, vec!["Main".to_string(), "Restored".to_string()]);

        wm.unlock(&restored, "pw").unwrap();
        assert_eq!(wm.get_address("ETH", None).unwrap(), eth);
    }

    #[test]
    fn export_requires_unlocked_wallet() {
        let (dir, wm, _id) = unlocked();
        wm.lock();
        let dest = dir.path().join("b.json");
        assert!(matches!(wm.export_backup(&dest, "pw"), Err(WalletError::WalletLocked)));
        assert!(!dest.exists());
    }

    #[test]
    fn import_with_wrong_password_fails_cleanly() {
        let (dir, wm, _id) = unlocked();
        let dest = dir.path().join("b.json");
        wm.export_backup(&dest, "pw").unwrap();
        assert!(matches!(wm.import_backup(&dest, "nope", None), Err(WalletError::InvalidPassword)));
        assert_eq!(wm.list_wallets().unwrap().len(), 1);
    }
}
