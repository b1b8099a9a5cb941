//! File-backed wallet vault
//!
//! Layout under the vault root:
//! - `wallets_index.json`  `[{id, name, created_at}]`
//! - `wallet_{id}.dat`     encrypted container
//! - `config.json`, `contacts.json`, `tx_history.json`
//!
//! Every write goes to a temporary sibling and is renamed into place, so a
//! reader sees either the previous file or the new one.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::core::config::{AppConfig, SecurityConfig};
use crate::core::errors::{Result, WalletError};
use crate::core::wallet_info::WalletIndexEntry;
use crate::security::encryption::WalletSecurity;

pub const CONTAINER_VERSION: u32 = 3;
pub const BACKUP_VERSION: u32 = 1;
pub const BACKUP_TYPE: &str = "wallet_backup";

const INDEX_FILE: &str = "wallets_index.json";
const CONFIG_FILE: &str = "config.json";

/// On-disk form of one wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedContainer {
    pub version: u32,
    pub encrypted_data: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupFile {
    pub version: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: String,
    pub timestamp: DateTime<Utc>,
}

pub struct Vault {
    root: PathBuf,
    security: WalletSecurity,
    wallet_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    doc_lock: Mutex<()>,
}

impl Vault {
    pub fn open(root: impl Into<PathBuf>, security: &SecurityConfig) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        debug!(root = %root.display(), "vault opened");
        Ok(Self {
            root,
            security: WalletSecurity::new(security),
            wallet_locks: Mutex::new(HashMap::new()),
            doc_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn wallet_lock(&self, id: &str) -> Arc<Mutex<()>> {
        self.wallet_locks.lock().entry(id.to_string()).or_default().clone()
    }

    fn wallet_path(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(WalletError::ValidationError(format!("Invalid wallet id: {:?}", id)));
        }
        Ok(self.root.join(format!("wallet_{}.dat", id)))
    }

    pub fn exists(&self, id: &str) -> bool {
        self.wallet_path(id).map(|p| p.is_file()).unwrap_or(false)
    }

    fn read_container(&self, id: &str) -> Result<EncryptedContainer> {
        let path = self.wallet_path(id)?;
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WalletError::NotFoundError(format!("Wallet {} not found", id)))
            }
            Err(e) => return Err(e.into()),
        };
        let container: EncryptedContainer = serde_json::from_slice(&bytes)
            .map_err(|e| WalletError::CorruptData(format!("Wallet file {} unreadable: {}", id, e)))?;
        if container.version != CONTAINER_VERSION {
            return Err(WalletError::CorruptData(format!(
                "Unsupported wallet file version {}",
                container.version
            )));
        }
        Ok(container)
    }

    /// Encrypt and atomically overwrite `wallet_{id}.dat`.
    pub fn save<T: Serialize>(&self, id: &str, payload: &T, password: &str) -> Result<()> {
        let lock = self.wallet_lock(id);
        let _guard = lock.lock();

        let path = self.wallet_path(id)?;
        let plaintext = Zeroizing::new(serde_json::to_vec(payload)?);
        let now = Utc::now();
        let created_at = self.read_container(id).map(|c| c.created_at).unwrap_or(now);
        let container = EncryptedContainer {
            version: CONTAINER_VERSION,
            encrypted_data: self.security.encrypt(&plaintext, password)?,
            password_hash: self.security.hash_password(password),
            created_at,
            updated_at: now,
        };
        atomic_write(&path, &serde_json::to_vec_pretty(&container)?)?;
        debug!(wallet_id = %id, "wallet saved");
        Ok(())
    }

    /// Wrong passwords are rejected by the verifier before any decrypt attempt.
    pub fn load<T: DeserializeOwned>(&self, id: &str, password: &str) -> Result<T> {
        let container = self.read_container(id)?;
        if !self.security.verify_password(password, &container.password_hash) {
            return Err(WalletError::InvalidPassword);
        }
        let plaintext = self.security.decrypt(&container.encrypted_data, password).map_err(|e| match e {
            WalletError::InvalidPassword => {
                WalletError::CorruptData(format!("Wallet {} failed authentication", id))
            }
            other => other,
        })?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| WalletError::CorruptData(format!("Wallet {} payload unreadable: {}", id, e)))
    }

    /// Checks the stored verifier only; never decrypts.
    pub fn verify(&self, id: &str, password: &str) -> bool {
        match self.read_container(id) {
            Ok(c) => self.security.verify_password(password, &c.password_hash),
            Err(_) => false,
        }
    }

    /// Remove the wallet file and its index entry. Irreversible.
    pub fn delete(&self, id: &str) -> Result<()> {
        let lock = self.wallet_lock(id);
        let _guard = lock.lock();
        let path = self.wallet_path(id)?;
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let _docs = self.doc_lock.lock();
        let mut index: Vec<WalletIndexEntry> = self.read_json_or_default(INDEX_FILE)?;
        index.retain(|w| w.id != id);
        self.write_json(INDEX_FILE, &index)?;
        info!(wallet_id = %id, "wallet deleted");
        Ok(())
    }

    pub fn list_wallets(&self) -> Result<Vec<WalletIndexEntry>> {
        let _docs = self.doc_lock.lock();
        self.read_json_or_default(INDEX_FILE)
    }

    pub fn add_to_index(&self, entry: WalletIndexEntry) -> Result<()> {
        let _docs = self.doc_lock.lock();
        let mut index: Vec<WalletIndexEntry> = self.read_json_or_default(INDEX_FILE)?;
        if index.iter().any(|w| w.id == entry.id) {
            return Err(WalletError::ValidationError(format!("Duplicate wallet id {}", entry.id)));
        }
        index.push(entry);
        self.write_json(INDEX_FILE, &index)
    }

    /// Wrap the stored envelope in a portable backup file. The password must match.
    pub fn export_backup(&self, id: &str, password: &str, dest: &Path) -> Result<()> {
        let container = self.read_container(id)?;
        if !self.security.verify_password(password, &container.password_hash) {
            return Err(WalletError::InvalidPassword);
        }
        let backup = BackupFile {
            version: BACKUP_VERSION,
            kind: BACKUP_TYPE.to_string(),
            data: container.encrypted_data,
            timestamp: Utc::now(),
        };
        atomic_write(dest, &serde_json::to_vec_pretty(&backup)?)?;
        info!(wallet_id = %id, dest = %dest.display(), "backup exported");
        Ok(())
    }

    /// Decrypt a backup file. The caller decides which id to store it under.
    pub fn import_backup<T: DeserializeOwned>(&self, src: &Path, password: &str) -> Result<T> {
        let bytes = fs::read(src)?;
        let backup: BackupFile = serde_json::from_slice(&bytes)
            .map_err(|e| WalletError::CorruptData(format!("Backup unreadable: {}", e)))?;
        if backup.kind != BACKUP_TYPE {
            return Err(WalletError::CorruptData(format!("Not a wallet backup: type {:?}", backup.kind)));
        }
        let plaintext = self.security.decrypt(&backup.data, password)?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| WalletError::CorruptData(format!("Backup payload unreadable: {}", e)))
    }

    /// Missing file yields defaults; an unreadable one is logged and replaced by defaults.
    pub fn load_config(&self) -> AppConfig {
        let _docs = self.doc_lock.lock();
        match self.read_json_or_default::<AppConfig>(CONFIG_FILE) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("config.json unreadable, using defaults: {}", e);
                AppConfig::default()
            }
        }
    }

    pub fn save_config(&self, config: &AppConfig) -> Result<()> {
        let _docs = self.doc_lock.lock();
        self.write_json(CONFIG_FILE, config)
    }

    /// Plain JSON side documents (contacts, history).
    pub fn load_document<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T> {
        let _docs = self.doc_lock.lock();
        self.read_json_or_default(name)
    }

    pub fn save_document<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let _docs = self.doc_lock.lock();
        self.write_json(name, value)
    }

    fn read_json_or_default<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T> {
        match fs::read(self.root.join(name)) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| WalletError::CorruptData(format!("{} unreadable: {}", name, e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        atomic_write(&self.root.join(name), &serde_json::to_vec_pretty(value)?)
    }
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| WalletError::StorageError(format!("Not a file path: {}", path.display())))?;
    let tmp = path.with_file_name(format!(".{}.tmp", file_name.to_string_lossy()));
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn vault() -> (TempDir, Vault) {
        let dir = TempDir::new().unwrap();
        let v = Vault::open(dir.path(), &SecurityConfig::insecure_for_tests()).unwrap();
        (dir, v)
    }

    #[test]
    fn save_load_roundtrip() {
        let (_d, v) = vault();
        v.save("w1", &json!({"name": "main"}), "pw").unwrap();
        let back: serde_json::Value = v.load("w1", "pw").unwrap();
        assert_eq!(back["name"], "main");
        assert!(matches!(v.load::<serde_json::Value>("w1", "nope"), Err(WalletError::InvalidPassword)));
    }

    #[test]
    fn verify_tracks_latest_save() {
        let (_d, v) = vault();
        v.save("w1", &json!(1), "old").unwrap();
        assert!(v.verify("w1", "old"));
        v.save("w1", &json!(1), "new").unwrap();
        assert!(!v.verify("w1", "old"));
        assert!(v.verify("w1", "new"));
        assert!(!v.verify("missing", "new"));
    }

    #[test]
    fn tampered_ciphertext_is_corrupt_not_wrong_password() {
        let (dir, v) = vault();
        v.save("w1", &json!({"k": "v"}), "pw").unwrap();
        let path = dir.path().join("wallet_w1.dat");
        let mut c: EncryptedContainer = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        let mut chars: Vec<char> = c.encrypted_data.chars().collect();
        let last = chars.len() - 5;
        chars[last] = if chars[last] == 'A' { 'B' } else { 'A' };
        c.encrypted_data = chars.into_iter().collect();
        fs::write(&path, serde_json::to_vec(&c).unwrap()).unwrap();
        assert!(matches!(v.load::<serde_json::Value>("w1", "pw"), Err(WalletError::CorruptData(_))));
    }

    #[test]
    fn created_at_survives_resave() {
        let (dir, v) = vault();
        v.save("w1", &json!(1), "pw").unwrap();
        let read = || -> EncryptedContainer {
            serde_json::from_slice(&fs::read(dir.path().join("wallet_w1.dat")).unwrap()).unwrap()
        };
        let first = read();
        v.save("w1", &json!(2), "pw").unwrap();
        let second = read();
        assert_eq!(first.created_at, second.created_at);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(second.version, CONTAINER_VERSION);
    }

    #[test]
    fn delete_removes_file_and_index_entry() {
        let (_d, v) = vault();
        let now = Utc::now();
        v.add_to_index(WalletIndexEntry { id: "a".into(), name: "A".into(), created_at: now }).unwrap();
        v.add_to_index(WalletIndexEntry { id: "b".into(), name: "B".into(), created_at: now }).unwrap();
        assert!(v.add_to_index(WalletIndexEntry { id: "a".into(), name: "dup".into(), created_at: now }).is_err());
        v.save("a", &json!(1), "pw").unwrap();
        v.delete("a").unwrap();
        assert!(!v.exists("a"));
        let ids: Vec<_> = v.list_wallets().unwrap().into_iter().map(|w| w.id).collect();
        assert_eq!(ids, vec!["b".to_string()]);
    }

    #[test]
    fn backup_roundtrip_and_type_marker() {
        let (dir, v) = vault();
        v.save("w1", &json!({"secret": 42}), "pw").unwrap();
        let dest = dir.path().join("backup.json");
        assert!(matches!(v.export_backup("w1", "bad", &dest), Err(WalletError::InvalidPassword)));
        v.export_backup("w1", "pw", &dest).unwrap();

        let raw: serde_json::Value = serde_json::from_slice(&fs::read(&dest).unwrap()).unwrap();
        assert_eq!(raw["type"], "wallet_backup");

        let restored: serde_json::Value = v.import_backup(&dest, "pw").unwrap();
        assert_eq!(restored["secret"], 42);
        assert!(v.import_backup::<serde_json::Value>(&dest, "bad").is_err());
    }

    #[test]
    fn path_traversal_ids_rejected() {
        let (_d, v) = vault();
        assert!(v.save("../evil", &json!(1), "pw").is_err());
    }

    #[test]
    fn config_defaults_when_missing_or_corrupt() {
        let (dir, v) = vault();
        assert_eq!(v.load_config(), AppConfig::default());
        fs::write(dir.path().join("config.json"), b"{not json").unwrap();
        assert_eq!(v.load_config(), AppConfig::default());
        let mut cfg = AppConfig::default();
        cfg.currency = "EUR".into();
        v.save_config(&cfg).unwrap();
        assert_eq!(v.load_config().currency, "EUR");
    }
}
