// tests/util.rs
// Shared helpers for integration tests

#![allow(dead_code)]

use nexus_wallet::core::config::{Endpoints, NetworkConfig, SecurityConfig};
use nexus_wallet::core::key_derivation::MnemonicStrength;
use nexus_wallet::WalletManager;
use tempfile::TempDir;

pub const TEST_MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

/// Network config pointing every provider at `base` (a mock server, or a
/// closed port when the test must stay offline).
pub fn network_under(base: &str) -> NetworkConfig {
    NetworkConfig { endpoints: Endpoints::under(base), ..NetworkConfig::default() }
}

pub fn offline_manager() -> (TempDir, WalletManager) {
    let dir = TempDir::new().expect("tempdir");
    let wm = WalletManager::new(dir.path(), SecurityConfig::insecure_for_tests(), network_under("http://127.0.0.1:9"))
        .expect("manager");
    (dir, wm)
}

pub fn manager_at(dir: &TempDir, base: &str) -> WalletManager {
    WalletManager::new(dir.path(), SecurityConfig::insecure_for_tests(), network_under(base)).expect("manager")
}

/// Import the well-known test phrase as "Main" with password "pw".
pub fn import_test_wallet(wm: &WalletManager) -> String {
    wm.create_wallet("pw", "Main", Some(TEST_MNEMONIC), MnemonicStrength::Bits128)
        .expect("import")
        .id
}
