use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use zeroize::Zeroize;

use crate::core::coins::AddressFormat;

/// One derived address with its key material.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddressRecord {
    pub address: String,
    /// Hex: compressed secp256k1 point or 32-byte ed25519 key.
    pub public_key: String,
    /// WIF for UTXO chains, 0x-hex for EVM, hex for Tron, base58 keypair for Solana.
    pub private_key: String,
    pub path: String,
    pub format: AddressFormat,
    pub account: u32,
    pub index: u32,
    /// Set when the record is a copy of another coin's SINGLE record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_from: Option<String>,
}

impl AddressRecord {
    /// Copy with the secret blanked, for callers that only display addresses.
    pub fn public_view(&self) -> Self {
        Self { private_key: String::new(), ..self.clone() }
    }
}

/// symbol -> format -> record
pub type AddressBook = BTreeMap<String, BTreeMap<AddressFormat, AddressRecord>>;

/// Decrypted wallet contents. Lives in memory only while unlocked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletPayload {
    pub name: String,
    pub mnemonic: String,
    pub addresses: AddressBook,
    /// symbol -> extra addresses derived on demand
    #[serde(default)]
    pub custom_addresses: BTreeMap<String, Vec<AddressRecord>>,
    pub created_at: DateTime<Utc>,
}

impl Drop for WalletPayload {
    fn drop(&mut self) {
        self.mnemonic.zeroize();
        for record in self.addresses.values_mut().flat_map(|m| m.values_mut()) {
            record.private_key.zeroize();
        }
        for record in self.custom_addresses.values_mut().flat_map(|v| v.iter_mut()) {
            record.private_key.zeroize();
        }
    }
}

/// Entry of `wallets_index.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletIndexEntry {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contact {
    pub name: String,
    pub address: String,
    pub coin: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TxDirection {
    Sent,
    Received,
}

/// Locally recorded transaction (`tx_history.json`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TxRecord {
    pub coin: String,
    pub tx_hash: String,
    pub direction: TxDirection,
    pub from: String,
    pub to: String,
    pub amount: Decimal,
    pub fee: Decimal,
    #[serde(default)]
    pub explorer_url: Option<String>,
    pub timestamp: DateTime<Utc>,
}
