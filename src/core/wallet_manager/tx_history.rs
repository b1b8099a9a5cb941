//! Contacts and the local transaction log.
//!
//! Both live in plain JSON side files next to the wallets and are shared by
//! every wallet in the data directory.

use chrono::Utc;
use tracing::debug;

use super::WalletManager;
use crate::blockchain::traits::{SendRequest, TxResult};
use crate::core::errors::{Result, WalletError};
use crate::core::validation::validate_for_family;
use crate::core::wallet_info::{Contact, TxDirection, TxRecord};

const CONTACTS_FILE: &str = "contacts.json";
const TX_HISTORY_FILE: &str = "tx_history.json";

/// Oldest entries are dropped past this many.
pub const MAX_TX_HISTORY: usize = 500;

impl WalletManager {
    /// The address is validated for `coin` before the contact is stored.
    pub fn add_contact(&self, name: &str, address: &str, coin: &str) -> Result<Contact> {
        let name = name.trim();
        if name.is_empty() {
            return Err(WalletError::ValidationError("Contact name must not be empty".to_string()));
        }
        let coin = self.coin(coin)?;
        let address = address.trim();
        validate_for_family(&coin.family, address)?;

        let contact = Contact {
            name: name.to_string(),
            address: address.to_string(),
            coin: coin.symbol,
            created_at: Utc::now(),
        };
        let mut contacts: Vec<Contact> = self.vault().load_document(CONTACTS_FILE)?;
        contacts.push(contact.clone());
        self.vault().save_document(CONTACTS_FILE, &contacts)?;
        Ok(contact)
    }

    /// Remove by position in [`get_contacts(None)`](Self::get_contacts).
    pub fn remove_contact(&self, index: usize) -> Result<Contact> {
        let mut contacts: Vec<Contact> = self.vault().load_document(CONTACTS_FILE)?;
        if index >= contacts.len() {
            return Err(WalletError::NotFoundError(format!("No contact at index {}", index)));
        }
        let removed = contacts.remove(index);
        self.vault().save_document(CONTACTS_FILE, &contacts)?;
        Ok(removed)
    }

    pub fn get_contacts(&self, coin: Option<&str>) -> Result<Vec<Contact>> {
        let contacts: Vec<Contact> = self.vault().load_document(CONTACTS_FILE)?;
        Ok(match coin {
            Some(coin) => contacts.into_iter().filter(|c| c.coin.eq_ignore_ascii_case(coin.trim())).collect(),
            None => contacts,
        })
    }

    /// Prepend a record, keeping at most [`MAX_TX_HISTORY`].
    pub fn add_tx(&self, record: TxRecord) -> Result<()> {
        let mut history: Vec<TxRecord> = self.vault().load_document(TX_HISTORY_FILE)?;
        history.insert(0, record);
        if history.len() > MAX_TX_HISTORY {
            debug!(dropped = history.len() - MAX_TX_HISTORY, "trimming tx history");
            history.truncate(MAX_TX_HISTORY);
        }
        self.vault().save_document(TX_HISTORY_FILE, &history)
    }

    /// Log a successful send. Failed results are not recorded.
    pub fn record_send(&self, request: &SendRequest, result: &TxResult) -> Result<Option<TxRecord>> {
        let Some(hash) = result.tx_hash.as_ref().filter(|_| result.success) else {
            return Ok(None);
        };
        let record = TxRecord {
            coin: request.symbol.trim().to_ascii_uppercase(),
            tx_hash: hash.clone(),
            direction: TxDirection::Sent,
            from: request.from_address.clone(),
            to: request.to.trim().to_string(),
            amount: request.amount,
            fee: result.fee,
            explorer_url: result.explorer_url.clone(),
            timestamp: Utc::now(),
        };
        self.add_tx(record.clone())?;
        Ok(Some(record))
    }

    /// Newest first, optionally for one coin.
    pub fn get_tx_history(&self, coin: Option<&str>) -> Result<Vec<TxRecord>> {
        let mut history: Vec<TxRecord> = self.vault().load_document(TX_HISTORY_FILE)?;
        if let Some(coin) = coin {
            history.retain(|t| t.coin.eq_ignore_ascii_case(coin.trim()));
        }
        history.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(history)
    }
}
