//! Solana adapter: a single System Program transfer in a legacy message,
//! signed with the account's ed25519 key.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::SigningKey;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use solana_hash::Hash;
use solana_message::Message;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_signer::{Signer, SignerError};
use solana_system_interface::instruction as system_instruction;
use solana_transaction::Transaction;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use super::directory::ChainDirectory;
use super::signing::sign_ed25519;
use super::traits::{Capability, ChainAdapter, FeeEstimate, FeeLevel, SendRequest, TxErrorKind, TxResult};
use super::units::to_base_units;
use crate::core::coins::{CoinConfig, FamilyKind};
use crate::core::key_derivation::parse_ed25519_key;
use crate::network::node_manager::{NodeManager, RpcError};

pub const LAMPORTS_PER_SIGNATURE: u64 = 5_000;

/// Lets the SDK sign with the wallet's ed25519-dalek key.
pub struct DalekSigner<'a>(pub &'a SigningKey);

impl Signer for DalekSigner<'_> {
    fn try_pubkey(&self) -> Result<Pubkey, SignerError> {
        Ok(Pubkey::new_from_array(self.0.verifying_key().to_bytes()))
    }

    fn try_sign_message(&self, message: &[u8]) -> Result<Signature, SignerError> {
        Ok(Signature::from(sign_ed25519(self.0, message)))
    }

    fn is_interactive(&self) -> bool {
        false
    }
}

/// Signed System Program transfer with the key's account as fee payer.
pub fn transfer_transaction(
    key: &SigningKey,
    to: &Pubkey,
    lamports: u64,
    recent_blockhash: Hash,
) -> Result<Transaction, SignerError> {
    let signer = DalekSigner(key);
    let payer = signer.try_pubkey()?;
    let instruction = system_instruction::transfer(&payer, to, lamports);
    let mut tx = Transaction::new_unsigned(Message::new(&[instruction], Some(&payer)));
    tx.try_sign(&[&signer], recent_blockhash)?;
    Ok(tx)
}

fn decode_pubkey(s: &str) -> Option<Pubkey> {
    Pubkey::from_str(s.trim()).ok()
}

pub fn fixed_fee() -> Decimal {
    Decimal::new(LAMPORTS_PER_SIGNATURE as i64, 9)
}

pub struct SolanaAdapter {
    node: Arc<NodeManager>,
    directory: Arc<ChainDirectory>,
}

impl SolanaAdapter {
    pub fn new(node: Arc<NodeManager>, directory: Arc<ChainDirectory>) -> Self {
        Self { node, directory }
    }

    async fn latest_blockhash(&self, rpc: &str) -> Result<Hash, RpcError> {
        let result = self
            .node
            .json_rpc(rpc, "getLatestBlockhash", json!([{ "commitment": "finalized" }]))
            .await?;
        result
            .pointer("/value/blockhash")
            .and_then(Value::as_str)
            .and_then(|h| Hash::from_str(h).ok())
            .ok_or_else(|| RpcError::Malformed(format!("no blockhash in {}", result)))
    }
}

#[async_trait]
impl ChainAdapter for SolanaAdapter {
    fn family(&self) -> FamilyKind {
        FamilyKind::Solana
    }

    fn required_capability(&self) -> Capability {
        Capability::Ed25519
    }

    async fn estimate_fee(&self, coin: &CoinConfig, _amount: Decimal, _fee: &FeeLevel) -> FeeEstimate {
        FeeEstimate::new(fixed_fee(), format!("{} ({} lamports)", coin.symbol, LAMPORTS_PER_SIGNATURE))
    }

    async fn send(&self, coin: &CoinConfig, request: &SendRequest) -> TxResult {
        let key = match parse_ed25519_key(&request.private_key) {
            Ok(k) => k,
            Err(e) => return TxResult::fail(TxErrorKind::InvalidKey, e.to_string()),
        };
        let Some(to) = decode_pubkey(&request.to) else {
            return TxResult::fail(TxErrorKind::InvalidAddress, "Invalid address: not a 32-byte base58 key");
        };
        let lamports = match to_base_units(request.amount, coin.decimals).and_then(|v| u64::try_from(v).ok()) {
            Some(v) if v > 0 => v,
            _ => return TxResult::fail(TxErrorKind::InvalidAmount, format!("Invalid amount: {}", request.amount)),
        };
        let Some(rpc) = self.directory.primary_rpc(coin) else {
            return TxResult::fail(TxErrorKind::NetworkError, format!("No RPC for {}", coin.symbol));
        };

        let blockhash = match self.latest_blockhash(&rpc).await {
            Ok(h) => h,
            Err(e) => return TxResult::from_rpc("Blockhash", &e),
        };
        let tx = match transfer_transaction(&key, &to, lamports, blockhash) {
            Ok(tx) => tx,
            Err(e) => return TxResult::fail(TxErrorKind::InvalidKey, format!("Signing failed: {}", e)),
        };
        let wire = match bincode::serialize(&tx) {
            Ok(bytes) => bytes,
            Err(e) => return TxResult::fail(TxErrorKind::InvalidKey, format!("Serialization failed: {}", e)),
        };
        let params = json!([
            BASE64.encode(&wire),
            { "encoding": "base64", "preflightCommitment": "confirmed", "skipPreflight": false }
        ]);

        match self.node.json_rpc(&rpc, "sendTransaction", params).await {
            Ok(Value::String(hash)) if !hash.is_empty() => {
                info!(tx_hash = %hash, "transaction broadcast");
                TxResult::ok(hash, fixed_fee())
            }
            Ok(_) => {
                // the signature is the transaction id
                let hash = tx.signatures.first().map(Signature::to_string).unwrap_or_default();
                warn!(tx_hash = %hash, "sendTransaction returned no signature");
                TxResult::fail(TxErrorKind::ProviderRejected, "Empty hash returned")
            }
            Err(e) => {
                warn!(error = %e, "broadcast failed");
                TxResult::from_rpc("Broadcast", &e)
            }
        }
    }
}
