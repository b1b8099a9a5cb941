//! Tron adapter over the TronGrid HTTP wallet API.
//!
//! Transfers are first built and signed locally against the latest block
//! and submitted with `broadcasthex`. When that path is unavailable the node
//! builds the transfer and reports its id (`sha256(raw_data)`); we sign that
//! digest. The API does not say which recovery id it expects, so broadcast
//! tries the computed one first and then the other candidate.

use async_trait::async_trait;
use protobuf::CodedOutputStream;
use rust_decimal::Decimal;
use secp256k1::SecretKey;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::directory::ChainDirectory;
use super::signing::{compressed_public_key, sign_digest_recoverable};
use super::traits::{Capability, ChainAdapter, FeeEstimate, FeeLevel, SendRequest, TxErrorKind, TxResult};
use super::units::to_base_units;
use crate::core::coins::{CoinConfig, FamilyKind};
use crate::core::key_derivation::{parse_secp256k1_key, tron_address};
use crate::network::node_manager::{NodeManager, RpcError};

const TRANSFER_CONTRACT: i32 = 1;
const TRANSFER_TYPE_URL: &str = "type.googleapis.com/protocol.TransferContract";
const EXPIRATION_MS: i64 = 60_000;

/// Human-readable broadcast message. TronGrid hex-encodes most of them.
pub fn decode_message(raw: &str) -> String {
    hex::decode(raw)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| raw.to_string())
}

/// Refusals no other signature can fix.
fn is_resource_error(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    ["bandwidth", "energy", "balance"].iter().any(|k| lower.contains(k))
}

/// Whether the builder's `raw_data_hex` hashes to the id it asked us to sign.
fn id_matches_raw(unsigned: &Value, tx_id: &[u8]) -> bool {
    unsigned
        .get("raw_data_hex")
        .and_then(Value::as_str)
        .and_then(|raw| hex::decode(raw).ok())
        .map(|raw| Sha256::digest(&raw).as_slice() == tx_id)
        .unwrap_or(false)
}

fn refusal_message(body: &Value) -> String {
    body.get("message")
        .and_then(Value::as_str)
        .map(decode_message)
        .or_else(|| body.get("code").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| "rejected".to_string())
}

/// Block a locally built transaction references.
#[derive(Debug, Clone, PartialEq)]
pub struct RefBlock {
    pub number: i64,
    pub id: [u8; 32],
    pub timestamp: i64,
}

impl RefBlock {
    fn from_now_block(body: &Value) -> Option<Self> {
        let id = hex::decode(body.get("blockID")?.as_str()?).ok()?.try_into().ok()?;
        let raw = body.pointer("/block_header/raw_data")?;
        Some(Self {
            number: raw.get("number")?.as_i64()?,
            id,
            timestamp: raw.get("timestamp")?.as_i64()?,
        })
    }
}

/// 21-byte address (`0x41` prefix) from its base58check form.
fn decode_address(address: &str) -> Option<Vec<u8>> {
    let raw = bs58::decode(address.trim()).with_check(None).into_vec().ok()?;
    (raw.len() == 21 && raw[0] == 0x41).then_some(raw)
}

fn encode_message(write: impl FnOnce(&mut CodedOutputStream<'_>) -> protobuf::Result<()>) -> protobuf::Result<Vec<u8>> {
    let mut buf = Vec::new();
    {
        let mut os = CodedOutputStream::vec(&mut buf);
        write(&mut os)?;
        os.flush()?;
    }
    Ok(buf)
}

/// `Transaction.raw` for a single TransferContract. Its sha256 is the txID.
pub fn transfer_raw_data(owner: &[u8], to: &[u8], sun: i64, block: &RefBlock) -> protobuf::Result<Vec<u8>> {
    let transfer = encode_message(|os| {
        os.write_bytes(1, owner)?;
        os.write_bytes(2, to)?;
        os.write_int64(3, sun)
    })?;
    let parameter = encode_message(|os| {
        os.write_string(1, TRANSFER_TYPE_URL)?;
        os.write_bytes(2, &transfer)
    })?;
    let contract = encode_message(|os| {
        os.write_enum(1, TRANSFER_CONTRACT)?;
        os.write_bytes(2, &parameter)
    })?;
    encode_message(|os| {
        os.write_bytes(1, &block.number.to_be_bytes()[6..8])?;
        os.write_bytes(4, &block.id[8..16])?;
        os.write_int64(8, block.timestamp + EXPIRATION_MS)?;
        os.write_bytes(11, &contract)?;
        os.write_int64(14, block.timestamp)
    })
}

fn signed_transaction(raw: &[u8], signature: &[u8]) -> protobuf::Result<Vec<u8>> {
    encode_message(|os| {
        os.write_bytes(1, raw)?;
        os.write_bytes(2, signature)
    })
}

/// The broadcast may have reached the network, so retrying elsewhere is unsafe.
fn may_have_landed(err: &RpcError) -> bool {
    matches!(err, RpcError::Timeout)
}

enum Broadcast {
    Accepted,
    Refused(String),
}

enum LocalPath {
    Done(TxResult),
    Unavailable(String),
}

pub struct TronAdapter {
    node: Arc<NodeManager>,
    directory: Arc<ChainDirectory>,
}

impl TronAdapter {
    pub fn new(node: Arc<NodeManager>, directory: Arc<ChainDirectory>) -> Self {
        Self { node, directory }
    }

    async fn broadcast(&self, api: &str, unsigned: &Value, signature_hex: String) -> Result<Broadcast, TxResult> {
        let mut signed = unsigned.clone();
        signed["signature"] = json!([signature_hex]);
        let body = self
            .node
            .post_json(&format!("{}/wallet/broadcasttransaction", api), &signed)
            .await
            .map_err(|e| TxResult::from_rpc("Broadcast", &e))?;
        if body.get("result").and_then(Value::as_bool) == Some(true) {
            return Ok(Broadcast::Accepted);
        }
        Ok(Broadcast::Refused(refusal_message(&body)))
    }

    /// Builds, signs and submits the transfer without the remote builder.
    async fn send_built_locally(&self, api: &str, secret: &SecretKey, from: &str, to: &str, sun: i64) -> LocalPath {
        let (Some(owner), Some(recipient)) = (decode_address(from), decode_address(to)) else {
            return LocalPath::Unavailable("address not decodable".to_string());
        };
        let block = match self.node.post_json(&format!("{}/wallet/getnowblock", api), &json!({})).await {
            Ok(body) => match RefBlock::from_now_block(&body) {
                Some(block) => block,
                None => return LocalPath::Unavailable("no reference block".to_string()),
            },
            Err(e) => return LocalPath::Unavailable(e.to_string()),
        };
        let raw = match transfer_raw_data(&owner, &recipient, sun, &block) {
            Ok(raw) => raw,
            Err(e) => return LocalPath::Unavailable(e.to_string()),
        };
        let digest = Sha256::digest(&raw);
        let (compact, recid) = match sign_digest_recoverable(secret, &digest) {
            Ok(sig) => sig,
            Err(e) => return LocalPath::Done(TxResult::fail(TxErrorKind::InvalidKey, e.to_string())),
        };
        let mut signature = compact.to_vec();
        signature.push(recid);
        let tx = match signed_transaction(&raw, &signature) {
            Ok(tx) => tx,
            Err(e) => return LocalPath::Unavailable(e.to_string()),
        };

        let tx_id = hex::encode(digest);
        let body = json!({ "transaction": hex::encode(tx) });
        match self.node.post_json(&format!("{}/wallet/broadcasthex", api), &body).await {
            Ok(resp) if resp.get("result").and_then(Value::as_bool) == Some(true) => {
                let hash = resp.get("txid").and_then(Value::as_str).unwrap_or(tx_id.as_str()).to_string();
                info!(tx_hash = %hash, "transaction broadcast");
                LocalPath::Done(TxResult::ok(hash, Decimal::ZERO))
            }
            Ok(resp) => {
                let message = refusal_message(&resp);
                if is_resource_error(&message) {
                    LocalPath::Done(TxResult::fail(TxErrorKind::ProviderRejected, format!("TRX: {}", message)))
                } else {
                    LocalPath::Unavailable(message)
                }
            }
            Err(e) if may_have_landed(&e) => LocalPath::Done(TxResult::from_rpc("Broadcast", &e)),
            Err(e) => LocalPath::Unavailable(e.to_string()),
        }
    }
}

#[async_trait]
impl ChainAdapter for TronAdapter {
    fn family(&self) -> FamilyKind {
        FamilyKind::Tron
    }

    fn required_capability(&self) -> Capability {
        Capability::Secp256k1Ecdsa
    }

    /// Plain transfers burn bandwidth points, not TRX, while the daily
    /// allowance lasts.
    async fn estimate_fee(&self, coin: &CoinConfig, _amount: Decimal, _fee: &FeeLevel) -> FeeEstimate {
        FeeEstimate::new(Decimal::ZERO, format!("{} (bandwidth)", coin.symbol))
    }

    async fn send(&self, coin: &CoinConfig, request: &SendRequest) -> TxResult {
        let secret = match parse_secp256k1_key(&request.private_key) {
            Ok(k) => k,
            Err(e) => return TxResult::fail(TxErrorKind::InvalidKey, e.to_string()),
        };
        let sun = match to_base_units(request.amount, coin.decimals).and_then(|v| i64::try_from(v).ok()) {
            Some(v) if v > 0 => v,
            _ => return TxResult::fail(TxErrorKind::InvalidAmount, format!("Invalid amount: {}", request.amount)),
        };
        let Some(api) = self.directory.primary_rpc(coin) else {
            return TxResult::fail(TxErrorKind::NetworkError, format!("No API for {}", coin.symbol));
        };
        let from = match request.from_address.trim() {
            "" => tron_address(&compressed_public_key(&secret)),
            given => given.to_string(),
        };

        match self.send_built_locally(&api, &secret, &from, request.to.trim(), sun).await {
            LocalPath::Done(result) => return result,
            LocalPath::Unavailable(reason) => debug!(%reason, "local build unavailable, using remote builder"),
        }

        let create = json!({
            "owner_address": from,
            "to_address": request.to.trim(),
            "amount": sun,
            "visible": true,
        });
        let unsigned = match self.node.post_json(&format!("{}/wallet/createtransaction", api), &create).await {
            Ok(body) => body,
            Err(e) => return TxResult::from_rpc("Create transaction", &e),
        };
        if let Some(err) = unsigned.get("Error").and_then(Value::as_str) {
            return TxResult::fail(TxErrorKind::ProviderRejected, format!("TRX: {}", err));
        }
        let Some(tx_id) = unsigned.get("txID").and_then(Value::as_str).map(str::to_string) else {
            let snippet: String = unsigned.to_string().chars().take(100).collect();
            return TxResult::fail(TxErrorKind::ProviderRejected, format!("TRX: bad response: {}", snippet));
        };
        let digest = match hex::decode(&tx_id) {
            Ok(d) if d.len() == 32 => d,
            _ => return TxResult::fail(TxErrorKind::ProviderRejected, format!("TRX: malformed txID {}", tx_id)),
        };
        if !id_matches_raw(&unsigned, &digest) {
            debug!(%tx_id, "txID not verifiable against raw_data_hex");
        }

        let (compact, recid) = match sign_digest_recoverable(&secret, &digest) {
            Ok(sig) => sig,
            Err(e) => return TxResult::fail(TxErrorKind::InvalidKey, e.to_string()),
        };
        let rs = hex::encode(compact);

        let mut last_refusal = String::new();
        for v in [recid, 1 - recid.min(1)] {
            match self.broadcast(&api, &unsigned, format!("{}{:02x}", rs, v)).await {
                Ok(Broadcast::Accepted) => {
                    info!(tx_hash = %tx_id, recovery_id = v, "transaction broadcast");
                    return TxResult::ok(tx_id, Decimal::ZERO);
                }
                Ok(Broadcast::Refused(message)) => {
                    debug!(recovery_id = v, %message, "broadcast refused");
                    let stop = is_resource_error(&message);
                    last_refusal = message;
                    if stop {
                        break;
                    }
                }
                Err(failure) => return failure,
            }
        }
        warn!(tx_hash = %tx_id, message = %last_refusal, "broadcast rejected for every recovery id");
        TxResult::fail(TxErrorKind::ProviderRejected, format!("TRX broadcast: {}", last_refusal))
    }
}
