//! EVM adapter: native coins of any EVM chain and ERC-20 tokens on them.
//!
//! Talks plain JSON-RPC through [`NodeManager`] so every provider override
//! from the [`ChainDirectory`] applies. Transactions are typed and signed
//! with `ethers` and submitted raw.

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Eip1559TransactionRequest, TransactionRequest, U256};
use ethers::utils::to_checksum;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::directory::ChainDirectory;
use super::traits::{
    Capability, ChainAdapter, FeeEstimate, FeeLevel, SendRequest, TxErrorKind, TxResult,
};
use super::units::{parse_hex_quantity, u256_from_base_units, u256_to_decimal};
use crate::core::coins::{ChainFamily, CoinConfig, FamilyKind};
use crate::core::key_derivation::parse_secp256k1_key;
use crate::network::node_manager::{NodeManager, RpcError};

/// `transfer(address,uint256)`
pub const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];
/// `balanceOf(address)`
pub const BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];

const NATIVE_GAS: u64 = 21_000;
/// Gas assumed for token transfers when only quoting a fee.
const TOKEN_GAS_QUOTE: u64 = 65_000;
const TOKEN_GAS_DEFAULT: u64 = 100_000;
const TOKEN_GAS_FLOOR: u64 = 60_000;
const DEFAULT_PRIORITY_FEE_WEI: u64 = 1_500_000_000;

/// `value * num / den` without wrapping; providers can answer with any quantity.
fn scale(value: U256, (num, den): (u128, u128)) -> Option<U256> {
    value.checked_mul(U256::from(num))?.checked_div(U256::from(den))
}

fn fallback_fee() -> Decimal {
    Decimal::new(1, 3)
}

fn word(value: U256) -> [u8; 32] {
    let mut out = [0u8; 32];
    value.to_big_endian(&mut out);
    out
}

fn address_word(address: Address) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[12..].copy_from_slice(address.as_bytes());
    out
}

/// ABI-encoded `transfer(to, amount)` call data.
pub fn encode_transfer(to: Address, amount: U256) -> Bytes {
    let mut data = Vec::with_capacity(68);
    data.extend_from_slice(&TRANSFER_SELECTOR);
    data.extend_from_slice(&address_word(to));
    data.extend_from_slice(&word(amount));
    Bytes::from(data)
}

/// ABI-encoded `balanceOf(owner)` call data.
pub fn encode_balance_of(owner: Address) -> Bytes {
    let mut data = Vec::with_capacity(36);
    data.extend_from_slice(&BALANCE_OF_SELECTOR);
    data.extend_from_slice(&address_word(owner));
    Bytes::from(data)
}

fn hex_data(data: &Bytes) -> String {
    format!("0x{}", hex::encode(data.as_ref()))
}

/// JSON-RPC call whose result is a hex quantity.
pub async fn rpc_quantity(node: &NodeManager, rpc: &str, method: &str, params: Value) -> Result<U256, RpcError> {
    let value = node.json_rpc(rpc, method, params).await?;
    value
        .as_str()
        .and_then(parse_hex_quantity)
        .ok_or_else(|| RpcError::Malformed(format!("{} returned {}", method, value)))
}

/// `eth_getBalance` in wei.
pub async fn native_balance(node: &NodeManager, rpc: &str, address: &str) -> Result<U256, RpcError> {
    rpc_quantity(node, rpc, "eth_getBalance", json!([address, "latest"])).await
}

/// `balanceOf` through `eth_call`, in token base units. An empty `0x`
/// result (no code, or a contract that returns nothing) reads as zero.
pub async fn token_balance(node: &NodeManager, rpc: &str, contract: &str, owner: &str) -> Result<U256, RpcError> {
    let owner = Address::from_str(owner.trim()).map_err(|e| RpcError::Malformed(format!("owner address: {}", e)))?;
    let call = json!({ "to": contract, "data": hex_data(&encode_balance_of(owner)) });
    rpc_quantity(node, rpc, "eth_call", json!([call, "latest"])).await
}

/// Handles both `EvmNative` and `EvmToken` coins; `kind` picks which.
pub struct EvmAdapter {
    kind: FamilyKind,
    node: Arc<NodeManager>,
    directory: Arc<ChainDirectory>,
}

impl EvmAdapter {
    pub fn native(node: Arc<NodeManager>, directory: Arc<ChainDirectory>) -> Self {
        Self { kind: FamilyKind::EvmNative, node, directory }
    }

    pub fn token(node: Arc<NodeManager>, directory: Arc<ChainDirectory>) -> Self {
        Self { kind: FamilyKind::EvmToken, node, directory }
    }

    /// Fees are paid in the chain's native coin.
    fn fee_unit(&self, coin: &CoinConfig) -> String {
        match &coin.family {
            ChainFamily::EvmToken { parent, .. } => parent.clone(),
            _ => coin.symbol.clone(),
        }
    }

    async fn quantity(&self, rpc: &str, method: &str, params: Value) -> Result<U256, RpcError> {
        rpc_quantity(&self.node, rpc, method, params).await
    }

    /// Oracle gas price times the tier multiplier, or the custom Gwei value.
    async fn gas_price(&self, rpc: &str, level: &FeeLevel) -> Result<U256, RpcError> {
        if let FeeLevel::Custom(gwei) = level {
            return u256_from_base_units(*gwei, 9)
                .ok_or_else(|| RpcError::Malformed(format!("gas price {} Gwei out of range", gwei)));
        }
        let base = self.quantity(rpc, "eth_gasPrice", json!([])).await?;
        scale(base, level.multiplier()).ok_or_else(|| RpcError::Malformed(format!("gas price {} out of range", base)))
    }

    /// `(max_fee, priority_fee)` when the latest block reports a base fee.
    async fn eip1559_fees(&self, rpc: &str, level: &FeeLevel) -> Option<(U256, U256)> {
        let block = match self.node.json_rpc(rpc, "eth_getBlockByNumber", json!(["latest", false])).await {
            Ok(block) => block,
            Err(e) => {
                debug!(error = %e, "no latest block, using legacy gas price");
                return None;
            }
        };
        let base = block
            .get("baseFeePerGas")
            .and_then(Value::as_str)
            .and_then(parse_hex_quantity)
            .filter(|b| !b.is_zero())?;
        let priority = match self.quantity(rpc, "eth_maxPriorityFeePerGas", json!([])).await {
            Ok(p) => p,
            Err(e) => {
                debug!(error = %e, "eth_maxPriorityFeePerGas unavailable, using 1.5 Gwei");
                U256::from(DEFAULT_PRIORITY_FEE_WEI)
            }
        };
        let priority = scale(priority, level.multiplier())?;
        match base.checked_mul(U256::from(2u8)).and_then(|b| b.checked_add(priority)) {
            Some(max_fee) => Some((max_fee, priority)),
            None => {
                debug!(%base, "base fee out of range, using legacy gas price");
                None
            }
        }
    }

    /// Registered chain id, or `eth_chainId` for chains added without one.
    async fn chain_id(&self, coin: &CoinConfig, rpc: &str) -> Result<u64, RpcError> {
        let configured = match &coin.family {
            ChainFamily::EvmNative { chain_id } => *chain_id,
            ChainFamily::EvmToken { parent, .. } => self.directory.coin(parent).and_then(|p| match p.family {
                ChainFamily::EvmNative { chain_id } => chain_id,
                _ => None,
            }),
            _ => None,
        };
        if let Some(id) = configured {
            return Ok(id);
        }
        let id = self.quantity(rpc, "eth_chainId", json!([])).await?;
        if id > U256::from(u64::MAX) {
            return Err(RpcError::Malformed(format!("chain id {} out of range", id)));
        }
        Ok(id.as_u64())
    }

    /// `eth_estimateGas` x1.3 with a floor; a fixed default when estimation fails.
    async fn token_gas_limit(&self, rpc: &str, from: Address, contract: Address, data: &Bytes) -> U256 {
        let call = json!({
            "from": to_checksum(&from, None),
            "to": to_checksum(&contract, None),
            "data": hex_data(data),
        });
        match self.quantity(rpc, "eth_estimateGas", json!([call])).await {
            Ok(estimate) => match scale(estimate, (13, 10)) {
                Some(padded) => padded.max(U256::from(TOKEN_GAS_FLOOR)),
                None => U256::from(TOKEN_GAS_DEFAULT),
            },
            Err(e) => {
                debug!(error = %e, "eth_estimateGas failed, using default token gas");
                U256::from(TOKEN_GAS_DEFAULT)
            }
        }
    }
}

#[async_trait]
impl ChainAdapter for EvmAdapter {
    fn family(&self) -> FamilyKind {
        self.kind
    }

    fn required_capability(&self) -> Capability {
        Capability::Secp256k1Ecdsa
    }

    async fn estimate_fee(&self, coin: &CoinConfig, _amount: Decimal, fee: &FeeLevel) -> FeeEstimate {
        let unit = self.fee_unit(coin);
        let Some(rpc) = self.directory.primary_rpc(coin) else {
            return FeeEstimate::new(fallback_fee(), format!("{} (no RPC)", unit));
        };
        let gas = match self.kind {
            FamilyKind::EvmToken => TOKEN_GAS_QUOTE,
            _ => NATIVE_GAS,
        };
        let priced = self.gas_price(&rpc, fee).await.and_then(|price| {
            price
                .checked_mul(U256::from(gas))
                .map(|cost| (price, cost))
                .ok_or_else(|| RpcError::Malformed(format!("fee for gas price {} out of range", price)))
        });
        match priced {
            Ok((price, cost)) => {
                let value = u256_to_decimal(cost, 18).unwrap_or_default().round_dp(8);
                let gwei = u256_to_decimal(price, 9).unwrap_or_default();
                FeeEstimate::new(value, format!("{} ({:.2} Gwei)", unit, gwei))
            }
            Err(e) => {
                debug!(symbol = %coin.symbol, error = %e, "gas price unavailable");
                FeeEstimate::new(fallback_fee(), format!("{} (RPC error)", unit))
            }
        }
    }

    async fn send(&self, coin: &CoinConfig, request: &SendRequest) -> TxResult {
        let secret = match parse_secp256k1_key(&request.private_key) {
            Ok(k) => k,
            Err(e) => return TxResult::fail(TxErrorKind::InvalidKey, e.to_string()),
        };
        let Some(rpc) = self.directory.primary_rpc(coin) else {
            return TxResult::fail(TxErrorKind::NetworkError, format!("No RPC for {}", coin.symbol));
        };
        let to = match Address::from_str(request.to.trim()) {
            Ok(a) => a,
            Err(e) => return TxResult::fail(TxErrorKind::InvalidAddress, format!("Invalid address: {}", e)),
        };
        let Some(amount) = u256_from_base_units(request.amount, coin.decimals) else {
            return TxResult::fail(TxErrorKind::InvalidAmount, format!("Invalid amount: {}", request.amount));
        };

        let chain_id = match self.chain_id(coin, &rpc).await {
            Ok(id) => id,
            Err(e) => return TxResult::from_rpc("Chain id", &e),
        };
        let wallet = match LocalWallet::from_bytes(&secret.secret_bytes()) {
            Ok(w) => w.with_chain_id(chain_id),
            Err(e) => return TxResult::fail(TxErrorKind::InvalidKey, format!("Invalid private key: {}", e)),
        };
        let from = wallet.address();

        let nonce = match self
            .quantity(&rpc, "eth_getTransactionCount", json!([to_checksum(&from, None), "pending"]))
            .await
        {
            Ok(n) => n,
            Err(e) => return TxResult::from_rpc("Nonce", &e),
        };

        let (call_to, value, data, gas) = match &coin.family {
            ChainFamily::EvmToken { contract, .. } => {
                let contract = match Address::from_str(contract) {
                    Ok(c) => c,
                    Err(e) => {
                        return TxResult::fail(TxErrorKind::UnsupportedCoin, format!("Bad contract address: {}", e))
                    }
                };
                let data = encode_transfer(to, amount);
                let gas = self.token_gas_limit(&rpc, from, contract, &data).await;
                (contract, U256::zero(), Some(data), gas)
            }
            _ => (to, amount, None, U256::from(NATIVE_GAS)),
        };

        let eip1559 = match request.fee {
            FeeLevel::Custom(_) => None,
            _ => self.eip1559_fees(&rpc, &request.fee).await,
        };
        let (tx, price): (TypedTransaction, U256) = match eip1559 {
            Some((max_fee, priority)) => {
                let mut tx = Eip1559TransactionRequest::new()
                    .from(from)
                    .to(call_to)
                    .value(value)
                    .gas(gas)
                    .nonce(nonce)
                    .max_fee_per_gas(max_fee)
                    .max_priority_fee_per_gas(priority)
                    .chain_id(chain_id);
                if let Some(data) = data {
                    tx = tx.data(data);
                }
                (tx.into(), max_fee)
            }
            None => {
                let gas_price = match self.gas_price(&rpc, &request.fee).await {
                    Ok(p) => p,
                    Err(e) => return TxResult::from_rpc("Gas price", &e),
                };
                let mut tx = TransactionRequest::new()
                    .from(from)
                    .to(call_to)
                    .value(value)
                    .gas(gas)
                    .gas_price(gas_price)
                    .nonce(nonce)
                    .chain_id(chain_id);
                if let Some(data) = data {
                    tx = tx.data(data);
                }
                (tx.into(), gas_price)
            }
        };

        let Some(max_cost) = gas.checked_mul(price) else {
            let err = RpcError::Malformed(format!("fee for gas price {} out of range", price));
            return TxResult::from_rpc("Gas price", &err);
        };

        let signature = match wallet.sign_transaction_sync(&tx) {
            Ok(sig) => sig,
            Err(e) => return TxResult::fail(TxErrorKind::InvalidKey, format!("Signing failed: {}", e)),
        };
        let raw = tx.rlp_signed(&signature);
        let fee = u256_to_decimal(max_cost, 18).unwrap_or_default();

        match self.node.json_rpc(&rpc, "eth_sendRawTransaction", json!([hex_data(&raw)])).await {
            Ok(Value::String(hash)) if !hash.is_empty() => {
                info!(symbol = %coin.symbol, tx_hash = %hash, "transaction broadcast");
                TxResult::ok(hash, fee)
            }
            Ok(other) => {
                warn!(symbol = %coin.symbol, response = %other, "broadcast returned no hash");
                TxResult::fail(TxErrorKind::ProviderRejected, "Empty hash returned")
            }
            Err(e) => {
                warn!(symbol = %coin.symbol, error = %e, "broadcast failed");
                TxResult::from_rpc("Broadcast", &e)
            }
        }
    }
}
