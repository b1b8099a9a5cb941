//! Per-chain balance lookups. Every function walks a fixed, bounded list of
//! providers and returns `None` once it is exhausted, except Tron which
//! reports zero.

use ethers::types::U256;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::str::FromStr;
use tracing::debug;

use crate::blockchain::directory::ChainDirectory;
use crate::blockchain::ethereum::{native_balance, token_balance};
use crate::blockchain::units::{from_base_units, u256_to_decimal};
use crate::core::coins::{ChainFamily, CoinConfig, UtxoChain};
use crate::network::node_manager::NodeManager;

const SATS_DECIMALS: u32 = 8;

fn as_u128(v: &Value) -> Option<u128> {
    match v {
        Value::Number(n) => n.as_u64().map(u128::from),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `funded - spent` from a mempool.space `/address/{a}` body.
fn mempool_balance(body: &Value) -> Option<u128> {
    let stats = body.get("chain_stats")?;
    let funded = as_u128(stats.get("funded_txo_sum")?)?;
    let spent = stats.get("spent_txo_sum").and_then(as_u128).unwrap_or(0);
    Some(funded.saturating_sub(spent))
}

/// BlockCypher `/addrs/{a}/balance`: received minus sent, or `balance`.
fn blockcypher_balance(body: &Value) -> Option<u128> {
    match (body.get("total_received").and_then(as_u128), body.get("total_sent").and_then(as_u128)) {
        (Some(received), Some(sent)) => Some(received.saturating_sub(sent)),
        _ => body.get("balance").and_then(as_u128),
    }
}

/// Blockchair dashboard: `data.{address}.address.received - spent`.
fn blockchair_balance(body: &Value, address: &str) -> Option<u128> {
    let entry = body.get("data")?.get(address)?.get("address")?;
    match (entry.get("received").and_then(as_u128), entry.get("spent").and_then(as_u128)) {
        (Some(received), Some(spent)) => Some(received.saturating_sub(spent)),
        _ => entry.get("balance").and_then(as_u128),
    }
}

pub async fn utxo_balance(
    node: &NodeManager,
    directory: &ChainDirectory,
    chain: UtxoChain,
    symbol: &str,
    address: &str,
) -> Option<Decimal> {
    let sats = match chain {
        UtxoChain::Bitcoin => {
            let url = format!("{}/address/{}", directory.mempool_api(), address);
            node.get_json(&url, &[]).await.ok().as_ref().and_then(mempool_balance)
        }
        UtxoChain::BitcoinCash if directory.custom_rpc(symbol).is_none() => {
            let url = format!("{}/bitcoin-cash/dashboards/address/{}", directory.endpoints().blockchair, address);
            node.get_json(&url, &[]).await.ok().and_then(|b| blockchair_balance(&b, address))
        }
        _ => {
            let url = format!("{}/addrs/{}/balance", directory.blockcypher_api(chain, symbol), address);
            node.get_json(&url, &[]).await.ok().as_ref().and_then(blockcypher_balance)
        }
    };
    if sats.is_none() {
        debug!(%symbol, "balance explorer gave no answer");
    }
    sats.and_then(|s| from_base_units(s, SATS_DECIMALS))
}

/// Native EVM balance: each RPC candidate in order, then for ETH the
/// Blockscout explorer and the secondary public RPC.
pub async fn evm_native_balance(
    node: &NodeManager,
    directory: &ChainDirectory,
    coin: &CoinConfig,
    address: &str,
) -> Option<Decimal> {
    for rpc in directory.rpc_candidates(coin) {
        match native_balance(node, &rpc, address).await {
            Ok(wei) => return u256_to_decimal(wei, coin.decimals),
            Err(e) => debug!(symbol = %coin.symbol, %rpc, error = %e, "eth_getBalance failed"),
        }
    }
    if coin.symbol != "ETH" || coin.is_custom {
        return None;
    }

    let url = format!("{}/addresses/{}", directory.endpoints().eth_explorer, address);
    if let Ok(body) = node.get_json(&url, &[]).await {
        let wei = body
            .get("coin_balance")
            .and_then(Value::as_str)
            .and_then(|s| U256::from_dec_str(s).ok());
        if let Some(wei) = wei {
            return u256_to_decimal(wei, coin.decimals);
        }
    }
    match native_balance(node, &directory.endpoints().eth_fallback_rpc, address).await {
        Ok(wei) => u256_to_decimal(wei, coin.decimals),
        Err(e) => {
            debug!(error = %e, "ETH balance sources exhausted");
            None
        }
    }
}

/// ERC-20 `balanceOf` through each RPC candidate of the token.
pub async fn erc20_balance(
    node: &NodeManager,
    directory: &ChainDirectory,
    coin: &CoinConfig,
    contract: &str,
    address: &str,
) -> Option<Decimal> {
    for rpc in directory.rpc_candidates(coin) {
        match token_balance(node, &rpc, contract, address).await {
            Ok(units) => return u256_to_decimal(units, coin.decimals),
            Err(e) => debug!(symbol = %coin.symbol, %rpc, error = %e, "balanceOf failed"),
        }
    }
    None
}

pub async fn solana_balance(node: &NodeManager, directory: &ChainDirectory, coin: &CoinConfig, address: &str) -> Option<Decimal> {
    let rpc = directory.primary_rpc(coin)?;
    let result = node.json_rpc(&rpc, "getBalance", json!([address])).await.ok()?;
    let lamports = result.get("value").and_then(as_u128)?;
    from_base_units(lamports, coin.decimals)
}

/// TronGrid v1 accounts, Tronscan `accountv2`, then `wallet/getaccount`.
/// An account the network has never seen has no balance field anywhere,
/// so running out of sources reads as zero.
pub async fn tron_balance(node: &NodeManager, directory: &ChainDirectory, coin: &CoinConfig, address: &str) -> Decimal {
    let api = directory.primary_rpc(coin).unwrap_or_else(|| directory.endpoints().trongrid.clone());
    let to_trx = |sun: u128| from_base_units(sun, coin.decimals);

    if let Ok(body) = node.get_json(&format!("{}/v1/accounts/{}", api, address), &[]).await {
        let sun = body
            .get("data")
            .and_then(Value::as_array)
            .and_then(|d| d.first())
            .map(|acct| acct.get("balance").and_then(as_u128).unwrap_or(0));
        if let Some(value) = sun.and_then(to_trx) {
            return value;
        }
    }

    let tronscan = format!("{}/accountv2", directory.endpoints().tronscan);
    if let Ok(body) = node.get_json(&tronscan, &[("address", address)]).await {
        if let Some(value) = body.get("balance").and_then(as_u128).and_then(to_trx) {
            return value;
        }
    }

    let getaccount = json!({ "address": address, "visible": true });
    if let Ok(body) = node.post_json(&format!("{}/wallet/getaccount", api), &getaccount).await {
        if let Some(value) = body.get("balance").and_then(as_u128).and_then(to_trx) {
            return value;
        }
    }
    debug!(%address, "no Tron source reported a balance, treating as zero");
    Decimal::ZERO
}

/// Dispatch on the coin's family.
pub async fn fetch_balance(
    node: &NodeManager,
    directory: &ChainDirectory,
    coin: &CoinConfig,
    address: &str,
) -> Option<Decimal> {
    match &coin.family {
        ChainFamily::Utxo(chain) => utxo_balance(node, directory, *chain, &coin.symbol, address).await,
        ChainFamily::EvmNative { .. } => evm_native_balance(node, directory, coin, address).await,
        ChainFamily::EvmToken { contract, .. } => erc20_balance(node, directory, coin, contract, address).await,
        ChainFamily::Solana => solana_balance(node, directory, coin, address).await,
        ChainFamily::Tron => Some(tron_balance(node, directory, coin, address).await),
    }
}

/// JSON price figure as a Decimal; accepts numbers, strings and exponents.
pub fn json_decimal(v: &Value) -> Option<Decimal> {
    let text = match v {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text).or_else(|_| Decimal::from_scientific(&text)).ok()
}
