//! UTXO adapter for BTC, LTC, DOGE and BCH.
//!
//! Assembly is provider-assisted: a BlockCypher-style builder returns an
//! unsigned skeleton plus the digests to sign, we sign each locally and hand
//! the skeleton back with signatures and the compressed public key.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::fees::{fee_rate, RateSource};
use crate::blockchain::directory::ChainDirectory;
use crate::blockchain::signing::{compressed_public_key, sign_digest_der};
use crate::blockchain::traits::{
    Capability, ChainAdapter, FeeEstimate, FeeLevel, SendRequest, TxErrorKind, TxResult,
};
use crate::blockchain::units::{from_base_units, to_base_units};
use crate::core::coins::{ChainFamily, CoinConfig, FamilyKind, UtxoChain};
use crate::core::key_derivation::parse_secp256k1_key;
use crate::network::node_manager::NodeManager;

const SATS_DECIMALS: u32 = 8;

/// First error message in a BlockCypher response, if any.
fn provider_error(body: &Value) -> Option<String> {
    if let Some(errors) = body.get("errors").filter(|e| !e.is_null()) {
        let msg = errors
            .as_array()
            .and_then(|list| list.first())
            .map(|first| first.get("error").and_then(Value::as_str).map(str::to_string).unwrap_or_else(|| first.to_string()))
            .unwrap_or_else(|| errors.to_string());
        return Some(msg);
    }
    body.get("error").and_then(Value::as_str).map(str::to_string)
}

fn utxo_chain(coin: &CoinConfig) -> Option<UtxoChain> {
    match coin.family {
        ChainFamily::Utxo(chain) => Some(chain),
        _ => None,
    }
}

pub struct UtxoAdapter {
    node: Arc<NodeManager>,
    directory: Arc<ChainDirectory>,
}

impl UtxoAdapter {
    pub fn new(node: Arc<NodeManager>, directory: Arc<ChainDirectory>) -> Self {
        Self { node, directory }
    }

    /// Skeleton request. Tiers map onto the builder's `preference`; an
    /// explicit sat/vbyte becomes an absolute `fees` figure.
    fn skeleton(&self, from: &str, to: &str, sats: u64, level: &FeeLevel, custom_fee_sats: Option<u64>) -> Value {
        let mut body = json!({
            "inputs": [{ "addresses": [from] }],
            "outputs": [{ "addresses": [to], "value": sats }],
            "preference": level.tier_name(),
        });
        if let Some(fees) = custom_fee_sats {
            body["fees"] = json!(fees);
        }
        body
    }
}

#[async_trait]
impl ChainAdapter for UtxoAdapter {
    fn family(&self) -> FamilyKind {
        FamilyKind::Utxo
    }

    fn required_capability(&self) -> Capability {
        Capability::Secp256k1Ecdsa
    }

    async fn estimate_fee(&self, coin: &CoinConfig, _amount: Decimal, fee: &FeeLevel) -> FeeEstimate {
        let Some(chain) = utxo_chain(coin) else {
            return FeeEstimate::new(Decimal::ZERO, coin.symbol.clone());
        };
        let Some(rate) = fee_rate(&self.node, &self.directory, chain, &coin.symbol, fee).await else {
            return FeeEstimate::new(Decimal::ZERO, format!("{} (invalid fee rate)", coin.symbol));
        };
        let value = from_base_units(u128::from(rate.total_sats()), SATS_DECIMALS).unwrap_or_default();
        let approx = if rate.source == RateSource::Fallback { "~" } else { "" };
        FeeEstimate::new(value, format!("{} ({}{} sat/vB)", coin.symbol, approx, rate.sat_per_vbyte))
    }

    async fn send(&self, coin: &CoinConfig, request: &SendRequest) -> TxResult {
        let Some(chain) = utxo_chain(coin) else {
            return TxResult::fail(TxErrorKind::UnsupportedCoin, format!("{} is not a UTXO coin", coin.symbol));
        };
        let from = request.from_address.trim();
        if from.is_empty() {
            return TxResult::fail(TxErrorKind::InvalidAddress, format!("From address needed for {}", coin.symbol));
        }
        if chain == UtxoChain::Bitcoin && from.to_ascii_lowercase().starts_with("bc1p") {
            return TxResult::fail(
                TxErrorKind::UnsupportedCoin,
                "Taproot inputs are not supported by the transaction builder. Use BIP84 (Native SegWit).",
            );
        }
        let secret = match parse_secp256k1_key(&request.private_key) {
            Ok(k) => k,
            Err(e) => return TxResult::fail(TxErrorKind::InvalidKey, e.to_string()),
        };
        let sats = match to_base_units(request.amount, SATS_DECIMALS).and_then(|v| u64::try_from(v).ok()) {
            Some(v) if v > 0 => v,
            _ => return TxResult::fail(TxErrorKind::InvalidAmount, format!("Invalid amount: {}", request.amount)),
        };

        let custom_fee = match &request.fee {
            FeeLevel::Custom(rate) => match fee_rate(&self.node, &self.directory, chain, &coin.symbol, &request.fee).await {
                Some(r) => Some(r.total_sats()),
                None => return TxResult::fail(TxErrorKind::InvalidAmount, format!("Invalid fee rate: {} sat/vB", rate)),
            },
            _ => None,
        };
        let api = self.directory.blockcypher_api(chain, &coin.symbol);
        let skeleton = self.skeleton(from, request.to.trim(), sats, &request.fee, custom_fee);

        let mut unsigned = match self.node.post_json(&format!("{}/txs/new", api), &skeleton).await {
            Ok(body) => body,
            Err(e) => return TxResult::from_rpc("Transaction builder", &e),
        };
        if let Some(msg) = provider_error(&unsigned) {
            warn!(symbol = %coin.symbol, error = %msg, "builder refused skeleton");
            return TxResult::fail(TxErrorKind::ProviderRejected, format!("Transaction builder: {}", msg));
        }

        let tosign: Vec<String> = unsigned
            .get("tosign")
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        if tosign.is_empty() {
            return TxResult::fail(TxErrorKind::ProviderRejected, "Transaction builder: nothing to sign (no UTXOs?)");
        }
        debug!(symbol = %coin.symbol, inputs = tosign.len(), "signing builder digests");

        let mut signatures = Vec::with_capacity(tosign.len());
        for digest_hex in &tosign {
            let digest = match hex::decode(digest_hex) {
                Ok(d) => d,
                Err(e) => return TxResult::fail(TxErrorKind::ProviderRejected, format!("Bad digest from builder: {}", e)),
            };
            match sign_digest_der(&secret, &digest) {
                Ok(sig) => signatures.push(hex::encode(sig)),
                Err(e) => return TxResult::fail(TxErrorKind::ProviderRejected, format!("Bad digest from builder: {}", e)),
            }
        }
        let pubkey = hex::encode(compressed_public_key(&secret).serialize());
        unsigned["pubkeys"] = json!(vec![pubkey; signatures.len()]);
        unsigned["signatures"] = json!(signatures);

        let sent = match self.node.post_json(&format!("{}/txs/send", api), &unsigned).await {
            Ok(body) => body,
            Err(e) => return TxResult::from_rpc("Broadcast", &e),
        };
        if let Some(msg) = provider_error(&sent) {
            warn!(symbol = %coin.symbol, error = %msg, "broadcast rejected");
            return TxResult::fail(TxErrorKind::ProviderRejected, format!("Broadcast: {}", msg));
        }
        let tx = sent.get("tx").cloned().unwrap_or(Value::Null);
        let Some(hash) = tx.get("hash").and_then(Value::as_str).filter(|h| !h.is_empty()) else {
            return TxResult::fail(TxErrorKind::ProviderRejected, "Broadcast: empty hash returned");
        };
        let fee_sats = tx.get("fees").and_then(Value::as_u64).unwrap_or(0);
        let fee = from_base_units(u128::from(fee_sats), SATS_DECIMALS).unwrap_or_default();
        info!(symbol = %coin.symbol, tx_hash = %hash, "transaction broadcast");
        TxResult::ok(hash, fee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Endpoints;
    use httpmock::prelude::*;
    use std::str::FromStr;
    use std::time::Duration;
    use zeroize::Zeroizing;

    fn adapter(server: &MockServer) -> (UtxoAdapter, Arc<ChainDirectory>) {
        let directory = Arc::new(ChainDirectory::new(Endpoints::under(&server.base_url())));
        let node = Arc::new(NodeManager::new(Duration::from_secs(5)).unwrap());
        (UtxoAdapter::new(node, directory.clone()), directory)
    }

    fn request(from: &str, to: &str) -> SendRequest {
        SendRequest {
            symbol: "LTC".into(),
            // WIF-free hex form is accepted too
            private_key: Zeroizing::new("0c28fca386c7a227600b2fe50b7cae11ec86d3bf1fbe471be89827e19d72aa1d".into()),
            to: to.into(),
            amount: Decimal::from_str("0.01").unwrap(),
            fee: FeeLevel::Medium,
            from_address: from.into(),
        }
    }

    #[tokio::test]
    async fn btc_fee_uses_mempool_recommendation() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/mempool/v1/fees/recommended");
            then.status(200).json_body(json!({"fastestFee": 40, "halfHourFee": 20, "economyFee": 4}));
        });
        let (adapter, directory) = adapter(&server);
        let btc = directory.coin("BTC").unwrap();
        let fee = adapter.estimate_fee(&btc, Decimal::ONE, &FeeLevel::High).await;
        assert_eq!(fee.value, Decimal::from_str("0.0001").unwrap());
        assert_eq!(fee.unit, "BTC (40 sat/vB)");
    }

    #[tokio::test]
    async fn fallback_table_when_oracle_down() {
        let server = MockServer::start();
        let (adapter, directory) = adapter(&server);
        let doge = directory.coin("DOGE").unwrap();
        let fee = adapter.estimate_fee(&doge, Decimal::ONE, &FeeLevel::Low).await;
        assert_eq!(fee.value, Decimal::from_str("0.5").unwrap());
        assert_eq!(fee.unit, "DOGE (~200000 sat/vB)");
    }

    #[tokio::test]
    async fn custom_rate_needs_no_oracle() {
        let server = MockServer::start();
        let (adapter, directory) = adapter(&server);
        let btc = directory.coin("BTC").unwrap();
        let fee = adapter.estimate_fee(&btc, Decimal::ONE, &FeeLevel::Custom(Decimal::from(12))).await;
        assert_eq!(fee.value, Decimal::from_str("0.00003").unwrap());
        assert_eq!(fee.unit, "BTC (12 sat/vB)");
    }

    #[tokio::test]
    async fn out_of_range_custom_rate_is_refused() {
        let server = MockServer::start();
        let builder = server.mock(|when, then| {
            when.method(POST).path("/blockcypher/ltc/main/txs/new");
            then.status(200).json_body(json!({}));
        });
        let (adapter, directory) = adapter(&server);
        let ltc = directory.coin("LTC").unwrap();
        let mut req = request("LQ3B36Yv2rBTxdgAdYpU2UcEZsaNwXeATk", "ltc1qg82tnwmsjxzuv6gzmsadnljvhrgmnsrmsq8unz");
        req.fee = FeeLevel::Custom(Decimal::MAX);
        let result = adapter.send(&ltc, &req).await;
        assert_eq!(result.error_kind, Some(TxErrorKind::InvalidAmount));
        assert!(result.error.unwrap().starts_with("Invalid fee rate"));
        builder.assert_hits(0);

        let fee = adapter.estimate_fee(&ltc, Decimal::ONE, &FeeLevel::Custom(Decimal::MAX)).await;
        assert_eq!(fee.value, Decimal::ZERO);
        assert_eq!(fee.unit, "LTC (invalid fee rate)");
    }

    #[tokio::test]
    async fn taproot_sender_refused_before_network() {
        let server = MockServer::start();
        let builder = server.mock(|when, then| {
            when.method(POST).path("/blockcypher/btc/main/txs/new");
            then.status(200).json_body(json!({}));
        });
        let (adapter, directory) = adapter(&server);
        let btc = directory.coin("BTC").unwrap();
        let mut req = request("bc1p5d7rjq7g6rdk2yhzks9smlaqtedr4dekq08ge8ztwac72sfr9rusxg3297", "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq");
        req.symbol = "BTC".into();
        let result = adapter.send(&btc, &req).await;
        assert_eq!(result.error_kind, Some(TxErrorKind::UnsupportedCoin));
        builder.assert_hits(0);
    }

    #[tokio::test]
    async fn builder_flow_signs_every_digest() {
        let server = MockServer::start();
        let new_tx = server.mock(|when, then| {
            when.method(POST).path("/blockcypher/ltc/main/txs/new").body_contains("\"preference\":\"medium\"");
            then.status(201).json_body(json!({
                "tx": {"hash": "", "fees": 0},
                "tosign": ["11".repeat(32), "22".repeat(32)]
            }));
        });
        let send = server.mock(|when, then| {
            when.method(POST).path("/blockcypher/ltc/main/txs/send").body_contains("\"signatures\"").body_contains("\"pubkeys\"");
            then.status(201).json_body(json!({"tx": {"hash": "ab12", "fees": 10000}}));
        });
        let (adapter, directory) = adapter(&server);
        let ltc = directory.coin("LTC").unwrap();
        let result = adapter
            .send(&ltc, &request("LQ3B36Yv2rBTxdgAdYpU2UcEZsaNwXeATk", "ltc1qg82tnwmsjxzuv6gzmsadnljvhrgmnsrmsq8unz"))
            .await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.tx_hash.as_deref(), Some("ab12"));
        assert_eq!(result.fee, Decimal::from_str("0.0001").unwrap());
        new_tx.assert();
        send.assert();
    }

    #[tokio::test]
    async fn builder_errors_are_rejections() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/blockcypher/ltc/main/txs/new");
            then.status(400).json_body(json!({"errors": [{"error": "Not enough funds in 1 inputs to pay for 1 outputs"}]}));
        });
        let (adapter, directory) = adapter(&server);
        let ltc = directory.coin("LTC").unwrap();
        let result = adapter
            .send(&ltc, &request("LQ3B36Yv2rBTxdgAdYpU2UcEZsaNwXeATk", "ltc1qg82tnwmsjxzuv6gzmsadnljvhrgmnsrmsq8unz"))
            .await;
        assert_eq!(result.error_kind, Some(TxErrorKind::ProviderRejected));
        assert!(result.error.unwrap().contains("Not enough funds"));
    }

    #[test]
    fn provider_error_shapes() {
        assert_eq!(provider_error(&json!({"error": "bad"})), Some("bad".into()));
        assert_eq!(provider_error(&json!({"errors": [{"error": "first"}, {"error": "second"}]})), Some("first".into()));
        assert_eq!(provider_error(&json!({"tx": {}})), None);
    }
}
