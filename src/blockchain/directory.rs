//! Provider selection shared by the transaction engine and the market
//! aggregator: coin lookups through the registry overlay and URL resolution
//! with custom overrides ahead of defaults.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::core::coins::{ChainFamily, CoinConfig, CoinRegistry, UtxoChain};
use crate::core::config::{CustomCoin, CustomRpc, Endpoints};
use crate::core::errors::Result;

#[derive(Debug, Default)]
pub struct ChainDirectory {
    registry: RwLock<CoinRegistry>,
    overrides: RwLock<HashMap<String, CustomRpc>>,
    endpoints: Endpoints,
}

impl ChainDirectory {
    pub fn new(endpoints: Endpoints) -> Self {
        Self { endpoints, ..Self::default() }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn coin(&self, symbol: &str) -> Option<CoinConfig> {
        self.registry.read().get(symbol).cloned()
    }

    pub fn registry(&self) -> CoinRegistry {
        self.registry.read().clone()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.registry.read().symbols()
    }

    pub fn add_custom_coin(&self, spec: &CustomCoin) -> Result<CoinConfig> {
        self.registry.write().add_custom(spec)
    }

    pub fn remove_custom_coin(&self, symbol: &str) -> bool {
        self.registry.write().remove_custom(symbol)
    }

    pub fn set_override(&self, symbol: &str, rpc: CustomRpc) {
        self.overrides.write().insert(symbol.to_ascii_uppercase(), rpc);
    }

    pub fn clear_override(&self, symbol: &str) -> bool {
        self.overrides.write().remove(&symbol.to_ascii_uppercase()).is_some()
    }

    pub fn get_override(&self, symbol: &str) -> Option<CustomRpc> {
        self.overrides.read().get(&symbol.to_ascii_uppercase()).cloned()
    }

    /// Non-empty custom RPC URL for `symbol`.
    pub fn custom_rpc(&self, symbol: &str) -> Option<String> {
        self.get_override(symbol)
            .map(|o| o.rpc.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
    }

    fn custom_explorer(&self, symbol: &str) -> Option<String> {
        self.get_override(symbol)
            .map(|o| o.explorer.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
    }

    /// Built-in default RPC for account-model coins. Tokens use their parent's.
    pub fn default_rpc(&self, coin: &CoinConfig) -> Option<String> {
        match &coin.family {
            ChainFamily::EvmNative { .. } => match coin.symbol.as_str() {
                _ if coin.is_custom => coin.rpc.clone(),
                "ETH" => Some(self.endpoints.eth_rpc.clone()),
                "BNB" => Some(self.endpoints.bsc_rpc.clone()),
                "MATIC" => Some(self.endpoints.polygon_rpc.clone()),
                _ => coin.rpc.clone(),
            },
            ChainFamily::EvmToken { parent, .. } => self.coin(parent).and_then(|p| self.default_rpc(&p)),
            ChainFamily::Solana => Some(self.endpoints.solana_rpc.clone()),
            ChainFamily::Tron => Some(self.endpoints.trongrid.clone()),
            ChainFamily::Utxo(_) => None,
        }
    }

    /// Ordered, de-duplicated RPC candidates: the coin's override, then for
    /// tokens the parent chain's override, then the default.
    pub fn rpc_candidates(&self, coin: &CoinConfig) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let mut push = |url: Option<String>| {
            if let Some(url) = url {
                if !out.contains(&url) {
                    out.push(url);
                }
            }
        };
        push(self.custom_rpc(&coin.symbol));
        if let ChainFamily::EvmToken { parent, .. } = &coin.family {
            push(self.custom_rpc(parent));
        }
        push(self.default_rpc(coin));
        out
    }

    /// First RPC candidate; what outbound transactions use.
    pub fn primary_rpc(&self, coin: &CoinConfig) -> Option<String> {
        self.rpc_candidates(coin).into_iter().next()
    }

    /// mempool.space-style API used for BTC fees and balances. A BTC override
    /// replaces it.
    pub fn mempool_api(&self) -> String {
        self.custom_rpc("BTC").unwrap_or_else(|| self.endpoints.mempool.clone())
    }

    /// BlockCypher-style chain root (`{root}/{chain}/main`). Overrides for the
    /// non-BTC UTXO coins replace it whole; BTC's override points at mempool.
    pub fn blockcypher_api(&self, chain: UtxoChain, symbol: &str) -> String {
        match chain {
            UtxoChain::Bitcoin => None,
            _ => self.custom_rpc(symbol),
        }
        .unwrap_or_else(|| format!("{}/{}/main", self.endpoints.blockcypher, chain.blockcypher_chain()))
    }

    pub fn explorer_tx_url(&self, coin: &CoinConfig, tx_hash: &str) -> String {
        match self.custom_explorer(&coin.symbol) {
            Some(base) => format!("{}/tx/{}", base, tx_hash),
            None => coin.explorer_tx_url(tx_hash),
        }
    }
}
