//! Transaction engine: routes each coin to its family adapter and enforces
//! the pre-flight checks every send goes through before the network.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::bitcoin::adapter::UtxoAdapter;
use super::directory::ChainDirectory;
use super::ethereum::EvmAdapter;
use super::solana::SolanaAdapter;
use super::traits::{
    AddressCheck, ChainAdapter, FeeEstimate, FeeLevel, SendRequest, SigningCapabilities, TxErrorKind, TxResult,
};
use super::tron::TronAdapter;
use crate::core::coins::{CoinConfig, FamilyKind};
use crate::core::config::NetworkConfig;
use crate::core::errors::Result;
use crate::market::MarketDataAggregator;
use crate::network::node_manager::NodeManager;

pub struct TransactionEngine {
    directory: Arc<ChainDirectory>,
    adapters: HashMap<FamilyKind, Arc<dyn ChainAdapter>>,
    capabilities: SigningCapabilities,
    balances: Option<Arc<MarketDataAggregator>>,
}

impl TransactionEngine {
    pub fn new(directory: Arc<ChainDirectory>, network: &NetworkConfig) -> Result<Self> {
        let node = Arc::new(NodeManager::new(Duration::from_secs(network.tx_timeout_secs))?);
        let adapters: Vec<Arc<dyn ChainAdapter>> = vec![
            Arc::new(UtxoAdapter::new(node.clone(), directory.clone())),
            Arc::new(EvmAdapter::native(node.clone(), directory.clone())),
            Arc::new(EvmAdapter::token(node.clone(), directory.clone())),
            Arc::new(SolanaAdapter::new(node.clone(), directory.clone())),
            Arc::new(TronAdapter::new(node, directory.clone())),
        ];
        Ok(Self {
            directory,
            adapters: adapters.into_iter().map(|a| (a.family(), a)).collect(),
            capabilities: SigningCapabilities::detect(),
            balances: None,
        })
    }

    pub fn with_capabilities(mut self, capabilities: SigningCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Enables the insufficient-balance check against cached balances.
    pub fn with_balance_cache(mut self, market: Arc<MarketDataAggregator>) -> Self {
        self.balances = Some(market);
        self
    }

    /// Replaces the adapter for its family.
    pub fn with_adapter(mut self, adapter: Arc<dyn ChainAdapter>) -> Self {
        self.adapters.insert(adapter.family(), adapter);
        self
    }

    pub fn capabilities(&self) -> &SigningCapabilities {
        &self.capabilities
    }

    pub fn directory(&self) -> &Arc<ChainDirectory> {
        &self.directory
    }

    fn route(&self, symbol: &str) -> Option<(CoinConfig, Arc<dyn ChainAdapter>)> {
        let coin = self.directory.coin(symbol)?;
        let adapter = self.adapters.get(&coin.family.kind())?.clone();
        Some((coin, adapter))
    }

    pub fn validate_address(&self, symbol: &str, address: &str) -> AddressCheck {
        match self.route(symbol) {
            Some((coin, adapter)) => adapter.validate_address(&coin, address),
            None => AddressCheck::invalid(format!("Unsupported coin: {}", symbol)),
        }
    }

    pub async fn estimate_fee(&self, symbol: &str, amount: Decimal, fee: &FeeLevel) -> FeeEstimate {
        match self.route(symbol) {
            Some((coin, adapter)) => adapter.estimate_fee(&coin, amount, fee).await,
            None => FeeEstimate::new(Decimal::ZERO, symbol.to_ascii_uppercase()),
        }
    }

    /// Checks run in order, all before any network call: coin, recipient
    /// address, amount, signing capability, cached balance.
    pub async fn send(&self, request: SendRequest) -> TxResult {
        let Some((coin, adapter)) = self.route(&request.symbol) else {
            return TxResult::fail(TxErrorKind::UnsupportedCoin, format!("Sending {} not supported", request.symbol));
        };

        let check = adapter.validate_address(&coin, &request.to);
        if !check.valid {
            return TxResult::fail(TxErrorKind::InvalidAddress, format!("Invalid address: {}", check.reason));
        }
        if request.amount <= Decimal::ZERO {
            return TxResult::fail(TxErrorKind::InvalidAmount, format!("Invalid amount: {}", request.amount));
        }

        let needed = adapter.required_capability();
        if !self.capabilities.has(needed) {
            return TxResult::fail(
                TxErrorKind::MissingCapability,
                format!("Missing signing capability: {}", needed.name()),
            );
        }

        if let Some(market) = &self.balances {
            if let Some(balance) = market.cached_balance(&coin.symbol, &request.from_address) {
                if request.amount > balance {
                    return TxResult::fail(
                        TxErrorKind::InsufficientBalance,
                        format!("Insufficient {}: balance {}, sending {}", coin.symbol, balance, request.amount),
                    );
                }
            }
        }

        info!(symbol = %coin.symbol, to = %request.to.trim(), amount = %request.amount, "sending");
        let result = adapter.send(&coin, &request).await;
        match &result.tx_hash {
            Some(hash) if result.success => {
                let url = self.directory.explorer_tx_url(&coin, hash);
                result.with_explorer_url(url)
            }
            _ => {
                warn!(symbol = %coin.symbol, kind = ?result.error_kind, error = ?result.error, "send failed");
                result
            }
        }
    }

    /// Runs `send` on the runtime so an interactive caller is not blocked.
    pub fn send_in_background(self: &Arc<Self>, request: SendRequest) -> JoinHandle<TxResult> {
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.send(request).await })
    }
}
