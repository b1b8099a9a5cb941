use futures::future::join_all;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::balances::fetch_balance;
use super::cache::TtlCache;
use super::prices::{coincap_single, coingecko_batch, Quote};
use crate::blockchain::directory::ChainDirectory;
use crate::core::config::NetworkConfig;
use crate::core::errors::Result;
use crate::network::node_manager::NodeManager;

pub const PRICE_TTL: Duration = Duration::from_secs(120);
pub const BALANCE_TTL: Duration = Duration::from_secs(30);
pub const CHANGE_TTL: Duration = Duration::from_secs(120);
/// Expired balances older than this are dropped rather than served stale.
pub const BALANCE_STALE_LIMIT: Duration = Duration::from_secs(600);

/// Prices, 24h changes and balances behind TTL caches, with per-provider
/// fallback chains. Network failures degrade to `None`, never to errors.
pub struct MarketDataAggregator {
    node: NodeManager,
    directory: Arc<ChainDirectory>,
    vs_currency: Mutex<String>,
    join_deadline: Duration,
    prices: TtlCache<String, Decimal>,
    changes: TtlCache<String, Decimal>,
    balances: TtlCache<(String, String), Decimal>,
}

impl MarketDataAggregator {
    pub fn new(directory: Arc<ChainDirectory>, network: &NetworkConfig) -> Result<Self> {
        Ok(Self {
            node: NodeManager::new(Duration::from_secs(network.market_timeout_secs))?,
            directory,
            vs_currency: Mutex::new("usd".to_string()),
            join_deadline: Duration::from_secs(network.balance_join_deadline_secs),
            prices: TtlCache::new(PRICE_TTL),
            changes: TtlCache::new(CHANGE_TTL),
            balances: TtlCache::new(BALANCE_TTL),
        })
    }

    /// Quote currency for CoinGecko (`usd`, `eur`, ...). Clears cached prices.
    pub fn set_currency(&self, currency: &str) {
        let currency = currency.trim().to_ascii_lowercase();
        let mut current = self.vs_currency.lock();
        if *current != currency {
            *current = currency;
            self.prices.clear();
            self.changes.clear();
        }
    }

    fn remember(&self, quote: &Quote) {
        self.prices.insert(quote.symbol.clone(), quote.price);
        if let Some(change) = quote.change_24h {
            self.changes.insert(quote.symbol.clone(), change);
        }
    }

    /// Cached prices first; misses go to CoinGecko in one batch, then
    /// CoinCap one symbol at a time. Symbols nobody prices are absent.
    pub async fn get_prices(&self, symbols: &[String]) -> HashMap<String, Decimal> {
        let mut out = HashMap::new();
        let mut missing = Vec::new();
        for symbol in symbols {
            let symbol = symbol.trim().to_ascii_uppercase();
            match self.prices.get(&symbol) {
                Some(price) => {
                    out.insert(symbol, price);
                }
                None if !missing.contains(&symbol) => missing.push(symbol),
                None => {}
            }
        }
        if missing.is_empty() {
            return out;
        }

        let vs = self.vs_currency.lock().clone();
        let gecko_ids: Vec<(String, String)> = missing
            .iter()
            .filter_map(|s| Some((s.clone(), self.directory.coin(s)?.coingecko_id?)))
            .collect();
        for quote in coingecko_batch(&self.node, &self.directory.endpoints().coingecko, &gecko_ids, &vs).await {
            self.remember(&quote);
            out.insert(quote.symbol.clone(), quote.price);
        }

        if vs == "usd" {
            for symbol in missing.iter() {
                if out.contains_key(symbol) {
                    continue;
                }
                let Some(coincap_id) = self.directory.coin(symbol).and_then(|c| c.coincap_id) else {
                    continue;
                };
                if let Some(quote) =
                    coincap_single(&self.node, &self.directory.endpoints().coincap, symbol, &coincap_id).await
                {
                    self.remember(&quote);
                    out.insert(quote.symbol.clone(), quote.price);
                }
            }
        }
        let unpriced = missing.iter().filter(|s| !out.contains_key(*s)).count();
        if unpriced > 0 {
            debug!(unpriced, "some symbols have no price");
        }
        out
    }

    /// 24h change in percent, from the last successful price lookup.
    pub fn get_24h_change(&self, symbol: &str) -> Option<Decimal> {
        self.changes.get(&symbol.trim().to_ascii_uppercase())
    }

    pub async fn get_balance(&self, symbol: &str, address: &str) -> Option<Decimal> {
        let address = address.trim();
        if address.is_empty() {
            return None;
        }
        let symbol = symbol.trim().to_ascii_uppercase();
        let key = (symbol.clone(), address.to_string());
        if let Some(balance) = self.balances.get(&key) {
            return Some(balance);
        }
        let coin = self.directory.coin(&symbol)?;
        let balance = fetch_balance(&self.node, &self.directory, &coin, address).await;
        match balance {
            Some(value) => self.balances.insert(key, value),
            None => debug!(%symbol, "balance unknown"),
        }
        balance
    }

    /// Last known balance even if expired. Never touches the network.
    pub fn cached_balance(&self, symbol: &str, address: &str) -> Option<Decimal> {
        self.balances.get_stale(&(symbol.trim().to_ascii_uppercase(), address.trim().to_string()))
    }

    /// One task per symbol, joined with a deadline. Symbols still in flight
    /// when it passes are missing from the result; their tasks are left to
    /// finish and populate the cache.
    pub async fn get_all_balances(self: &Arc<Self>, addresses: HashMap<String, String>) -> HashMap<String, Option<Decimal>> {
        let purged = self.balances.purge_expired(BALANCE_STALE_LIMIT);
        if purged > 0 {
            debug!(purged, "dropped long-expired balances");
        }
        let results: Arc<Mutex<HashMap<String, Option<Decimal>>>> = Arc::new(Mutex::new(HashMap::new()));
        let handles: Vec<_> = addresses
            .into_iter()
            .map(|(symbol, address)| {
                let this = Arc::clone(self);
                let results = Arc::clone(&results);
                tokio::spawn(async move {
                    let balance = this.get_balance(&symbol, &address).await;
                    results.lock().insert(symbol, balance);
                })
            })
            .collect();
        let total = handles.len();

        if tokio::time::timeout(self.join_deadline, join_all(handles)).await.is_err() {
            warn!(total, finished = results.lock().len(), "balance fan-out hit the join deadline");
        }
        let snapshot = results.lock().clone();
        snapshot
    }

    pub fn clear_cache(&self) {
        self.prices.clear();
        self.changes.clear();
        self.balances.clear();
    }

    #[cfg(test)]
    pub(crate) fn with_join_deadline(mut self, deadline: Duration) -> Self {
        self.join_deadline = deadline;
        self
    }

    #[cfg(test)]
    pub(crate) fn seed_balance(&self, symbol: &str, address: &str, balance: Decimal) {
        self.balances.insert((symbol.to_string(), address.to_string()), balance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Endpoints;
    use httpmock::prelude::*;
    use serde_json::json;

    fn aggregator(server: &MockServer) -> MarketDataAggregator {
        let directory = Arc::new(ChainDirectory::new(Endpoints::under(&server.base_url())));
        MarketDataAggregator::new(directory, &NetworkConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn prices_are_served_from_cache_within_ttl() {
        let server = MockServer::start();
        let gecko = server.mock(|when, then| {
            when.method(GET).path("/coingecko/simple/price").query_param("ids", "bitcoin");
            then.status(200).json_body(json!({"bitcoin": {"usd": 67012.5, "usd_24h_change": 1.25}}));
        });
        let market = aggregator(&server);
        let symbols = vec!["btc".to_string()];

        let first = market.get_prices(&symbols).await;
        let second = market.get_prices(&symbols).await;
        assert_eq!(first.get("BTC"), Some(&Decimal::new(670125, 1)));
        assert_eq!(first, second);
        assert_eq!(market.get_24h_change("BTC"), Some(Decimal::new(125, 2)));
        gecko.assert_hits(1);
    }

    #[tokio::test]
    async fn coincap_fills_in_for_usd_only() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.path("/coingecko/simple/price");
            then.status(429);
        });
        let coincap = server.mock(|when, then| {
            when.method(GET).path("/coincap/assets/solana");
            then.status(200).json_body(json!({"data": {"priceUsd": "150.25", "changePercent24Hr": "-2.5"}}));
        });
        let market = aggregator(&server);
        let prices = market.get_prices(&["SOL".to_string()]).await;
        assert_eq!(prices.get("SOL"), Some(&Decimal::new(15025, 2)));
        assert_eq!(market.get_24h_change("sol"), Some(Decimal::new(-25, 1)));

        market.set_currency("EUR");
        assert!(market.get_prices(&["SOL".to_string()]).await.is_empty());
        coincap.assert_hits(1);
    }

    #[tokio::test]
    async fn tron_without_any_source_reads_zero() {
        let server = MockServer::start();
        let market = aggregator(&server);
        let balance = market.get_balance("TRX", "TJRabPrwbZy45sbavfcjinPJC18kjpRTv8").await;
        assert_eq!(balance, Some(Decimal::ZERO));
        assert_eq!(market.get_balance("TRX", "  ").await, None);
    }

    #[tokio::test]
    async fn fan_out_returns_what_finished_before_the_deadline() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.path("/mempool/address/bc1qfast");
            then.status(200)
                .json_body(json!({"chain_stats": {"funded_txo_sum": 150_000_000u64, "spent_txo_sum": 50_000_000u64}}));
        });
        server.mock(|when, then| {
            when.path("/blockcypher/ltc/main/addrs/ltc1qslow/balance");
            then.status(200).json_body(json!({"balance": 1})).delay(Duration::from_secs(3));
        });
        let market = Arc::new(aggregator(&server).with_join_deadline(Duration::from_millis(500)));

        let addresses = HashMap::from([
            ("BTC".to_string(), "bc1qfast".to_string()),
            ("LTC".to_string(), "ltc1qslow".to_string()),
        ]);
        let balances = market.get_all_balances(addresses).await;
        assert_eq!(balances.get("BTC"), Some(&Some(Decimal::ONE)));
        assert!(!balances.contains_key("LTC"));
        assert_eq!(market.cached_balance("btc", " bc1qfast "), Some(Decimal::ONE));
    }

    #[tokio::test]
    async fn fan_out_keeps_recent_balances_of_other_wallets() {
        let server = MockServer::start();
        let market = Arc::new(aggregator(&server));
        market.seed_balance("ETH", "0xother", Decimal::TWO);

        let balances = market.get_all_balances(HashMap::new()).await;
        assert!(balances.is_empty());
        assert_eq!(market.cached_balance("ETH", "0xother"), Some(Decimal::TWO));
    }
}
