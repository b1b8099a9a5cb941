use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::coins::AddressFormat;
use crate::core::errors::{Result, WalletError};

/// Persisted application configuration (`config.json`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub currency: String,
    pub auto_lock_seconds: u64,
    pub active_wallet: Option<String>,
    pub language: String,
    /// Preferred address format per symbol.
    pub selected_formats: HashMap<String, AddressFormat>,
    pub custom_rpc: HashMap<String, CustomRpc>,
    pub custom_coins: HashMap<String, CustomCoin>,
    pub custom_coins_order: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            auto_lock_seconds: 300,
            active_wallet: None,
            language: "en".to_string(),
            selected_formats: HashMap::new(),
            custom_rpc: HashMap::new(),
            custom_coins: HashMap::new(),
            custom_coins_order: Vec::new(),
        }
    }
}

/// Per-symbol provider override. Empty strings mean "use the default".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomRpc {
    #[serde(default)]
    pub rpc: String,
    #[serde(default)]
    pub explorer: String,
}

/// A user-added coin. Every custom coin shares ETH's address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomCoin {
    pub symbol: String,
    pub name: String,
    #[serde(default = "CustomCoin::default_decimals")]
    pub decimals: u32,
    #[serde(flatten)]
    pub kind: CustomCoinKind,
    #[serde(default)]
    pub coingecko_id: Option<String>,
    #[serde(default)]
    pub explorer: Option<String>,
}

impl CustomCoin {
    fn default_decimals() -> u32 {
        18
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CustomCoinKind {
    /// Native coin of an EVM-compatible chain.
    Evm {
        rpc: String,
        #[serde(default)]
        chain_id: Option<u64>,
    },
    /// ERC-20 token living on `parent` (a registered EVM chain symbol).
    Token { contract: String, parent: String },
}

/// Vault key-derivation parameters. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// PBKDF2 iterations for the payload encryption key
    #[serde(default = "SecurityConfig::default_pbkdf2_iterations")]
    pub pbkdf2_iterations: u32,

    /// PBKDF2 iterations for the standalone password verifier
    #[serde(default = "SecurityConfig::default_verifier_iterations")]
    pub verifier_iterations: u32,
}

impl SecurityConfig {
    fn default_pbkdf2_iterations() -> u32 { 480_000 }
    fn default_verifier_iterations() -> u32 { 100_000 }

    /// Cheap parameters for tests; never use for real wallets.
    pub fn insecure_for_tests() -> Self {
        Self { pbkdf2_iterations: 1_000, verifier_iterations: 500 }
    }

    pub fn validate(&self) -> Result<()> {
        if self.pbkdf2_iterations == 0 || self.verifier_iterations == 0 {
            return Err(WalletError::ConfigError("PBKDF2 iterations must be positive".into()));
        }
        Ok(())
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            pbkdf2_iterations: Self::default_pbkdf2_iterations(),
            verifier_iterations: Self::default_verifier_iterations(),
        }
    }
}

/// Timeouts and provider endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "NetworkConfig::default_market_timeout")]
    pub market_timeout_secs: u64,
    #[serde(default = "NetworkConfig::default_tx_timeout")]
    pub tx_timeout_secs: u64,
    #[serde(default = "NetworkConfig::default_join_deadline")]
    pub balance_join_deadline_secs: u64,
    #[serde(default)]
    pub endpoints: Endpoints,
}

impl NetworkConfig {
    fn default_market_timeout() -> u64 { 10 }
    fn default_tx_timeout() -> u64 { 20 }
    fn default_join_deadline() -> u64 { 15 }

    /// Zero timeouts would fail every request, so they are refused up front.
    pub fn validate(&self) -> Result<()> {
        let timeouts = [
            ("market_timeout_secs", self.market_timeout_secs),
            ("tx_timeout_secs", self.tx_timeout_secs),
            ("balance_join_deadline_secs", self.balance_join_deadline_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(WalletError::ConfigError(format!("{} must be positive", name)));
        }
        Ok(())
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            market_timeout_secs: Self::default_market_timeout(),
            tx_timeout_secs: Self::default_tx_timeout(),
            balance_join_deadline_secs: Self::default_join_deadline(),
            endpoints: Endpoints::default(),
        }
    }
}

/// Default provider base URLs. No trailing slash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Endpoints {
    pub coingecko: String,
    pub coincap: String,
    /// mempool.space-compatible explorer API (BTC fees and balances)
    pub mempool: String,
    /// BlockCypher API root; `{root}/{chain}/main/...`
    pub blockcypher: String,
    pub blockchair: String,
    pub eth_explorer: String,
    pub eth_rpc: String,
    pub eth_fallback_rpc: String,
    pub bsc_rpc: String,
    pub polygon_rpc: String,
    pub solana_rpc: String,
    pub trongrid: String,
    pub tronscan: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            coingecko: "https://api.coingecko.com/api/v3".to_string(),
            coincap: "https://api.coincap.io/v2".to_string(),
            mempool: "https://mempool.space/api".to_string(),
            blockcypher: "https://api.blockcypher.com/v1".to_string(),
            blockchair: "https://api.blockchair.com".to_string(),
            eth_explorer: "https://eth.blockscout.com/api/v2".to_string(),
            eth_rpc: "https://eth.llamarpc.com".to_string(),
            eth_fallback_rpc: "https://cloudflare-eth.com".to_string(),
            bsc_rpc: "https://bsc-dataseed.binance.org".to_string(),
            polygon_rpc: "https://polygon-rpc.com".to_string(),
            solana_rpc: "https://api.mainnet-beta.solana.com".to_string(),
            trongrid: "https://api.trongrid.io".to_string(),
            tronscan: "https://apilist.tronscanapi.com/api".to_string(),
        }
    }
}

impl Endpoints {
    /// Every provider mounted under a distinct prefix of one base URL.
    pub fn under(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        let at = |p: &str| format!("{}/{}", base, p);
        Self {
            coingecko: at("coingecko"),
            coincap: at("coincap"),
            mempool: at("mempool"),
            blockcypher: at("blockcypher"),
            blockchair: at("blockchair"),
            eth_explorer: at("blockscout"),
            eth_rpc: at("eth"),
            eth_fallback_rpc: at("eth-fallback"),
            bsc_rpc: at("bsc"),
            polygon_rpc: at("polygon"),
            solana_rpc: at("solana"),
            trongrid: at("trongrid"),
            tronscan: at("tronscan"),
        }
    }
}
