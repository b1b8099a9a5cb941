//! Coin registry
//!
//! The base set is immutable and process-wide. User-added coins live in a
//! [`CoinRegistry`] overlay owned by a single `WalletManager`.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::config::{CustomCoin, CustomCoinKind};
use crate::core::errors::{Result, WalletError};

/// Address format tag. The BIP tags double as the derivation purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AddressFormat {
    #[serde(rename = "BIP44")]
    Bip44,
    #[serde(rename = "BIP49")]
    Bip49,
    #[serde(rename = "BIP84")]
    Bip84,
    #[serde(rename = "BIP86")]
    Bip86,
    /// The only format of an account-model coin (purpose 44).
    #[serde(rename = "SINGLE")]
    Single,
}

impl AddressFormat {
    pub fn purpose(self) -> u32 {
        match self {
            AddressFormat::Bip44 | AddressFormat::Single => 44,
            AddressFormat::Bip49 => 49,
            AddressFormat::Bip84 => 84,
            AddressFormat::Bip86 => 86,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AddressFormat::Bip44 => "BIP44",
            AddressFormat::Bip49 => "BIP49",
            AddressFormat::Bip84 => "BIP84",
            AddressFormat::Bip86 => "BIP86",
            AddressFormat::Single => "SINGLE",
        }
    }
}

impl fmt::Display for AddressFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AddressFormat {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BIP44" => Ok(AddressFormat::Bip44),
            "BIP49" => Ok(AddressFormat::Bip49),
            "BIP84" => Ok(AddressFormat::Bip84),
            "BIP86" => Ok(AddressFormat::Bip86),
            "SINGLE" => Ok(AddressFormat::Single),
            other => Err(WalletError::ValidationError(format!("Unknown address format: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Curve {
    Secp256k1,
    Ed25519,
}

/// UTXO chains differ only in encodings and providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UtxoChain {
    Bitcoin,
    Litecoin,
    Dogecoin,
    BitcoinCash,
}

impl UtxoChain {
    /// Path segment used by BlockCypher-style builders.
    pub fn blockcypher_chain(self) -> &'static str {
        match self {
            UtxoChain::Bitcoin => "btc",
            UtxoChain::Litecoin => "ltc",
            UtxoChain::Dogecoin => "doge",
            UtxoChain::BitcoinCash => "bch",
        }
    }

    /// Fallback sat/vbyte for (low, medium, high) when no oracle answers.
    pub fn fallback_sat_per_vbyte(self) -> [u64; 3] {
        match self {
            UtxoChain::Bitcoin => [3, 10, 30],
            UtxoChain::Litecoin => [20, 40, 200],
            UtxoChain::Dogecoin => [200_000, 400_000, 1_200_000],
            UtxoChain::BitcoinCash => [4, 4, 4],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChainFamily {
    Utxo(UtxoChain),
    EvmNative { chain_id: Option<u64> },
    EvmToken { contract: String, parent: String },
    Solana,
    Tron,
}

/// Adapter selector; one [`ChainAdapter`](crate::blockchain::traits::ChainAdapter) per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FamilyKind {
    Utxo,
    EvmNative,
    EvmToken,
    Solana,
    Tron,
}

impl ChainFamily {
    pub fn kind(&self) -> FamilyKind {
        match self {
            ChainFamily::Utxo(_) => FamilyKind::Utxo,
            ChainFamily::EvmNative { .. } => FamilyKind::EvmNative,
            ChainFamily::EvmToken { .. } => FamilyKind::EvmToken,
            ChainFamily::Solana => FamilyKind::Solana,
            ChainFamily::Tron => FamilyKind::Tron,
        }
    }

    pub fn is_evm(&self) -> bool {
        matches!(self, ChainFamily::EvmNative { .. } | ChainFamily::EvmToken { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Derivation {
    /// The coin owns keys under `coin_type`.
    Own {
        coin_type: u32,
        curve: Curve,
        formats: Vec<AddressFormat>,
        default_format: AddressFormat,
    },
    /// Copies the SINGLE record of another coin (always ETH today).
    SharesWith(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoinConfig {
    pub symbol: String,
    pub name: String,
    pub decimals: u32,
    pub family: ChainFamily,
    pub derivation: Derivation,
    pub coingecko_id: Option<String>,
    pub coincap_id: Option<String>,
    /// RPC for custom EVM chains; built-ins resolve theirs from `Endpoints`.
    pub rpc: Option<String>,
    /// Transaction URL prefix, hash appended.
    pub explorer_tx: String,
    pub is_custom: bool,
}

impl CoinConfig {
    pub fn formats(&self) -> Vec<AddressFormat> {
        match &self.derivation {
            Derivation::Own { formats, .. } => formats.clone(),
            Derivation::SharesWith(_) => vec![AddressFormat::Single],
        }
    }

    pub fn default_format(&self) -> AddressFormat {
        match &self.derivation {
            Derivation::Own { default_format, .. } => *default_format,
            Derivation::SharesWith(_) => AddressFormat::Single,
        }
    }

    pub fn shares_with(&self) -> Option<&str> {
        match &self.derivation {
            Derivation::SharesWith(s) => Some(s.as_str()),
            Derivation::Own { .. } => None,
        }
    }

    pub fn explorer_tx_url(&self, tx_hash: &str) -> String {
        format!("{}{}", self.explorer_tx, tx_hash)
    }
}

fn own(coin_type: u32, curve: Curve, formats: &[AddressFormat], default_format: AddressFormat) -> Derivation {
    Derivation::Own { coin_type, curve, formats: formats.to_vec(), default_format }
}

fn coin(
    symbol: &str,
    name: &str,
    decimals: u32,
    family: ChainFamily,
    derivation: Derivation,
    ids: (&str, &str),
    explorer_tx: &str,
) -> CoinConfig {
    CoinConfig {
        symbol: symbol.to_string(),
        name: name.to_string(),
        decimals,
        family,
        derivation,
        coingecko_id: Some(ids.0.to_string()),
        coincap_id: Some(ids.1.to_string()),
        rpc: None,
        explorer_tx: explorer_tx.to_string(),
        is_custom: false,
    }
}

pub const USDT_CONTRACT: &str = "0xdAC17F958D2ee523a2206206994597C13D831ec7";
pub const USDC_CONTRACT: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";

static BASE_COINS: Lazy<Vec<CoinConfig>> = Lazy::new(|| {
    use AddressFormat::*;
    let eth = || Derivation::SharesWith("ETH".to_string());
    vec![
        coin("BTC", "Bitcoin", 8, ChainFamily::Utxo(UtxoChain::Bitcoin),
            own(0, Curve::Secp256k1, &[Bip44, Bip49, Bip84, Bip86], Bip84),
            ("bitcoin", "bitcoin"), "https://mempool.space/tx/"),
        coin("ETH", "Ethereum", 18, ChainFamily::EvmNative { chain_id: Some(1) },
            own(60, Curve::Secp256k1, &[Single], Single),
            ("ethereum", "ethereum"), "https://etherscan.io/tx/"),
        coin("BNB", "BNB Smart Chain", 18, ChainFamily::EvmNative { chain_id: Some(56) }, eth(),
            ("binancecoin", "binance-coin"), "https://bscscan.com/tx/"),
        coin("MATIC", "Polygon", 18, ChainFamily::EvmNative { chain_id: Some(137) }, eth(),
            ("matic-network", "polygon"), "https://polygonscan.com/tx/"),
        coin("SOL", "Solana", 9, ChainFamily::Solana,
            own(501, Curve::Ed25519, &[Single], Single),
            ("solana", "solana"), "https://solscan.io/tx/"),
        coin("TRX", "Tron", 6, ChainFamily::Tron,
            own(195, Curve::Secp256k1, &[Single], Single),
            ("tron", "tron"), "https://tronscan.org/#/transaction/"),
        coin("LTC", "Litecoin", 8, ChainFamily::Utxo(UtxoChain::Litecoin),
            own(2, Curve::Secp256k1, &[Bip44, Bip49, Bip84], Bip84),
            ("litecoin", "litecoin"), "https://blockchair.com/litecoin/transaction/"),
        coin("DOGE", "Dogecoin", 8, ChainFamily::Utxo(UtxoChain::Dogecoin),
            own(3, Curve::Secp256k1, &[Bip44], Bip44),
            ("dogecoin", "dogecoin"), "https://blockchair.com/dogecoin/transaction/"),
        coin("BCH", "Bitcoin Cash", 8, ChainFamily::Utxo(UtxoChain::BitcoinCash),
            own(145, Curve::Secp256k1, &[Bip44], Bip44),
            ("bitcoin-cash", "bitcoin-cash"), "https://blockchair.com/bitcoin-cash/transaction/"),
        coin("USDT", "Tether USD", 6,
            ChainFamily::EvmToken { contract: USDT_CONTRACT.to_string(), parent: "ETH".to_string() }, eth(),
            ("tether", "tether"), "https://etherscan.io/tx/"),
        coin("USDC", "USD Coin", 6,
            ChainFamily::EvmToken { contract: USDC_CONTRACT.to_string(), parent: "ETH".to_string() }, eth(),
            ("usd-coin", "usd-coin"), "https://etherscan.io/tx/"),
    ]
});

/// The immutable base registry, in display order.
pub fn base_coins() -> &'static [CoinConfig] {
    &BASE_COINS
}

/// Base registry plus a per-instance overlay of custom coins.
#[derive(Debug, Clone, Default)]
pub struct CoinRegistry {
    custom: Vec<CoinConfig>,
}

impl CoinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, symbol: &str) -> Option<&CoinConfig> {
        let symbol = symbol.trim();
        BASE_COINS
            .iter()
            .chain(self.custom.iter())
            .find(|c| c.symbol.eq_ignore_ascii_case(symbol))
    }

    /// All symbols: base order first, then custom coins in insertion order.
    pub fn symbols(&self) -> Vec<String> {
        BASE_COINS.iter().chain(self.custom.iter()).map(|c| c.symbol.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CoinConfig> {
        BASE_COINS.iter().chain(self.custom.iter())
    }

    pub fn custom_coins(&self) -> &[CoinConfig] {
        &self.custom
    }

    /// Register a custom coin. Re-adding a custom symbol replaces it in place.
    pub fn add_custom(&mut self, spec: &CustomCoin) -> Result<CoinConfig> {
        let symbol = spec.symbol.trim().to_ascii_uppercase();
        if symbol.is_empty() || !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(WalletError::ValidationError(format!("Invalid coin symbol: {:?}", spec.symbol)));
        }
        if BASE_COINS.iter().any(|c| c.symbol == symbol) {
            return Err(WalletError::ValidationError(format!("{} is a built-in coin", symbol)));
        }

        let (family, rpc) = match &spec.kind {
            CustomCoinKind::Evm { rpc, chain_id } => {
                if rpc.trim().is_empty() {
                    return Err(WalletError::ValidationError("Custom EVM coin needs an RPC URL".into()));
                }
                (ChainFamily::EvmNative { chain_id: *chain_id }, Some(rpc.trim().to_string()))
            }
            CustomCoinKind::Token { contract, parent } => {
                crate::core::validation::validate_ethereum_address(contract)?;
                let parent = parent.trim().to_ascii_uppercase();
                match self.get(&parent).map(|c| &c.family) {
                    Some(ChainFamily::EvmNative { .. }) => {}
                    _ => {
                        return Err(WalletError::ValidationError(format!(
                            "Token parent {} is not an EVM chain",
                            parent
                        )))
                    }
                }
                (ChainFamily::EvmToken { contract: contract.clone(), parent }, None)
            }
        };

        let explorer_tx = spec
            .explorer
            .as_deref()
            .map(|e| format!("{}/tx/", e.trim_end_matches('/')))
            .unwrap_or_else(|| "https://etherscan.io/tx/".to_string());

        let config = CoinConfig {
            symbol: symbol.clone(),
            name: spec.name.clone(),
            decimals: spec.decimals,
            family,
            derivation: Derivation::SharesWith("ETH".to_string()),
            coingecko_id: spec.coingecko_id.clone(),
            coincap_id: None,
            rpc,
            explorer_tx,
            is_custom: true,
        };

        match self.custom.iter_mut().find(|c| c.symbol == symbol) {
            Some(slot) => *slot = config.clone(),
            None => self.custom.push(config.clone()),
        }
        Ok(config)
    }

    pub fn remove_custom(&mut self, symbol: &str) -> bool {
        let before = self.custom.len();
        self.custom.retain(|c| !c.symbol.eq_ignore_ascii_case(symbol.trim()));
        before != self.custom.len()
    }
}
