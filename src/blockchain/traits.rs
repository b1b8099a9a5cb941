use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

use crate::core::coins::{CoinConfig, FamilyKind};
use crate::core::errors::WalletError;
use crate::core::validation::validate_for_family;
use crate::network::node_manager::RpcError;

/// Fee speed selector or an explicit per-family number
/// (Gwei for EVM, sat/vbyte for UTXO).
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FeeLevel {
    Low,
    #[default]
    Medium,
    High,
    Custom(Decimal),
}

impl FeeLevel {
    /// Gas-price multiplier as a rational (low 0.8, medium 1.0, high 1.5).
    pub fn multiplier(&self) -> (u128, u128) {
        match self {
            FeeLevel::Low => (4, 5),
            FeeLevel::Medium | FeeLevel::Custom(_) => (1, 1),
            FeeLevel::High => (3, 2),
        }
    }

    pub fn tier_name(&self) -> &'static str {
        match self {
            FeeLevel::Low => "low",
            FeeLevel::Medium | FeeLevel::Custom(_) => "medium",
            FeeLevel::High => "high",
        }
    }
}

impl FromStr for FeeLevel {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "slow" => Ok(FeeLevel::Low),
            "medium" | "normal" | "" => Ok(FeeLevel::Medium),
            "high" | "fast" => Ok(FeeLevel::High),
            other => match Decimal::from_str(other) {
                Ok(v) if v > Decimal::ZERO => Ok(FeeLevel::Custom(v)),
                _ => Err(WalletError::ValidationError(format!("Invalid fee level: {}", s))),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeeEstimate {
    pub value: Decimal,
    pub unit: String,
}

impl FeeEstimate {
    pub fn new(value: Decimal, unit: impl Into<String>) -> Self {
        Self { value, unit: unit.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressCheck {
    pub valid: bool,
    pub reason: String,
}

impl AddressCheck {
    pub fn valid() -> Self {
        Self { valid: true, reason: "Valid address".to_string() }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self { valid: false, reason: reason.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxErrorKind {
    InvalidAddress,
    /// Zero, negative or unrepresentable in base units.
    InvalidAmount,
    /// The private key could not be parsed for this family.
    InvalidKey,
    InsufficientBalance,
    MissingCapability,
    NetworkError,
    ProviderRejected,
    UnsupportedCoin,
}

/// Uniform outcome of `send`. Failures are values, never panics or errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxResult {
    pub success: bool,
    pub tx_hash: Option<String>,
    pub fee: Decimal,
    pub error: Option<String>,
    pub error_kind: Option<TxErrorKind>,
    pub explorer_url: Option<String>,
}

impl TxResult {
    pub fn ok(tx_hash: impl Into<String>, fee: Decimal) -> Self {
        Self {
            success: true,
            tx_hash: Some(tx_hash.into()),
            fee,
            error: None,
            error_kind: None,
            explorer_url: None,
        }
    }

    pub fn fail(kind: TxErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            tx_hash: None,
            fee: Decimal::ZERO,
            error: Some(message.into()),
            error_kind: Some(kind),
            explorer_url: None,
        }
    }

    /// Explicit refusals are `ProviderRejected`; anything else is a network failure.
    pub fn from_rpc(context: &str, err: &RpcError) -> Self {
        let kind = if err.is_rejection() { TxErrorKind::ProviderRejected } else { TxErrorKind::NetworkError };
        Self::fail(kind, format!("{}: {}", context, err))
    }

    pub fn with_explorer_url(mut self, url: impl Into<String>) -> Self {
        self.explorer_url = Some(url.into());
        self
    }
}

/// Everything an adapter needs to move funds.
#[derive(Clone)]
pub struct SendRequest {
    pub symbol: String,
    pub private_key: Zeroizing<String>,
    pub to: String,
    pub amount: Decimal,
    pub fee: FeeLevel,
    pub from_address: String,
}

impl fmt::Debug for SendRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendRequest")
            .field("symbol", &self.symbol)
            .field("to", &self.to)
            .field("amount", &self.amount)
            .field("fee", &self.fee)
            .field("from_address", &self.from_address)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Secp256k1Ecdsa,
    Ed25519,
}

impl Capability {
    pub fn name(self) -> &'static str {
        match self {
            Capability::Secp256k1Ecdsa => "secp256k1-ecdsa",
            Capability::Ed25519 => "ed25519",
        }
    }
}

/// Signing capabilities available to the engine, decided once at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningCapabilities(HashSet<Capability>);

impl SigningCapabilities {
    /// Both curves are linked in statically; a self-test guards against a
    /// broken build rather than a missing library.
    pub fn detect() -> Self {
        let mut caps = HashSet::new();
        if crate::blockchain::signing::secp256k1_self_test() {
            caps.insert(Capability::Secp256k1Ecdsa);
        }
        if crate::blockchain::signing::ed25519_self_test() {
            caps.insert(Capability::Ed25519);
        }
        Self(caps)
    }

    pub fn none() -> Self {
        Self(HashSet::new())
    }

    pub fn only(caps: &[Capability]) -> Self {
        Self(caps.iter().copied().collect())
    }

    pub fn has(&self, cap: Capability) -> bool {
        self.0.contains(&cap)
    }
}

/// One implementation per chain family.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn family(&self) -> FamilyKind;

    /// The signing capability `send` depends on.
    fn required_capability(&self) -> Capability;

    fn validate_address(&self, coin: &CoinConfig, address: &str) -> AddressCheck {
        match validate_for_family(&coin.family, address) {
            Ok(()) => AddressCheck::valid(),
            Err(WalletError::ValidationError(reason)) => AddressCheck::invalid(reason),
            Err(other) => AddressCheck::invalid(other.to_string()),
        }
    }

    async fn estimate_fee(&self, coin: &CoinConfig, amount: Decimal, fee: &FeeLevel) -> FeeEstimate;

    /// Build, sign and broadcast. Address and capability checks have already passed.
    async fn send(&self, coin: &CoinConfig, request: &SendRequest) -> TxResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_level_parsing() {
        assert_eq!("HIGH".parse::<FeeLevel>().unwrap(), FeeLevel::High);
        assert_eq!("25".parse::<FeeLevel>().unwrap(), FeeLevel::Custom(Decimal::from(25)));
        assert!("-1".parse::<FeeLevel>().is_err());
        assert!("turbo".parse::<FeeLevel>().is_err());
    }

    #[test]
    fn tx_result_constructors() {
        let ok = TxResult::ok("0xabc", Decimal::new(21, 6));
        assert!(ok.success && ok.error_kind.is_none());
        let fail = TxResult::fail(TxErrorKind::NetworkError, "timeout");
        assert!(!fail.success);
        assert_eq!(fail.error.as_deref(), Some("timeout"));

        let rejected = TxResult::from_rpc("Broadcast", &RpcError::Rpc { code: -32000, message: "nonce too low".into() });
        assert_eq!(rejected.error_kind, Some(TxErrorKind::ProviderRejected));
        assert_eq!(rejected.error.as_deref(), Some("Broadcast: rpc error -32000: nonce too low"));
        let timeout = TxResult::from_rpc("Broadcast", &RpcError::Timeout);
        assert_eq!(timeout.error_kind, Some(TxErrorKind::NetworkError));
    }

    #[test]
    fn send_request_debug_hides_key() {
        let req = SendRequest {
            symbol: "ETH".into(),
            private_key: Zeroizing::new("0xdeadbeef".into()),
            to: "0x0".into(),
            amount: Decimal::ONE,
            fee: FeeLevel::Medium,
            from_address: "0x1".into(),
        };
        assert!(!format!("{:?}", req).contains("deadbeef"));
    }

    #[test]
    fn capabilities_detected() {
        let caps = SigningCapabilities::detect();
        assert!(caps.has(Capability::Secp256k1Ecdsa));
        assert!(caps.has(Capability::Ed25519));
        assert!(!SigningCapabilities::none().has(Capability::Ed25519));
    }
}
