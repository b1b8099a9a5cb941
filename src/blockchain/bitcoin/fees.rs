//! sat/vbyte oracles for the UTXO chains.
//!
//! BTC reads mempool.space `fees/recommended`; the others read the
//! BlockCypher chain summary (`*_fee_per_kb`). Both fall back to the
//! per-chain table in [`UtxoChain::fallback_sat_per_vbyte`].

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::debug;

use crate::blockchain::directory::ChainDirectory;
use crate::blockchain::traits::FeeLevel;
use crate::core::coins::UtxoChain;
use crate::network::node_manager::NodeManager;

/// Virtual size assumed for a typical one-input, two-output spend.
pub const ASSUMED_VBYTES: u64 = 250;

/// Where a rate came from; the display string differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateSource {
    Oracle,
    Fallback,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeRate {
    pub sat_per_vbyte: u64,
    pub source: RateSource,
}

impl FeeRate {
    pub fn total_sats(&self) -> u64 {
        self.sat_per_vbyte.saturating_mul(ASSUMED_VBYTES)
    }
}

fn tier_index(level: &FeeLevel) -> usize {
    match level {
        FeeLevel::Low => 0,
        FeeLevel::High => 2,
        FeeLevel::Medium | FeeLevel::Custom(_) => 1,
    }
}

/// Per-KB satoshi figures to sat/vbyte, rounded up, at least 1.
fn per_kb_to_per_vbyte(per_kb: u64) -> u64 {
    per_kb.div_ceil(1000).max(1)
}

fn oracle_rate(chain: UtxoChain, body: &Value, level: &FeeLevel) -> Option<u64> {
    match chain {
        UtxoChain::Bitcoin => {
            let key = ["economyFee", "halfHourFee", "fastestFee"][tier_index(level)];
            body.get(key).and_then(Value::as_u64).map(|v| v.max(1))
        }
        _ => {
            let key = ["low_fee_per_kb", "medium_fee_per_kb", "high_fee_per_kb"][tier_index(level)];
            body.get(key).and_then(Value::as_u64).map(per_kb_to_per_vbyte)
        }
    }
}

/// Whole sat/vbyte from a user rate. Fractions below one count as one;
/// rates whose total fee would not fit in a `u64` are refused.
pub fn custom_sat_per_vbyte(rate: Decimal) -> Option<u64> {
    if rate <= Decimal::ZERO {
        return None;
    }
    let sat = rate.trunc().to_u64()?.max(1);
    sat.checked_mul(ASSUMED_VBYTES).map(|_| sat)
}

/// `None` only for an unusable custom rate; oracle failures use the table.
pub async fn fee_rate(
    node: &NodeManager,
    directory: &ChainDirectory,
    chain: UtxoChain,
    symbol: &str,
    level: &FeeLevel,
) -> Option<FeeRate> {
    if let FeeLevel::Custom(rate) = level {
        return custom_sat_per_vbyte(*rate).map(|sat_per_vbyte| FeeRate { sat_per_vbyte, source: RateSource::Custom });
    }

    let url = match chain {
        UtxoChain::Bitcoin => format!("{}/v1/fees/recommended", directory.mempool_api()),
        _ => directory.blockcypher_api(chain, symbol),
    };
    match node.get_json(&url, &[]).await {
        Ok(body) => {
            if let Some(sat_per_vbyte) = oracle_rate(chain, &body, level) {
                return Some(FeeRate { sat_per_vbyte, source: RateSource::Oracle });
            }
            debug!(%symbol, "fee oracle response missing tier field");
        }
        Err(e) => debug!(%symbol, error = %e, "fee oracle unavailable"),
    }
    Some(FeeRate { sat_per_vbyte: chain.fallback_sat_per_vbyte()[tier_index(level)], source: RateSource::Fallback })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mempool_tiers() {
        let body = json!({"fastestFee": 42, "halfHourFee": 21, "hourFee": 12, "economyFee": 0});
        assert_eq!(oracle_rate(UtxoChain::Bitcoin, &body, &FeeLevel::High), Some(42));
        assert_eq!(oracle_rate(UtxoChain::Bitcoin, &body, &FeeLevel::Medium), Some(21));
        assert_eq!(oracle_rate(UtxoChain::Bitcoin, &body, &FeeLevel::Low), Some(1));
    }

    #[test]
    fn blockcypher_per_kb_rounds_up() {
        let body = json!({"low_fee_per_kb": 10_001, "medium_fee_per_kb": 20_000, "high_fee_per_kb": 500});
        assert_eq!(oracle_rate(UtxoChain::Litecoin, &body, &FeeLevel::Low), Some(11));
        assert_eq!(oracle_rate(UtxoChain::Litecoin, &body, &FeeLevel::Medium), Some(20));
        assert_eq!(oracle_rate(UtxoChain::Litecoin, &body, &FeeLevel::High), Some(1));
    }

    #[test]
    fn custom_rates_are_whole_and_bounded() {
        assert_eq!(custom_sat_per_vbyte(Decimal::new(125, 1)), Some(12));
        assert_eq!(custom_sat_per_vbyte(Decimal::new(5, 1)), Some(1));
        assert_eq!(custom_sat_per_vbyte(Decimal::from(u64::MAX / ASSUMED_VBYTES)), Some(u64::MAX / ASSUMED_VBYTES));
        assert_eq!(custom_sat_per_vbyte(Decimal::from(u64::MAX / ASSUMED_VBYTES + 1)), None);
        assert_eq!(custom_sat_per_vbyte(Decimal::MAX), None);
        assert_eq!(custom_sat_per_vbyte(Decimal::from(-3)), None);
    }

    #[test]
    fn total_uses_assumed_size() {
        let rate = FeeRate { sat_per_vbyte: 10, source: RateSource::Oracle };
        assert_eq!(rate.total_sats(), 2_500);
    }
}
