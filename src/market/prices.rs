//! Spot prices: one CoinGecko batch, then CoinCap per missing symbol.

use rust_decimal::Decimal;
use tracing::debug;

use super::balances::json_decimal;
use crate::network::node_manager::NodeManager;

#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub price: Decimal,
    /// 24h change in percent.
    pub change_24h: Option<Decimal>,
}

/// `symbols` pairs a ticker with its CoinGecko id.
pub async fn coingecko_batch(
    node: &NodeManager,
    base: &str,
    symbols: &[(String, String)],
    vs_currency: &str,
) -> Vec<Quote> {
    if symbols.is_empty() {
        return Vec::new();
    }
    let ids = symbols.iter().map(|(_, id)| id.as_str()).collect::<Vec<_>>().join(",");
    let url = format!("{}/simple/price", base);
    let query = [("ids", ids.as_str()), ("vs_currencies", vs_currency), ("include_24hr_change", "true")];
    let body = match node.get_json(&url, &query).await {
        Ok(body) => body,
        Err(e) => {
            debug!(error = %e, "CoinGecko batch failed");
            return Vec::new();
        }
    };
    let change_key = format!("{}_24h_change", vs_currency);
    symbols
        .iter()
        .filter_map(|(symbol, id)| {
            let entry = body.get(id)?;
            let price = entry.get(vs_currency).and_then(json_decimal).filter(|p| !p.is_zero())?;
            Some(Quote {
                symbol: symbol.clone(),
                price,
                change_24h: entry.get(&change_key).and_then(json_decimal),
            })
        })
        .collect()
}

/// CoinCap quotes USD only.
pub async fn coincap_single(node: &NodeManager, base: &str, symbol: &str, coincap_id: &str) -> Option<Quote> {
    let body = match node.get_json(&format!("{}/assets/{}", base, coincap_id), &[]).await {
        Ok(body) => body,
        Err(e) => {
            debug!(%symbol, error = %e, "CoinCap lookup failed");
            return None;
        }
    };
    let data = body.get("data")?;
    let price = data.get("priceUsd").and_then(json_decimal).filter(|p| *p > Decimal::ZERO)?;
    Some(Quote {
        symbol: symbol.to_string(),
        price,
        change_24h: data.get("changePercent24Hr").and_then(json_decimal).or(Some(Decimal::ZERO)),
    })
}
