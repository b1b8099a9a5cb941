//! Market data: prices, 24h changes and balances.

pub mod aggregator;
pub mod balances;
pub mod cache;
pub mod prices;

pub use aggregator::MarketDataAggregator;
