use crate::cache::{DEFAULT_TTL, TtlCache};
use crate::market_data::{PriceSeriesSource, fetch_or_empty};
use crate::security_types::{AssetType, classify, known_volatility};
use crate::stats::{TRADING_DAYS_PER_YEAR, annualized_volatility};
use chrono::{Duration as CalendarDuration, NaiveDate};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Estimates outside this range are treated as data errors and rejected
const PLAUSIBLE_VOLATILITY: std::ops::Range<f64> = 0.01..2.0;

/// Reliability tier attached to every per-asset estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Annualized volatility estimate for one ticker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetVolatility {
    pub volatility: f64,
    pub confidence: Confidence,
    pub source: String,
    pub asset_type: AssetType,
}

/// One link of the estimate chain; declines by returning `None`
pub trait VolatilityStrategy: Send + Sync {
    fn name(&self) -> &str;
    fn estimate(&self, ticker: &str) -> Option<AssetVolatility>;
}

/// Realized volatility of the trailing year of prices
pub struct RealizedVolatility {
    source: Arc<dyn PriceSeriesSource>,
    as_of: NaiveDate,
    lookback_calendar_days: i64,
    min_prices: usize,
    high_confidence_prices: usize,
}

impl RealizedVolatility {
    pub fn new(source: Arc<dyn PriceSeriesSource>, as_of: NaiveDate) -> Self {
        Self {
            source,
            as_of,
            lookback_calendar_days: 365,
            min_prices: 30,
            high_confidence_prices: 200,
        }
    }

    pub fn with_thresholds(mut self, min_prices: usize, high_confidence_prices: usize) -> Self {
        self.min_prices = min_prices;
        self.high_confidence_prices = high_confidence_prices;
        self
    }

    pub fn window(&self) -> (NaiveDate, NaiveDate) {
        (self.as_of - CalendarDuration::days(self.lookback_calendar_days), self.as_of)
    }
}

impl VolatilityStrategy for RealizedVolatility {
    fn name(&self) -> &str {
        "Calculated Realized Volatility"
    }

    fn estimate(&self, ticker: &str) -> Option<AssetVolatility> {
        let (start, end) = self.window();
        let prices = fetch_or_empty(self.source.as_ref(), ticker, start, end);
        if prices.len() <= self.min_prices {
            debug!("{}: {} prices, too few for realized volatility", ticker, prices.len());
            return None;
        }

        let volatility = annualized_volatility(&prices.returns().values(), TRADING_DAYS_PER_YEAR)?;
        if !PLAUSIBLE_VOLATILITY.contains(&volatility) {
            debug!("{}: implausible realized volatility {:.4}", ticker, volatility);
            return None;
        }

        let confidence = if prices.len() > self.high_confidence_prices {
            Confidence::High
        } else {
            Confidence::Medium
        };
        Some(AssetVolatility {
            volatility,
            confidence,
            source: self.name().to_string(),
            asset_type: classify(ticker),
        })
    }
}

/// Reference volatilities of commonly held tickers
pub struct KnownAssetTable;

impl VolatilityStrategy for KnownAssetTable {
    fn name(&self) -> &str {
        "Known Asset + Pattern Classification"
    }

    fn estimate(&self, ticker: &str) -> Option<AssetVolatility> {
        known_volatility(ticker).map(|volatility| AssetVolatility {
            volatility,
            confidence: Confidence::Medium,
            source: self.name().to_string(),
            asset_type: classify(ticker),
        })
    }
}

/// Class-level volatility from the ticker's name pattern; never declines
pub struct AssetClassPattern;

impl VolatilityStrategy for AssetClassPattern {
    fn name(&self) -> &str {
        "Asset Type Pattern Matching"
    }

    fn estimate(&self, ticker: &str) -> Option<AssetVolatility> {
        let asset_type = classify(ticker);
        Some(AssetVolatility {
            volatility: asset_type.base_volatility(),
            confidence: Confidence::Low,
            source: self.name().to_string(),
            asset_type,
        })
    }
}

/// Ordered strategy chain with a TTL memo per ticker
pub struct VolatilityEstimator {
    strategies: Vec<Box<dyn VolatilityStrategy>>,
    cache: TtlCache<String, AssetVolatility>,
}

impl VolatilityEstimator {
    pub fn new(strategies: Vec<Box<dyn VolatilityStrategy>>, ttl: Duration) -> Self {
        info!(
            "Initializing volatility estimator with strategies: {}",
            strategies.iter().map(|s| s.name()).collect::<Vec<_>>().join(" -> ")
        );
        Self {
            strategies,
            cache: TtlCache::new(ttl),
        }
    }

    /// Realized prices, then the reference table, then class patterns
    pub fn with_defaults(source: Arc<dyn PriceSeriesSource>, as_of: NaiveDate) -> Self {
        Self::new(
            vec![
                Box::new(RealizedVolatility::new(source, as_of)),
                Box::new(KnownAssetTable),
                Box::new(AssetClassPattern),
            ],
            DEFAULT_TTL,
        )
    }

    /// Offline chain without price history
    pub fn reference_only() -> Self {
        Self::new(vec![Box::new(KnownAssetTable), Box::new(AssetClassPattern)], DEFAULT_TTL)
    }

    /// First estimate any strategy produces; class patterns when all decline
    pub fn estimate(&self, ticker: &str) -> AssetVolatility {
        let key = ticker.trim().to_uppercase();
        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }

        let estimate = self
            .strategies
            .iter()
            .find_map(|strategy| strategy.estimate(&key))
            .or_else(|| AssetClassPattern.estimate(&key))
            .unwrap_or_else(|| AssetVolatility {
                volatility: AssetType::Stock.base_volatility(),
                confidence: Confidence::Low,
                source: "Default".to_string(),
                asset_type: AssetType::Stock,
            });

        debug!(
            "{}: volatility {:.3} ({:?}, {})",
            key, estimate.volatility, estimate.confidence, estimate.source
        );
        self.cache.insert(key, estimate.clone());
        estimate
    }
}

/// Anything that can supply a per-ticker volatility estimate
pub trait VolatilityLookup {
    fn lookup(&self, ticker: &str) -> Option<AssetVolatility>;
}

impl VolatilityLookup for VolatilityEstimator {
    fn lookup(&self, ticker: &str) -> Option<AssetVolatility> {
        Some(self.estimate(ticker))
    }
}

/// Exact key first, then a case-insensitive match on the trimmed ticker
fn find_by_ticker<'a, V>(map: &'a HashMap<String, V>, ticker: &str) -> Option<&'a V> {
    map.get(ticker).or_else(|| {
        let wanted = ticker.trim();
        map.iter()
            .find(|(key, _)| key.trim().eq_ignore_ascii_case(wanted))
            .map(|(_, value)| value)
    })
}

/// Caller-supplied point estimates, tagged medium confidence
impl VolatilityLookup for HashMap<String, f64> {
    fn lookup(&self, ticker: &str) -> Option<AssetVolatility> {
        find_by_ticker(self, ticker).map(|volatility| AssetVolatility {
            volatility: *volatility,
            confidence: Confidence::Medium,
            source: "Caller Supplied".to_string(),
            asset_type: classify(ticker),
        })
    }
}

impl VolatilityLookup for HashMap<String, AssetVolatility> {
    fn lookup(&self, ticker: &str) -> Option<AssetVolatility> {
        find_by_ticker(self, ticker).cloned()
    }
}
