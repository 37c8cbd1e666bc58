//! Portfolio return aggregation under drift and calendar rebalancing.

use crate::basket::Basket;
use crate::calendar::{month_key, quarter_key};
use crate::error::{Result, RiskError};
use crate::market_data::{PriceSeriesSource, ReturnSeries, fetch_or_empty};
use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub const DEFAULT_MIN_OBSERVATIONS: usize = 10;

/// How weights evolve between trading days
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RebalancePolicy {
    /// Let weights drift with returns, renormalized daily
    #[default]
    None,
    /// Snap back to targets on the first trading day of each month
    Monthly,
    /// Snap back to targets on the first trading day of each quarter
    Quarterly,
}

impl RebalancePolicy {
    fn period_key(&self, date: NaiveDate) -> Option<(i32, u32)> {
        match self {
            RebalancePolicy::None => None,
            RebalancePolicy::Monthly => Some(month_key(date)),
            RebalancePolicy::Quarterly => Some(quarter_key(date)),
        }
    }
}

impl std::str::FromStr for RebalancePolicy {
    type Err = RiskError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" | "" => Ok(RebalancePolicy::None),
            "monthly" => Ok(RebalancePolicy::Monthly),
            "quarterly" => Ok(RebalancePolicy::Quarterly),
            other => Err(RiskError::malformed(format!("unknown rebalance policy '{}'", other))),
        }
    }
}

/// Daily portfolio returns plus the bookkeeping needed to audit them
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioReturns {
    pub tickers: Vec<String>,
    pub returns: ReturnSeries,
    /// Return observations / price observations per ticker
    pub per_asset_coverage: BTreeMap<String, f64>,
    /// Price observations fetched per ticker
    pub price_counts: BTreeMap<String, usize>,
    /// Weight vector (in `tickers` order) applied on each return date
    pub applied_weights: Vec<Vec<f64>>,
}

/// Returns of every asset aligned on the union of their observation dates
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedReturns {
    pub dates: Vec<NaiveDate>,
    /// rows[t][i] is the return of asset i on dates[t]; 0 where the asset has no data
    pub rows: Vec<Vec<f64>>,
}

impl AlignedReturns {
    pub fn align(series: &[ReturnSeries]) -> Self {
        let dates: Vec<NaiveDate> = series
            .iter()
            .flat_map(|s| s.points().iter().map(|(d, _)| *d))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let lookups: Vec<HashMap<NaiveDate, f64>> = series
            .iter()
            .map(|s| s.points().iter().copied().collect())
            .collect();

        let rows = dates
            .iter()
            .map(|date| {
                lookups
                    .iter()
                    .map(|lookup| lookup.get(date).copied().unwrap_or(0.0))
                    .collect()
            })
            .collect();

        Self { dates, rows }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

/// Walk the aligned returns forward, producing the portfolio return for each
/// date and the weight vector used on it.
///
/// Weights start at `targets`. After each day every weight grows by its
/// asset's return and the vector is renormalized. Under a calendar policy the
/// weights are reset to `targets` on the first date of each period, before
/// that day's return is computed.
pub fn drift_weights(
    aligned: &AlignedReturns,
    targets: &[f64],
    policy: RebalancePolicy,
) -> (Vec<f64>, Vec<Vec<f64>>) {
    let mut weights = targets.to_vec();
    let mut portfolio_returns = Vec::with_capacity(aligned.len());
    let mut applied = Vec::with_capacity(aligned.len());
    let mut current_period = None;

    for (date, row) in aligned.dates.iter().zip(&aligned.rows) {
        if let Some(period) = policy.period_key(*date) {
            if current_period.is_some_and(|p| p != period) {
                debug!("Rebalancing to targets on {}", date);
                weights.copy_from_slice(targets);
            }
            current_period = Some(period);
        }

        let day_return: f64 = weights.iter().zip(row).map(|(w, r)| w * r).sum();
        portfolio_returns.push(day_return);
        applied.push(weights.clone());

        let grown: Vec<f64> = weights.iter().zip(row).map(|(w, r)| w * (1.0 + r)).collect();
        let total: f64 = grown.iter().sum();
        if total > 0.0 && total.is_finite() {
            weights = grown.into_iter().map(|w| w / total).collect();
        } else {
            warn!("Portfolio weight collapsed to {} on {}; keeping previous weights", total, date);
        }
    }

    (portfolio_returns, applied)
}

/// Turns per-asset prices into one portfolio return series
#[derive(Debug, Clone)]
pub struct ReturnsAggregator {
    min_observations: usize,
}

impl Default for ReturnsAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_OBSERVATIONS)
    }
}

impl ReturnsAggregator {
    pub fn new(min_observations: usize) -> Self {
        Self { min_observations }
    }

    pub fn min_observations(&self) -> usize {
        self.min_observations
    }

    pub fn compute_returns(
        &self,
        basket: &Basket,
        source: &dyn PriceSeriesSource,
        start: NaiveDate,
        end: NaiveDate,
        policy: RebalancePolicy,
    ) -> Result<PortfolioReturns> {
        if start > end {
            return Err(RiskError::malformed(format!(
                "start date {} is after end date {}",
                start, end
            )));
        }

        let tickers = basket.tickers();
        let mut per_asset_coverage = BTreeMap::new();
        let mut price_counts = BTreeMap::new();
        let mut asset_returns = Vec::with_capacity(tickers.len());
        let mut missing = Vec::new();

        for ticker in &tickers {
            let prices = fetch_or_empty(source, ticker, start, end);
            let returns = prices.returns();
            let coverage = if prices.is_empty() {
                0.0
            } else {
                returns.len() as f64 / prices.len() as f64
            };
            if prices.is_empty() {
                missing.push(ticker.clone());
            }
            debug!(
                "{}: {} prices, {} returns between {} and {}",
                ticker,
                prices.len(),
                returns.len(),
                start,
                end
            );
            per_asset_coverage.insert(ticker.clone(), coverage);
            price_counts.insert(ticker.clone(), prices.len());
            asset_returns.push(returns);
        }

        if missing.len() == tickers.len() {
            return Err(RiskError::NoPriceData { tickers: missing });
        }
        if !missing.is_empty() {
            warn!("No price data for {}; carrying them as zero returns", missing.join(", "));
        }

        let aligned = AlignedReturns::align(&asset_returns);
        if aligned.len() < self.min_observations {
            return Err(RiskError::InsufficientHistory {
                observations: aligned.len(),
                required: self.min_observations,
            });
        }

        let (values, applied_weights) = drift_weights(&aligned, &basket.weights(), policy);
        info!(
            "Aggregated {} daily returns for {} assets ({:?} rebalancing)",
            values.len(),
            tickers.len(),
            policy
        );

        Ok(PortfolioReturns {
            tickers,
            returns: ReturnSeries::new(aligned.dates.into_iter().zip(values).collect()),
            per_asset_coverage,
            price_counts,
            applied_weights,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::{InMemoryPriceSource, PriceSeries};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn aligned(dates: Vec<NaiveDate>, rows: Vec<Vec<f64>>) -> AlignedReturns {
        AlignedReturns { dates, rows }
    }

    #[test]
    fn test_drift_renormalizes_daily() {
        let data = aligned(
            vec![d(2024, 1, 2), d(2024, 1, 3)],
            vec![vec![0.10, 0.0], vec![0.0, 0.0]],
        );
        let (returns, weights) = drift_weights(&data, &[0.5, 0.5], RebalancePolicy::None);

        assert!((returns[0] - 0.05).abs() < 1e-12);
        // After +10% on the first asset: 0.55 / 1.05 and 0.5 / 1.05
        assert!((weights[1][0] - 0.55 / 1.05).abs() < 1e-12);
        assert!((weights[1].iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_monthly_reset_happens_before_return() {
        let data = aligned(
            vec![d(2024, 1, 30), d(2024, 1, 31), d(2024, 2, 1)],
            vec![vec![0.5, 0.0], vec![0.0, 0.0], vec![0.1, -0.1]],
        );
        let (returns, weights) = drift_weights(&data, &[0.5, 0.5], RebalancePolicy::Monthly);

        assert_ne!(weights[1], vec![0.5, 0.5], "weights drift within the month");
        assert_eq!(weights[2], vec![0.5, 0.5], "first day of February uses targets");
        assert!(returns[2].abs() < 1e-12);
    }

    #[test]
    fn test_quarterly_ignores_month_boundaries_inside_quarter() {
        let data = aligned(
            vec![d(2024, 1, 31), d(2024, 2, 1), d(2024, 4, 1)],
            vec![vec![0.2, 0.0], vec![0.0, 0.0], vec![0.0, 0.0]],
        );
        let (_, weights) = drift_weights(&data, &[0.5, 0.5], RebalancePolicy::Quarterly);
        assert_ne!(weights[1], vec![0.5, 0.5]);
        assert_eq!(weights[2], vec![0.5, 0.5]);
    }

    #[test]
    fn test_zero_price_asset_is_carried_at_zero() {
        let data = aligned(
            vec![d(2024, 1, 2), d(2024, 1, 3)],
            vec![vec![-1.0, 0.0], vec![0.5, 0.01]],
        );
        let (_, weights) = drift_weights(&data, &[0.5, 0.5], RebalancePolicy::None);
        assert_eq!(weights[1], vec![0.0, 1.0]);
    }

    #[test]
    fn test_missing_asset_gives_no_price_data() {
        let source = InMemoryPriceSource::new();
        let basket = Basket::from_pairs(&[("AAA", 1.0), ("BBB", 1.0)]).unwrap();
        let err = ReturnsAggregator::default()
            .compute_returns(&basket, &source, d(2024, 1, 1), d(2024, 3, 1), RebalancePolicy::None)
            .unwrap_err();
        assert_eq!(
            err,
            RiskError::NoPriceData {
                tickers: vec!["AAA".to_string(), "BBB".to_string()]
            }
        );
    }

    #[test]
    fn test_short_window_is_insufficient() {
        let prices = (0..5)
            .map(|i| (d(2024, 1, 2) + chrono::Duration::days(i), 100.0 + i as f64))
            .collect();
        let source = InMemoryPriceSource::with_series(vec![PriceSeries::new("AAA", prices)]);
        let basket = Basket::single("AAA").unwrap();
        let err = ReturnsAggregator::default()
            .compute_returns(&basket, &source, d(2024, 1, 1), d(2024, 3, 1), RebalancePolicy::None)
            .unwrap_err();
        assert_eq!(
            err,
            RiskError::InsufficientHistory {
                observations: 4,
                required: 10
            }
        );
    }

    #[test]
    fn test_inverted_range_is_malformed() {
        let source = InMemoryPriceSource::new();
        let basket = Basket::single("AAA").unwrap();
        let result = ReturnsAggregator::default().compute_returns(
            &basket,
            &source,
            d(2024, 3, 1),
            d(2024, 1, 1),
            RebalancePolicy::None,
        );
        assert!(matches!(result, Err(RiskError::MalformedInput(_))));
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("Monthly".parse::<RebalancePolicy>().unwrap(), RebalancePolicy::Monthly);
        assert_eq!("none".parse::<RebalancePolicy>().unwrap(), RebalancePolicy::None);
        assert!("weekly".parse::<RebalancePolicy>().is_err());
    }
}
