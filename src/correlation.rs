//! Correlation and concentration analysis of a basket.

use crate::bands::{RiskBand, UNKNOWN_COLOR};
use crate::basket::Basket;
use crate::diversification::{DiversificationScore, score_diversification};
use crate::error::{Result, RiskError};
use crate::market_data::{PriceSeriesSource, ReturnSeries, fetch_or_empty};
use crate::rounding;
use chrono::{Duration, NaiveDate};
use log::{debug, info, warn};
use ndarray::{Array2, Axis};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;

pub const DEFAULT_LOOKBACK_DAYS: usize = 252;
pub const DEFAULT_BUFFER_DAYS: i64 = 50;
pub const DEFAULT_MIN_OBSERVATIONS: usize = 30;

/// Symmetric Pearson correlation matrix indexed by ticker.
///
/// The diagonal is exactly 1.0. Off-diagonal entries are NaN where the
/// correlation is undefined (a constant series).
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    tickers: Vec<String>,
    values: Array2<f64>,
}

impl CorrelationMatrix {
    pub fn empty() -> Self {
        Self {
            tickers: Vec::new(),
            values: Array2::zeros((0, 0)),
        }
    }

    /// Build from a square array of coefficients; the diagonal is forced to 1.0
    pub fn from_values(tickers: Vec<String>, mut values: Array2<f64>) -> Result<Self> {
        let n = tickers.len();
        if values.dim() != (n, n) {
            return Err(RiskError::malformed(format!(
                "correlation matrix is {:?} but there are {} tickers",
                values.dim(),
                n
            )));
        }
        for i in 0..n {
            values[[i, i]] = 1.0;
        }
        Ok(Self { tickers, values })
    }

    /// Pearson correlation of the columns of `observations` (rows are dates)
    pub fn from_observations(tickers: Vec<String>, observations: &Array2<f64>) -> Self {
        let k = tickers.len();
        let mut values = Array2::from_elem((k, k), f64::NAN);

        if let Some(means) = observations.mean_axis(Axis(0)) {
            let centered = observations - &means.insert_axis(Axis(0));
            let gram = centered.t().dot(&centered);
            for i in 0..k {
                for j in (i + 1)..k {
                    let denominator = (gram[[i, i]] * gram[[j, j]]).sqrt();
                    if denominator > 0.0 {
                        let rho = (gram[[i, j]] / denominator).clamp(-1.0, 1.0);
                        values[[i, j]] = rho;
                        values[[j, i]] = rho;
                    }
                }
            }
        }
        for i in 0..k {
            values[[i, i]] = 1.0;
        }

        Self { tickers, values }
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }

    pub fn value(&self, i: usize, j: usize) -> f64 {
        self.values[[i, j]]
    }

    /// Coefficient for a ticker pair, `None` if either ticker is absent
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.tickers.iter().position(|t| t == a)?;
        let j = self.tickers.iter().position(|t| t == b)?;
        Some(self.values[[i, j]])
    }

    pub fn is_symmetric(&self) -> bool {
        let n = self.len();
        (0..n).all(|i| {
            (0..n).all(|j| {
                let (a, b) = (self.values[[i, j]], self.values[[j, i]]);
                (a.is_nan() && b.is_nan()) || a == b
            })
        })
    }

    /// Largest defined off-diagonal entry, first in row-major order on ties
    pub fn most_correlated_pair(&self) -> Option<(usize, usize, f64)> {
        let mut best: Option<(usize, usize, f64)> = None;
        for i in 0..self.len() {
            for j in (i + 1)..self.len() {
                let value = self.values[[i, j]];
                if value.is_nan() {
                    continue;
                }
                if best.is_none_or(|(_, _, b)| value > b) {
                    best = Some((i, j, value));
                }
            }
        }
        best
    }

    /// Mean of the defined upper-triangle entries
    pub fn average_correlation(&self) -> Option<f64> {
        let upper: Vec<f64> = (0..self.len())
            .flat_map(|i| ((i + 1)..self.len()).map(move |j| (i, j)))
            .map(|(i, j)| self.values[[i, j]])
            .filter(|v| !v.is_nan())
            .collect();
        if upper.is_empty() {
            None
        } else {
            Some(upper.iter().sum::<f64>() / upper.len() as f64)
        }
    }
}

struct MatrixRow<'a> {
    matrix: &'a CorrelationMatrix,
    row: usize,
}

impl Serialize for MatrixRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.matrix.len()))?;
        for (j, ticker) in self.matrix.tickers.iter().enumerate() {
            let value = self.matrix.values[[self.row, j]];
            let value = (!value.is_nan()).then(|| rounding::round_to(value, 3));
            map.serialize_entry(ticker, &value)?;
        }
        map.end()
    }
}

/// Serialized as `{ticker: {ticker: value}}` with undefined entries as null
impl Serialize for CorrelationMatrix {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (row, ticker) in self.tickers.iter().enumerate() {
            map.serialize_entry(ticker, &MatrixRow { matrix: self, row })?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelatedPair {
    pub asset1: String,
    pub asset2: String,
    #[serde(serialize_with = "rounding::three_decimals")]
    pub correlation: f64,
    pub correlation_level: RiskBand,
    pub risk_color: String,
    pub risk_description: String,
}

impl CorrelatedPair {
    fn new(asset1: &str, asset2: &str, correlation: f64) -> Self {
        let band = RiskBand::for_correlation(correlation);
        Self {
            asset1: asset1.to_string(),
            asset2: asset2.to_string(),
            correlation,
            correlation_level: band,
            risk_color: band.color().to_string(),
            risk_description: band.correlation_description().to_string(),
        }
    }

    fn unavailable(description: &str) -> Self {
        Self {
            asset1: "N/A".to_string(),
            asset2: "N/A".to_string(),
            correlation: 0.0,
            correlation_level: RiskBand::Unknown,
            risk_color: UNKNOWN_COLOR.to_string(),
            risk_description: description.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Holding {
    pub ticker: String,
    #[serde(serialize_with = "rounding::three_decimals")]
    pub weight: f64,
    #[serde(serialize_with = "rounding::one_decimal")]
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConcentrationMetrics {
    #[serde(serialize_with = "rounding::three_decimals")]
    pub hhi: f64,
    pub concentration_level: RiskBand,
    pub risk_color: String,
    #[serde(serialize_with = "rounding::three_decimals")]
    pub top_3_concentration: f64,
    pub largest_holding: Holding,
    pub top_holdings: Vec<Holding>,
}

impl ConcentrationMetrics {
    pub fn from_basket(basket: &Basket) -> Self {
        let hhi = basket.hhi();
        let band = RiskBand::for_hhi(hhi);

        // stable sort keeps input order among equal weights
        let mut ranked: Vec<Holding> = basket
            .assets()
            .iter()
            .map(|a| Holding {
                ticker: a.ticker.clone(),
                weight: a.weight,
                percentage: a.weight * 100.0,
            })
            .collect();
        ranked.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        ranked.truncate(3);

        let top_3_concentration = ranked.iter().map(|h| h.weight).sum();
        let largest_holding = ranked[0].clone();

        Self {
            hhi,
            concentration_level: band,
            risk_color: band.color().to_string(),
            top_3_concentration,
            largest_holding,
            top_holdings: ranked,
        }
    }
}

/// Why a correlation analysis degraded to concentration-only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    /// Structural: there is nothing to correlate
    SingleAsset,
    /// Fewer than two assets with data, or too few aligned observations
    InsufficientData,
    /// Every off-diagonal coefficient is undefined
    UndefinedCorrelation,
}

impl UnavailableReason {
    pub fn message(&self) -> &'static str {
        match self {
            UnavailableReason::SingleAsset => "Single asset portfolio - correlation analysis not applicable",
            UnavailableReason::InsufficientData => "Unable to fetch price data for correlation analysis",
            UnavailableReason::UndefinedCorrelation => "Correlation matrix is undefined for every asset pair",
        }
    }

    fn pair_description(&self) -> &'static str {
        match self {
            UnavailableReason::SingleAsset => {
                "Single asset portfolio - consider adding more assets for diversification"
            }
            UnavailableReason::InsufficientData => "Correlation analysis unavailable",
            UnavailableReason::UndefinedCorrelation => "Insufficient data for correlation analysis",
        }
    }

    pub fn to_error(self) -> RiskError {
        RiskError::CorrelationUnavailable(self.message().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationReport {
    pub most_correlated_pair: CorrelatedPair,
    #[serde(serialize_with = "rounding::three_decimals")]
    pub average_correlation: f64,
    pub correlation_matrix: CorrelationMatrix,
    pub concentration_metrics: ConcentrationMetrics,
    pub diversification: DiversificationScore,
    pub total_assets: usize,
    pub analysis_period_days: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub single_asset_portfolio: bool,
    #[serde(skip)]
    pub unavailable: Option<UnavailableReason>,
}

impl CorrelationReport {
    /// The matrix, when the analysis produced one
    pub fn matrix(&self) -> Option<&CorrelationMatrix> {
        (self.success && !self.correlation_matrix.is_empty()).then_some(&self.correlation_matrix)
    }

    fn concentration_only(basket: &Basket, reason: UnavailableReason, lookback_days: usize) -> Self {
        let concentration = ConcentrationMetrics::from_basket(basket);
        let diversification = score_diversification(basket, 0.0, concentration.hhi);
        Self {
            most_correlated_pair: CorrelatedPair::unavailable(reason.pair_description()),
            average_correlation: 0.0,
            correlation_matrix: CorrelationMatrix::empty(),
            concentration_metrics: concentration,
            diversification,
            total_assets: basket.len(),
            analysis_period_days: lookback_days,
            success: false,
            error_message: Some(reason.message().to_string()),
            single_asset_portfolio: reason == UnavailableReason::SingleAsset,
            unavailable: Some(reason),
        }
    }
}

/// Align return series on the union of their dates, carrying each series'
/// last value across its gaps (0 before its first observation), and keep
/// the most recent `lookback` rows.
pub fn align_forward_filled(series: &[ReturnSeries], lookback: usize) -> (Vec<NaiveDate>, Array2<f64>) {
    let all_dates: Vec<NaiveDate> = series
        .iter()
        .flat_map(|s| s.points().iter().map(|(d, _)| *d))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let columns: Vec<Vec<f64>> = series
        .iter()
        .map(|s| {
            let points = s.points();
            let mut cursor = 0;
            let mut last = 0.0;
            all_dates
                .iter()
                .map(|date| {
                    if cursor < points.len() && points[cursor].0 == *date {
                        last = points[cursor].1;
                        cursor += 1;
                    }
                    last
                })
                .collect()
        })
        .collect();

    let skip = all_dates.len().saturating_sub(lookback);
    let dates: Vec<NaiveDate> = all_dates[skip..].to_vec();
    let observations = Array2::from_shape_fn((dates.len(), series.len()), |(t, i)| columns[i][skip + t]);
    (dates, observations)
}

/// Correlation, concentration and diversification of a basket
#[derive(Debug, Clone)]
pub struct CorrelationAnalyzer {
    lookback_days: usize,
    buffer_days: i64,
    min_observations: usize,
}

impl Default for CorrelationAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_LOOKBACK_DAYS, DEFAULT_BUFFER_DAYS, DEFAULT_MIN_OBSERVATIONS)
    }
}

impl CorrelationAnalyzer {
    pub fn new(lookback_days: usize, buffer_days: i64, min_observations: usize) -> Self {
        Self {
            lookback_days,
            buffer_days,
            min_observations,
        }
    }

    pub fn lookback_days(&self) -> usize {
        self.lookback_days
    }

    /// Calendar window fetched for an analysis as of `as_of`
    pub fn window(&self, as_of: NaiveDate) -> (NaiveDate, NaiveDate) {
        let span = Duration::days(self.lookback_days as i64 + self.buffer_days);
        (as_of - span, as_of)
    }

    pub fn analyze(&self, basket: &Basket, source: &dyn PriceSeriesSource, as_of: NaiveDate) -> CorrelationReport {
        if basket.is_single_asset() {
            debug!("Single asset basket; skipping correlation analysis");
            return CorrelationReport::concentration_only(
                basket,
                UnavailableReason::SingleAsset,
                self.lookback_days,
            );
        }

        let (start, end) = self.window(as_of);
        let mut tickers = Vec::new();
        let mut series = Vec::new();
        for ticker in basket.tickers() {
            let returns = fetch_or_empty(source, &ticker, start, end).returns();
            if returns.is_empty() {
                warn!("Excluding {} from correlation analysis: no returns in window", ticker);
                continue;
            }
            tickers.push(ticker);
            series.push(returns);
        }

        if tickers.len() < 2 {
            warn!("Only {} asset(s) with data; correlation analysis unavailable", tickers.len());
            return CorrelationReport::concentration_only(
                basket,
                UnavailableReason::InsufficientData,
                self.lookback_days,
            );
        }

        let (dates, observations) = align_forward_filled(&series, self.lookback_days);
        if dates.len() < self.min_observations {
            warn!(
                "Only {} aligned observations (need {}); correlation analysis unavailable",
                dates.len(),
                self.min_observations
            );
            return CorrelationReport::concentration_only(
                basket,
                UnavailableReason::InsufficientData,
                self.lookback_days,
            );
        }

        let matrix = CorrelationMatrix::from_observations(tickers, &observations);
        let Some((i, j, value)) = matrix.most_correlated_pair() else {
            warn!("Every pairwise correlation is undefined; correlation analysis unavailable");
            return CorrelationReport::concentration_only(
                basket,
                UnavailableReason::UndefinedCorrelation,
                self.lookback_days,
            );
        };
        let most_correlated_pair = CorrelatedPair::new(&matrix.tickers()[i], &matrix.tickers()[j], value);
        let average_correlation = matrix.average_correlation().unwrap_or(0.0);
        let concentration = ConcentrationMetrics::from_basket(basket);
        let diversification = score_diversification(basket, average_correlation, concentration.hhi);

        info!(
            "Correlation analysis over {} days: most correlated {}/{} at {:.3}, average {:.3}",
            dates.len(),
            most_correlated_pair.asset1,
            most_correlated_pair.asset2,
            most_correlated_pair.correlation,
            average_correlation
        );

        CorrelationReport {
            most_correlated_pair,
            average_correlation,
            correlation_matrix: matrix,
            concentration_metrics: concentration,
            diversification,
            total_assets: basket.len(),
            analysis_period_days: dates.len(),
            success: true,
            error_message: None,
            single_asset_portfolio: false,
            unavailable: None,
        }
    }
}
