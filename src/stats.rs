use crate::calendar::{business_days_between, month_key};
use crate::market_data::ReturnSeries;
use crate::rounding;
use chrono::NaiveDate;
use serde::Serialize;
use statrs::statistics::Statistics;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Drawdown, tail and dispersion metrics of a return series.
///
/// Values are kept at full precision; rounding happens on serialization.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskMetrics {
    #[serde(serialize_with = "rounding::one_decimal")]
    pub cum_return_pct: f64,
    #[serde(serialize_with = "rounding::one_decimal")]
    pub max_drawdown_pct: f64,
    pub time_to_recovery_days: Option<u32>,
    #[serde(serialize_with = "rounding::one_decimal")]
    pub worst_day_pct: f64,
    #[serde(serialize_with = "rounding::one_decimal")]
    pub worst_month_pct: f64,
    #[serde(serialize_with = "rounding::one_decimal")]
    pub ann_vol_pct: f64,
    #[serde(serialize_with = "rounding::two_decimals")]
    pub sharpe_lite: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drawdown_window: Option<DrawdownWindow>,
}

/// Dates bounding the maximum drawdown
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawdownWindow {
    pub peak_date: NaiveDate,
    pub trough_date: NaiveDate,
    pub recovery_date: Option<NaiveDate>,
}

/// Chartable equity and drawdown paths
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ScenarioSeries {
    pub dates: Vec<NaiveDate>,
    #[serde(serialize_with = "rounding::four_decimals_seq")]
    pub equity: Vec<f64>,
    /// Percent below the running peak (0 or negative)
    #[serde(serialize_with = "rounding::two_decimals_seq")]
    pub drawdown: Vec<f64>,
}

/// Cumulative product of (1 + r)
pub fn equity_curve(returns: &[f64]) -> Vec<f64> {
    returns
        .iter()
        .scan(1.0, |equity, r| {
            *equity *= 1.0 + r;
            Some(*equity)
        })
        .collect()
}

/// equity / running peak - 1 for each point
pub fn drawdown_curve(equity: &[f64]) -> Vec<f64> {
    let mut peak = f64::NEG_INFINITY;
    equity
        .iter()
        .map(|&value| {
            peak = peak.max(value);
            value / peak - 1.0
        })
        .collect()
}

/// Sample standard deviation, `None` when it is undefined (fewer than two points)
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let std_dev = values.std_dev();
    std_dev.is_finite().then_some(std_dev)
}

/// Annualized volatility from daily returns using the sample standard deviation
pub fn annualized_volatility(values: &[f64], periods_per_year: f64) -> Option<f64> {
    sample_std_dev(values).map(|s| s * periods_per_year.sqrt())
}

/// Annualized mean over annualized volatility, no risk-free rate
pub fn sharpe_lite(values: &[f64], periods_per_year: f64) -> f64 {
    match sample_std_dev(values) {
        Some(std_dev) if std_dev > 0.0 => {
            values.mean() * periods_per_year / (std_dev * periods_per_year.sqrt())
        }
        _ => 0.0,
    }
}

/// Locate the maximum drawdown and measure its recovery.
///
/// Returns (trough index, peak index, recovery index). The peak is the first
/// date the pre-trough high was reached; recovery is the first date, after
/// equity has fallen below that high, on which it is regained.
fn drawdown_extremes(equity: &[f64], drawdown: &[f64]) -> Option<(usize, usize, Option<usize>)> {
    let mut trough = 0;
    for (i, dd) in drawdown.iter().enumerate() {
        if *dd < drawdown[trough] {
            trough = i;
        }
    }

    let peak_value = equity[..=trough].iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let peak = equity[..=trough].iter().position(|v| *v >= peak_value)?;

    let recovery = equity
        .iter()
        .enumerate()
        .skip(peak + 1)
        .find(|(_, v)| **v < peak_value)
        .and_then(|(below, _)| {
            equity
                .iter()
                .enumerate()
                .skip(below)
                .find(|(_, v)| **v >= peak_value)
                .map(|(i, _)| i)
        });

    Some((trough, peak, recovery))
}

/// Compound each calendar month and return the worst, 0 when there are none
fn worst_month(dates: &[NaiveDate], values: &[f64]) -> f64 {
    let mut worst: Option<f64> = None;
    let mut current_key = None;
    let mut growth = 1.0;

    for (date, r) in dates.iter().zip(values) {
        let key = month_key(*date);
        if current_key.is_some_and(|k| k != key) {
            worst = Some(worst.map_or(growth - 1.0, |w: f64| w.min(growth - 1.0)));
            growth = 1.0;
        }
        current_key = Some(key);
        growth *= 1.0 + r;
    }
    if current_key.is_some() {
        worst = Some(worst.map_or(growth - 1.0, |w: f64| w.min(growth - 1.0)));
    }
    worst.unwrap_or(0.0)
}

/// Pure, deterministic risk metrics over a daily return series
#[derive(Debug, Clone)]
pub struct RiskMetricsCalculator {
    periods_per_year: f64,
}

impl Default for RiskMetricsCalculator {
    fn default() -> Self {
        Self::new(TRADING_DAYS_PER_YEAR)
    }
}

impl RiskMetricsCalculator {
    pub fn new(periods_per_year: f64) -> Self {
        Self { periods_per_year }
    }

    pub fn compute_metrics(&self, returns: &ReturnSeries) -> RiskMetrics {
        if returns.is_empty() {
            return RiskMetrics::default();
        }

        let dates = returns.dates();
        let values = returns.values();
        let equity = equity_curve(&values);
        let drawdown = drawdown_curve(&equity);

        let cum_return_pct = (equity[equity.len() - 1] - 1.0) * 100.0;
        let ann_vol_pct = annualized_volatility(&values, self.periods_per_year).unwrap_or(0.0) * 100.0;
        let worst_day_pct = values.iter().copied().fold(f64::INFINITY, f64::min) * 100.0;

        let (max_drawdown_pct, time_to_recovery_days, drawdown_window) =
            match drawdown_extremes(&equity, &drawdown) {
                Some((trough, peak, recovery)) => {
                    let recovery_days = recovery.map(|r| {
                        let day_after_peak = dates[peak].succ_opt().unwrap_or(dates[peak]);
                        business_days_between(day_after_peak, dates[r]) as u32
                    });
                    (
                        drawdown[trough] * 100.0,
                        recovery_days,
                        Some(DrawdownWindow {
                            peak_date: dates[peak],
                            trough_date: dates[trough],
                            recovery_date: recovery.map(|r| dates[r]),
                        }),
                    )
                }
                None => (0.0, None, None),
            };

        RiskMetrics {
            cum_return_pct,
            max_drawdown_pct,
            time_to_recovery_days,
            worst_day_pct,
            worst_month_pct: worst_month(&dates, &values) * 100.0,
            ann_vol_pct,
            sharpe_lite: sharpe_lite(&values, self.periods_per_year),
            drawdown_window,
        }
    }

    pub fn generate_series(&self, returns: &ReturnSeries) -> ScenarioSeries {
        let values = returns.values();
        let equity = equity_curve(&values);
        let drawdown = drawdown_curve(&equity).into_iter().map(|dd| dd * 100.0).collect();
        ScenarioSeries {
            dates: returns.dates(),
            equity,
            drawdown,
        }
    }
}
