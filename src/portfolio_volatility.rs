//! Blending per-asset volatility estimates into one portfolio figure.

use crate::basket::Basket;
use crate::cache::TtlCache;
use crate::correlation::CorrelationMatrix;
use crate::error::{Result, RiskError};
use crate::rounding;
use crate::security_types::AssetType;
use crate::volatility::{Confidence, VolatilityLookup};
use log::{debug, info};
use serde::Serialize;
use std::sync::Arc;

pub const DEFAULT_FALLBACK_CORRELATION: f64 = 0.6;
pub const DEFAULT_ADJUSTMENT_FLOOR: f64 = 0.85;
pub const DEFAULT_ADJUSTMENT_CEILING: f64 = 1.15;
pub const DEFAULT_FORECAST_DAYS: usize = 20;

pub const REAL_CORRELATION_METHOD: &str = "Real Correlation Matrix";

/// Source of an alternate, model-based portfolio volatility estimate
pub trait LearnedVolatilityModel: Send + Sync {
    fn name(&self) -> &str;
    /// Annualized volatility for the basket, `None` when the model has no opinion
    fn predict(&self, basket: &Basket) -> Option<f64>;
}

/// Loaded models keyed by name, owned by the caller
pub type ModelCache = TtlCache<String, Arc<dyn LearnedVolatilityModel>>;

/// A model that always predicts the same figure
#[derive(Debug, Clone)]
pub struct StaticEstimateModel {
    volatility: f64,
}

impl StaticEstimateModel {
    pub fn new(volatility: f64) -> Self {
        Self { volatility }
    }
}

impl LearnedVolatilityModel for StaticEstimateModel {
    fn name(&self) -> &str {
        "static-estimate"
    }

    fn predict(&self, _basket: &Basket) -> Option<f64> {
        Some(self.volatility)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetVolatilityDetail {
    pub ticker: String,
    #[serde(serialize_with = "rounding::three_decimals")]
    pub weight: f64,
    #[serde(serialize_with = "rounding::three_decimals")]
    pub volatility: f64,
    pub confidence: Confidence,
    pub source: String,
    pub asset_type: AssetType,
}

/// Weight share of the basket at each confidence tier
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfidenceDistribution {
    #[serde(serialize_with = "rounding::three_decimals")]
    pub high: f64,
    #[serde(serialize_with = "rounding::three_decimals")]
    pub medium: f64,
    #[serde(serialize_with = "rounding::three_decimals")]
    pub low: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageAnalysis {
    pub total_assets: usize,
    pub covered_assets: usize,
    #[serde(serialize_with = "rounding::three_decimals")]
    pub coverage_by_count: f64,
    #[serde(serialize_with = "rounding::three_decimals")]
    pub coverage_by_weight: f64,
    /// Tickers that only matched a class pattern
    pub unknown_assets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolatilityLabels {
    pub window: String,
    pub ml_adjustment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolatilityRange {
    pub one_sigma_range: String,
    pub two_sigma_range: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolatilityInterpretation {
    pub risk_level: String,
    pub description: String,
    pub annual_volatility_pct: String,
    pub volatility_range: VolatilityRange,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioVolatility {
    /// Diversified volatility after the learned adjustment
    #[serde(serialize_with = "rounding::four_decimals")]
    pub portfolio_volatility: f64,
    #[serde(serialize_with = "rounding::four_decimals")]
    pub weighted_average_volatility: f64,
    #[serde(serialize_with = "rounding::four_decimals")]
    pub diversified_volatility: f64,
    #[serde(serialize_with = "rounding::four_decimals")]
    pub diversification_benefit: f64,
    pub correlation_method: String,
    #[serde(serialize_with = "rounding::three_decimals")]
    pub learned_multiplier: f64,
    pub confidence: Confidence,
    pub confidence_distribution: ConfidenceDistribution,
    pub coverage: CoverageAnalysis,
    pub asset_details: Vec<AssetVolatilityDetail>,
    #[serde(serialize_with = "rounding::four_decimals_seq")]
    pub forecast: Vec<f64>,
    pub labels: VolatilityLabels,
    pub interpretation: VolatilityInterpretation,
}

/// Combines per-asset estimates, correlations and an optional learned estimate
#[derive(Debug, Clone)]
pub struct VolatilityAggregator {
    fallback_correlation: f64,
    adjustment_floor: f64,
    adjustment_ceiling: f64,
    forecast_days: usize,
}

impl Default for VolatilityAggregator {
    fn default() -> Self {
        Self::new(
            DEFAULT_FALLBACK_CORRELATION,
            DEFAULT_ADJUSTMENT_FLOOR,
            DEFAULT_ADJUSTMENT_CEILING,
            DEFAULT_FORECAST_DAYS,
        )
    }
}

impl VolatilityAggregator {
    pub fn new(fallback_correlation: f64, adjustment_floor: f64, adjustment_ceiling: f64, forecast_days: usize) -> Self {
        Self {
            fallback_correlation,
            adjustment_floor,
            adjustment_ceiling,
            forecast_days,
        }
    }

    pub fn assumption_method(&self) -> String {
        format!("Assumption ({} correlation)", self.fallback_correlation)
    }

    /// sqrt(sum_i sum_j w_i w_j s_i s_j rho_ij); missing or undefined pairs
    /// use the fallback correlation.
    pub fn diversified_volatility(
        &self,
        tickers: &[String],
        weights: &[f64],
        volatilities: &[f64],
        matrix: Option<&CorrelationMatrix>,
    ) -> f64 {
        let n = tickers.len();
        let mut variance = 0.0;
        for i in 0..n {
            for j in 0..n {
                let rho = if i == j {
                    1.0
                } else {
                    matrix
                        .and_then(|m| m.get(&tickers[i], &tickers[j]))
                        .filter(|v| !v.is_nan())
                        .unwrap_or(self.fallback_correlation)
                };
                variance += weights[i] * weights[j] * volatilities[i] * volatilities[j] * rho;
            }
        }
        variance.max(0.0).sqrt()
    }

    /// Clip external / diversified into the configured band; 1.0 without a usable estimate
    pub fn learned_multiplier(&self, diversified: f64, external: Option<f64>) -> f64 {
        match external {
            Some(ext) if ext.is_finite() && ext > 0.0 && diversified > 0.0 => {
                (ext / diversified).clamp(self.adjustment_floor, self.adjustment_ceiling)
            }
            _ => 1.0,
        }
    }

    pub fn aggregate(
        &self,
        basket: &Basket,
        lookup: &dyn VolatilityLookup,
        matrix: Option<&CorrelationMatrix>,
        learned_estimate: Option<f64>,
    ) -> Result<PortfolioVolatility> {
        let tickers = basket.tickers();
        let weights = basket.weights();

        let mut details = Vec::with_capacity(tickers.len());
        let mut missing = Vec::new();
        for (ticker, weight) in tickers.iter().zip(&weights) {
            match lookup.lookup(ticker) {
                Some(estimate) if estimate.volatility.is_finite() && estimate.volatility >= 0.0 => {
                    details.push(AssetVolatilityDetail {
                        ticker: ticker.clone(),
                        weight: *weight,
                        volatility: estimate.volatility,
                        confidence: estimate.confidence,
                        source: estimate.source,
                        asset_type: estimate.asset_type,
                    })
                }
                _ => missing.push(ticker.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(RiskError::malformed(format!(
                "no volatility estimate for: {}",
                missing.join(", ")
            )));
        }

        let volatilities: Vec<f64> = details.iter().map(|d| d.volatility).collect();
        let weighted_average: f64 = weights.iter().zip(&volatilities).map(|(w, v)| w * v).sum();

        let usable_matrix = matrix.filter(|m| m.len() >= 2 && m.most_correlated_pair().is_some());
        let correlation_method = if usable_matrix.is_some() {
            REAL_CORRELATION_METHOD.to_string()
        } else {
            self.assumption_method()
        };
        let diversified = self.diversified_volatility(&tickers, &weights, &volatilities, usable_matrix);

        let multiplier = self.learned_multiplier(diversified, learned_estimate);
        let final_volatility = diversified * multiplier;
        debug!(
            "Volatility blend: weighted {:.4}, diversified {:.4}, multiplier {:.3}",
            weighted_average, diversified, multiplier
        );

        let distribution = confidence_distribution(&details);
        let confidence = rollup_confidence(&distribution);
        let coverage = coverage_analysis(&details);

        info!(
            "Portfolio volatility {:.2}% ({}, {:?} confidence)",
            final_volatility * 100.0,
            correlation_method,
            confidence
        );

        Ok(PortfolioVolatility {
            portfolio_volatility: final_volatility,
            weighted_average_volatility: weighted_average,
            diversified_volatility: diversified,
            diversification_benefit: weighted_average - diversified,
            correlation_method,
            learned_multiplier: multiplier,
            confidence,
            confidence_distribution: distribution,
            coverage,
            asset_details: details,
            forecast: vec![final_volatility; self.forecast_days],
            labels: VolatilityLabels {
                window: "1y realized".to_string(),
                ml_adjustment: format!("{:.2}x", multiplier),
            },
            interpretation: interpret(final_volatility),
        })
    }
}

fn confidence_distribution(details: &[AssetVolatilityDetail]) -> ConfidenceDistribution {
    let share = |tier: Confidence| -> f64 {
        details
            .iter()
            .filter(|d| d.confidence == tier)
            .map(|d| d.weight)
            .sum()
    };
    ConfidenceDistribution {
        high: share(Confidence::High),
        medium: share(Confidence::Medium),
        low: share(Confidence::Low),
    }
}

/// High if more than 70% of weight is high-confidence; Medium if more than
/// 80% is high or medium; Low otherwise.
pub fn rollup_confidence(distribution: &ConfidenceDistribution) -> Confidence {
    if distribution.high > 0.7 {
        Confidence::High
    } else if distribution.high + distribution.medium > 0.8 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

fn coverage_analysis(details: &[AssetVolatilityDetail]) -> CoverageAnalysis {
    let covered: Vec<&AssetVolatilityDetail> = details
        .iter()
        .filter(|d| d.confidence != Confidence::Low)
        .collect();
    let total_assets = details.len();
    CoverageAnalysis {
        total_assets,
        covered_assets: covered.len(),
        coverage_by_count: if total_assets == 0 {
            0.0
        } else {
            covered.len() as f64 / total_assets as f64
        },
        coverage_by_weight: covered.iter().map(|d| d.weight).sum(),
        unknown_assets: details
            .iter()
            .filter(|d| d.confidence == Confidence::Low)
            .map(|d| d.ticker.clone())
            .collect(),
    }
}

/// Plain-language reading of an annualized volatility
pub fn interpret(volatility: f64) -> VolatilityInterpretation {
    let (risk_level, description) = if volatility < 0.05 {
        ("Very Low", "Extremely conservative portfolio (likely heavy in treasury bonds/cash)")
    } else if volatility < 0.12 {
        (
            "Very Low",
            "Conservative portfolio with relatively stable returns. Suitable for risk-averse investors approaching retirement.",
        )
    } else if volatility < 0.18 {
        (
            "Low",
            "Balanced portfolio with modest volatility. Good for long-term wealth building with lower risk tolerance.",
        )
    } else if volatility < 0.25 {
        (
            "Moderate",
            "Standard diversified portfolio volatility. Appropriate for most long-term investors with moderate risk tolerance.",
        )
    } else if volatility < 0.35 {
        (
            "High",
            "Higher volatility portfolio with growth potential. Suitable for younger investors with longer time horizons.",
        )
    } else if volatility < 0.50 {
        (
            "Very High",
            "High-risk portfolio with significant volatility. Consider if you have high risk tolerance and long investment timeline.",
        )
    } else if volatility < 0.70 {
        ("Very High", "Very high volatility portfolio (likely includes crypto/leveraged instruments)")
    } else {
        ("Very High", "Extreme volatility portfolio (crypto-heavy or highly leveraged)")
    };

    let pct = volatility * 100.0;
    VolatilityInterpretation {
        risk_level: risk_level.to_string(),
        description: description.to_string(),
        annual_volatility_pct: format!("{:.1}%", pct),
        volatility_range: VolatilityRange {
            one_sigma_range: format!("±{:.1}%", pct),
            two_sigma_range: format!("±{:.1}%", pct * 2.0),
            description: format!("68% chance annual returns fall within ±{:.1}%", pct),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volatility::AssetVolatility;
    use ndarray::array;
    use std::collections::HashMap;

    fn lookup(entries: &[(&str, f64, Confidence)]) -> HashMap<String, AssetVolatility> {
        entries
            .iter()
            .map(|(t, v, c)| {
                (
                    t.to_string(),
                    AssetVolatility {
                        volatility: *v,
                        confidence: *c,
                        source: "test".to_string(),
                        asset_type: AssetType::Etf,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_assumption_blend() {
        let basket = Basket::from_pairs(&[("SPY", 0.6), ("AGG", 0.4)]).unwrap();
        let vols = lookup(&[("SPY", 0.15, Confidence::High), ("AGG", 0.04, Confidence::High)]);
        let result = VolatilityAggregator::default().aggregate(&basket, &vols, None, None).unwrap();

        let expected = (0.09f64.powi(2) + 0.016f64.powi(2) + 2.0 * 0.09 * 0.016 * 0.6).sqrt();
        assert!((result.diversified_volatility - expected).abs() < 1e-12);
        assert!((result.weighted_average_volatility - 0.106).abs() < 1e-12);
        assert_eq!(result.correlation_method, "Assumption (0.6 correlation)");
        assert_eq!(result.learned_multiplier, 1.0);
        assert_eq!(result.labels.ml_adjustment, "1.00x");
        assert_eq!(result.confidence, Confidence::High);
        assert_eq!(result.forecast.len(), DEFAULT_FORECAST_DAYS);
    }

    #[test]
    fn test_real_matrix_with_missing_pair() {
        let basket = Basket::from_pairs(&[("A", 1.0), ("B", 1.0), ("C", 1.0)]).unwrap();
        let vols = lookup(&[
            ("A", 0.2, Confidence::Medium),
            ("B", 0.2, Confidence::Medium),
            ("C", 0.2, Confidence::Low),
        ]);
        let matrix = CorrelationMatrix::from_values(
            vec!["A".into(), "B".into()],
            array![[1.0, 0.0], [0.0, 1.0]],
        )
        .unwrap();

        let result = VolatilityAggregator::default()
            .aggregate(&basket, &vols, Some(&matrix), None)
            .unwrap();
        assert_eq!(result.correlation_method, REAL_CORRELATION_METHOD);

        // A-B uncorrelated, pairs with C fall back to 0.6
        let w: f64 = 1.0 / 3.0;
        let s: f64 = 0.2;
        let var = 3.0 * (w * s).powi(2) + 4.0 * w * w * s * s * 0.6;
        assert!((result.diversified_volatility - var.sqrt()).abs() < 1e-12);
        assert_eq!(result.confidence, Confidence::Low);
        assert_eq!(result.coverage.unknown_assets, vec!["C".to_string()]);
    }

    #[test]
    fn test_all_undefined_matrix_uses_assumption() {
        let basket = Basket::from_pairs(&[("SPY", 0.6), ("CASH", 0.4)]).unwrap();
        let vols = lookup(&[("SPY", 0.15, Confidence::High), ("CASH", 0.01, Confidence::High)]);
        let matrix = CorrelationMatrix::from_values(
            vec!["SPY".into(), "CASH".into()],
            array![[1.0, f64::NAN], [f64::NAN, 1.0]],
        )
        .unwrap();

        let aggregator = VolatilityAggregator::default();
        let with_matrix = aggregator.aggregate(&basket, &vols, Some(&matrix), None).unwrap();
        let assumed = aggregator.aggregate(&basket, &vols, None, None).unwrap();
        assert_eq!(with_matrix.correlation_method, "Assumption (0.6 correlation)");
        assert_eq!(with_matrix.diversified_volatility, assumed.diversified_volatility);
    }

    #[test]
    fn test_learned_multiplier_is_clipped() {
        let aggregator = VolatilityAggregator::default();
        assert_eq!(aggregator.learned_multiplier(0.10, Some(0.50)), 1.15);
        assert_eq!(aggregator.learned_multiplier(0.10, Some(0.01)), 0.85);
        assert!((aggregator.learned_multiplier(0.10, Some(0.105)) - 1.05).abs() < 1e-12);
        assert_eq!(aggregator.learned_multiplier(0.10, Some(f64::NAN)), 1.0);
        assert_eq!(aggregator.learned_multiplier(0.0, Some(0.2)), 1.0);
    }

    #[test]
    fn test_missing_estimate_is_malformed() {
        let basket = Basket::from_pairs(&[("SPY", 1.0), ("XYZ", 1.0)]).unwrap();
        let vols = lookup(&[("SPY", 0.15, Confidence::High)]);
        let err = VolatilityAggregator::default().aggregate(&basket, &vols, None, None).unwrap_err();
        assert!(err.to_string().contains("XYZ"));
    }

    #[test]
    fn test_interpretation_bands() {
        assert_eq!(interpret(0.03).risk_level, "Very Low");
        assert_eq!(interpret(0.15).risk_level, "Low");
        assert_eq!(interpret(0.20).risk_level, "Moderate");
        assert_eq!(interpret(0.60).risk_level, "Very High");
        assert_eq!(interpret(0.20).volatility_range.two_sigma_range, "±40.0%");
    }

    #[test]
    fn test_confidence_rollup() {
        let dist = ConfidenceDistribution { high: 0.5, medium: 0.4, low: 0.1 };
        assert_eq!(rollup_confidence(&dist), Confidence::Medium);
        let dist = ConfidenceDistribution { high: 0.5, medium: 0.2, low: 0.3 };
        assert_eq!(rollup_confidence(&dist), Confidence::Low);
    }
}
