//! Overall risk grade, key concerns and recommendations derived from a
//! correlation and concentration analysis.

use crate::bands::RiskBand;
use crate::correlation::CorrelationReport;
use crate::diversification::DiversificationScore;
use crate::security_types::is_fund_like;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    pub overall_risk_level: RiskBand,
    pub risk_score: u32,
    pub risk_color: String,
    pub key_concerns: Vec<String>,
    pub diversification_score: DiversificationScore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    SingleAsset,
    Correlation,
    Concentration,
    SingleHolding,
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub kind: RecommendationType,
    pub priority: Priority,
    pub title: String,
    pub description: String,
    pub action: String,
}

impl Recommendation {
    fn new(kind: RecommendationType, priority: Priority, title: &str, description: String, action: &str) -> Self {
        Self {
            kind,
            priority,
            title: title.to_string(),
            description,
            action: action.to_string(),
        }
    }
}

fn percent(fraction: f64) -> String {
    format!("{:.1}%", fraction * 100.0)
}

/// Correlation points plus concentration points, banded 0-100
pub fn overall_risk(report: &CorrelationReport) -> (RiskBand, u32) {
    let score = report.most_correlated_pair.correlation_level.correlation_points()
        + report.concentration_metrics.concentration_level.concentration_points();
    (RiskBand::for_risk_score(score), score)
}

pub fn key_concerns(report: &CorrelationReport) -> Vec<String> {
    if report.single_asset_portfolio {
        return vec![
            "Single asset portfolio - high concentration risk".to_string(),
            "No diversification benefits - consider adding more assets".to_string(),
        ];
    }

    let mut concerns = Vec::new();
    let pair = &report.most_correlated_pair;
    if report.success {
        if pair.correlation >= 0.8 {
            concerns.push(format!(
                "Very high correlation ({}) between {} and {}",
                percent(pair.correlation),
                pair.asset1,
                pair.asset2
            ));
        } else if pair.correlation >= 0.6 {
            concerns.push(format!(
                "High correlation ({}) between {} and {}",
                percent(pair.correlation),
                pair.asset1,
                pair.asset2
            ));
        }
    }

    let concentration = &report.concentration_metrics;
    if concentration.hhi >= 0.25 {
        concerns.push(format!("Very high portfolio concentration (HHI: {:.3})", concentration.hhi));
    } else if concentration.hhi >= 0.15 {
        concerns.push(format!("High portfolio concentration (HHI: {:.3})", concentration.hhi));
    }

    let largest = &concentration.largest_holding;
    if largest.percentage >= 20.0 {
        concerns.push(format!("Large single holding: {} at {:.1}%", largest.ticker, largest.percentage));
    } else if largest.percentage >= 10.0 {
        concerns.push(format!(
            "Significant single holding: {} at {:.1}%",
            largest.ticker, largest.percentage
        ));
    }

    if concentration.top_3_concentration >= 0.6 {
        concerns.push(format!(
            "Top 3 holdings represent {} of portfolio",
            percent(concentration.top_3_concentration)
        ));
    }

    if concerns.is_empty() {
        concerns.push("No significant risk concerns identified".to_string());
    }
    concerns
}

pub fn assess(report: &CorrelationReport) -> RiskAssessment {
    let (band, score) = overall_risk(report);
    RiskAssessment {
        overall_risk_level: band,
        risk_score: score,
        risk_color: band.color().to_string(),
        key_concerns: key_concerns(report),
        diversification_score: report.diversification.clone(),
    }
}

fn single_asset_recommendations(report: &CorrelationReport) -> Vec<Recommendation> {
    let mut recommendations = vec![Recommendation::new(
        RecommendationType::SingleAsset,
        Priority::High,
        "Add Portfolio Diversification",
        "Single asset portfolios carry high concentration risk and offer no diversification benefits.".to_string(),
        "Consider adding 5-10 additional assets across different sectors and asset classes",
    )];

    let holding = &report.concentration_metrics.largest_holding.ticker;
    if is_fund_like(holding) {
        recommendations.push(Recommendation::new(
            RecommendationType::SingleAsset,
            Priority::Medium,
            "Consider Additional ETFs",
            format!(
                "While {} is already an ETF, single ETF positions still lack diversification.",
                holding
            ),
            "Consider adding complementary ETFs like international (EFA, EEM), bonds (AGG, BND), or sector-specific ETFs",
        ));
    } else {
        recommendations.push(Recommendation::new(
            RecommendationType::SingleAsset,
            Priority::Medium,
            "Consider Index Funds or ETFs",
            "Single stock positions are inherently risky compared to diversified funds.".to_string(),
            "Consider replacing with broad market ETFs like VTI, VOO, or sector-specific ETFs",
        ));
    }
    recommendations
}

pub fn recommendations(report: &CorrelationReport) -> Vec<Recommendation> {
    if report.single_asset_portfolio {
        return single_asset_recommendations(report);
    }

    let mut recommendations = Vec::new();
    let pair = &report.most_correlated_pair;
    if report.success {
        if pair.correlation >= 0.8 {
            recommendations.push(Recommendation::new(
                RecommendationType::Correlation,
                Priority::High,
                "Consider Reducing Correlation",
                format!(
                    "Very high correlation ({}) between {} and {}. Consider replacing one with a less correlated asset.",
                    percent(pair.correlation),
                    pair.asset1,
                    pair.asset2
                ),
                "Review and potentially replace one of the highly correlated assets",
            ));
        } else if pair.correlation >= 0.6 {
            recommendations.push(Recommendation::new(
                RecommendationType::Correlation,
                Priority::Medium,
                "Monitor Correlation",
                format!(
                    "High correlation ({}) between {} and {}. Monitor for concentration risk.",
                    percent(pair.correlation),
                    pair.asset1,
                    pair.asset2
                ),
                "Consider adding assets with lower correlation to these holdings",
            ));
        }
    }

    let hhi = report.concentration_metrics.hhi;
    if hhi >= 0.25 {
        recommendations.push(Recommendation::new(
            RecommendationType::Concentration,
            Priority::High,
            "Reduce Portfolio Concentration",
            format!(
                "Very high concentration (HHI: {:.3}). Portfolio is heavily concentrated in few assets.",
                hhi
            ),
            "Consider adding more assets to improve diversification",
        ));
    } else if hhi >= 0.15 {
        recommendations.push(Recommendation::new(
            RecommendationType::Concentration,
            Priority::Medium,
            "Monitor Concentration",
            format!("High concentration (HHI: {:.3}). Consider adding more diversification.", hhi),
            "Review if additional assets would improve portfolio balance",
        ));
    }

    let largest = &report.concentration_metrics.largest_holding;
    if largest.percentage >= 20.0 {
        recommendations.push(Recommendation::new(
            RecommendationType::SingleHolding,
            Priority::High,
            "Reduce Largest Holding",
            format!(
                "{} represents {:.1}% of portfolio - very high single position risk.",
                largest.ticker, largest.percentage
            ),
            "Consider reducing position size to improve diversification",
        ));
    } else if largest.percentage >= 10.0 {
        recommendations.push(Recommendation::new(
            RecommendationType::SingleHolding,
            Priority::Medium,
            "Monitor Largest Holding",
            format!(
                "{} represents {:.1}% of portfolio - significant single position.",
                largest.ticker, largest.percentage
            ),
            "Monitor position size and consider rebalancing if it grows",
        ));
    }

    if recommendations.is_empty() {
        recommendations.push(Recommendation::new(
            RecommendationType::General,
            Priority::Low,
            "Portfolio Looks Well Diversified",
            "No significant concentration or correlation risks identified.".to_string(),
            "Continue monitoring and rebalancing as needed",
        ));
    }
    recommendations
}
