use crate::basket::Basket;
use crate::rounding;
use crate::security_types::HoldingCategory;
use serde::{Serialize, Serializer};

/// Base score granted to any one-asset portfolio before its category bonus
const SINGLE_ASSET_BASE_SCORE: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiversificationLevel {
    Excellent,
    VeryGood,
    Good,
    Fair,
    Poor,
    VeryPoor,
    Minimal,
}

impl DiversificationLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 85.0 {
            DiversificationLevel::Excellent
        } else if score >= 70.0 {
            DiversificationLevel::VeryGood
        } else if score >= 55.0 {
            DiversificationLevel::Good
        } else if score >= 40.0 {
            DiversificationLevel::Fair
        } else if score >= 25.0 {
            DiversificationLevel::Poor
        } else if score >= 10.0 {
            DiversificationLevel::VeryPoor
        } else {
            DiversificationLevel::Minimal
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DiversificationLevel::Excellent => "Excellent",
            DiversificationLevel::VeryGood => "Very Good",
            DiversificationLevel::Good => "Good",
            DiversificationLevel::Fair => "Fair",
            DiversificationLevel::Poor => "Poor",
            DiversificationLevel::VeryPoor => "Very Poor",
            DiversificationLevel::Minimal => "Minimal",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            DiversificationLevel::Excellent => "#28a745",
            DiversificationLevel::VeryGood => "#20c997",
            DiversificationLevel::Good => "#17a2b8",
            DiversificationLevel::Fair => "#ffc107",
            DiversificationLevel::Poor => "#fd7e14",
            DiversificationLevel::VeryPoor => "#dc3545",
            DiversificationLevel::Minimal => "#6c757d",
        }
    }
}

impl Serialize for DiversificationLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// 0-100 diversification grade with its components
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiversificationScore {
    #[serde(serialize_with = "rounding::one_decimal")]
    pub score: f64,
    pub level: DiversificationLevel,
    pub color: String,
    #[serde(serialize_with = "rounding::one_decimal")]
    pub correlation_score: f64,
    #[serde(serialize_with = "rounding::one_decimal")]
    pub concentration_score: f64,
    pub asset_count: usize,
    pub is_single_asset: bool,
    pub explanation: String,
}

/// Piecewise-linear score of an HHI, 100 for a flat book falling to 0
pub fn concentration_score(hhi: f64) -> f64 {
    if hhi <= 0.1 {
        100.0
    } else if hhi <= 0.25 {
        80.0 - (hhi - 0.1) * 200.0
    } else if hhi <= 0.5 {
        60.0 - (hhi - 0.25) * 80.0
    } else {
        (40.0 - (hhi - 0.5) * 80.0).max(0.0)
    }
}

pub fn score_diversification(basket: &Basket, average_correlation: f64, hhi: f64) -> DiversificationScore {
    let asset_count = basket.len();

    if basket.is_single_asset() {
        let ticker = &basket.assets()[0].ticker;
        let score = SINGLE_ASSET_BASE_SCORE + HoldingCategory::of(ticker).diversification_bonus();
        let level = DiversificationLevel::from_score(score);
        return DiversificationScore {
            score,
            level,
            color: level.color().to_string(),
            correlation_score: 0.0,
            concentration_score: 0.0,
            asset_count,
            is_single_asset: true,
            explanation: single_asset_explanation(ticker),
        };
    }

    let average_correlation = if average_correlation.is_finite() { average_correlation } else { 0.0 };
    let correlation_score = (100.0 - average_correlation * 100.0).max(0.0);
    let concentration_score = concentration_score(hhi);
    let asset_count_bonus = (asset_count.saturating_sub(2) as f64 * 2.0).min(10.0);
    let score = (correlation_score * 0.5 + concentration_score * 0.4 + asset_count_bonus).min(100.0);
    let level = DiversificationLevel::from_score(score);

    DiversificationScore {
        score,
        level,
        color: level.color().to_string(),
        correlation_score,
        concentration_score,
        asset_count,
        is_single_asset: false,
        explanation: multi_asset_explanation(asset_count, average_correlation, hhi),
    }
}

fn single_asset_explanation(ticker: &str) -> String {
    match ticker {
        "VTI" | "VOO" | "SPY" | "VT" => format!(
            "Single broad market ETF ({}) - While this provides market exposure, it lacks diversification across asset classes and sectors.",
            ticker
        ),
        "AGG" | "BND" | "TLT" => format!(
            "Single bond ETF ({}) - Provides fixed income exposure but lacks equity diversification.",
            ticker
        ),
        "EFA" | "EEM" | "VEA" | "VWO" => format!(
            "Single international ETF ({}) - Provides geographic diversification but lacks domestic and fixed income exposure.",
            ticker
        ),
        _ => format!(
            "Single asset ({}) - High concentration risk with no diversification benefits.",
            ticker
        ),
    }
}

fn multi_asset_explanation(asset_count: usize, average_correlation: f64, hhi: f64) -> String {
    let count = if asset_count >= 7 {
        format!("Good asset count ({} assets)", asset_count)
    } else if asset_count >= 4 {
        format!("Moderate asset count ({} assets)", asset_count)
    } else {
        format!("Low asset count ({} assets) - consider adding more assets", asset_count)
    };

    let correlation = if average_correlation <= 0.3 {
        "Low correlation between assets (good diversification)"
    } else if average_correlation <= 0.6 {
        "Moderate correlation between assets"
    } else {
        "High correlation between assets (limited diversification)"
    };

    let concentration = if hhi <= 0.1 {
        "Well distributed weights (low concentration)"
    } else if hhi <= 0.25 {
        "Moderately distributed weights"
    } else {
        "Concentrated weights (high concentration risk)"
    };

    [count.as_str(), correlation, concentration].join(" | ")
}
