//! Colour-coded severity bands shared by the correlation, concentration and
//! overall risk outputs.

use serde::{Serialize, Serializer};

pub const UNKNOWN_COLOR: &str = "#6c757d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RiskBand {
    VeryLow,
    Low,
    Moderate,
    High,
    VeryHigh,
    Unknown,
}

impl RiskBand {
    pub fn label(&self) -> &'static str {
        match self {
            RiskBand::VeryLow => "Very Low",
            RiskBand::Low => "Low",
            RiskBand::Moderate => "Moderate",
            RiskBand::High => "High",
            RiskBand::VeryHigh => "Very High",
            RiskBand::Unknown => "Unknown",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            RiskBand::VeryHigh => "#dc3545",
            RiskBand::High => "#fd7e14",
            RiskBand::Moderate => "#ffc107",
            RiskBand::Low => "#20c997",
            RiskBand::VeryLow => "#28a745",
            RiskBand::Unknown => UNKNOWN_COLOR,
        }
    }

    /// Band for a pairwise correlation
    pub fn for_correlation(correlation: f64) -> Self {
        if correlation.is_nan() {
            RiskBand::Unknown
        } else if correlation >= 0.8 {
            RiskBand::VeryHigh
        } else if correlation >= 0.6 {
            RiskBand::High
        } else if correlation >= 0.4 {
            RiskBand::Moderate
        } else if correlation >= 0.2 {
            RiskBand::Low
        } else {
            RiskBand::VeryLow
        }
    }

    /// Band for a Herfindahl-Hirschman index
    pub fn for_hhi(hhi: f64) -> Self {
        if hhi >= 0.25 {
            RiskBand::VeryHigh
        } else if hhi >= 0.15 {
            RiskBand::High
        } else if hhi >= 0.10 {
            RiskBand::Moderate
        } else if hhi >= 0.05 {
            RiskBand::Low
        } else {
            RiskBand::VeryLow
        }
    }

    /// Band for a 0-100 composite risk score
    pub fn for_risk_score(score: u32) -> Self {
        match score {
            80.. => RiskBand::VeryHigh,
            60..=79 => RiskBand::High,
            40..=59 => RiskBand::Moderate,
            20..=39 => RiskBand::Low,
            _ => RiskBand::VeryLow,
        }
    }

    pub fn correlation_description(&self) -> &'static str {
        match self {
            RiskBand::VeryHigh => "High concentration risk - consider diversifying",
            RiskBand::High => "Moderate concentration risk - monitor closely",
            RiskBand::Moderate => "Some concentration risk - acceptable for most portfolios",
            RiskBand::Low => "Low concentration risk - good diversification",
            RiskBand::VeryLow => "Very low concentration risk - excellent diversification",
            RiskBand::Unknown => "Correlation analysis unavailable",
        }
    }

    /// Points this band contributes to the correlation half of the overall score
    pub fn correlation_points(&self) -> u32 {
        match self {
            RiskBand::VeryHigh => 40,
            RiskBand::High => 30,
            RiskBand::Moderate => 20,
            RiskBand::Low => 10,
            _ => 0,
        }
    }

    /// Points this band contributes to the concentration half of the overall score
    pub fn concentration_points(&self) -> u32 {
        match self {
            RiskBand::VeryHigh => 60,
            RiskBand::High => 45,
            RiskBand::Moderate => 30,
            RiskBand::Low => 15,
            _ => 0,
        }
    }
}

impl Serialize for RiskBand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl std::fmt::Display for RiskBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_band_edges() {
        assert_eq!(RiskBand::for_correlation(0.8), RiskBand::VeryHigh);
        assert_eq!(RiskBand::for_correlation(0.79), RiskBand::High);
        assert_eq!(RiskBand::for_correlation(0.4), RiskBand::Moderate);
        assert_eq!(RiskBand::for_correlation(0.2), RiskBand::Low);
        assert_eq!(RiskBand::for_correlation(-0.5), RiskBand::VeryLow);
        assert_eq!(RiskBand::for_correlation(f64::NAN), RiskBand::Unknown);
    }

    #[test]
    fn test_hhi_band_edges() {
        assert_eq!(RiskBand::for_hhi(1.0), RiskBand::VeryHigh);
        assert_eq!(RiskBand::for_hhi(0.15), RiskBand::High);
        assert_eq!(RiskBand::for_hhi(0.1), RiskBand::Moderate);
        assert_eq!(RiskBand::for_hhi(0.05), RiskBand::Low);
        assert_eq!(RiskBand::for_hhi(0.04), RiskBand::VeryLow);
    }

    #[test]
    fn test_serializes_as_label() {
        let json = serde_json::to_string(&RiskBand::VeryHigh).unwrap();
        assert_eq!(json, "\"Very High\"");
        assert_eq!(RiskBand::for_risk_score(100).color(), "#dc3545");
        assert_eq!(RiskBand::for_risk_score(19), RiskBand::VeryLow);
    }
}
