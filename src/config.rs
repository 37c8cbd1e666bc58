use crate::correlation::CorrelationAnalyzer;
use crate::portfolio_volatility::VolatilityAggregator;
use crate::returns::ReturnsAggregator;
use crate::scenarios::{ReportOptions, Scenario, canonical_scenarios, scenario_by_id};
use crate::stats::RiskMetricsCalculator;
use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub run: RunConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_min_scenario_observations")]
    pub min_scenario_observations: usize,
    #[serde(default = "default_min_correlation_observations")]
    pub min_correlation_observations: usize,
    #[serde(default = "default_correlation_lookback_days")]
    pub correlation_lookback_days: usize,
    #[serde(default = "default_lookback_buffer_days")]
    pub lookback_buffer_days: i64,
    #[serde(default = "default_fallback_correlation")]
    pub fallback_correlation: f64,
    #[serde(default = "default_adjustment_floor")]
    pub adjustment_floor: f64,
    #[serde(default = "default_adjustment_ceiling")]
    pub adjustment_ceiling: f64,
    #[serde(default = "default_periods_per_year")]
    pub periods_per_year: f64,
    #[serde(default = "default_forecast_days")]
    pub forecast_days: usize,
    #[serde(default = "default_realized_min_prices")]
    pub realized_min_prices: usize,
    #[serde(default = "default_realized_high_confidence_prices")]
    pub realized_high_confidence_prices: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_scenario_observations: default_min_scenario_observations(),
            min_correlation_observations: default_min_correlation_observations(),
            correlation_lookback_days: default_correlation_lookback_days(),
            lookback_buffer_days: default_lookback_buffer_days(),
            fallback_correlation: default_fallback_correlation(),
            adjustment_floor: default_adjustment_floor(),
            adjustment_ceiling: default_adjustment_ceiling(),
            periods_per_year: default_periods_per_year(),
            forecast_days: default_forecast_days(),
            realized_min_prices: default_realized_min_prices(),
            realized_high_confidence_prices: default_realized_high_confidence_prices(),
        }
    }
}

impl AnalysisConfig {
    pub fn returns_aggregator(&self) -> ReturnsAggregator {
        ReturnsAggregator::new(self.min_scenario_observations)
    }

    pub fn metrics_calculator(&self) -> RiskMetricsCalculator {
        RiskMetricsCalculator::new(self.periods_per_year)
    }

    pub fn correlation_analyzer(&self) -> CorrelationAnalyzer {
        CorrelationAnalyzer::new(
            self.correlation_lookback_days,
            self.lookback_buffer_days,
            self.min_correlation_observations,
        )
    }

    pub fn volatility_aggregator(&self) -> VolatilityAggregator {
        VolatilityAggregator::new(
            self.fallback_correlation,
            self.adjustment_floor,
            self.adjustment_ceiling,
            self.forecast_days,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_seconds: default_ttl_seconds(),
        }
    }
}

impl CacheConfig {
    /// Zero when caching is switched off
    pub fn ttl(&self) -> Duration {
        if self.enabled {
            Duration::from_secs(self.ttl_seconds)
        } else {
            Duration::ZERO
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_price_dir")]
    pub price_dir: PathBuf,
    #[serde(default = "default_fetch_timeout_seconds")]
    pub fetch_timeout_seconds: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            price_dir: default_price_dir(),
            fetch_timeout_seconds: default_fetch_timeout_seconds(),
        }
    }
}

impl SourceConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_basket_file")]
    pub basket_file: PathBuf,
    /// Canonical scenario ids to run
    #[serde(default = "default_scenario_ids")]
    pub scenarios: Vec<String>,
    /// Additional ad-hoc windows
    #[serde(default)]
    pub custom_scenarios: Vec<Scenario>,
    #[serde(default)]
    pub options: ReportOptions,
    #[serde(default = "default_use_correlation")]
    pub use_correlation: bool,
    /// External point estimate fed to the learned adjustment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learned_volatility: Option<f64>,
    /// Analysis date for correlation and realized volatility; today when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_of: Option<NaiveDate>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            basket_file: default_basket_file(),
            scenarios: default_scenario_ids(),
            custom_scenarios: Vec::new(),
            options: ReportOptions::default(),
            use_correlation: default_use_correlation(),
            learned_volatility: None,
            as_of: None,
        }
    }
}

impl RunConfig {
    /// Look up the configured ids and append the custom windows
    pub fn resolve_scenarios(&self) -> Result<Vec<Scenario>> {
        let mut scenarios = Vec::with_capacity(self.scenarios.len() + self.custom_scenarios.len());
        for id in &self.scenarios {
            match scenario_by_id(id) {
                Some(scenario) => scenarios.push(scenario),
                None => bail!("unknown scenario id '{}'", id),
            }
        }
        for custom in &self.custom_scenarios {
            let scenario = Scenario::new(custom.id.clone(), custom.label.clone(), custom.start, custom.end)
                .with_context(|| format!("invalid custom scenario '{}'", custom.id))?;
            scenarios.push(scenario);
        }
        Ok(scenarios)
    }
}

fn default_min_scenario_observations() -> usize {
    10
}

fn default_min_correlation_observations() -> usize {
    30
}

fn default_correlation_lookback_days() -> usize {
    252 // one trading year
}

fn default_lookback_buffer_days() -> i64 {
    50 // calendar days fetched beyond the lookback for weekends and holidays
}

fn default_fallback_correlation() -> f64 {
    0.6
}

fn default_adjustment_floor() -> f64 {
    0.85
}

fn default_adjustment_ceiling() -> f64 {
    1.15
}

fn default_periods_per_year() -> f64 {
    252.0
}

fn default_forecast_days() -> usize {
    20
}

fn default_realized_min_prices() -> usize {
    30
}

fn default_realized_high_confidence_prices() -> usize {
    200
}

fn default_cache_enabled() -> bool {
    true
}

fn default_ttl_seconds() -> u64 {
    3600
}

fn default_price_dir() -> PathBuf {
    PathBuf::from("data/prices")
}

fn default_fetch_timeout_seconds() -> u64 {
    10
}

fn default_basket_file() -> PathBuf {
    PathBuf::from("portfolio.csv")
}

fn default_scenario_ids() -> Vec<String> {
    canonical_scenarios().into_iter().map(|s| s.id).collect()
}

fn default_use_correlation() -> bool {
    true
}

impl EngineConfig {
    pub fn load() -> Result<Self> {
        Self::load_from_file("config.json")
    }

    /// Read a JSON config; a missing file yields the defaults
    pub fn load_from_file(path: &str) -> Result<Self> {
        let config = match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str::<EngineConfig>(&contents)
                .with_context(|| format!("failed to parse config file {}", path))?,
            Err(err) => {
                warn!("Config file {} not readable ({}); using defaults", path, err);
                EngineConfig::default()
            }
        };
        config.validate()?;
        info!("Loaded configuration from {}", path);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let analysis = &self.analysis;
        if analysis.adjustment_floor > analysis.adjustment_ceiling {
            bail!(
                "adjustment_floor {} exceeds adjustment_ceiling {}",
                analysis.adjustment_floor,
                analysis.adjustment_ceiling
            );
        }
        if analysis.adjustment_floor <= 0.0 {
            bail!("adjustment_floor must be positive, got {}", analysis.adjustment_floor);
        }
        if !(-1.0..=1.0).contains(&analysis.fallback_correlation) {
            bail!(
                "fallback_correlation must lie in [-1, 1], got {}",
                analysis.fallback_correlation
            );
        }
        if analysis.min_scenario_observations < 2 {
            bail!("min_scenario_observations must be at least 2");
        }
        if analysis.min_correlation_observations < 2 {
            bail!("min_correlation_observations must be at least 2");
        }
        if analysis.correlation_lookback_days == 0 {
            bail!("correlation_lookback_days must be positive");
        }
        if analysis.lookback_buffer_days < 0 {
            bail!("lookback_buffer_days must not be negative");
        }
        if analysis.periods_per_year <= 0.0 {
            bail!("periods_per_year must be positive");
        }
        if analysis.realized_min_prices >= analysis.realized_high_confidence_prices {
            bail!(
                "realized_min_prices {} must be below realized_high_confidence_prices {}",
                analysis.realized_min_prices,
                analysis.realized_high_confidence_prices
            );
        }
        if self.source.fetch_timeout_seconds == 0 {
            bail!("fetch_timeout_seconds must be positive");
        }
        if let Some(estimate) = self.run.learned_volatility {
            if !estimate.is_finite() || estimate <= 0.0 {
                bail!("learned_volatility must be a positive number, got {}", estimate);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = EngineConfig::load_from_file("/nonexistent/portfolio-risk.json").unwrap();
        assert_eq!(config.analysis.min_scenario_observations, 10);
        assert_eq!(config.analysis.correlation_lookback_days, 252);
        assert_eq!(config.cache.ttl(), Duration::from_secs(3600));
        assert_eq!(config.run.scenarios.len(), 4);
        assert!(config.run.options.include_correlation);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"analysis": {{"fallback_correlation": 0.5}}, "run": {{"scenarios": ["gfc"], "options": {{"rebalance": "monthly", "benchmarks": ["60_40"]}}}}}}"#
        )
        .unwrap();

        let config = EngineConfig::load_from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.analysis.fallback_correlation, 0.5);
        assert_eq!(config.analysis.adjustment_ceiling, 1.15);
        assert_eq!(config.run.options.benchmarks, vec!["60_40".to_string()]);

        let scenarios = config.run.resolve_scenarios().unwrap();
        assert_eq!(scenarios.len(), 1);
        assert_eq!(scenarios[0].id, "gfc");
    }

    #[test]
    fn test_validate_rejects_inverted_clip() {
        let mut config = EngineConfig::default();
        config.analysis.adjustment_floor = 1.2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_scenario_id() {
        let mut config = EngineConfig::default();
        config.run.scenarios = vec!["tulip_mania".to_string()];
        assert!(config.run.resolve_scenarios().is_err());
    }

    #[test]
    fn test_disabled_cache_has_zero_ttl() {
        let config = CacheConfig {
            enabled: false,
            ttl_seconds: 60,
        };
        assert_eq!(config.ttl(), Duration::ZERO);
    }
}
