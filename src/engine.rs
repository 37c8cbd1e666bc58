//! Entry points tying the pipeline stages together.

use crate::basket::{Basket, PortfolioSummary};
use crate::config::EngineConfig;
use crate::correlation::CorrelationReport;
use crate::error::Result;
use crate::market_data::{PriceRequest, PriceSeriesSource};
use crate::portfolio_volatility::{LearnedVolatilityModel, PortfolioVolatility};
use crate::risk_report::{self, Recommendation, RiskAssessment};
use crate::scenarios::{
    PortfolioCoverage, ReportOptions, Scenario, ScenarioOrchestrator, ScenarioOutcome, benchmark_basket,
};
use crate::volatility::{
    AssetClassPattern, KnownAssetTable, RealizedVolatility, VolatilityEstimator, VolatilityLookup,
};
use chrono::{DateTime, NaiveDate, Utc};
use log::{info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskReport {
    pub portfolio_coverage: PortfolioCoverage,
    pub scenarios: Vec<ScenarioOutcome>,
    pub benchmarks: BTreeMap<String, Vec<ScenarioOutcome>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation: Option<CorrelationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_assessment: Option<RiskAssessment>,
    pub recommendations: Vec<Recommendation>,
    pub portfolio_summary: PortfolioSummary,
    pub generated_at: DateTime<Utc>,
    pub options: ReportOptions,
}

pub struct RiskEngine {
    source: Arc<dyn PriceSeriesSource>,
    config: EngineConfig,
    as_of: NaiveDate,
}

impl RiskEngine {
    pub fn new(source: Arc<dyn PriceSeriesSource>, config: EngineConfig) -> Self {
        let as_of = config.run.as_of.unwrap_or_else(|| Utc::now().date_naive());
        Self { source, config, as_of }
    }

    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = as_of;
        self
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn orchestrator(&self) -> ScenarioOrchestrator {
        ScenarioOrchestrator::new(
            self.config.analysis.returns_aggregator(),
            self.config.analysis.metrics_calculator(),
        )
    }

    pub fn compute_risk_report(
        &self,
        basket: &Basket,
        scenarios: &[Scenario],
        options: &ReportOptions,
    ) -> Result<RiskReport> {
        info!(
            "Computing risk report for {} assets across {} scenarios",
            basket.len(),
            scenarios.len()
        );
        let orchestrator = self.orchestrator();
        let source = self.source.as_ref();

        let outcomes = orchestrator.run_scenarios(basket, source, scenarios, options.rebalance);
        let portfolio_coverage = orchestrator.portfolio_coverage(basket, &outcomes);
        let benchmarks = orchestrator.run_benchmarks(&options.benchmarks, source, scenarios, options.rebalance);

        let (correlation, risk_assessment, recommendations) = if options.include_correlation {
            let report = self.compute_correlation_report(basket);
            let assessment = risk_report::assess(&report);
            let recommendations = risk_report::recommendations(&report);
            (Some(report), Some(assessment), recommendations)
        } else {
            (None, None, Vec::new())
        };

        Ok(RiskReport {
            portfolio_coverage,
            scenarios: outcomes,
            benchmarks,
            correlation,
            risk_assessment,
            recommendations,
            portfolio_summary: basket.summary(),
            generated_at: Utc::now(),
            options: options.clone(),
        })
    }

    pub fn compute_correlation_report(&self, basket: &Basket) -> CorrelationReport {
        self.config
            .analysis
            .correlation_analyzer()
            .analyze(basket, self.source.as_ref(), self.as_of)
    }

    pub fn compute_portfolio_volatility(
        &self,
        basket: &Basket,
        lookup: &dyn VolatilityLookup,
        use_correlation: bool,
        model: Option<&dyn LearnedVolatilityModel>,
    ) -> Result<PortfolioVolatility> {
        let report = (use_correlation && basket.len() >= 2).then(|| self.compute_correlation_report(basket));
        let matrix = report.as_ref().and_then(|r| r.matrix());
        if let Some(reason) = report.as_ref().and_then(|r| r.unavailable) {
            warn!("{}; falling back to assumed correlation", reason.to_error());
        }

        let learned = model.and_then(|m| {
            let estimate = m.predict(basket);
            info!("Learned model {} estimate: {:?}", m.name(), estimate);
            estimate
        });

        self.config
            .analysis
            .volatility_aggregator()
            .aggregate(basket, lookup, matrix, learned)
    }

    /// Per-asset estimator wired to this engine's source and thresholds
    pub fn volatility_estimator(&self) -> VolatilityEstimator {
        let analysis = &self.config.analysis;
        VolatilityEstimator::new(
            vec![
                Box::new(
                    RealizedVolatility::new(Arc::clone(&self.source), self.as_of)
                        .with_thresholds(analysis.realized_min_prices, analysis.realized_high_confidence_prices),
                ),
                Box::new(KnownAssetTable),
                Box::new(AssetClassPattern),
            ],
            self.config.cache.ttl(),
        )
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.config.source.fetch_timeout()
    }

    /// Every (ticker, range) a full run will ask the source for
    pub fn plan_price_requests(
        &self,
        basket: &Basket,
        scenarios: &[Scenario],
        options: &ReportOptions,
    ) -> Vec<PriceRequest> {
        let mut tickers = basket.tickers();
        for id in &options.benchmarks {
            if let Ok(benchmark) = benchmark_basket(id) {
                tickers.extend(benchmark.tickers());
            }
        }

        let mut windows: Vec<(NaiveDate, NaiveDate)> = scenarios.iter().map(|s| (s.start, s.end)).collect();
        windows.push(self.config.analysis.correlation_analyzer().window(self.as_of));
        windows.push(RealizedVolatility::new(Arc::clone(&self.source), self.as_of).window());

        let mut seen = HashSet::new();
        let mut requests = Vec::new();
        for ticker in &tickers {
            for (start, end) in &windows {
                let request = PriceRequest::new(ticker.clone(), *start, *end);
                if seen.insert(request.clone()) {
                    requests.push(request);
                }
            }
        }
        requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::InMemoryPriceSource;
    use crate::portfolio_volatility::StaticEstimateModel;
    use crate::returns::RebalancePolicy;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn engine() -> RiskEngine {
        RiskEngine::new(Arc::new(InMemoryPriceSource::new()), EngineConfig::default()).with_as_of(d(2024, 6, 28))
    }

    #[test]
    fn test_plan_covers_benchmarks_and_windows() {
        let basket = Basket::single("VTI").unwrap();
        let scenarios = vec![Scenario::new("x", "X", d(2020, 1, 1), d(2020, 12, 31)).unwrap()];
        let options = ReportOptions {
            benchmarks: vec!["60_40".to_string()],
            ..ReportOptions::default()
        };
        let requests = engine().plan_price_requests(&basket, &scenarios, &options);
        // 3 tickers x (scenario + correlation window + realized window)
        assert_eq!(requests.len(), 9);
        assert!(requests.iter().any(|r| r.ticker == "AGG" && r.start == d(2020, 1, 1)));
    }

    #[test]
    fn test_report_without_data_isolates_failures() {
        let basket = Basket::from_pairs(&[("SPY", 0.6), ("AGG", 0.4)]).unwrap();
        let scenarios = vec![Scenario::new("x", "X", d(2020, 1, 1), d(2020, 12, 31)).unwrap()];
        let options = ReportOptions {
            rebalance: RebalancePolicy::Monthly,
            ..ReportOptions::default()
        };
        let report = engine().compute_risk_report(&basket, &scenarios, &options).unwrap();
        assert_eq!(report.scenarios.len(), 1);
        assert!(!report.scenarios[0].is_ok());
        assert_eq!(report.portfolio_coverage.overall, 0.0);
        assert!(report.correlation.is_some());
        assert!(!report.recommendations.is_empty());
    }

    #[test]
    fn test_volatility_with_learned_model() {
        let basket = Basket::from_pairs(&[("SPY", 0.6), ("AGG", 0.4)]).unwrap();
        let engine = engine();
        let estimator = engine.volatility_estimator();
        let model = StaticEstimateModel::new(1.0);
        let result = engine
            .compute_portfolio_volatility(&basket, &estimator, true, Some(&model))
            .unwrap();
        assert_eq!(result.correlation_method, "Assumption (0.6 correlation)");
        assert_eq!(result.learned_multiplier, 1.15);
        assert!((result.portfolio_volatility - result.diversified_volatility * 1.15).abs() < 1e-12);
    }
}
