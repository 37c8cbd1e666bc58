//! Historical stress windows and the per-scenario pipeline.

use crate::basket::{Asset, Basket};
use crate::calendar::business_days_between;
use crate::error::{Result, RiskError};
use crate::market_data::{PriceSeriesSource, fetch_or_empty};
use crate::returns::{PortfolioReturns, RebalancePolicy, ReturnsAggregator};
use crate::rounding;
use crate::stats::{RiskMetrics, RiskMetricsCalculator, ScenarioSeries};
use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SIXTY_FORTY: &str = "60_40";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Scenario {
    pub fn new(id: impl Into<String>, label: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Result<Self> {
        let id = id.into();
        if start > end {
            return Err(RiskError::malformed(format!(
                "scenario '{}' starts {} after it ends {}",
                id, start, end
            )));
        }
        Ok(Self {
            id,
            label: label.into(),
            start,
            end,
        })
    }

    pub fn expected_business_days(&self) -> usize {
        business_days_between(self.start, self.end)
    }

    /// Trading days observed / business days expected, capped at 1
    pub fn coverage_fraction(&self, observed_days: usize) -> f64 {
        let expected = self.expected_business_days();
        if expected == 0 {
            return 0.0;
        }
        (observed_days as f64 / expected as f64).min(1.0)
    }
}

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

/// The built-in crash windows
pub fn canonical_scenarios() -> Vec<Scenario> {
    let table = [
        ("dot_com", "Dot-Com Bust", ymd(2000, 3, 24), ymd(2007, 10, 9)),
        ("gfc", "Global Financial Crisis", ymd(2007, 10, 9), ymd(2013, 3, 28)),
        ("pandemic", "Pandemic Crash", ymd(2020, 2, 19), ymd(2021, 8, 20)),
        ("rate_shock_2022", "2022 Rate Shock", ymd(2022, 1, 1), ymd(2024, 1, 1)),
    ];
    table
        .into_iter()
        .map(|(id, label, start, end)| Scenario {
            id: id.to_string(),
            label: label.to_string(),
            start,
            end,
        })
        .collect()
}

pub fn scenario_by_id(id: &str) -> Option<Scenario> {
    canonical_scenarios().into_iter().find(|s| s.id == id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DriftHandling {
    #[default]
    #[serde(rename = "renormDaily")]
    RenormDaily,
}

fn default_include_correlation() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportOptions {
    #[serde(default)]
    pub rebalance: RebalancePolicy,
    #[serde(default)]
    pub drift_handling: DriftHandling,
    #[serde(default)]
    pub benchmarks: Vec<String>,
    #[serde(default = "default_include_correlation")]
    pub include_correlation: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            rebalance: RebalancePolicy::None,
            drift_handling: DriftHandling::RenormDaily,
            benchmarks: Vec::new(),
            include_correlation: true,
        }
    }
}

/// Basket for a benchmark id: the 60/40 mix or a single ticker
pub fn benchmark_basket(id: &str) -> Result<Basket> {
    if id.trim() == SIXTY_FORTY {
        Basket::new(vec![Asset::new("SPY", 0.6), Asset::new("AGG", 0.4)])
    } else {
        Basket::single(id)
    }
}

/// Successful scenario computation
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioResult {
    pub metrics: RiskMetrics,
    pub series: ScenarioSeries,
    pub coverage: f64,
    pub ticker_coverage: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioState {
    Pending,
    Computing,
    Succeeded(Box<ScenarioResult>),
    Failed(String),
}

impl ScenarioState {
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioState::Pending => "pending",
            ScenarioState::Computing => "computing",
            ScenarioState::Succeeded(_) => "succeeded",
            ScenarioState::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ScenarioState::Succeeded(_) | ScenarioState::Failed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioStatus {
    Ok,
    Failed,
}

/// Serialized outcome of one scenario
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioOutcome {
    pub id: String,
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub status: ScenarioStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<RiskMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<ScenarioSeries>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(serialize_with = "rounding::three_decimals")]
    pub coverage_pct: f64,
    #[serde(skip)]
    pub ticker_coverage: BTreeMap<String, f64>,
}

impl ScenarioOutcome {
    pub fn is_ok(&self) -> bool {
        self.status == ScenarioStatus::Ok
    }
}

/// Mean coverage per ticker across scenarios
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioCoverage {
    #[serde(serialize_with = "rounding::three_decimals")]
    pub overall: f64,
    pub by_ticker: BTreeMap<String, f64>,
}

fn failure_reason(scenario: &Scenario, err: &RiskError) -> String {
    match err {
        RiskError::InsufficientHistory { required, .. } => format!(
            "Insufficient price data for {} scenario. Need at least {} trading days.",
            scenario.id, required
        ),
        other => other.to_string(),
    }
}

/// Runs the returns and metrics pipeline over named windows
#[derive(Debug, Clone, Default)]
pub struct ScenarioOrchestrator {
    aggregator: ReturnsAggregator,
    calculator: RiskMetricsCalculator,
}

impl ScenarioOrchestrator {
    pub fn new(aggregator: ReturnsAggregator, calculator: RiskMetricsCalculator) -> Self {
        Self { aggregator, calculator }
    }

    fn transition(scenario: &Scenario, state: &mut ScenarioState, next: ScenarioState) {
        debug!("Scenario {}: {} -> {}", scenario.id, state.name(), next.name());
        *state = next;
    }

    fn package(&self, scenario: &Scenario, returns: &PortfolioReturns) -> ScenarioResult {
        let ticker_coverage: BTreeMap<String, f64> = returns
            .price_counts
            .iter()
            .map(|(ticker, count)| (ticker.clone(), scenario.coverage_fraction(*count)))
            .collect();
        let coverage = if ticker_coverage.is_empty() {
            0.0
        } else {
            ticker_coverage.values().sum::<f64>() / ticker_coverage.len() as f64
        };
        ScenarioResult {
            metrics: self.calculator.compute_metrics(&returns.returns),
            series: self.calculator.generate_series(&returns.returns),
            coverage,
            ticker_coverage,
        }
    }

    /// Per-ticker data coverage of the window, whether or not the scenario priced
    fn observed_coverage(
        &self,
        basket: &Basket,
        source: &dyn PriceSeriesSource,
        scenario: &Scenario,
    ) -> BTreeMap<String, f64> {
        basket
            .tickers()
            .into_iter()
            .map(|ticker| {
                let count = fetch_or_empty(source, &ticker, scenario.start, scenario.end).len();
                let coverage = scenario.coverage_fraction(count);
                (ticker, coverage)
            })
            .collect()
    }

    /// Drive one scenario to a terminal state; errors never escape
    pub fn run_state_machine(
        &self,
        basket: &Basket,
        source: &dyn PriceSeriesSource,
        scenario: &Scenario,
        policy: RebalancePolicy,
    ) -> ScenarioState {
        let mut state = ScenarioState::Pending;
        Self::transition(scenario, &mut state, ScenarioState::Computing);

        let next = match self
            .aggregator
            .compute_returns(basket, source, scenario.start, scenario.end, policy)
        {
            Ok(returns) => ScenarioState::Succeeded(Box::new(self.package(scenario, &returns))),
            Err(err) => {
                warn!("Scenario {} failed: {}", scenario.id, err);
                ScenarioState::Failed(failure_reason(scenario, &err))
            }
        };
        Self::transition(scenario, &mut state, next);
        state
    }

    pub fn run_scenario(
        &self,
        basket: &Basket,
        source: &dyn PriceSeriesSource,
        scenario: &Scenario,
        policy: RebalancePolicy,
    ) -> ScenarioOutcome {
        let mut outcome = ScenarioOutcome {
            id: scenario.id.clone(),
            label: scenario.label.clone(),
            start: scenario.start,
            end: scenario.end,
            status: ScenarioStatus::Failed,
            metrics: None,
            series: None,
            error: None,
            coverage_pct: 0.0,
            ticker_coverage: basket.tickers().into_iter().map(|t| (t, 0.0)).collect(),
        };

        match self.run_state_machine(basket, source, scenario, policy) {
            ScenarioState::Succeeded(result) => {
                let result = *result;
                outcome.status = ScenarioStatus::Ok;
                outcome.metrics = Some(result.metrics);
                outcome.series = Some(result.series);
                outcome.coverage_pct = result.coverage;
                outcome.ticker_coverage = result.ticker_coverage;
            }
            ScenarioState::Failed(reason) => {
                outcome.error = Some(reason);
                outcome.ticker_coverage = self.observed_coverage(basket, source, scenario);
            }
            ScenarioState::Pending | ScenarioState::Computing => {
                outcome.error = Some(format!("scenario {} did not complete", scenario.id));
            }
        }
        outcome
    }

    pub fn run_scenarios(
        &self,
        basket: &Basket,
        source: &dyn PriceSeriesSource,
        scenarios: &[Scenario],
        policy: RebalancePolicy,
    ) -> Vec<ScenarioOutcome> {
        let outcomes: Vec<ScenarioOutcome> = scenarios
            .iter()
            .map(|scenario| self.run_scenario(basket, source, scenario, policy))
            .collect();
        let succeeded = outcomes.iter().filter(|o| o.is_ok()).count();
        info!("Scenarios complete: {}/{} succeeded", succeeded, outcomes.len());
        outcomes
    }

    /// Average each ticker's coverage over all scenario outcomes
    pub fn portfolio_coverage(&self, basket: &Basket, outcomes: &[ScenarioOutcome]) -> PortfolioCoverage {
        let by_ticker: BTreeMap<String, f64> = basket
            .tickers()
            .into_iter()
            .map(|ticker| {
                let mean = if outcomes.is_empty() {
                    0.0
                } else {
                    outcomes
                        .iter()
                        .map(|o| o.ticker_coverage.get(&ticker).copied().unwrap_or(0.0))
                        .sum::<f64>()
                        / outcomes.len() as f64
                };
                (ticker, rounding::round_to(mean, 3))
            })
            .collect();
        let overall = if by_ticker.is_empty() {
            0.0
        } else {
            by_ticker.values().sum::<f64>() / by_ticker.len() as f64
        };
        PortfolioCoverage { overall, by_ticker }
    }

    /// Rerun every scenario for each benchmark; unparseable ids are skipped
    pub fn run_benchmarks(
        &self,
        benchmarks: &[String],
        source: &dyn PriceSeriesSource,
        scenarios: &[Scenario],
        policy: RebalancePolicy,
    ) -> BTreeMap<String, Vec<ScenarioOutcome>> {
        let mut results = BTreeMap::new();
        for id in benchmarks {
            match benchmark_basket(id) {
                Ok(basket) => {
                    info!("Running benchmark {}", id);
                    results.insert(id.clone(), self.run_scenarios(&basket, source, scenarios, policy));
                }
                Err(err) => warn!("Skipping benchmark '{}': {}", id, err),
            }
        }
        results
    }
}
