mod common;

use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use common::{business_days, d, prices_from_returns, wiggle};
use mockall::mock;
use portfolio_risk::basket::{Asset, Basket};
use portfolio_risk::error::RiskError;
use portfolio_risk::market_data::{InMemoryPriceSource, PriceSeries, PriceSeriesSource};
use portfolio_risk::returns::{RebalancePolicy, ReturnsAggregator};
use portfolio_risk::stats::RiskMetricsCalculator;
use proptest::prelude::*;

mock! {
    pub Source {}

    impl PriceSeriesSource for Source {
        fn get_adjusted_prices(
            &self,
            ticker: &str,
            start: NaiveDate,
            end: NaiveDate,
        ) -> portfolio_risk::Result<PriceSeries>;
    }
}

#[cfg(test)]
mod returns_tests {
    use super::*;

    fn setup_two_asset_source() -> InMemoryPriceSource {
        let start = d(2023, 1, 2);
        InMemoryPriceSource::with_series(vec![
            prices_from_returns("SPY", start, &wiggle(1, 180)),
            prices_from_returns("AGG", start, &wiggle(2, 180)),
        ])
    }

    #[test]
    fn test_single_asset_drift_reproduces_asset_returns() -> Result<()> {
        let source = setup_two_asset_source();
        let basket = Basket::single("SPY")?;
        let (start, end) = (d(2023, 1, 1), d(2023, 12, 31));

        let result = ReturnsAggregator::default().compute_returns(&basket, &source, start, end, RebalancePolicy::None)?;
        let own = source.get_adjusted_prices("SPY", start, end)?.returns();

        assert_eq!(result.returns.len(), own.len(), "one portfolio return per asset return");
        for ((d1, portfolio), (d2, asset)) in result.returns.points().iter().zip(own.points()) {
            assert_eq!(d1, d2);
            assert_eq!(portfolio, asset, "single asset return on {} should match exactly", d1);
        }
        Ok(())
    }

    #[test]
    fn test_rebalance_resets_to_targets_on_period_start() -> Result<()> {
        let source = setup_two_asset_source();
        let basket = Basket::from_pairs(&[("SPY", 60.0), ("AGG", 40.0)])?;
        let targets = basket.weights();

        for policy in [RebalancePolicy::Monthly, RebalancePolicy::Quarterly] {
            let result = ReturnsAggregator::default().compute_returns(
                &basket,
                &source,
                d(2023, 1, 1),
                d(2023, 12, 31),
                policy,
            )?;
            let dates = result.returns.dates();
            let mut resets = 0;
            for (i, date) in dates.iter().enumerate() {
                let new_period = i == 0
                    || match policy {
                        RebalancePolicy::Monthly => date.month() != dates[i - 1].month(),
                        _ => (date.month() - 1) / 3 != (dates[i - 1].month() - 1) / 3,
                    };
                if new_period {
                    resets += 1;
                    assert_eq!(
                        result.applied_weights[i], targets,
                        "{:?}: weights on {} should equal targets",
                        policy, date
                    );
                }
            }
            assert!(resets > 1, "{:?} should cross at least one period boundary", policy);

            // mid-period weights drift away from the targets
            assert!(result.applied_weights.iter().any(|w| w != &targets));
        }
        Ok(())
    }

    #[test]
    fn test_source_errors_are_treated_as_missing_data() -> Result<()> {
        let spy = prices_from_returns("SPY", d(2024, 1, 1), &wiggle(7, 40));
        let mut source = MockSource::new();
        source
            .expect_get_adjusted_prices()
            .returning(move |ticker, start, end| match ticker {
                "SPY" => Ok(spy.between(start, end)),
                other => Err(RiskError::PriceSource(format!("{} lookup refused", other))),
            });

        let basket = Basket::from_pairs(&[("SPY", 1.0), ("BAD", 1.0)])?;
        let result = ReturnsAggregator::default().compute_returns(
            &basket,
            &source,
            d(2024, 1, 1),
            d(2024, 3, 31),
            RebalancePolicy::None,
        )?;

        assert_eq!(result.per_asset_coverage["BAD"], 0.0, "failed ticker has zero coverage");
        assert!(result.per_asset_coverage["SPY"] > 0.9);
        assert_eq!(result.returns.len(), 40);
        Ok(())
    }

    #[test]
    fn test_no_data_names_every_ticker() -> Result<()> {
        let mut source = MockSource::new();
        source
            .expect_get_adjusted_prices()
            .times(2)
            .returning(|ticker, _, _| Ok(PriceSeries::empty(ticker)));

        let basket = Basket::from_pairs(&[("AAA", 1.0), ("BBB", 1.0)])?;
        let err = ReturnsAggregator::default()
            .compute_returns(&basket, &source, d(2024, 1, 1), d(2024, 3, 31), RebalancePolicy::None)
            .unwrap_err();

        assert_eq!(
            err,
            RiskError::NoPriceData {
                tickers: vec!["AAA".to_string(), "BBB".to_string()]
            }
        );
        Ok(())
    }

    #[test]
    fn test_short_history_is_insufficient() -> Result<()> {
        let source = InMemoryPriceSource::with_series(vec![prices_from_returns("SPY", d(2024, 1, 1), &wiggle(3, 5))]);
        let err = ReturnsAggregator::default()
            .compute_returns(&Basket::single("SPY")?, &source, d(2024, 1, 1), d(2024, 3, 31), RebalancePolicy::None)
            .unwrap_err();
        assert_eq!(
            err,
            RiskError::InsufficientHistory {
                observations: 5,
                required: 10
            }
        );
        Ok(())
    }

    #[test]
    fn test_inverted_range_is_malformed() -> Result<()> {
        let err = ReturnsAggregator::default()
            .compute_returns(
                &Basket::single("SPY")?,
                &InMemoryPriceSource::new(),
                d(2024, 3, 1),
                d(2024, 1, 1),
                RebalancePolicy::None,
            )
            .unwrap_err();
        assert!(matches!(err, RiskError::MalformedInput(_)));
        Ok(())
    }

    #[test]
    fn test_staggered_listing_aligns_on_union() -> Result<()> {
        let dates = business_days(d(2024, 1, 1), 30);
        let early = prices_from_returns("OLD", dates[0], &wiggle(4, 29));
        let late = prices_from_returns("NEW", dates[15], &wiggle(5, 14));
        let source = InMemoryPriceSource::with_series(vec![early, late]);

        let basket = Basket::from_pairs(&[("OLD", 1.0), ("NEW", 1.0)])?;
        let result = ReturnsAggregator::default().compute_returns(
            &basket,
            &source,
            d(2024, 1, 1),
            d(2024, 3, 31),
            RebalancePolicy::None,
        )?;

        assert_eq!(result.returns.len(), 29, "aligned axis is the union of dates");
        assert_eq!(result.price_counts["NEW"], 15);
        Ok(())
    }

    #[test]
    fn test_price_wipeout_flows_through_returns() -> Result<()> {
        let dates = business_days(d(2024, 1, 1), 15);
        let bust = dates
            .iter()
            .enumerate()
            .map(|(i, date)| (*date, if i < 5 { 100.0 } else { 0.0 }))
            .collect();
        let flat = dates.iter().map(|date| (*date, 50.0)).collect();
        let source = InMemoryPriceSource::with_series(vec![
            PriceSeries::new("AAA", bust),
            PriceSeries::new("BBB", flat),
        ]);

        let basket = Basket::from_pairs(&[("AAA", 0.5), ("BBB", 0.5)])?;
        let result = ReturnsAggregator::default().compute_returns(
            &basket,
            &source,
            d(2024, 1, 1),
            d(2024, 1, 31),
            RebalancePolicy::None,
        )?;

        let values = result.returns.values();
        assert_eq!(values.len(), 14);
        assert_eq!(values[4], -0.5, "half the basket is wiped out on day five");
        assert!(values.iter().all(|r| r.is_finite()));
        assert_eq!(result.applied_weights.last(), Some(&vec![0.0, 1.0]));

        let metrics = RiskMetricsCalculator::default().compute_metrics(&result.returns);
        assert!((metrics.cum_return_pct + 50.0).abs() < 1e-9);
        Ok(())
    }
}

proptest! {
    #[test]
    fn prop_normalized_weights_sum_to_one(weights in prop::collection::vec(0.001f64..1000.0, 1..12)) {
        let assets = weights
            .iter()
            .enumerate()
            .map(|(i, w)| Asset::new(format!("T{}", i), *w))
            .collect();
        let basket = Basket::new(assets).unwrap();
        let total: f64 = basket.weights().iter().sum();
        prop_assert!((total - 1.0).abs() < 1e-9, "weights summed to {}", total);
    }

    #[test]
    fn prop_returns_are_invariant_to_weight_scale(a in 0.01f64..10.0, b in 0.01f64..10.0, scale in 0.001f64..1000.0) {
        let start = d(2023, 1, 2);
        let source = InMemoryPriceSource::with_series(vec![
            prices_from_returns("X", start, &wiggle(11, 60)),
            prices_from_returns("Y", start, &wiggle(12, 60)),
        ]);
        let base = Basket::from_pairs(&[("X", a), ("Y", b)]).unwrap();
        let scaled = Basket::from_pairs(&[("X", a * scale), ("Y", b * scale)]).unwrap();

        let aggregator = ReturnsAggregator::default();
        let r1 = aggregator
            .compute_returns(&base, &source, d(2023, 1, 1), d(2023, 6, 30), RebalancePolicy::Monthly)
            .unwrap();
        let r2 = aggregator
            .compute_returns(&scaled, &source, d(2023, 1, 1), d(2023, 6, 30), RebalancePolicy::Monthly)
            .unwrap();

        for (x, y) in r1.returns.values().iter().zip(r2.returns.values()) {
            prop_assert!(approx::abs_diff_eq!(*x, y, epsilon = 1e-12));
        }
    }
}
