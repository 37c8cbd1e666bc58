use portfolio_risk::basket::Basket;
use portfolio_risk::config::EngineConfig;
use portfolio_risk::engine::RiskEngine;
use portfolio_risk::market_data::{CachedPriceSource, CsvPriceSource, PriceSeriesSource};
use portfolio_risk::portfolio_volatility::{LearnedVolatilityModel, ModelCache, StaticEstimateModel};
use portfolio_risk::prefetch::prefetch_prices;

use anyhow::{Context, Result};
use log::{info, warn};
use serde_json::json;
use std::env;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger with default info level if RUST_LOG not set
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "info");
        }
    }
    env_logger::init();
    info!("Starting portfolio risk analysis");

    // Get config file from command line argument or use default
    let args: Vec<String> = env::args().collect();
    let config_file = if args.len() > 1 { &args[1] } else { "config.json" };

    info!("Loading configuration from: {}", config_file);
    let config = EngineConfig::load_from_file(config_file)?;

    let basket = Basket::from_csv_path(&config.run.basket_file)
        .with_context(|| format!("failed to load basket from {}", config.run.basket_file.display()))?;
    let scenarios = config.run.resolve_scenarios()?;
    let options = config.run.options.clone();
    info!(
        "Basket of {} assets, {} scenarios, rebalance {:?}",
        basket.len(),
        scenarios.len(),
        options.rebalance
    );

    let csv_source = CsvPriceSource::new(config.source.price_dir.clone());
    let live: Arc<dyn PriceSeriesSource> = Arc::new(CachedPriceSource::new(csv_source, config.cache.ttl()));

    // Plan against the live source, then fetch everything concurrently
    let planner = RiskEngine::new(Arc::clone(&live), config.clone());
    let requests = planner.plan_price_requests(&basket, &scenarios, &options);
    let prefetched = prefetch_prices(live, requests, planner.fetch_timeout()).await;
    info!("Price store holds {} tickers", prefetched.tickers().len());

    let engine = RiskEngine::new(Arc::new(prefetched), config.clone()).with_as_of(planner.as_of());

    let report = engine
        .compute_risk_report(&basket, &scenarios, &options)
        .context("risk report failed")?;

    let models: ModelCache = ModelCache::new(config.cache.ttl());
    let model = match config.run.learned_volatility {
        Some(estimate) => Some(models.get_or_try_insert_with("static-estimate".to_string(), || {
            Ok::<_, anyhow::Error>(Arc::new(StaticEstimateModel::new(estimate)) as Arc<dyn LearnedVolatilityModel>)
        })?),
        None => None,
    };

    let estimator = engine.volatility_estimator();
    let volatility = match engine.compute_portfolio_volatility(
        &basket,
        &estimator,
        config.run.use_correlation,
        model.as_deref(),
    ) {
        Ok(result) => Some(result),
        Err(e) => {
            warn!("Portfolio volatility unavailable: {}", e);
            None
        }
    };

    let output = json!({
        "riskReport": report,
        "portfolioVolatility": volatility,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    info!("Analysis complete");
    Ok(())
}
