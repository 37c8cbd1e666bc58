pub mod bands;
pub mod basket;
pub mod cache;
pub mod calendar;
pub mod config;
pub mod correlation;
pub mod diversification;
pub mod engine;
pub mod error;
pub mod market_data;
pub mod portfolio_volatility;
pub mod prefetch;
pub mod returns;
pub mod risk_report;
pub mod rounding;
pub mod scenarios;
pub mod security_types;
pub mod stats;
pub mod volatility;

pub use basket::{Asset, Basket};
pub use engine::{RiskEngine, RiskReport};
pub use error::{Result, RiskError};
pub use market_data::{PriceSeries, PriceSeriesSource, ReturnSeries};
