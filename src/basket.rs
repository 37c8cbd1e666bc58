use crate::error::{Result, RiskError};
use crate::rounding;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

/// A holding as supplied by the caller; weights need not sum to one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub ticker: String,
    pub weight: f64,
}

impl Asset {
    pub fn new(ticker: impl Into<String>, weight: f64) -> Self {
        Self {
            ticker: ticker.into(),
            weight,
        }
    }
}

/// Validated basket with weights normalized to sum to 1
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Basket {
    assets: Vec<Asset>,
    total_weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightDistribution {
    #[serde(serialize_with = "rounding::three_decimals")]
    pub min_weight: f64,
    #[serde(serialize_with = "rounding::three_decimals")]
    pub max_weight: f64,
    #[serde(serialize_with = "rounding::three_decimals")]
    pub avg_weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSummary {
    pub total_assets: usize,
    #[serde(serialize_with = "rounding::three_decimals")]
    pub total_weight: f64,
    pub weight_distribution: WeightDistribution,
}

impl Basket {
    /// Validate and normalize. Tickers are trimmed and upper-cased; repeated
    /// tickers are merged by summing their weights.
    pub fn new(assets: Vec<Asset>) -> Result<Self> {
        if assets.is_empty() {
            return Err(RiskError::malformed("basket must contain at least one asset"));
        }

        let mut merged: Vec<Asset> = Vec::with_capacity(assets.len());
        for asset in assets {
            let ticker = asset.ticker.trim().to_uppercase();
            if ticker.is_empty() {
                return Err(RiskError::malformed("asset ticker must not be blank"));
            }
            if !asset.weight.is_finite() || asset.weight <= 0.0 {
                return Err(RiskError::malformed(format!(
                    "weight for {} must be a positive number, got {}",
                    ticker, asset.weight
                )));
            }
            match merged.iter_mut().find(|a| a.ticker == ticker) {
                Some(existing) => {
                    debug!("Merging duplicate holding {}", ticker);
                    existing.weight += asset.weight;
                }
                None => merged.push(Asset::new(ticker, asset.weight)),
            }
        }

        let total_weight: f64 = merged.iter().map(|a| a.weight).sum();
        for asset in &mut merged {
            asset.weight /= total_weight;
        }

        Ok(Self {
            assets: merged,
            total_weight,
        })
    }

    pub fn from_pairs(pairs: &[(&str, f64)]) -> Result<Self> {
        Self::new(pairs.iter().map(|(t, w)| Asset::new(*t, *w)).collect())
    }

    pub fn single(ticker: &str) -> Result<Self> {
        Self::from_pairs(&[(ticker, 1.0)])
    }

    /// Load a basket from a CSV file with `Ticker` and `Weight` columns
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            RiskError::malformed(format!("cannot open basket file {}: {}", path.display(), e))
        })?;
        let basket = Self::from_csv_reader(file)?;
        info!("Loaded basket of {} assets from {}", basket.len(), path.display());
        Ok(basket)
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader
            .headers()
            .map_err(|e| RiskError::malformed(format!("unreadable basket header: {}", e)))?
            .clone();
        let column = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
        let (ticker_col, weight_col) = match (column("Ticker"), column("Weight")) {
            (Some(t), Some(w)) => (t, w),
            _ => {
                return Err(RiskError::malformed(
                    "basket CSV must have 'Ticker' and 'Weight' columns",
                ));
            }
        };

        let mut assets = Vec::new();
        for (line, record) in csv_reader.records().enumerate() {
            let record =
                record.map_err(|e| RiskError::malformed(format!("bad basket row {}: {}", line + 1, e)))?;
            let ticker = record.get(ticker_col).unwrap_or_default();
            let raw_weight = record.get(weight_col).unwrap_or_default();
            let weight = raw_weight.parse::<f64>().map_err(|_| {
                RiskError::malformed(format!("invalid weight '{}' for {}", raw_weight, ticker))
            })?;
            assets.push(Asset::new(ticker, weight));
        }

        Self::new(assets)
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn tickers(&self) -> Vec<String> {
        self.assets.iter().map(|a| a.ticker.clone()).collect()
    }

    pub fn weights(&self) -> Vec<f64> {
        self.assets.iter().map(|a| a.weight).collect()
    }

    pub fn weight_of(&self, ticker: &str) -> Option<f64> {
        self.assets.iter().find(|a| a.ticker == ticker).map(|a| a.weight)
    }

    /// Sum of the weights as supplied, before normalization
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn is_single_asset(&self) -> bool {
        self.assets.len() == 1
    }

    /// Herfindahl-Hirschman index of the normalized weights
    pub fn hhi(&self) -> f64 {
        self.assets.iter().map(|a| a.weight * a.weight).sum()
    }

    pub fn summary(&self) -> PortfolioSummary {
        let weights = self.weights();
        let min_weight = weights.iter().copied().fold(f64::INFINITY, f64::min);
        let max_weight = weights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        PortfolioSummary {
            total_assets: self.len(),
            total_weight: self.total_weight,
            weight_distribution: WeightDistribution {
                min_weight,
                max_weight,
                avg_weight: 1.0 / self.len() as f64,
            },
        }
    }
}
