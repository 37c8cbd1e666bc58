use crate::cache::TtlCache;
use crate::error::{Result, RiskError};
use chrono::NaiveDate;
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Date-ordered adjusted closing prices for one ticker
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PriceSeries {
    pub ticker: String,
    points: Vec<(NaiveDate, f64)>,
}

/// Date-ordered simple daily returns
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReturnSeries {
    points: Vec<(NaiveDate, f64)>,
}

impl PriceSeries {
    /// Sorts by date and keeps the last price seen for a repeated date.
    /// Non-finite and negative prices are dropped; zero is kept as a wipeout.
    pub fn new(ticker: impl Into<String>, points: Vec<(NaiveDate, f64)>) -> Self {
        let ticker = ticker.into();
        let mut by_date = BTreeMap::new();
        for (date, price) in points {
            if price.is_finite() && price >= 0.0 {
                by_date.insert(date, price);
            } else {
                debug!("Dropping invalid price {} for {} on {}", price, ticker, date);
            }
        }
        Self {
            ticker,
            points: by_date.into_iter().collect(),
        }
    }

    pub fn empty(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            points: Vec::new(),
        }
    }

    pub fn points(&self) -> &[(NaiveDate, f64)] {
        &self.points
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|(d, _)| *d).collect()
    }

    pub fn prices(&self) -> Vec<f64> {
        self.points.iter().map(|(_, p)| *p).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Prices dated within `[start, end]`
    pub fn between(&self, start: NaiveDate, end: NaiveDate) -> PriceSeries {
        PriceSeries {
            ticker: self.ticker.clone(),
            points: self
                .points
                .iter()
                .filter(|(d, _)| *d >= start && *d <= end)
                .copied()
                .collect(),
        }
    }

    /// Pairwise relative change; the first date has no return and is dropped.
    /// Once a price reaches zero the following returns are zero.
    pub fn returns(&self) -> ReturnSeries {
        ReturnSeries {
            points: self
                .points
                .windows(2)
                .map(|w| {
                    let change = if w[0].1 > 0.0 { w[1].1 / w[0].1 - 1.0 } else { 0.0 };
                    (w[1].0, change)
                })
                .collect(),
        }
    }
}

impl ReturnSeries {
    pub fn new(mut points: Vec<(NaiveDate, f64)>) -> Self {
        points.sort_by_key(|(d, _)| *d);
        points.dedup_by_key(|(d, _)| *d);
        Self { points }
    }

    pub fn from_parts(dates: Vec<NaiveDate>, values: Vec<f64>) -> Result<Self> {
        if dates.len() != values.len() {
            return Err(RiskError::malformed(format!(
                "return series has {} dates but {} values",
                dates.len(),
                values.len()
            )));
        }
        Ok(Self::new(dates.into_iter().zip(values).collect()))
    }

    pub fn points(&self) -> &[(NaiveDate, f64)] {
        &self.points
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|(d, _)| *d).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|(_, r)| *r).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Supplier of historical adjusted prices.
///
/// Implementations return an empty series when a ticker has no data for the
/// range; an `Err` is reserved for failures of the source itself.
pub trait PriceSeriesSource: Send + Sync {
    fn get_adjusted_prices(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> Result<PriceSeries>;
}

impl<S: PriceSeriesSource + ?Sized> PriceSeriesSource for Arc<S> {
    fn get_adjusted_prices(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> Result<PriceSeries> {
        (**self).get_adjusted_prices(ticker, start, end)
    }
}

/// Fetch a series, logging and swallowing source failures as "no data"
pub fn fetch_or_empty(
    source: &dyn PriceSeriesSource,
    ticker: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> PriceSeries {
    match source.get_adjusted_prices(ticker, start, end) {
        Ok(series) => series,
        Err(e) => {
            warn!("Price fetch failed for {} ({} to {}): {}", ticker, start, end, e);
            PriceSeries::empty(ticker)
        }
    }
}

/// Price store held entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryPriceSource {
    series: RwLock<HashMap<String, BTreeMap<NaiveDate, f64>>>,
}

impl InMemoryPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(series: Vec<PriceSeries>) -> Self {
        let source = Self::new();
        for s in series {
            source.merge(s);
        }
        source
    }

    /// Add the points of `series`, overwriting prices on dates already present
    pub fn merge(&self, series: PriceSeries) {
        let mut store = match self.series.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entry = store.entry(series.ticker.to_uppercase()).or_default();
        for (date, price) in series.points {
            entry.insert(date, price);
        }
    }

    pub fn tickers(&self) -> Vec<String> {
        let store = match self.series.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut tickers: Vec<String> = store.keys().cloned().collect();
        tickers.sort();
        tickers
    }
}

impl PriceSeriesSource for InMemoryPriceSource {
    fn get_adjusted_prices(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> Result<PriceSeries> {
        let store = match self.series.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let points = store
            .get(&ticker.to_uppercase())
            .map(|prices| prices.range(start..=end).map(|(d, p)| (*d, *p)).collect())
            .unwrap_or_default();
        Ok(PriceSeries::new(ticker, points))
    }
}

/// Reads `<dir>/<TICKER>.csv` files with a `Date` column and an `Adj Close`
/// (preferred) or `Close` column. A missing file means no data.
#[derive(Debug, Clone)]
pub struct CsvPriceSource {
    dir: PathBuf,
}

impl CsvPriceSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, ticker: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", ticker.to_uppercase()))
    }

    fn read_file(&self, ticker: &str, path: &Path) -> Result<PriceSeries> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)?;
        let headers = reader.headers()?.clone();
        let column = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));

        let date_col = column("Date")
            .ok_or_else(|| RiskError::PriceSource(format!("{} has no Date column", path.display())))?;
        let price_col = column("Adj Close").or_else(|| column("Close")).ok_or_else(|| {
            RiskError::PriceSource(format!("{} has no Adj Close or Close column", path.display()))
        })?;

        let mut points = Vec::new();
        for record in reader.records() {
            let record = record?;
            let (Some(raw_date), Some(raw_price)) = (record.get(date_col), record.get(price_col)) else {
                continue;
            };
            // Some exports append a time component to the date
            let date_part = raw_date.get(..10).unwrap_or(raw_date);
            match (
                NaiveDate::parse_from_str(date_part, "%Y-%m-%d"),
                raw_price.parse::<f64>(),
            ) {
                (Ok(date), Ok(price)) => points.push((date, price)),
                _ => debug!("Skipping unparsable row in {}: {:?}", path.display(), record),
            }
        }
        Ok(PriceSeries::new(ticker, points))
    }
}

impl PriceSeriesSource for CsvPriceSource {
    fn get_adjusted_prices(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> Result<PriceSeries> {
        let path = self.path_for(ticker);
        if !path.exists() {
            debug!("No price file for {} at {}", ticker, path.display());
            return Ok(PriceSeries::empty(ticker));
        }
        let series = self.read_file(ticker, &path)?.between(start, end);
        info!(
            "Loaded {} prices for {} between {} and {}",
            series.len(),
            ticker,
            start,
            end
        );
        Ok(series)
    }
}

/// Key of a memoized price lookup
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PriceRequest {
    pub ticker: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl PriceRequest {
    pub fn new(ticker: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            ticker: ticker.into().to_uppercase(),
            start,
            end,
        }
    }
}

/// Memoizes successful lookups of an inner source for the cache TTL
pub struct CachedPriceSource<S> {
    inner: S,
    cache: TtlCache<PriceRequest, PriceSeries>,
}

impl<S: PriceSeriesSource> CachedPriceSource<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            cache: TtlCache::new(ttl),
        }
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}

impl<S: PriceSeriesSource> PriceSeriesSource for CachedPriceSource<S> {
    fn get_adjusted_prices(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> Result<PriceSeries> {
        self.cache
            .get_or_try_insert_with(PriceRequest::new(ticker, start, end), || {
                self.inner.get_adjusted_prices(ticker, start, end)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    struct CountingSource {
        calls: AtomicUsize,
    }

    impl PriceSeriesSource for CountingSource {
        fn get_adjusted_prices(&self, ticker: &str, start: NaiveDate, _end: NaiveDate) -> Result<PriceSeries> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(PriceSeries::new(ticker, vec![(start, 100.0)]))
        }
    }

    #[test]
    fn test_price_series_is_sorted_and_cleaned() {
        let series = PriceSeries::new(
            "SPY",
            vec![
                (d(2024, 1, 3), 102.0),
                (d(2024, 1, 2), 100.0),
                (d(2024, 1, 4), f64::NAN),
                (d(2024, 1, 5), -1.0),
                (d(2024, 1, 8), 0.0),
            ],
        );
        assert_eq!(series.dates(), vec![d(2024, 1, 2), d(2024, 1, 3), d(2024, 1, 8)]);
    }

    #[test]
    fn test_returns_after_wipeout_are_zero() {
        let series = PriceSeries::new(
            "BUST",
            vec![(d(2024, 1, 2), 50.0), (d(2024, 1, 3), 0.0), (d(2024, 1, 4), 0.0), (d(2024, 1, 5), 3.0)],
        );
        assert_eq!(series.returns().values(), vec![-1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_returns_drop_first_date() {
        let series = PriceSeries::new(
            "SPY",
            vec![(d(2024, 1, 2), 100.0), (d(2024, 1, 3), 110.0), (d(2024, 1, 4), 99.0)],
        );
        let returns = series.returns();
        assert_eq!(returns.dates(), vec![d(2024, 1, 3), d(2024, 1, 4)]);
        let values = returns.values();
        assert!((values[0] - 0.10).abs() < 1e-12);
        assert!((values[1] + 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_in_memory_range_query() {
        let source = InMemoryPriceSource::with_series(vec![PriceSeries::new(
            "agg",
            vec![(d(2024, 1, 2), 1.0), (d(2024, 1, 3), 2.0), (d(2024, 1, 4), 3.0)],
        )]);
        let series = source.get_adjusted_prices("AGG", d(2024, 1, 3), d(2024, 1, 10)).unwrap();
        assert_eq!(series.prices(), vec![2.0, 3.0]);
        assert!(source.get_adjusted_prices("XYZ", d(2024, 1, 1), d(2024, 2, 1)).unwrap().is_empty());
    }

    #[test]
    fn test_cached_source_memoizes_by_range() {
        let cached = CachedPriceSource::new(CountingSource { calls: AtomicUsize::new(0) }, Duration::from_secs(60));
        cached.get_adjusted_prices("SPY", d(2024, 1, 2), d(2024, 2, 1)).unwrap();
        cached.get_adjusted_prices("spy", d(2024, 1, 2), d(2024, 2, 1)).unwrap();
        cached.get_adjusted_prices("SPY", d(2024, 1, 3), d(2024, 2, 1)).unwrap();
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cached.cached_entries(), 2);
    }

    #[test]
    fn test_csv_source_reads_adjusted_close() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("VTI.csv")).unwrap();
        writeln!(file, "Date,Open,Close,Adj Close").unwrap();
        writeln!(file, "2024-01-02,1,200.0,198.5").unwrap();
        writeln!(file, "2024-01-03,1,201.0,199.5").unwrap();
        writeln!(file, "2024-01-04,1,bad,bad").unwrap();

        let source = CsvPriceSource::new(dir.path());
        let series = source.get_adjusted_prices("vti", d(2024, 1, 1), d(2024, 12, 31)).unwrap();
        assert_eq!(series.prices(), vec![198.5, 199.5]);

        let missing = source.get_adjusted_prices("NOPE", d(2024, 1, 1), d(2024, 12, 31)).unwrap();
        assert!(missing.is_empty());
    }
}
