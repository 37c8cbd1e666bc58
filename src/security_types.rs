//! Ticker-based asset classification and reference volatilities.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetType {
    Cryptocurrency,
    #[serde(rename = "Leveraged ETF")]
    LeveragedEtf,
    #[serde(rename = "Mutual Fund")]
    MutualFund,
    #[serde(rename = "Bond/Treasury")]
    BondTreasury,
    #[serde(rename = "REIT")]
    Reit,
    #[serde(rename = "ETF")]
    Etf,
    Stock,
}

impl AssetType {
    pub fn label(&self) -> &'static str {
        match self {
            AssetType::Cryptocurrency => "Cryptocurrency",
            AssetType::LeveragedEtf => "Leveraged ETF",
            AssetType::MutualFund => "Mutual Fund",
            AssetType::BondTreasury => "Bond/Treasury",
            AssetType::Reit => "REIT",
            AssetType::Etf => "ETF",
            AssetType::Stock => "Stock",
        }
    }

    /// Typical annualized volatility for the class
    pub fn base_volatility(&self) -> f64 {
        match self {
            AssetType::Cryptocurrency => 0.70,
            AssetType::LeveragedEtf => 0.60,
            AssetType::MutualFund => 0.15,
            AssetType::BondTreasury => 0.05,
            AssetType::Reit => 0.24,
            AssetType::Etf => 0.18,
            AssetType::Stock => 0.25,
        }
    }
}

const CRYPTO_PATTERNS: &[&str] = &[
    "BTC", "ETH", "ADA", "SOL", "DOGE", "BNB", "XRP", "MATIC", "AVAX", "DOT", "LINK", "CRYPTO", "-USD",
];

const LEVERAGED_PATTERNS: &[&str] = &[
    "TQQQ", "SOXL", "SPXL", "UPRO", "TECL", "FAS", "TNA", "CURE", "SQQQ", "SPXS", "SOXS", "FAZ", "TZA",
    "UVXY", "VXX", "SVXY",
];

const MUTUAL_FUNDS: &[&str] = &[
    "VFIAX", "FXAIX", "SWTSX", "VTIAX", "FTIHX", "VBTLX", "FXNAX", "SWAGX", "VTWAX", "VTSAX", "FZROX",
    "FZILX", "FTRBX", "PTTAX", "VFITX", "VTBIX", "FXSTX", "VBTIX", "FXTIX", "FSMDX", "VIMAX", "FSCSX",
    "VSMAX", "FSKAX", "VTMGX", "VGTSX", "FDVV", "FXIFX", "VTTSX", "FDKLX", "VTTHX", "FDEEX", "VFIFX",
    "FDEWX", "VTIVX",
];

const BOND_PATTERNS: &[&str] = &[
    "AGG", "BND", "TLT", "IEF", "SHY", "GOVT", "BOND", "TREAS", "BILL", "NOTE", "FTRB", "VMBS", "MBB",
    "VTEB", "MUB", "HYG", "JNK", "LQD", "TIP", "BNDX", "EMB",
];

const REIT_PATTERNS: &[&str] = &[
    "REIT", "AMT", "CCI", "EQIX", "PLD", "WELL", "PSA", "EXR", "AVB", "EQR", "VNQ", "SCHH", "XLRE",
];

const ETF_PATTERNS: &[&str] = &[
    "SPY", "VOO", "VTI", "QQQ", "IWM", "XL", "VE", "VW", "MDY", "DIA", "GLD", "SLV", "USO",
];

/// Classify a ticker by name patterns. Checks run from the most specific
/// (crypto, leveraged) to the most generic (ETF); anything else is a stock.
pub fn classify(ticker: &str) -> AssetType {
    let symbol = ticker.trim().to_uppercase();
    let contains_any = |patterns: &[&str]| patterns.iter().any(|p| symbol.contains(p));

    if contains_any(CRYPTO_PATTERNS) {
        return AssetType::Cryptocurrency;
    }
    if contains_any(LEVERAGED_PATTERNS) {
        return AssetType::LeveragedEtf;
    }
    if contains_any(MUTUAL_FUNDS) || looks_like_mutual_fund(&symbol) {
        return AssetType::MutualFund;
    }
    if contains_any(BOND_PATTERNS) {
        return AssetType::BondTreasury;
    }
    if contains_any(REIT_PATTERNS) {
        return AssetType::Reit;
    }
    // iShares tickers are matched by prefix only; a bare "I" substring would catch most stocks
    if contains_any(ETF_PATTERNS) || (symbol.starts_with('I') && (3..=4).contains(&symbol.len())) {
        return AssetType::Etf;
    }
    AssetType::Stock
}

/// Five-letter symbols ending in X, or long V/F/SW-prefixed symbols
fn looks_like_mutual_fund(symbol: &str) -> bool {
    (symbol.len() == 5 && symbol.ends_with('X'))
        || (symbol.len() >= 5 && (symbol.starts_with('V') || symbol.starts_with('F') || symbol.starts_with("SW")))
}

const KNOWN_VOLATILITIES: &[(&str, f64)] = &[
    // Technology
    ("AAPL", 0.25), ("MSFT", 0.22), ("GOOGL", 0.28), ("GOOG", 0.28), ("AMZN", 0.30),
    ("TSLA", 0.45), ("META", 0.35), ("NVDA", 0.40), ("AMD", 0.38), ("NFLX", 0.35),
    ("CRM", 0.32), ("ADBE", 0.28), ("PYPL", 0.38), ("INTC", 0.30), ("CSCO", 0.25),
    ("ORCL", 0.24), ("IBM", 0.22),
    // Financials
    ("JPM", 0.28), ("BAC", 0.32), ("WFC", 0.30), ("GS", 0.35), ("MS", 0.38),
    ("C", 0.35), ("AXP", 0.30), ("V", 0.22), ("MA", 0.24), ("BRK-B", 0.18),
    // Healthcare
    ("JNJ", 0.18), ("PFE", 0.22), ("ABBV", 0.25), ("MRK", 0.20), ("UNH", 0.20),
    ("LLY", 0.28), ("MRNA", 0.65),
    // Energy and utilities
    ("XOM", 0.35), ("CVX", 0.32), ("COP", 0.40), ("NEE", 0.18), ("DUK", 0.16), ("SO", 0.15),
    // Staples
    ("PG", 0.16), ("KO", 0.18), ("PEP", 0.17), ("WMT", 0.20), ("COST", 0.22),
    // REITs
    ("AMT", 0.22), ("EQIX", 0.26), ("PLD", 0.23), ("VNQ", 0.22),
    // Broad market
    ("SPY", 0.15), ("VOO", 0.15), ("IVV", 0.15), ("VTI", 0.16), ("ITOT", 0.16),
    ("SWTSX", 0.16), ("FXAIX", 0.15), ("VFIAX", 0.15), ("VTSAX", 0.16), ("FZROX", 0.16),
    // International
    ("VEA", 0.18), ("VWO", 0.24), ("IEFA", 0.18), ("IEMG", 0.24), ("EFA", 0.18),
    ("EEM", 0.24), ("ACWI", 0.17), ("VXUS", 0.18), ("VTIAX", 0.18), ("FTIHX", 0.18),
    // Sector and style
    ("XLK", 0.20), ("XLF", 0.25), ("XLE", 0.35), ("XLV", 0.18), ("XLI", 0.20),
    ("XLP", 0.15), ("XLU", 0.16), ("XLB", 0.22), ("XLRE", 0.22), ("XLY", 0.22),
    ("QQQ", 0.20), ("IWM", 0.22), ("MDY", 0.18), ("VUG", 0.18), ("VTV", 0.14),
    // Bonds
    ("AGG", 0.04), ("BND", 0.04), ("VGIT", 0.06), ("VGLT", 0.12), ("TLT", 0.12),
    ("IEF", 0.06), ("SHY", 0.02), ("VGSH", 0.02), ("VCSH", 0.03), ("VCIT", 0.05),
    ("LQD", 0.06), ("HYG", 0.08), ("JNK", 0.08), ("TIP", 0.05), ("MUB", 0.04),
    ("SCHZ", 0.04), ("BNDX", 0.05), ("EMB", 0.09), ("VBTLX", 0.04), ("FXNAX", 0.04),
    // Commodities
    ("GLD", 0.18), ("SLV", 0.25), ("IAU", 0.18), ("USO", 0.35), ("UNG", 0.45), ("DBA", 0.18),
    // Crypto
    ("BTC-USD", 0.65), ("ETH-USD", 0.75), ("SOL", 0.85), ("DOGE", 0.90),
    // Leveraged and volatility products
    ("TQQQ", 0.60), ("SOXL", 0.80), ("SPXL", 0.45), ("UPRO", 0.45), ("SQQQ", 0.60),
    ("UVXY", 1.20), ("VXX", 0.90),
    // Thematic
    ("ARKK", 0.55),
];

/// Reference volatility for commonly held tickers
pub fn known_volatility(ticker: &str) -> Option<f64> {
    let symbol = ticker.trim().to_uppercase();
    KNOWN_VOLATILITIES
        .iter()
        .find(|(t, _)| *t == symbol)
        .map(|(_, v)| *v)
}

/// Category used to grade single-holding portfolios
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HoldingCategory {
    BroadMarketEtf,
    InternationalEtf,
    BondEtf,
    CommodityEtf,
    GenericFund,
    SectorEtf,
    Other,
}

const BROAD_MARKET_ETFS: &[&str] = &["VTI", "VOO", "SPY", "VT", "ITOT", "SCHB", "IVV", "SWTSX"];
const INTERNATIONAL_ETFS: &[&str] = &["EFA", "EEM", "VEA", "VWO", "IEFA", "IEMG", "SCHE", "SCHF"];
const BOND_ETFS: &[&str] = &["AGG", "BND", "VCIT", "VCSH", "VGSH", "TLT", "IEF", "SHY", "SCHZ"];
const SECTOR_ETFS: &[&str] = &["XLK", "XLF", "XLE", "XLV", "XLI", "XLP", "XLU", "XLB", "XLY", "XLRE"];
const COMMODITY_ETFS: &[&str] = &["GLD", "SLV", "USO", "UNG", "DBA", "DBC"];

impl HoldingCategory {
    pub fn of(ticker: &str) -> Self {
        let symbol = ticker.trim().to_uppercase();
        let is = |list: &[&str]| list.contains(&symbol.as_str());

        if is(BROAD_MARKET_ETFS) {
            HoldingCategory::BroadMarketEtf
        } else if is(INTERNATIONAL_ETFS) {
            HoldingCategory::InternationalEtf
        } else if is(BOND_ETFS) {
            HoldingCategory::BondEtf
        } else if is(SECTOR_ETFS) {
            HoldingCategory::SectorEtf
        } else if is(COMMODITY_ETFS) {
            HoldingCategory::CommodityEtf
        } else if ["ETF", "FUND", "INDEX"].iter().any(|k| symbol.contains(k)) {
            HoldingCategory::GenericFund
        } else {
            HoldingCategory::Other
        }
    }

    /// Bonus added to the base diversification score of a one-asset portfolio
    pub fn diversification_bonus(&self) -> f64 {
        match self {
            HoldingCategory::BroadMarketEtf => 4.0,
            HoldingCategory::InternationalEtf => 3.5,
            HoldingCategory::BondEtf => 3.0,
            HoldingCategory::CommodityEtf => 2.5,
            HoldingCategory::GenericFund => 2.5,
            HoldingCategory::SectorEtf => 2.0,
            HoldingCategory::Other => 1.0,
        }
    }
}

const ETF_INDICATORS: &[&str] = &["VTI", "VOO", "SPY", "QQQ", "IWM", "EFA", "EEM", "AGG", "BND", "GLD", "TLT"];

/// Whether a ticker is recognisably a fund rather than a single company
pub fn is_fund_like(ticker: &str) -> bool {
    let symbol = ticker.trim().to_uppercase();
    ETF_INDICATORS.iter().any(|k| symbol.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_order() {
        assert_eq!(classify("BTC-USD"), AssetType::Cryptocurrency);
        assert_eq!(classify("tqqq"), AssetType::LeveragedEtf);
        assert_eq!(classify("VFIAX"), AssetType::MutualFund);
        assert_eq!(classify("PRWCX"), AssetType::MutualFund);
        assert_eq!(classify("AGG"), AssetType::BondTreasury);
        assert_eq!(classify("VNQ"), AssetType::Reit);
        assert_eq!(classify("QQQ"), AssetType::Etf);
        assert_eq!(classify("IWM"), AssetType::Etf);
        assert_eq!(classify("AAPL"), AssetType::Stock);
        assert_eq!(classify("NKE"), AssetType::Stock);
    }

    #[test]
    fn test_known_volatility_lookup() {
        assert_eq!(known_volatility("spy"), Some(0.15));
        assert_eq!(known_volatility("AGG"), Some(0.04));
        assert_eq!(known_volatility("ZZZZ"), None);
    }

    #[test]
    fn test_single_holding_bonus() {
        assert_eq!(HoldingCategory::of("VTI").diversification_bonus(), 4.0);
        assert_eq!(HoldingCategory::of("EEM").diversification_bonus(), 3.5);
        assert_eq!(HoldingCategory::of("BND").diversification_bonus(), 3.0);
        assert_eq!(HoldingCategory::of("XLK").diversification_bonus(), 2.0);
        assert_eq!(HoldingCategory::of("GLD").diversification_bonus(), 2.5);
        assert_eq!(HoldingCategory::of("MYINDEXX").diversification_bonus(), 2.5);
        assert_eq!(HoldingCategory::of("AAPL").diversification_bonus(), 1.0);
    }
}
