#![allow(dead_code)]

use chrono::NaiveDate;
use portfolio_risk::calendar::is_business_day;
use portfolio_risk::market_data::PriceSeries;

pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// The first `count` Monday-Friday dates on or after `start`
pub fn business_days(start: NaiveDate, count: usize) -> Vec<NaiveDate> {
    start
        .iter_days()
        .filter(|date| is_business_day(*date))
        .take(count)
        .collect()
}

/// Prices starting at 100 that realize `returns` on consecutive business days
pub fn prices_from_returns(ticker: &str, start: NaiveDate, returns: &[f64]) -> PriceSeries {
    let dates = business_days(start, returns.len() + 1);
    let mut price = 100.0;
    let mut points = vec![(dates[0], price)];
    for (date, r) in dates[1..].iter().zip(returns) {
        price *= 1.0 + r;
        points.push((*date, price));
    }
    PriceSeries::new(ticker, points)
}

/// Deterministic pseudo-random daily returns in roughly +/-2%
pub fn wiggle(seed: u64, count: usize) -> Vec<f64> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..count)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let unit = (state >> 11) as f64 / (1u64 << 53) as f64;
            (unit - 0.5) * 0.04
        })
        .collect()
}

/// Geometric slide from 1.0 to `low` over `down` days, then to `high` over `up` days
pub fn crash_and_recovery(down: usize, low: f64, up: usize, high: f64) -> Vec<f64> {
    let fall = low.powf(1.0 / down as f64) - 1.0;
    let rise = (high / low).powf(1.0 / up as f64) - 1.0;
    std::iter::repeat_n(fall, down)
        .chain(std::iter::repeat_n(rise, up))
        .collect()
}
