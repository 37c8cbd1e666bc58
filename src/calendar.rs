use chrono::{Datelike, NaiveDate, Weekday};

pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Count Monday-Friday dates in `[start, end]`, zero when the range is inverted
pub fn business_days_between(start: NaiveDate, end: NaiveDate) -> usize {
    if start > end {
        return 0;
    }
    start
        .iter_days()
        .take_while(|date| *date <= end)
        .filter(|date| is_business_day(*date))
        .count()
}

/// (year, month) bucket of a date
pub fn month_key(date: NaiveDate) -> (i32, u32) {
    (date.year(), date.month())
}

/// (year, quarter) bucket of a date, quarters numbered 1-4
pub fn quarter_key(date: NaiveDate) -> (i32, u32) {
    (date.year(), (date.month() - 1) / 3 + 1)
}
