use super::enums::TimeUnit;
use crate::errors::Result;
use chrono::{Datelike, Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Extends `chrono::NaiveDate` with the month-clamped advance arithmetic the engine
/// needs for schedule stepping and relative-delta expressions.
/// # Examples
/// ```
/// use ledgerforge::time::date::NaiveDateExt;
/// use ledgerforge::time::enums::TimeUnit;
/// use chrono::NaiveDate;
///
/// let date = NaiveDate::from_ymd_opt(2020, 1, 31).unwrap();
/// assert_eq!(date.advance(1, TimeUnit::Months), NaiveDate::from_ymd_opt(2020, 2, 29).unwrap());
/// ```
pub trait NaiveDateExt {
    /// Number of days in the month this date falls in.
    fn days_in_month(&self) -> i32;
    /// Number of days in the year this date falls in.
    fn days_in_year(&self) -> i32;
    /// Ordinal day of the year, 1-based.
    fn day_of_year(&self) -> i32;
    /// True if this date's year is a leap year.
    fn date_has_leap_year(&self) -> bool;
    /// Advances by `n` units of `units`; month and year advances clamp to the last
    /// valid day of the target month.
    fn advance(&self, n: i32, units: TimeUnit) -> NaiveDate;
    /// The last day of the month containing `date`.
    fn end_of_month(date: NaiveDate) -> NaiveDate;
}

impl NaiveDateExt for NaiveDate {
    fn days_in_month(&self) -> i32 {
        let month = self.month();
        match month {
            1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
            4 | 6 | 9 | 11 => 30,
            _ => {
                if self.date_has_leap_year() {
                    29
                } else {
                    28
                }
            }
        }
    }

    fn days_in_year(&self) -> i32 {
        if self.date_has_leap_year() {
            366
        } else {
            365
        }
    }

    fn day_of_year(&self) -> i32 {
        let mut day = 0;
        for m in 1..self.month() {
            day += NaiveDate::from_ymd_opt(self.year(), m, 1)
                .map_or(0, |d| d.days_in_month());
        }
        day + self.day() as i32
    }

    fn date_has_leap_year(&self) -> bool {
        let year = self.year();
        year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
    }

    fn advance(&self, n: i32, units: TimeUnit) -> NaiveDate {
        let date = *self;
        match units {
            TimeUnit::Days => date + Duration::days(i64::from(n)),
            TimeUnit::Weeks => date + Duration::days(7 * i64::from(n)),
            TimeUnit::Months => advance_months(date, n),
            TimeUnit::Years => advance_months(date, 12 * n),
        }
    }

    fn end_of_month(date: NaiveDate) -> NaiveDate {
        let first_of_next = NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
            .expect("month/year from an existing date is always valid")
            + Months::new(1);
        first_of_next - Duration::days(1)
    }
}

/// Advances `date` by `months` calendar months, clamping the day-of-month to the
/// last valid day when the target month is shorter (month-clamped, not rollover,
/// semantics — e.g. Jan 31 + 1 month = Feb 28/29, never Mar 3).
fn advance_months(date: NaiveDate, months: i32) -> NaiveDate {
    let total = date.year() * 12 + date.month() as i32 - 1 + months;
    let year = total.div_euclid(12);
    let month = total.rem_euclid(12) as u32 + 1;
    let day = date.day();
    for candidate in (1..=day).rev() {
        if let Some(d) = NaiveDate::from_ymd_opt(year, month, candidate) {
            return d;
        }
    }
    unreachable!("every month has at least one valid day")
}

/// A relative date delta in days, months, and years, combining the way Python's
/// `dateutil.relativedelta` does: years and months are applied together as a
/// single month-clamped step, then days are applied as a plain day offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RelativeDelta {
    days: i32,
    months: i32,
    years: i32,
}

impl RelativeDelta {
    /// Builds a delta from explicit day/month/year components.
    #[must_use]
    pub const fn new(days: i32, months: i32, years: i32) -> Self {
        RelativeDelta {
            days,
            months,
            years,
        }
    }

    /// A delta of `n` days.
    #[must_use]
    pub const fn days(n: i32) -> Self {
        Self::new(n, 0, 0)
    }

    /// A delta of `n` months.
    #[must_use]
    pub const fn months(n: i32) -> Self {
        Self::new(0, n, 0)
    }

    /// A delta of `n` years.
    #[must_use]
    pub const fn years(n: i32) -> Self {
        Self::new(0, 0, n)
    }

    #[must_use]
    const fn negated(self) -> Self {
        Self::new(-self.days, -self.months, -self.years)
    }
}

/// # Date
/// Wrapper around `chrono::NaiveDate`.
/// # Examples
/// ```
/// use ledgerforge::time::date::Date;
/// let date = Date::new(2020, 2, 15);
/// assert_eq!(date.day(), 15);
/// assert_eq!(date.month(), 2);
/// assert_eq!(date.year(), 2020);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Date {
    base_date: NaiveDate,
}

impl From<NaiveDate> for Date {
    fn from(base_date: NaiveDate) -> Self {
        Date { base_date }
    }
}

impl Serialize for Date {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Date {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Date, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Date::from_str(&s, "%Y-%m-%d").map_err(serde::de::Error::custom)
    }
}

impl Date {
    /// Builds a date from its year/month/day components.
    /// # Panics
    /// Panics if the combination is not a valid calendar date.
    #[must_use]
    pub fn new(year: i32, month: u32, day: u32) -> Date {
        NaiveDate::from_ymd_opt(year, month, day).map_or_else(
            || panic!("invalid date: {year}-{month}-{day}"),
            Date::from,
        )
    }

    /// Parses a date from `date` using the `chrono` strftime pattern `fmt`.
    pub fn from_str(date: &str, fmt: &str) -> Result<Date> {
        let base_date = NaiveDate::parse_from_str(date, fmt)?;
        Ok(Date::from(base_date))
    }

    /// Formats this date using the `chrono` strftime pattern `fmt`.
    #[must_use]
    pub fn to_str(&self, fmt: &str) -> String {
        self.base_date.format(fmt).to_string()
    }

    /// The wrapped `chrono::NaiveDate`.
    #[must_use]
    pub const fn base_date(&self) -> NaiveDate {
        self.base_date
    }

    /// Day of month, 1-31.
    #[must_use]
    pub fn day(&self) -> u32 {
        self.base_date.day()
    }

    /// Month of year, 1-12.
    #[must_use]
    pub fn month(&self) -> u32 {
        self.base_date.month()
    }

    /// Calendar year.
    #[must_use]
    pub fn year(&self) -> i32 {
        self.base_date.year()
    }

    /// Number of days in this date's month.
    #[must_use]
    pub fn days_in_month(&self) -> i32 {
        self.base_date.days_in_month()
    }

    /// True if this date falls on a Saturday or Sunday.
    #[must_use]
    pub fn is_weekend(&self) -> bool {
        matches!(
            self.base_date.weekday(),
            chrono::Weekday::Sat | chrono::Weekday::Sun
        )
    }

    /// Advances by `n` units of `units` (month-clamped for months/years).
    #[must_use]
    pub fn advance(&self, n: i32, units: TimeUnit) -> Date {
        Date::from(self.base_date.advance(n, units))
    }

    /// The last day of this date's month.
    #[must_use]
    pub fn end_of_month(date: Date) -> Date {
        Date::from(NaiveDate::end_of_month(date.base_date))
    }

    /// The minimum representable date, used as a sentinel for "unset".
    #[must_use]
    pub const fn empty() -> Date {
        Date {
            base_date: NaiveDate::MIN,
        }
    }
}

impl Display for Date {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.base_date.format("%Y-%m-%d"))
    }
}

/// # Sub for Date
/// Subtracts two dates, returning the difference in days.
/// # Examples
/// ```
/// use ledgerforge::time::date::Date;
/// let date1 = Date::new(2020, 2, 15);
/// let date2 = Date::new(2020, 2, 10);
/// assert_eq!(date1 - date2, 5);
/// ```
impl Sub for Date {
    type Output = i64;

    fn sub(self, rhs: Self) -> Self::Output {
        (self.base_date - rhs.base_date).num_days()
    }
}

/// Adds a `RelativeDelta` to a `Date`: years+months apply first (month-clamped),
/// then days.
/// # Examples
/// ```
/// use ledgerforge::time::date::{Date, RelativeDelta};
/// let date = Date::new(2020, 1, 31);
/// assert_eq!(date + RelativeDelta::months(1), Date::new(2020, 2, 29));
/// ```
impl Add<RelativeDelta> for Date {
    type Output = Date;

    fn add(self, rhs: RelativeDelta) -> Self::Output {
        let stepped = advance_months(self.base_date, rhs.years * 12 + rhs.months);
        Date::from(stepped + Duration::days(i64::from(rhs.days)))
    }
}

impl Sub<RelativeDelta> for Date {
    type Output = Date;

    fn sub(self, rhs: RelativeDelta) -> Self::Output {
        self + rhs.negated()
    }
}

impl Add<i64> for Date {
    type Output = Date;

    fn add(self, rhs: i64) -> Self::Output {
        Date::from(self.base_date + Duration::days(rhs))
    }
}

impl AddAssign<i64> for Date {
    fn add_assign(&mut self, rhs: i64) {
        self.base_date += Duration::days(rhs);
    }
}

impl Sub<i64> for Date {
    type Output = Date;

    fn sub(self, rhs: i64) -> Self::Output {
        Date::from(self.base_date - Duration::days(rhs))
    }
}

impl SubAssign<i64> for Date {
    fn sub_assign(&mut self, rhs: i64) {
        self.base_date -= Duration::days(rhs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_days() {
        let date = Date::new(2020, 1, 15);
        assert_eq!(date.advance(15, TimeUnit::Days), Date::new(2020, 1, 30));
    }

    #[test]
    fn advances_months_with_clamp() {
        let date = Date::new(2020, 1, 31);
        assert_eq!(date.advance(1, TimeUnit::Months), Date::new(2020, 2, 29));
        let date = Date::new(2021, 1, 31);
        assert_eq!(date.advance(1, TimeUnit::Months), Date::new(2021, 2, 28));
    }

    #[test]
    fn relative_delta_combines_years_months_and_days() {
        let date = Date::new(2019, 12, 31);
        let delta = RelativeDelta::new(1, 1, 1);
        assert_eq!(date + delta, Date::new(2021, 2, 1));
    }

    #[test]
    fn relative_delta_subtraction_negates() {
        let date = Date::new(2020, 3, 1);
        assert_eq!(date - RelativeDelta::months(1), Date::new(2020, 2, 1));
    }

    #[test]
    fn date_difference_in_days() {
        assert_eq!(Date::new(2020, 2, 15) - Date::new(2020, 2, 10), 5);
    }

    #[test]
    fn serializes_as_iso_string() {
        let date = Date::new(2020, 2, 15);
        assert_eq!(serde_json::to_string(&date).unwrap(), "\"2020-02-15\"");
        let round_tripped: Date = serde_json::from_str("\"2020-02-15\"").unwrap();
        assert_eq!(round_tripped, date);
    }
}
