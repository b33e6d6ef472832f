use super::enums::BusinessDayAdjustment;
use crate::time::date::Date;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A named set of holiday dates plus the weekend rule (Saturday/Sunday are never
/// business days, regardless of the holiday set).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calendar {
    name: String,
    default: bool,
    holidays: HashSet<Date>,
}

impl Calendar {
    /// Builds an empty calendar (weekends-only) with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Calendar {
            name: name.into(),
            default: false,
            holidays: HashSet::new(),
        }
    }

    /// Marks this calendar as the implicit default used when no calendar reference
    /// is configured on a schedule.
    #[must_use]
    pub const fn as_default(mut self, default: bool) -> Self {
        self.default = default;
        self
    }

    /// This calendar's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True if this is the implicit default calendar.
    #[must_use]
    pub const fn is_default(&self) -> bool {
        self.default
    }

    /// Adds a holiday date.
    pub fn add_holiday(&mut self, date: Date) {
        self.holidays.insert(date);
    }

    /// True iff `date` is a weekday and not a declared holiday.
    #[must_use]
    pub fn is_business_day(&self, date: Date) -> bool {
        !date.is_weekend() && !self.holidays.contains(&date)
    }

    /// Adjusts a raw occurrence date onto a business day per `mode`.
    #[must_use]
    pub fn adjust(&self, date: Date, mode: BusinessDayAdjustment) -> Date {
        match mode {
            BusinessDayAdjustment::AnyDay => date,
            BusinessDayAdjustment::NextBusinessDay => self.next_business_day(date),
            BusinessDayAdjustment::PreviousBusinessDay => self.previous_business_day(date),
            BusinessDayAdjustment::ClosestBusinessDayOrNext => {
                let next = self.next_business_day(date);
                let previous = self.previous_business_day(date);
                if next - date <= date - previous {
                    next
                } else {
                    previous
                }
            }
            BusinessDayAdjustment::NextBusinessDayThisMonthOrPrevious => {
                let next = self.next_business_day(date);
                if next.month() == date.month() {
                    next
                } else {
                    self.previous_business_day(date)
                }
            }
        }
    }

    fn next_business_day(&self, mut date: Date) -> Date {
        while !self.is_business_day(date) {
            date += 1;
        }
        date
    }

    fn previous_business_day(&self, mut date: Date) -> Date {
        while !self.is_business_day(date) {
            date -= 1;
        }
        date
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calendar_with_holiday(year: i32, month: u32, day: u32) -> Calendar {
        let mut calendar = Calendar::new("test");
        calendar.add_holiday(Date::new(year, month, day));
        calendar
    }

    /// A Euro-market calendar covering 2019's holidays, used to exercise every
    /// adjustment mode against a real long-weekend pattern rather than a single
    /// synthetic holiday.
    fn euro_calendar_2019() -> Calendar {
        let mut calendar = Calendar::new("Euro Calendar").as_default(true);
        calendar.add_holiday(Date::new(2019, 1, 1));
        calendar.add_holiday(Date::new(2019, 4, 19));
        calendar.add_holiday(Date::new(2019, 4, 22));
        calendar.add_holiday(Date::new(2019, 5, 1));
        calendar.add_holiday(Date::new(2019, 12, 25));
        calendar.add_holiday(Date::new(2019, 12, 26));
        calendar
    }

    #[test]
    fn easter_long_weekend_business_days_and_adjustments() {
        let calendar = euro_calendar_2019();

        assert!(calendar.is_business_day(Date::new(2019, 4, 18)));
        assert!(!calendar.is_business_day(Date::new(2019, 4, 19)));
        assert!(!calendar.is_business_day(Date::new(2019, 4, 20)));
        assert!(!calendar.is_business_day(Date::new(2019, 4, 21)));
        assert!(!calendar.is_business_day(Date::new(2019, 4, 22)));
        assert!(calendar.is_business_day(Date::new(2019, 4, 23)));

        assert_eq!(
            calendar.adjust(Date::new(2019, 4, 19), BusinessDayAdjustment::NextBusinessDay),
            Date::new(2019, 4, 23)
        );
        assert_eq!(
            calendar.adjust(
                Date::new(2019, 4, 22),
                BusinessDayAdjustment::PreviousBusinessDay
            ),
            Date::new(2019, 4, 18)
        );

        assert_eq!(
            calendar.adjust(
                Date::new(2019, 4, 20),
                BusinessDayAdjustment::ClosestBusinessDayOrNext
            ),
            Date::new(2019, 4, 18)
        );
        assert_eq!(
            calendar.adjust(
                Date::new(2019, 4, 21),
                BusinessDayAdjustment::ClosestBusinessDayOrNext
            ),
            Date::new(2019, 4, 23)
        );

        assert_eq!(
            calendar.adjust(
                Date::new(2019, 8, 31),
                BusinessDayAdjustment::NextBusinessDayThisMonthOrPrevious
            ),
            Date::new(2019, 8, 30)
        );
        assert_eq!(
            calendar.adjust(
                Date::new(2019, 9, 29),
                BusinessDayAdjustment::NextBusinessDayThisMonthOrPrevious
            ),
            Date::new(2019, 9, 30)
        );
        assert_eq!(
            calendar.adjust(Date::new(2019, 9, 29), BusinessDayAdjustment::AnyDay),
            Date::new(2019, 9, 29)
        );
    }

    #[test]
    fn weekends_are_never_business_days() {
        let calendar = Calendar::new("test");
        // 2019-12-28 is a Saturday.
        assert!(!calendar.is_business_day(Date::new(2019, 12, 28)));
    }

    #[test]
    fn next_business_day_steps_forward_over_holidays_and_weekends() {
        let calendar = calendar_with_holiday(2019, 12, 25);
        // Dec 25 2019 is a Wednesday holiday.
        let adjusted = calendar.adjust(
            Date::new(2019, 12, 25),
            BusinessDayAdjustment::NextBusinessDay,
        );
        assert_eq!(adjusted, Date::new(2019, 12, 26));
    }

    #[test]
    fn previous_business_day_steps_backward() {
        let calendar = calendar_with_holiday(2019, 12, 25);
        let adjusted = calendar.adjust(
            Date::new(2019, 12, 25),
            BusinessDayAdjustment::PreviousBusinessDay,
        );
        assert_eq!(adjusted, Date::new(2019, 12, 24));
    }

    #[test]
    fn closest_working_day_prefers_next_on_tie() {
        // A Saturday holiday has previous=Friday and next=Monday equidistant.
        let calendar = Calendar::new("test");
        let adjusted = calendar.adjust(
            Date::new(2019, 12, 28),
            BusinessDayAdjustment::ClosestBusinessDayOrNext,
        );
        assert_eq!(adjusted, Date::new(2019, 12, 30));
    }

    #[test]
    fn next_business_day_this_month_or_previous_falls_back_across_month_end() {
        // Dec 31 2019 is a Tuesday business day itself, so adjust a holiday on Dec 31.
        let calendar = calendar_with_holiday(2019, 12, 31);
        let adjusted = calendar.adjust(
            Date::new(2019, 12, 31),
            BusinessDayAdjustment::NextBusinessDayThisMonthOrPrevious,
        );
        // next business day (Jan 1 2020, also a holiday candidate but not declared
        // here) falls in January, so we fall back to the previous business day.
        assert_eq!(adjusted, Date::new(2019, 12, 30));
    }
}
