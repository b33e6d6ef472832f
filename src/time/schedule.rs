use super::calendar::Calendar;
use super::date::Date;
use super::enums::{BusinessDayAdjustment, EndType, ScheduleFrequency, TimeUnit};
use crate::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeSet;

/// How far past a schedule's start date the memoised occurrence set is expanded.
/// Chosen so that any realistic account horizon (decades, not centuries) is covered
/// by a single materialisation pass.
const FAR_HORIZON_YEARS: i32 = 50;

/// A materialised recurrence rule: daily or monthly occurrences between a start
/// date and an end condition, adjusted onto business days and patched with
/// explicit include/exclude dates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    start_date: Date,
    frequency: ScheduleFrequency,
    interval: i32,
    end_type: EndType,
    adjustment: BusinessDayAdjustment,
    end_date: Option<Date>,
    number_of_repeats: Option<i32>,
    include_dates: BTreeSet<Date>,
    exclude_dates: BTreeSet<Date>,
    #[serde(skip)]
    memo: RefCell<Option<BTreeSet<Date>>>,
}

impl PartialEq for Schedule {
    fn eq(&self, other: &Self) -> bool {
        self.start_date == other.start_date
            && self.frequency == other.frequency
            && self.interval == other.interval
            && self.end_type == other.end_type
            && self.adjustment == other.adjustment
            && self.end_date == other.end_date
            && self.number_of_repeats == other.number_of_repeats
            && self.include_dates == other.include_dates
            && self.exclude_dates == other.exclude_dates
    }
}

impl Eq for Schedule {}

impl Schedule {
    /// Builds a schedule, rejecting a non-positive interval or an end date before
    /// the start date.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        start_date: Date,
        frequency: ScheduleFrequency,
        interval: i32,
        end_type: EndType,
        adjustment: BusinessDayAdjustment,
        end_date: Option<Date>,
        number_of_repeats: Option<i32>,
        include_dates: BTreeSet<Date>,
        exclude_dates: BTreeSet<Date>,
    ) -> Result<Self> {
        if interval <= 0 {
            return Err(EngineError::ScheduleError(format!(
                "interval must be positive, got {interval}"
            )));
        }
        if let Some(end_date) = end_date {
            if end_date < start_date {
                return Err(EngineError::ScheduleError(format!(
                    "end date {end_date} is before start date {start_date}"
                )));
            }
        }
        Ok(Schedule {
            start_date,
            frequency,
            interval,
            end_type,
            adjustment,
            end_date,
            number_of_repeats,
            include_dates,
            exclude_dates,
            memo: RefCell::new(None),
        })
    }

    /// True when this schedule can answer `is_due` without materialising the full
    /// occurrence set: daily, interval 1, no adjustment, no include/exclude dates.
    fn is_simple_daily(&self) -> bool {
        self.frequency == ScheduleFrequency::Daily
            && self.interval == 1
            && self.adjustment == BusinessDayAdjustment::AnyDay
            && self.include_dates.is_empty()
            && self.exclude_dates.is_empty()
    }

    /// True iff `date` is a due occurrence of this schedule.
    pub fn is_due(&self, date: Date, calendar: Option<&Calendar>) -> bool {
        if self.is_simple_daily() {
            return self.is_due_simple_daily(date);
        }
        self.occurrences(calendar).contains(&date)
    }

    fn is_due_simple_daily(&self, date: Date) -> bool {
        if date < self.start_date {
            return false;
        }
        match self.end_type {
            EndType::NoEnd => true,
            EndType::EndDate => self.end_date.map_or(true, |end| date <= end),
            EndType::EndRepeats => {
                let elapsed = date - self.start_date;
                self.number_of_repeats
                    .map_or(true, |n| elapsed < i64::from(n))
            }
        }
    }

    /// All occurrence dates up to and including `horizon`.
    pub fn dates_up_to(&self, horizon: Date, calendar: Option<&Calendar>) -> Vec<Date> {
        self.occurrences(calendar)
            .iter()
            .filter(|d| **d <= horizon)
            .copied()
            .collect()
    }

    fn occurrences(&self, calendar: Option<&Calendar>) -> std::cell::Ref<'_, BTreeSet<Date>> {
        if self.memo.borrow().is_none() {
            let expanded = self.materialize(calendar);
            *self.memo.borrow_mut() = Some(expanded);
        }
        std::cell::Ref::map(self.memo.borrow(), |m| {
            m.as_ref().expect("just populated above")
        })
    }

    fn materialize(&self, calendar: Option<&Calendar>) -> BTreeSet<Date> {
        let horizon = self.start_date.advance(FAR_HORIZON_YEARS, TimeUnit::Years);
        let units = match self.frequency {
            ScheduleFrequency::Daily => TimeUnit::Days,
            ScheduleFrequency::Monthly => TimeUnit::Months,
        };
        let mut dates = BTreeSet::new();
        let mut repeats: i32 = 1;
        loop {
            let raw = self.start_date.advance(self.interval * (repeats - 1), units);
            if raw > horizon {
                break;
            }
            if self.end_type == EndType::EndDate && self.end_date.is_some_and(|end| raw > end) {
                break;
            }
            if self.end_type == EndType::EndRepeats
                && self.number_of_repeats.is_some_and(|n| repeats > n)
            {
                break;
            }
            let adjusted = calendar.map_or(raw, |cal| cal.adjust(raw, self.adjustment));
            dates.insert(adjusted);
            repeats += 1;
        }
        for date in &self.include_dates {
            dates.insert(*date);
        }
        for date in &self.exclude_dates {
            dates.remove(date);
        }
        dates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn daily_no_end(start: Date) -> Schedule {
        Schedule::new(
            start,
            ScheduleFrequency::Daily,
            1,
            EndType::NoEnd,
            BusinessDayAdjustment::AnyDay,
            None,
            None,
            BTreeSet::new(),
            BTreeSet::new(),
        )
        .unwrap()
    }

    #[test]
    fn rejects_non_positive_interval() {
        let result = Schedule::new(
            Date::new(2020, 1, 1),
            ScheduleFrequency::Daily,
            0,
            EndType::NoEnd,
            BusinessDayAdjustment::AnyDay,
            None,
            None,
            BTreeSet::new(),
            BTreeSet::new(),
        );
        assert!(matches!(result, Err(EngineError::ScheduleError(_))));
    }

    #[test]
    fn rejects_end_date_before_start_date() {
        let result = Schedule::new(
            Date::new(2020, 1, 10),
            ScheduleFrequency::Daily,
            1,
            EndType::EndDate,
            BusinessDayAdjustment::AnyDay,
            Some(Date::new(2020, 1, 1)),
            None,
            BTreeSet::new(),
            BTreeSet::new(),
        );
        assert!(matches!(result, Err(EngineError::ScheduleError(_))));
    }

    #[test]
    fn daily_schedule_matches_every_day_in_range() {
        let schedule = daily_no_end(Date::new(2020, 1, 1));
        assert!(schedule.is_due(Date::new(2020, 1, 1), None));
        assert!(schedule.is_due(Date::new(2020, 6, 15), None));
        assert!(!schedule.is_due(Date::new(2019, 12, 31), None));
    }

    #[test]
    fn daily_no_end_cardinality_matches_day_span() {
        let schedule = daily_no_end(Date::new(2020, 1, 1));
        let end = Date::new(2020, 1, 31);
        let dates = schedule.dates_up_to(end, None);
        assert_eq!(dates.len(), (end - Date::new(2020, 1, 1) + 1) as usize);
        assert_eq!(dates[0], Date::new(2020, 1, 1));
        assert_eq!(*dates.last().unwrap(), end);
    }

    #[test]
    fn monthly_schedule_clamps_on_short_months() {
        let schedule = Schedule::new(
            Date::new(2020, 1, 31),
            ScheduleFrequency::Monthly,
            1,
            EndType::EndRepeats,
            BusinessDayAdjustment::AnyDay,
            None,
            Some(4),
            BTreeSet::new(),
            BTreeSet::new(),
        )
        .unwrap();
        let dates = schedule.dates_up_to(Date::new(2021, 1, 1), None);
        assert_eq!(
            dates,
            vec![
                Date::new(2020, 1, 31),
                Date::new(2020, 2, 29),
                Date::new(2020, 3, 31),
                Date::new(2020, 4, 30),
            ]
        );
    }

    #[test]
    fn include_and_exclude_dates_patch_the_materialised_set() {
        let mut exclude = BTreeSet::new();
        exclude.insert(Date::new(2020, 1, 2));
        let mut include = BTreeSet::new();
        include.insert(Date::new(2020, 3, 1));
        let schedule = Schedule::new(
            Date::new(2020, 1, 1),
            ScheduleFrequency::Daily,
            1,
            EndType::EndRepeats,
            BusinessDayAdjustment::AnyDay,
            None,
            Some(3),
            include,
            exclude,
        )
        .unwrap();
        assert!(schedule.is_due(Date::new(2020, 1, 1), None));
        assert!(!schedule.is_due(Date::new(2020, 1, 2), None));
        assert!(schedule.is_due(Date::new(2020, 3, 1), None));
    }

    #[test]
    fn memo_is_not_serialised() {
        let schedule = daily_no_end(Date::new(2020, 1, 1));
        schedule.is_due(Date::new(2020, 1, 1), None);
        let json = serde_json::to_string(&schedule).unwrap();
        assert!(!json.contains("memo"));
        let round_tripped: Schedule = serde_json::from_str(&json).unwrap();
        assert_eq!(round_tripped, schedule);
    }

    proptest! {
        #[test]
        fn daily_no_end_cardinality_equals_day_span_for_any_start_and_span(
            start_offset in 0i64..3650,
            span_days in 0i64..3650,
        ) {
            let start = Date::new(2000, 1, 1) + start_offset;
            let end = start + span_days;
            let schedule = daily_no_end(start);
            let dates = schedule.dates_up_to(end, None);
            prop_assert_eq!(dates.len() as i64, span_days + 1);
            prop_assert_eq!(dates[0], start);
            prop_assert_eq!(*dates.last().unwrap(), end);
        }
    }
}
