use serde::{Deserialize, Serialize};

/// Unit of a date-advance step. Shared by `Date::advance` and schedule stepping.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TimeUnit {
    /// Calendar days.
    Days,
    /// Calendar weeks (7 days).
    Weeks,
    /// Calendar months, clamped to the last valid day of the target month.
    Months,
    /// Calendar years, clamped the same way as months.
    Years,
}

/// How often a schedule's occurrences recur.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleFrequency {
    /// One occurrence every `interval` days.
    Daily,
    /// One occurrence every `interval` months.
    Monthly,
}

/// How a schedule decides it has produced its last occurrence.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndType {
    /// Never stops before the forecast horizon.
    NoEnd,
    /// Stops after a fixed number of repeats.
    EndRepeats,
    /// Stops once the raw occurrence date passes a declared end date.
    EndDate,
}

/// How a raw schedule occurrence is adjusted onto a business day.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessDayAdjustment {
    /// No adjustment; the raw date is used as-is.
    AnyDay,
    /// Step forward until a business day is reached.
    NextBusinessDay,
    /// Step backward until a business day is reached.
    PreviousBusinessDay,
    /// Whichever of the previous/next business day is nearer; ties prefer next.
    ClosestBusinessDayOrNext,
    /// Next business day if it falls in the same month, otherwise previous business day.
    NextBusinessDayThisMonthOrPrevious,
}
