use crate::time::enums::{BusinessDayAdjustment, EndType, ScheduleFrequency};
use serde::{Deserialize, Serialize};

/// Which of an account's dated balance buckets a position rule touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionOperation {
    /// `position += amount`.
    Credit,
    /// `position -= amount`.
    Debit,
    /// `position = amount`.
    Set,
}

/// The kind of value a property holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// A fixed-point amount.
    Decimal,
    /// Free text.
    String,
    /// True/false.
    Boolean,
}

/// When a scheduled transaction or instalment fires relative to the other events
/// of its value date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timing {
    /// Before external transactions are processed for the day.
    StartOfDay,
    /// After external transactions are processed for the day.
    EndOfDay,
}

/// A named balance category an account carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionType {
    /// Unique name referenced by position rules and expressions.
    pub name: String,
    /// Human-readable label.
    pub label: String,
}

/// A named date slot an account instance carries (e.g. `end_date`, `accrual_start`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateType {
    /// Unique name referenced by expressions and instalment declarations.
    pub name: String,
    /// Human-readable label.
    pub label: String,
    /// Whether an `Account` built against this type must supply a value for it.
    #[serde(default = "default_true")]
    pub required: bool,
}

/// A named property an account carries, optionally value-dated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyType {
    /// Unique name referenced by expressions.
    pub name: String,
    /// Human-readable label.
    pub label: String,
    /// The value kind this property holds.
    pub data_type: DataType,
    /// Whether an `Account` built against this type must supply a value for it.
    #[serde(default = "default_true")]
    pub required: bool,
    /// Whether this property tracks a history of values by date rather than a
    /// single current value.
    #[serde(default)]
    pub value_dated: bool,
}

const fn default_true() -> bool {
    true
}

/// One balance mutation a transaction type applies when a transaction of its kind
/// is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionRule {
    /// Which mutation to apply.
    pub operation: PositionOperation,
    /// The position this rule touches.
    pub position_type_name: String,
}

/// A named kind of transaction and the balance mutations it applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionType {
    /// Unique name referenced by scheduled/triggered transactions and expressions.
    pub name: String,
    /// Human-readable label.
    pub label: String,
    /// The position mutations a transaction of this type applies, in order.
    #[serde(default)]
    pub position_rules: Vec<PositionRule>,
    /// If true, amounts of this type are not rounded to 2dp before being applied
    /// (used for daily interest accrual, to avoid systematic truncation error).
    #[serde(default)]
    pub maximum_precision: bool,
}

impl TransactionType {
    /// Appends a position rule to this transaction type, returning `self` so
    /// further rules can be chained.
    pub fn add_position_rule(
        &mut self,
        operation: PositionOperation,
        position_type_name: impl Into<String>,
    ) -> &mut Self {
        self.position_rules.push(PositionRule {
            operation,
            position_type_name: position_type_name.into(),
        });
        self
    }
}

/// A declared recurrence rule: how often a schedule's occurrences happen and when
/// they stop, expressed as expression strings evaluated against `account_type`
/// and the account at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleType {
    /// Unique name referenced by scheduled transactions and the instalment type.
    pub name: String,
    /// Human-readable label.
    pub label: String,
    /// Daily or monthly recurrence.
    pub frequency: ScheduleFrequency,
    /// How the schedule decides it has produced its last occurrence.
    pub end_type: EndType,
    /// How a raw occurrence is adjusted onto a business day.
    pub business_day_adjustment: BusinessDayAdjustment,
    /// Expression evaluating to the step interval (an integer).
    pub interval_expression: String,
    /// Expression evaluating to the schedule's start date.
    pub start_date_expression: String,
    /// Expression evaluating to the schedule's end date, required iff `end_type`
    /// is `end_date`.
    pub end_date_expression: Option<String>,
    /// Expression evaluating to the repeat count, required iff `end_type` is
    /// `end_repeats`.
    pub number_of_repeats_expression: Option<String>,
    /// Expression evaluating to an explicit list of dates to add to the schedule.
    pub include_dates_expression: Option<String>,
    /// Expression evaluating to an explicit list of dates to remove from the
    /// schedule.
    pub exclude_dates_expression: Option<String>,
    /// Whether the product author allows this schedule to be edited after account
    /// construction.
    #[serde(default = "default_true")]
    pub editable: bool,
}

impl ScheduleType {
    /// Sets the end-date expression, for chaining after `add_schedule_type`.
    pub fn with_end_date_expression(&mut self, expr: impl Into<String>) -> &mut Self {
        self.end_date_expression = Some(expr.into());
        self
    }

    /// Sets the repeat-count expression, for chaining after `add_schedule_type`.
    pub fn with_number_of_repeats_expression(&mut self, expr: impl Into<String>) -> &mut Self {
        self.number_of_repeats_expression = Some(expr.into());
        self
    }

    /// Sets the include-dates expression, for chaining after `add_schedule_type`.
    pub fn with_include_dates_expression(&mut self, expr: impl Into<String>) -> &mut Self {
        self.include_dates_expression = Some(expr.into());
        self
    }

    /// Sets the exclude-dates expression, for chaining after `add_schedule_type`.
    pub fn with_exclude_dates_expression(&mut self, expr: impl Into<String>) -> &mut Self {
        self.exclude_dates_expression = Some(expr.into());
        self
    }
}

/// A transaction that fires automatically whenever its schedule is due.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTransaction {
    /// The schedule that drives this transaction.
    pub schedule_name: String,
    /// Whether it fires at the start or end of the value date.
    pub timing: Timing,
    /// The transaction type to create when due.
    pub generated_transaction_type: String,
    /// Expression evaluating to the transaction amount.
    pub amount_expression: String,
}

/// A transaction that fires automatically immediately after another transaction
/// of a declared type is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggeredTransaction {
    /// The transaction type whose creation triggers this rule.
    pub trigger_transaction_type_name: String,
    /// The transaction type to create in response.
    pub generated_transaction_type: String,
    /// Expression evaluating to the transaction amount; evaluated with
    /// `transaction` bound to the triggering transaction.
    pub amount_expression: String,
}

/// The declared fixed-instalment product feature: an amount solved so that a
/// target position reaches zero by a target date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalmentType {
    /// Unique name.
    pub name: String,
    /// Human-readable label.
    pub label: String,
    /// Whether instalment transactions fire at the start or end of the value date.
    pub timing: Timing,
    /// The schedule whose occurrences seed instalment entries.
    pub schedule_name: String,
    /// The transaction type created for each instalment payment.
    pub transaction_type_name: String,
    /// The property an account exposes as the solved instalment amount.
    pub property_name: String,
    /// The position the solver drives to zero.
    pub solve_for_zero_position_name: String,
    /// The date slot naming the horizon the solver forecasts to.
    pub solve_for_date_name: String,
}
