use crate::errors::{EngineError, Result};
use crate::expr::{evaluate, Environment, Value};
use crate::product::account_type::AccountType;
use crate::product::types::PositionOperation;
use crate::time::date::Date;
use crate::time::schedule::Schedule;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One instalment entry: the amount stamped on its value date, and whether the
/// solver has already fixed it (seeded entries start unfixed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instalment {
    /// The amount to apply on this instalment's value date.
    pub amount: Decimal,
    /// Whether this entry's amount has been fixed by a prior solve.
    pub is_fixed: bool,
}

/// A single immutable transaction, once appended to an account's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// The date the transaction was recorded (the simulation's "as-of" date).
    pub action_date: Date,
    /// The date the transaction's amount takes effect.
    pub value_date: Date,
    /// The declared transaction type this transaction is an instance of.
    pub transaction_type_name: String,
    /// The signed amount.
    pub amount: Decimal,
    /// Whether this transaction was generated by the engine rather than supplied externally.
    pub system_generated: bool,
}

/// An externally supplied transaction to be injected during a forecast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalTransaction {
    /// The declared transaction type to instantiate.
    pub transaction_type_name: String,
    /// The signed amount.
    pub amount: Decimal,
    /// The date the transaction takes effect.
    pub value_date: Date,
}

/// # Account
/// Mutable simulation state for one instance of an `AccountType`: balances,
/// properties, materialised schedules, and the append-only transaction history.
///
/// Constructed once from an `AccountType` and an instance's starting property
/// and date values; thereafter mutated exclusively by the valuation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// The date the account instance begins.
    pub start_date: Date,
    /// Back-reference to the declaring product's name.
    pub account_type_name: String,
    /// Current balance per declared position.
    pub positions: BTreeMap<String, Decimal>,
    /// Current value per non-value-dated property.
    pub properties: BTreeMap<String, Value>,
    /// History of values per value-dated property, keyed by effective date.
    pub value_dated_properties: BTreeMap<String, BTreeMap<Date, Value>>,
    /// Named date slots.
    pub dates: BTreeMap<String, Date>,
    /// Materialised schedule per declared schedule type.
    pub schedules: BTreeMap<String, Schedule>,
    /// Append-only transaction history, in the order transactions were created.
    pub transactions: Vec<Transaction>,
    /// Instalment entries, keyed by value date.
    pub instalments: BTreeMap<Date, Instalment>,
}

impl Account {
    /// Builds an account instance from `account_type`'s declarations and the
    /// supplied initial property/date values.
    ///
    /// Validates that every required property and date is present, zeroes a
    /// position for every name referenced by a transaction type's position
    /// rules, evaluates each schedule type's expressions against the
    /// partially built account to materialise its schedules, and seeds one
    /// unfixed zero-amount instalment entry per occurrence of the instalment
    /// schedule, if an instalment type is declared.
    pub fn new(
        account_type: &AccountType,
        start_date: Date,
        properties: BTreeMap<String, Value>,
        value_dated_properties: BTreeMap<String, BTreeMap<Date, Value>>,
        dates: BTreeMap<String, Date>,
    ) -> Result<Account> {
        account_type.validate()?;
        for property_type in &account_type.property_types {
            if property_type.required
                && !properties.contains_key(&property_type.name)
                && !value_dated_properties.contains_key(&property_type.name)
            {
                return Err(EngineError::ValidationError(format!(
                    "missing required property `{}`",
                    property_type.name
                )));
            }
        }
        for date_type in &account_type.date_types {
            if date_type.required && !dates.contains_key(&date_type.name) {
                return Err(EngineError::ValidationError(format!(
                    "missing required date `{}`",
                    date_type.name
                )));
            }
        }

        let mut positions = BTreeMap::new();
        for transaction_type in &account_type.transaction_types {
            for rule in &transaction_type.position_rules {
                positions
                    .entry(rule.position_type_name.clone())
                    .or_insert(Decimal::ZERO);
            }
        }

        let mut account = Account {
            start_date,
            account_type_name: account_type.name.clone(),
            positions,
            properties,
            value_dated_properties,
            dates,
            schedules: BTreeMap::new(),
            transactions: Vec::new(),
            instalments: BTreeMap::new(),
        };

        for schedule_type in &account_type.schedule_types {
            let schedule = account.build_schedule(account_type, schedule_type)?;
            account
                .schedules
                .insert(schedule_type.name.clone(), schedule);
        }

        if let Some(instalment_type) = &account_type.instalment_type {
            let schedule = account
                .schedules
                .get(&instalment_type.schedule_name)
                .ok_or_else(|| {
                    EngineError::ConfigurationError(format!(
                        "instalment type references undeclared schedule `{}`",
                        instalment_type.schedule_name
                    ))
                })?;
            let horizon = account
                .dates
                .get(&instalment_type.solve_for_date_name)
                .copied()
                .unwrap_or_else(|| start_date.advance(50, crate::time::enums::TimeUnit::Years));
            for due_date in schedule.dates_up_to(horizon, Some(&account_type.calendar)) {
                account.instalments.insert(
                    due_date,
                    Instalment {
                        amount: Decimal::ZERO,
                        is_fixed: false,
                    },
                );
            }
        }

        Ok(account)
    }

    fn build_schedule(
        &self,
        account_type: &AccountType,
        schedule_type: &crate::product::types::ScheduleType,
    ) -> Result<Schedule> {
        let env = Environment::new(self, account_type, self.start_date, None);
        let start = evaluate(&schedule_type.start_date_expression, &env)?
            .as_date()
            .ok_or_else(|| EngineError::ExpressionError {
                expression: schedule_type.start_date_expression.clone(),
                cause: "expected a date".to_string(),
            })?;
        let interval = evaluate(&schedule_type.interval_expression, &env)?
            .as_decimal()
            .ok_or_else(|| EngineError::ExpressionError {
                expression: schedule_type.interval_expression.clone(),
                cause: "expected a number".to_string(),
            })?;
        let interval = interval.to_i32().ok_or_else(|| EngineError::ExpressionError {
            expression: schedule_type.interval_expression.clone(),
            cause: "interval does not fit in an i32".to_string(),
        })?;

        let end_date = schedule_type
            .end_date_expression
            .as_ref()
            .map(|expr| -> Result<Date> {
                evaluate(expr, &env)?
                    .as_date()
                    .ok_or_else(|| EngineError::ExpressionError {
                        expression: expr.clone(),
                        cause: "expected a date".to_string(),
                    })
            })
            .transpose()?;

        let number_of_repeats = schedule_type
            .number_of_repeats_expression
            .as_ref()
            .map(|expr| -> Result<i32> {
                let value = evaluate(expr, &env)?
                    .as_decimal()
                    .ok_or_else(|| EngineError::ExpressionError {
                        expression: expr.clone(),
                        cause: "expected a number".to_string(),
                    })?;
                value.to_i32().ok_or_else(|| EngineError::ExpressionError {
                    expression: expr.clone(),
                    cause: "repeat count does not fit in an i32".to_string(),
                })
            })
            .transpose()?;

        let include_dates = schedule_type
            .include_dates_expression
            .as_ref()
            .map(|expr| self.eval_date_list(&env, expr))
            .transpose()?
            .unwrap_or_default();
        let exclude_dates = schedule_type
            .exclude_dates_expression
            .as_ref()
            .map(|expr| self.eval_date_list(&env, expr))
            .transpose()?
            .unwrap_or_default();

        Schedule::new(
            start,
            schedule_type.frequency,
            interval,
            schedule_type.end_type,
            schedule_type.business_day_adjustment,
            end_date,
            number_of_repeats,
            include_dates,
            exclude_dates,
        )
    }

    /// Evaluates an expression expected to name a single date and wraps it as a
    /// one-element list, since the mini-language has no list literal: product
    /// authors write e.g. `account.end_date` for a single include/exclude date.
    fn eval_date_list(
        &self,
        env: &Environment<'_>,
        expr: &str,
    ) -> Result<std::collections::BTreeSet<Date>> {
        let value = evaluate(expr, env)?;
        let date = value.as_date().ok_or_else(|| EngineError::ExpressionError {
            expression: expr.to_string(),
            cause: "expected a date".to_string(),
        })?;
        Ok(std::iter::once(date).collect())
    }

    /// Applies each position rule of `transaction_type` to this account's
    /// positions for `transaction`, then appends `transaction` to the history.
    /// Returns the names of positions touched, with their updated balances.
    pub fn add_transaction(
        &mut self,
        transaction: Transaction,
        transaction_type: &crate::product::types::TransactionType,
    ) -> Result<Vec<(String, Decimal)>> {
        let mut touched = Vec::new();
        for rule in &transaction_type.position_rules {
            let position = self
                .positions
                .get_mut(&rule.position_type_name)
                .ok_or_else(|| {
                    EngineError::ConfigurationError(format!(
                        "position rule references undeclared position `{}`",
                        rule.position_type_name
                    ))
                })?;
            *position = match rule.operation {
                PositionOperation::Credit => *position + transaction.amount,
                PositionOperation::Debit => *position - transaction.amount,
                PositionOperation::Set => transaction.amount,
            };
            touched.push((rule.position_type_name.clone(), *position));
        }
        self.transactions.push(transaction);
        Ok(touched)
    }

    /// The current balance of `position_name`, or `None` if undeclared.
    #[must_use]
    pub fn position(&self, position_name: &str) -> Option<Decimal> {
        self.positions.get(position_name).copied()
    }

    /// The current value of non-value-dated property `name`.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// The value of value-dated property `name` at the greatest key `<= date`.
    pub fn value_dated_property_at(&self, name: &str, date: Date) -> Result<&Value> {
        self.value_dated_properties
            .get(name)
            .and_then(|history| history.range(..=date).next_back())
            .map(|(_, value)| value)
            .ok_or_else(|| {
                EngineError::PropertyNotDefined(format!(
                    "no value of `{name}` defined on or before {date}"
                ))
            })
    }

    /// The named date slot, if set.
    #[must_use]
    pub fn date(&self, name: &str) -> Option<Date> {
        self.dates.get(name).copied()
    }

    /// Resets simulation state to its just-constructed shape: zero positions,
    /// no transactions, instalments kept but unfixed entries zeroed. Used by
    /// the instalment solver between trial evaluations.
    pub fn reset_for_solve(&mut self) {
        for position in self.positions.values_mut() {
            *position = Decimal::ZERO;
        }
        self.transactions.clear();
        for instalment in self.instalments.values_mut() {
            if !instalment.is_fixed {
                instalment.amount = Decimal::ZERO;
            }
        }
    }
}
