use super::types::{
    DataType, DateType, InstalmentType, PositionType, PropertyType, ScheduleType,
    ScheduledTransaction, Timing, TransactionType, TriggeredTransaction,
};
use crate::errors::{EngineError, Result};
use crate::rates::rate_table::RateTable;
use crate::time::calendar::Calendar;
use crate::time::enums::{BusinessDayAdjustment, EndType, ScheduleFrequency};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

fn default_calendar() -> Arc<Calendar> {
    Arc::new(Calendar::new("default").as_default(true))
}

/// # `AccountType`
/// Immutable-once-built declarative product description: every position,
/// property, date slot, transaction type, schedule, scheduled/triggered
/// transaction, rate table, and instalment rule an `Account` of this product
/// carries.
///
/// Built through the chainable `add_*` methods, in the style of a fluent
/// instrument builder, then checked with [`AccountType::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountType {
    /// Product name.
    pub name: String,
    /// Human-readable label.
    pub label: String,
    /// Declared transaction kinds, in declaration order (scheduled/end-of-day
    /// firing order follows this order for ties).
    #[serde(default)]
    pub transaction_types: Vec<TransactionType>,
    /// Declared balance categories.
    #[serde(default)]
    pub position_types: Vec<PositionType>,
    /// Declared date slots.
    #[serde(default)]
    pub date_types: Vec<DateType>,
    /// Declared properties.
    #[serde(default)]
    pub property_types: Vec<PropertyType>,
    /// Declared recurrence rules.
    #[serde(default)]
    pub schedule_types: Vec<ScheduleType>,
    /// Declared scheduled transactions, in declaration order.
    #[serde(default)]
    pub scheduled_transactions: Vec<ScheduledTransaction>,
    /// Declared triggered transactions.
    #[serde(default)]
    pub triggered_transactions: Vec<TriggeredTransaction>,
    /// Declared rate tables, keyed by name.
    #[serde(default)]
    pub rate_types: BTreeMap<String, RateTable>,
    /// The optional fixed-instalment feature.
    #[serde(default)]
    pub instalment_type: Option<InstalmentType>,
    /// The calendar every schedule's business-day adjustment is computed
    /// against. Shared read-only across every `Account` built from this
    /// product, hence the `Arc`. Defaults to a weekends-only calendar.
    #[serde(default = "default_calendar")]
    pub calendar: Arc<Calendar>,
}

impl AccountType {
    /// Builds an empty product description.
    #[must_use]
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        AccountType {
            name: name.into(),
            label: label.into(),
            transaction_types: Vec::new(),
            position_types: Vec::new(),
            date_types: Vec::new(),
            property_types: Vec::new(),
            schedule_types: Vec::new(),
            scheduled_transactions: Vec::new(),
            triggered_transactions: Vec::new(),
            rate_types: BTreeMap::new(),
            instalment_type: None,
            calendar: default_calendar(),
        }
    }

    /// Attaches the calendar every schedule's business-day adjustment is
    /// computed against, replacing the default weekends-only calendar.
    pub fn with_calendar(&mut self, calendar: Calendar) -> &mut Self {
        self.calendar = Arc::new(calendar);
        self
    }

    /// Declares a position, returning it for further (currently none) chaining.
    pub fn add_position_type(
        &mut self,
        name: impl Into<String>,
        label: impl Into<String>,
    ) -> &mut PositionType {
        self.position_types.push(PositionType {
            name: name.into(),
            label: label.into(),
        });
        self.position_types
            .last_mut()
            .expect("just pushed above")
    }

    /// Declares a date slot.
    pub fn add_date_type(
        &mut self,
        name: impl Into<String>,
        label: impl Into<String>,
    ) -> &mut DateType {
        self.date_types.push(DateType {
            name: name.into(),
            label: label.into(),
            required: true,
        });
        self.date_types.last_mut().expect("just pushed above")
    }

    /// Declares a property.
    pub fn add_property_type(
        &mut self,
        name: impl Into<String>,
        label: impl Into<String>,
        data_type: DataType,
        value_dated: bool,
    ) -> &mut PropertyType {
        self.property_types.push(PropertyType {
            name: name.into(),
            label: label.into(),
            data_type,
            required: true,
            value_dated,
        });
        self.property_types
            .last_mut()
            .expect("just pushed above")
    }

    /// Declares a transaction type, returning it so position rules can be
    /// chained: `account_type.add_transaction_type(...).add_position_rule(...)`.
    pub fn add_transaction_type(
        &mut self,
        name: impl Into<String>,
        label: impl Into<String>,
        maximum_precision: bool,
    ) -> &mut TransactionType {
        self.transaction_types.push(TransactionType {
            name: name.into(),
            label: label.into(),
            position_rules: Vec::new(),
            maximum_precision,
        });
        self.transaction_types
            .last_mut()
            .expect("just pushed above")
    }

    /// Declares a schedule type, returning it so optional end/include/exclude
    /// expressions can be chained.
    #[allow(clippy::too_many_arguments)]
    pub fn add_schedule_type(
        &mut self,
        name: impl Into<String>,
        label: impl Into<String>,
        frequency: ScheduleFrequency,
        end_type: EndType,
        business_day_adjustment: BusinessDayAdjustment,
        interval_expression: impl Into<String>,
        start_date_expression: impl Into<String>,
    ) -> &mut ScheduleType {
        self.schedule_types.push(ScheduleType {
            name: name.into(),
            label: label.into(),
            frequency,
            end_type,
            business_day_adjustment,
            interval_expression: interval_expression.into(),
            start_date_expression: start_date_expression.into(),
            end_date_expression: None,
            number_of_repeats_expression: None,
            include_dates_expression: None,
            exclude_dates_expression: None,
            editable: true,
        });
        self.schedule_types.last_mut().expect("just pushed above")
    }

    /// Declares a scheduled transaction.
    pub fn add_scheduled_transaction(
        &mut self,
        schedule_name: impl Into<String>,
        timing: Timing,
        generated_transaction_type: impl Into<String>,
        amount_expression: impl Into<String>,
    ) -> &mut Self {
        self.scheduled_transactions.push(ScheduledTransaction {
            schedule_name: schedule_name.into(),
            timing,
            generated_transaction_type: generated_transaction_type.into(),
            amount_expression: amount_expression.into(),
        });
        self
    }

    /// Declares a triggered transaction.
    pub fn add_trigger_transaction(
        &mut self,
        trigger_transaction_type_name: impl Into<String>,
        generated_transaction_type: impl Into<String>,
        amount_expression: impl Into<String>,
    ) -> &mut Self {
        self.triggered_transactions.push(TriggeredTransaction {
            trigger_transaction_type_name: trigger_transaction_type_name.into(),
            generated_transaction_type: generated_transaction_type.into(),
            amount_expression: amount_expression.into(),
        });
        self
    }

    /// Declares a rate table, returning it so tiers can be chained via `add_tier`.
    pub fn add_rate_type(
        &mut self,
        name: impl Into<String>,
        label: impl Into<String>,
    ) -> &mut RateTable {
        let name = name.into();
        self.rate_types
            .insert(name.clone(), RateTable::new(name.clone(), label));
        self.rate_types.get_mut(&name).expect("just inserted above")
    }

    /// Declares the instalment feature (at most one per product).
    #[allow(clippy::too_many_arguments)]
    pub fn add_instalment_type(
        &mut self,
        name: impl Into<String>,
        label: impl Into<String>,
        timing: Timing,
        schedule_name: impl Into<String>,
        transaction_type_name: impl Into<String>,
        property_name: impl Into<String>,
        solve_for_zero_position_name: impl Into<String>,
        solve_for_date_name: impl Into<String>,
    ) -> &mut InstalmentType {
        self.instalment_type = Some(InstalmentType {
            name: name.into(),
            label: label.into(),
            timing,
            schedule_name: schedule_name.into(),
            transaction_type_name: transaction_type_name.into(),
            property_name: property_name.into(),
            solve_for_zero_position_name: solve_for_zero_position_name.into(),
            solve_for_date_name: solve_for_date_name.into(),
        });
        self.instalment_type.as_mut().expect("just set above")
    }

    /// Looks up a declared transaction type by name.
    #[must_use]
    pub fn transaction_type(&self, name: &str) -> Option<&TransactionType> {
        self.transaction_types.iter().find(|t| t.name == name)
    }

    /// Looks up a declared schedule type by name.
    #[must_use]
    pub fn schedule_type(&self, name: &str) -> Option<&ScheduleType> {
        self.schedule_types.iter().find(|s| s.name == name)
    }

    /// Looks up a declared property type by name.
    #[must_use]
    pub fn property_type(&self, name: &str) -> Option<&PropertyType> {
        self.property_types.iter().find(|p| p.name == name)
    }

    /// Triggered-transaction rules whose trigger is `transaction_type_name`.
    pub fn triggers_for(&self, transaction_type_name: &str) -> impl Iterator<Item = &TriggeredTransaction> {
        self.triggered_transactions
            .iter()
            .filter(move |t| t.trigger_transaction_type_name == transaction_type_name)
    }

    /// Runs the full validation pass: forward-reference checks, rate-tier
    /// contiguity, and triggered-transaction cycle detection.
    pub fn validate(&self) -> Result<()> {
        self.check_unique_names()?;
        self.check_forward_references()?;
        self.check_rate_tier_contiguity()?;
        self.check_trigger_graph_acyclic()?;
        log::debug!(
            "account type `{}` validated: {} transaction types, {} schedule types",
            self.name,
            self.transaction_types.len(),
            self.schedule_types.len()
        );
        Ok(())
    }

    fn check_unique_names(&self) -> Result<()> {
        check_unique(self.position_types.iter().map(|p| p.name.as_str()), "position_types")?;
        check_unique(self.date_types.iter().map(|d| d.name.as_str()), "date_types")?;
        check_unique(
            self.property_types.iter().map(|p| p.name.as_str()),
            "property_types",
        )?;
        check_unique(
            self.transaction_types.iter().map(|t| t.name.as_str()),
            "transaction_types",
        )?;
        check_unique(
            self.schedule_types.iter().map(|s| s.name.as_str()),
            "schedule_types",
        )?;
        Ok(())
    }

    fn check_forward_references(&self) -> Result<()> {
        let position_names: HashSet<&str> =
            self.position_types.iter().map(|p| p.name.as_str()).collect();
        let transaction_names: HashSet<&str> = self
            .transaction_types
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        let schedule_names: HashSet<&str> =
            self.schedule_types.iter().map(|s| s.name.as_str()).collect();
        let property_names: HashSet<&str> =
            self.property_types.iter().map(|p| p.name.as_str()).collect();
        let date_names: HashSet<&str> = self.date_types.iter().map(|d| d.name.as_str()).collect();

        for transaction_type in &self.transaction_types {
            for rule in &transaction_type.position_rules {
                require(
                    position_names.contains(rule.position_type_name.as_str()),
                    format!(
                        "transaction type `{}` references undeclared position `{}`",
                        transaction_type.name, rule.position_type_name
                    ),
                )?;
            }
        }

        for scheduled in &self.scheduled_transactions {
            require(
                schedule_names.contains(scheduled.schedule_name.as_str()),
                format!(
                    "scheduled transaction references undeclared schedule `{}`",
                    scheduled.schedule_name
                ),
            )?;
            require(
                transaction_names.contains(scheduled.generated_transaction_type.as_str()),
                format!(
                    "scheduled transaction references undeclared transaction type `{}`",
                    scheduled.generated_transaction_type
                ),
            )?;
        }

        for triggered in &self.triggered_transactions {
            require(
                transaction_names.contains(triggered.trigger_transaction_type_name.as_str()),
                format!(
                    "triggered transaction references undeclared trigger transaction type `{}`",
                    triggered.trigger_transaction_type_name
                ),
            )?;
            require(
                transaction_names.contains(triggered.generated_transaction_type.as_str()),
                format!(
                    "triggered transaction references undeclared transaction type `{}`",
                    triggered.generated_transaction_type
                ),
            )?;
        }

        if let Some(instalment) = &self.instalment_type {
            require(
                schedule_names.contains(instalment.schedule_name.as_str()),
                format!(
                    "instalment type references undeclared schedule `{}`",
                    instalment.schedule_name
                ),
            )?;
            require(
                transaction_names.contains(instalment.transaction_type_name.as_str()),
                format!(
                    "instalment type references undeclared transaction type `{}`",
                    instalment.transaction_type_name
                ),
            )?;
            require(
                property_names.contains(instalment.property_name.as_str()),
                format!(
                    "instalment type references undeclared property `{}`",
                    instalment.property_name
                ),
            )?;
            require(
                position_names.contains(instalment.solve_for_zero_position_name.as_str()),
                format!(
                    "instalment type references undeclared position `{}`",
                    instalment.solve_for_zero_position_name
                ),
            )?;
            require(
                date_names.contains(instalment.solve_for_date_name.as_str()),
                format!(
                    "instalment type references undeclared date `{}`",
                    instalment.solve_for_date_name
                ),
            )?;
        }

        Ok(())
    }

    fn check_rate_tier_contiguity(&self) -> Result<()> {
        for (table_name, table) in &self.rate_types {
            for (effective_date, tiers) in table.tiers_by_effective_date() {
                let mut running = rust_decimal::Decimal::ZERO;
                for tier in tiers {
                    require(
                        tier.from_amount == running,
                        format!(
                            "rate table `{table_name}` tier list effective {effective_date} is not contiguous: expected from_amount {running}, got {}",
                            tier.from_amount
                        ),
                    )?;
                    running = tier.to_amount;
                }
            }
        }
        Ok(())
    }

    fn check_trigger_graph_acyclic(&self) -> Result<()> {
        let mut graph: HashMap<&str, Vec<&str>> = HashMap::new();
        for triggered in &self.triggered_transactions {
            graph
                .entry(triggered.trigger_transaction_type_name.as_str())
                .or_default()
                .push(triggered.generated_transaction_type.as_str());
        }

        #[derive(PartialEq, Eq, Clone, Copy)]
        enum Mark {
            Visiting,
            Done,
        }
        let mut marks: HashMap<&str, Mark> = HashMap::new();

        fn visit<'a>(
            node: &'a str,
            graph: &HashMap<&'a str, Vec<&'a str>>,
            marks: &mut HashMap<&'a str, Mark>,
        ) -> Result<()> {
            match marks.get(node) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => {
                    return Err(EngineError::ConfigurationError(format!(
                        "cycle detected in triggered-transaction graph at `{node}`"
                    )))
                }
                None => {}
            }
            marks.insert(node, Mark::Visiting);
            if let Some(next_nodes) = graph.get(node) {
                for next in next_nodes {
                    visit(next, graph, marks)?;
                }
            }
            marks.insert(node, Mark::Done);
            Ok(())
        }

        for node in graph.keys().copied() {
            visit(node, &graph, &mut marks)?;
        }
        Ok(())
    }
}

fn check_unique<'a>(names: impl Iterator<Item = &'a str>, what: &str) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(EngineError::ConfigurationError(format!(
                "duplicate name `{name}` declared in {what}"
            )));
        }
    }
    Ok(())
}

fn require(condition: bool, message: String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(EngineError::ConfigurationError(message))
    }
}
