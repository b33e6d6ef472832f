use crate::errors::{EngineError, Result};
use crate::time::date::{Date, NaiveDateExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single amount band within a `RateTable`: `[from_amount, to_amount)` maps to
/// `rate`. The table does not assume tiers are declared in increasing-ceiling
/// order when iterating for fee integration; it walks them in the order the
/// product author declared them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateTier {
    /// Lower bound of the amount band, inclusive.
    pub from_amount: Decimal,
    /// Upper bound of the amount band, exclusive for fee integration.
    pub to_amount: Decimal,
    /// The rate that applies within this band.
    pub rate: Decimal,
}

/// # `RateTable`
/// A date-indexed set of tiered rates, keyed by the effective date (as a
/// `YYYY-MM-DD` string, for deterministic JSON key ordering) from which a tier
/// list applies.
/// # Examples
/// ```
/// use ledgerforge::rates::rate_table::RateTable;
/// use ledgerforge::time::date::Date;
/// use rust_decimal_macros::dec;
///
/// let mut table = RateTable::new("savings", "Savings rate");
/// table.add_tier(Date::new(2019, 1, 1), dec!(10000), dec!(0.03));
/// table.add_tier(Date::new(2019, 1, 1), dec!(100000), dec!(0.035));
/// assert_eq!(table.rate_for(Date::new(2020, 1, 1), dec!(5000)).unwrap(), dec!(0.03));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateTable {
    name: String,
    label: String,
    rate_tiers: BTreeMap<String, Vec<RateTier>>,
}

impl RateTable {
    /// Builds an empty rate table.
    #[must_use]
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        RateTable {
            name: name.into(),
            label: label.into(),
            rate_tiers: BTreeMap::new(),
        }
    }

    /// This table's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends a tier to the tier list effective from `effective_date`. The new
    /// tier's `from_amount` is the running maximum for that effective date (0 if
    /// it is the first tier declared for that date), so contiguity holds by
    /// construction.
    pub fn add_tier(&mut self, effective_date: Date, to_amount: Decimal, rate: Decimal) {
        let key = effective_date.to_str("%Y-%m-%d");
        let tiers = self.rate_tiers.entry(key).or_default();
        let from_amount = tiers.last().map_or(Decimal::ZERO, |t| t.to_amount);
        tiers.push(RateTier {
            from_amount,
            to_amount,
            rate,
        });
    }

    /// All declared tier lists, keyed by their effective-date string, in
    /// effective-date order. Used by product validation to check contiguity.
    pub fn tiers_by_effective_date(&self) -> impl Iterator<Item = (&String, &[RateTier])> {
        self.rate_tiers.iter().map(|(key, tiers)| (key, tiers.as_slice()))
    }

    /// The tier list effective on `value_date`: the list keyed by the greatest
    /// effective date not after `value_date`.
    pub fn tiers_on(&self, value_date: Date) -> Result<&[RateTier]> {
        let key = value_date.to_str("%Y-%m-%d");
        self.rate_tiers
            .range(..=key)
            .next_back()
            .map(|(_, tiers)| tiers.as_slice())
            .ok_or_else(|| {
                EngineError::RateLookupError(format!(
                    "no rate tiers effective on or before {value_date} in table `{}`",
                    self.name
                ))
            })
    }

    /// The rate of the tier whose `[from_amount, to_amount]` contains `amount`,
    /// inclusive on both ends. Negative amounts always return zero; an amount
    /// outside every tier is a `RateLookupError`.
    pub fn rate_for(&self, value_date: Date, amount: Decimal) -> Result<Decimal> {
        if amount < Decimal::ZERO {
            return Ok(Decimal::ZERO);
        }
        let tiers = self.tiers_on(value_date)?;
        tiers
            .iter()
            .find(|t| amount >= t.from_amount && amount <= t.to_amount)
            .map(|t| t.rate)
            .ok_or_else(|| {
                EngineError::RateLookupError(format!(
                    "amount {amount} is outside every tier of table `{}` on {value_date}",
                    self.name
                ))
            })
    }

    /// The piecewise-linear fee accrued between `from` and `to` on `value_date`:
    /// the sum, across tiers in declared order, of `rate_i * overlap_i` where
    /// `overlap_i` is the portion of `[from, to)` that falls in tier `i`'s band.
    pub fn fee_between(&self, value_date: Date, from: Decimal, to: Decimal) -> Result<Decimal> {
        if to <= from {
            return Ok(Decimal::ZERO);
        }
        let tiers = self.tiers_on(value_date)?;
        let mut fee = Decimal::ZERO;
        let mut covered_to = from;
        for tier in tiers {
            if covered_to >= to {
                break;
            }
            let band_start = tier.from_amount.max(covered_to);
            let band_end = tier.to_amount.min(to);
            if band_end > band_start {
                fee += tier.rate * (band_end - band_start);
                covered_to = band_end;
            }
        }
        Ok(fee)
    }

    /// `fee_between(value_date, 0, users) / days_in_month(value_date)`.
    pub fn daily_fee(&self, value_date: Date, users: Decimal) -> Result<Decimal> {
        let monthly = self.fee_between(value_date, Decimal::ZERO, users)?;
        Ok(monthly / Decimal::from(value_date.base_date().days_in_month()))
    }
}
