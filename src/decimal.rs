use rust_decimal::{Decimal, RoundingStrategy};

/// Rounds `value` to `places` fractional digits, half-away-from-zero.
///
/// This is the only rounding rule the engine ever applies to a monetary amount;
/// `rust_decimal`'s default `round_dp` uses banker's rounding, which is the wrong
/// policy for transaction amounts, so every call site goes through here instead.
/// # Examples
/// ```
/// use ledgerforge::decimal::round_half_away_from_zero;
/// use rust_decimal_macros::dec;
/// assert_eq!(round_half_away_from_zero(dec!(1.005), 2), dec!(1.01));
/// assert_eq!(round_half_away_from_zero(dec!(-1.005), 2), dec!(-1.01));
/// ```
#[must_use]
pub fn round_half_away_from_zero(value: Decimal, places: u32) -> Decimal {
    value.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero)
}
