use crate::account::Account;
use crate::decimal::round_half_away_from_zero;
use crate::errors::{EngineError, Result};
use crate::valuation::AccountValuation;
use argmin::core::{CostFunction, Executor};
use argmin::solver::brent::BrentOpt;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::cell::RefCell;
use std::collections::BTreeMap;

const BRACKET_LOWER: f64 = -1e8;
const BRACKET_UPPER: f64 = 1e8;
const TOLERANCE: f64 = 0.01;

/// Finds the fixed instalment amount that drives `account_type.instalment_type`'s
/// declared position to zero by its declared horizon date, stamps it on every
/// unfixed instalment entry, and returns the solved amount rounded to 2dp.
///
/// Bracketed root-find over `x ∈ [-1e8, 1e8]` via `argmin`'s Brent solver, the
/// same pattern the z-spread solve uses: minimise `|position(x)|` to a target
/// cost of zero. Fails with `BracketDoesNotStraddleZero` if the signed position
/// has the same sign at both bracket ends.
pub fn solve_instalment(valuation: &AccountValuation<'_>, account: &mut Account) -> Result<Decimal> {
    let instalment_type = valuation
        .account_type()
        .instalment_type
        .as_ref()
        .ok_or_else(|| {
            EngineError::ConfigurationError("account type has no instalment_type".to_string())
        })?;
    let horizon = account
        .date(&instalment_type.solve_for_date_name)
        .ok_or_else(|| {
            EngineError::ConfigurationError(format!(
                "account has no date `{}`",
                instalment_type.solve_for_date_name
            ))
        })?;
    let zero_position = instalment_type.solve_for_zero_position_name.clone();

    let objective = InstalmentObjective {
        valuation,
        account: RefCell::new(account),
        zero_position,
        horizon,
    };

    let low = objective.signed_position(BRACKET_LOWER)?;
    let high = objective.signed_position(BRACKET_UPPER)?;
    if low.signum() == high.signum() && low != 0.0 && high != 0.0 {
        return Err(EngineError::BracketDoesNotStraddleZero(format!(
            "position at x={BRACKET_LOWER} is {low}, at x={BRACKET_UPPER} is {high}"
        )));
    }

    log::info!("solving instalment against zero position `{zero_position}`", zero_position = objective.zero_position);
    let solver = BrentOpt::new(BRACKET_LOWER, BRACKET_UPPER).set_tolerance(TOLERANCE, TOLERANCE);
    let result = Executor::new(objective, solver)
        .configure(|state| state.max_iters(100).target_cost(0.0))
        .run()?;
    let best = result.state().get_best_param().copied().unwrap_or(0.0);
    let amount = round_half_away_from_zero(
        Decimal::from_f64(best).unwrap_or(Decimal::ZERO),
        2,
    );
    log::debug!("instalment solved to {amount}");

    for instalment in account.instalments.values_mut() {
        if !instalment.is_fixed {
            instalment.amount = amount;
        }
    }
    Ok(amount)
}

struct InstalmentObjective<'a, 'b> {
    valuation: &'a AccountValuation<'a>,
    account: RefCell<&'b mut Account>,
    zero_position: String,
    horizon: crate::time::date::Date,
}

impl InstalmentObjective<'_, '_> {
    fn signed_position(&self, x: f64) -> Result<f64> {
        let mut account = self.account.borrow_mut();
        account.reset_for_solve();
        let amount = Decimal::from_f64(x).unwrap_or(Decimal::ZERO);
        for instalment in account.instalments.values_mut() {
            if !instalment.is_fixed {
                instalment.amount = amount;
            }
        }
        self.valuation
            .forecast(&mut account, self.horizon, &BTreeMap::new())?;
        Ok(account
            .position(&self.zero_position)
            .unwrap_or(Decimal::ZERO)
            .to_f64()
            .unwrap_or(0.0))
    }
}

impl CostFunction for InstalmentObjective<'_, '_> {
    type Param = f64;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        Ok(self.signed_position(*param)?.abs())
    }
}
