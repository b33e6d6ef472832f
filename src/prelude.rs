pub use crate::{
    account::{Account, ExternalTransaction, Instalment, Transaction},
    decimal::round_half_away_from_zero,
    diff::{valuation_difference, TransactionDifference},
    errors::{EngineError, Result},
    expr::{evaluate, Environment, Value},
    product::{
        account_type::AccountType,
        types::{
            DataType, DateType, InstalmentType, PositionOperation, PositionRule, PositionType,
            PropertyType, ScheduleType, ScheduledTransaction, Timing, TransactionType,
            TriggeredTransaction,
        },
    },
    rates::rate_table::{RateTable, RateTier},
    solver::solve_instalment,
    time::{
        calendar::Calendar,
        date::{Date, NaiveDateExt, RelativeDelta},
        enums::*,
        schedule::Schedule,
    },
    valuation::AccountValuation,
};
