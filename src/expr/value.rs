use crate::time::date::{Date, RelativeDelta};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A runtime value produced by evaluating an expression. Serialises
/// externally tagged (e.g. `{"decimal": "5.00"}`) so an account's property
/// map round-trips its declared `Decimal|String|bool` kind unambiguously.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    /// A fixed-point amount.
    Decimal(Decimal),
    /// A calendar date.
    Date(Date),
    /// A true/false value.
    Bool(bool),
    /// Free text.
    Str(String),
    /// A date delta produced by `relativedelta(...)`, only meaningful as an
    /// operand of `+`/`-` against a `Date`.
    RelativeDelta(RelativeDelta),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Date(d) => write!(f, "{d}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::RelativeDelta(_) => write!(f, "<relativedelta>"),
        }
    }
}

impl Value {
    /// The type name, for error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Decimal(_) => "decimal",
            Value::Date(_) => "date",
            Value::Bool(_) => "boolean",
            Value::Str(_) => "string",
            Value::RelativeDelta(_) => "relativedelta",
        }
    }

    /// Unwraps a `Decimal`, or `None` for any other variant.
    #[must_use]
    pub const fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// Unwraps a `Date`, or `None` for any other variant.
    #[must_use]
    pub const fn as_date(&self) -> Option<Date> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Unwraps a `Bool`, or `None` for any other variant.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}
