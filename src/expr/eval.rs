use super::ast::{parse, BinOp, Expr, UnaryOp};
use super::value::Value;
use crate::account::{Account, Transaction};
use crate::errors::{EngineError, Result};
use crate::product::account_type::AccountType;
use crate::time::date::{Date, RelativeDelta};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

/// The lexical environment an expression is evaluated against: the account
/// instance, its declaring product metadata, the value date in scope, and
/// (for triggered-transaction expressions) the triggering transaction.
pub struct Environment<'a> {
    account: &'a Account,
    account_type: &'a AccountType,
    value_date: Date,
    transaction: Option<&'a Transaction>,
}

impl<'a> Environment<'a> {
    /// Builds an environment for evaluating one expression.
    #[must_use]
    pub const fn new(
        account: &'a Account,
        account_type: &'a AccountType,
        value_date: Date,
        transaction: Option<&'a Transaction>,
    ) -> Self {
        Environment {
            account,
            account_type,
            value_date,
            transaction,
        }
    }
}

/// Parses and evaluates `expression` against `env`.
pub fn evaluate(expression: &str, env: &Environment<'_>) -> Result<Value> {
    let ast = parse(expression)?;
    eval(&ast, expression, env)
}

fn err(expression: &str, cause: impl Into<String>) -> EngineError {
    EngineError::ExpressionError {
        expression: expression.to_string(),
        cause: cause.into(),
    }
}

fn eval(expr: &Expr, source: &str, env: &Environment<'_>) -> Result<Value> {
    match expr {
        Expr::Number(text) => Decimal::from_str(text)
            .map(Value::Decimal)
            .map_err(|e| err(source, format!("invalid number `{text}`: {e}"))),
        Expr::Str(text) => Ok(Value::Str(text.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Identifier(name) => eval_identifier(name, source, env),
        Expr::Unary(op, operand) => eval_unary(*op, operand, source, env),
        Expr::Binary(op, lhs, rhs) => {
            let lhs = eval(lhs, source, env)?;
            let rhs = eval(rhs, source, env)?;
            eval_binary(*op, &lhs, &rhs, source)
        }
        Expr::Call { name, args, kwargs } => eval_call(name, args, kwargs, source, env),
        Expr::Attribute(base, field) => eval_attribute(base, field, source, env),
        Expr::Index(base, index) => eval_index(base, index, source, env),
        Expr::MethodCall {
            receiver,
            method,
            args,
        } => eval_method_call(receiver, method, args, source, env),
    }
}

fn eval_identifier(name: &str, source: &str, env: &Environment<'_>) -> Result<Value> {
    match name {
        "value_date" => Ok(Value::Date(env.value_date)),
        "account" | "account_type" | "transaction" => Err(err(
            source,
            format!("`{name}` must be followed by an attribute, e.g. `{name}.<name>`"),
        )),
        other => Err(err(source, format!("unknown identifier `{other}`"))),
    }
}

fn eval_unary(op: UnaryOp, operand: &Expr, source: &str, env: &Environment<'_>) -> Result<Value> {
    let value = eval(operand, source, env)?;
    match (op, &value) {
        (UnaryOp::Neg, Value::Decimal(d)) => Ok(Value::Decimal(-d)),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        _ => Err(err(
            source,
            format!("cannot apply {op:?} to a {}", value.type_name()),
        )),
    }
}

fn eval_binary(op: BinOp, lhs: &Value, rhs: &Value, source: &str) -> Result<Value> {
    use BinOp::{Add, And, Div, Eq, Ge, Gt, Le, Lt, Mul, Ne, Or, Sub};
    match (op, lhs, rhs) {
        (Add, Value::Decimal(a), Value::Decimal(b)) => Ok(Value::Decimal(a + b)),
        (Sub, Value::Decimal(a), Value::Decimal(b)) => Ok(Value::Decimal(a - b)),
        (Mul, Value::Decimal(a), Value::Decimal(b)) => Ok(Value::Decimal(a * b)),
        (Div, Value::Decimal(a), Value::Decimal(b)) => {
            if b.is_zero() {
                Err(err(source, "division by zero"))
            } else {
                Ok(Value::Decimal(a / b))
            }
        }
        (Add, Value::Date(d), Value::RelativeDelta(delta)) => Ok(Value::Date(*d + *delta)),
        (Add, Value::RelativeDelta(delta), Value::Date(d)) => Ok(Value::Date(*d + *delta)),
        (Sub, Value::Date(d), Value::RelativeDelta(delta)) => Ok(Value::Date(*d - *delta)),
        (Eq, a, b) => Ok(Value::Bool(values_equal(a, b))),
        (Ne, a, b) => Ok(Value::Bool(!values_equal(a, b))),
        (Lt, Value::Decimal(a), Value::Decimal(b)) => Ok(Value::Bool(a < b)),
        (Le, Value::Decimal(a), Value::Decimal(b)) => Ok(Value::Bool(a <= b)),
        (Gt, Value::Decimal(a), Value::Decimal(b)) => Ok(Value::Bool(a > b)),
        (Ge, Value::Decimal(a), Value::Decimal(b)) => Ok(Value::Bool(a >= b)),
        (Lt, Value::Date(a), Value::Date(b)) => Ok(Value::Bool(a < b)),
        (Le, Value::Date(a), Value::Date(b)) => Ok(Value::Bool(a <= b)),
        (Gt, Value::Date(a), Value::Date(b)) => Ok(Value::Bool(a > b)),
        (Ge, Value::Date(a), Value::Date(b)) => Ok(Value::Bool(a >= b)),
        (And, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a && *b)),
        (Or, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a || *b)),
        _ => Err(err(
            source,
            format!(
                "cannot apply {op:?} to a {} and a {}",
                lhs.type_name(),
                rhs.type_name()
            ),
        )),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Decimal(x), Value::Decimal(y)) => x == y,
        (Value::Date(x), Value::Date(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        _ => false,
    }
}

fn eval_call(
    name: &str,
    args: &[Expr],
    kwargs: &[(String, Expr)],
    source: &str,
    env: &Environment<'_>,
) -> Result<Value> {
    match name {
        "Decimal" => {
            let [arg] = args else {
                return Err(err(source, "Decimal(...) takes exactly one argument"));
            };
            match eval(arg, source, env)? {
                Value::Decimal(d) => Ok(Value::Decimal(d)),
                Value::Str(s) => Decimal::from_str(&s)
                    .map(Value::Decimal)
                    .map_err(|e| err(source, format!("invalid decimal literal `{s}`: {e}"))),
                other => Err(err(
                    source,
                    format!("Decimal(...) cannot accept a {}", other.type_name()),
                )),
            }
        }
        "relativedelta" => {
            let mut days = 0;
            let mut months = 0;
            let mut years = 0;
            for (key, value_expr) in kwargs {
                let value = eval(value_expr, source, env)?;
                let amount = value.as_decimal().ok_or_else(|| {
                    err(source, format!("relativedelta(...) argument `{key}` must be a number"))
                })?;
                let amount: i32 = amount
                    .to_i32()
                    .ok_or_else(|| err(source, format!("relativedelta(...) argument `{key}` out of range")))?;
                match key.as_str() {
                    "days" => days = amount,
                    "months" => months = amount,
                    "years" => years = amount,
                    other => {
                        return Err(err(
                            source,
                            format!("relativedelta(...) has no argument `{other}`"),
                        ))
                    }
                }
            }
            Ok(Value::RelativeDelta(RelativeDelta::new(days, months, years)))
        }
        other => Err(err(source, format!("unknown function `{other}`"))),
    }
}

fn eval_attribute(base: &Expr, field: &str, source: &str, env: &Environment<'_>) -> Result<Value> {
    if let Expr::Identifier(name) = base {
        match name.as_str() {
            "account" => return resolve_account_attribute(field, source, env),
            "transaction" => {
                let transaction = env
                    .transaction
                    .ok_or_else(|| err(source, "`transaction` is not bound in this context"))?;
                return match field {
                    "amount" => Ok(Value::Decimal(transaction.amount)),
                    "value_date" => Ok(Value::Date(transaction.value_date)),
                    "transaction_type_name" => {
                        Ok(Value::Str(transaction.transaction_type_name.clone()))
                    }
                    other => Err(err(source, format!("transaction has no field `{other}`"))),
                };
            }
            "account_type" => {
                // `account_type.<rate_table_name>` is only meaningful as the receiver of a
                // method call; reaching here means the expression used it as a plain value.
                return Err(err(
                    source,
                    format!("`account_type.{field}` must be followed by `.get_rate(...)` or `.get_fee(...)`"),
                ));
            }
            _ => {}
        }
    }
    Err(err(source, "attribute access is only supported on `account`, `account_type`, and `transaction`"))
}

fn resolve_account_attribute(field: &str, source: &str, env: &Environment<'_>) -> Result<Value> {
    if field == "start_date" {
        return Ok(Value::Date(env.account.start_date));
    }
    if let Some(amount) = env.account.position(field) {
        return Ok(Value::Decimal(amount));
    }
    if let Some(value) = env.account.property(field) {
        return Ok(value.clone());
    }
    if env.account.value_dated_properties.contains_key(field) {
        // Bare (non-indexed) access to a value-dated property resolves at the
        // current value date in scope.
        return env
            .account
            .value_dated_property_at(field, env.value_date)
            .map(Clone::clone);
    }
    if let Some(date) = env.account.date(field) {
        return Ok(Value::Date(date));
    }
    Err(err(source, format!("account has no field `{field}`")))
}

fn eval_index(base: &Expr, index: &Expr, source: &str, env: &Environment<'_>) -> Result<Value> {
    let Expr::Attribute(inner, field) = base else {
        return Err(err(source, "indexing is only supported on `account.<property>[date]`"));
    };
    let Expr::Identifier(name) = inner.as_ref() else {
        return Err(err(source, "indexing is only supported on `account.<property>[date]`"));
    };
    if name != "account" {
        return Err(err(source, "indexing is only supported on `account.<property>[date]`"));
    }
    let date_value = eval(index, source, env)?;
    let date = date_value
        .as_date()
        .ok_or_else(|| err(source, "index must evaluate to a date"))?;
    env.account
        .value_dated_property_at(field, date)
        .map(Clone::clone)
}

fn eval_method_call(
    receiver: &Expr,
    method: &str,
    args: &[Expr],
    source: &str,
    env: &Environment<'_>,
) -> Result<Value> {
    let Expr::Attribute(inner, rate_table_name) = receiver else {
        return Err(err(
            source,
            "method calls are only supported on `account_type.<rate_table_name>`",
        ));
    };
    let Expr::Identifier(name) = inner.as_ref() else {
        return Err(err(
            source,
            "method calls are only supported on `account_type.<rate_table_name>`",
        ));
    };
    if name != "account_type" {
        return Err(err(
            source,
            "method calls are only supported on `account_type.<rate_table_name>`",
        ));
    }
    let table = env.account_type.rate_types.get(rate_table_name).ok_or_else(|| {
        err(source, format!("undeclared rate table `{rate_table_name}`"))
    })?;

    let decimal_args = args
        .iter()
        .map(|arg| eval(arg, source, env))
        .collect::<Result<Vec<_>>>()?;

    match method {
        "get_rate" => {
            let [date_arg, amount_arg] = decimal_args.as_slice() else {
                return Err(err(source, "get_rate(...) takes exactly two arguments"));
            };
            let date = date_arg
                .as_date()
                .ok_or_else(|| err(source, "get_rate(...)'s first argument must be a date"))?;
            let amount = amount_arg
                .as_decimal()
                .ok_or_else(|| err(source, "get_rate(...)'s second argument must be a number"))?;
            table.rate_for(date, amount).map(Value::Decimal)
        }
        "get_fee" => {
            let [date_arg, from_arg, to_arg] = decimal_args.as_slice() else {
                return Err(err(source, "get_fee(...) takes exactly three arguments"));
            };
            let date = date_arg
                .as_date()
                .ok_or_else(|| err(source, "get_fee(...)'s first argument must be a date"))?;
            let from = from_arg
                .as_decimal()
                .ok_or_else(|| err(source, "get_fee(...)'s second argument must be a number"))?;
            let to = to_arg
                .as_decimal()
                .ok_or_else(|| err(source, "get_fee(...)'s third argument must be a number"))?;
            table.fee_between(date, from, to).map(Value::Decimal)
        }
        other => Err(err(source, format!("rate table has no method `{other}`"))),
    }
}
