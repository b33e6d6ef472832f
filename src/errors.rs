use thiserror::Error;

/// Crate-wide error taxonomy. Every fallible operation in the engine returns
/// `crate::errors::Result<T>`, which is this enum wrapped by `std::result::Result`.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A product declaration references a name that was never declared, declares a
    /// duplicate name, supplies a malformed rate-tier sequence, or closes a cycle in
    /// the triggered-transaction graph.
    #[error("configuration error: {0}")]
    ConfigurationError(String),
    /// An `Account` was constructed without a value for a property its `AccountType`
    /// marks `required`.
    #[error("validation error: {0}")]
    ValidationError(String),
    /// The expression evaluator failed on a product-declared amount or date expression.
    #[error("expression error in `{expression}`: {cause}")]
    ExpressionError {
        /// The source text of the expression that failed to evaluate.
        expression: String,
        /// Human-readable cause.
        cause: String,
    },
    /// A `RateTable` lookup found no tier set for a date, or no tier covering an amount.
    #[error("rate lookup error: {0}")]
    RateLookupError(String),
    /// A value-dated property was indexed at a date earlier than its first recorded value.
    #[error("property not defined: {0}")]
    PropertyNotDefined(String),
    /// A schedule was declared with a non-positive interval, or an end date before its
    /// start date.
    #[error("schedule error: {0}")]
    ScheduleError(String),
    /// The instalment solver's bracket did not straddle zero, or the underlying solver
    /// failed to converge.
    #[error("solver error: {0}")]
    SolverError(#[from] argmin::core::Error),
    /// The instalment solver's bracket `[-1e8, 1e8]` evaluated to the same sign at both
    /// ends, so no root can lie within it.
    #[error("instalment solver bracket does not straddle zero: {0}")]
    BracketDoesNotStraddleZero(String),
    /// A JSON encode/decode failure on the external serialisation surface.
    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),
    /// A date string failed to parse.
    #[error("date parsing error: {0}")]
    DateParsingErr(#[from] chrono::ParseError),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, EngineError>;
