/// The AST and recursive-descent parser.
mod ast;
/// The evaluator and its lexical environment.
mod eval;
/// The character-level tokenizer.
mod lexer;
/// The runtime value type expressions produce.
mod value;

pub use eval::{evaluate, Environment};
pub use value::Value;
