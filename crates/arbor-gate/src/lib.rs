//! Sandboxed expressions for arbor.
//!
//! `update` preconditions, `update` change values, and `list` queries are
//! caller-supplied strings. They are compiled once into an AST and evaluated
//! against a fixed set of bindings: the key's metadata fields plus a few
//! helpers (`now`, `pi`, `e`). Nothing else is reachable: there is no
//! assignment, no attribute access beyond plain map lookup, and only the
//! built-in functions listed in [`eval`].
//!
//! # Quick Start
//!
//! ```rust
//! use arbor_gate::{Bindings, Expression};
//! use serde_json::json;
//!
//! let metadata = json!({"count": 3, "owner": {"name": "ada"}});
//! let bindings = Bindings::from_metadata(metadata.as_object().unwrap());
//!
//! let cond = Expression::compile("count < 5 and owner.name == 'ada'").unwrap();
//! assert!(cond.test(&bindings).unwrap());
//!
//! let next = Expression::compile("count + 1").unwrap();
//! assert_eq!(next.eval(&bindings).unwrap(), json!(4));
//! ```

pub mod ast;
pub mod config;
pub mod error;
pub mod eval;
pub mod parser;
pub mod tokenizer;

pub use ast::{BinaryOp, Expr, UnaryOp};
pub use config::GateLimits;
pub use error::{GateError, GateResult};
pub use eval::{truthy, Bindings};

use serde_json::Value;

/// A compiled expression, ready to evaluate many times.
#[derive(Clone, Debug, PartialEq)]
pub struct Expression {
    source: String,
    ast: Expr,
}

impl Expression {
    /// Compile with the default limits.
    pub fn compile(source: &str) -> GateResult<Self> {
        Self::compile_with(source, &GateLimits::default())
    }

    pub fn compile_with(source: &str, limits: &GateLimits) -> GateResult<Self> {
        if source.len() > limits.max_source_len {
            return Err(GateError::TooComplex(format!(
                "source is {} bytes, limit is {}",
                source.len(),
                limits.max_source_len
            )));
        }
        let tokens = tokenizer::tokenize(source)?;
        let ast = parser::parse(tokens, limits.max_depth)?;
        Ok(Self {
            source: source.to_string(),
            ast,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    /// Evaluate to a value.
    pub fn eval(&self, bindings: &Bindings) -> GateResult<Value> {
        eval::evaluate(&self.ast, bindings)
    }

    /// Evaluate and interpret the result as a condition.
    pub fn test(&self, bindings: &Bindings) -> GateResult<bool> {
        Ok(truthy(&self.eval(bindings)?))
    }
}
