/// Errors from compiling or evaluating an expression.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GateError {
    /// The source is not a valid expression.
    #[error("parse error at {pos}: {message}")]
    Parse { pos: usize, message: String },

    /// The expression exceeds the configured limits.
    #[error("expression too complex: {0}")]
    TooComplex(String),

    /// A name that is neither a binding nor a helper.
    #[error("unknown variable: {0}")]
    UnknownVariable(String),

    /// A call to a function outside the built-in set.
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    /// A built-in called with the wrong number of arguments.
    #[error("{name} takes {expected} argument(s), got {found}")]
    Arity {
        name: String,
        expected: &'static str,
        found: usize,
    },

    /// Operand types do not fit the operator.
    #[error("type mismatch in {op}: {detail}")]
    TypeMismatch { op: String, detail: String },

    #[error("division by zero")]
    DivisionByZero,
}

impl GateError {
    pub(crate) fn parse(pos: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            pos,
            message: message.into(),
        }
    }

    pub(crate) fn mismatch(op: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::TypeMismatch {
            op: op.into(),
            detail: detail.into(),
        }
    }
}

pub type GateResult<T> = Result<T, GateError>;
