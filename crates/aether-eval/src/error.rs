//! Evaluation errors.
//!
//! Each evaluation mode threads a single error channel through the
//! traversal; the first failure aborts that mode's result. Side effects
//! accumulated before the failure remain visible in the print log, which
//! is returned alongside the error as a diagnostic aid.

use thiserror::Error;

use aether_foundation::Span;

/// Evaluation result type alias.
pub type Result<T> = std::result::Result<T, EvalError>;

/// Errors surfaced by the expression evaluator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// A subexpression did not reduce during full evaluation. Callers
    /// that want residuals switch to partial mode instead.
    #[error("free variable in full evaluation: {expr} at {span}")]
    FreeVariable { expr: String, span: Span },

    /// An array access with fully known base and index fell outside the
    /// array. Fatal in every mode. The index is signed: a negative index
    /// is reported as written rather than clamped.
    #[error("index {index} out of bounds for array of length {len} at {span}")]
    OutOfBounds {
        index: i64,
        len: usize,
        span: Span,
    },

    /// An operator was applied to values it has no meaning for. The type
    /// checker runs upstream, so this is a compiler bug; the offending
    /// expression is included verbatim.
    #[error("type mismatch in operator application (compiler bug): {expr} at {span}")]
    TypeMismatch { expr: String, span: Span },

    /// Integer or complex division by zero with both operands known.
    #[error("division by zero at {span}")]
    DivideByZero { span: Span },

    /// The `error` primitive was reached with evaluation required to
    /// produce a value.
    #[error("program error reached during evaluation: {msg} at {span}")]
    Program { msg: String, span: Span },

    /// A construct the evaluator deliberately does not handle.
    #[error("not implemented: {what} at {span}")]
    Unsupported { what: String, span: Span },
}
