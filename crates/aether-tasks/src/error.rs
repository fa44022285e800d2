//! Task-splitting errors.

use thiserror::Error;

use aether_foundation::Span;

/// Splitting result type alias.
pub type Result<T> = std::result::Result<T, SplitError>;

/// Errors raised while cutting a comp into tasks.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SplitError {
    /// A barrier occurs inside a loop construct. Splitting a loop needs
    /// the loop header encoded as a scheduler-side driver, which this
    /// splitter deliberately does not implement.
    #[error("not implemented: barrier inside '{construct}' at {span}")]
    BarrierInLoop {
        construct: &'static str,
        span: Span,
    },
}
