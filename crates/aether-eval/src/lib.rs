//! Symbolic expression evaluator for the aether compiler.
//!
//! One traversal serves three modes: a full interpreter, a partial
//! evaluator that folds known subterms while leaving free variables
//! symbolic, and a non-deterministic guesser backing satisfiability
//! queries. The task splitter additionally uses [`fold_comp`] to fold
//! constants inside comp trees before cutting them into tasks.

pub mod domain;
pub mod error;
pub mod fold;
pub mod interp;
pub mod ops;
pub mod solve;
pub mod state;

pub use domain::IntDomain;
pub use error::{EvalError, Result};
pub use fold::fold_comp;
pub use interp::{eval_full, eval_nondet, eval_partial};
pub use solve::{implies, provable, satisfiable};
pub use state::{Evald, Evaluator, Mode, Origin, PrintEntry, PrintLog, RefState, Stats};
