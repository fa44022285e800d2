//! Per-call evaluator state.
//!
//! One [`Evaluator`] lives for exactly one top-level evaluation and is
//! discarded afterwards; there is no process-wide state. The stores are
//! ordinary maps threaded through the traversal: an immutable scope for
//! let bindings, a mutable scope with known/unknown tracking for ref
//! bindings, the two guess stores, the print log, and the per-variable
//! size statistics.

use indexmap::IndexMap;
use tracing::debug;

use aether_ast::Exp;
use aether_foundation::{Name, Value};

use crate::domain::IntDomain;
use crate::error::EvalError;

/// Evaluation mode. All three share one traversal; they differ only in
/// what happens when a subexpression fails to reduce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Unreduced subexpressions are fatal.
    Full,
    /// Unreduced subexpressions become residual AST.
    Partial,
    /// Unreduced boolean subexpressions are guessed, producing a branch
    /// per assumption; otherwise behaves like partial.
    NonDet,
}

/// Result of evaluating one expression: a value, or the residual
/// expression left after partial reduction.
#[derive(Debug, Clone, PartialEq)]
pub enum Evald {
    Val(Value),
    Residual(Exp),
}

impl Evald {
    /// Render as an expression; total, and the identity on residuals.
    pub fn into_exp(self) -> Exp {
        match self {
            Evald::Val(v) => Exp::val(v),
            Evald::Residual(e) => e,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Evald::Val(v) => Some(v),
            Evald::Residual(_) => None,
        }
    }
}

/// One `print`/`println` observation. The argument is recorded as
/// evaluated — fully reduced or residual — so ordering stays observable
/// in every mode.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintEntry {
    pub newline: bool,
    pub out: Evald,
}

pub type PrintLog = Vec<PrintEntry>;

/// Per-variable maximum observed value size.
pub type Stats = IndexMap<Name, usize>;

/// Whether a mutable variable's tracked value came from the type's
/// implicit default or from an explicit initialiser/assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Implicit,
    Explicit,
}

/// Tracking state of one ref-bound variable.
#[derive(Debug, Clone)]
pub enum RefState {
    /// The value is known exactly.
    Known { value: Value, origin: Origin },
    /// The value is unknown; `last` remembers the value it held before it
    /// was invalidated, which seeds the initial state when only part of
    /// the variable was overwritten.
    Unknown { last: Option<(Value, Origin)> },
}

/// Internal abort channel: a fatal error, or a pruned non-deterministic
/// branch (not an error; the branch is dropped).
#[derive(Debug)]
pub(crate) enum Abort {
    Fail(EvalError),
    Prune,
}

pub(crate) type Step<T> = Result<T, Abort>;

impl From<EvalError> for Abort {
    fn from(e: EvalError) -> Self {
        Abort::Fail(e)
    }
}

/// Replayable choice sequence for non-deterministic enumeration. A run
/// replays `script` and answers `true` at every fresh choice point; the
/// driver then enqueues the flipped sibling of each fresh choice.
#[derive(Debug, Default)]
pub(crate) struct ChoiceScript {
    pub script: Vec<bool>,
    pub trace: Vec<bool>,
}

impl ChoiceScript {
    pub fn with_script(script: Vec<bool>) -> Self {
        Self {
            script,
            trace: Vec::new(),
        }
    }

    pub fn next(&mut self) -> bool {
        let choice = self.script.get(self.trace.len()).copied().unwrap_or(true);
        self.trace.push(choice);
        choice
    }
}

/// Snapshot of the mutable stores, used to undo partial effects when
/// loop unrolling aborts and when conditional branches are explored.
pub(crate) struct Snapshot {
    refs: IndexMap<Name, RefState>,
    bool_guesses: IndexMap<String, bool>,
    domains: IndexMap<String, IntDomain>,
    stats: Stats,
    log_len: usize,
}

/// The evaluator: one traversal over an expression with explicit state.
pub struct Evaluator {
    pub(crate) mode: Mode,
    /// Cleared while re-interpreting loop bodies symbolically, where a
    /// guess would be keyed on a loop-varying expression.
    pub(crate) guessing: bool,
    pub(crate) lets: IndexMap<Name, Value>,
    pub(crate) refs: IndexMap<Name, RefState>,
    pub(crate) bool_guesses: IndexMap<String, bool>,
    pub(crate) domains: IndexMap<String, IntDomain>,
    pub(crate) log: PrintLog,
    pub(crate) stats: Stats,
    pub(crate) choices: ChoiceScript,
}

impl Evaluator {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            guessing: matches!(mode, Mode::NonDet),
            lets: IndexMap::new(),
            refs: IndexMap::new(),
            bool_guesses: IndexMap::new(),
            domains: IndexMap::new(),
            log: Vec::new(),
            stats: Stats::new(),
            choices: ChoiceScript::default(),
        }
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        Snapshot {
            refs: self.refs.clone(),
            bool_guesses: self.bool_guesses.clone(),
            domains: self.domains.clone(),
            stats: self.stats.clone(),
            log_len: self.log.len(),
        }
    }

    pub(crate) fn restore(&mut self, snap: &Snapshot) {
        self.refs = snap.refs.clone();
        self.bool_guesses = snap.bool_guesses.clone();
        self.domains = snap.domains.clone();
        self.stats = snap.stats.clone();
        self.log.truncate(snap.log_len);
    }

    /// Forget everything known about mutable variables, keeping the last
    /// known value so residualisation can seed initial state. Guesses do
    /// not survive invalidation.
    pub(crate) fn invalidate_refs(&mut self) {
        for state in self.refs.values_mut() {
            if let RefState::Known { value, origin } = state {
                *state = RefState::Unknown {
                    last: Some((value.clone(), *origin)),
                };
            }
        }
        self.clear_guesses();
        debug!(refs = self.refs.len(), "ref state invalidated");
    }

    pub(crate) fn clear_guesses(&mut self) {
        self.bool_guesses.clear();
        self.domains.clear();
    }

    /// Record the size of a value observed in a variable.
    pub(crate) fn note_size(&mut self, name: &Name, value: &Value) {
        let size = value.size();
        let entry = self.stats.entry(name.clone()).or_insert(0);
        if size > *entry {
            *entry = size;
        }
    }
}
