//! Satisfiability and provability queries over boolean expressions.
//!
//! These are thin wrappers around non-deterministic evaluation for
//! callers outside the evaluator (range analysis, dead-branch pruning).
//! They are pure with respect to the passed expression: every query runs
//! a fresh evaluator and discards its state.

use aether_ast::{BinOp, Exp, UnOp};

use crate::interp::eval_nondet;

/// Whether at least one non-deterministic evaluation of `e` reduces to
/// the literal `true`.
pub fn satisfiable(e: &Exp) -> bool {
    eval_nondet(e)
        .iter()
        .any(|(out, _)| out.as_ref().is_ok_and(|r| r.is_true()))
}

/// Whether `e` holds on every non-deterministic branch: `¬satisfiable(¬e)`.
pub fn provable(e: &Exp) -> bool {
    !satisfiable(&Exp::unop(UnOp::Not, e.clone()))
}

/// Whether `a` entails `b`: `provable(¬a ∨ b)`.
pub fn implies(a: &Exp, b: &Exp) -> bool {
    provable(&Exp::binop(
        BinOp::Or,
        Exp::unop(UnOp::Not, a.clone()),
        b.clone(),
    ))
}
