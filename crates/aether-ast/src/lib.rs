//! Typed ASTs for the aether compiler.
//!
//! Two mutually-recursive grammars: scalar expressions ([`Exp`]) and
//! stream computations ([`Comp`]). Both arrive fully typed from the
//! front end; nodes are immutable once constructed and every pass builds
//! a new tree.

pub mod comp;
pub mod display;
pub mod expr;
pub mod subst;

pub use comp::{
    CallArg, Comp, CompKind, CompTy, ParInfo, PipelineMode, ReadPolicy,
};
pub use expr::{BinOp, Exp, ExpKind, InlineAnn, SliceKind, UnOp, UnrollAnn};
pub use subst::subst_exp;
