//! Comp-level constant folding.
//!
//! Partially evaluates every expression position of a comp tree with a
//! fresh evaluator per expression, leaving the comp structure itself
//! untouched. The task splitter runs this before cutting so that
//! statically-decided branches and constant loop bounds do not survive
//! into task bodies. Best-effort: an expression whose partial evaluation
//! fails is kept as written.

use tracing::warn;

use aether_ast::{CallArg, Comp, CompKind, Exp};

use crate::interp::eval_partial;

fn fold_exp(e: &Exp) -> Exp {
    let (out, _, _) = eval_partial(e);
    match out {
        Ok(folded) => folded,
        Err(err) => {
            warn!(expr = %e, error = %err, "constant folding skipped");
            e.clone()
        }
    }
}

/// Fold the expression positions of `c`, recursively.
pub fn fold_comp(c: &Comp) -> Comp {
    let kind = match &c.kind {
        CompKind::Var(n) => CompKind::Var(n.clone()),
        CompKind::BindMany { head, binds } => CompKind::BindMany {
            head: Box::new(fold_comp(head)),
            binds: binds
                .iter()
                .map(|(n, b)| (n.clone(), fold_comp(b)))
                .collect(),
        },
        CompKind::Seq { first, second } => CompKind::Seq {
            first: Box::new(fold_comp(first)),
            second: Box::new(fold_comp(second)),
        },
        CompKind::Par { info, left, right } => CompKind::Par {
            info: *info,
            left: Box::new(fold_comp(left)),
            right: Box::new(fold_comp(right)),
        },
        CompKind::LetE {
            name,
            inline,
            rhs,
            body,
        } => CompKind::LetE {
            name: name.clone(),
            inline: *inline,
            rhs: fold_exp(rhs),
            body: Box::new(fold_comp(body)),
        },
        CompKind::LetERef { name, init, body } => CompKind::LetERef {
            name: name.clone(),
            init: init.as_ref().map(fold_exp),
            body: Box::new(fold_comp(body)),
        },
        CompKind::LetFunE {
            name,
            params,
            fun_body,
            body,
        } => CompKind::LetFunE {
            name: name.clone(),
            params: params.clone(),
            fun_body: fold_exp(fun_body),
            body: Box::new(fold_comp(body)),
        },
        CompKind::LetFunC {
            name,
            params,
            fun_body,
            body,
        } => CompKind::LetFunC {
            name: name.clone(),
            params: params.clone(),
            fun_body: Box::new(fold_comp(fun_body)),
            body: Box::new(fold_comp(body)),
        },
        CompKind::LetStruct { def, body } => CompKind::LetStruct {
            def: def.clone(),
            body: Box::new(fold_comp(body)),
        },
        CompKind::Call { func, args } => CompKind::Call {
            func: func.clone(),
            args: args
                .iter()
                .map(|a| match a {
                    CallArg::Exp(e) => CallArg::Exp(fold_exp(e)),
                    CallArg::Comp(b) => CallArg::Comp(fold_comp(b)),
                })
                .collect(),
        },
        CompKind::Emit(e) => CompKind::Emit(fold_exp(e)),
        CompKind::Emits(e) => CompKind::Emits(fold_exp(e)),
        CompKind::Return(e) => CompKind::Return(fold_exp(e)),
        CompKind::Take => CompKind::Take,
        CompKind::Takes(n) => CompKind::Takes(*n),
        CompKind::Branch {
            cond,
            then_c,
            else_c,
        } => {
            // Statically decided branches keep only the live arm.
            let cond = fold_exp(cond);
            if cond.is_true() {
                return fold_comp(then_c);
            }
            if cond.is_false() {
                return fold_comp(else_c);
            }
            CompKind::Branch {
                cond,
                then_c: Box::new(fold_comp(then_c)),
                else_c: Box::new(fold_comp(else_c)),
            }
        }
        CompKind::Until { cond, body } => CompKind::Until {
            cond: fold_exp(cond),
            body: Box::new(fold_comp(body)),
        },
        CompKind::While { cond, body } => CompKind::While {
            cond: fold_exp(cond),
            body: Box::new(fold_comp(body)),
        },
        CompKind::Times {
            unroll,
            start,
            count,
            var,
            body,
        } => CompKind::Times {
            unroll: *unroll,
            start: fold_exp(start),
            count: fold_exp(count),
            var: var.clone(),
            body: Box::new(fold_comp(body)),
        },
        CompKind::Repeat { ann, body } => CompKind::Repeat {
            ann: *ann,
            body: Box::new(fold_comp(body)),
        },
        CompKind::VectComp { ann, body } => CompKind::VectComp {
            ann: *ann,
            body: Box::new(fold_comp(body)),
        },
        CompKind::Map { ann, func } => CompKind::Map {
            ann: *ann,
            func: func.clone(),
        },
        CompKind::Filter { func } => CompKind::Filter { func: func.clone() },
        CompKind::ReadSrc(ty) => CompKind::ReadSrc(ty.clone()),
        CompKind::WriteSnk(ty) => CompKind::WriteSnk(ty.clone()),
        CompKind::ReadInternal { queue, policy } => CompKind::ReadInternal {
            queue: *queue,
            policy: *policy,
        },
        CompKind::WriteInternal { queue } => CompKind::WriteInternal { queue: *queue },
        CompKind::Standalone(body) => CompKind::Standalone(Box::new(fold_comp(body))),
        CompKind::Mitigate { elem, from, to } => CompKind::Mitigate {
            elem: elem.clone(),
            from: *from,
            to: *to,
        },
        CompKind::ActivateTask { task, input } => CompKind::ActivateTask {
            task: *task,
            input: input.clone(),
        },
    };
    Comp::new(kind, c.ty.clone(), c.span)
}
