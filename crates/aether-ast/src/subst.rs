//! Expression substitution, used by force-inline let bindings.

use aether_foundation::Name;

use crate::expr::{Exp, ExpKind};

/// Replace every free occurrence of `target` in `e` with `replacement`.
///
/// Binders are compared by unique id, so shadowing can only occur if the
/// renamer reused an id; the check is kept anyway to keep the traversal
/// honest about scope.
pub fn subst_exp(e: &Exp, target: &Name, replacement: &Exp) -> Exp {
    let kind = match &e.kind {
        ExpKind::Val(v) => ExpKind::Val(v.clone()),
        ExpKind::Var(n) => {
            if n == target {
                return replacement.clone();
            }
            ExpKind::Var(n.clone())
        }
        ExpKind::ArrayLit(es) => {
            ExpKind::ArrayLit(es.iter().map(|x| subst_exp(x, target, replacement)).collect())
        }
        ExpKind::ArrayRead { base, index, slice } => ExpKind::ArrayRead {
            base: Box::new(subst_exp(base, target, replacement)),
            index: Box::new(subst_exp(index, target, replacement)),
            slice: slice.clone(),
        },
        ExpKind::StructNew { name, fields } => ExpKind::StructNew {
            name: name.clone(),
            fields: fields
                .iter()
                .map(|(f, x)| (f.clone(), subst_exp(x, target, replacement)))
                .collect(),
        },
        ExpKind::Proj { base, field } => ExpKind::Proj {
            base: Box::new(subst_exp(base, target, replacement)),
            field: field.clone(),
        },
        ExpKind::UnOp { op, operand } => ExpKind::UnOp {
            op: op.clone(),
            operand: Box::new(subst_exp(operand, target, replacement)),
        },
        ExpKind::BinOp { op, left, right } => ExpKind::BinOp {
            op: *op,
            left: Box::new(subst_exp(left, target, replacement)),
            right: Box::new(subst_exp(right, target, replacement)),
        },
        ExpKind::Let {
            name,
            inline,
            rhs,
            body,
        } => ExpKind::Let {
            name: name.clone(),
            inline: *inline,
            rhs: Box::new(subst_exp(rhs, target, replacement)),
            body: if name == target {
                body.clone()
            } else {
                Box::new(subst_exp(body, target, replacement))
            },
        },
        ExpKind::LetRef {
            name,
            ty,
            init,
            body,
        } => ExpKind::LetRef {
            name: name.clone(),
            ty: ty.clone(),
            init: init
                .as_ref()
                .map(|x| Box::new(subst_exp(x, target, replacement))),
            body: if name == target {
                body.clone()
            } else {
                Box::new(subst_exp(body, target, replacement))
            },
        },
        ExpKind::Assign { lhs, rhs } => ExpKind::Assign {
            lhs: Box::new(subst_exp(lhs, target, replacement)),
            rhs: Box::new(subst_exp(rhs, target, replacement)),
        },
        ExpKind::ArrWrite {
            base,
            index,
            slice,
            rhs,
        } => ExpKind::ArrWrite {
            base: Box::new(subst_exp(base, target, replacement)),
            index: Box::new(subst_exp(index, target, replacement)),
            slice: slice.clone(),
            rhs: Box::new(subst_exp(rhs, target, replacement)),
        },
        ExpKind::Seq { first, second } => ExpKind::Seq {
            first: Box::new(subst_exp(first, target, replacement)),
            second: Box::new(subst_exp(second, target, replacement)),
        },
        ExpKind::Cond {
            cond,
            then_e,
            else_e,
        } => ExpKind::Cond {
            cond: Box::new(subst_exp(cond, target, replacement)),
            then_e: Box::new(subst_exp(then_e, target, replacement)),
            else_e: Box::new(subst_exp(else_e, target, replacement)),
        },
        ExpKind::For {
            var,
            unroll,
            start,
            count,
            body,
        } => ExpKind::For {
            var: var.clone(),
            unroll: *unroll,
            start: Box::new(subst_exp(start, target, replacement)),
            count: Box::new(subst_exp(count, target, replacement)),
            body: if var == target {
                body.clone()
            } else {
                Box::new(subst_exp(body, target, replacement))
            },
        },
        ExpKind::While { cond, body } => ExpKind::While {
            cond: Box::new(subst_exp(cond, target, replacement)),
            body: Box::new(subst_exp(body, target, replacement)),
        },
        ExpKind::Call { func, args } => ExpKind::Call {
            func: func.clone(),
            args: args
                .iter()
                .map(|x| subst_exp(x, target, replacement))
                .collect(),
        },
        ExpKind::Print { newline, args } => ExpKind::Print {
            newline: *newline,
            args: args
                .iter()
                .map(|x| subst_exp(x, target, replacement))
                .collect(),
        },
        ExpKind::Error { msg } => ExpKind::Error { msg: msg.clone() },
        ExpKind::Lut(inner) => ExpKind::Lut(Box::new(subst_exp(inner, target, replacement))),
    };
    Exp::new(kind, e.ty.clone(), e.span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{BinOp, InlineAnn};
    use aether_foundation::{IntWidth, Span, Ty, ValueKind};

    #[test]
    fn substitutes_free_occurrences_only() {
        let sp = Span::unknown();
        let x = Name::new("x", 1);
        let shadowed = Exp::let_(
            x.clone(),
            InlineAnn::Auto,
            Exp::int32(1, sp),
            Exp::var(x.clone(), Ty::Int(IntWidth::W32), sp),
        );
        let use_x = Exp::binop(
            BinOp::Add,
            Exp::var(x.clone(), Ty::Int(IntWidth::W32), sp),
            shadowed,
        );
        let out = subst_exp(&use_x, &x, &Exp::int32(9, sp));
        match &out.kind {
            ExpKind::BinOp { left, right, .. } => {
                assert_eq!(left.as_literal().unwrap().kind, ValueKind::I32(9));
                // The shadowed body keeps its variable.
                match &right.kind {
                    ExpKind::Let { body, .. } => {
                        assert!(matches!(body.kind, ExpKind::Var(_)))
                    }
                    other => panic!("expected Let, got {other:?}"),
                }
            }
            other => panic!("expected BinOp, got {other:?}"),
        }
    }
}
