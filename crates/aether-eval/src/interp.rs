//! The mode-parametric expression traversal.
//!
//! One recursion serves all three modes. Reducible subterms become
//! values; irreducible ones go through [`Evaluator::residual`], which
//! errors in full mode, rebuilds AST in partial mode, and guesses
//! boolean results in non-deterministic mode. Residual nodes are rebuilt
//! with the original node's type and span, so partial evaluation never
//! invents annotations.

use tracing::debug;

use aether_ast::{BinOp, Exp, ExpKind, InlineAnn, SliceKind, UnOp, UnrollAnn, subst_exp};
use aether_foundation::{Name, Span, Ty, Value, ValueKind};

use crate::error::{EvalError, Result};
use crate::ops;
use crate::state::{
    Abort, ChoiceScript, Evald, Evaluator, Mode, Origin, PrintEntry, PrintLog, RefState, Stats,
    Step,
};

/// Counted loops up to this many iterations are unrolled.
const UNROLL_CAP: i128 = 512;

/// Sparse arrays with at most this many written slots residualise as a
/// run of element assignments instead of a literal initialiser.
const WRITE_OUT_LIMIT: usize = 32;

/// Statically known part of an assignment path, head variable excluded.
enum Selector {
    Elem(usize),
    Slice(usize, usize),
    Field(String),
}

/// Left-hand side of an assignment after evaluating its index positions.
struct LhsPath {
    head: Option<Name>,
    /// Selectors, present only when every index reduced to an integer.
    selectors: Option<Vec<Selector>>,
    rebuilt: Exp,
}

impl Evaluator {
    fn rebuild(&self, orig: &Exp, kind: ExpKind) -> Exp {
        Exp::new(kind, orig.ty.clone(), orig.span)
    }

    /// Abandon reduction of `e`: fatal in full mode, residual in partial
    /// mode, a guess for boolean-typed terms in non-deterministic mode.
    fn residual(&mut self, e: Exp) -> Step<Evald> {
        match self.mode {
            Mode::Full => Err(EvalError::FreeVariable {
                expr: e.to_string(),
                span: e.span,
            }
            .into()),
            Mode::Partial => Ok(Evald::Residual(e)),
            Mode::NonDet => {
                if self.guessing && e.ty.is_boolish() {
                    self.guess(e)
                } else {
                    Ok(Evald::Residual(e))
                }
            }
        }
    }

    fn bool_value(&self, ty: &Ty, b: bool, span: Span) -> Value {
        match ty {
            Ty::Bit => ValueKind::Bit(b).at(span),
            _ => ValueKind::Bool(b).at(span),
        }
    }

    /// Guess the truth of an unreduced boolean expression.
    ///
    /// Comparisons against a known integer refine the left-hand side's
    /// integer domain and prune when the refinement is empty; everything
    /// else records a plain truth assumption keyed by the expression.
    fn guess(&mut self, e: Exp) -> Step<Evald> {
        if let ExpKind::BinOp { op, left, right } = &e.kind {
            if op.is_cmp() {
                if let Some(k) = right
                    .as_literal()
                    .and_then(|v| v.as_int())
                    .and_then(|k| i64::try_from(k).ok())
                {
                    return self.guess_cmp(&e, *op, left, k);
                }
            }
        }
        let key = e.key();
        if let Some(b) = self.bool_guesses.get(&key).copied() {
            return Ok(Evald::Val(self.bool_value(&e.ty, b, e.span)));
        }
        let b = self.choices.next();
        debug!(expr = %e, assumed = b, "boolean guess");
        self.bool_guesses.insert(key, b);
        Ok(Evald::Val(self.bool_value(&e.ty, b, e.span)))
    }

    fn guess_cmp(&mut self, e: &Exp, op: BinOp, lhs: &Exp, k: i64) -> Step<Evald> {
        let key = lhs.key();
        let current = self.domains.get(&key).cloned().unwrap_or_default();
        let if_true = current.intersect(
            &crate::domain::IntDomain::from_cmp(op, k, true).expect("cmp op has a domain"),
        );
        let if_false = current.intersect(
            &crate::domain::IntDomain::from_cmp(op, k, false).expect("cmp op has a domain"),
        );
        let truth = match (if_true.is_empty(), if_false.is_empty()) {
            (true, true) => return Err(Abort::Prune),
            (true, false) => false,
            (false, true) => true,
            (false, false) => self.choices.next(),
        };
        debug!(lhs = %lhs, op = %op, k, assumed = truth, "comparison guess");
        self.domains
            .insert(key, if truth { if_true } else { if_false });
        Ok(Evald::Val(self.bool_value(&e.ty, truth, e.span)))
    }

    /// Run `f` with guessing disabled; used when re-interpreting loop
    /// bodies symbolically, where assumptions would be keyed on
    /// loop-varying expressions.
    fn no_guess<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let prev = self.guessing;
        self.guessing = false;
        let out = f(self);
        self.guessing = prev;
        out
    }

    /// Interpret one expression. Left-to-right evaluation of operands is
    /// observable through the mutable store and the print log and is
    /// preserved throughout.
    pub(crate) fn interp(&mut self, e: &Exp) -> Step<Evald> {
        match &e.kind {
            ExpKind::Val(v) => Ok(Evald::Val(v.clone())),

            ExpKind::Var(n) => {
                if let Some(v) = self.lets.get(n) {
                    return Ok(Evald::Val(v.clone()));
                }
                if let Some(RefState::Known { value, .. }) = self.refs.get(n) {
                    return Ok(Evald::Val(value.clone()));
                }
                self.residual(e.clone())
            }

            ExpKind::ArrayLit(elems) => {
                let mut evs = Vec::with_capacity(elems.len());
                for x in elems {
                    evs.push(self.interp(x)?);
                }
                if evs.iter().all(|ev| ev.value().is_some()) {
                    let values: Vec<Value> =
                        evs.iter().map(|ev| ev.value().cloned().expect("checked")).collect();
                    let default = e
                        .ty
                        .elem_ty()
                        .and_then(|t| Value::zero(t, e.span))
                        .or_else(|| values.first().cloned());
                    if let Some(default) = default {
                        let arr = aether_foundation::SparseArray::from_elems(default, values);
                        return Ok(Evald::Val(ValueKind::Array(arr).at(e.span)));
                    }
                }
                let kind = ExpKind::ArrayLit(evs.into_iter().map(Evald::into_exp).collect());
                let rebuilt = self.rebuild(e, kind);
                self.residual(rebuilt)
            }

            ExpKind::ArrayRead { base, index, slice } => {
                let b = self.interp(base)?;
                let i = self.interp(index)?;
                // A read covering [0, n) of an arr[n] is the array itself.
                if let SliceKind::Len(n) = slice {
                    let covers_all = base.ty.static_len() == Some(*n)
                        && i.value().and_then(|v| v.as_int()) == Some(0);
                    if covers_all {
                        return Ok(b);
                    }
                }
                if let (Some(bv), Some(iv)) = (b.value(), i.value()) {
                    let idx = iv.as_int().ok_or_else(|| {
                        Abort::from(EvalError::TypeMismatch {
                            expr: e.to_string(),
                            span: e.span,
                        })
                    })?;
                    if let Some(arr) = bv.as_array() {
                        let oob = |index: i128| EvalError::OutOfBounds {
                            index: index as i64,
                            len: arr.len(),
                            span: e.span,
                        };
                        let start =
                            usize::try_from(idx).map_err(|_| Abort::from(oob(idx)))?;
                        match slice {
                            SliceKind::Single => {
                                let v = arr.get(start).ok_or_else(|| Abort::from(oob(idx)))?;
                                return Ok(Evald::Val(v.clone()));
                            }
                            SliceKind::Len(n) => {
                                let sub =
                                    arr.slice(start, *n).ok_or_else(|| Abort::from(oob(idx)))?;
                                return Ok(Evald::Val(ValueKind::Array(sub).at(e.span)));
                            }
                            SliceKind::Meta(_) => {}
                        }
                    } else {
                        return Err(EvalError::TypeMismatch {
                            expr: e.to_string(),
                            span: e.span,
                        }
                        .into());
                    }
                }
                let kind = ExpKind::ArrayRead {
                    base: Box::new(b.into_exp()),
                    index: Box::new(i.into_exp()),
                    slice: slice.clone(),
                };
                let rebuilt = self.rebuild(e, kind);
                self.residual(rebuilt)
            }

            ExpKind::StructNew { name, fields } => {
                let mut evs = Vec::with_capacity(fields.len());
                for (f, x) in fields {
                    evs.push((f.clone(), self.interp(x)?));
                }
                if evs.iter().all(|(_, ev)| ev.value().is_some()) {
                    let vals = evs
                        .iter()
                        .map(|(f, ev)| (f.clone(), ev.value().cloned().expect("checked")))
                        .collect();
                    return Ok(Evald::Val(Value::struct_value(name, vals, e.span)));
                }
                let kind = ExpKind::StructNew {
                    name: name.clone(),
                    fields: evs.into_iter().map(|(f, ev)| (f, ev.into_exp())).collect(),
                };
                let rebuilt = self.rebuild(e, kind);
                self.residual(rebuilt)
            }

            ExpKind::Proj { base, field } => {
                let b = self.interp(base)?;
                match b {
                    Evald::Val(v) => {
                        if let Some(c) = v.complex_component(field) {
                            return Ok(Evald::Val(c));
                        }
                        if let ValueKind::Struct { fields, .. } = &v.kind {
                            if let Some((_, fv)) = fields.iter().find(|(f, _)| f == field) {
                                return Ok(Evald::Val(fv.clone()));
                            }
                        }
                        Err(EvalError::TypeMismatch {
                            expr: e.to_string(),
                            span: e.span,
                        }
                        .into())
                    }
                    Evald::Residual(r) => {
                        let kind = ExpKind::Proj {
                            base: Box::new(r),
                            field: field.clone(),
                        };
                        let rebuilt = self.rebuild(e, kind);
                        self.residual(rebuilt)
                    }
                }
            }

            ExpKind::UnOp { op, operand } => self.interp_unop(e, op, operand),
            ExpKind::BinOp { op, left, right } => self.interp_binop(e, *op, left, right),

            ExpKind::Let {
                name,
                inline,
                rhs,
                body,
            } => {
                if *inline == InlineAnn::Force {
                    // The initialiser is substituted, not evaluated here;
                    // its effects belong to the occurrence sites.
                    let substituted = subst_exp(body, name, rhs);
                    return self.interp(&substituted);
                }
                match self.interp(rhs)? {
                    Evald::Val(v) => {
                        self.note_size(name, &v);
                        self.lets.insert(name.clone(), v);
                        let out = self.interp(body);
                        self.lets.shift_remove(name);
                        out
                    }
                    Evald::Residual(r) => {
                        let body_ev = self.interp(body)?;
                        let kind = ExpKind::Let {
                            name: name.clone(),
                            inline: *inline,
                            rhs: Box::new(r),
                            body: Box::new(body_ev.into_exp()),
                        };
                        let rebuilt = self.rebuild(e, kind);
                        self.residual(rebuilt)
                    }
                }
            }

            ExpKind::LetRef {
                name,
                ty,
                init,
                body,
            } => self.interp_letref(e, name, ty, init.as_deref(), body),

            ExpKind::Assign { lhs, rhs } => {
                let rhs_ev = self.interp(rhs)?;
                let path = self.eval_lhs(lhs)?;
                self.assign_to(e, path, rhs_ev)
            }

            ExpKind::ArrWrite {
                base,
                index,
                slice,
                rhs,
            } => {
                let rhs_ev = self.interp(rhs)?;
                let read = Exp::arr_read((**base).clone(), (**index).clone(), slice.clone());
                let path = self.eval_lhs(&read)?;
                self.assign_to(e, path, rhs_ev)
            }

            ExpKind::Seq { first, second } => match self.interp(first)? {
                Evald::Val(_) => self.interp(second),
                Evald::Residual(f) => {
                    let s = self.interp(second)?;
                    let kind = ExpKind::Seq {
                        first: Box::new(f),
                        second: Box::new(s.into_exp()),
                    };
                    let rebuilt = self.rebuild(e, kind);
                    self.residual(rebuilt)
                }
            },

            ExpKind::Cond {
                cond,
                then_e,
                else_e,
            } => {
                let c = self.interp(cond)?;
                if let Some(b) = c.value().and_then(|v| v.as_bool()) {
                    return if b {
                        self.interp(then_e)
                    } else {
                        self.interp(else_e)
                    };
                }
                // Unknown branch direction: nothing known about mutable
                // state survives, and both arms are explored from the
                // invalidated state.
                self.invalidate_refs();
                let snap = self.snapshot();
                let t = self.interp(then_e)?;
                self.restore(&snap);
                let f = self.interp(else_e)?;
                self.restore(&snap);
                let kind = ExpKind::Cond {
                    cond: Box::new(c.into_exp()),
                    then_e: Box::new(t.into_exp()),
                    else_e: Box::new(f.into_exp()),
                };
                let rebuilt = self.rebuild(e, kind);
                self.residual(rebuilt)
            }

            ExpKind::For {
                var,
                unroll,
                start,
                count,
                body,
            } => self.interp_for(e, var, *unroll, start, count, body),

            ExpKind::While { cond, body } => {
                self.no_guess(|ev| ev.interp_while(e, cond, body))
            }

            ExpKind::Call { func, args } => {
                // Calls are opaque and may write through any ref argument.
                self.invalidate_refs();
                let mut new_args = Vec::with_capacity(args.len());
                for a in args {
                    new_args.push(self.interp(a)?.into_exp());
                }
                let kind = ExpKind::Call {
                    func: func.clone(),
                    args: new_args,
                };
                let rebuilt = self.rebuild(e, kind);
                self.residual(rebuilt)
            }

            ExpKind::Print { newline, args } => {
                let mut evs = Vec::with_capacity(args.len());
                for a in args {
                    evs.push(self.interp(a)?);
                }
                for (i, ev) in evs.iter().enumerate() {
                    self.log.push(PrintEntry {
                        newline: *newline && i + 1 == evs.len(),
                        out: ev.clone(),
                    });
                }
                if self.mode == Mode::Full {
                    return Ok(Evald::Val(ValueKind::Unit.at(e.span)));
                }
                // Residualised so the generated program preserves I/O order.
                let kind = ExpKind::Print {
                    newline: *newline,
                    args: evs.into_iter().map(Evald::into_exp).collect(),
                };
                Ok(Evald::Residual(self.rebuild(e, kind)))
            }

            ExpKind::Error { msg } => match self.mode {
                Mode::Full => Err(EvalError::Program {
                    msg: msg.clone(),
                    span: e.span,
                }
                .into()),
                _ => Ok(Evald::Residual(e.clone())),
            },

            ExpKind::Lut(_) => Err(EvalError::Unsupported {
                what: "lut marker during interpretation".into(),
                span: e.span,
            }
            .into()),
        }
    }

    fn interp_unop(&mut self, e: &Exp, op: &UnOp, operand: &Exp) -> Step<Evald> {
        let o = self.interp(operand)?;
        match op {
            UnOp::Length => {
                if let Some(arr) = o.value().and_then(|v| v.as_array()) {
                    return Ok(Evald::Val(ValueKind::I32(arr.len() as i32).at(e.span)));
                }
                // The type alone decides when the length is static.
                if let Some(n) = operand.ty.static_len() {
                    return Ok(Evald::Val(ValueKind::I32(n as i32).at(e.span)));
                }
            }
            UnOp::Cast(target) => {
                if let Some(v) = o.value() {
                    match ops::cast(target, &v.kind) {
                        Some(k) => return Ok(Evald::Val(k.at(e.span))),
                        // Outside the cast matrix: leave it residual.
                        None => {}
                    }
                }
            }
            _ => {
                if let Some(v) = o.value() {
                    return match ops::unop(op, &v.kind) {
                        Some(k) => Ok(Evald::Val(k.at(e.span))),
                        None => Err(EvalError::TypeMismatch {
                            expr: e.to_string(),
                            span: e.span,
                        }
                        .into()),
                    };
                }
            }
        }
        let kind = ExpKind::UnOp {
            op: op.clone(),
            operand: Box::new(o.into_exp()),
        };
        let rebuilt = self.rebuild(e, kind);
        self.residual(rebuilt)
    }

    fn interp_binop(&mut self, e: &Exp, op: BinOp, left: &Exp, right: &Exp) -> Step<Evald> {
        if matches!(op, BinOp::And | BinOp::Or) {
            let l = self.interp(left)?;
            if let Some(b) = l.value().and_then(|v| v.as_bool()) {
                let decides = matches!(op, BinOp::Or) == b;
                if decides {
                    return Ok(Evald::Val(self.bool_value(&e.ty, b, e.span)));
                }
                return self.interp(right);
            }
            let r = self.interp(right)?;
            let kind = ExpKind::BinOp {
                op,
                left: Box::new(l.into_exp()),
                right: Box::new(r.into_exp()),
            };
            let rebuilt = self.rebuild(e, kind);
            return self.residual(rebuilt);
        }

        let l = self.interp(left)?;
        let r = self.interp(right)?;
        match (l.value(), r.value()) {
            (Some(lv), Some(rv)) => {
                let int_like = !matches!(rv.kind, ValueKind::Double(_));
                if matches!(op, BinOp::Div | BinOp::Rem) && int_like && ops::is_zero(&rv.kind) {
                    return Err(EvalError::DivideByZero { span: e.span }.into());
                }
                match ops::binop(op, &lv.kind, &rv.kind) {
                    Some(k) => Ok(Evald::Val(k.at(e.span))),
                    None => Err(EvalError::TypeMismatch {
                        expr: e.to_string(),
                        span: e.span,
                    }
                    .into()),
                }
            }
            _ => {
                // Identities that fire across a residual operand.
                match op {
                    BinOp::Add => {
                        if l.value().is_some_and(|v| ops::is_zero(&v.kind)) {
                            return Ok(r);
                        }
                        if r.value().is_some_and(|v| ops::is_zero(&v.kind)) {
                            return Ok(l);
                        }
                    }
                    BinOp::Mul => {
                        if l.value().is_some_and(|v| ops::is_one(&v.kind)) {
                            return Ok(r);
                        }
                        if r.value().is_some_and(|v| ops::is_one(&v.kind)) {
                            return Ok(l);
                        }
                    }
                    _ => {}
                }
                let kind = ExpKind::BinOp {
                    op,
                    left: Box::new(l.into_exp()),
                    right: Box::new(r.into_exp()),
                };
                let rebuilt = self.rebuild(e, kind);
                self.residual(rebuilt)
            }
        }
    }

    fn interp_letref(
        &mut self,
        e: &Exp,
        name: &Name,
        var_ty: &Ty,
        init: Option<&Exp>,
        body: &Exp,
    ) -> Step<Evald> {
        let mut residual_init = None;
        match init {
            Some(init_exp) => match self.interp(init_exp)? {
                Evald::Val(v) => {
                    self.note_size(name, &v);
                    self.refs.insert(
                        name.clone(),
                        RefState::Known {
                            value: v,
                            origin: Origin::Explicit,
                        },
                    );
                }
                Evald::Residual(r) => {
                    residual_init = Some(r);
                    self.refs
                        .insert(name.clone(), RefState::Unknown { last: None });
                }
            },
            None => match Value::zero(var_ty, e.span) {
                Some(zero) => {
                    self.note_size(name, &zero);
                    self.refs.insert(
                        name.clone(),
                        RefState::Known {
                            value: zero,
                            origin: Origin::Implicit,
                        },
                    );
                }
                // Non-ground type with no initialiser: nothing to track.
                None => {
                    self.refs
                        .insert(name.clone(), RefState::Unknown { last: None });
                }
            },
        }

        let body_ev = self.interp(body);
        let final_state = self.refs.shift_remove(name);
        let body_ev = body_ev?;

        let emit = |init: Option<Exp>, body: Exp| -> ExpKind {
            ExpKind::LetRef {
                name: name.clone(),
                ty: var_ty.clone(),
                init: init.map(Box::new),
                body: Box::new(body),
            }
        };

        match final_state {
            // Known and explicit throughout: every read folded, drop it.
            Some(RefState::Known {
                origin: Origin::Explicit,
                ..
            })
            | None => Ok(body_ev),
            // Still at the implicit default: keep an initialiser-less
            // binding; the code generator zeroes the storage.
            Some(RefState::Known {
                origin: Origin::Implicit,
                ..
            }) => {
                let rebuilt = self.rebuild(e, emit(None, body_ev.into_exp()));
                Ok(Evald::Residual(rebuilt))
            }
            Some(RefState::Unknown { last }) => {
                let kind = match last {
                    Some((v, Origin::Explicit)) => {
                        if let Some(writes) = self.array_write_out(name, var_ty, &v) {
                            let mut chained = body_ev.into_exp();
                            for w in writes.into_iter().rev() {
                                chained = Exp::seq(w, chained);
                            }
                            emit(None, chained)
                        } else {
                            emit(Some(Exp::val(v)), body_ev.into_exp())
                        }
                    }
                    Some((_, Origin::Implicit)) => emit(None, body_ev.into_exp()),
                    None => emit(residual_init, body_ev.into_exp()),
                };
                let rebuilt = self.rebuild(e, kind);
                Ok(Evald::Residual(rebuilt))
            }
        }
    }

    /// Element assignments for a sparse array with few writes over a zero
    /// default; avoids multi-kilobyte literal arrays in generated code.
    fn array_write_out(&self, name: &Name, var_ty: &Ty, v: &Value) -> Option<Vec<Exp>> {
        let arr = v.as_array()?;
        if arr.updates() > WRITE_OUT_LIMIT {
            return None;
        }
        let elem_zero = var_ty.elem_ty().and_then(|t| Value::zero(t, v.span))?;
        if *arr.default_elem() != elem_zero {
            return None;
        }
        let writes = arr
            .iter_writes()
            .map(|(i, elem)| {
                let base = Exp::var(name.clone(), var_ty.clone(), v.span);
                let kind = ExpKind::ArrWrite {
                    base: Box::new(base),
                    index: Box::new(Exp::int32(i as i32, v.span)),
                    slice: SliceKind::Single,
                    rhs: Box::new(Exp::val(elem.clone())),
                };
                Exp::new(kind, Ty::Unit, v.span)
            })
            .collect();
        Some(writes)
    }

    /// Evaluate the index positions of an assignment target, keeping both
    /// the static selector path (when fully known) and the rebuilt
    /// expression for residualisation.
    fn eval_lhs(&mut self, lhs: &Exp) -> Step<LhsPath> {
        match &lhs.kind {
            ExpKind::Var(n) => Ok(LhsPath {
                head: Some(n.clone()),
                selectors: Some(Vec::new()),
                rebuilt: lhs.clone(),
            }),
            ExpKind::ArrayRead { base, index, slice } => {
                let mut path = self.eval_lhs(base)?;
                let i = self.interp(index)?;
                let static_sel = match (&mut path.selectors, i.value().and_then(|v| v.as_index())) {
                    (Some(sels), Some(idx)) => match slice {
                        SliceKind::Single => {
                            sels.push(Selector::Elem(idx));
                            true
                        }
                        SliceKind::Len(n) => {
                            sels.push(Selector::Slice(idx, *n));
                            true
                        }
                        SliceKind::Meta(_) => false,
                    },
                    _ => false,
                };
                if !static_sel {
                    path.selectors = None;
                }
                let kind = ExpKind::ArrayRead {
                    base: Box::new(path.rebuilt),
                    index: Box::new(i.into_exp()),
                    slice: slice.clone(),
                };
                path.rebuilt = Exp::new(kind, lhs.ty.clone(), lhs.span);
                Ok(path)
            }
            ExpKind::Proj { base, field } => {
                let mut path = self.eval_lhs(base)?;
                if let Some(sels) = &mut path.selectors {
                    sels.push(Selector::Field(field.clone()));
                }
                let kind = ExpKind::Proj {
                    base: Box::new(path.rebuilt),
                    field: field.clone(),
                };
                path.rebuilt = Exp::new(kind, lhs.ty.clone(), lhs.span);
                Ok(path)
            }
            // Not a deref path; evaluate for effects and residualise.
            _ => {
                let ev = self.interp(lhs)?;
                Ok(LhsPath {
                    head: None,
                    selectors: None,
                    rebuilt: ev.into_exp(),
                })
            }
        }
    }

    fn assign_to(&mut self, e: &Exp, path: LhsPath, rhs_ev: Evald) -> Step<Evald> {
        // Any assignment drops all non-deterministic assumptions.
        self.clear_guesses();

        if let (Some(head), Some(sels), Some(rhs_v)) =
            (&path.head, &path.selectors, rhs_ev.value())
        {
            if sels.is_empty() {
                // Simple overwrite: the old value is discarded entirely.
                if self.refs.contains_key(head) {
                    self.note_size(head, rhs_v);
                    self.refs.insert(
                        head.clone(),
                        RefState::Known {
                            value: rhs_v.clone(),
                            origin: Origin::Explicit,
                        },
                    );
                    return Ok(Evald::Val(ValueKind::Unit.at(e.span)));
                }
            } else if let Some(RefState::Known { value, .. }) = self.refs.get(head) {
                let mut updated = value.clone();
                self.update_path(&mut updated, sels, rhs_v.clone(), e.span)?;
                self.note_size(head, &updated);
                self.refs.insert(
                    head.clone(),
                    RefState::Known {
                        value: updated,
                        origin: Origin::Explicit,
                    },
                );
                return Ok(Evald::Val(ValueKind::Unit.at(e.span)));
            }
        }

        // The store cannot absorb this write; invalidate the head.
        if let Some(head) = &path.head {
            let simple = matches!(&path.selectors, Some(sels) if sels.is_empty());
            if let Some(state) = self.refs.get_mut(head) {
                *state = match (simple, &*state) {
                    // Whole-variable overwrite: prior value is dead.
                    (true, _) => RefState::Unknown { last: None },
                    // Partial overwrite: remember the prior known value so
                    // code generation can seed the initial state.
                    (false, RefState::Known { value, origin }) => RefState::Unknown {
                        last: Some((value.clone(), *origin)),
                    },
                    (false, RefState::Unknown { last }) => {
                        RefState::Unknown { last: last.clone() }
                    }
                };
            }
        }

        // arr[i] := v keeps its array-write shape when unreduced.
        let lhs = path.rebuilt;
        let kind = match lhs.kind {
            ExpKind::ArrayRead { base, index, slice } => ExpKind::ArrWrite {
                base,
                index,
                slice,
                rhs: Box::new(rhs_ev.into_exp()),
            },
            lhs_kind => ExpKind::Assign {
                lhs: Box::new(Exp::new(lhs_kind, lhs.ty, lhs.span)),
                rhs: Box::new(rhs_ev.into_exp()),
            },
        };
        let rebuilt = Exp::new(kind, Ty::Unit, e.span);
        self.residual(rebuilt)
    }

    fn update_path(
        &self,
        target: &mut Value,
        sels: &[Selector],
        rhs: Value,
        span: Span,
    ) -> Step<()> {
        let Some((sel, rest)) = sels.split_first() else {
            *target = rhs;
            return Ok(());
        };
        let desc = target.to_string();
        let mismatch = move || {
            Abort::from(EvalError::TypeMismatch {
                expr: format!("assignment through {desc}"),
                span,
            })
        };
        match sel {
            Selector::Elem(i) => {
                let ValueKind::Array(arr) = &mut target.kind else {
                    return Err(mismatch());
                };
                let mut elem = arr.get(*i).cloned().ok_or(Abort::Fail(
                    EvalError::OutOfBounds {
                        index: *i as i64,
                        len: arr.len(),
                        span,
                    },
                ))?;
                self.update_path(&mut elem, rest, rhs, span)?;
                arr.set(*i, elem);
                Ok(())
            }
            Selector::Slice(start, n) => {
                if !rest.is_empty() {
                    return Err(mismatch());
                }
                let src = match rhs.as_array() {
                    Some(src) if src.len() == *n => src.clone(),
                    _ => return Err(mismatch()),
                };
                let ValueKind::Array(arr) = &mut target.kind else {
                    return Err(mismatch());
                };
                if !arr.set_slice(*start, &src) {
                    return Err(EvalError::OutOfBounds {
                        index: *start as i64,
                        len: arr.len(),
                        span,
                    }
                    .into());
                }
                Ok(())
            }
            Selector::Field(f) => {
                if let Some(mut c) = target.complex_component(f) {
                    self.update_path(&mut c, rest, rhs, span)?;
                    return self.set_complex_component(target, f, &c, span);
                }
                let ValueKind::Struct { fields, .. } = &mut target.kind else {
                    return Err(mismatch());
                };
                let Some((_, fv)) = fields.iter_mut().find(|(name, _)| name == f) else {
                    return Err(mismatch());
                };
                self.update_path(fv, rest, rhs, span)
            }
        }
    }

    fn set_complex_component(
        &self,
        target: &mut Value,
        field: &str,
        v: &Value,
        span: Span,
    ) -> Step<()> {
        let n = v.as_int().ok_or_else(|| {
            Abort::from(EvalError::TypeMismatch {
                expr: format!("assignment through {target}"),
                span,
            })
        })?;
        let ok = match (&mut target.kind, field) {
            (ValueKind::C8(c), "re") => {
                c.re = n as i8;
                true
            }
            (ValueKind::C8(c), "im") => {
                c.im = n as i8;
                true
            }
            (ValueKind::C16(c), "re") => {
                c.re = n as i16;
                true
            }
            (ValueKind::C16(c), "im") => {
                c.im = n as i16;
                true
            }
            (ValueKind::C32(c), "re") => {
                c.re = n as i32;
                true
            }
            (ValueKind::C32(c), "im") => {
                c.im = n as i32;
                true
            }
            (ValueKind::C64(c), "re") => {
                c.re = n as i64;
                true
            }
            (ValueKind::C64(c), "im") => {
                c.im = n as i64;
                true
            }
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(EvalError::TypeMismatch {
                expr: format!("assignment through {target}"),
                span,
            }
            .into())
        }
    }

    fn interp_for(
        &mut self,
        e: &Exp,
        var: &Name,
        unroll: UnrollAnn,
        start: &Exp,
        count: &Exp,
        body: &Exp,
    ) -> Step<Evald> {
        let s_ev = self.interp(start)?;
        let c_ev = self.interp(count)?;

        let bounds = match (
            s_ev.value().and_then(|v| v.as_int()),
            c_ev.value().and_then(|v| v.as_int()),
        ) {
            (Some(s), Some(n)) if n >= 0 => Some((s, n)),
            _ => None,
        };

        if let Some((s, n)) = bounds {
            if n <= UNROLL_CAP && unroll != UnrollAnn::NoUnroll {
                let start_kind = &s_ev.value().expect("bounds imply a value").kind;
                let snap = self.snapshot();
                let mut unrolled = true;
                for i in 0..n {
                    let iv = ops::retag_int(start_kind, s + i)
                        .expect("loop bound is an integer tag")
                        .at(e.span);
                    self.lets.insert(var.clone(), iv);
                    let r = self.interp(body);
                    self.lets.shift_remove(var);
                    match r? {
                        Evald::Val(_) => {}
                        Evald::Residual(_) => {
                            unrolled = false;
                            break;
                        }
                    }
                }
                if unrolled {
                    return Ok(Evald::Val(ValueKind::Unit.at(e.span)));
                }
                debug!(count = n, "loop unrolling aborted, state restored");
                self.restore(&snap);
            }
        }

        // Symbolic loop: the body runs an unknown number of times. The
        // body pass below is for residualisation only; its state effects
        // are already covered by the invalidation and must not leak into
        // the post-loop state (they would discard the last known values
        // that seed letref initialisers).
        self.invalidate_refs();
        let invalidated = self.snapshot();
        let body_ev = self.no_guess(|ev| ev.interp(body));
        self.restore(&invalidated);
        let body_ev = body_ev?;
        let kind = ExpKind::For {
            var: var.clone(),
            unroll,
            start: Box::new(s_ev.into_exp()),
            count: Box::new(c_ev.into_exp()),
            body: Box::new(body_ev.into_exp()),
        };
        let rebuilt = self.rebuild(e, kind);
        self.residual(rebuilt)
    }

    fn interp_while(&mut self, e: &Exp, cond: &Exp, body: &Exp) -> Step<Evald> {
        let snap = self.snapshot();
        loop {
            match self.interp(cond)?.value().and_then(|v| v.as_bool()) {
                Some(false) => return Ok(Evald::Val(ValueKind::Unit.at(e.span))),
                Some(true) => match self.interp(body)? {
                    Evald::Val(_) => continue,
                    Evald::Residual(_) => break,
                },
                None => break,
            }
        }
        self.restore(&snap);
        self.invalidate_refs();
        let invalidated = self.snapshot();
        let c = self.interp(cond)?;
        let b = self.interp(body)?;
        self.restore(&invalidated);
        let kind = ExpKind::While {
            cond: Box::new(c.into_exp()),
            body: Box::new(b.into_exp()),
        };
        let rebuilt = self.rebuild(e, kind);
        self.residual(rebuilt)
    }
}

/// Fully interpret `e`; any unreduced subexpression is an error. Returns
/// the result together with the ordered print log.
pub fn eval_full(e: &Exp) -> (Result<Value>, PrintLog) {
    let mut ev = Evaluator::new(Mode::Full);
    let out = match ev.interp(e) {
        Ok(Evald::Val(v)) => Ok(v),
        Ok(Evald::Residual(_)) => unreachable!("full mode never residualises"),
        Err(Abort::Fail(err)) => Err(err),
        Err(Abort::Prune) => unreachable!("pruning outside non-deterministic mode"),
    };
    (out, ev.log)
}

/// Partially evaluate `e`, folding known subterms and leaving the rest
/// residual. Returns the residual, the print log, and the per-variable
/// size statistics.
pub fn eval_partial(e: &Exp) -> (Result<Exp>, PrintLog, Stats) {
    let mut ev = Evaluator::new(Mode::Partial);
    let out = match ev.interp(e) {
        Ok(res) => Ok(res.into_exp()),
        Err(Abort::Fail(err)) => Err(err),
        Err(Abort::Prune) => unreachable!("pruning outside non-deterministic mode"),
    };
    (out, ev.log, ev.stats)
}

/// Enumerate the non-deterministic evaluations of `e`, one entry per
/// surviving branch in depth-first order. Pruned branches (empty integer
/// domains) are dropped. Callers bound the exploration by limiting how
/// much of the result they consume.
pub fn eval_nondet(e: &Exp) -> Vec<(Result<Exp>, PrintLog)> {
    let mut results = Vec::new();
    let mut pending = vec![Vec::new()];
    while let Some(script) = pending.pop() {
        let fresh_from = script.len();
        let mut ev = Evaluator::new(Mode::NonDet);
        ev.choices = ChoiceScript::with_script(script);
        let outcome = ev.interp(e);
        for i in fresh_from..ev.choices.trace.len() {
            let mut sibling = ev.choices.trace[..i].to_vec();
            sibling.push(false);
            pending.push(sibling);
        }
        match outcome {
            Ok(res) => results.push((Ok(res.into_exp()), ev.log)),
            Err(Abort::Fail(err)) => results.push((Err(err), ev.log)),
            Err(Abort::Prune) => {}
        }
    }
    results
}
