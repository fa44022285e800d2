//! Partial and full evaluation behaviour over hand-built ASTs.

use aether_ast::{BinOp, Exp, ExpKind, InlineAnn, SliceKind, UnrollAnn};
use aether_eval::{EvalError, eval_full, eval_partial};
use aether_foundation::{
    Complex, IntWidth, Name, Span, SparseArray, Ty, Value, ValueKind,
};

fn sp() -> Span {
    Span::unknown()
}

fn i32t() -> Ty {
    Ty::Int(IntWidth::W32)
}

fn ivar(text: &str, uniq: u32) -> Exp {
    Exp::var(Name::new(text, uniq), i32t(), sp())
}

fn lit(v: i32) -> Exp {
    Exp::int32(v, sp())
}

/// `(2 + 3) * 4` fully folds in both modes.
#[test]
fn constant_folding() {
    let e = Exp::binop(
        BinOp::Mul,
        Exp::binop(BinOp::Add, lit(2), lit(3)),
        lit(4),
    );
    let (full, _) = eval_full(&e);
    assert_eq!(full.unwrap().kind, ValueKind::I32(20));

    let (partial, _, _) = eval_partial(&e);
    assert_eq!(
        partial.unwrap().as_literal().unwrap().kind,
        ValueKind::I32(20)
    );
}

/// `let y = a + 2 * 3 in y + 0` with `a` free folds to `a + 6` under the
/// binding.
#[test]
fn symbolic_folding() {
    let y = Name::new("y", 2);
    let rhs = Exp::binop(
        BinOp::Add,
        ivar("a", 1),
        Exp::binop(BinOp::Mul, lit(2), lit(3)),
    );
    let body = Exp::binop(BinOp::Add, Exp::var(y.clone(), i32t(), sp()), lit(0));
    let e = Exp::let_(y.clone(), InlineAnn::Auto, rhs, body);

    let (out, _, _) = eval_partial(&e);
    match out.unwrap().kind {
        ExpKind::Let { name, rhs, body, .. } => {
            assert_eq!(name, y);
            match rhs.kind {
                ExpKind::BinOp { op, left, right } => {
                    assert_eq!(op, BinOp::Add);
                    assert!(matches!(left.kind, ExpKind::Var(ref n) if n.text == "a"));
                    assert_eq!(right.as_literal().unwrap().kind, ValueKind::I32(6));
                }
                other => panic!("expected a + 6, got {other:?}"),
            }
            assert!(matches!(body.kind, ExpKind::Var(ref n) if *n == y));
        }
        other => panic!("expected let, got {other:?}"),
    }
}

fn accumulating_loop(count: i32) -> Exp {
    // var x := 0; for i in 0, count { x := x + i }; x
    let x = Name::new("x", 1);
    let i = Name::new("i", 2);
    let body = Exp::assign(
        Exp::var(x.clone(), i32t(), sp()),
        Exp::binop(
            BinOp::Add,
            Exp::var(x.clone(), i32t(), sp()),
            Exp::var(i.clone(), i32t(), sp()),
        ),
    );
    let loop_ = Exp::for_(i, UnrollAnn::Auto, lit(0), lit(count), body);
    Exp::letref(
        x.clone(),
        i32t(),
        Some(lit(0)),
        Exp::seq(loop_, Exp::var(x, i32t(), sp())),
    )
}

/// Small loops unroll completely and the ref binding disappears.
#[test]
fn loop_unrolls_and_drops_ref() {
    let e = accumulating_loop(4);
    let (out, _, _) = eval_partial(&e);
    assert_eq!(out.unwrap().as_literal().unwrap().kind, ValueKind::I32(6));

    let (full, _) = eval_full(&e);
    assert_eq!(full.unwrap().kind, ValueKind::I32(6));
}

/// Loops beyond the unroll cap residualise with the variable in scope
/// and the explicit initialiser preserved.
#[test]
fn large_loop_residualises() {
    let e = accumulating_loop(1000);
    let (out, _, _) = eval_partial(&e);
    match out.unwrap().kind {
        ExpKind::LetRef { init, body, .. } => {
            let init = init.expect("initialiser kept for the runtime loop");
            assert_eq!(init.as_literal().unwrap().kind, ValueKind::I32(0));
            match body.kind {
                ExpKind::Seq { first, second } => {
                    assert!(matches!(first.kind, ExpKind::For { .. }));
                    assert!(matches!(second.kind, ExpKind::Var(_)));
                }
                other => panic!("expected loop then read, got {other:?}"),
            }
        }
        other => panic!("expected letref, got {other:?}"),
    }
}

/// Aborted unrolling restores the pre-loop state, including the log.
#[test]
fn aborted_unroll_restores_state() {
    // var x := 0; for i in 0, 4 { x := x + i; print(x) }; x
    let x = Name::new("x", 1);
    let i = Name::new("i", 2);
    let body = Exp::seq(
        Exp::assign(
            Exp::var(x.clone(), i32t(), sp()),
            Exp::binop(
                BinOp::Add,
                Exp::var(x.clone(), i32t(), sp()),
                Exp::var(i.clone(), i32t(), sp()),
            ),
        ),
        Exp::new(
            ExpKind::Print {
                newline: false,
                args: vec![Exp::var(x.clone(), i32t(), sp())],
            },
            Ty::Unit,
            sp(),
        ),
    );
    let loop_ = Exp::for_(i, UnrollAnn::Auto, lit(0), lit(4), body);
    let e = Exp::letref(
        x.clone(),
        i32t(),
        Some(lit(0)),
        Exp::seq(loop_, Exp::var(x, i32t(), sp())),
    );

    let (out, log, _) = eval_partial(&e);
    match out.unwrap().kind {
        ExpKind::LetRef { init, .. } => {
            assert_eq!(
                init.expect("initialiser kept").as_literal().unwrap().kind,
                ValueKind::I32(0)
            );
        }
        other => panic!("expected letref, got {other:?}"),
    }
    // Prints attempted during the aborted unroll were rolled back.
    assert!(log.is_empty());
}

/// The print log observes argument order even when nothing reduces.
#[test]
fn print_order_preserved() {
    let print = |name: &str, uniq: u32| {
        Exp::new(
            ExpKind::Print {
                newline: false,
                args: vec![ivar(name, uniq)],
            },
            Ty::Unit,
            sp(),
        )
    };
    let e = Exp::seq(print("a", 1), print("b", 2));
    let (out, log, _) = eval_partial(&e);
    assert!(out.is_ok());
    assert_eq!(log.len(), 2);
    let rendered: Vec<String> = log
        .iter()
        .map(|entry| entry.out.clone().into_exp().to_string())
        .collect();
    assert_eq!(rendered, vec!["a".to_string(), "b".to_string()]);
}

/// After `x := <unknown>`, later reads of `x` are free occurrences, not
/// the previous value.
#[test]
fn assignment_invalidation() {
    let x = Name::new("x", 1);
    let call = Exp::new(
        ExpKind::Call {
            func: Name::new("viterbi_init", 9),
            args: vec![],
        },
        i32t(),
        sp(),
    );
    let e = Exp::letref(
        x.clone(),
        i32t(),
        Some(lit(1)),
        Exp::seq(
            Exp::assign(Exp::var(x.clone(), i32t(), sp()), call),
            Exp::var(x.clone(), i32t(), sp()),
        ),
    );
    let (out, _, _) = eval_partial(&e);
    match out.unwrap().kind {
        ExpKind::LetRef { init, body, .. } => {
            // Whole-variable overwrite discards the old initialiser.
            assert!(init.is_none());
            match body.kind {
                ExpKind::Seq { second, .. } => {
                    assert!(matches!(second.kind, ExpKind::Var(ref n) if *n == x));
                }
                other => panic!("expected seq, got {other:?}"),
            }
        }
        other => panic!("expected letref, got {other:?}"),
    }
}

/// An unknown conditional invalidates coarsely but keeps the last known
/// value as the residual initialiser.
#[test]
fn unknown_branch_keeps_initialiser() {
    let x = Name::new("x", 1);
    let c = Exp::var(Name::new("c", 2), Ty::Bool, sp());
    let branch = Exp::cond(
        c,
        Exp::assign(Exp::var(x.clone(), i32t(), sp()), lit(7)),
        Exp::unit(sp()),
    );
    let e = Exp::letref(
        x.clone(),
        i32t(),
        Some(lit(5)),
        Exp::seq(branch, Exp::var(x, i32t(), sp())),
    );
    let (out, _, _) = eval_partial(&e);
    match out.unwrap().kind {
        ExpKind::LetRef { init, .. } => {
            assert_eq!(
                init.expect("last known value seeds the initialiser")
                    .as_literal()
                    .unwrap()
                    .kind,
                ValueKind::I32(5)
            );
        }
        other => panic!("expected letref, got {other:?}"),
    }
}

/// While loops run to static completion when everything is known.
#[test]
fn while_loop_runs_statically() {
    let x = Name::new("x", 1);
    let body = Exp::assign(
        Exp::var(x.clone(), i32t(), sp()),
        Exp::binop(BinOp::Add, Exp::var(x.clone(), i32t(), sp()), lit(1)),
    );
    let cond = Exp::binop(BinOp::Lt, Exp::var(x.clone(), i32t(), sp()), lit(3));
    let loop_ = Exp::new(
        ExpKind::While {
            cond: Box::new(cond),
            body: Box::new(body),
        },
        Ty::Unit,
        sp(),
    );
    let e = Exp::letref(
        x.clone(),
        i32t(),
        Some(lit(0)),
        Exp::seq(loop_, Exp::var(x, i32t(), sp())),
    );
    let (out, _, _) = eval_partial(&e);
    assert_eq!(out.unwrap().as_literal().unwrap().kind, ValueKind::I32(3));
}

/// Sparse arrays with few writes residualise as element assignments, not
/// a literal array initialiser.
#[test]
fn array_write_out() {
    let arr_ty = Ty::Array(
        aether_foundation::ArrayLen::Static(1000),
        Box::new(i32t()),
    );
    let x = Name::new("x", 1);
    let write = |idx: i32, v: i32| {
        Exp::new(
            ExpKind::ArrWrite {
                base: Box::new(Exp::var(x.clone(), arr_ty.clone(), sp())),
                index: Box::new(lit(idx)),
                slice: SliceKind::Single,
                rhs: Box::new(lit(v)),
            },
            Ty::Unit,
            sp(),
        )
    };
    let call = Exp::new(
        ExpKind::Call {
            func: Name::new("sora_ifft", 9),
            args: vec![Exp::var(x.clone(), arr_ty.clone(), sp())],
        },
        Ty::Unit,
        sp(),
    );
    let e = Exp::letref(
        x.clone(),
        arr_ty.clone(),
        None,
        Exp::seq(write(3, 7), Exp::seq(write(5, 9), call)),
    );

    let (out, _, _) = eval_partial(&e);
    match out.unwrap().kind {
        ExpKind::LetRef { init, body, .. } => {
            assert!(init.is_none());
            let mut writes = 0;
            let mut cur = *body;
            while let ExpKind::Seq { first, second } = cur.kind {
                assert!(matches!(first.kind, ExpKind::ArrWrite { .. }));
                writes += 1;
                cur = *second;
            }
            assert_eq!(writes, 2);
            assert!(matches!(cur.kind, ExpKind::Call { .. }));
        }
        other => panic!("expected letref, got {other:?}"),
    }
}

/// A slice read covering the whole array folds to the array itself.
#[test]
fn whole_array_read_folds() {
    let arr_ty = Ty::Array(aether_foundation::ArrayLen::Static(4), Box::new(i32t()));
    let base = Exp::var(Name::new("buf", 1), arr_ty, sp());
    let e = Exp::arr_read(base.clone(), lit(0), SliceKind::Len(4));
    let (out, _, _) = eval_partial(&e);
    assert_eq!(out.unwrap(), base);
}

/// Out-of-bounds reads with known base and index are fatal.
#[test]
fn out_of_bounds_fails() {
    let lit_arr = Exp::new(
        ExpKind::ArrayLit(vec![lit(1), lit(2), lit(3)]),
        Ty::Array(aether_foundation::ArrayLen::Static(3), Box::new(i32t())),
        sp(),
    );
    let e = Exp::arr_read(lit_arr, lit(5), SliceKind::Single);
    let (out, _, _) = eval_partial(&e);
    assert!(matches!(out, Err(EvalError::OutOfBounds { index: 5, len: 3, .. })));
}

/// Free variables are fatal in full mode only.
#[test]
fn free_variable_full_mode() {
    let e = ivar("a", 1);
    let (full, _) = eval_full(&e);
    assert!(matches!(full, Err(EvalError::FreeVariable { .. })));
    let (partial, _, _) = eval_partial(&e);
    assert_eq!(partial.unwrap(), e);
}

/// `x + 0`, `0 + x`, `x * 1`, `1 * x` all reduce to `x`.
#[test]
fn algebraic_identities() {
    let a = ivar("a", 1);
    let cases = [
        Exp::binop(BinOp::Add, a.clone(), lit(0)),
        Exp::binop(BinOp::Add, lit(0), a.clone()),
        Exp::binop(BinOp::Mul, a.clone(), lit(1)),
        Exp::binop(BinOp::Mul, lit(1), a.clone()),
    ];
    for e in cases {
        let (out, _, _) = eval_partial(&e);
        assert_eq!(out.unwrap(), a, "{e} should fold to a");
    }
}

/// Interpreting `to_exp(v)` gives back `v`, location ignored.
#[test]
fn value_round_trip() {
    let values = [
        ValueKind::I32(-7).at(sp()),
        ValueKind::U64(1 << 40).at(sp()),
        ValueKind::Double(2.5).at(sp()),
        ValueKind::Bit(true).at(sp()),
        ValueKind::Str("pilot".into()).at(sp()),
        ValueKind::C16(Complex::new(3, -4)).at(sp()),
        ValueKind::Array(SparseArray::from_elems(
            ValueKind::I32(0).at(sp()),
            vec![ValueKind::I32(1).at(sp()), ValueKind::I32(2).at(sp())],
        ))
        .at(sp()),
        Value::struct_value(
            "hdr",
            vec![
                ("len".into(), ValueKind::U16(64).at(sp())),
                ("crc_ok".into(), ValueKind::Bool(true).at(sp())),
            ],
            sp(),
        ),
    ];
    for v in values {
        let (out, _) = eval_full(&Exp::val(v.clone()));
        assert_eq!(out.unwrap(), v);
    }
}

/// If full evaluation produces `v`, partial evaluation produces the
/// literal for `v`.
#[test]
fn partial_agrees_with_full() {
    let e = Exp::binop(
        BinOp::ShiftL,
        Exp::binop(BinOp::Add, lit(1), lit(1)),
        lit(3),
    );
    let (full, _) = eval_full(&e);
    let v = full.unwrap();
    let (partial, _, _) = eval_partial(&e);
    assert_eq!(partial.unwrap(), Exp::val(v));
}

/// Force-inline substitutes the initialiser rather than evaluating it at
/// the binding site.
#[test]
fn force_inline_substitutes() {
    // let! y = a in y + y  ~~>  a + a
    let y = Name::new("y", 2);
    let e = Exp::let_(
        y.clone(),
        InlineAnn::Force,
        ivar("a", 1),
        Exp::binop(
            BinOp::Add,
            Exp::var(y.clone(), i32t(), sp()),
            Exp::var(y, i32t(), sp()),
        ),
    );
    let (out, _, _) = eval_partial(&e);
    match out.unwrap().kind {
        ExpKind::BinOp { op, left, right } => {
            assert_eq!(op, BinOp::Add);
            assert!(matches!(left.kind, ExpKind::Var(ref n) if n.text == "a"));
            assert!(matches!(right.kind, ExpKind::Var(ref n) if n.text == "a"));
        }
        other => panic!("expected a + a, got {other:?}"),
    }
}

/// Division by a known zero is a dedicated error, not a type bug.
#[test]
fn division_by_zero() {
    let e = Exp::binop(BinOp::Div, lit(7), lit(0));
    let (out, _) = eval_full(&e);
    assert!(matches!(out, Err(EvalError::DivideByZero { .. })));
}

/// Struct projection on a complex-named struct reaches the dedicated
/// complex representation.
#[test]
fn complex_projection() {
    let v = Value::struct_value(
        "complex32",
        vec![
            ("re".into(), ValueKind::I32(5).at(sp())),
            ("im".into(), ValueKind::I32(-2).at(sp())),
        ],
        sp(),
    );
    let e = Exp::new(
        ExpKind::Proj {
            base: Box::new(Exp::val(v)),
            field: "im".into(),
        },
        i32t(),
        sp(),
    );
    let (out, _) = eval_full(&e);
    assert_eq!(out.unwrap().kind, ValueKind::I32(-2));
}
