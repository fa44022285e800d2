//! The scalar expression language.
//!
//! Expressions carry their resolved type and source span. The evaluator
//! rebuilds residual nodes with the original type annotation, so partial
//! evaluation never invents types.

use serde::{Deserialize, Serialize};

use aether_foundation::{ArrayLen, IntWidth, Name, Span, Ty, Value, ValueKind};

/// Inlining request attached to a let binding.
///
/// `Force` substitutes the initialiser into the body before evaluation;
/// `Never` pins the binding for the code generator; `Auto` leaves the
/// decision to later passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InlineAnn {
    Auto,
    Force,
    Never,
}

/// Unrolling request attached to a counted loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnrollAnn {
    Auto,
    Unroll,
    NoUnroll,
}

/// Index mode of an array read or write: one element, a slice of fixed
/// length, or a slice whose length is a type-level variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SliceKind {
    Single,
    Len(usize),
    Meta(String),
}

/// Unary operators, including casts and the array length operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
    BwNeg,
    Cast(Ty),
    Length,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Expon,
    ShiftL,
    ShiftR,
    BwAnd,
    BwOr,
    BwXor,
    Eq,
    Neq,
    Lt,
    Leq,
    Gt,
    Geq,
    And,
    Or,
}

impl BinOp {
    /// Comparison operators, which produce a bool.
    pub fn is_cmp(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Neq | BinOp::Lt | BinOp::Leq | BinOp::Gt | BinOp::Geq
        )
    }
}

/// A typed expression node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exp {
    pub kind: ExpKind,
    pub ty: Ty,
    pub span: Span,
}

/// Expression payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExpKind {
    /// Literal value.
    Val(Value),
    Var(Name),
    ArrayLit(Vec<Exp>),
    ArrayRead {
        base: Box<Exp>,
        index: Box<Exp>,
        slice: SliceKind,
    },
    StructNew {
        name: String,
        fields: Vec<(String, Exp)>,
    },
    Proj {
        base: Box<Exp>,
        field: String,
    },
    UnOp {
        op: UnOp,
        operand: Box<Exp>,
    },
    BinOp {
        op: BinOp,
        left: Box<Exp>,
        right: Box<Exp>,
    },
    Let {
        name: Name,
        inline: InlineAnn,
        rhs: Box<Exp>,
        body: Box<Exp>,
    },
    /// Mutable-variable binding. A missing initialiser means the variable
    /// starts at its type's implicit default, which requires the type to
    /// be ground.
    LetRef {
        name: Name,
        ty: Ty,
        init: Option<Box<Exp>>,
        body: Box<Exp>,
    },
    Assign {
        lhs: Box<Exp>,
        rhs: Box<Exp>,
    },
    /// In-place array element or slice write. Kept distinct from an
    /// assignment whose left side is an array read; the code generator
    /// lowers the two differently.
    ArrWrite {
        base: Box<Exp>,
        index: Box<Exp>,
        slice: SliceKind,
        rhs: Box<Exp>,
    },
    Seq {
        first: Box<Exp>,
        second: Box<Exp>,
    },
    Cond {
        cond: Box<Exp>,
        then_e: Box<Exp>,
        else_e: Box<Exp>,
    },
    For {
        var: Name,
        unroll: UnrollAnn,
        start: Box<Exp>,
        count: Box<Exp>,
        body: Box<Exp>,
    },
    While {
        cond: Box<Exp>,
        body: Box<Exp>,
    },
    /// Call of an external or user function. Opaque to the evaluator.
    Call {
        func: Name,
        args: Vec<Exp>,
    },
    Print {
        newline: bool,
        args: Vec<Exp>,
    },
    Error {
        msg: String,
    },
    /// Marks a subtree for lookup-table extraction by a later pass.
    Lut(Box<Exp>),
}

impl Exp {
    pub fn new(kind: ExpKind, ty: Ty, span: Span) -> Self {
        Self { kind, ty, span }
    }

    /// Literal node for a value; total and injective up to location.
    pub fn val(v: Value) -> Self {
        let ty = v.ty();
        let span = v.span;
        Self::new(ExpKind::Val(v), ty, span)
    }

    pub fn unit(span: Span) -> Self {
        Self::val(ValueKind::Unit.at(span))
    }

    pub fn int32(v: i32, span: Span) -> Self {
        Self::val(ValueKind::I32(v).at(span))
    }

    pub fn bool_(v: bool, span: Span) -> Self {
        Self::val(ValueKind::Bool(v).at(span))
    }

    pub fn var(name: Name, ty: Ty, span: Span) -> Self {
        Self::new(ExpKind::Var(name), ty, span)
    }

    pub fn unop(op: UnOp, operand: Exp) -> Self {
        let span = operand.span;
        let ty = match &op {
            UnOp::Neg | UnOp::BwNeg | UnOp::Not => operand.ty.clone(),
            UnOp::Cast(t) => t.clone(),
            UnOp::Length => Ty::Int(IntWidth::W32),
        };
        Self::new(
            ExpKind::UnOp {
                op,
                operand: Box::new(operand),
            },
            ty,
            span,
        )
    }

    pub fn binop(op: BinOp, left: Exp, right: Exp) -> Self {
        let span = left.span;
        let ty = if op.is_cmp() || matches!(op, BinOp::And | BinOp::Or) {
            Ty::Bool
        } else {
            left.ty.clone()
        };
        Self::new(
            ExpKind::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty,
            span,
        )
    }

    pub fn seq(first: Exp, second: Exp) -> Self {
        let span = first.span;
        let ty = second.ty.clone();
        Self::new(
            ExpKind::Seq {
                first: Box::new(first),
                second: Box::new(second),
            },
            ty,
            span,
        )
    }

    pub fn cond(cond: Exp, then_e: Exp, else_e: Exp) -> Self {
        let span = cond.span;
        let ty = then_e.ty.clone();
        Self::new(
            ExpKind::Cond {
                cond: Box::new(cond),
                then_e: Box::new(then_e),
                else_e: Box::new(else_e),
            },
            ty,
            span,
        )
    }

    pub fn let_(name: Name, inline: InlineAnn, rhs: Exp, body: Exp) -> Self {
        let span = rhs.span;
        let ty = body.ty.clone();
        Self::new(
            ExpKind::Let {
                name,
                inline,
                rhs: Box::new(rhs),
                body: Box::new(body),
            },
            ty,
            span,
        )
    }

    pub fn letref(name: Name, var_ty: Ty, init: Option<Exp>, body: Exp) -> Self {
        let span = body.span;
        let ty = body.ty.clone();
        Self::new(
            ExpKind::LetRef {
                name,
                ty: var_ty,
                init: init.map(Box::new),
                body: Box::new(body),
            },
            ty,
            span,
        )
    }

    pub fn assign(lhs: Exp, rhs: Exp) -> Self {
        let span = lhs.span;
        Self::new(
            ExpKind::Assign {
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            Ty::Unit,
            span,
        )
    }

    /// Element or slice read; the node type follows the slice kind.
    pub fn arr_read(base: Exp, index: Exp, slice: SliceKind) -> Self {
        let span = base.span;
        let elem = base
            .ty
            .elem_ty()
            .cloned()
            .unwrap_or(Ty::Unit);
        let ty = match &slice {
            SliceKind::Single => elem,
            SliceKind::Len(n) => Ty::Array(ArrayLen::Static(*n), Box::new(elem)),
            SliceKind::Meta(v) => Ty::Array(ArrayLen::Var(v.clone()), Box::new(elem)),
        };
        Self::new(
            ExpKind::ArrayRead {
                base: Box::new(base),
                index: Box::new(index),
                slice,
            },
            ty,
            span,
        )
    }

    pub fn for_(var: Name, unroll: UnrollAnn, start: Exp, count: Exp, body: Exp) -> Self {
        let span = start.span;
        Self::new(
            ExpKind::For {
                var,
                unroll,
                start: Box::new(start),
                count: Box::new(count),
                body: Box::new(body),
            },
            Ty::Unit,
            span,
        )
    }

    /// The literal value of a `Val` node.
    pub fn as_literal(&self) -> Option<&Value> {
        match &self.kind {
            ExpKind::Val(v) => Some(v),
            _ => None,
        }
    }

    /// Whether this is the literal `true`.
    pub fn is_true(&self) -> bool {
        matches!(
            self.as_literal().map(|v| &v.kind),
            Some(ValueKind::Bool(true) | ValueKind::Bit(true))
        )
    }

    /// Whether this is the literal `false`.
    pub fn is_false(&self) -> bool {
        matches!(
            self.as_literal().map(|v| &v.kind),
            Some(ValueKind::Bool(false) | ValueKind::Bit(false))
        )
    }
}
