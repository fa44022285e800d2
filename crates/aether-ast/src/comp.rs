//! The stream-computation language.
//!
//! A comp either *computes* (finishes with a value of its `done` type) or
//! *transforms* (pumps its input stream forever). `Par` composes stages
//! into a pipeline, `BindMany` sequences computers monadically, and
//! `Standalone` marks the barriers the task splitter cuts at.

use serde::{Deserialize, Serialize};

use aether_foundation::{Name, QueueId, Span, StructDef, TaskId, Ty};

use crate::expr::{Exp, InlineAnn, UnrollAnn};

/// Stream type of a comp: input and output element types, plus the result
/// type when the comp is a computer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompTy {
    pub inp: Ty,
    pub out: Ty,
    pub done: Option<Ty>,
}

impl CompTy {
    pub fn computer(inp: Ty, out: Ty, done: Ty) -> Self {
        Self {
            inp,
            out,
            done: Some(done),
        }
    }

    pub fn transformer(inp: Ty, out: Ty) -> Self {
        Self {
            inp,
            out,
            done: None,
        }
    }

    pub fn is_computer(&self) -> bool {
        self.done.is_some()
    }
}

/// Pipelining request carried on a `Par` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineMode {
    Always,
    Never,
    Maybe,
}

/// Pipelining hint plus optional burst sizes for the two sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParInfo {
    pub mode: PipelineMode,
    pub in_burst: Option<usize>,
    pub out_burst: Option<usize>,
}

impl Default for ParInfo {
    fn default() -> Self {
        Self {
            mode: PipelineMode::Maybe,
            in_burst: None,
            out_burst: None,
        }
    }
}

/// Behaviour of an inter-task queue read when the queue is empty.
///
/// The main entry task must not spin on a queue fed by a standalone task
/// that has not yet been scheduled; it yields back to the scheduler
/// instead. Auxiliary standalone tasks own a worker and may spin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadPolicy {
    SpinOnEmpty,
    JumpToConsumeOnEmpty,
}

/// Argument of a comp-function call: scalar expression or comp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CallArg {
    Exp(Exp),
    Comp(Comp),
}

/// A typed stream computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comp {
    pub kind: CompKind,
    pub ty: CompTy,
    pub span: Span,
}

/// Computation payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CompKind {
    Var(Name),
    /// Monadic bind chain: run `head`, bind its result to the first name,
    /// continue. Normalised so that `binds` is never empty and `head` is
    /// never itself a `BindMany`.
    BindMany {
        head: Box<Comp>,
        binds: Vec<(Name, Comp)>,
    },
    Seq {
        first: Box<Comp>,
        second: Box<Comp>,
    },
    /// Pipeline composition; the output element type of `left` equals the
    /// input element type of `right`.
    Par {
        info: ParInfo,
        left: Box<Comp>,
        right: Box<Comp>,
    },
    LetE {
        name: Name,
        inline: InlineAnn,
        rhs: Exp,
        body: Box<Comp>,
    },
    LetERef {
        name: Name,
        init: Option<Exp>,
        body: Box<Comp>,
    },
    LetFunE {
        name: Name,
        params: Vec<(Name, Ty)>,
        fun_body: Exp,
        body: Box<Comp>,
    },
    LetFunC {
        name: Name,
        params: Vec<(Name, Ty)>,
        fun_body: Box<Comp>,
        body: Box<Comp>,
    },
    LetStruct {
        def: StructDef,
        body: Box<Comp>,
    },
    Call {
        func: Name,
        args: Vec<CallArg>,
    },
    Emit(Exp),
    Emits(Exp),
    Return(Exp),
    Take,
    Takes(usize),
    Branch {
        cond: Exp,
        then_c: Box<Comp>,
        else_c: Box<Comp>,
    },
    Until {
        cond: Exp,
        body: Box<Comp>,
    },
    While {
        cond: Exp,
        body: Box<Comp>,
    },
    Times {
        unroll: UnrollAnn,
        start: Exp,
        count: Exp,
        var: Name,
        body: Box<Comp>,
    },
    /// Lift a computer to a transformer by re-running it forever.
    Repeat {
        ann: Option<(usize, usize)>,
        body: Box<Comp>,
    },
    VectComp {
        ann: (usize, usize),
        body: Box<Comp>,
    },
    Map {
        ann: Option<(usize, usize)>,
        func: Name,
    },
    Filter {
        func: Name,
    },
    ReadSrc(Ty),
    WriteSnk(Ty),
    ReadInternal {
        queue: QueueId,
        policy: ReadPolicy,
    },
    WriteInternal {
        queue: QueueId,
    },
    /// Barrier marker: the task splitter cuts here. Nested standalones
    /// collapse; only the innermost one defines the barrier.
    Standalone(Box<Comp>),
    /// Rate matcher between `arr[from] elem` and `arr[to] elem` streams;
    /// one of the two sizes divides the other.
    Mitigate {
        elem: Ty,
        from: usize,
        to: usize,
    },
    /// Scheduler stub emitted by the task splitter: start the given task,
    /// optionally handing it the value bound to `input`.
    ActivateTask {
        task: TaskId,
        input: Option<Name>,
    },
}

impl Comp {
    pub fn new(kind: CompKind, ty: CompTy, span: Span) -> Self {
        Self { kind, ty, span }
    }

    pub fn is_computer(&self) -> bool {
        self.ty.is_computer()
    }

    /// Monadic bind chain, maintaining both `BindMany` invariants: an
    /// empty bind list collapses to the head, and a `BindMany` head is
    /// flattened into the list.
    pub fn bind_many(head: Comp, binds: Vec<(Name, Comp)>) -> Comp {
        if binds.is_empty() {
            return head;
        }
        if let CompKind::BindMany {
            head: inner_head,
            binds: mut inner_binds,
        } = head.kind
        {
            inner_binds.extend(binds);
            return Comp::bind_many(*inner_head, inner_binds);
        }
        let span = head.span;
        let last = &binds.last().expect("binds checked non-empty").1;
        let ty = CompTy {
            inp: head.ty.inp.clone(),
            out: head.ty.out.clone(),
            done: last.ty.done.clone(),
        };
        Comp::new(
            CompKind::BindMany {
                head: Box::new(head),
                binds,
            },
            ty,
            span,
        )
    }

    pub fn seq(first: Comp, second: Comp) -> Comp {
        let span = first.span;
        let ty = CompTy {
            inp: first.ty.inp.clone(),
            out: first.ty.out.clone(),
            done: second.ty.done.clone(),
        };
        Comp::new(
            CompKind::Seq {
                first: Box::new(first),
                second: Box::new(second),
            },
            ty,
            span,
        )
    }

    pub fn par(info: ParInfo, left: Comp, right: Comp) -> Comp {
        let span = left.span;
        let done = left.ty.done.clone().or_else(|| right.ty.done.clone());
        let ty = CompTy {
            inp: left.ty.inp.clone(),
            out: right.ty.out.clone(),
            done,
        };
        Comp::new(
            CompKind::Par {
                info,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty,
            span,
        )
    }

    pub fn standalone(body: Comp) -> Comp {
        let ty = body.ty.clone();
        let span = body.span;
        Comp::new(CompKind::Standalone(Box::new(body)), ty, span)
    }

    pub fn return_(e: Exp) -> Comp {
        let span = e.span;
        let ty = CompTy::computer(Ty::Unit, Ty::Unit, e.ty.clone());
        Comp::new(CompKind::Return(e), ty, span)
    }

    /// Activation stub; a computer that finishes with unit once the task
    /// has been handed to the scheduler.
    pub fn activate(task: TaskId, input: Option<Name>, span: Span) -> Comp {
        Comp::new(
            CompKind::ActivateTask { task, input },
            CompTy::computer(Ty::Unit, Ty::Unit, Ty::Unit),
            span,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aether_foundation::ValueKind;

    fn ret(v: i32) -> Comp {
        Comp::return_(Exp::val(ValueKind::I32(v).at(Span::unknown())))
    }

    #[test]
    fn bind_many_collapses_empty() {
        let c = Comp::bind_many(ret(1), vec![]);
        assert!(matches!(c.kind, CompKind::Return(_)));
    }

    #[test]
    fn bind_many_flattens_nested_head() {
        let x = Name::new("x", 1);
        let y = Name::new("y", 2);
        let inner = Comp::bind_many(ret(1), vec![(x.clone(), ret(2))]);
        let outer = Comp::bind_many(inner, vec![(y.clone(), ret(3))]);
        match outer.kind {
            CompKind::BindMany { head, binds } => {
                assert!(matches!(head.kind, CompKind::Return(_)));
                assert_eq!(binds.len(), 2);
                assert_eq!(binds[0].0, x);
                assert_eq!(binds[1].0, y);
            }
            other => panic!("expected BindMany, got {other:?}"),
        }
    }
}
