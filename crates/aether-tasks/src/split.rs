//! Cutting a comp tree into tasks at barrier points.
//!
//! [`insert_tasks`] walks the comp right-to-left, registers a task for
//! every barrier (a `Standalone` node, or a call to a function whose body
//! contains one), threads synchronization queues between pipeline
//! stages, and replaces each cut with an `ActivateTask` stub. The
//! returned comp is the entry task and is not itself a table entry.
//!
//! `split` returns the comp that runs in the *current* task context;
//! anything that must run elsewhere has already been registered and is
//! represented by its activation stub. Sequential and bind scoping is
//! preserved by making each cut task's body end with the activation of
//! whatever follows it.

use std::collections::HashSet;

use tracing::debug;

use aether_ast::{
    CallArg, Comp, CompKind, CompTy, ParInfo, ReadPolicy,
};
use aether_eval::fold_comp;
use aether_foundation::{Name, QueueId, Span, Ty};

use crate::error::{Result, SplitError};
use crate::table::{EXTERNAL_IN, EXTERNAL_OUT, Placement, TaskTable};

/// Split `c` at its barriers. Returns the task table and the entry comp.
pub fn insert_tasks(c: Comp) -> Result<(TaskTable, Comp)> {
    let mut task_gen = TaskGen::default();
    let entry = task_gen.split(c, None, (EXTERNAL_IN, EXTERNAL_OUT))?;
    debug!(
        tasks = task_gen.table.len(),
        seam_queues = task_gen.table.seam_queue_count(),
        "task split complete"
    );
    Ok((task_gen.table, entry))
}

/// Constant-fold expression positions, then split. Statically decided
/// branches and loop bounds disappear before any task is cut.
pub fn insert_tasks_folded(c: Comp) -> Result<(TaskTable, Comp)> {
    insert_tasks(fold_comp(&c))
}

#[derive(Default)]
struct TaskGen {
    table: TaskTable,
    /// Comp functions whose bodies contain a barrier; calling or mapping
    /// one is itself a barrier.
    barrier_funs: HashSet<Name>,
}

impl TaskGen {
    fn has_barrier(&self, c: &Comp) -> bool {
        let mut funs = self.barrier_funs.clone();
        comp_has_barrier(c, &mut funs)
    }

    /// Register `body` as a task unless it already is a bare activation
    /// stub; either way, return the stub (with `input` attached when the
    /// stub does not carry one yet).
    fn stub_or_register(
        &mut self,
        ctx: Comp,
        input: Option<Name>,
        queues: (QueueId, QueueId),
    ) -> Comp {
        match ctx.kind {
            CompKind::ActivateTask {
                task,
                input: existing,
            } => Comp::activate(task, input.or(existing), ctx.span),
            _ => {
                let span = ctx.span;
                let id = self
                    .table
                    .insert(ctx, queues.0, queues.1, Placement::Unspecified);
                Comp::activate(id, input, span)
            }
        }
    }

    /// Return the comp to run in the current task context, registering
    /// tasks for everything behind a barrier.
    fn split(
        &mut self,
        c: Comp,
        cont: Option<Comp>,
        queues: (QueueId, QueueId),
    ) -> Result<Comp> {
        if !self.has_barrier(&c) {
            return Ok(append_cont(c, cont));
        }

        let span = c.span;
        let ty = c.ty.clone();
        match c.kind {
            CompKind::Standalone(inner) => {
                // Nested standalones collapse; only the innermost cuts.
                if self.has_barrier(&inner) {
                    return self.split(*inner, cont, queues);
                }
                let body = append_cont(*inner, cont);
                let id = self.table.insert(body, queues.0, queues.1, Placement::Alone);
                Ok(Comp::activate(id, None, span))
            }

            CompKind::BindMany { head, binds } => self.split_bind(*head, binds, cont, queues),

            CompKind::Seq { .. } => {
                let mut frags = Vec::new();
                flatten_seq(Comp::new(c.kind, ty, span), &mut frags);
                self.split_seq(frags, cont, queues)
            }

            CompKind::Par { .. } => self.split_par(Comp::new(c.kind, ty, span), cont, queues),

            CompKind::Branch {
                cond,
                then_c,
                else_c,
            } => {
                let then_ctx = self.split(*then_c, cont.clone(), queues)?;
                let then_stub = self.stub_or_register(then_ctx, None, queues);
                let else_ctx = self.split(*else_c, cont, queues)?;
                let else_stub = self.stub_or_register(else_ctx, None, queues);
                Ok(Comp::new(
                    CompKind::Branch {
                        cond,
                        then_c: Box::new(then_stub),
                        else_c: Box::new(else_stub),
                    },
                    ty,
                    span,
                ))
            }

            // Bindings are carried at the top of the split body so the
            // code generator can place them as file-scope declarations.
            CompKind::LetE {
                name,
                inline,
                rhs,
                body,
            } => {
                let inner = self.split(*body, cont, queues)?;
                Ok(Comp::new(
                    CompKind::LetE {
                        name,
                        inline,
                        rhs,
                        body: Box::new(inner),
                    },
                    ty,
                    span,
                ))
            }
            CompKind::LetERef { name, init, body } => {
                let inner = self.split(*body, cont, queues)?;
                Ok(Comp::new(
                    CompKind::LetERef {
                        name,
                        init,
                        body: Box::new(inner),
                    },
                    ty,
                    span,
                ))
            }
            CompKind::LetFunE {
                name,
                params,
                fun_body,
                body,
            } => {
                let inner = self.split(*body, cont, queues)?;
                Ok(Comp::new(
                    CompKind::LetFunE {
                        name,
                        params,
                        fun_body,
                        body: Box::new(inner),
                    },
                    ty,
                    span,
                ))
            }
            CompKind::LetFunC {
                name,
                params,
                fun_body,
                body,
            } => {
                let mut funs = self.barrier_funs.clone();
                if comp_has_barrier(&fun_body, &mut funs) {
                    self.barrier_funs.insert(name.clone());
                }
                let inner = self.split(*body, cont, queues)?;
                Ok(Comp::new(
                    CompKind::LetFunC {
                        name,
                        params,
                        fun_body,
                        body: Box::new(inner),
                    },
                    ty,
                    span,
                ))
            }
            CompKind::LetStruct { def, body } => {
                let inner = self.split(*body, cont, queues)?;
                Ok(Comp::new(
                    CompKind::LetStruct {
                        def,
                        body: Box::new(inner),
                    },
                    ty,
                    span,
                ))
            }
            CompKind::VectComp { ann, body } => {
                let inner = self.split(*body, cont, queues)?;
                Ok(Comp::new(
                    CompKind::VectComp {
                        ann,
                        body: Box::new(inner),
                    },
                    ty,
                    span,
                ))
            }

            // A call of (or map over) a barrier function is itself a
            // barrier; the callee is not split.
            kind @ (CompKind::Call { .. } | CompKind::Map { .. }) => {
                let body = append_cont(Comp::new(kind, ty, span), cont);
                let id = self
                    .table
                    .insert(body, queues.0, queues.1, Placement::Shared);
                Ok(Comp::activate(id, None, span))
            }

            // Splitting a loop needs a scheduler-friendly driver for the
            // loop header, which requires cardinality analysis we do not
            // have.
            CompKind::Until { .. } => Err(SplitError::BarrierInLoop {
                construct: "until",
                span,
            }),
            CompKind::While { .. } => Err(SplitError::BarrierInLoop {
                construct: "while",
                span,
            }),
            CompKind::Times { .. } => Err(SplitError::BarrierInLoop {
                construct: "times",
                span,
            }),
            CompKind::Repeat { .. } => Err(SplitError::BarrierInLoop {
                construct: "repeat",
                span,
            }),

            // Remaining nodes have no comp children and cannot contain a
            // barrier.
            kind => Ok(append_cont(Comp::new(kind, ty, span), cont)),
        }
    }

    /// Monadic bind with a barrier somewhere inside.
    fn split_bind(
        &mut self,
        head: Comp,
        mut binds: Vec<(Name, Comp)>,
        cont: Option<Comp>,
        queues: (QueueId, QueueId),
    ) -> Result<Comp> {
        if self.has_barrier(&head) {
            // The rest of the bind chain becomes a task activated from
            // the head's task with the bound variable as its input.
            let (x1, c1) = binds.remove(0);
            let rest = Comp::bind_many(c1, binds);
            let rest_ctx = self.split(rest, cont, queues)?;
            let rest_stub = self.stub_or_register(rest_ctx, Some(x1), queues);
            return self.split(head, Some(rest_stub), queues);
        }

        let barrier_at = binds
            .iter()
            .position(|(_, b)| self.has_barrier(b))
            .expect("split_bind called with a barrier present");
        let tail = binds.split_off(barrier_at + 1);
        let (x_barrier, barrier) = binds.pop().expect("barrier element present");

        let barrier_cont = if tail.is_empty() {
            cont
        } else {
            let mut tail = tail.into_iter();
            let (x_next, c_next) = tail.next().expect("tail checked non-empty");
            let rem = Comp::bind_many(c_next, tail.collect());
            let rem_ctx = self.split(rem, cont, queues)?;
            Some(self.stub_or_register(rem_ctx, Some(x_next), queues))
        };

        let stub = self.split(barrier, barrier_cont, queues)?;
        let stub = attach_input(stub, &x_barrier);
        binds.push((x_barrier, stub));
        Ok(Comp::bind_many(head, binds))
    }

    /// Sequential composition: contiguous barrier-free runs form one
    /// chunk, each barrier fragment its own; fold right so every chunk
    /// ends with the activation of the next.
    fn split_seq(
        &mut self,
        frags: Vec<Comp>,
        cont: Option<Comp>,
        queues: (QueueId, QueueId),
    ) -> Result<Comp> {
        let mut chunks: Vec<(bool, Comp)> = Vec::new();
        for frag in frags {
            let barrier = self.has_barrier(&frag);
            match chunks.last_mut() {
                Some((false, chunk)) if !barrier => {
                    let merged = Comp::seq(chunk.clone(), frag);
                    *chunk = merged;
                }
                _ => chunks.push((barrier, frag)),
            }
        }

        let mut cur = cont;
        let first = chunks.remove(0).1;
        for (_, chunk) in chunks.into_iter().rev() {
            let ctx = self.split(chunk, cur.take(), queues)?;
            cur = Some(self.stub_or_register(ctx, None, queues));
        }
        self.split(first, cur, queues)
    }

    /// Pipeline composition: one task per stage, a fresh queue per seam,
    /// and an entry body that activates every stage in order. Stages run
    /// on separate tasks even without an explicit standalone.
    fn split_par(
        &mut self,
        c: Comp,
        cont: Option<Comp>,
        queues: (QueueId, QueueId),
    ) -> Result<Comp> {
        let span = c.span;
        let mut stages = Vec::new();
        flatten_par(c, &mut stages);

        let mut qs = Vec::with_capacity(stages.len() + 1);
        qs.push(queues.0);
        for _ in 1..stages.len() {
            qs.push(self.table.fresh_queue());
        }
        qs.push(queues.1);

        let stage_count = stages.len();
        let mut activations: Vec<Comp> = Vec::with_capacity(stage_count);
        for (i, stage) in stages.into_iter().enumerate() {
            let stage_queues = (qs[i], qs[i + 1]);
            let ctx = self.split(stage, None, stage_queues)?;
            let id = match ctx.kind {
                CompKind::ActivateTask { task, input: None } => task,
                _ => {
                    self.table
                        .insert(ctx, stage_queues.0, stage_queues.1, Placement::Unspecified)
                }
            };

            // Compose the queue endpoints into the stage body at fresh
            // seams. Standalone stages own a worker and may spin on an
            // empty queue; everything else yields to the scheduler so
            // the main thread cannot deadlock on a producer that has not
            // run yet.
            let info = self.table.get(id).expect("stage registered");
            let policy = match info.placement {
                Placement::Alone => ReadPolicy::SpinOnEmpty,
                _ => ReadPolicy::JumpToConsumeOnEmpty,
            };
            let inp = info.body.ty.inp.clone();
            let out = info.body.ty.out.clone();
            let mut body = self.table.get_mut(id).expect("stage registered").body.clone();
            if i > 0 {
                body = Comp::par(ParInfo::default(), read_internal(qs[i], policy, inp, span), body);
            }
            if i + 1 < stage_count {
                body = Comp::par(ParInfo::default(), body, write_internal(qs[i + 1], out, span));
            }
            self.table.get_mut(id).expect("stage registered").body = body;

            activations.push(Comp::activate(id, None, span));
        }

        let mut entry = activations
            .into_iter()
            .rev()
            .reduce(|second, first| Comp::seq(first, second))
            .expect("pipeline has at least one stage");
        if let Some(cont) = cont {
            entry = Comp::seq(entry, cont);
        }
        Ok(entry)
    }
}

/// Append a continuation to a comp that finishes: `c ; next`. A
/// transformer never finishes, so its continuation is unreachable and is
/// dropped.
fn append_cont(c: Comp, cont: Option<Comp>) -> Comp {
    match cont {
        Some(next) if c.is_computer() => Comp::seq(c, next),
        _ => c,
    }
}

/// Give a bare activation stub its task-input variable.
fn attach_input(stub: Comp, input: &Name) -> Comp {
    match stub.kind {
        CompKind::ActivateTask { task, input: None } => {
            Comp::activate(task, Some(input.clone()), stub.span)
        }
        _ => stub,
    }
}

fn flatten_seq(c: Comp, out: &mut Vec<Comp>) {
    match c.kind {
        CompKind::Seq { first, second } => {
            flatten_seq(*first, out);
            flatten_seq(*second, out);
        }
        kind => out.push(Comp::new(kind, c.ty, c.span)),
    }
}

fn flatten_par(c: Comp, out: &mut Vec<Comp>) {
    match c.kind {
        CompKind::Par { left, right, .. } => {
            flatten_par(*left, out);
            flatten_par(*right, out);
        }
        kind => out.push(Comp::new(kind, c.ty, c.span)),
    }
}

fn read_internal(queue: QueueId, policy: ReadPolicy, elem: Ty, span: Span) -> Comp {
    Comp::new(
        CompKind::ReadInternal { queue, policy },
        CompTy::transformer(Ty::Unit, elem),
        span,
    )
}

fn write_internal(queue: QueueId, elem: Ty, span: Span) -> Comp {
    Comp::new(
        CompKind::WriteInternal { queue },
        CompTy::transformer(elem, Ty::Unit),
        span,
    )
}

fn comp_has_barrier(c: &Comp, funs: &mut HashSet<Name>) -> bool {
    match &c.kind {
        CompKind::Standalone(_) => true,
        CompKind::Call { func, args } => {
            funs.contains(func)
                || args.iter().any(|a| match a {
                    CallArg::Comp(b) => comp_has_barrier(b, funs),
                    CallArg::Exp(_) => false,
                })
        }
        CompKind::Map { func, .. } => funs.contains(func),
        CompKind::Filter { func } => funs.contains(func),
        CompKind::LetFunC {
            name,
            fun_body,
            body,
            ..
        } => {
            if comp_has_barrier(fun_body, funs) {
                funs.insert(name.clone());
            }
            comp_has_barrier(body, funs)
        }
        CompKind::BindMany { head, binds } => {
            comp_has_barrier(head, funs) || binds.iter().any(|(_, b)| comp_has_barrier(b, funs))
        }
        CompKind::Seq { first, second } => {
            comp_has_barrier(first, funs) || comp_has_barrier(second, funs)
        }
        CompKind::Par { left, right, .. } => {
            comp_has_barrier(left, funs) || comp_has_barrier(right, funs)
        }
        CompKind::Branch {
            then_c, else_c, ..
        } => comp_has_barrier(then_c, funs) || comp_has_barrier(else_c, funs),
        CompKind::LetE { body, .. }
        | CompKind::LetERef { body, .. }
        | CompKind::LetFunE { body, .. }
        | CompKind::LetStruct { body, .. }
        | CompKind::Until { body, .. }
        | CompKind::While { body, .. }
        | CompKind::Times { body, .. }
        | CompKind::Repeat { body, .. }
        | CompKind::VectComp { body, .. } => comp_has_barrier(body, funs),
        CompKind::Var(_)
        | CompKind::Emit(_)
        | CompKind::Emits(_)
        | CompKind::Return(_)
        | CompKind::Take
        | CompKind::Takes(_)
        | CompKind::ReadSrc(_)
        | CompKind::WriteSnk(_)
        | CompKind::ReadInternal { .. }
        | CompKind::WriteInternal { .. }
        | CompKind::Mitigate { .. }
        | CompKind::ActivateTask { .. } => false,
    }
}
