//! Task splitting over hand-built comp trees.

use aether_ast::{BinOp, Comp, CompKind, CompTy, Exp, ParInfo, ReadPolicy};
use aether_foundation::{IntWidth, Name, Span, Ty};
use aether_tasks::{Placement, SplitError, TaskTable, insert_tasks, insert_tasks_folded};

fn sp() -> Span {
    Span::unknown()
}

fn i32t() -> Ty {
    Ty::Int(IntWidth::W32)
}

fn ret(v: i32) -> Comp {
    Comp::return_(Exp::int32(v, sp()))
}

fn transformer(kind: CompKind, inp: Ty, out: Ty) -> Comp {
    Comp::new(kind, CompTy::transformer(inp, out), sp())
}

fn count_activations(c: &Comp) -> usize {
    match &c.kind {
        CompKind::ActivateTask { .. } => 1,
        CompKind::Seq { first, second } => count_activations(first) + count_activations(second),
        CompKind::BindMany { head, binds } => {
            count_activations(head)
                + binds.iter().map(|(_, b)| count_activations(b)).sum::<usize>()
        }
        CompKind::Branch { then_c, else_c, .. } => {
            count_activations(then_c) + count_activations(else_c)
        }
        CompKind::LetE { body, .. }
        | CompKind::LetERef { body, .. }
        | CompKind::LetFunE { body, .. }
        | CompKind::LetFunC { body, .. }
        | CompKind::LetStruct { body, .. } => count_activations(body),
        _ => 0,
    }
}

fn assert_no_standalone(c: &Comp) {
    fn walk(c: &Comp) {
        match &c.kind {
            CompKind::Standalone(_) => panic!("standalone survived splitting: {c}"),
            CompKind::Seq { first, second } => {
                walk(first);
                walk(second);
            }
            CompKind::Par { left, right, .. } => {
                walk(left);
                walk(right);
            }
            CompKind::BindMany { head, binds } => {
                walk(head);
                binds.iter().for_each(|(_, b)| walk(b));
            }
            CompKind::Branch { then_c, else_c, .. } => {
                walk(then_c);
                walk(else_c);
            }
            _ => {}
        }
    }
    walk(c)
}

fn all_bodies_clean(table: &TaskTable, entry: &Comp) {
    assert_no_standalone(entry);
    for (_, info) in table.iter() {
        assert_no_standalone(&info.body);
    }
}

/// A comp without barriers produces no tasks at all.
#[test]
fn no_barrier_no_tasks() {
    let c = Comp::seq(ret(1), ret(2));
    let (table, entry) = insert_tasks(c.clone()).unwrap();
    assert!(table.is_empty());
    assert_eq!(entry, c);
}

/// Nested standalones collapse to the innermost.
#[test]
fn standalone_collapse() {
    let once = insert_tasks(Comp::standalone(ret(1))).unwrap();
    let twice = insert_tasks(Comp::standalone(Comp::standalone(ret(1)))).unwrap();

    assert_eq!(once.0.len(), 1);
    assert_eq!(twice.0.len(), 1);
    assert_eq!(once.1, twice.1);
    let (id_once, info_once) = once.0.iter().next().unwrap();
    let (id_twice, info_twice) = twice.0.iter().next().unwrap();
    assert_eq!(id_once, id_twice);
    assert_eq!(info_once.body, info_twice.body);
    assert_eq!(info_once.placement, Placement::Alone);
}

/// Barriers in bind-head position: one task per barrier plus the final
/// chunk, one activation stub per task, chained right to left.
#[test]
fn bind_head_barrier() {
    let x = Name::new("x", 1);
    let c = Comp::bind_many(Comp::standalone(ret(1)), vec![(x.clone(), ret(2))]);
    let (table, entry) = insert_tasks(c).unwrap();

    // barriers + 1 tasks in the table.
    assert_eq!(table.len(), 2);
    all_bodies_clean(&table, &entry);

    // The entry is the activation of the head's task.
    let CompKind::ActivateTask { task: head_id, .. } = entry.kind else {
        panic!("expected activation entry, got {entry}");
    };
    let head = table.get(head_id).unwrap();
    assert_eq!(head.placement, Placement::Alone);

    // The head's body ends by activating the rest with the bound
    // variable as its input.
    let CompKind::Seq { second, .. } = &head.body.kind else {
        panic!("expected head body with continuation, got {}", head.body);
    };
    let CompKind::ActivateTask { task: rest_id, input } = &second.kind else {
        panic!("expected continuation stub, got {second}");
    };
    assert_eq!(input.as_ref(), Some(&x));
    assert_eq!(table.get(*rest_id).unwrap().placement, Placement::Unspecified);
}

/// A chain of bind-head barriers yields exactly one activation per task.
#[test]
fn bind_chain_counts() {
    let x1 = Name::new("x1", 1);
    let x2 = Name::new("x2", 2);
    let c = Comp::bind_many(
        Comp::standalone(ret(1)),
        vec![
            (x1, Comp::standalone(ret(2))),
            (x2, ret(3)),
        ],
    );
    let (table, entry) = insert_tasks(c).unwrap();

    // 2 barriers -> 3 table entries.
    assert_eq!(table.len(), 3);
    assert_eq!(count_activations(&entry), 1);
    let total: usize = table
        .iter()
        .map(|(_, info)| count_activations(&info.body))
        .sum::<usize>()
        + count_activations(&entry);
    assert_eq!(total, table.len());
    all_bodies_clean(&table, &entry);
}

/// `read >>> standalone(cca) >>> decode >>> write`: four tasks, three
/// seam queues, adjacent endpoints shared, and an entry activating every
/// stage in order.
#[test]
fn pipeline_split() {
    let read = transformer(CompKind::ReadSrc(i32t()), Ty::Unit, i32t());
    let cca = Comp::standalone(transformer(
        CompKind::Map {
            ann: None,
            func: Name::new("cca", 1),
        },
        i32t(),
        i32t(),
    ));
    let decode = transformer(
        CompKind::Map {
            ann: None,
            func: Name::new("viterbi_decode", 2),
        },
        i32t(),
        i32t(),
    );
    let write = transformer(CompKind::WriteSnk(i32t()), i32t(), Ty::Unit);

    let c = Comp::par(
        ParInfo::default(),
        Comp::par(
            ParInfo::default(),
            Comp::par(ParInfo::default(), read, cca),
            decode,
        ),
        write,
    );
    let (table, entry) = insert_tasks(c).unwrap();

    assert_eq!(table.len(), 4);
    assert_eq!(table.seam_queue_count(), 3);
    all_bodies_clean(&table, &entry);

    // The entry activates all four stages in pipeline order.
    let mut ids = Vec::new();
    let mut cur = &entry;
    loop {
        match &cur.kind {
            CompKind::Seq { first, second } => {
                let CompKind::ActivateTask { task, .. } = first.kind else {
                    panic!("expected activation, got {first}");
                };
                ids.push(task);
                cur = second;
            }
            CompKind::ActivateTask { task, .. } => {
                ids.push(*task);
                break;
            }
            other => panic!("unexpected entry node {other:?}"),
        }
    }
    assert_eq!(ids.len(), 4);

    // Adjacent stages share a queue endpoint.
    for pair in ids.windows(2) {
        let up = table.get(pair[0]).unwrap();
        let down = table.get(pair[1]).unwrap();
        assert_eq!(up.output_queue, down.input_queue);
    }

    // The standalone stage is placed alone; the rest are unconstrained.
    let placements: Vec<Placement> =
        ids.iter().map(|id| table.get(*id).unwrap().placement).collect();
    assert_eq!(
        placements,
        vec![
            Placement::Unspecified,
            Placement::Alone,
            Placement::Unspecified,
            Placement::Unspecified,
        ]
    );

    // Standalone tasks spin on an empty queue; main-line tasks yield.
    fn read_policy(c: &Comp) -> Option<ReadPolicy> {
        match &c.kind {
            CompKind::ReadInternal { policy, .. } => Some(*policy),
            CompKind::Par { left, right, .. } => {
                read_policy(left).or_else(|| read_policy(right))
            }
            _ => None,
        }
    }
    assert_eq!(
        read_policy(&table.get(ids[1]).unwrap().body),
        Some(ReadPolicy::SpinOnEmpty)
    );
    assert_eq!(
        read_policy(&table.get(ids[2]).unwrap().body),
        Some(ReadPolicy::JumpToConsumeOnEmpty)
    );
}

/// Sequential fragments split at barrier boundaries, chained through
/// activations.
#[test]
fn seq_fragments() {
    let c = Comp::seq(ret(1), Comp::seq(Comp::standalone(ret(2)), ret(3)));
    let (table, entry) = insert_tasks(c).unwrap();

    assert_eq!(table.len(), 2);
    all_bodies_clean(&table, &entry);
    // Entry: run the first fragment, then hand off to the barrier task.
    let CompKind::Seq { first, second } = &entry.kind else {
        panic!("expected seq entry, got {entry}");
    };
    assert!(matches!(first.kind, CompKind::Return(_)));
    let CompKind::ActivateTask { task, .. } = second.kind else {
        panic!("expected activation, got {second}");
    };
    assert_eq!(table.get(task).unwrap().placement, Placement::Alone);
}

/// Both branch arms become their own tasks behind activation stubs.
#[test]
fn branch_arms_taskified() {
    let cond = Exp::var(Name::new("busy", 1), Ty::Bool, sp());
    let c = Comp::new(
        CompKind::Branch {
            cond,
            then_c: Box::new(Comp::standalone(ret(1))),
            else_c: Box::new(ret(2)),
        },
        CompTy::computer(Ty::Unit, Ty::Unit, i32t()),
        sp(),
    );
    let (table, entry) = insert_tasks(c).unwrap();
    assert_eq!(table.len(), 2);
    let CompKind::Branch { then_c, else_c, .. } = &entry.kind else {
        panic!("expected branch entry, got {entry}");
    };
    assert!(matches!(then_c.kind, CompKind::ActivateTask { .. }));
    assert!(matches!(else_c.kind, CompKind::ActivateTask { .. }));
}

/// Calling a function whose body contains a barrier is itself a barrier.
#[test]
fn barrier_function_call() {
    let f = Name::new("sync_cca", 1);
    let call = Comp::new(
        CompKind::Call {
            func: f.clone(),
            args: vec![],
        },
        CompTy::computer(Ty::Unit, Ty::Unit, Ty::Unit),
        sp(),
    );
    let c = Comp::new(
        CompKind::LetFunC {
            name: f,
            params: vec![],
            fun_body: Box::new(Comp::standalone(ret(1))),
            body: Box::new(call),
        },
        CompTy::computer(Ty::Unit, Ty::Unit, Ty::Unit),
        sp(),
    );
    let (table, entry) = insert_tasks(c).unwrap();
    assert_eq!(table.len(), 1);
    let (_, info) = table.iter().next().unwrap();
    assert_eq!(info.placement, Placement::Shared);
    // The function binding is lifted onto the entry.
    let CompKind::LetFunC { body, .. } = &entry.kind else {
        panic!("expected lifted binding, got {entry}");
    };
    assert!(matches!(body.kind, CompKind::ActivateTask { .. }));
}

/// Barriers inside loop constructs are rejected.
#[test]
fn barrier_in_loop_rejected() {
    let c = Comp::new(
        CompKind::Repeat {
            ann: None,
            body: Box::new(Comp::standalone(ret(1))),
        },
        CompTy::transformer(Ty::Unit, Ty::Unit),
        sp(),
    );
    match insert_tasks(c) {
        Err(SplitError::BarrierInLoop { construct, .. }) => assert_eq!(construct, "repeat"),
        other => panic!("expected barrier-in-loop error, got {other:?}"),
    }

    let c = Comp::new(
        CompKind::Until {
            cond: Exp::bool_(false, sp()),
            body: Box::new(Comp::standalone(ret(1))),
        },
        CompTy::computer(Ty::Unit, Ty::Unit, Ty::Unit),
        sp(),
    );
    assert!(matches!(
        insert_tasks(c),
        Err(SplitError::BarrierInLoop { construct: "until", .. })
    ));
}

/// Pre-split folding removes statically dead arms, so their barriers
/// never become tasks.
#[test]
fn folded_split_drops_dead_arm() {
    let cond = Exp::binop(BinOp::Eq, Exp::int32(1, sp()), Exp::int32(1, sp()));
    let c = Comp::new(
        CompKind::Branch {
            cond,
            then_c: Box::new(ret(1)),
            else_c: Box::new(Comp::standalone(ret(2))),
        },
        CompTy::computer(Ty::Unit, Ty::Unit, i32t()),
        sp(),
    );
    let (table, entry) = insert_tasks_folded(c).unwrap();
    assert!(table.is_empty());
    assert!(matches!(entry.kind, CompKind::Return(_)));
}
