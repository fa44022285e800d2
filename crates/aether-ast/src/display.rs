//! Compact single-line rendering of expressions and computations.
//!
//! Used by diagnostics ("type mismatch in operator application: …") and by
//! the evaluator's guess stores, which key assumptions on the rendered
//! form of an expression. [`Exp::key`] qualifies every name with its
//! unique id so distinct bindings with the same surface text never share
//! a key; `Display` leaves the ids out.

use std::fmt;

use aether_foundation::Name;

use crate::comp::{CallArg, Comp, CompKind, ReadPolicy};
use crate::expr::{BinOp, Exp, ExpKind, SliceKind, UnOp};

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tok = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Expon => "**",
            BinOp::ShiftL => "<<",
            BinOp::ShiftR => ">>",
            BinOp::BwAnd => "&",
            BinOp::BwOr => "|",
            BinOp::BwXor => "^",
            BinOp::Eq => "==",
            BinOp::Neq => "!=",
            BinOp::Lt => "<",
            BinOp::Leq => "<=",
            BinOp::Gt => ">",
            BinOp::Geq => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        };
        write!(f, "{tok}")
    }
}

impl fmt::Display for Exp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        render_exp(self, false, &mut out);
        write!(f, "{out}")
    }
}

impl Exp {
    /// Unambiguous rendering used as a guess-store key: spans are not
    /// printed and names carry their unique id.
    pub fn key(&self) -> String {
        let mut out = String::new();
        render_exp(self, true, &mut out);
        out
    }
}

fn render_name(n: &Name, uniq: bool, out: &mut String) {
    out.push_str(&n.text);
    if uniq {
        out.push('#');
        out.push_str(&n.uniq.to_string());
    }
}

fn render_slice(index: &Exp, slice: &SliceKind, uniq: bool, out: &mut String) {
    out.push('[');
    render_exp(index, uniq, out);
    match slice {
        SliceKind::Single => {}
        SliceKind::Len(n) => {
            out.push(':');
            out.push_str(&n.to_string());
        }
        SliceKind::Meta(v) => {
            out.push(':');
            out.push_str(v);
        }
    }
    out.push(']');
}

fn render_exp(e: &Exp, uniq: bool, out: &mut String) {
    match &e.kind {
        ExpKind::Val(v) => out.push_str(&v.to_string()),
        ExpKind::Var(n) => render_name(n, uniq, out),
        ExpKind::ArrayLit(es) => {
            out.push('{');
            for (i, x) in es.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                render_exp(x, uniq, out);
            }
            out.push('}');
        }
        ExpKind::ArrayRead { base, index, slice } => {
            render_exp(base, uniq, out);
            render_slice(index, slice, uniq, out);
        }
        ExpKind::StructNew { name, fields } => {
            out.push_str(name);
            out.push('{');
            for (i, (fname, x)) in fields.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(fname);
                out.push_str(": ");
                render_exp(x, uniq, out);
            }
            out.push('}');
        }
        ExpKind::Proj { base, field } => {
            render_exp(base, uniq, out);
            out.push('.');
            out.push_str(field);
        }
        ExpKind::UnOp { op, operand } => {
            match op {
                UnOp::Neg => out.push('-'),
                UnOp::Not => out.push('!'),
                UnOp::BwNeg => out.push('~'),
                UnOp::Cast(ty) => {
                    out.push_str(&ty.to_string());
                }
                UnOp::Length => out.push_str("length"),
            }
            out.push('(');
            render_exp(operand, uniq, out);
            out.push(')');
        }
        ExpKind::BinOp { op, left, right } => {
            out.push('(');
            render_exp(left, uniq, out);
            out.push(' ');
            out.push_str(&op.to_string());
            out.push(' ');
            render_exp(right, uniq, out);
            out.push(')');
        }
        ExpKind::Let { name, rhs, body, .. } => {
            out.push_str("let ");
            render_name(name, uniq, out);
            out.push_str(" = ");
            render_exp(rhs, uniq, out);
            out.push_str(" in ");
            render_exp(body, uniq, out);
        }
        ExpKind::LetRef {
            name, init, body, ..
        } => {
            out.push_str("var ");
            render_name(name, uniq, out);
            if let Some(init) = init {
                out.push_str(" := ");
                render_exp(init, uniq, out);
            }
            out.push_str(" in ");
            render_exp(body, uniq, out);
        }
        ExpKind::Assign { lhs, rhs } => {
            render_exp(lhs, uniq, out);
            out.push_str(" := ");
            render_exp(rhs, uniq, out);
        }
        ExpKind::ArrWrite {
            base,
            index,
            slice,
            rhs,
        } => {
            render_exp(base, uniq, out);
            render_slice(index, slice, uniq, out);
            out.push_str(" := ");
            render_exp(rhs, uniq, out);
        }
        ExpKind::Seq { first, second } => {
            render_exp(first, uniq, out);
            out.push_str("; ");
            render_exp(second, uniq, out);
        }
        ExpKind::Cond {
            cond,
            then_e,
            else_e,
        } => {
            out.push_str("if ");
            render_exp(cond, uniq, out);
            out.push_str(" then ");
            render_exp(then_e, uniq, out);
            out.push_str(" else ");
            render_exp(else_e, uniq, out);
        }
        ExpKind::For {
            var,
            start,
            count,
            body,
            ..
        } => {
            out.push_str("for ");
            render_name(var, uniq, out);
            out.push_str(" in ");
            render_exp(start, uniq, out);
            out.push_str(", ");
            render_exp(count, uniq, out);
            out.push_str(" { ");
            render_exp(body, uniq, out);
            out.push_str(" }");
        }
        ExpKind::While { cond, body } => {
            out.push_str("while ");
            render_exp(cond, uniq, out);
            out.push_str(" { ");
            render_exp(body, uniq, out);
            out.push_str(" }");
        }
        ExpKind::Call { func, args } => {
            render_name(func, uniq, out);
            out.push('(');
            for (i, x) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                render_exp(x, uniq, out);
            }
            out.push(')');
        }
        ExpKind::Print { newline, args } => {
            out.push_str(if *newline { "println(" } else { "print(" });
            for (i, x) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                render_exp(x, uniq, out);
            }
            out.push(')');
        }
        ExpKind::Error { msg } => {
            out.push_str("error ");
            out.push_str(&format!("{msg:?}"));
        }
        ExpKind::Lut(inner) => {
            out.push_str("lut(");
            render_exp(inner, uniq, out);
            out.push(')');
        }
    }
}

impl fmt::Display for Comp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            CompKind::Var(n) => write!(f, "{n}"),
            CompKind::BindMany { head, binds } => {
                // x1 <- head; x2 <- c1; ...; cn
                write!(f, "{} <- {head}", binds[0].0)?;
                for (i, (_, c)) in binds.iter().enumerate() {
                    match binds.get(i + 1) {
                        Some((next_name, _)) => write!(f, "; {next_name} <- {c}")?,
                        None => write!(f, "; {c}")?,
                    }
                }
                Ok(())
            }
            CompKind::Seq { first, second } => write!(f, "{first}; {second}"),
            CompKind::Par { left, right, .. } => write!(f, "({left} >>> {right})"),
            CompKind::LetE { name, rhs, body, .. } => {
                write!(f, "let {name} = {rhs} in {body}")
            }
            CompKind::LetERef { name, init, body } => match init {
                Some(init) => write!(f, "var {name} := {init} in {body}"),
                None => write!(f, "var {name} in {body}"),
            },
            CompKind::LetFunE { name, body, .. } | CompKind::LetFunC { name, body, .. } => {
                write!(f, "fun {name}(..) in {body}")
            }
            CompKind::LetStruct { def, body } => {
                write!(f, "struct {} in {body}", def.name)
            }
            CompKind::Call { func, args } => {
                write!(f, "{func}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match a {
                        CallArg::Exp(e) => write!(f, "{e}")?,
                        CallArg::Comp(c) => write!(f, "{c}")?,
                    }
                }
                write!(f, ")")
            }
            CompKind::Emit(e) => write!(f, "emit {e}"),
            CompKind::Emits(e) => write!(f, "emits {e}"),
            CompKind::Return(e) => write!(f, "return {e}"),
            CompKind::Take => write!(f, "take"),
            CompKind::Takes(n) => write!(f, "takes {n}"),
            CompKind::Branch {
                cond,
                then_c,
                else_c,
            } => write!(f, "if {cond} then {then_c} else {else_c}"),
            CompKind::Until { cond, body } => write!(f, "until {cond} {{ {body} }}"),
            CompKind::While { cond, body } => write!(f, "while {cond} {{ {body} }}"),
            CompKind::Times {
                var, start, count, body, ..
            } => write!(f, "times {var} in {start}, {count} {{ {body} }}"),
            CompKind::Repeat { body, .. } => write!(f, "repeat {{ {body} }}"),
            CompKind::VectComp { ann, body } => {
                write!(f, "vect<{},{}> {{ {body} }}", ann.0, ann.1)
            }
            CompKind::Map { func, .. } => write!(f, "map {func}"),
            CompKind::Filter { func } => write!(f, "filter {func}"),
            CompKind::ReadSrc(ty) => write!(f, "read[{ty}]"),
            CompKind::WriteSnk(ty) => write!(f, "write[{ty}]"),
            CompKind::ReadInternal { queue, policy } => {
                let p = match policy {
                    ReadPolicy::SpinOnEmpty => "spin",
                    ReadPolicy::JumpToConsumeOnEmpty => "jump",
                };
                write!(f, "read_internal[{queue},{p}]")
            }
            CompKind::WriteInternal { queue } => write!(f, "write_internal[{queue}]"),
            CompKind::Standalone(body) => write!(f, "standalone {{ {body} }}"),
            CompKind::Mitigate { elem, from, to } => {
                write!(f, "mitigate[{elem}]({from},{to})")
            }
            CompKind::ActivateTask { task, input } => match input {
                Some(n) => write!(f, "activate {task}({n})"),
                None => write!(f, "activate {task}"),
            },
        }
    }
}
