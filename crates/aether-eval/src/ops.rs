//! Operator semantics over the value model.
//!
//! Every function here is a pure partial function: `None` means the
//! operator has no meaning for the given tags. The evaluator decides what
//! `None` becomes — a compiler-bug error for ordinary operators over
//! known values, a residual for unsupported casts.
//!
//! Integer arithmetic is computed in `i128` and truncated back to the
//! operand width, which gives two's-complement wrap-around at every
//! width without per-width overflow handling.

use aether_foundation::{Complex, IntWidth, Ty, ValueKind};

use aether_ast::{BinOp, UnOp};

fn int_of(v: &ValueKind) -> Option<i128> {
    match v {
        ValueKind::I8(x) => Some(*x as i128),
        ValueKind::I16(x) => Some(*x as i128),
        ValueKind::I32(x) => Some(*x as i128),
        ValueKind::I64(x) => Some(*x as i128),
        ValueKind::U8(x) => Some(*x as i128),
        ValueKind::U16(x) => Some(*x as i128),
        ValueKind::U32(x) => Some(*x as i128),
        ValueKind::U64(x) => Some(*x as i128),
        _ => None,
    }
}

fn bool_of(v: &ValueKind) -> Option<bool> {
    match v {
        ValueKind::Bit(b) | ValueKind::Bool(b) => Some(*b),
        _ => None,
    }
}

/// Retag an `i128` with the tag of `like`, truncating to its width.
pub(crate) fn retag_int(like: &ValueKind, v: i128) -> Option<ValueKind> {
    Some(match like {
        ValueKind::I8(_) => ValueKind::I8(v as i8),
        ValueKind::I16(_) => ValueKind::I16(v as i16),
        ValueKind::I32(_) => ValueKind::I32(v as i32),
        ValueKind::I64(_) => ValueKind::I64(v as i64),
        ValueKind::U8(_) => ValueKind::U8(v as u8),
        ValueKind::U16(_) => ValueKind::U16(v as u16),
        ValueKind::U32(_) => ValueKind::U32(v as u32),
        ValueKind::U64(_) => ValueKind::U64(v as u64),
        _ => return None,
    })
}

// Arithmetic uses wrapping operations: the result is truncated back to
// the operand width, and the low bits of a product mod 2^128 equal the
// low bits of the true product, so wrap-around at every width falls out
// without a panic (64-bit operands can overflow even i128 under `*`).
fn int_binop(op: BinOp, a: i128, b: i128) -> Option<i128> {
    Some(match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div => a.checked_div(b)?,
        BinOp::Rem => a.checked_rem(b)?,
        BinOp::BwAnd => a & b,
        BinOp::BwOr => a | b,
        BinOp::BwXor => a ^ b,
        _ => return None,
    })
}

fn complex_binop(op: BinOp, a: (i128, i128), b: (i128, i128)) -> Option<(i128, i128)> {
    let (ar, ai) = a;
    let (br, bi) = b;
    Some(match op {
        BinOp::Add => (ar.wrapping_add(br), ai.wrapping_add(bi)),
        BinOp::Sub => (ar.wrapping_sub(br), ai.wrapping_sub(bi)),
        BinOp::Mul => (
            ar.wrapping_mul(br).wrapping_sub(ai.wrapping_mul(bi)),
            ar.wrapping_mul(bi).wrapping_add(ai.wrapping_mul(br)),
        ),
        BinOp::Div => {
            // (ac+bd)/(c^2+d^2) + ((bc-ad)/(c^2+d^2))i, both truncated.
            let d = br.wrapping_mul(br).wrapping_add(bi.wrapping_mul(bi));
            if d == 0 {
                return None;
            }
            (
                ar.wrapping_mul(br).wrapping_add(ai.wrapping_mul(bi)).wrapping_div(d),
                ai.wrapping_mul(br).wrapping_sub(ar.wrapping_mul(bi)).wrapping_div(d),
            )
        }
        _ => return None,
    })
}

macro_rules! complex_pair {
    ($op:expr, $l:expr, $r:expr; $($tag:ident => $t:ty),+ $(,)?) => {
        match ($l, $r) {
            $(
                (ValueKind::$tag(a), ValueKind::$tag(b)) => {
                    let (re, im) = complex_binop(
                        $op,
                        (a.re as i128, a.im as i128),
                        (b.re as i128, b.im as i128),
                    )?;
                    Some(ValueKind::$tag(Complex::new(re as $t, im as $t)))
                }
            )+
            _ => None,
        }
    };
}

fn shift(op: BinOp, l: &ValueKind, amount: i128) -> Option<ValueKind> {
    // Result width follows the left operand; a negative right-shift
    // becomes a left shift by the absolute amount (and symmetrically).
    let (left_shift, amount) = match op {
        BinOp::ShiftL => (amount >= 0, amount.unsigned_abs()),
        BinOp::ShiftR => (amount < 0, amount.unsigned_abs()),
        _ => return None,
    };
    let v = int_of(l)?;
    let amount = amount.min(127) as u32;
    let shifted = if left_shift { v << amount } else { v >> amount };
    retag_int(l, shifted)
}

fn ordering(l: &ValueKind, r: &ValueKind) -> Option<std::cmp::Ordering> {
    match (l, r) {
        (ValueKind::Double(a), ValueKind::Double(b)) => a.partial_cmp(b),
        (ValueKind::Str(a), ValueKind::Str(b)) => Some(a.cmp(b)),
        (ValueKind::Bit(a), ValueKind::Bit(b)) | (ValueKind::Bool(a), ValueKind::Bool(b)) => {
            Some(a.cmp(b))
        }
        _ => {
            // Same-tag integers compare numerically.
            if std::mem::discriminant(l) != std::mem::discriminant(r) {
                return None;
            }
            Some(int_of(l)?.cmp(&int_of(r)?))
        }
    }
}

/// Meaning of a binary operator over two known values.
pub fn binop(op: BinOp, l: &ValueKind, r: &ValueKind) -> Option<ValueKind> {
    use std::cmp::Ordering;

    match op {
        BinOp::Eq => return Some(ValueKind::Bool(l == r)),
        BinOp::Neq => return Some(ValueKind::Bool(l != r)),
        BinOp::Lt | BinOp::Leq | BinOp::Gt | BinOp::Geq => {
            let ord = ordering(l, r)?;
            let res = match op {
                BinOp::Lt => ord == Ordering::Less,
                BinOp::Leq => ord != Ordering::Greater,
                BinOp::Gt => ord == Ordering::Greater,
                BinOp::Geq => ord != Ordering::Less,
                _ => unreachable!(),
            };
            return Some(ValueKind::Bool(res));
        }
        BinOp::And => return Some(ValueKind::Bool(bool_of(l)? && bool_of(r)?)),
        BinOp::Or => return Some(ValueKind::Bool(bool_of(l)? || bool_of(r)?)),
        BinOp::ShiftL | BinOp::ShiftR => return shift(op, l, int_of(r)?),
        _ => {}
    }

    // Bitwise operators double as boolean connectives on bit/bool.
    if matches!(op, BinOp::BwAnd | BinOp::BwOr | BinOp::BwXor) {
        if let (Some(a), Some(b)) = (bool_of(l), bool_of(r)) {
            let res = match op {
                BinOp::BwAnd => a && b,
                BinOp::BwOr => a || b,
                BinOp::BwXor => a != b,
                _ => unreachable!(),
            };
            return Some(match l {
                ValueKind::Bit(_) => ValueKind::Bit(res),
                _ => ValueKind::Bool(res),
            });
        }
    }

    if let (ValueKind::Double(a), ValueKind::Double(b)) = (l, r) {
        let res = match op {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div => a / b,
            BinOp::Rem => a % b,
            BinOp::Expon => a.powf(*b),
            _ => return None,
        };
        return Some(ValueKind::Double(res));
    }

    if let Some(res) = complex_pair!(op, l, r; C8 => i8, C16 => i16, C32 => i32, C64 => i64) {
        return Some(res);
    }

    // Arithmetic requires both operands at the same width and signedness.
    if std::mem::discriminant(l) != std::mem::discriminant(r) {
        return None;
    }
    let (a, b) = (int_of(l)?, int_of(r)?);
    retag_int(l, int_binop(op, a, b)?)
}

/// Meaning of a unary operator over a known value. Casts and the array
/// length operator are handled by the evaluator itself.
pub fn unop(op: &UnOp, v: &ValueKind) -> Option<ValueKind> {
    match op {
        UnOp::Neg => match v {
            ValueKind::Double(d) => Some(ValueKind::Double(-d)),
            ValueKind::C8(c) => Some(ValueKind::C8(Complex::new(
                c.re.wrapping_neg(),
                c.im.wrapping_neg(),
            ))),
            ValueKind::C16(c) => Some(ValueKind::C16(Complex::new(
                c.re.wrapping_neg(),
                c.im.wrapping_neg(),
            ))),
            ValueKind::C32(c) => Some(ValueKind::C32(Complex::new(
                c.re.wrapping_neg(),
                c.im.wrapping_neg(),
            ))),
            ValueKind::C64(c) => Some(ValueKind::C64(Complex::new(
                c.re.wrapping_neg(),
                c.im.wrapping_neg(),
            ))),
            _ => retag_int(v, -int_of(v)?),
        },
        UnOp::Not => match v {
            ValueKind::Bit(b) => Some(ValueKind::Bit(!b)),
            ValueKind::Bool(b) => Some(ValueKind::Bool(!b)),
            _ => None,
        },
        UnOp::BwNeg => match v {
            ValueKind::Bit(b) => Some(ValueKind::Bit(!b)),
            ValueKind::Bool(b) => Some(ValueKind::Bool(!b)),
            _ => retag_int(v, !int_of(v)?),
        },
        UnOp::Cast(_) | UnOp::Length => None,
    }
}

/// The cast matrix. `None` marks (source, target) pairs outside it.
pub fn cast(target: &Ty, v: &ValueKind) -> Option<ValueKind> {
    match target {
        Ty::Bit | Ty::Bool => {
            // Nonzero integers map to true; bit and bool convert freely.
            let b = bool_of(v).or_else(|| Some(int_of(v)? != 0))?;
            Some(match target {
                Ty::Bit => ValueKind::Bit(b),
                _ => ValueKind::Bool(b),
            })
        }
        Ty::Int(w) => {
            let n = numeric_of(v)?;
            Some(match w {
                IntWidth::W8 => ValueKind::I8(n as i8),
                IntWidth::W16 => ValueKind::I16(n as i16),
                IntWidth::W32 => ValueKind::I32(n as i32),
                IntWidth::W64 => ValueKind::I64(n as i64),
            })
        }
        Ty::UInt(w) => {
            let n = numeric_of(v)?;
            Some(match w {
                IntWidth::W8 => ValueKind::U8(n as u8),
                IntWidth::W16 => ValueKind::U16(n as u16),
                IntWidth::W32 => ValueKind::U32(n as u32),
                IntWidth::W64 => ValueKind::U64(n as u64),
            })
        }
        Ty::Double => match v {
            ValueKind::Double(d) => Some(ValueKind::Double(*d)),
            _ => Some(ValueKind::Double(int_of(v)? as f64)),
        },
        Ty::Complex(w) => {
            let (re, im) = match v {
                ValueKind::C8(c) => (c.re as i128, c.im as i128),
                ValueKind::C16(c) => (c.re as i128, c.im as i128),
                ValueKind::C32(c) => (c.re as i128, c.im as i128),
                ValueKind::C64(c) => (c.re as i128, c.im as i128),
                _ => return None,
            };
            Some(match w {
                IntWidth::W8 => ValueKind::C8(Complex::new(re as i8, im as i8)),
                IntWidth::W16 => ValueKind::C16(Complex::new(re as i16, im as i16)),
                IntWidth::W32 => ValueKind::C32(Complex::new(re as i32, im as i32)),
                IntWidth::W64 => ValueKind::C64(Complex::new(re as i64, im as i64)),
            })
        }
        Ty::String => match v {
            ValueKind::Str(s) => Some(ValueKind::Str(s.clone())),
            ValueKind::Double(d) => Some(ValueKind::Str(d.to_string())),
            _ => Some(ValueKind::Str(int_of(v)?.to_string())),
        },
        Ty::Unit | Ty::Array(..) | Ty::Struct(_) => None,
    }
}

/// Integer-valued view used by integer casts: integers widen losslessly,
/// bits and bools become 0/1, doubles truncate toward zero.
fn numeric_of(v: &ValueKind) -> Option<i128> {
    match v {
        ValueKind::Double(d) => Some(d.trunc() as i128),
        ValueKind::Bit(b) | ValueKind::Bool(b) => Some(*b as i128),
        _ => int_of(v),
    }
}

/// Whether a known value is the additive identity of its type.
pub fn is_zero(v: &ValueKind) -> bool {
    match v {
        ValueKind::Double(d) => *d == 0.0,
        ValueKind::C8(c) => c.re == 0 && c.im == 0,
        ValueKind::C16(c) => c.re == 0 && c.im == 0,
        ValueKind::C32(c) => c.re == 0 && c.im == 0,
        ValueKind::C64(c) => c.re == 0 && c.im == 0,
        _ => int_of(v) == Some(0),
    }
}

/// Whether a known value is the multiplicative identity of its type.
pub fn is_one(v: &ValueKind) -> bool {
    match v {
        ValueKind::Double(d) => *d == 1.0,
        ValueKind::C8(c) => c.re == 1 && c.im == 0,
        ValueKind::C16(c) => c.re == 1 && c.im == 0,
        ValueKind::C32(c) => c.re == 1 && c.im == 0,
        ValueKind::C64(c) => c.re == 1 && c.im == 0,
        _ => int_of(v) == Some(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_arithmetic_wraps_at_width() {
        let r = binop(BinOp::Add, &ValueKind::I8(120), &ValueKind::I8(100)).unwrap();
        assert_eq!(r, ValueKind::I8(-36));
        let r = binop(BinOp::Mul, &ValueKind::U8(16), &ValueKind::U8(32)).unwrap();
        assert_eq!(r, ValueKind::U8(0));
    }

    #[test]
    fn full_width_products_wrap_without_panic() {
        // (2^64 - 1)^2 mod 2^64 = 1; the intermediate exceeds i128.
        let r = binop(
            BinOp::Mul,
            &ValueKind::U64(u64::MAX),
            &ValueKind::U64(u64::MAX),
        )
        .unwrap();
        assert_eq!(r, ValueKind::U64(1));

        let m = Complex::new(i64::MIN, i64::MIN);
        let r = binop(BinOp::Mul, &ValueKind::C64(m), &ValueKind::C64(m)).unwrap();
        assert_eq!(r, ValueKind::C64(Complex::new(0, 0)));
    }

    #[test]
    fn signed_division_truncates_toward_zero() {
        let r = binop(BinOp::Div, &ValueKind::I32(-7), &ValueKind::I32(2)).unwrap();
        assert_eq!(r, ValueKind::I32(-3));
        let r = binop(BinOp::Rem, &ValueKind::I32(-7), &ValueKind::I32(2)).unwrap();
        assert_eq!(r, ValueKind::I32(-1));
    }

    #[test]
    fn complex_division_follows_the_conjugate_formula() {
        // (1+2i) / (3+4i): denom 25, re (3+8)/25 = 0, im (6-4)/25 = 0.
        let l = ValueKind::C32(Complex::new(1, 2));
        let r = ValueKind::C32(Complex::new(3, 4));
        assert_eq!(
            binop(BinOp::Div, &l, &r).unwrap(),
            ValueKind::C32(Complex::new(0, 0))
        );
        // (10+5i) / (3+4i): re (30+20)/25 = 2, im (15-40)/25 = -1.
        let l = ValueKind::C32(Complex::new(10, 5));
        assert_eq!(
            binop(BinOp::Div, &l, &r).unwrap(),
            ValueKind::C32(Complex::new(2, -1))
        );
    }

    #[test]
    fn shift_width_follows_left_operand() {
        let r = binop(BinOp::ShiftL, &ValueKind::U8(0x81), &ValueKind::I64(1)).unwrap();
        assert_eq!(r, ValueKind::U8(0x02));
        // Negative right shift turns into a left shift.
        let r = binop(BinOp::ShiftR, &ValueKind::I32(1), &ValueKind::I32(-3)).unwrap();
        assert_eq!(r, ValueKind::I32(8));
        // Arithmetic right shift for signed operands.
        let r = binop(BinOp::ShiftR, &ValueKind::I8(-64), &ValueKind::I8(2)).unwrap();
        assert_eq!(r, ValueKind::I8(-16));
    }

    #[test]
    fn strings_compare_lexicographically() {
        let r = binop(
            BinOp::Lt,
            &ValueKind::Str("abc".into()),
            &ValueKind::Str("abd".into()),
        )
        .unwrap();
        assert_eq!(r, ValueKind::Bool(true));
    }

    #[test]
    fn mixed_width_operands_are_rejected() {
        assert!(binop(BinOp::Add, &ValueKind::I8(1), &ValueKind::I16(1)).is_none());
    }

    #[test]
    fn casts_round_trip_within_width() {
        // cast<T>(cast<T>(x)) == cast<T>(x)
        let once = cast(&Ty::Int(IntWidth::W8), &ValueKind::I32(300)).unwrap();
        let twice = cast(&Ty::Int(IntWidth::W8), &once).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once, ValueKind::I8(44));
    }

    #[test]
    fn widening_casts_commute() {
        // cast<Wider>(cast<T>(x)) == cast<Wider>(x) for x fitting in T.
        let x = ValueKind::I16(-123);
        let via_t = cast(
            &Ty::Int(IntWidth::W64),
            &cast(&Ty::Int(IntWidth::W16), &x).unwrap(),
        )
        .unwrap();
        let direct = cast(&Ty::Int(IntWidth::W64), &x).unwrap();
        assert_eq!(via_t, direct);
    }

    #[test]
    fn double_to_int_truncates_toward_zero() {
        assert_eq!(
            cast(&Ty::Int(IntWidth::W32), &ValueKind::Double(-2.9)).unwrap(),
            ValueKind::I32(-2)
        );
    }

    #[test]
    fn bool_int_casts() {
        assert_eq!(
            cast(&Ty::Bool, &ValueKind::I32(-5)).unwrap(),
            ValueKind::Bool(true)
        );
        assert_eq!(
            cast(&Ty::UInt(IntWidth::W16), &ValueKind::Bit(true)).unwrap(),
            ValueKind::U16(1)
        );
    }

    #[test]
    fn unsupported_casts_fail_the_partial_function() {
        assert!(cast(&Ty::Complex(IntWidth::W16), &ValueKind::I32(1)).is_none());
        assert!(cast(&Ty::Int(IntWidth::W32), &ValueKind::Str("7".into())).is_none());
    }
}
