//! Runtime values for the evaluator.
//!
//! A value is a closed tagged union: one tag per scalar width, a dedicated
//! tag per complex width (kept apart from two-field structs so the complex
//! operator rules and size accounting stay cheap), sparse arrays, and
//! nominal structs. Every value carries the span it originated from;
//! equality ignores it.

use serde::{Deserialize, Serialize};

use crate::span::Span;
use crate::sparse::SparseArray;
use crate::ty::{ArrayLen, IntWidth, StructDef, Ty, complex_width_of};

/// A complex integer: real and imaginary components of one width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Complex<T> {
    pub re: T,
    pub im: T,
}

impl<T> Complex<T> {
    pub fn new(re: T, im: T) -> Self {
        Self { re, im }
    }
}

/// A typed runtime value plus the source position it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Value {
    pub kind: ValueKind,
    pub span: Span,
}

/// The payload of a [`Value`], one variant per type tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueKind {
    Unit,
    Bit(bool),
    Bool(bool),
    Str(String),
    Double(f64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    C8(Complex<i8>),
    C16(Complex<i16>),
    C32(Complex<i32>),
    C64(Complex<i64>),
    Array(SparseArray),
    Struct {
        name: String,
        fields: Vec<(String, Value)>,
    },
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl ValueKind {
    /// Attach a span, producing a full [`Value`].
    pub fn at(self, span: Span) -> Value {
        Value { kind: self, span }
    }
}

impl Value {
    /// Build a struct value, folding the four reserved complex struct
    /// names into their dedicated tags.
    pub fn struct_value(name: &str, fields: Vec<(String, Value)>, span: Span) -> Value {
        if let Some(width) = complex_width_of(name) {
            if let Some(kind) = complex_from_fields(width, &fields) {
                return kind.at(span);
            }
        }
        ValueKind::Struct {
            name: name.to_string(),
            fields,
        }
        .at(span)
    }

    /// The zero/empty default for a ground type; `None` when the type has
    /// a length variable or an unknown struct shape.
    pub fn zero(ty: &Ty, span: Span) -> Option<Value> {
        let kind = match ty {
            Ty::Unit => ValueKind::Unit,
            Ty::Bit => ValueKind::Bit(false),
            Ty::Bool => ValueKind::Bool(false),
            Ty::String => ValueKind::Str(String::new()),
            Ty::Double => ValueKind::Double(0.0),
            Ty::Int(IntWidth::W8) => ValueKind::I8(0),
            Ty::Int(IntWidth::W16) => ValueKind::I16(0),
            Ty::Int(IntWidth::W32) => ValueKind::I32(0),
            Ty::Int(IntWidth::W64) => ValueKind::I64(0),
            Ty::UInt(IntWidth::W8) => ValueKind::U8(0),
            Ty::UInt(IntWidth::W16) => ValueKind::U16(0),
            Ty::UInt(IntWidth::W32) => ValueKind::U32(0),
            Ty::UInt(IntWidth::W64) => ValueKind::U64(0),
            Ty::Complex(IntWidth::W8) => ValueKind::C8(Complex::new(0, 0)),
            Ty::Complex(IntWidth::W16) => ValueKind::C16(Complex::new(0, 0)),
            Ty::Complex(IntWidth::W32) => ValueKind::C32(Complex::new(0, 0)),
            Ty::Complex(IntWidth::W64) => ValueKind::C64(Complex::new(0, 0)),
            Ty::Array(ArrayLen::Static(n), elem) => {
                let default = Value::zero(elem, span)?;
                ValueKind::Array(SparseArray::filled(default, *n))
            }
            Ty::Array(ArrayLen::Var(_), _) => return None,
            Ty::Struct(def) => {
                let mut fields = Vec::with_capacity(def.fields.len());
                for (fname, fty) in &def.fields {
                    fields.push((fname.clone(), Value::zero(fty, span)?));
                }
                return Some(Value::struct_value(&def.name, fields, span));
            }
        };
        Some(kind.at(span))
    }

    /// The type this value inhabits, reconstructed from the tag.
    pub fn ty(&self) -> Ty {
        match &self.kind {
            ValueKind::Unit => Ty::Unit,
            ValueKind::Bit(_) => Ty::Bit,
            ValueKind::Bool(_) => Ty::Bool,
            ValueKind::Str(_) => Ty::String,
            ValueKind::Double(_) => Ty::Double,
            ValueKind::I8(_) => Ty::Int(IntWidth::W8),
            ValueKind::I16(_) => Ty::Int(IntWidth::W16),
            ValueKind::I32(_) => Ty::Int(IntWidth::W32),
            ValueKind::I64(_) => Ty::Int(IntWidth::W64),
            ValueKind::U8(_) => Ty::UInt(IntWidth::W8),
            ValueKind::U16(_) => Ty::UInt(IntWidth::W16),
            ValueKind::U32(_) => Ty::UInt(IntWidth::W32),
            ValueKind::U64(_) => Ty::UInt(IntWidth::W64),
            ValueKind::C8(_) => Ty::Complex(IntWidth::W8),
            ValueKind::C16(_) => Ty::Complex(IntWidth::W16),
            ValueKind::C32(_) => Ty::Complex(IntWidth::W32),
            ValueKind::C64(_) => Ty::Complex(IntWidth::W64),
            ValueKind::Array(arr) => Ty::Array(
                ArrayLen::Static(arr.len()),
                Box::new(arr.default_elem().ty()),
            ),
            ValueKind::Struct { name, fields } => Ty::Struct(StructDef {
                name: name.clone(),
                fields: fields
                    .iter()
                    .map(|(f, v)| (f.clone(), v.ty()))
                    .collect(),
            }),
        }
    }

    /// Truth value of a bit or bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self.kind {
            ValueKind::Bit(b) | ValueKind::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// Numeric value of any integer tag, widened without loss.
    pub fn as_int(&self) -> Option<i128> {
        match self.kind {
            ValueKind::I8(v) => Some(v as i128),
            ValueKind::I16(v) => Some(v as i128),
            ValueKind::I32(v) => Some(v as i128),
            ValueKind::I64(v) => Some(v as i128),
            ValueKind::U8(v) => Some(v as i128),
            ValueKind::U16(v) => Some(v as i128),
            ValueKind::U32(v) => Some(v as i128),
            ValueKind::U64(v) => Some(v as i128),
            _ => None,
        }
    }

    /// Non-negative integer usable as an array index.
    pub fn as_index(&self) -> Option<usize> {
        usize::try_from(self.as_int()?).ok()
    }

    pub fn as_array(&self) -> Option<&SparseArray> {
        match &self.kind {
            ValueKind::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Component of a complex value by field name (`re` or `im`).
    pub fn complex_component(&self, field: &str) -> Option<Value> {
        let kind = match (&self.kind, field) {
            (ValueKind::C8(c), "re") => ValueKind::I8(c.re),
            (ValueKind::C8(c), "im") => ValueKind::I8(c.im),
            (ValueKind::C16(c), "re") => ValueKind::I16(c.re),
            (ValueKind::C16(c), "im") => ValueKind::I16(c.im),
            (ValueKind::C32(c), "re") => ValueKind::I32(c.re),
            (ValueKind::C32(c), "im") => ValueKind::I32(c.im),
            (ValueKind::C64(c), "re") => ValueKind::I64(c.re),
            (ValueKind::C64(c), "im") => ValueKind::I64(c.im),
            _ => return None,
        };
        Some(kind.at(self.span))
    }

    /// Abstract size used by the evaluator's statistics: 1 per scalar, 2
    /// per complex, sum over struct fields, and element size times the
    /// written-slot count for arrays.
    pub fn size(&self) -> usize {
        match &self.kind {
            ValueKind::C8(_) | ValueKind::C16(_) | ValueKind::C32(_) | ValueKind::C64(_) => 2,
            ValueKind::Array(arr) => arr.default_elem().size() * arr.updates(),
            ValueKind::Struct { fields, .. } => fields.iter().map(|(_, v)| v.size()).sum(),
            _ => 1,
        }
    }
}

fn complex_from_fields(width: IntWidth, fields: &[(String, Value)]) -> Option<ValueKind> {
    if fields.len() != 2 {
        return None;
    }
    let mut re = None;
    let mut im = None;
    for (name, v) in fields {
        match name.as_str() {
            "re" => re = v.as_int(),
            "im" => im = v.as_int(),
            _ => return None,
        }
    }
    let (re, im) = (re?, im?);
    let kind = match width {
        IntWidth::W8 => ValueKind::C8(Complex::new(re as i8, im as i8)),
        IntWidth::W16 => ValueKind::C16(Complex::new(re as i16, im as i16)),
        IntWidth::W32 => ValueKind::C32(Complex::new(re as i32, im as i32)),
        IntWidth::W64 => ValueKind::C64(Complex::new(re as i64, im as i64)),
    };
    Some(kind)
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ValueKind::Unit => write!(f, "()"),
            ValueKind::Bit(b) => write!(f, "{}", if *b { "'1" } else { "'0" }),
            ValueKind::Bool(b) => write!(f, "{b}"),
            ValueKind::Str(s) => write!(f, "{s:?}"),
            ValueKind::Double(d) => write!(f, "{d}"),
            ValueKind::I8(v) => write!(f, "{v}"),
            ValueKind::I16(v) => write!(f, "{v}"),
            ValueKind::I32(v) => write!(f, "{v}"),
            ValueKind::I64(v) => write!(f, "{v}"),
            ValueKind::U8(v) => write!(f, "{v}"),
            ValueKind::U16(v) => write!(f, "{v}"),
            ValueKind::U32(v) => write!(f, "{v}"),
            ValueKind::U64(v) => write!(f, "{v}"),
            ValueKind::C8(c) => write!(f, "{}+{}i", c.re, c.im),
            ValueKind::C16(c) => write!(f, "{}+{}i", c.re, c.im),
            ValueKind::C32(c) => write!(f, "{}+{}i", c.re, c.im),
            ValueKind::C64(c) => write!(f, "{}+{}i", c.re, c.im),
            ValueKind::Array(arr) => {
                write!(f, "{{")?;
                if arr.len() <= 16 {
                    for (i, v) in arr.to_vec().iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{v}")?;
                    }
                } else {
                    write!(f, "default={}; ", arr.default_elem())?;
                    for (n, (i, v)) in arr.iter_writes().enumerate() {
                        if n > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "[{i}]={v}")?;
                    }
                }
                write!(f, "}}")
            }
            ValueKind::Struct { name, fields } => {
                write!(f, "{name}{{")?;
                for (i, (fname, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{fname}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}
