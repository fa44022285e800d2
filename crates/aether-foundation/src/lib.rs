//! Aether Foundation
//!
//! Core vocabulary shared across the aether compiler: source spans, unique
//! names, task and queue identifiers, the surface type language, and the
//! runtime value model with its sparse array representation.

pub mod ids;
pub mod span;
pub mod sparse;
pub mod ty;
pub mod value;

pub use ids::{Name, QueueId, TaskId};
pub use span::Span;
pub use sparse::SparseArray;
pub use ty::{ArrayLen, IntWidth, StructDef, Ty, complex_struct_name, complex_width_of};
pub use value::{Complex, Value, ValueKind};
