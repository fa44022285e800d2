//! Unique identifiers for aether entities.
//!
//! Variables are identified by a compiler-assigned unique id; tasks and
//! queues produced by the task splitter use opaque numeric handles so that
//! tasks can reference each other without pointers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A binder or variable occurrence.
///
/// The renamer gives every binding a distinct `uniq`, so two names denote
/// the same binding iff their `uniq` matches. Equality, ordering, and
/// hashing use `uniq` only; `text` is kept for diagnostics and rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Name {
    pub uniq: u32,
    pub text: String,
}

impl Name {
    pub fn new(text: impl Into<String>, uniq: u32) -> Self {
        Self {
            uniq,
            text: text.into(),
        }
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.uniq == other.uniq
    }
}

impl Eq for Name {}

impl std::hash::Hash for Name {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.uniq.hash(state);
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.uniq.cmp(&other.uniq)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_handle!(
    /// Opaque identifier for a task produced by the splitter.
    TaskId,
    "t"
);

define_handle!(
    /// Opaque identifier for an inter-task synchronization queue.
    QueueId,
    "q"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_identity_is_the_uniq() {
        let a = Name::new("x", 1);
        let b = Name::new("y", 1);
        let c = Name::new("x", 2);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn handles_render_with_prefix() {
        assert_eq!(TaskId(3).to_string(), "t3");
        assert_eq!(QueueId(0).to_string(), "q0");
    }
}
