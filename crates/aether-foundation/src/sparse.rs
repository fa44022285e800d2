//! Sparse fixed-length arrays.
//!
//! Signal-processing sources pre-allocate large buffers (up to ~96000
//! elements) and then touch only a handful of entries during partial
//! evaluation. The array value therefore stores a default element plus an
//! ordered map of overrides: O(1) length, O(log n) element access, and
//! O(k) iteration over the k written entries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Fixed-length array of values with a sparse override map.
///
/// Writing the default element back to a slot removes its override, so
/// `updates()` always counts slots that differ from the default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparseArray {
    len: usize,
    default: Box<Value>,
    writes: BTreeMap<usize, Value>,
}

impl SparseArray {
    /// Array of `len` copies of `default`.
    pub fn filled(default: Value, len: usize) -> Self {
        Self {
            len,
            default: Box::new(default),
            writes: BTreeMap::new(),
        }
    }

    /// Array from a dense element list; `default` is the element assumed
    /// for unwritten slots and need not occur in `elems`.
    pub fn from_elems(default: Value, elems: Vec<Value>) -> Self {
        let mut arr = Self::filled(default, elems.len());
        for (i, v) in elems.into_iter().enumerate() {
            arr.set(i, v);
        }
        arr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn default_elem(&self) -> &Value {
        &self.default
    }

    /// Number of slots holding a non-default element.
    pub fn updates(&self) -> usize {
        self.writes.len()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        if index >= self.len {
            return None;
        }
        Some(self.writes.get(&index).unwrap_or(&self.default))
    }

    /// Write one slot. Returns false when the index is out of bounds.
    pub fn set(&mut self, index: usize, value: Value) -> bool {
        if index >= self.len {
            return false;
        }
        if value == *self.default {
            self.writes.remove(&index);
        } else {
            self.writes.insert(index, value);
        }
        true
    }

    /// Copy of the sub-array `[start, start + n)`, rebased to index 0.
    pub fn slice(&self, start: usize, n: usize) -> Option<SparseArray> {
        if start.checked_add(n)? > self.len {
            return None;
        }
        let mut out = SparseArray::filled((*self.default).clone(), n);
        for (i, v) in self.writes.range(start..start + n) {
            out.set(i - start, v.clone());
        }
        Some(out)
    }

    /// Overwrite `[start, start + src.len())` with the elements of `src`.
    /// Returns false when the range does not fit.
    pub fn set_slice(&mut self, start: usize, src: &SparseArray) -> bool {
        match start.checked_add(src.len()) {
            Some(end) if end <= self.len => {}
            _ => return false,
        }
        for i in 0..src.len() {
            let v = src.get(i).expect("index in bounds by construction");
            self.set(start + i, v.clone());
        }
        true
    }

    /// Iterate the written (non-default) entries in index order.
    pub fn iter_writes(&self) -> impl Iterator<Item = (usize, &Value)> {
        self.writes.iter().map(|(i, v)| (*i, v))
    }

    /// Dense materialisation. Intended for rendering and small arrays.
    pub fn to_vec(&self) -> Vec<Value> {
        (0..self.len)
            .map(|i| self.get(i).expect("index in bounds").clone())
            .collect()
    }
}

/// Element-wise equality: two arrays are equal when every slot agrees,
/// regardless of how the default/override split was chosen.
impl PartialEq for SparseArray {
    fn eq(&self, other: &Self) -> bool {
        if self.len != other.len {
            return false;
        }
        let mut keys: Vec<usize> = self.writes.keys().copied().collect();
        keys.extend(other.writes.keys().copied());
        keys.sort_unstable();
        keys.dedup();
        if keys.len() < self.len && *self.default != *other.default {
            return false;
        }
        keys.iter().all(|&i| self.get(i) == other.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::Span;
    use crate::value::ValueKind;

    fn int(v: i32) -> Value {
        ValueKind::I32(v).at(Span::unknown())
    }

    #[test]
    fn writes_track_non_default_slots() {
        let mut a = SparseArray::filled(int(0), 96_000);
        assert_eq!(a.updates(), 0);
        assert!(a.set(7, int(5)));
        assert!(a.set(95_999, int(9)));
        assert_eq!(a.updates(), 2);
        assert_eq!(a.get(7), Some(&int(5)));
        assert_eq!(a.get(8), Some(&int(0)));
        // Writing the default back clears the override.
        assert!(a.set(7, int(0)));
        assert_eq!(a.updates(), 1);
        assert!(!a.set(96_000, int(1)));
    }

    #[test]
    fn slices_rebase() {
        let a = SparseArray::from_elems(int(0), vec![int(1), int(2), int(3), int(4)]);
        let s = a.slice(1, 2).unwrap();
        assert_eq!(s.to_vec(), vec![int(2), int(3)]);
        assert!(a.slice(3, 2).is_none());
    }

    #[test]
    fn equality_ignores_representation() {
        let dense = SparseArray::from_elems(int(9), vec![int(0), int(0), int(5)]);
        let mut sparse = SparseArray::filled(int(0), 3);
        sparse.set(2, int(5));
        assert_eq!(dense, sparse);
        sparse.set(1, int(1));
        assert_ne!(dense, sparse);
    }
}
