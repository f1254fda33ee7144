//! A sparse set over dense u32 ids with O(1) insert, lookup, and clear.
//!
//! Used as per-pass scratch for visited-value tracking. The set is sized to
//! the function's value arena once and reused across many queries; `clear`
//! does not touch the dense storage.

/// Sparse set of u32 ids in `0..capacity`.
pub struct SparseSet {
    dense: Vec<u32>,
    sparse: Vec<u32>,
}

impl SparseSet {
    /// Create a set that can hold ids in `0..capacity`.
    pub fn new(capacity: usize) -> Self {
        SparseSet {
            dense: Vec::with_capacity(capacity),
            sparse: vec![0; capacity],
        }
    }

    pub fn contains(&self, id: u32) -> bool {
        let i = self.sparse[id as usize] as usize;
        i < self.dense.len() && self.dense[i] == id
    }

    pub fn add(&mut self, id: u32) {
        if self.contains(id) {
            return;
        }
        self.sparse[id as usize] = self.dense.len() as u32;
        self.dense.push(id);
    }

    pub fn clear(&mut self) {
        self.dense.clear();
    }

    pub fn len(&self) -> usize {
        self.dense.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }
}
