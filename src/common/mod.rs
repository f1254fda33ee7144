//! Small shared utilities with no IR dependencies.

pub mod fx_hash;
pub mod sparse_set;
