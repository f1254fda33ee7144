//! The SSA intermediate representation and its supporting analyses.
//!
//! `func` owns the arenas; `types` and `ops` are the closed vocabularies the
//! rest of the crate matches on. `analysis` and `loops` are derived views
//! (dominators, loop nest) that passes build on demand, and `check` is the
//! consistency checker tests wrap around every transformation.

pub mod analysis;
pub mod check;
pub mod func;
pub mod loops;
pub mod ops;
pub mod types;

#[cfg(test)]
pub mod testfn;

pub use func::{Aux, Block, BlockId, BlockKind, Func, Sym, SymId, SymKind, Value, ValueId};
pub use ops::Op;
pub use types::Type;
