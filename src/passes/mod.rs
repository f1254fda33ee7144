//! Memory-aware optimization passes.
//!
//! The passes share one discipline: every walk along the memory chain or
//! through a web of memory phis carries an explicit step budget, and running
//! out of budget means giving up conservatively, never looping. Analyses
//! (dominators, loop nest, alias partitions) are built up front as dense
//! arrays and queried while the function is mutated; none of them borrow the
//! function, so a pass can hold them across its rewriting loop.

pub mod alias;
pub mod forward;
pub mod memlive;
pub mod shuffle;
pub mod tighten;

/// Budget for any single backward walk along the memory chain.
pub(crate) const MAX_CHAIN_STEPS: usize = 100;

/// Load forwarding gives up on memory phis nested deeper than this.
pub(crate) const MAX_PHI_DEPTH: usize = 10;

/// Load forwarding gives up on memory phis wider than this.
pub(crate) const MAX_PHI_BREADTH: usize = 10;

/// Load shuffling skips blocks with more chained stores than this.
pub(crate) const MAX_BLOCK_STORES: usize = 200;
