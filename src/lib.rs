//! Memory-aware code motion and alias analysis for an SSA backend.
//!
//! This crate operates on one function at a time, after SSA construction and
//! before scheduling. It answers two questions — can these two pointers refer
//! to overlapping storage, and may this memory operation be reordered with
//! respect to that load — and uses the answers to shrink live ranges:
//!
//! - `passes::alias`: partitions pointer values into disjoint memory regions
//!   and answers pairwise `alias` and `clobbers` queries.
//! - `passes::memlive`: computes the live memory value at every block's
//!   entry and exit, the backbone the motion passes query.
//! - `passes::tighten`: moves values (including loads, when provably safe)
//!   into the dominator-nearest block covering all their uses, and clones
//!   rematerializable phi arguments into predecessors.
//! - `passes::forward`: replaces loads with values already proven to have
//!   been stored to the same location, stepping through intervening stores
//!   and phi merges.
//! - `passes::shuffle`: re-orders loads later within their own block's
//!   store sequence.
//!
//! The surrounding compiler owns SSA construction and everything downstream;
//! passes here mutate the function in place and report counters. Invariant
//! violations in the incoming IR abort via panic with a description of the
//! offending value. The IR is assumed consistent going in; partial recovery
//! is never attempted, and an unprovable transformation is not an error —
//! the affected value is simply left in place.

// Index-based iteration is deliberate in the motion passes: blocks mutate
// their own value lists mid-scan (swap-remove), which iterators can't express.
#![allow(clippy::needless_range_loop)]

pub mod common;
pub mod ir;
pub mod passes;
