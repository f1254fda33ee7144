//! Code motion: relocate values to the dominator-nearest block covering all
//! their uses, shrinking live ranges.
//!
//! The target of a movable value is the least common ancestor of its use
//! sites in the dominator tree (a phi use counts at the corresponding
//! predecessor; a control use at the block itself), then raised out of any
//! loop the value did not already live in. Loads move only when the alias
//! engine proves the stretch of memory chain between the old and new
//! position cannot clobber them; a load that fails the proof is left alone
//! and never retried.
//!
//! `phi_tighten` is the small companion pass: it clones rematerializable
//! phi inputs into their predecessor blocks so constants don't stay live
//! across whole merge regions.

use log::debug;

use super::alias::{ptr_base, AliasAnalysis, AliasConfig};
use super::memlive::{mem_ranges, MemRanges};
use super::MAX_CHAIN_STEPS;
use crate::ir::analysis::DomTree;
use crate::ir::func::{BlockId, Func, ValueId};
use crate::ir::loops::LoopNest;
use crate::ir::ops::Op;

#[derive(Debug, Default, Clone, Copy)]
pub struct TightenStats {
    /// Values relocated to another block.
    pub moved: usize,
    /// Of those, loads proven safe to rewire.
    pub moved_loads: usize,
}

pub fn tighten(f: &mut Func, config: &AliasConfig) -> TightenStats {
    let dom = DomTree::build(f);
    let loops = LoopNest::build(f, &dom);
    let aa = AliasAnalysis::build(f, config);

    let mut can_move = vec![false; f.num_values()];
    for b in f.block_ids() {
        for i in 0..f.block(b).values.len() {
            let v = f.block(b).values[i];
            let val = f.value(v);
            if val.uses == 0 || val.op.info().pinned {
                continue;
            }
            if val.op == Op::Load {
                // A load can be rewired onto another block's chain only if
                // its address survives the trip: frame- or symbol-relative
                // addresses always do.
                let base = ptr_base(f, val.args[0]);
                if matches!(f.value(base).op, Op::Sp | Op::Sb | Op::Addr) {
                    can_move[v.0 as usize] = true;
                }
                continue;
            }
            if f.memory_arg(v).is_some() {
                // Moving any other chain node would leave two positions of
                // the chain live at once.
                continue;
            }
            let mut narg = 0;
            for &a in &f.value(v).args {
                if !f.value(a).op.is_foldable_operand() {
                    narg += 1;
                }
            }
            // More than one real operand extends those operands' lives;
            // boolean results are exempt so comparisons can chase their
            // branch.
            if narg >= 2 && !f.value(v).ty.is_boolean() {
                continue;
            }
            can_move[v.0 as usize] = true;
        }
    }

    let mut stats = TightenStats::default();
    loop {
        let mut changed = false;
        let ranges = mem_ranges(f);
        can_move.resize(f.num_values(), false);
        let mut target: Vec<Option<BlockId>> = vec![None; f.num_values()];

        // LCA of all use sites.
        for b in f.block_ids() {
            for i in 0..f.block(b).values.len() {
                let v = f.block(b).values[i];
                for j in 0..f.value(v).args.len() {
                    let a = f.value(v).args[j];
                    if !can_move[a.0 as usize] {
                        continue;
                    }
                    let use_block = if f.value(v).op == Op::Phi {
                        f.block(b).preds[j]
                    } else {
                        b
                    };
                    let t = &mut target[a.0 as usize];
                    *t = Some(match *t {
                        Some(prev) => dom.lca(prev, use_block),
                        None => use_block,
                    });
                }
            }
            if let Some(c) = f.block(b).control {
                if can_move[c.0 as usize] {
                    let t = &mut target[c.0 as usize];
                    *t = Some(match *t {
                        Some(prev) => dom.lca(prev, b),
                        None => b,
                    });
                }
            }
        }

        // Never sink a value into a loop it didn't already live in: raise
        // the target along the idom chain until its depth fits.
        for vi in 0..target.len() {
            let Some(mut t) = target[vi] else { continue };
            let orig_depth = loops.depth(f.value(ValueId(vi as u32)).block);
            while loops.depth(t) > orig_depth {
                let Some(li) = loops.innermost(t) else { break };
                match dom.idom(loops.loops[li].header) {
                    Some(d) => t = d,
                    None => break,
                }
            }
            target[vi] = Some(t);
        }

        for b in f.block_ids() {
            let mut i = 0;
            while i < f.block(b).values.len() {
                let v = f.block(b).values[i];
                let t = match target.get(v.0 as usize).copied().flatten() {
                    Some(t) if t != b => t,
                    _ => {
                        i += 1;
                        continue;
                    }
                };
                if f.value(v).op == Op::Load {
                    let ok = if dom.is_ancestor_eq(b, t) {
                        sink_load(f, &aa, v, t, &ranges)
                    } else {
                        hoist_load(f, &aa, &dom, v, t, &ranges)
                    };
                    if !ok {
                        can_move[v.0 as usize] = false;
                        i += 1;
                        continue;
                    }
                    stats.moved_loads += 1;
                } else if !dom.is_ancestor_eq(b, t) {
                    // The raised target climbed past the defining block;
                    // operands would no longer dominate it.
                    i += 1;
                    continue;
                }
                debug!("{}: moving {} from {} to {}", f.name, v, b, t);
                f.move_value(v, t);
                stats.moved += 1;
                changed = true;
                // The vacated slot now holds another value; revisit it.
            }
        }

        if !changed {
            break;
        }
    }
    stats
}

/// Move `load`'s chain position down to the entry of `t`, which its block
/// dominates, if nothing on the way can clobber it.
fn sink_load(f: &mut Func, aa: &AliasAnalysis, load: ValueId, t: BlockId, ranges: &MemRanges) -> bool {
    let dep = f.value(load).args[1];
    for i in 0..f.block(t).preds.len() {
        let p = f.block(t).preds[i];
        if !clobber_free(f, aa, ranges.exit(p), load, dep) {
            return false;
        }
    }
    let entry = ranges.entry(t);
    f.set_arg(load, 1, entry);
    true
}

/// Move `load`'s chain position up to the exit of `t`, which dominates its
/// block. Runs the load speculatively, so the address must be provably
/// non-faulting.
fn hoist_load(
    f: &mut Func,
    aa: &AliasAnalysis,
    dom: &DomTree,
    load: ValueId,
    t: BlockId,
    ranges: &MemRanges,
) -> bool {
    let addr = f.value(load).args[0];
    if aa.addr_can_fault(f, addr) {
        return false;
    }
    if !dom.is_ancestor_eq(f.value(addr).block, t) {
        return false;
    }
    let exit = ranges.exit(t);
    if !clobber_free(f, aa, f.value(load).args[1], load, exit) {
        return false;
    }
    f.set_arg(load, 1, exit);
    true
}

/// Is the memory-chain segment from `from` back to `end` free of anything
/// that might clobber `load`? Gives up (reports a clobber) when the step
/// budget runs out.
fn clobber_free(f: &Func, aa: &AliasAnalysis, from: ValueId, load: ValueId, end: ValueId) -> bool {
    let mut fuel = MAX_CHAIN_STEPS;
    let mut stack = Vec::new();
    clobber_walk(f, aa, from, load, end, &mut stack, &mut fuel)
}

fn clobber_walk(
    f: &Func,
    aa: &AliasAnalysis,
    mem: ValueId,
    load: ValueId,
    end: ValueId,
    stack: &mut Vec<ValueId>,
    fuel: &mut usize,
) -> bool {
    let mut mem = mem;
    while mem != end {
        if *fuel == 0 {
            return false;
        }
        *fuel -= 1;
        if f.value(mem).op == Op::Phi {
            if stack.contains(&mem) {
                // Looped back to a merge already under examination; this
                // path adds nothing new.
                return true;
            }
            let args = f.value(mem).args.clone();
            if args.len() > 1 {
                stack.push(mem);
                for &a in &args[1..] {
                    if !clobber_walk(f, aa, a, load, end, stack, fuel) {
                        stack.pop();
                        return false;
                    }
                }
                stack.pop();
            }
            mem = args[0];
            continue;
        }
        if aa.clobbers(f, mem, load) {
            return false;
        }
        mem = match f.chain_step(mem) {
            Some(p) => p,
            None => f.fatal(mem, "memory chain ended before its target"),
        };
    }
    true
}

/// Clone rematerializable phi inputs into their predecessor blocks.
/// Returns the number of arguments rewired.
pub fn phi_tighten(f: &mut Func) -> usize {
    let mut count = 0;
    for b in f.block_ids() {
        let nvals = f.block(b).values.len();
        for i in 0..nvals {
            let v = f.block(b).values[i];
            if f.value(v).op != Op::Phi {
                continue;
            }
            for j in 0..f.value(v).args.len() {
                let a = f.value(v).args[j];
                if !f.rematerializable(a) {
                    continue;
                }
                let p = f.block(b).preds[j];
                if f.value(a).block == p {
                    continue;
                }
                let clone = f.copy_into(a, p);
                f.set_arg(v, j, clone);
                count += 1;
            }
        }
    }
    count
}
