//! Load shuffling: reorder a load later within its block's store sequence.
//!
//! A load pinned early in a long block keeps its result register live
//! across every following store. If the alias engine can prove the stores
//! between the load's current chain position and some later position never
//! touch its address, the load's memory operand is rewritten to the later
//! position, shrinking the live range with no observable effect. A floor is
//! set by any same-block chain reader that transitively depends on the
//! load's value. Blocks with pathologically long store chains are skipped
//! outright.

use log::debug;

use super::alias::{AliasAnalysis, AliasConfig};
use super::memlive::mem_ranges;
use super::MAX_BLOCK_STORES;
use crate::common::sparse_set::SparseSet;
use crate::ir::func::{BlockId, Func, ValueId};
use crate::ir::ops::Op;

/// Push loads later along their block's store chain. Returns the number of
/// loads whose position improved.
pub fn shuffle(f: &mut Func, config: &AliasConfig) -> usize {
    let ranges = mem_ranges(f);
    let aa = AliasAnalysis::build(f, config);
    let mut storenumber = vec![0usize; f.num_values()];
    let mut searched = SparseSet::new(f.num_values());
    let mut shuffles = 0;

    for b in f.block_ids() {
        let tail = ranges.exit(b);
        if f.value(tail).block != b || matches!(f.value(tail).op, Op::InitMem | Op::Phi) {
            continue;
        }

        // Number the chain nodes from the block exit backward.
        let mut num = 0;
        let mut store = tail;
        while f.value(store).block == b && !matches!(f.value(store).op, Op::InitMem | Op::Phi) {
            storenumber[store.0 as usize] = num;
            num += 1;
            store = match f.chain_step(store) {
                Some(p) => p,
                None => f.fatal(store, "memory chain ended inside a block"),
            };
        }
        if num > MAX_BLOCK_STORES {
            continue;
        }

        loop {
            let mut changed = false;
            let vals = f.block(b).values.clone();
            for &v in &vals {
                if f.value(v).op != Op::Load || f.value(v).uses == 0 {
                    continue;
                }
                let moved = sink_one(f, &aa, v, b, tail, &storenumber, num, &mut searched);
                if moved > 0 {
                    shuffles += 1;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }
    shuffles
}

/// Try to move `v`'s chain position later within `b`. Returns how many
/// chain slots it advanced.
#[allow(clippy::too_many_arguments)]
fn sink_one(
    f: &mut Func,
    aa: &AliasAnalysis,
    v: ValueId,
    b: BlockId,
    tail: ValueId,
    storenumber: &[usize],
    max: usize,
    searched: &mut SparseSet,
) -> usize {
    if f.value(v).block != b {
        f.fatal(v, "load shuffled in the wrong block");
    }
    let curparent = f.value(v).args[1];
    let curstore = if f.value(curparent).block == b
        && !matches!(f.value(curparent).op, Op::InitMem | Op::Phi)
    {
        storenumber[curparent.0 as usize]
    } else {
        max
    };

    // Floor: any chain reader that depends on this load fixes how far it
    // may advance.
    let mut min = 0;
    for i in 0..f.block(b).values.len() {
        let m = f.block(b).values[i];
        if m == v {
            continue;
        }
        if !matches!(f.value(m).op, Op::Load | Op::NilCheck | Op::Convert) {
            continue;
        }
        if !depends(f, m, v, searched) {
            continue;
        }
        let arg = match f.memory_arg(m) {
            Some(a) => a,
            None => f.fatal(m, "chain reader without a memory operand"),
        };
        if f.value(arg).block != b || matches!(f.value(arg).op, Op::InitMem | Op::Phi) {
            return 0;
        }
        let s = storenumber[arg.0 as usize];
        if s > min {
            min = s;
            if min >= curstore {
                return 0;
            }
        }
    }

    // Rewind the scan start to respect the floor.
    let mut tail = tail;
    while storenumber[tail.0 as usize] < min {
        tail = match f.chain_step(tail) {
            Some(p) => p,
            None => f.fatal(tail, "memory chain ended inside a block"),
        };
    }

    // Walk backward toward the current position; the best new parent is
    // the latest store below which no clobber occurs.
    let mut parent: Option<ValueId> = None;
    while f.value(tail).block == b
        && !matches!(f.value(tail).op, Op::InitMem | Op::Phi)
        && tail != curparent
    {
        if aa.clobbers(f, tail, v) || depends(f, tail, v, searched) {
            parent = None;
        } else if parent.is_none() {
            parent = Some(tail);
        }
        tail = match f.chain_step(tail) {
            Some(p) => p,
            None => f.fatal(tail, "memory chain ended inside a block"),
        };
    }

    match parent {
        Some(p) if p != curparent => {
            debug!("{}: shuffling {} onto {}", f.name, v, p);
            f.set_arg(v, 1, p);
            curstore - storenumber[p.0 as usize]
        }
        _ => 0,
    }
}

/// Does `a` transitively depend on `end` through values of its own block?
fn depends(f: &Func, a: ValueId, end: ValueId, searched: &mut SparseSet) -> bool {
    searched.clear();
    find_dep(f, a, f.value(a).block, end, searched)
}

fn find_dep(f: &Func, v: ValueId, b: BlockId, end: ValueId, searched: &mut SparseSet) -> bool {
    let mut v = v;
    loop {
        if f.value(v).block != b || searched.contains(v.0) {
            return false;
        }
        if v == end {
            return true;
        }
        searched.add(v.0);
        let args = &f.value(v).args;
        match args.len() {
            0 => return false,
            1 => v = args[0],
            _ => {
                for i in 1..args.len() {
                    if find_dep(f, f.value(v).args[i], b, end, searched) {
                        return true;
                    }
                }
                v = f.value(v).args[0];
            }
        }
    }
}
