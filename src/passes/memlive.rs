//! Live-memory ranges: for every block, the memory value live on entry and
//! the last memory value produced in (or flowing through) the block.
//!
//! Blocks containing memory operations seed their ranges by walking the
//! chain backward from each rooted memory value (block controls and memory
//! phi arguments). Blocks that touch no memory inherit both endpoints from
//! their immediate dominator. Code motion consults these ranges to rewire a
//! relocated load onto the chain of its destination block.

use crate::ir::analysis::{postorder, DomTree};
use crate::ir::func::{BlockId, Func, ValueId};
use crate::ir::ops::Op;
use crate::ir::types::Type;

/// Per-block memory endpoints. Indexed by block id; every block has both
/// after construction.
pub struct MemRanges {
    entry: Vec<ValueId>,
    exit: Vec<ValueId>,
}

impl MemRanges {
    /// The memory value live when `b` is entered.
    pub fn entry(&self, b: BlockId) -> ValueId {
        self.entry[b.0 as usize]
    }

    /// The last memory value of `b`: the final link of its chain, or the
    /// inherited entry value when the block produces no memory.
    pub fn exit(&self, b: BlockId) -> ValueId {
        self.exit[b.0 as usize]
    }
}

/// Move the function's memory-initialization value to the entry block,
/// synthesizing one if the function has none.
pub fn hoist_init_mem(f: &mut Func) -> ValueId {
    for b in f.block_ids() {
        for i in 0..f.block(b).values.len() {
            let v = f.block(b).values[i];
            if f.value(v).op == Op::InitMem {
                if b != f.entry {
                    let entry = f.entry;
                    f.move_value(v, entry);
                }
                return v;
            }
        }
    }
    let entry = f.entry;
    f.new_value(entry, Op::InitMem, Type::Mem, 0, crate::ir::func::Aux::None, &[])
}

/// Compute entry/exit memory values for every block.
pub fn mem_ranges(f: &mut Func) -> MemRanges {
    let initmem = hoist_init_mem(f);
    let n = f.num_blocks();
    let mut entry: Vec<Option<ValueId>> = vec![None; n];
    let mut exit: Vec<Option<ValueId>> = vec![None; n];

    // Seed from the roots: memory controls and memory phis.
    for b in f.block_ids() {
        if let Some(c) = f.block(b).control {
            if f.value(c).ty.is_memory() {
                walk_live_mem(f, c, &mut entry, &mut exit);
                continue;
            }
        }
        for i in 0..f.block(b).values.len() {
            let v = f.block(b).values[i];
            let val = f.value(v);
            if val.op == Op::Phi && val.ty.is_memory() {
                for j in 0..f.value(v).args.len() {
                    let a = f.value(v).args[j];
                    walk_live_mem(f, a, &mut entry, &mut exit);
                }
                break;
            }
        }
    }

    // Blocks no walk reached inherit from the immediate dominator; sweep in
    // reverse postorder until stable so a dominator's endpoints are usually
    // resolved before its subtree.
    let post = postorder(f);
    let dom = DomTree::build(f);
    let mut done = false;
    while !done {
        done = true;
        for &b in post.iter().rev() {
            let bi = b.0 as usize;
            if exit[bi].is_none() {
                match dom.idom(b) {
                    None => exit[bi] = Some(initmem),
                    Some(d) => match exit[d.0 as usize] {
                        Some(e) => exit[bi] = Some(e),
                        None => {
                            done = false;
                            continue;
                        }
                    },
                }
            }
            if entry[bi].is_none() {
                entry[bi] = exit[bi];
            }
        }
    }

    MemRanges {
        entry: entry.into_iter().map(|e| e.unwrap_or(initmem)).collect(),
        exit: exit.into_iter().map(|e| e.unwrap_or(initmem)).collect(),
    }
}

/// Record the exit (and entry) memory value of every block the chain from
/// `v` passes through, stopping at blocks already recorded.
fn walk_live_mem(
    f: &Func,
    v: ValueId,
    entry: &mut [Option<ValueId>],
    exit: &mut [Option<ValueId>],
) {
    let mut v = v;
    loop {
        if !f.value(v).ty.is_memory() {
            f.fatal(v, "live-memory walk reached a non-memory value");
        }
        let b = f.value(v).block;
        let bi = b.0 as usize;
        if exit[bi].is_some() {
            return;
        }
        exit[bi] = Some(v);

        // Walk the chain back within this block.
        while f.value(v).block == b && !matches!(f.value(v).op, Op::Phi | Op::InitMem) {
            v = match f.chain_step(v) {
                Some(p) => p,
                None => f.fatal(v, "memory value has no memory operand"),
            };
        }

        if f.value(v).block != b {
            // The whole block is fed by memory from elsewhere.
            entry[bi] = Some(v);
            continue;
        }

        entry[bi] = Some(v);
        let val = f.value(v);
        if val.op == Op::InitMem {
            return;
        }
        // A memory phi: trail every incoming edge; keep walking the first
        // in place.
        for i in 1..val.args.len() {
            walk_live_mem(f, f.value(v).args[i], entry, exit);
        }
        v = f.value(v).args[0];
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ir::func::{Aux, SymKind};
    use crate::ir::testfn::FuncBuilder;
    use crate::ir::types::Type;

    #[test]
    fn straight_line_ranges() {
        let mut b = FuncBuilder::new("t");
        let x = b.sym("x", SymKind::Auto);
        b.value("entry", "mem", Op::InitMem, Type::Mem, 0, Aux::None, &[])
            .value("entry", "sp", Op::Sp, Type::Ptr, 0, Aux::None, &[])
            .value("entry", "a", Op::Addr, Type::Ptr, 0, Aux::Sym(x), &["sp"])
            .value("entry", "c", Op::Const64, Type::Int64, 1, Aux::None, &[])
            .value("entry", "st", Op::Store, Type::Mem, 0, Aux::Ty(Type::Int64), &["a", "c", "mem"])
            .ret("entry", "st");
        let (mut f, names) = b.finish();

        let ranges = mem_ranges(&mut f);
        assert_eq!(ranges.entry(f.entry), names["mem"]);
        assert_eq!(ranges.exit(f.entry), names["st"]);
    }

    #[test]
    fn memoryless_block_inherits_from_dominator() {
        let mut b = FuncBuilder::new("t");
        let x = b.sym("x", SymKind::Auto);
        b.value("entry", "mem", Op::InitMem, Type::Mem, 0, Aux::None, &[])
            .value("entry", "sp", Op::Sp, Type::Ptr, 0, Aux::None, &[])
            .value("entry", "a", Op::Addr, Type::Ptr, 0, Aux::Sym(x), &["sp"])
            .value("entry", "c", Op::Const64, Type::Int64, 1, Aux::None, &[])
            .value("entry", "st", Op::Store, Type::Mem, 0, Aux::Ty(Type::Int64), &["a", "c", "mem"])
            .goto("entry", "mid")
            .value("mid", "sum", Op::Add64, Type::Int64, 0, Aux::None, &["c", "c"])
            .goto("mid", "end")
            .value("end", "ld", Op::Load, Type::Int64, 0, Aux::None, &["a", "st"])
            .ret("end", "st");
        let (mut f, names) = b.finish();

        let ranges = mem_ranges(&mut f);
        let mid = *f
            .block_ids()
            .collect::<Vec<_>>()
            .get(1)
            .unwrap();
        assert_eq!(ranges.entry(mid), names["st"]);
        assert_eq!(ranges.exit(mid), names["st"]);
    }

    #[test]
    fn loop_phi_bounds_ranges() {
        let mut b = FuncBuilder::new("t");
        let x = b.sym("x", SymKind::Auto);
        b.value("entry", "mem", Op::InitMem, Type::Mem, 0, Aux::None, &[])
            .value("entry", "sp", Op::Sp, Type::Ptr, 0, Aux::None, &[])
            .value("entry", "a", Op::Addr, Type::Ptr, 0, Aux::Sym(x), &["sp"])
            .value("entry", "c", Op::Const64, Type::Int64, 1, Aux::None, &[])
            .value("entry", "flag", Op::ConstBool, Type::Bool, 1, Aux::None, &[])
            .goto("entry", "head")
            .value("head", "mphi", Op::Phi, Type::Mem, 0, Aux::None, &["mem", "st"])
            .value("head", "st", Op::Store, Type::Mem, 0, Aux::Ty(Type::Int64), &["a", "c", "mphi"])
            .branch("head", "flag", "end", "head")
            .ret("end", "st");
        let (mut f, names) = b.finish();

        let head = names["mphi"];
        let head = f.value(head).block;
        let ranges = mem_ranges(&mut f);
        assert_eq!(ranges.entry(head), names["mphi"]);
        assert_eq!(ranges.exit(head), names["st"]);
        assert_eq!(ranges.exit(f.entry), names["mem"]);
    }

    #[test]
    fn abnormal_exit_roots_a_walk() {
        let mut b = FuncBuilder::new("t");
        let x = b.sym("x", SymKind::Auto);
        b.value("entry", "mem", Op::InitMem, Type::Mem, 0, Aux::None, &[])
            .value("entry", "sp", Op::Sp, Type::Ptr, 0, Aux::None, &[])
            .value("entry", "a", Op::Addr, Type::Ptr, 0, Aux::Sym(x), &["sp"])
            .value("entry", "c", Op::Const64, Type::Int64, 1, Aux::None, &[])
            .value("entry", "flag", Op::ConstBool, Type::Bool, 1, Aux::None, &[])
            .branch("entry", "flag", "panic", "ok")
            .value("panic", "st", Op::Store, Type::Mem, 0, Aux::Ty(Type::Int64), &["a", "c", "mem"])
            .exit("panic", "st")
            .ret("ok", "mem");
        let (mut f, names) = b.finish();

        let ranges = mem_ranges(&mut f);
        let panic_block = f.value(names["st"]).block;
        assert_eq!(ranges.entry(panic_block), names["mem"]);
        assert_eq!(ranges.exit(panic_block), names["st"]);
    }

    #[test]
    fn hoist_moves_init_to_entry() {
        use crate::ir::func::{BlockKind, Func};
        let mut f = Func::new("t");
        let b2 = f.add_block(BlockKind::Ret);
        f.add_edge(f.entry, b2);
        let init = f.new_value(b2, Op::InitMem, Type::Mem, 0, Aux::None, &[]);
        f.set_control(b2, Some(init));
        let got = hoist_init_mem(&mut f);
        assert_eq!(got, init);
        assert_eq!(f.value(init).block, f.entry);
    }
}
