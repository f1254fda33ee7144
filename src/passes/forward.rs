//! Load-store forwarding: replace a load with a value already known to be
//! at that address.
//!
//! For each load the pass walks the memory chain backward. A bulk zero
//! covering the loaded range yields a typed zero constant; a store the
//! alias engine proves MustAlias yields the stored value; a node proven
//! unable to clobber the load is stepped over; anything else ends the walk
//! empty-handed. Memory phis are followed recursively along structurally
//! distinct edges, synthesizing a value phi of the per-edge results when
//! every edge succeeds. Successful loads become pass-through copies, and
//! the pass repeats until a sweep rewrites nothing, since one forward can
//! expose another.

use log::debug;

use super::alias::{off_split, ptr_base, ptr_width, AliasAnalysis, AliasConfig, AliasResult};
use super::{MAX_CHAIN_STEPS, MAX_PHI_BREADTH, MAX_PHI_DEPTH};
use crate::ir::analysis::postorder;
use crate::ir::func::{Aux, Func, ValueId};
use crate::ir::ops::Op;
use crate::ir::types::Type;

/// Forward stored values into loads. Returns the number of loads rewritten.
pub fn forward(f: &mut Func, config: &AliasConfig) -> usize {
    let aa = AliasAnalysis::build(f, config);
    let post = postorder(f);
    let mut eliminated = 0;

    loop {
        let mut changed = false;
        for &b in post.iter().rev() {
            let vals = f.block(b).values.clone();
            for &v in &vals {
                if f.value(v).op != Op::Load || f.value(v).uses == 0 {
                    continue;
                }
                let mem = f.value(v).args[1];
                let mut stack = Vec::new();
                if let Some(fwd) = load_follow(f, &aa, v, mem, &mut stack) {
                    debug!(
                        "{}: forwarding {} into {}",
                        f.name,
                        f.value_string(fwd),
                        v
                    );
                    f.reset(v, Op::Copy);
                    f.add_arg(v, fwd);
                    eliminated += 1;
                    changed = true;
                }
            }
        }
        if !changed {
            return eliminated;
        }
    }
}

/// Walk the chain backward from `mem` looking for the value `load` would
/// observe. `stack` holds the memory phis currently being followed.
fn load_follow(
    f: &mut Func,
    aa: &AliasAnalysis,
    load: ValueId,
    mem: ValueId,
    stack: &mut Vec<ValueId>,
) -> Option<ValueId> {
    if f.value(load).op != Op::Load {
        f.fatal(load, "expected a load");
    }
    let from = f.value(load).args[0];
    let width = f.value(load).ty.size();

    let mut mem = mem;
    let mut fuel = MAX_CHAIN_STEPS;
    while f.value(mem).op != Op::InitMem {
        if fuel == 0 {
            return None;
        }
        fuel -= 1;

        if f.value(mem).op == Op::Phi {
            if stack.last() == Some(&mem) {
                // The chain looped straight back to the merge under
                // construction; report the old phi so the caller can
                // substitute the new one.
                return Some(mem);
            }
            return phi_follow(f, aa, load, mem, stack);
        }

        match f.value(mem).op {
            Op::Zero => {
                let zwidth = f.value(mem).aux_int;
                let ptr = f.value(mem).args[0];
                if ptr_base(f, from) == ptr_base(f, ptr) {
                    let (bid, off) = off_split(f, from);
                    let (zid, zoff) = off_split(f, ptr);
                    if bid == zid && off >= zoff && off + width <= zoff + zwidth {
                        return const_zero(f, f.value(load).ty);
                    }
                }
            }
            Op::Store => {
                let ptr = f.value(mem).args[0];
                let val = f.value(mem).args[1];
                if aa.alias(f, ptr, ptr_width(f, mem), from, width) == AliasResult::MustAlias {
                    // Forwarding across the int/float register divide is a
                    // bit-cast this pass does not attempt.
                    if f.value(load).ty.is_float() != f.value(val).ty.is_float() {
                        return None;
                    }
                    return Some(val);
                }
            }
            _ => {}
        }

        if aa.clobbers(f, mem, load) {
            return None;
        }
        mem = match f.chain_step(mem) {
            Some(p) => p,
            None => f.fatal(mem, "memory chain ended unexpectedly"),
        };
    }
    None
}

/// Follow every structurally distinct edge of the memory phi `phi`; if all
/// succeed, merge the results with a synthesized value phi.
fn phi_follow(
    f: &mut Func,
    aa: &AliasAnalysis,
    load: ValueId,
    phi: ValueId,
    stack: &mut Vec<ValueId>,
) -> Option<ValueId> {
    if f.value(phi).op != Op::Phi || !f.value(phi).ty.is_memory() {
        f.fatal(phi, "expected a memory phi");
    }
    if stack.len() >= MAX_PHI_DEPTH
        || f.value(phi).args.len() >= MAX_PHI_BREADTH
        || stack.contains(&phi)
    {
        return None;
    }

    let phi_args = f.value(phi).args.clone();
    let mut results: Vec<ValueId> = Vec::with_capacity(phi_args.len());
    stack.push(phi);
    'args: for i in 0..phi_args.len() {
        // Duplicate incoming edges share one result.
        for j in 0..i {
            if phi_args[j] == phi_args[i] {
                results.push(results[j]);
                continue 'args;
            }
        }
        match load_follow(f, aa, load, phi_args[i], stack) {
            Some(r) => results.push(r),
            None => {
                stack.pop();
                return None;
            }
        }
    }
    stack.pop();

    let block = f.value(phi).block;
    let ty = f.value(load).ty;
    let newphi = f.new_value(block, Op::Phi, ty, 0, Aux::None, &[]);
    for r in results {
        let arg = if r == phi { newphi } else { r };
        f.add_arg(newphi, arg);
    }
    phielim_value(f, newphi);
    Some(newphi)
}

/// If every argument of the phi `v` is either one distinct value or `v`
/// itself, rewrite `v` into a copy of that value. Returns whether it did.
pub fn phielim_value(f: &mut Func, v: ValueId) -> bool {
    if f.value(v).op != Op::Phi {
        return false;
    }
    let mut w = None;
    for &a in &f.value(v).args {
        if a == v {
            continue;
        }
        match w {
            Some(prev) if prev != a => return false,
            _ => w = Some(a),
        }
    }
    let Some(w) = w else { return false };
    f.reset(v, Op::Copy);
    f.add_arg(v, w);
    true
}

/// A zero constant of type `ty`, materialized in the entry block.
fn const_zero(f: &mut Func, ty: Type) -> Option<ValueId> {
    let entry = f.entry;
    let op = match ty {
        Type::Bool => Op::ConstBool,
        Type::Int8 => Op::Const8,
        Type::Int16 => Op::Const16,
        Type::Int32 => Op::Const32,
        Type::Int64 => Op::Const64,
        Type::Float32 => Op::ConstF32,
        Type::Float64 => Op::ConstF64,
        Type::Ptr => Op::ConstNil,
        Type::Mem | Type::Tuple => return None,
    };
    Some(f.new_value(entry, op, ty, 0, Aux::None, &[]))
}
