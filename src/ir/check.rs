//! Consistency checker for the SSA function.
//!
//! Run around every pass in tests: a pass that leaves the function in a
//! state this rejects has a bug regardless of what its own assertions say.
//! The checks mirror the invariants the passes rely on — block ownership,
//! use counts, phi arity, a single memory-initialization value, and an
//! intact memory chain.

use thiserror::Error;

use super::func::{Func, ValueId};
use super::ops::Op;

/// A violated IR invariant.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("{0} is listed in a block other than its owner")]
    WrongBlock(String),
    #[error("{value}: use count is {found}, expected {expected}")]
    UseCount {
        value: String,
        expected: u32,
        found: u32,
    },
    #[error("{value}: phi has {args} arguments but its block has {preds} predecessors")]
    PhiArity {
        value: String,
        args: usize,
        preds: usize,
    },
    #[error("{0}: memory-typed value has no memory operand")]
    MissingMemoryArg(String),
    #[error("function has more than one memory-initialization value: {0}")]
    MultipleInitMem(String),
    #[error("{0}: memory operand is not memory-typed")]
    BadMemoryOperand(String),
}

/// Validate `f`, returning the first violated invariant.
pub fn check(f: &Func) -> Result<(), CheckError> {
    // Block ownership: each value appears exactly once, in its own block.
    let mut seen = vec![false; f.num_values()];
    for b in f.block_ids() {
        for &v in &f.block(b).values {
            if f.value(v).block != b || seen[v.0 as usize] {
                return Err(CheckError::WrongBlock(f.value_string(v)));
            }
            seen[v.0 as usize] = true;
        }
    }

    // Use counts: recount argument and control references.
    let mut uses = vec![0u32; f.num_values()];
    for b in f.block_ids() {
        for &v in &f.block(b).values {
            for &a in &f.value(v).args {
                uses[a.0 as usize] += 1;
            }
        }
        if let Some(c) = f.block(b).control {
            uses[c.0 as usize] += 1;
        }
    }
    for b in f.block_ids() {
        for &v in &f.block(b).values {
            let found = f.value(v).uses;
            let expected = uses[v.0 as usize];
            if found != expected {
                return Err(CheckError::UseCount {
                    value: f.value_string(v),
                    expected,
                    found,
                });
            }
        }
    }

    let mut initmem: Option<ValueId> = None;
    for b in f.block_ids() {
        let preds = f.block(b).preds.len();
        for &v in &f.block(b).values {
            let val = f.value(v);
            match val.op {
                Op::Phi => {
                    if val.args.len() != preds {
                        return Err(CheckError::PhiArity {
                            value: f.value_string(v),
                            args: val.args.len(),
                            preds,
                        });
                    }
                }
                Op::InitMem => {
                    if initmem.is_some() {
                        return Err(CheckError::MultipleInitMem(f.value_string(v)));
                    }
                    initmem = Some(v);
                }
                _ => {
                    // Every other memory-producing value must extend the
                    // chain through a memory operand (for Select1, through
                    // the tuple operation it projects from).
                    if val.ty.is_memory() && f.chain_step(v).is_none() {
                        return Err(CheckError::MissingMemoryArg(f.value_string(v)));
                    }
                }
            }
            // A memory operand anywhere but last would break chain walks.
            for (i, &a) in val.args.iter().enumerate() {
                if f.value(a).ty.is_memory()
                    && i + 1 != val.args.len()
                    && !matches!(val.op, Op::Phi)
                {
                    return Err(CheckError::BadMemoryOperand(f.value_string(v)));
                }
            }
        }
    }

    Ok(())
}
