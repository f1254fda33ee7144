//! The SSA function: arenas of values and blocks plus mutation helpers.
//!
//! All relations are index-based. `Func` is the sole owner of every value,
//! block, and symbol; values refer to operands, blocks, and symbols by dense
//! u32 handle, so the cyclic phi/predecessor graph needs no reference
//! counting and scratch tables can be plain arrays sized to the arenas.
//!
//! Use counts are maintained by the mutation helpers (`new_value`,
//! `set_arg`, `reset`, ...) — passes must never edit argument lists by hand.

use std::fmt;

use super::ops::Op;
use super::types::Type;

/// Handle of a value in the function's value arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

/// Handle of a basic block in the function's block arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// Handle of an interned symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// What kind of storage a symbol names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymKind {
    /// A compiler-introduced stack slot.
    Auto,
    /// A named argument / result slot in the caller-visible frame.
    Arg,
    /// A global symbol; `readonly` marks statically immutable data.
    Extern { readonly: bool },
}

/// A named storage location referenced by `Addr` and the liveness markers.
#[derive(Debug, Clone)]
pub struct Sym {
    pub name: String,
    pub kind: SymKind,
}

impl Sym {
    /// Does this symbol live in the current function's stack frame?
    pub fn is_stack(&self) -> bool {
        matches!(self.kind, SymKind::Auto | SymKind::Arg)
    }

    pub fn is_readonly(&self) -> bool {
        matches!(self.kind, SymKind::Extern { readonly: true })
    }
}

/// Typed auxiliary payload of a value. Integer payloads (constants, byte
/// offsets, zeroed widths, float bit patterns) live in `Value::aux_int`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aux {
    None,
    /// The symbol an `Addr`, `Call`, or liveness marker refers to.
    Sym(SymId),
    /// The type a `Store`/`Zero` writes (its width is the store width).
    Ty(Type),
}

/// An SSA value.
#[derive(Debug, Clone)]
pub struct Value {
    pub op: Op,
    pub ty: Type,
    pub aux_int: i64,
    pub aux: Aux,
    pub args: Vec<ValueId>,
    /// Number of argument and control references to this value.
    pub uses: u32,
    /// Owning block. Placement only; order within the block's value list
    /// carries no semantics.
    pub block: BlockId,
}

/// The kind of a block's outgoing control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// One successor, unconditional.
    Plain,
    /// Two successors picked by a boolean control value.
    If,
    /// Function return; control is the final memory value.
    Ret,
    /// Abnormal exit; control is the final memory value.
    Exit,
}

/// A basic block.
#[derive(Debug, Clone)]
pub struct Block {
    pub kind: BlockKind,
    /// Values owned by this block, in current placement order.
    pub values: Vec<ValueId>,
    /// The value steering this block's outgoing edge, if any.
    pub control: Option<ValueId>,
    pub preds: Vec<BlockId>,
    pub succs: Vec<BlockId>,
}

/// A function: the sole owner of its blocks, values, and symbols.
#[derive(Debug)]
pub struct Func {
    pub name: String,
    pub entry: BlockId,
    blocks: Vec<Block>,
    values: Vec<Value>,
    syms: Vec<Sym>,
}

impl Func {
    pub fn new(name: impl Into<String>) -> Self {
        let mut f = Func {
            name: name.into(),
            entry: BlockId(0),
            blocks: Vec::new(),
            values: Vec::new(),
            syms: Vec::new(),
        };
        f.entry = f.add_block(BlockKind::Plain);
        f
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    #[inline]
    pub fn value(&self, v: ValueId) -> &Value {
        &self.values[v.0 as usize]
    }

    #[inline]
    pub fn value_mut(&mut self, v: ValueId) -> &mut Value {
        &mut self.values[v.0 as usize]
    }

    #[inline]
    pub fn block(&self, b: BlockId) -> &Block {
        &self.blocks[b.0 as usize]
    }

    #[inline]
    pub fn block_mut(&mut self, b: BlockId) -> &mut Block {
        &mut self.blocks[b.0 as usize]
    }

    #[inline]
    pub fn sym(&self, s: SymId) -> &Sym {
        &self.syms[s.0 as usize]
    }

    /// Upper bound (exclusive) on value ids; sizes dense scratch arrays.
    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// All block ids in stable arena order. Pass iteration order must be
    /// reproducible, so everything walks this (or an order derived from it).
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len() as u32).map(BlockId)
    }

    // ── Construction ──────────────────────────────────────────────────────

    pub fn add_block(&mut self, kind: BlockKind) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block {
            kind,
            values: Vec::new(),
            control: None,
            preds: Vec::new(),
            succs: Vec::new(),
        });
        id
    }

    /// Add a control-flow edge `from -> to`. Predecessor order defines phi
    /// argument order in `to`.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        self.blocks[from.0 as usize].succs.push(to);
        self.blocks[to.0 as usize].preds.push(from);
    }

    pub fn add_sym(&mut self, name: impl Into<String>, kind: SymKind) -> SymId {
        let id = SymId(self.syms.len() as u32);
        self.syms.push(Sym { name: name.into(), kind });
        id
    }

    /// Create a value in `block`. Argument use counts are bumped here.
    pub fn new_value(
        &mut self,
        block: BlockId,
        op: Op,
        ty: Type,
        aux_int: i64,
        aux: Aux,
        args: &[ValueId],
    ) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        for &a in args {
            self.values[a.0 as usize].uses += 1;
        }
        self.values.push(Value {
            op,
            ty,
            aux_int,
            aux,
            args: args.to_vec(),
            uses: 0,
            block,
        });
        self.blocks[block.0 as usize].values.push(id);
        id
    }

    // ── Mutation ──────────────────────────────────────────────────────────

    /// Replace argument `i` of `v`, maintaining use counts.
    pub fn set_arg(&mut self, v: ValueId, i: usize, new_arg: ValueId) {
        let old = self.values[v.0 as usize].args[i];
        if old == new_arg {
            return;
        }
        self.values[old.0 as usize].uses -= 1;
        self.values[new_arg.0 as usize].uses += 1;
        self.values[v.0 as usize].args[i] = new_arg;
    }

    /// Append an argument to `v`.
    pub fn add_arg(&mut self, v: ValueId, arg: ValueId) {
        self.values[arg.0 as usize].uses += 1;
        self.values[v.0 as usize].args.push(arg);
    }

    /// Rewrite `v` into a fresh `op` with no arguments and no aux data.
    /// The result type is kept; the value stays in its block so existing
    /// references remain valid.
    pub fn reset(&mut self, v: ValueId, op: Op) {
        let args = std::mem::take(&mut self.values[v.0 as usize].args);
        for a in args {
            self.values[a.0 as usize].uses -= 1;
        }
        let val = &mut self.values[v.0 as usize];
        val.op = op;
        val.aux_int = 0;
        val.aux = Aux::None;
    }

    /// Clone `v` into block `b` (same op, type, aux, and arguments).
    pub fn copy_into(&mut self, v: ValueId, b: BlockId) -> ValueId {
        let (op, ty, aux_int, aux, args) = {
            let val = self.value(v);
            (val.op, val.ty, val.aux_int, val.aux, val.args.clone())
        };
        self.new_value(b, op, ty, aux_int, aux, &args)
    }

    /// Set (or clear) the control value of `b`, maintaining use counts.
    pub fn set_control(&mut self, b: BlockId, c: Option<ValueId>) {
        if let Some(old) = self.blocks[b.0 as usize].control {
            self.values[old.0 as usize].uses -= 1;
        }
        if let Some(new) = c {
            self.values[new.0 as usize].uses += 1;
        }
        self.blocks[b.0 as usize].control = c;
    }

    /// Relocate `v` from its current block to `to`. Position within the
    /// source block is vacated by swap-with-last, so callers iterating that
    /// list by index must re-examine the vacated slot.
    pub fn move_value(&mut self, v: ValueId, to: BlockId) {
        let from = self.values[v.0 as usize].block;
        if from == to {
            return;
        }
        let list = &mut self.blocks[from.0 as usize].values;
        let pos = list
            .iter()
            .position(|&x| x == v)
            .unwrap_or_else(|| panic!("{v} not found in its owning block {from}"));
        list.swap_remove(pos);
        self.blocks[to.0 as usize].values.push(v);
        self.values[v.0 as usize].block = to;
    }

    // ── Queries ───────────────────────────────────────────────────────────

    /// The memory operand of `v`: its last argument, when memory-typed.
    /// Phis merge memory per-edge and have no single memory operand.
    pub fn memory_arg(&self, v: ValueId) -> Option<ValueId> {
        let val = self.value(v);
        if val.op == Op::Phi {
            self.fatal(v, "memory_arg on phi");
        }
        match val.args.last() {
            Some(&m) if self.value(m).ty.is_memory() => Some(m),
            _ => None,
        }
    }

    /// One step backward along the memory chain: the memory operand of the
    /// producing operation, looking through `Select1` to the tuple op it
    /// projects from. `None` at `InitMem` and at phis.
    pub fn chain_step(&self, v: ValueId) -> Option<ValueId> {
        let mut v = v;
        let val = self.value(v);
        if matches!(val.op, Op::Phi | Op::InitMem) {
            return None;
        }
        if val.op == Op::Select1 {
            v = val.args[0];
        }
        self.memory_arg(v)
    }

    /// Can `v` be recomputed from nothing but other rematerializable
    /// values? True for constants and named addresses.
    pub fn rematerializable(&self, v: ValueId) -> bool {
        let val = self.value(v);
        if !val.op.info().rematerializable {
            return false;
        }
        // Addr takes Sp/Sb; anything else as an argument means the value
        // depends on real computation.
        val.args
            .iter()
            .all(|&a| matches!(self.value(a).op, Op::Sp | Op::Sb))
    }

    /// Render `v` for diagnostics: `v7 = Store <Mem> {sym2} [8] v1 v2 v3`.
    pub fn value_string(&self, v: ValueId) -> String {
        use std::fmt::Write;
        let val = self.value(v);
        let mut s = format!("{} = {:?} <{:?}>", v, val.op, val.ty);
        if val.aux_int != 0 {
            let _ = write!(s, " [{}]", val.aux_int);
        }
        match val.aux {
            Aux::None => {}
            Aux::Sym(sym) => {
                let _ = write!(s, " {{{}}}", self.sym(sym).name);
            }
            Aux::Ty(t) => {
                let _ = write!(s, " {{{t:?}}}");
            }
        }
        for &a in &val.args {
            let _ = write!(s, " {a}");
        }
        s
    }

    /// Unrecoverable invariant violation: the incoming IR broke a contract
    /// an upstream pass was supposed to maintain. Aborts the compilation of
    /// this function rather than attempting partial recovery.
    pub fn fatal(&self, v: ValueId, msg: &str) -> ! {
        panic!("{}: {}: {}", self.name, msg, self.value_string(v));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn use_counts_through_mutation() {
        let mut f = Func::new("t");
        let e = f.entry;
        let c1 = f.new_value(e, Op::Const64, Type::Int64, 1, Aux::None, &[]);
        let c2 = f.new_value(e, Op::Const64, Type::Int64, 2, Aux::None, &[]);
        let add = f.new_value(e, Op::Add64, Type::Int64, 0, Aux::None, &[c1, c2]);
        assert_eq!(f.value(c1).uses, 1);
        assert_eq!(f.value(c2).uses, 1);
        assert_eq!(f.value(add).uses, 0);

        f.set_arg(add, 1, c1);
        assert_eq!(f.value(c1).uses, 2);
        assert_eq!(f.value(c2).uses, 0);

        f.reset(add, Op::Copy);
        assert_eq!(f.value(c1).uses, 0);
        f.add_arg(add, c2);
        assert_eq!(f.value(c2).uses, 1);
        assert_eq!(f.value(add).args, vec![c2]);
    }

    #[test]
    fn move_value_between_blocks() {
        let mut f = Func::new("t");
        let e = f.entry;
        let b2 = f.add_block(BlockKind::Plain);
        let c = f.new_value(e, Op::Const64, Type::Int64, 7, Aux::None, &[]);
        f.move_value(c, b2);
        assert_eq!(f.value(c).block, b2);
        assert!(f.block(e).values.is_empty());
        assert_eq!(f.block(b2).values, vec![c]);
    }

    #[test]
    fn memory_arg_is_last_memory_operand() {
        let mut f = Func::new("t");
        let e = f.entry;
        let init = f.new_value(e, Op::InitMem, Type::Mem, 0, Aux::None, &[]);
        let sp = f.new_value(e, Op::Sp, Type::Ptr, 0, Aux::None, &[]);
        let c = f.new_value(e, Op::Const64, Type::Int64, 1, Aux::None, &[]);
        let st = f.new_value(e, Op::Store, Type::Mem, 0, Aux::Ty(Type::Int64), &[sp, c, init]);
        assert_eq!(f.memory_arg(st), Some(init));
        assert_eq!(f.memory_arg(c), None);
        assert_eq!(f.memory_arg(init), None);
    }

    #[test]
    fn rematerializable_values() {
        let mut f = Func::new("t");
        let e = f.entry;
        let sp = f.new_value(e, Op::Sp, Type::Ptr, 0, Aux::None, &[]);
        let sym = f.add_sym("x", SymKind::Auto);
        let addr = f.new_value(e, Op::Addr, Type::Ptr, 0, Aux::Sym(sym), &[sp]);
        let off = f.new_value(e, Op::OffPtr, Type::Ptr, 8, Aux::None, &[addr]);
        let c = f.new_value(e, Op::Const32, Type::Int32, 5, Aux::None, &[]);
        assert!(f.rematerializable(sp));
        assert!(f.rematerializable(addr));
        assert!(f.rematerializable(c));
        assert!(!f.rematerializable(off));
    }
}
