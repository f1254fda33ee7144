//! Operation tags and the per-operation descriptor table.
//!
//! Behavior that used to be scattered across ad hoc predicates lives in one
//! `OpInfo` record per tag: whether the operation is a call, whether it has
//! side effects beyond its result and memory output, whether it is pinned to
//! its defining block, and whether it is cheap to rematerialize. Memory- and
//! tuple-typedness are properties of the result `Type`, not of the tag.

/// An SSA operation tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// The function's initial memory state. Exactly one per function,
    /// resident in the entry block.
    InitMem,
    /// Control-flow merge; one argument per predecessor edge.
    Phi,
    /// Pass-through of its single argument.
    Copy,

    /// The stack pointer.
    Sp,
    /// The static base pointer (anchor for global symbols).
    Sb,
    /// Address of a named symbol: `Addr {sym} base` where base is Sp or Sb.
    Addr,
    /// Constant byte offset from a pointer: `OffPtr [off] ptr`.
    OffPtr,
    /// Pointer plus a dynamic byte count.
    AddPtr,
    /// Pointer indexed by a dynamic element count.
    PtrIndex,

    /// An incoming function argument.
    Arg,
    /// The closure context pointer.
    ClosurePtr,
    /// First result of a tuple-producing operation.
    Select0,
    /// Second result of a tuple-producing operation.
    Select1,

    /// `Load ptr mem`.
    Load,
    /// `Store {ty} ptr val mem`.
    Store,
    /// Bulk zeroing of `aux_int` bytes: `Zero [width] ptr mem`.
    Zero,
    /// Liveness marker: a named stack slot is about to be (re)defined.
    VarDef,
    /// Liveness marker: a named stack slot is dead.
    VarKill,
    /// Liveness marker: a named stack slot is live here.
    VarLive,
    /// Keeps its first argument alive until this point: `KeepAlive x mem`.
    KeepAlive,
    /// Pointer/scalar conversion that the GC must observe: `Convert x mem`.
    Convert,
    /// Static call: `Call {sym} mem`.
    Call,
    /// Fault if the pointer is nil: `NilCheck ptr mem`.
    NilCheck,
    /// `AtomicStore64 ptr val mem`.
    AtomicStore64,
    /// `AtomicAdd64 ptr val mem` producing `Tuple(old, mem)`.
    AtomicAdd64,

    ConstBool,
    Const8,
    Const16,
    Const32,
    Const64,
    ConstF32,
    ConstF64,
    ConstNil,

    Add64,
    Eq64,
    Geq64,
}

/// Static facts about an operation tag.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpInfo {
    /// Transfers control to another function.
    pub call: bool,
    /// Has observable effects beyond its result and memory output
    /// (atomics and the like). Such operations clobber conservatively.
    pub side_effects: bool,
    /// Must stay in its defining block: phis, entry-block accessors,
    /// tuple selectors, and the memory-initialization value.
    pub pinned: bool,
    /// Cheap to recompute at any point; candidates for cloning into
    /// predecessor blocks rather than being kept live across a merge.
    pub rematerializable: bool,
}

impl Op {
    /// The descriptor for this tag.
    pub fn info(self) -> OpInfo {
        match self {
            Op::Call => OpInfo { call: true, ..Default::default() },
            Op::AtomicStore64 | Op::AtomicAdd64 => {
                OpInfo { side_effects: true, ..Default::default() }
            }
            Op::InitMem | Op::Phi | Op::Arg | Op::ClosurePtr | Op::Select0 | Op::Select1 => {
                OpInfo { pinned: true, ..Default::default() }
            }
            Op::Sp
            | Op::Sb
            | Op::Addr
            | Op::ConstBool
            | Op::Const8
            | Op::Const16
            | Op::Const32
            | Op::Const64
            | Op::ConstF32
            | Op::ConstF64
            | Op::ConstNil => OpInfo { rematerializable: true, ..Default::default() },
            _ => OpInfo::default(),
        }
    }

    /// Is this a constant or named-address operation that folds into its
    /// user on every target, so it should not count against an operand
    /// budget during code motion?
    pub fn is_foldable_operand(self) -> bool {
        matches!(
            self,
            Op::Const8
                | Op::Const16
                | Op::Const32
                | Op::Const64
                | Op::ConstBool
                | Op::ConstF32
                | Op::ConstF64
                | Op::ConstNil
                | Op::Addr
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_table() {
        assert!(Op::Call.info().call);
        assert!(!Op::Store.info().call);
        assert!(Op::AtomicStore64.info().side_effects);
        assert!(Op::Phi.info().pinned);
        assert!(Op::InitMem.info().pinned);
        assert!(Op::Const64.info().rematerializable);
        assert!(Op::Addr.info().rematerializable);
        assert!(!Op::Load.info().rematerializable);
    }
}
