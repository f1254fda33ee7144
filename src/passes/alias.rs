//! Pointer alias partitioning and clobber queries.
//!
//! Pointers are classified once per function into disjoint partitions with
//! flags: the stack pointer, each named storage location, and loads matching
//! a configured allocator signature each found their own partition. A second
//! pass demotes partitions whose pointer is stored somewhere (or laundered
//! through a conversion) — such a pointer may now be observed by code we
//! cannot see, so it loses its non-escaping status.
//!
//! `alias` answers pairwise may/must questions about two accesses, and
//! `clobbers` asks whether a node on the memory chain can invalidate a
//! given load. MayAlias is always a sound answer; the partitions only ever
//! sharpen it.

use bitflags::bitflags;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::common::fx_hash::FxHashMap;
use crate::ir::analysis::DomTree;
use crate::ir::func::{Aux, Func, SymId, ValueId};
use crate::ir::ops::Op;
use crate::ir::types::PTR_SIZE;

/// Outcome of a pairwise pointer query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasResult {
    /// The two accesses provably touch disjoint storage.
    MustNotAlias,
    /// Nothing could be proven either way.
    MayAlias,
    /// The two accesses provably touch the same storage.
    MustAlias,
}

/// One allocator entry point: a call to `name` deposits its pointer result
/// at stack offset `ptr_off * ptr_size + byte_off`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocatorSig {
    pub name: String,
    pub ptr_off: i64,
    pub byte_off: i64,
}

/// Target-specific facts the engine is parameterized over. Deserializable
/// so a driver can ship the allocator table alongside its target config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasConfig {
    #[serde(default = "default_ptr_size")]
    pub ptr_size: i64,
    #[serde(default)]
    pub allocators: Vec<AllocatorSig>,
}

fn default_ptr_size() -> i64 {
    PTR_SIZE
}

impl Default for AliasConfig {
    fn default() -> Self {
        AliasConfig { ptr_size: PTR_SIZE, allocators: Vec::new() }
    }
}

impl AliasConfig {
    /// A config recognizing a single allocator whose result lands one
    /// pointer-width above the stack pointer (the common outgoing-args
    /// layout).
    pub fn with_allocator(name: &str) -> Self {
        AliasConfig {
            ptr_size: PTR_SIZE,
            allocators: vec![AllocatorSig { name: name.to_string(), ptr_off: 1, byte_off: 0 }],
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct PtrFlags: u8 {
        /// A freshly allocated object; postdates function entry.
        const ALLOC = 1 << 0;
        /// Not yet observable by code outside this function.
        const NOALIAS = 1 << 1;
        /// Statically immutable storage; nothing clobbers it.
        const READONLY = 1 << 2;
    }
}

#[derive(Clone, Copy)]
struct PtrInfo {
    partition: u32,
    flags: PtrFlags,
}

/// Per-function alias partitions. Built once, queried while the function
/// is rewritten; partitions are keyed by value id and never invalidated by
/// value relocation (only by CFG edits, which no pass here performs).
pub struct AliasAnalysis {
    /// value id -> info index + 1; 0 means unpartitioned.
    idinfo: Vec<u32>,
    info: Vec<PtrInfo>,
    dom: DomTree,
}

impl AliasAnalysis {
    pub fn build(f: &Func, config: &AliasConfig) -> Self {
        let mut aa = AliasAnalysis {
            idinfo: vec![0; f.num_values()],
            info: Vec::new(),
            dom: DomTree::build(f),
        };

        let mut lastsp: Option<ValueId> = None;
        let mut sympart: FxHashMap<SymId, ValueId> = FxHashMap::default();
        let mut allocsite: FxHashMap<ValueId, ValueId> = FxHashMap::default();

        for b in f.block_ids() {
            for &v in &f.block(b).values {
                match f.value(v).op {
                    Op::Sp => match lastsp {
                        Some(sp) => aa.set_equivalent(sp, v),
                        None => {
                            lastsp = Some(v);
                            aa.add_pointer(v, PtrFlags::NOALIAS);
                        }
                    },
                    Op::Addr => {
                        let Aux::Sym(s) = f.value(v).aux else {
                            f.fatal(v, "address without a symbol")
                        };
                        match sympart.get(&s) {
                            Some(&first) => aa.set_equivalent(first, v),
                            None => {
                                sympart.insert(s, v);
                                let mut flags = PtrFlags::empty();
                                if f.value(f.value(v).args[0]).op == Op::Sp {
                                    flags |= PtrFlags::NOALIAS;
                                }
                                if f.sym(s).is_readonly() {
                                    flags |= PtrFlags::READONLY;
                                }
                                aa.add_pointer(v, flags);
                            }
                        }
                    }
                    Op::Load => {
                        if let Some(call) = heap_alloc_site(f, v, config) {
                            match allocsite.get(&call) {
                                Some(&first) => aa.set_equivalent(first, v),
                                None => {
                                    allocsite.insert(call, v);
                                    aa.add_pointer(v, PtrFlags::ALLOC | PtrFlags::NOALIAS);
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        // Escape pass: a stored pointer (or one laundered through Convert)
        // may now be reachable from anywhere.
        for b in f.block_ids() {
            for &v in &f.block(b).values {
                let val = f.value(v);
                if val.ty.is_memory() && val.args.len() > 1 {
                    match val.op {
                        Op::VarDef
                        | Op::VarKill
                        | Op::VarLive
                        | Op::Phi
                        | Op::KeepAlive
                        | Op::Zero => {}
                        _ => {
                            let stored = val.args[1];
                            if f.value(stored).ty.is_ptr_shaped() {
                                aa.escape(f, stored);
                            }
                        }
                    }
                } else if val.op == Op::Convert && f.value(val.args[0]).ty.is_ptr_shaped() {
                    aa.escape(f, val.args[0]);
                }
            }
        }

        debug!("{}: {} pointer partitions", f.name, aa.info.len());
        aa
    }

    fn add_pointer(&mut self, v: ValueId, flags: PtrFlags) {
        let part = self.info.len() as u32;
        self.info.push(PtrInfo { partition: part, flags });
        self.idinfo[v.0 as usize] = part + 1;
    }

    fn set_equivalent(&mut self, old: ValueId, v: ValueId) {
        self.idinfo[v.0 as usize] = self.idinfo[old.0 as usize];
    }

    fn escape(&mut self, f: &Func, v: ValueId) {
        let base = ptr_base(f, v);
        if let Some(i) = self.index_for(base) {
            if self.info[i].flags.contains(PtrFlags::NOALIAS) {
                debug!("{}: {} escapes", f.name, base);
                self.info[i].flags.remove(PtrFlags::NOALIAS);
            }
        }
    }

    /// Index into `info`, tolerant of values created after `build` (they
    /// are simply unpartitioned).
    fn index_for(&self, v: ValueId) -> Option<usize> {
        match self.idinfo.get(v.0 as usize) {
            Some(&i) if i != 0 => Some((i - 1) as usize),
            _ => None,
        }
    }

    fn info_for(&self, v: ValueId) -> Option<PtrInfo> {
        self.index_for(v).map(|i| self.info[i])
    }

    /// Partition of `v`, if it has one.
    pub fn partition(&self, v: ValueId) -> Option<u32> {
        self.info_for(v).map(|i| i.partition)
    }

    fn is_alloc(&self, v: ValueId) -> bool {
        self.info_for(v).is_some_and(|i| i.flags.contains(PtrFlags::ALLOC))
    }

    fn is_noalias(&self, v: ValueId) -> bool {
        self.info_for(v).is_some_and(|i| i.flags.contains(PtrFlags::NOALIAS))
    }

    fn is_read_only(&self, v: ValueId) -> bool {
        self.info_for(v).is_some_and(|i| i.flags.contains(PtrFlags::READONLY))
    }

    /// Can dereferencing `v` fault? False for frame- and symbol-relative
    /// addresses and for fresh allocations (never nil).
    pub fn addr_can_fault(&self, f: &Func, v: ValueId) -> bool {
        let base = ptr_base(f, v);
        match f.value(base).op {
            Op::Sp | Op::Sb | Op::Addr => false,
            _ => !self.is_alloc(base),
        }
    }

    /// Can an access of `bwidth` bytes at `b` touch the same storage as one
    /// of `cwidth` bytes at `c`?
    pub fn alias(
        &self,
        f: &Func,
        b: ValueId,
        bwidth: i64,
        c: ValueId,
        cwidth: i64,
    ) -> AliasResult {
        if b == c {
            if bwidth == cwidth {
                return AliasResult::MustAlias;
            }
            return AliasResult::MayAlias;
        }
        if f.value(b).op == Op::Phi || f.value(c).op == Op::Phi {
            return self.phi_alias(f, b, bwidth, c, cwidth);
        }

        let bbase = ptr_base(f, b);
        let cbase = ptr_base(f, c);
        if bbase == cbase {
            let (bid, boff) = off_split(f, b);
            let (cid, coff) = off_split(f, c);
            if bid == cid {
                // Constant windows from the same pointer.
                if !overlap(boff, bwidth, coff, cwidth) {
                    return AliasResult::MustNotAlias;
                }
                if boff == coff && bwidth == cwidth {
                    return AliasResult::MustAlias;
                }
                return AliasResult::MayAlias;
            }
            // Same base through a dynamic index; offsets are unknowable.
            return AliasResult::MayAlias;
        }

        let bpart = self.partition(bbase);
        let cpart = self.partition(cbase);
        if bpart != cpart && bpart.is_some() && cpart.is_some() {
            return AliasResult::MustNotAlias;
        }
        if bpart == cpart {
            return AliasResult::MayAlias;
        }
        if self.is_noalias(bbase) || self.is_noalias(cbase) {
            return AliasResult::MustNotAlias;
        }
        // An allocation postdates function entry, so it cannot be a
        // function argument nor any pointer its site doesn't dominate.
        if self.is_alloc(bbase)
            && (f.value(cbase).op == Op::Arg
                || !self.dom.is_ancestor_eq(f.value(bbase).block, f.value(cbase).block))
        {
            return AliasResult::MustNotAlias;
        }
        if self.is_alloc(cbase)
            && (f.value(bbase).op == Op::Arg
                || !self.dom.is_ancestor_eq(f.value(cbase).block, f.value(bbase).block))
        {
            return AliasResult::MustNotAlias;
        }
        AliasResult::MayAlias
    }

    /// Cross-product comparison through pointer phis. If every pairing of
    /// resolved incoming values agrees, that answer holds for the phi as a
    /// whole; nested phi-vs-phi gives up.
    fn phi_alias(
        &self,
        f: &Func,
        b: ValueId,
        bwidth: i64,
        c: ValueId,
        cwidth: i64,
    ) -> AliasResult {
        let resolve = |v: ValueId| -> Vec<ValueId> {
            if f.value(v).op == Op::Phi {
                f.value(v).args.clone()
            } else {
                vec![v]
            }
        };
        let bvalues = resolve(b);
        let cvalues = resolve(c);
        for &v in bvalues.iter().chain(cvalues.iter()) {
            if f.value(v).op == Op::Phi {
                return AliasResult::MayAlias;
            }
        }

        let mut ret = None;
        for &bv in &bvalues {
            for &cv in &cvalues {
                let r = self.alias(f, bv, bwidth, cv, cwidth);
                match ret {
                    None => ret = Some(r),
                    Some(prev) if prev != r => return AliasResult::MayAlias,
                    Some(_) => {}
                }
            }
        }
        ret.unwrap_or(AliasResult::MayAlias)
    }

    /// Can `mem`, a node on the memory chain, invalidate the storage that
    /// `load` reads?
    pub fn clobbers(&self, f: &Func, mem: ValueId, load: ValueId) -> bool {
        let mut mem = mem;
        if f.value(mem).op == Op::Phi {
            f.fatal(mem, "clobber query on a phi");
        }
        if f.value(mem).op == Op::Select1 {
            mem = f.value(mem).args[0];
        }
        let lval = f.value(load);
        match f.value(mem).op {
            Op::InitMem => true,
            Op::VarDef | Op::VarKill | Op::VarLive => {
                // Scope markers order against accesses of their own stack
                // slot only.
                let base = ptr_base(f, lval.args[0]);
                match (f.value(mem).aux, f.value(base).op, f.value(base).aux) {
                    (Aux::Sym(ms), Op::Addr, Aux::Sym(bs)) => ms == bs && f.sym(ms).is_stack(),
                    _ => false,
                }
            }
            Op::KeepAlive => f.value(mem).args[0] == load,
            Op::Copy | Op::Convert => false,
            op => {
                if f.memory_arg(mem).is_none() {
                    f.fatal(mem, "expected an operation on the memory chain");
                }
                let base = ptr_base(f, lval.args[0]);
                if self.is_read_only(base) {
                    return false;
                }
                let info = op.info();
                if info.call {
                    // A call can reach anything that has escaped, and
                    // anything frame-resident through the stack pointer
                    // it is handed.
                    return !self.is_noalias(base) || f.value(base).op == Op::Sp;
                }
                if info.side_effects || f.value(mem).ty.is_tuple() {
                    return true;
                }
                self.alias(f, f.value(mem).args[0], ptr_width(f, mem), lval.args[0], ptr_width(f, load))
                    != AliasResult::MustNotAlias
            }
        }
    }
}

/// Does the load `v` observe the pointer result of a configured allocator
/// call? Returns the call when it does.
fn heap_alloc_site(f: &Func, v: ValueId, config: &AliasConfig) -> Option<ValueId> {
    let val = f.value(v);
    let addr = val.args[0];
    let mem = *val.args.get(1)?;
    if f.value(addr).op != Op::OffPtr
        || f.value(mem).op != Op::Call
        || f.value(f.value(addr).args[0]).op != Op::Sp
    {
        return None;
    }
    let Aux::Sym(s) = f.value(mem).aux else { return None };
    let name = &f.sym(s).name;
    let off = f.value(addr).aux_int;
    for sig in &config.allocators {
        if sig.name == *name && off == sig.ptr_off * config.ptr_size + sig.byte_off {
            return Some(mem);
        }
    }
    None
}

/// Strip offset, index, and copy wrappers down to the underlying pointer.
pub fn ptr_base(f: &Func, v: ValueId) -> ValueId {
    let mut v = v;
    while matches!(f.value(v).op, Op::OffPtr | Op::AddPtr | Op::PtrIndex | Op::Copy) {
        v = f.value(v).args[0];
    }
    v
}

/// Split `v` into (pointer, accumulated constant byte offset), looking
/// through `OffPtr` and `Copy` only.
pub fn off_split(f: &Func, v: ValueId) -> (ValueId, i64) {
    let mut v = v;
    let mut off = 0i64;
    loop {
        match f.value(v).op {
            Op::OffPtr => {
                off += f.value(v).aux_int;
                v = f.value(v).args[0];
            }
            Op::Copy => v = f.value(v).args[0],
            _ => return (v, off),
        }
    }
}

/// Width in bytes of the access `v` performs.
pub fn ptr_width(f: &Func, v: ValueId) -> i64 {
    let val = f.value(v);
    match val.op {
        Op::Load => val.ty.size(),
        Op::Zero => val.aux_int,
        _ => match val.aux {
            Aux::Ty(t) => t.size(),
            _ => f.fatal(v, "operation has no access width"),
        },
    }
}

fn overlap(off0: i64, w0: i64, off1: i64, w1: i64) -> bool {
    if off0 > off1 {
        return overlap(off1, w1, off0, w0);
    }
    off0 + w0 > off1
}
