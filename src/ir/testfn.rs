//! Hand-built functions for pass tests.
//!
//! A test describes its function as named blocks and named values. Names may
//! refer forward — a loop phi's second argument is defined later in the text,
//! just as it is in a real loop — so the builder records argument and control
//! references as strings and resolves them all in `finish`. Predecessor order
//! (and therefore phi argument order) is the order edges are declared in.

use super::check::check;
use super::func::{Aux, BlockId, BlockKind, Func, SymId, SymKind, ValueId};
use super::ops::Op;
use super::types::Type;
use crate::common::fx_hash::FxHashMap;

pub struct FuncBuilder {
    f: Func,
    blocks: FxHashMap<String, BlockId>,
    values: FxHashMap<String, ValueId>,
    /// Deferred argument lists, resolved in declaration order.
    args: Vec<(ValueId, Vec<String>)>,
    controls: Vec<(BlockId, String)>,
}

impl FuncBuilder {
    /// A builder whose entry block is named `"entry"`. Also wires up
    /// logging so `RUST_LOG=debug` shows pass traces during tests.
    pub fn new(name: &str) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let f = Func::new(name);
        let mut blocks = FxHashMap::default();
        blocks.insert("entry".to_string(), f.entry);
        FuncBuilder {
            f,
            blocks,
            values: FxHashMap::default(),
            args: Vec::new(),
            controls: Vec::new(),
        }
    }

    /// Intern `name`, creating the block on first mention.
    pub fn block(&mut self, name: &str) -> BlockId {
        if let Some(&b) = self.blocks.get(name) {
            return b;
        }
        let b = self.f.add_block(BlockKind::Plain);
        self.blocks.insert(name.to_string(), b);
        b
    }

    pub fn sym(&mut self, name: &str, kind: SymKind) -> SymId {
        self.f.add_sym(name, kind)
    }

    /// Declare value `name` in `block`. `args` are value names, resolved
    /// when `finish` runs.
    pub fn value(
        &mut self,
        block: &str,
        name: &str,
        op: Op,
        ty: Type,
        aux_int: i64,
        aux: Aux,
        args: &[&str],
    ) -> &mut Self {
        let b = self.block(block);
        let v = self.f.new_value(b, op, ty, aux_int, aux, &[]);
        if self.values.insert(name.to_string(), v).is_some() {
            panic!("duplicate value name {name}");
        }
        self.args
            .push((v, args.iter().map(|s| s.to_string()).collect()));
        self
    }

    pub fn goto(&mut self, from: &str, to: &str) -> &mut Self {
        let (from, to) = (self.block(from), self.block(to));
        self.f.block_mut(from).kind = BlockKind::Plain;
        self.f.add_edge(from, to);
        self
    }

    /// `block` branches on `cond`: edge 0 to `then`, edge 1 to `els`.
    pub fn branch(&mut self, block: &str, cond: &str, then: &str, els: &str) -> &mut Self {
        let (b, t, e) = (self.block(block), self.block(then), self.block(els));
        self.f.block_mut(b).kind = BlockKind::If;
        self.f.add_edge(b, t);
        self.f.add_edge(b, e);
        self.controls.push((b, cond.to_string()));
        self
    }

    /// Mark `block` as a return whose control is the memory value `mem`.
    pub fn ret(&mut self, block: &str, mem: &str) -> &mut Self {
        let b = self.block(block);
        self.f.block_mut(b).kind = BlockKind::Ret;
        self.controls.push((b, mem.to_string()));
        self
    }

    pub fn exit(&mut self, block: &str, mem: &str) -> &mut Self {
        let b = self.block(block);
        self.f.block_mut(b).kind = BlockKind::Exit;
        self.controls.push((b, mem.to_string()));
        self
    }

    /// Resolve every deferred reference, validate the function, and hand it
    /// back along with the name table.
    pub fn finish(mut self) -> (Func, FxHashMap<String, ValueId>) {
        for (v, names) in std::mem::take(&mut self.args) {
            for name in names {
                let a = self.lookup(&name);
                self.f.add_arg(v, a);
            }
        }
        for (b, name) in std::mem::take(&mut self.controls) {
            let c = self.lookup(&name);
            self.f.set_control(b, Some(c));
        }
        if let Err(e) = check(&self.f) {
            panic!("{}: malformed test function: {e}", self.f.name);
        }
        (self.f, self.values)
    }

    fn lookup(&self, name: &str) -> ValueId {
        match self.values.get(name) {
            Some(&v) => v,
            None => panic!("undefined value {name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_references_resolve() {
        let mut b = FuncBuilder::new("t");
        b.value("entry", "mem", Op::InitMem, Type::Mem, 0, Aux::None, &[])
            .value("entry", "c0", Op::Const64, Type::Int64, 0, Aux::None, &[])
            .goto("entry", "head")
            // The phi names "sum" before it is declared.
            .value("head", "i", Op::Phi, Type::Int64, 0, Aux::None, &["c0", "sum"])
            .value("head", "c1", Op::Const64, Type::Int64, 1, Aux::None, &[])
            .value("head", "sum", Op::Add64, Type::Int64, 0, Aux::None, &["i", "c1"])
            .value("head", "c10", Op::Const64, Type::Int64, 10, Aux::None, &[])
            .value("head", "done", Op::Geq64, Type::Bool, 0, Aux::None, &["sum", "c10"])
            .branch("head", "done", "end", "head")
            .ret("end", "mem");
        let (f, names) = b.finish();

        let i = names["i"];
        assert_eq!(f.value(i).args, vec![names["c0"], names["sum"]]);
        assert_eq!(f.value(names["sum"]).uses, 2);
    }
}
