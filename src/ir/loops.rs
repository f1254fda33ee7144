//! Natural-loop detection and the loop nest.
//!
//! A back edge is an edge whose target dominates its source; the natural
//! loop of a header is the header plus every block that reaches one of its
//! latches without passing through the header. Loops sharing a header are
//! merged. Depth counts enclosing loops, so a top-level loop has depth 1
//! and straight-line code has depth 0.

use super::analysis::DomTree;
use super::func::{BlockId, Func};

/// One merged natural loop.
#[derive(Debug)]
pub struct Loop {
    pub header: BlockId,
    /// Blocks in the loop, in ascending block order.
    pub body: Vec<BlockId>,
    /// Nesting depth; 1 for an outermost loop.
    pub depth: u32,
}

/// The function's loop nest: every natural loop plus a per-block map to the
/// innermost enclosing loop.
pub struct LoopNest {
    pub loops: Vec<Loop>,
    /// Innermost loop index per block, `usize::MAX` when not in a loop.
    b2l: Vec<usize>,
}

const NO_LOOP: usize = usize::MAX;

impl LoopNest {
    pub fn build(f: &Func, dom: &DomTree) -> Self {
        let n = f.num_blocks();

        // Collect latches per header, in stable block order.
        let mut headers: Vec<BlockId> = Vec::new();
        let mut latches: Vec<Vec<BlockId>> = Vec::new();
        for b in f.block_ids() {
            for &s in &f.block(b).succs {
                if dom.is_ancestor_eq(s, b) {
                    match headers.iter().position(|&h| h == s) {
                        Some(i) => latches[i].push(b),
                        None => {
                            headers.push(s);
                            latches.push(vec![b]);
                        }
                    }
                }
            }
        }

        // Grow each loop body backward from its latches.
        let mut loops: Vec<Loop> = Vec::with_capacity(headers.len());
        let mut in_body = vec![false; n];
        for (i, &h) in headers.iter().enumerate() {
            in_body.iter_mut().for_each(|x| *x = false);
            in_body[h.0 as usize] = true;
            // A latch equal to the header (a self-loop) must not seed the
            // walk, or the header's own predecessors get pulled in.
            let mut work: Vec<BlockId> =
                latches[i].iter().copied().filter(|&l| l != h).collect();
            for &l in &work {
                in_body[l.0 as usize] = true;
            }
            while let Some(b) = work.pop() {
                for &p in &f.block(b).preds {
                    if !in_body[p.0 as usize] {
                        in_body[p.0 as usize] = true;
                        work.push(p);
                    }
                }
            }
            let body: Vec<BlockId> = (0..n as u32)
                .map(BlockId)
                .filter(|b| in_body[b.0 as usize])
                .collect();
            loops.push(Loop { header: h, body, depth: 0 });
        }

        // Depth of a loop = number of loops whose body contains its header
        // (including itself).
        let contains = |l: &Loop, b: BlockId| l.body.binary_search(&b).is_ok();
        for i in 0..loops.len() {
            let h = loops[i].header;
            let depth = loops.iter().filter(|l| contains(l, h)).count() as u32;
            loops[i].depth = depth;
        }

        // Innermost loop per block: the enclosing loop with the smallest
        // body; ties broken by discovery order for reproducibility.
        let mut b2l = vec![NO_LOOP; n];
        for b in (0..n as u32).map(BlockId) {
            let mut best = NO_LOOP;
            for (i, l) in loops.iter().enumerate() {
                if contains(l, b) && (best == NO_LOOP || l.body.len() < loops[best].body.len()) {
                    best = i;
                }
            }
            b2l[b.0 as usize] = best;
        }

        LoopNest { loops, b2l }
    }

    /// Index of the innermost loop containing `b`, if any.
    pub fn innermost(&self, b: BlockId) -> Option<usize> {
        let i = self.b2l[b.0 as usize];
        if i == NO_LOOP {
            None
        } else {
            Some(i)
        }
    }

    /// Loop depth of `b`; 0 outside any loop.
    pub fn depth(&self, b: BlockId) -> u32 {
        match self.innermost(b) {
            Some(i) => self.loops[i].depth,
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::func::BlockKind;

    #[test]
    fn single_loop() {
        // entry -> head; head -> body -> head; head -> exit
        let mut f = Func::new("t");
        let entry = f.entry;
        let head = f.add_block(BlockKind::If);
        let body = f.add_block(BlockKind::Plain);
        let exit = f.add_block(BlockKind::Ret);
        f.add_edge(entry, head);
        f.add_edge(head, body);
        f.add_edge(head, exit);
        f.add_edge(body, head);

        let dom = DomTree::build(&f);
        let loops = LoopNest::build(&f, &dom);
        assert_eq!(loops.loops.len(), 1);
        assert_eq!(loops.loops[0].header, head);
        assert_eq!(loops.depth(head), 1);
        assert_eq!(loops.depth(body), 1);
        assert_eq!(loops.depth(entry), 0);
        assert_eq!(loops.depth(exit), 0);
    }

    #[test]
    fn nested_loops() {
        // entry -> outer; outer -> inner; inner -> inner (self loop);
        // inner -> outer (outer latch); outer -> exit
        let mut f = Func::new("t");
        let entry = f.entry;
        let outer = f.add_block(BlockKind::If);
        let inner = f.add_block(BlockKind::If);
        let exit = f.add_block(BlockKind::Ret);
        f.add_edge(entry, outer);
        f.add_edge(outer, inner);
        f.add_edge(outer, exit);
        f.add_edge(inner, inner);
        f.add_edge(inner, outer);

        let dom = DomTree::build(&f);
        let loops = LoopNest::build(&f, &dom);
        assert_eq!(loops.loops.len(), 2);
        assert_eq!(loops.depth(outer), 1);
        assert_eq!(loops.depth(inner), 2);
        let li = loops.innermost(inner).unwrap();
        assert_eq!(loops.loops[li].header, inner);
    }

    #[test]
    fn self_loop_body_is_just_the_header() {
        // entry -> head; head -> head; head -> exit
        let mut f = Func::new("t");
        let entry = f.entry;
        let head = f.add_block(BlockKind::If);
        let exit = f.add_block(BlockKind::Ret);
        f.add_edge(entry, head);
        f.add_edge(head, head);
        f.add_edge(head, exit);

        let dom = DomTree::build(&f);
        let loops = LoopNest::build(&f, &dom);
        assert_eq!(loops.loops.len(), 1);
        assert_eq!(loops.loops[0].body, vec![head]);
        assert_eq!(loops.depth(entry), 0);
        assert_eq!(loops.depth(head), 1);
        assert_eq!(loops.depth(exit), 0);
    }

    #[test]
    fn merged_latches_one_loop() {
        // Two back edges to the same header form one loop.
        let mut f = Func::new("t");
        let entry = f.entry;
        let head = f.add_block(BlockKind::If);
        let a = f.add_block(BlockKind::If);
        let b = f.add_block(BlockKind::Plain);
        let exit = f.add_block(BlockKind::Ret);
        f.add_edge(entry, head);
        f.add_edge(head, a);
        f.add_edge(head, exit);
        f.add_edge(a, head);
        f.add_edge(a, b);
        f.add_edge(b, head);

        let dom = DomTree::build(&f);
        let loops = LoopNest::build(&f, &dom);
        assert_eq!(loops.loops.len(), 1);
        assert_eq!(loops.depth(a), 1);
        assert_eq!(loops.depth(b), 1);
    }
}
