//! Dominator analysis: postorder, immediate dominators, and the dominator
//! tree with ancestor and least-common-ancestor queries.
//!
//! Immediate dominators are computed with the Cooper-Harvey-Kennedy
//! algorithm over reverse postorder. The tree is then given preorder
//! intervals so `is_ancestor_eq` answers in O(1), and per-node depths so
//! `lca` resolves by a deterministic two-finger climb. Results are dense
//! arrays indexed by block id; nothing here borrows the function after
//! construction, so passes may mutate value placement while holding a
//! `DomTree` (the CFG itself must not change).
//!
//! Reference: "A Simple, Fast Dominance Algorithm" by Cooper, Harvey,
//! Kennedy (2001).

use super::func::{BlockId, Func};

const UNDEF: u32 = u32::MAX;

/// Postorder of reachable blocks from the entry.
pub fn postorder(f: &Func) -> Vec<BlockId> {
    let mut visited = vec![false; f.num_blocks()];
    let mut post = Vec::with_capacity(f.num_blocks());

    fn dfs(f: &Func, b: BlockId, visited: &mut [bool], post: &mut Vec<BlockId>) {
        visited[b.0 as usize] = true;
        for &s in &f.block(b).succs {
            if !visited[s.0 as usize] {
                dfs(f, s, visited, post);
            }
        }
        post.push(b);
    }

    dfs(f, f.entry, &mut visited, &mut post);
    post
}

/// Reverse postorder of reachable blocks from the entry.
pub fn reverse_postorder(f: &Func) -> Vec<BlockId> {
    let mut po = postorder(f);
    po.reverse();
    po
}

/// Intersect two dominator-tree fingers using RPO numbering
/// (Cooper-Harvey-Kennedy).
fn intersect(mut finger1: u32, mut finger2: u32, idom: &[u32], rpo_number: &[u32]) -> u32 {
    while finger1 != finger2 {
        while rpo_number[finger1 as usize] > rpo_number[finger2 as usize] {
            finger1 = idom[finger1 as usize];
        }
        while rpo_number[finger2 as usize] > rpo_number[finger1 as usize] {
            finger2 = idom[finger2 as usize];
        }
    }
    finger1
}

/// Compute immediate dominators. `idom[entry] = entry`; unreachable blocks
/// get `UNDEF`.
fn compute_idom(f: &Func, rpo: &[BlockId]) -> Vec<u32> {
    let n = f.num_blocks();
    let mut rpo_number = vec![UNDEF; n];
    for (order, &b) in rpo.iter().enumerate() {
        rpo_number[b.0 as usize] = order as u32;
    }

    let mut idom = vec![UNDEF; n];
    idom[f.entry.0 as usize] = f.entry.0;

    let mut changed = true;
    while changed {
        changed = false;
        for &b in rpo.iter().skip(1) {
            let bi = b.0 as usize;

            let mut new_idom = UNDEF;
            for &p in &f.block(b).preds {
                if idom[p.0 as usize] != UNDEF {
                    new_idom = p.0;
                    break;
                }
            }
            if new_idom == UNDEF {
                continue;
            }

            for &p in &f.block(b).preds {
                if p.0 == new_idom {
                    continue;
                }
                if idom[p.0 as usize] != UNDEF {
                    new_idom = intersect(new_idom, p.0, &idom, &rpo_number);
                }
            }

            if idom[bi] != new_idom {
                idom[bi] = new_idom;
                changed = true;
            }
        }
    }

    idom
}

/// The dominator tree of a function, with O(1) ancestor queries and
/// depth-based LCA.
pub struct DomTree {
    idom: Vec<u32>,
    depth: Vec<u32>,
    /// Preorder entry/exit numbers; `a` dominates `b` iff `b`'s interval
    /// nests inside `a`'s.
    pre: Vec<u32>,
    last: Vec<u32>,
    entry: BlockId,
}

impl DomTree {
    pub fn build(f: &Func) -> Self {
        let rpo = reverse_postorder(f);
        let idom = compute_idom(f, &rpo);
        let n = f.num_blocks();

        // Children lists in stable block order, then a preorder walk.
        let mut children: Vec<Vec<u32>> = vec![Vec::new(); n];
        for b in 0..n as u32 {
            let d = idom[b as usize];
            if d != UNDEF && d != b {
                children[d as usize].push(b);
            }
        }

        let mut depth = vec![0u32; n];
        let mut pre = vec![UNDEF; n];
        let mut last = vec![0u32; n];
        let mut counter = 0u32;
        // Explicit stack of (block, next-child-index).
        let mut stack: Vec<(u32, usize)> = vec![(f.entry.0, 0)];
        pre[f.entry.0 as usize] = counter;
        counter += 1;
        while let Some(&mut (b, ref mut ci)) = stack.last_mut() {
            if *ci < children[b as usize].len() {
                let c = children[b as usize][*ci];
                *ci += 1;
                depth[c as usize] = depth[b as usize] + 1;
                pre[c as usize] = counter;
                counter += 1;
                stack.push((c, 0));
            } else {
                last[b as usize] = counter;
                stack.pop();
            }
        }

        DomTree { idom, depth, pre, last, entry: f.entry }
    }

    /// Immediate dominator of `b`; `None` for the entry and for
    /// unreachable blocks.
    pub fn idom(&self, b: BlockId) -> Option<BlockId> {
        let d = self.idom[b.0 as usize];
        if d == UNDEF || d == b.0 {
            return None;
        }
        Some(BlockId(d))
    }

    pub fn is_reachable(&self, b: BlockId) -> bool {
        self.pre[b.0 as usize] != UNDEF
    }

    /// Does `a` dominate `b` (inclusive: every block dominates itself)?
    pub fn is_ancestor_eq(&self, a: BlockId, b: BlockId) -> bool {
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }
        let (ai, bi) = (a.0 as usize, b.0 as usize);
        self.pre[ai] <= self.pre[bi] && self.pre[bi] < self.last[ai]
    }

    /// Depth of `b` in the dominator tree (entry = 0).
    pub fn depth(&self, b: BlockId) -> u32 {
        self.depth[b.0 as usize]
    }

    /// Least common ancestor of `a` and `b` in the dominator tree: the
    /// deepest block dominating both.
    pub fn lca(&self, a: BlockId, b: BlockId) -> BlockId {
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return self.entry;
        }
        let mut x = a.0;
        let mut y = b.0;
        while self.depth[x as usize] > self.depth[y as usize] {
            x = self.idom[x as usize];
        }
        while self.depth[y as usize] > self.depth[x as usize] {
            y = self.idom[y as usize];
        }
        while x != y {
            x = self.idom[x as usize];
            y = self.idom[y as usize];
        }
        BlockId(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::func::BlockKind;

    /// entry -> (left | right) -> join -> exit
    fn diamond() -> (Func, BlockId, BlockId, BlockId, BlockId, BlockId) {
        let mut f = Func::new("diamond");
        let entry = f.entry;
        let left = f.add_block(BlockKind::Plain);
        let right = f.add_block(BlockKind::Plain);
        let join = f.add_block(BlockKind::Plain);
        let exit = f.add_block(BlockKind::Ret);
        f.block_mut(entry).kind = BlockKind::If;
        f.add_edge(entry, left);
        f.add_edge(entry, right);
        f.add_edge(left, join);
        f.add_edge(right, join);
        f.add_edge(join, exit);
        (f, entry, left, right, join, exit)
    }

    #[test]
    fn idom_of_diamond() {
        let (f, entry, left, right, join, exit) = diamond();
        let dom = DomTree::build(&f);
        assert_eq!(dom.idom(entry), None);
        assert_eq!(dom.idom(left), Some(entry));
        assert_eq!(dom.idom(right), Some(entry));
        assert_eq!(dom.idom(join), Some(entry));
        assert_eq!(dom.idom(exit), Some(join));
    }

    #[test]
    fn ancestor_queries() {
        let (f, entry, left, right, join, exit) = diamond();
        let dom = DomTree::build(&f);
        assert!(dom.is_ancestor_eq(entry, exit));
        assert!(dom.is_ancestor_eq(join, join));
        assert!(dom.is_ancestor_eq(join, exit));
        assert!(!dom.is_ancestor_eq(left, join));
        assert!(!dom.is_ancestor_eq(left, right));
    }

    #[test]
    fn lca_queries() {
        let (f, entry, left, right, join, exit) = diamond();
        let dom = DomTree::build(&f);
        assert_eq!(dom.lca(left, right), entry);
        assert_eq!(dom.lca(left, exit), entry);
        assert_eq!(dom.lca(join, exit), join);
        assert_eq!(dom.lca(exit, exit), exit);
    }

    #[test]
    fn postorder_ends_at_entry() {
        let (f, entry, ..) = diamond();
        let po = postorder(&f);
        assert_eq!(po.len(), 5);
        assert_eq!(*po.last().unwrap(), entry);
        let rpo = reverse_postorder(&f);
        assert_eq!(rpo[0], entry);
    }

    #[test]
    fn loop_dominators() {
        // entry -> head <-> body, head -> exit
        let mut f = Func::new("looped");
        let entry = f.entry;
        let head = f.add_block(BlockKind::If);
        let body = f.add_block(BlockKind::Plain);
        let exit = f.add_block(BlockKind::Ret);
        f.add_edge(entry, head);
        f.add_edge(head, body);
        f.add_edge(head, exit);
        f.add_edge(body, head);
        let dom = DomTree::build(&f);
        assert_eq!(dom.idom(head), Some(entry));
        assert_eq!(dom.idom(body), Some(head));
        assert_eq!(dom.idom(exit), Some(head));
        assert!(dom.is_ancestor_eq(head, body));
        assert!(!dom.is_ancestor_eq(body, head));
    }
}
