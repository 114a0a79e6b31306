//! Basic-block graph over structured IR, with per-block liveness actions.
//!
//! Each reachable `LocalGet`/`LocalSet` contributes exactly one action in
//! exactly one block. Gets and sets in unreachable positions contribute no
//! action and are locally neutralized during construction, so later
//! rewrites never chase stale handles.

use crate::declare_entity;
use crate::entity::EntityVec;
use crate::ir::effects::EffectAnalyzer;
use crate::ir::{Expr, ExprData, FunctionBody, Literal, LocalId, Name};
use crate::support::SortedVec;
use fxhash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::collections::BTreeSet;

declare_entity!(BasicBlock, "bb");

/// A set of local indices, stored sorted for cheap merges.
pub type IndexSet = SortedVec<LocalId>;

/// A set of `LocalSet` nodes. Ordered by arena id so iteration is
/// deterministic.
pub type SetSet = BTreeSet<Expr>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionKind {
    Get,
    Set,
    /// A neutralized position; holds no valid index.
    Other,
}

/// A liveness-relevant action: a local read, a local write, or a position
/// that used to be one.
#[derive(Clone, Copy, Debug)]
pub struct LivenessAction {
    pub kind: ActionKind,
    pub index: LocalId,
    /// Arena id of the get/set. Overwriting this slot rewrites the IR in
    /// place wherever the node is referenced.
    pub origin: Expr,
}

impl LivenessAction {
    pub fn is_get(&self) -> bool {
        self.kind == ActionKind::Get
    }

    pub fn is_set(&self) -> bool {
        self.kind == ActionKind::Set
    }

    pub fn get_get(&self) -> Option<Expr> {
        self.is_get().then_some(self.origin)
    }

    pub fn get_set(&self) -> Option<Expr> {
        self.is_set().then_some(self.origin)
    }

    /// Neutralize a set that is known to be unneeded, updating both the IR
    /// and this action. A tee is replaced by its value; a plain set becomes
    /// a drop of its value if the value has side effects, else a nop.
    pub fn remove_set(&mut self, body: &mut FunctionBody) {
        assert_eq!(self.kind, ActionKind::Set, "removeSet on a non-set action");
        let (value, tee) = match &body.exprs[self.origin] {
            &ExprData::LocalSet { value, ty, .. } => (value, ty.is_concrete()),
            other => panic!(
                "IR violation: set action origin is {:?} in {}",
                other, body.name
            ),
        };
        if tee {
            body.exprs[self.origin] = body.exprs[value].clone();
        } else if EffectAnalyzer::new(body, value).has_side_effects() {
            body.replace(self.origin, ExprData::Drop { value });
        } else {
            body.nop_out(self.origin);
        }
        // Even if the origin became a get, that get already has its own
        // action; this one is done.
        self.kind = ActionKind::Other;
    }
}

#[derive(Clone, Debug, Default)]
pub struct BlockData {
    pub actions: Vec<LivenessAction>,
    pub preds: SmallVec<[BasicBlock; 4]>,
    pub succs: SmallVec<[BasicBlock; 4]>,
    /// Live local indices at block start/end, filled in by liveness.
    pub start_indexes: IndexSet,
    pub end_indexes: IndexSet,
    /// Live `LocalSet`s at block start/end, filled in by liveness.
    pub start_sets: SetSet,
    pub end_sets: SetSet,
}

#[derive(Clone, Debug)]
pub struct Cfg {
    pub blocks: EntityVec<BasicBlock, BlockData>,
    pub entry: BasicBlock,
    /// Targets of labelled back-edges, in discovery order. A loop top's
    /// first predecessor is the initial-entry edge; later ones arrive from
    /// back-edges.
    pub loop_tops: Vec<BasicBlock>,
    /// Edges that close a loop, recorded during construction.
    pub back_edges: FxHashSet<(BasicBlock, BasicBlock)>,
    /// Blocks reachable from the entry.
    pub live_blocks: FxHashSet<BasicBlock>,
}

impl Cfg {
    /// Build the block graph for a function, neutralizing unreachable
    /// gets/sets as a side effect.
    pub fn build(body: &mut FunctionBody) -> Cfg {
        let mut builder = CfgBuilder {
            body,
            blocks: EntityVec::default(),
            curr: None,
            branches: FxHashMap::default(),
            loop_targets: FxHashMap::default(),
            loop_tops: vec![],
            back_edges: FxHashSet::default(),
        };
        let entry = builder.add_block();
        builder.curr = Some(entry);
        let root = builder.body.body;
        builder.walk(root);
        debug_assert!(
            builder.branches.is_empty(),
            "branch to a label with no enclosing block"
        );
        debug_assert!(builder.loop_targets.is_empty());

        let mut cfg = Cfg {
            blocks: builder.blocks,
            entry,
            loop_tops: builder.loop_tops,
            back_edges: builder.back_edges,
            live_blocks: FxHashSet::default(),
        };
        cfg.live_blocks = cfg.find_live_blocks();
        cfg.unlink_dead_blocks();
        cfg
    }

    pub fn is_live(&self, block: BasicBlock) -> bool {
        self.live_blocks.contains(&block)
    }

    /// Live blocks in id order (deterministic).
    pub fn live_block_ids(&self) -> impl Iterator<Item = BasicBlock> + '_ {
        self.blocks.iter().filter(|b| self.is_live(*b))
    }

    fn find_live_blocks(&self) -> FxHashSet<BasicBlock> {
        let mut live = FxHashSet::default();
        let mut stack = vec![self.entry];
        while let Some(block) = stack.pop() {
            if !live.insert(block) {
                continue;
            }
            for &succ in &self.blocks[block].succs {
                stack.push(succ);
            }
        }
        live
    }

    /// Drop edges to and from dead blocks, so their stores never look
    /// effective to the flows.
    fn unlink_dead_blocks(&mut self) {
        let live = self.live_blocks.clone();
        for block in self.blocks.iter() {
            let data = &mut self.blocks[block];
            if !live.contains(&block) {
                data.preds.clear();
                data.succs.clear();
            } else {
                data.preds.retain(|p| live.contains(p));
                data.succs.retain(|s| live.contains(s));
            }
        }
    }
}

struct CfgBuilder<'a> {
    body: &'a mut FunctionBody,
    blocks: EntityVec<BasicBlock, BlockData>,
    /// The block currently receiving actions; `None` in unreachable code.
    curr: Option<BasicBlock>,
    /// Pending branch sources per block label, linked when the label's
    /// scope ends.
    branches: FxHashMap<Name, Vec<BasicBlock>>,
    /// In-scope loop headers; a branch to one is a back-edge.
    loop_targets: FxHashMap<Name, BasicBlock>,
    loop_tops: Vec<BasicBlock>,
    back_edges: FxHashSet<(BasicBlock, BasicBlock)>,
}

impl<'a> CfgBuilder<'a> {
    fn add_block(&mut self) -> BasicBlock {
        self.blocks.push(BlockData::default())
    }

    fn link(&mut self, from: BasicBlock, to: BasicBlock) {
        self.blocks[from].succs.push(to);
        self.blocks[to].preds.push(from);
    }

    fn push_action(&mut self, kind: ActionKind, index: LocalId, origin: Expr) {
        let block = self.curr.expect("action pushed in unreachable code");
        self.blocks[block]
            .actions
            .push(LivenessAction {
                kind,
                index,
                origin,
            });
    }

    fn branch_to(&mut self, from: BasicBlock, name: &Name) {
        if let Some(&top) = self.loop_targets.get(name) {
            self.link(from, top);
            self.back_edges.insert((from, top));
        } else {
            self.branches.entry(name.clone()).or_default().push(from);
        }
    }

    fn walk(&mut self, e: Expr) {
        match self.body.exprs[e].clone() {
            ExprData::Block { name, list, .. } => {
                for c in list {
                    self.walk(c);
                }
                if let Some(name) = name {
                    if let Some(sources) = self.branches.remove(&name) {
                        let after = self.add_block();
                        if let Some(curr) = self.curr {
                            self.link(curr, after);
                        }
                        for source in sources {
                            self.link(source, after);
                        }
                        self.curr = Some(after);
                    }
                }
            }
            ExprData::Loop { name, body, .. } => {
                let top = self.add_block();
                if let Some(curr) = self.curr {
                    self.link(curr, top);
                }
                self.loop_tops.push(top);
                if let Some(name) = &name {
                    self.loop_targets.insert(name.clone(), top);
                }
                self.curr = Some(top);
                self.walk(body);
                if let Some(name) = &name {
                    self.loop_targets.remove(name);
                }
            }
            ExprData::If {
                condition,
                if_true,
                if_false,
                ..
            } => {
                self.walk(condition);
                let pre = self.curr;
                let true_block = self.add_block();
                if let Some(pre) = pre {
                    self.link(pre, true_block);
                }
                self.curr = Some(true_block);
                self.walk(if_true);
                let true_end = self.curr;
                let false_end = match if_false {
                    Some(if_false) => {
                        let false_block = self.add_block();
                        if let Some(pre) = pre {
                            self.link(pre, false_block);
                        }
                        self.curr = Some(false_block);
                        self.walk(if_false);
                        self.curr
                    }
                    None => pre,
                };
                let join = self.add_block();
                if let Some(true_end) = true_end {
                    self.link(true_end, join);
                }
                if let Some(false_end) = false_end {
                    self.link(false_end, join);
                }
                self.curr = Some(join);
            }
            ExprData::Break {
                name,
                condition,
                value,
            } => {
                if let Some(value) = value {
                    self.walk(value);
                }
                if let Some(condition) = condition {
                    self.walk(condition);
                }
                let Some(curr) = self.curr else { return };
                self.branch_to(curr, &name);
                if condition.is_some() {
                    let cont = self.add_block();
                    self.link(curr, cont);
                    self.curr = Some(cont);
                } else {
                    self.curr = None;
                }
            }
            ExprData::Switch {
                targets,
                default,
                condition,
                value,
            } => {
                if let Some(value) = value {
                    self.walk(value);
                }
                self.walk(condition);
                if let Some(curr) = self.curr {
                    let mut seen = FxHashSet::default();
                    for name in targets.iter().chain(std::iter::once(&default)) {
                        if seen.insert(name.clone()) {
                            self.branch_to(curr, name);
                        }
                    }
                }
                self.curr = None;
            }
            ExprData::Return { value } => {
                if let Some(value) = value {
                    self.walk(value);
                }
                self.curr = None;
            }
            ExprData::Unreachable => {
                self.curr = None;
            }
            ExprData::LocalGet { index, ty } => {
                if self.curr.is_none() {
                    // Unreachable position; leave a same-typed placeholder.
                    self.body.exprs[e] = ExprData::Const {
                        value: Literal::zero(ty),
                    };
                    return;
                }
                self.push_action(ActionKind::Get, index, e);
            }
            ExprData::LocalSet { index, value, ty } => {
                self.walk(value);
                if self.curr.is_none() {
                    if ty.is_concrete() {
                        self.body.exprs[e] = self.body.exprs[value].clone();
                    } else {
                        self.body.exprs[e] = ExprData::Drop { value };
                    }
                    return;
                }
                self.push_action(ActionKind::Set, index, e);
            }
            data => {
                let mut children = SmallVec::<[Expr; 4]>::new();
                data.visit_children(|c| children.push(c));
                for c in children {
                    self.walk(c);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Type;

    fn count_actions(cfg: &Cfg, kind: ActionKind) -> usize {
        cfg.blocks
            .values()
            .map(|b| b.actions.iter().filter(|a| a.kind == kind).count())
            .sum()
    }

    #[test]
    fn straight_line_single_block() {
        let mut f = FunctionBody::new("f", vec![Type::I32], Type::None);
        let x = f.add_var(Type::I32);
        let g = f.local_get(0);
        let s = f.local_set(x, g);
        let g2 = f.local_get(x);
        let d = f.drop_(g2);
        let body = f.block(vec![s, d]);
        f.body = body;
        let cfg = Cfg::build(&mut f);
        assert_eq!(cfg.live_blocks.len(), 1);
        assert_eq!(count_actions(&cfg, ActionKind::Get), 2);
        assert_eq!(count_actions(&cfg, ActionKind::Set), 1);
    }

    #[test]
    fn loop_top_records_back_edge() {
        // (loop $l (br_if $l (i32.const 1)))
        let mut f = FunctionBody::new("f", vec![], Type::None);
        let c = f.i32_const(1);
        let br = f.br_if("l", c);
        let l = f.loop_("l", br);
        f.body = l;
        let cfg = Cfg::build(&mut f);
        assert_eq!(cfg.loop_tops.len(), 1);
        let top = cfg.loop_tops[0];
        assert!(cfg.back_edges.iter().any(|&(_, to)| to == top));
        // First pred of the loop top is the entry edge, not the back-edge.
        let first_pred = cfg.blocks[top].preds[0];
        assert!(!cfg.back_edges.contains(&(first_pred, top)));
    }

    #[test]
    fn code_after_br_is_neutralized() {
        // (block $b (br $b) (drop (local.get 0)))
        let mut f = FunctionBody::new("f", vec![Type::I32], Type::None);
        let br = f.br("b");
        let g = f.local_get(0);
        let d = f.drop_(g);
        let b = f.named_block("b", vec![br, d]);
        f.body = b;
        let cfg = Cfg::build(&mut f);
        assert_eq!(count_actions(&cfg, ActionKind::Get), 0);
        // The get became a constant placeholder of the same type.
        assert!(matches!(
            f.exprs[g],
            ExprData::Const {
                value: Literal::I32(0)
            }
        ));
    }

    #[test]
    fn if_join_merges_both_arms() {
        let mut f = FunctionBody::new("f", vec![Type::I32], Type::None);
        let x = f.add_var(Type::I32);
        let c = f.local_get(0);
        let one = f.i32_const(1);
        let t = f.local_set(x, one);
        let two = f.i32_const(2);
        let e = f.local_set(x, two);
        let iff = f.if_(c, t, Some(e));
        let g = f.local_get(x);
        let d = f.drop_(g);
        let body = f.block(vec![iff, d]);
        f.body = body;
        let cfg = Cfg::build(&mut f);
        // entry, true, false, join
        assert_eq!(cfg.live_blocks.len(), 4);
        let join_gets: Vec<_> = cfg
            .blocks
            .values()
            .filter(|b| b.preds.len() == 2)
            .collect();
        assert_eq!(join_gets.len(), 1);
    }
}
