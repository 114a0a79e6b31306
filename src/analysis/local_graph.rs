//! Reaching definitions for locals: the sets each get may observe.
//!
//! `None` in a def set stands for the value a local has with no explicit
//! write reaching: the implicit zero-init for a variable, or the incoming
//! argument for a parameter.

use crate::cfg::{BasicBlock, Cfg};
use crate::entity::PerEntity;
use crate::ir::{Expr, ExprData, FunctionBody, LocalId};
use crate::support::WorkList;
use fxhash::{FxHashMap, FxHashSet};
use std::collections::BTreeSet;

pub type DefSet = BTreeSet<Option<Expr>>;

#[derive(Debug, Default)]
pub struct LocalGraph {
    /// For each `LocalGet`, the sets that may reach it.
    pub get_setses: FxHashMap<Expr, DefSet>,
    /// Transpose: for each `LocalSet`, the gets it may reach.
    pub set_influences: FxHashMap<Expr, BTreeSet<Expr>>,
    /// All gets and sets in block/action order.
    pub gets: Vec<Expr>,
    pub sets: Vec<Expr>,
    ssa_indexes: FxHashSet<LocalId>,
}

impl LocalGraph {
    pub fn new(body: &mut FunctionBody) -> LocalGraph {
        let cfg = Cfg::build(body);
        Self::from_cfg(body, &cfg)
    }

    pub fn from_cfg(body: &FunctionBody, cfg: &Cfg) -> LocalGraph {
        let num_locals = body.num_locals();
        let mut graph = LocalGraph::default();

        // Reaching-def state at each block end; block-entry state is the
        // union of predecessor ends, with the entry block seeded with the
        // implicit defs.
        let mut block_out: PerEntity<BasicBlock, Vec<DefSet>> = PerEntity::default();
        let empty_state = || vec![DefSet::new(); num_locals];

        let mut work: WorkList<BasicBlock> = WorkList::new();
        work.push(cfg.entry);
        for block in cfg.live_block_ids() {
            work.push(block);
        }
        while let Some(block) = work.pop() {
            if !cfg.is_live(block) {
                continue;
            }
            let mut state = empty_state();
            if block == cfg.entry {
                for local in state.iter_mut() {
                    local.insert(None);
                }
            }
            for &pred in &cfg.blocks[block].preds {
                for (index, defs) in block_out[pred].iter().enumerate() {
                    state[index].extend(defs.iter().copied());
                }
            }
            for action in &cfg.blocks[block].actions {
                if let Some(set) = action.get_set() {
                    let defs = &mut state[action.index as usize];
                    defs.clear();
                    defs.insert(Some(set));
                }
            }
            if block_out[block] != state {
                block_out[block] = state;
                for &succ in &cfg.blocks[block].succs {
                    work.push(succ);
                }
            }
        }

        // Final pass: record what each get observes.
        for block in cfg.live_block_ids() {
            let mut state = empty_state();
            if block == cfg.entry {
                for local in state.iter_mut() {
                    local.insert(None);
                }
            }
            for &pred in &cfg.blocks[block].preds {
                for (index, defs) in block_out[pred].iter().enumerate() {
                    state[index].extend(defs.iter().copied());
                }
            }
            for action in &cfg.blocks[block].actions {
                if let Some(set) = action.get_set() {
                    let defs = &mut state[action.index as usize];
                    defs.clear();
                    defs.insert(Some(set));
                    graph.sets.push(set);
                } else if let Some(get) = action.get_get() {
                    graph
                        .get_setses
                        .insert(get, state[action.index as usize].clone());
                    graph.gets.push(get);
                }
            }
        }
        graph
    }

    pub fn compute_influences(&mut self) {
        for (&get, defs) in &self.get_setses {
            for def in defs {
                if let Some(set) = def {
                    self.set_influences.entry(*set).or_default().insert(get);
                }
            }
        }
    }

    /// An index behaves as SSA when it has exactly one written set and every
    /// get of it observes exactly that set.
    pub fn compute_ssa_indexes(&mut self, body: &FunctionBody) {
        let mut num_sets: FxHashMap<LocalId, (usize, Expr)> = FxHashMap::default();
        for &set in &self.sets {
            let index = match &body.exprs[set] {
                ExprData::LocalSet { index, .. } => *index,
                _ => unreachable!(),
            };
            let entry = num_sets.entry(index).or_insert((0, set));
            entry.0 += 1;
            entry.1 = set;
        }
        let mut bad: FxHashSet<LocalId> = FxHashSet::default();
        for &get in &self.gets {
            let index = match &body.exprs[get] {
                ExprData::LocalGet { index, .. } => *index,
                _ => unreachable!(),
            };
            let defs = &self.get_setses[&get];
            let single = match num_sets.get(&index) {
                Some(&(1, set)) => defs.len() == 1 && defs.contains(&Some(set)),
                _ => false,
            };
            if !single {
                bad.insert(index);
            }
        }
        for (&index, &(count, _)) in &num_sets {
            if count == 1 && !bad.contains(&index) {
                self.ssa_indexes.insert(index);
            }
        }
    }

    pub fn is_ssa(&self, index: LocalId) -> bool {
        self.ssa_indexes.contains(&index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Type;

    #[test]
    fn get_sees_its_single_set() {
        let mut f = FunctionBody::new("f", vec![], Type::None);
        let x = f.add_var(Type::I32);
        let c = f.i32_const(1);
        let s = f.local_set(x, c);
        let g = f.local_get(x);
        let d = f.drop_(g);
        let b = f.block(vec![s, d]);
        f.body = b;
        let mut graph = LocalGraph::new(&mut f);
        graph.compute_ssa_indexes(&f);
        assert_eq!(graph.get_setses[&g], [Some(s)].into_iter().collect());
        assert!(graph.is_ssa(x));
    }

    #[test]
    fn merge_of_two_sets() {
        let mut f = FunctionBody::new("f", vec![Type::I32], Type::None);
        let x = f.add_var(Type::I32);
        let cond = f.local_get(0);
        let one = f.i32_const(1);
        let s1 = f.local_set(x, one);
        let two = f.i32_const(2);
        let s2 = f.local_set(x, two);
        let iff = f.if_(cond, s1, Some(s2));
        let g = f.local_get(x);
        let d = f.drop_(g);
        let b = f.block(vec![iff, d]);
        f.body = b;
        let mut graph = LocalGraph::new(&mut f);
        graph.compute_ssa_indexes(&f);
        assert_eq!(graph.get_setses[&g], [Some(s1), Some(s2)].into_iter().collect());
        assert!(!graph.is_ssa(x));
    }

    #[test]
    fn unwritten_var_reaches_bottom() {
        let mut f = FunctionBody::new("f", vec![], Type::None);
        let x = f.add_var(Type::I32);
        let g = f.local_get(x);
        let d = f.drop_(g);
        f.body = d;
        let graph = LocalGraph::new(&mut f);
        assert_eq!(graph.get_setses[&g], [None].into_iter().collect());
    }
}
