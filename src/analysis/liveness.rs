//! Liveness of local indices and of individual sets.
//!
//! Two phases over an already-built `Cfg`:
//!
//! 1. Index liveness: a backward fixed point over blocks. Start/end sets
//!    grow monotonically in a finite lattice, so it converges in
//!    O(blocks * locals) steps.
//! 2. Set liveness: each block's last set per index is live at the block
//!    end iff its index is; live sets are then flooded forward until a
//!    block that already saw them, overwrites their index, or no longer
//!    has the index live.

use crate::cfg::{BasicBlock, Cfg, IndexSet};
use crate::entity::PerEntity;
use crate::support::WorkList;
use fxhash::FxHashMap;

pub fn compute_liveness(cfg: &mut Cfg) {
    flow_index_liveness(cfg);
    flow_set_liveness(cfg);
}

fn flow_index_liveness(cfg: &mut Cfg) {
    let mut work: WorkList<BasicBlock> = WorkList::new();
    for block in cfg.live_block_ids() {
        work.push(block);
    }
    while let Some(block) = work.pop() {
        let succs = cfg.blocks[block].succs.clone();
        let mut end = IndexSet::new();
        for succ in succs {
            end = end.merge(&cfg.blocks[succ].start_indexes);
        }
        let mut live = end.clone();
        for action in cfg.blocks[block].actions.iter().rev() {
            if action.is_get() {
                live.insert(action.index);
            } else if action.is_set() {
                live.erase(action.index);
            }
        }
        cfg.blocks[block].end_indexes = end;
        if live != cfg.blocks[block].start_indexes {
            cfg.blocks[block].start_indexes = live;
            let preds = cfg.blocks[block].preds.clone();
            for pred in preds {
                work.push(pred);
            }
        }
    }
}

fn flow_set_liveness(cfg: &mut Cfg) {
    // Which indices each block writes; a set flows through a block only if
    // the block does not overwrite its index.
    let mut set_in_block: PerEntity<BasicBlock, IndexSet> = PerEntity::default();
    for block in cfg.live_block_ids().collect::<Vec<_>>() {
        for action in &cfg.blocks[block].actions {
            if action.is_set() {
                set_in_block[block].insert(action.index);
            }
        }
    }

    // Seed each block's end with its last set per index, where live.
    for block in cfg.live_block_ids().collect::<Vec<_>>() {
        let mut last_set_per_index = FxHashMap::default();
        for action in &cfg.blocks[block].actions {
            if let Some(set) = action.get_set() {
                last_set_per_index.insert(action.index, set);
            }
        }
        let data = &mut cfg.blocks[block];
        for (index, set) in last_set_per_index {
            if data.end_indexes.has(index) {
                data.end_sets.insert(set);
            }
        }
    }

    // Flood each live set forward.
    for block in cfg.live_block_ids().collect::<Vec<_>>() {
        let flows: Vec<_> = cfg.blocks[block]
            .actions
            .iter()
            .filter_map(|a| a.get_set().map(|s| (s, a.index)))
            .filter(|(s, _)| cfg.blocks[block].end_sets.contains(s))
            .collect();
        for (set, index) in flows {
            let mut queue: WorkList<BasicBlock> = WorkList::new();
            for &succ in &cfg.blocks[block].succs {
                queue.push(succ);
            }
            while let Some(curr) = queue.pop() {
                if !cfg.blocks[curr].start_sets.insert(set) {
                    continue;
                }
                if set_in_block[curr].has(index) {
                    continue;
                }
                if !cfg.blocks[curr].end_indexes.has(index) {
                    continue;
                }
                // Made it all the way through.
                cfg.blocks[curr].end_sets.insert(set);
                let succs = cfg.blocks[curr].succs.clone();
                for succ in succs {
                    queue.push(succ);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionBody, Type};

    #[test]
    fn get_makes_index_live_at_start() {
        let mut f = FunctionBody::new("f", vec![Type::I32], Type::None);
        let g = f.local_get(0);
        let d = f.drop_(g);
        f.body = d;
        let mut cfg = Cfg::build(&mut f);
        compute_liveness(&mut cfg);
        assert!(cfg.blocks[cfg.entry].start_indexes.has(0));
        assert!(!cfg.blocks[cfg.entry].end_indexes.has(0));
    }

    #[test]
    fn set_kills_liveness_above_it() {
        let mut f = FunctionBody::new("f", vec![], Type::None);
        let x = f.add_var(Type::I32);
        let c = f.i32_const(3);
        let s = f.local_set(x, c);
        let g = f.local_get(x);
        let d = f.drop_(g);
        let b = f.block(vec![s, d]);
        f.body = b;
        let mut cfg = Cfg::build(&mut f);
        compute_liveness(&mut cfg);
        assert!(!cfg.blocks[cfg.entry].start_indexes.has(x));
    }

    #[test]
    fn set_flows_through_loop_boundary() {
        // (local.set $x ...) (loop $l (drop (local.get $x)) (br_if $l ...))
        let mut f = FunctionBody::new("f", vec![], Type::None);
        let x = f.add_var(Type::I32);
        let zero = f.i32_const(0);
        let s = f.local_set(x, zero);
        let g = f.local_get(x);
        let d = f.drop_(g);
        let one = f.i32_const(1);
        let br = f.br_if("l", one);
        let loop_body = f.block(vec![d, br]);
        let l = f.loop_("l", loop_body);
        let b = f.block(vec![s, l]);
        f.body = b;
        let mut cfg = Cfg::build(&mut f);
        compute_liveness(&mut cfg);

        // The set is live at the end of the entry block and at the start of
        // the loop top.
        assert!(cfg.blocks[cfg.entry].end_sets.contains(&s));
        let top = cfg.loop_tops[0];
        assert!(cfg.blocks[top].start_sets.contains(&s));
    }

    #[test]
    fn start_indexes_superset_invariant() {
        // startIndexes == (endIndexes \ defs) | uses for every block.
        let mut f = FunctionBody::new("f", vec![Type::I32], Type::I32);
        let x = f.add_var(Type::I32);
        let g0 = f.local_get(0);
        let s = f.local_set(x, g0);
        let c = f.local_get(0);
        let gx = f.local_get(x);
        let iff_t = f.drop_(gx);
        let iff = f.if_(c, iff_t, None);
        let gx2 = f.local_get(x);
        let r = f.ret(Some(gx2));
        let b = f.block(vec![s, iff, r]);
        f.body = b;
        let mut cfg = Cfg::build(&mut f);
        compute_liveness(&mut cfg);
        for block in cfg.live_block_ids() {
            let data = &cfg.blocks[block];
            let mut live = data.end_indexes.clone();
            for action in data.actions.iter().rev() {
                if action.is_get() {
                    live.insert(action.index);
                } else if action.is_set() {
                    live.erase(action.index);
                }
            }
            assert_eq!(live, data.start_indexes);
        }
    }
}
