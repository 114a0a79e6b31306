//! Local coalescing: merge locals so the function declares fewer of them,
//! and pick merges that erase copies.
//!
//! This is register allocation without spilling and without a register
//! limit: the payoff is code size. Copies cost bytes directly, so removing
//! them dominates; shrinking the local count mostly helps the compressed
//! encoding. Sets that share a local index never interfere with each other
//! (they share it for a reason), and sets the value-equivalence engine
//! proves identical are allowed to overlap freely.

use crate::analysis::equivalence::Equivalences;
use crate::analysis::liveness::compute_liveness;
use crate::analysis::DefSet;
use crate::cfg::Cfg;
use crate::entity::EntityRef;
use crate::errors::OptError;
use crate::ir::local_utils::UnneededSetRemover;
use crate::ir::{Expr, ExprData, FunctionBody, Global, Literal, LocalId, Type};
use crate::passes::Pass;
use crate::support::{GeneticLearner, Generator, SymmetricPairMap, SymmetricRelation};
use fxhash::FxHashMap;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use smallvec::SmallVec;
use std::collections::BTreeSet;

/// Fixed seed for the genetic search, so results are reproducible.
pub const LEARNING_SEED: u64 = 42;

pub struct CoalesceLocals;

impl Pass for CoalesceLocals {
    fn name(&self) -> &'static str {
        "coalesce-locals"
    }
    fn is_function_parallel(&self) -> bool {
        true
    }
    fn run_function(&self, body: &mut FunctionBody) -> Result<(), OptError> {
        coalesce(body, false)
    }
}

/// Like `CoalesceLocals`, but searches over coloring orders with a small
/// genetic algorithm instead of trying just two.
pub struct CoalesceLocalsWithLearning;

impl Pass for CoalesceLocalsWithLearning {
    fn name(&self) -> &'static str {
        "coalesce-locals-learning"
    }
    fn is_function_parallel(&self) -> bool {
        true
    }
    fn run_function(&self, body: &mut FunctionBody) -> Result<(), OptError> {
        coalesce(body, true)
    }
}

fn coalesce(body: &mut FunctionBody, learning: bool) -> Result<(), OptError> {
    let num_locals = body.num_locals() as u32;
    if num_locals == 0 {
        return Err(OptError::OptimizationAborted("no locals".to_string()));
    }
    log::trace!("coalesce-locals: {}", body.name);

    // Make the implicit entry writes explicit, so every get has a real
    // reaching set and zero-init/param handling needs no special cases.
    let scaffold = Scaffold::install(body);

    let mut cfg = Cfg::build(body);
    compute_liveness(&mut cfg);

    let copies = Copies::compute(body, &cfg);
    let get_sets = GetSets::compute(body, &cfg);
    let set_gets = SetGets::compute(&get_sets);
    let interferences = Interferences::compute(body, &cfg, &get_sets, &set_gets);

    let local_types: Vec<Type> = (0..num_locals).map(|i| body.local_type(i)).collect();
    let coloring = Coloring {
        num_locals,
        num_params: body.num_params() as u32,
        local_types,
        interferences: &interferences,
        copies: &copies,
    };
    let indices = if learning {
        coloring.pick_indices_learning(body.num_vars() as u32)
    } else {
        coloring.pick_indices()
    };

    apply_indices(body, &mut cfg, &indices, &set_gets);
    scaffold.remove(body);

    // Vacuum: the rewrite can leave sets that are now trivially unneeded
    // (tee chains that collapsed onto one index, writes nothing reads).
    if UnneededSetRemover::run(body) {
        log::trace!("coalesce-locals: vacuumed leftover sets in {}", body.name);
    }
    Ok(())
}

/// Wraps the body in a block of explicit per-local entry sets: variables
/// are set to their typed zero, parameters to an opaque placeholder. The
/// scaffold never survives the pass.
struct Scaffold {
    old_body: Expr,
}

impl Scaffold {
    fn install(body: &mut FunctionBody) -> Scaffold {
        let old_body = body.body;
        let mut list = vec![];
        for index in 0..body.num_locals() as LocalId {
            let ty = body.local_type(index);
            let value = if body.is_param(index) {
                // Opaque: the incoming argument is not any set's value, and
                // must never look equivalent to a constant.
                body.add(ExprData::GlobalGet {
                    global: Global::invalid(),
                    ty,
                })
            } else {
                body.const_(Literal::zero(ty))
            };
            let set = body.local_set(index, value);
            list.push(set);
        }
        list.push(old_body);
        let wrapper = body.block(list);
        body.body = wrapper;
        Scaffold { old_body }
    }

    fn remove(self, body: &mut FunctionBody) {
        body.body = self.old_body;
    }
}

/// The sets that may reach each get, from block liveness (not LocalGraph:
/// we already have start-set information per block).
struct GetSets {
    map: FxHashMap<Expr, DefSet>,
}

impl GetSets {
    fn compute(body: &FunctionBody, cfg: &Cfg) -> GetSets {
        let mut map = FxHashMap::default();
        for block in cfg.live_block_ids() {
            let mut index_sets: FxHashMap<LocalId, DefSet> = FxHashMap::default();
            for &set in &cfg.blocks[block].start_sets {
                let index = set_index(body, set);
                index_sets.entry(index).or_default().insert(Some(set));
            }
            for action in &cfg.blocks[block].actions {
                if let Some(set) = action.get_set() {
                    let sets = index_sets.entry(action.index).or_default();
                    sets.clear();
                    sets.insert(Some(set));
                } else if let Some(get) = action.get_get() {
                    map.insert(
                        get,
                        index_sets.get(&action.index).cloned().unwrap_or_default(),
                    );
                }
            }
        }
        GetSets { map }
    }

    fn sets_for(&self, get: Expr) -> Option<&DefSet> {
        self.map.get(&get)
    }
}

/// Transpose of `GetSets`: the gets each set reaches.
struct SetGets {
    map: FxHashMap<Expr, BTreeSet<Expr>>,
}

impl SetGets {
    fn compute(get_sets: &GetSets) -> SetGets {
        let mut map: FxHashMap<Expr, BTreeSet<Expr>> = FxHashMap::default();
        for (&get, sets) in &get_sets.map {
            for set in sets.iter().flatten() {
                map.entry(*set).or_default().insert(get);
            }
        }
        SetGets { map }
    }

    fn has_gets(&self, set: Expr) -> bool {
        self.map.get(&set).is_some_and(|gets| !gets.is_empty())
    }
}

/// Weighted copies between local indices. Back-edge copies get extra
/// weight: a copy there may force a branch just to perform it.
struct Copies {
    copies: SymmetricPairMap<LocalId, u32>,
    total_copies: Vec<u32>,
}

impl Copies {
    fn compute(body: &FunctionBody, cfg: &Cfg) -> Copies {
        let mut copies = Copies {
            copies: SymmetricPairMap::new(),
            total_copies: vec![0; body.num_locals()],
        };
        for block in cfg.live_block_ids() {
            for action in &cfg.blocks[block].actions {
                if let Some(set) = action.get_set() {
                    let value = set_value(body, set);
                    // Two units per copy, so back-edge weighting can break
                    // ties without dominating.
                    for index in copied_indexes(body, value) {
                        copies.note(action.index, index, 2);
                    }
                }
            }
        }
        for &loop_top in &cfg.loop_tops {
            // The first edge into a loop top is the initial entry; the rest
            // are back-edges. Only unconditional arrivals are true phi
            // fragments.
            let preds: Vec<_> = cfg.blocks[loop_top].preds.iter().skip(1).copied().collect();
            for pred in preds {
                if !cfg.back_edges.contains(&(pred, loop_top)) {
                    continue;
                }
                if cfg.blocks[pred].succs.len() > 1 {
                    continue;
                }
                for action in &cfg.blocks[pred].actions {
                    if let Some(set) = action.get_set() {
                        let value = set_value(body, set);
                        for index in copied_indexes(body, value) {
                            copies.note(action.index, index, 1);
                        }
                    }
                }
            }
        }
        copies
    }

    fn note(&mut self, i: LocalId, j: LocalId, amount: u32) {
        *self.copies.get_mut(i, j) += amount;
        self.total_copies[i as usize] += amount;
        self.total_copies[j as usize] += amount;
    }

    fn get(&self, i: LocalId, j: LocalId) -> u32 {
        self.copies.get(i, j)
    }
}

/// Indices whose copy we might plausibly erase later: direct gets, tees,
/// and if-arms of those.
fn copied_indexes(body: &FunctionBody, value: Expr) -> SmallVec<[LocalId; 2]> {
    let mut ret = SmallVec::new();
    match &body.exprs[value] {
        ExprData::LocalGet { index, .. } => ret.push(*index),
        ExprData::LocalSet { index, ty, .. } if ty.is_concrete() => ret.push(*index),
        ExprData::If {
            if_true, if_false, ..
        } => {
            ret.extend(copied_indexes(body, *if_true));
            if let Some(if_false) = if_false {
                ret.extend(copied_indexes(body, *if_false));
            }
        }
        _ => {}
    }
    ret
}

fn set_index(body: &FunctionBody, set: Expr) -> LocalId {
    match &body.exprs[set] {
        ExprData::LocalSet { index, .. } => *index,
        other => panic!("IR violation: set handle points at {:?}", other),
    }
}

fn set_value(body: &FunctionBody, set: Expr) -> Expr {
    match &body.exprs[set] {
        ExprData::LocalSet { value, .. } => *value,
        other => panic!("IR violation: set handle points at {:?}", other),
    }
}

fn get_index(body: &FunctionBody, get: Expr) -> LocalId {
    match &body.exprs[get] {
        ExprData::LocalGet { index, .. } => *index,
        other => panic!("IR violation: get handle points at {:?}", other),
    }
}

/// Interference between sets, lowered to interference between indices.
struct Interferences {
    index_interferences: Vec<BTreeSet<LocalId>>,
}

impl Interferences {
    fn compute(
        body: &FunctionBody,
        cfg: &Cfg,
        get_sets: &GetSets,
        set_gets: &SetGets,
    ) -> Interferences {
        // Equivalent sets may overlap without conflicting.
        let mut all_sets = vec![];
        for block in cfg.live_block_ids() {
            for action in &cfg.blocks[block].actions {
                if let Some(set) = action.get_set() {
                    all_sets.push(set);
                }
            }
        }
        let equivalences = Equivalences::compute(body, &all_sets, &get_sets.map);

        let mut set_interferences: SymmetricRelation<Expr> = SymmetricRelation::new();
        let mut maybe_interfere = |a: Expr, b: Expr| {
            // A set never interferes with itself, with a set of the same
            // index, or with a provably equal value.
            if a != b
                && set_index(body, a) != set_index(body, b)
                && !equivalences.are_equivalent(a, b)
            {
                set_interferences.insert(a, b);
            }
        };

        for block in cfg.live_block_ids() {
            // Everything live out may conflict for the first time here, as
            // the sets can come from different blocks.
            let mut live: BTreeSet<Expr> = cfg.blocks[block].end_sets.clone();
            for &a in &live {
                for &b in &live {
                    maybe_interfere(a, b);
                }
            }
            for action in cfg.blocks[block].actions.iter().rev() {
                if let Some(get) = action.get_get() {
                    if let Some(sets) = get_sets.sets_for(get) {
                        for set in sets.iter().flatten() {
                            live.insert(*set);
                            for &other in &live {
                                maybe_interfere(*set, other);
                            }
                        }
                    }
                }
                if let Some(set) = action.get_set() {
                    live.remove(&set);
                    debug_assert!(live
                        .iter()
                        .all(|&other| set_index(body, other) != set_index(body, set)));
                }
            }
        }

        let mut index_interferences = vec![BTreeSet::new(); body.num_locals()];
        for (a, b) in set_interferences.iter() {
            let (i, j) = (set_index(body, a), set_index(body, b));
            index_interferences[i as usize].insert(j);
            index_interferences[j as usize].insert(i);
        }

        // A used zero-init must not land in a parameter slot: that would
        // need an explicit zero store where the implicit one was free.
        let num_params = body.num_params() as u32;
        let num_locals = body.num_locals() as u32;
        let entry_actions = &cfg.blocks[cfg.entry].actions;
        assert!(entry_actions.len() >= num_locals as usize);
        for i in num_params..num_locals {
            let set = entry_actions[i as usize]
                .get_set()
                .expect("entry scaffold must be explicit sets");
            debug_assert_eq!(set_index(body, set), i);
            if set_gets.has_gets(set) {
                for j in 0..num_params {
                    index_interferences[i as usize].insert(j);
                    index_interferences[j as usize].insert(i);
                }
            }
        }

        Interferences { index_interferences }
    }

    fn interferes(&self, i: LocalId, j: LocalId) -> bool {
        self.index_interferences[i as usize].contains(&j)
    }
}

/// Greedy priority-ordered coloring of old indices onto new ones.
struct Coloring<'a> {
    num_locals: u32,
    num_params: u32,
    local_types: Vec<Type>,
    interferences: &'a Interferences,
    copies: &'a Copies,
}

impl<'a> Coloring<'a> {
    /// Color following `order`, which must keep parameters in place.
    /// Returns oldIndex -> newIndex plus the number of copies removed.
    fn pick_from_order(&self, order: &[LocalId]) -> (Vec<LocalId>, u32) {
        let num_locals = self.num_locals as usize;
        let mut indices = vec![0 as LocalId; num_locals];
        let mut types = vec![Type::None; num_locals];
        // new index * numLocals: interference and copy weight of everything
        // merged into the new index, against each old index.
        let mut new_interferences = vec![false; num_locals * num_locals];
        let mut new_copies = vec![0u32; num_locals * num_locals];
        let mut removed_copies = 0u32;
        let mut next_free: u32 = 0;

        // Parameters are pinned in place and cannot coalesce.
        for i in 0..self.num_params {
            assert_eq!(order[i as usize], i, "order must leave the params in place");
            indices[i as usize] = i;
            types[i as usize] = self.local_types[i as usize];
            for j in self.num_params..self.num_locals {
                new_interferences[num_locals * i as usize + j as usize] =
                    self.interferences.interferes(i, j);
                new_copies[num_locals * i as usize + j as usize] = self.copies.get(i, j);
            }
            next_free += 1;
        }
        for position in self.num_params as usize..num_locals {
            let actual = order[position];
            let mut found: Option<u32> = None;
            let mut found_copies = 0u32;
            for j in 0..next_free {
                if !new_interferences[j as usize * num_locals + actual as usize]
                    && self.local_types[actual as usize] == types[j as usize]
                {
                    // Candidate; prefer the one that kills the most copies.
                    let curr_copies = new_copies[j as usize * num_locals + actual as usize];
                    if found.is_none() || curr_copies > found_copies {
                        found = Some(j);
                        found_copies = curr_copies;
                    }
                }
            }
            let found = match found {
                Some(j) => {
                    removed_copies += found_copies;
                    j
                }
                None => {
                    let fresh = next_free;
                    types[fresh as usize] = self.local_types[actual as usize];
                    next_free += 1;
                    removed_copies += self.copies.get(fresh, actual);
                    fresh
                }
            };
            indices[actual as usize] = found;
            // Fold the merged index's interference and copies into the new
            // index, for the entries we will still see.
            for later in position + 1..num_locals {
                let j = order[later];
                new_interferences[found as usize * num_locals + j as usize] |=
                    self.interferences.interferes(actual, j);
                new_copies[found as usize * num_locals + j as usize] +=
                    self.copies.get(actual, j);
            }
        }
        (indices, removed_copies)
    }

    fn pick_indices(&self) -> Vec<LocalId> {
        if self.num_locals == 1 {
            return vec![0];
        }
        // Total copies steer the order, but params keep absolute priority
        // so they stay in front.
        let mut priorities = self.copies.total_copies.clone();
        for i in 0..self.num_params as usize {
            priorities[i] = u32::MAX;
        }

        // The natural order first: programs often have an inherent order of
        // locals, so this is less arbitrary than it looks.
        let order: Vec<LocalId> = (0..self.num_locals).collect();
        let order = adjust_order_by_priorities(&order, &priorities);
        let (indices, removed_copies) = self.pick_from_order(&order);
        let max_index = *indices.iter().max().unwrap();

        // Then the reverse, for a second chance at something good.
        let mut order: Vec<LocalId> = (0..self.num_locals).collect();
        for i in self.num_params..self.num_locals {
            order[i as usize] = self.num_params + self.num_locals - 1 - i;
        }
        let order = adjust_order_by_priorities(&order, &priorities);
        let (reverse_indices, reverse_removed) = self.pick_from_order(&order);
        let reverse_max = *reverse_indices.iter().max().unwrap();

        // Removed copies matter most; fewer locals breaks ties.
        if reverse_removed > removed_copies
            || (reverse_removed == removed_copies && reverse_max < max_index)
        {
            reverse_indices
        } else {
            indices
        }
    }

    fn pick_indices_learning(&self, num_vars: u32) -> Vec<LocalId> {
        if num_vars <= 1 {
            return self.pick_indices();
        }
        let generation_size = std::cmp::min(num_vars * (num_vars - 1), 20) as usize;
        let generator = OrderGenerator {
            coloring: self,
            rng: SmallRng::seed_from_u64(LEARNING_SEED),
            first: true,
        };
        let mut learner = GeneticLearner::new(generator, generation_size);
        let mut old_best = learner.best_fitness();
        loop {
            learner.run_generation();
            let new_best = learner.best_fitness();
            if new_best == old_best {
                break;
            }
            old_best = new_best;
        }
        self.pick_from_order(learner.best()).0
    }
}

/// Reorder `baseline` so higher priorities come first, keeping the
/// baseline's relative order on ties.
fn adjust_order_by_priorities(baseline: &[LocalId], priorities: &[u32]) -> Vec<LocalId> {
    let mut position = vec![0usize; baseline.len()];
    for (i, &x) in baseline.iter().enumerate() {
        position[x as usize] = i;
    }
    let mut ret = baseline.to_vec();
    ret.sort_by(|&x, &y| {
        priorities[y as usize]
            .cmp(&priorities[x as usize])
            .then(position[x as usize].cmp(&position[y as usize]))
    });
    ret
}

struct OrderGenerator<'a, 'b> {
    coloring: &'a Coloring<'b>,
    rng: SmallRng,
    first: bool,
}

impl<'a, 'b> Generator for OrderGenerator<'a, 'b> {
    type Genome = Vec<LocalId>;

    fn make_random(&mut self) -> Vec<LocalId> {
        let mut order: Vec<LocalId> = (0..self.coloring.num_locals).collect();
        if self.first {
            // Seed with the natural order: the input may carry an inherent
            // ordering, and starting here means we never do worse than not
            // learning at all.
            self.first = false;
        } else {
            let num_params = self.coloring.num_params as usize;
            order[num_params..].shuffle(&mut self.rng);
        }
        order
    }

    fn make_mixture(&mut self, left: &Vec<LocalId>, right: &Vec<LocalId>) -> Vec<LocalId> {
        // Perturb left towards right by swapping adjacent pairs whose
        // relative order disagrees. Absolute positions matter little, so a
        // positional merge would only add noise.
        let size = left.len();
        let mut right_rank = vec![0usize; size];
        for (i, &x) in right.iter().enumerate() {
            right_rank[x as usize] = i;
        }
        let mut ret = left.clone();
        let mut i = self.coloring.num_params as usize;
        while i + 1 < size {
            if right_rank[ret[i] as usize] > right_rank[ret[i + 1] as usize] {
                ret.swap(i, i + 1);
                // Skip one so an element is not pushed all the way to the
                // end; this should stay a perturbation.
                i += 1;
            }
            i += 1;
        }
        ret
    }

    fn fitness(&mut self, order: &Vec<LocalId>) -> f64 {
        let (indices, removed_copies) = self.coloring.pick_from_order(order);
        let max_index = *indices.iter().max().unwrap();
        debug_assert!(max_index <= self.coloring.num_locals);
        // Fewer locals is the main fitness; not moving locals is a small
        // bonus; removed copies break ties.
        let mut fitness = (self.coloring.num_locals - max_index) as f64;
        let fragment = 1.0 / (2.0 * self.coloring.num_locals as f64);
        for (i, &x) in order.iter().enumerate() {
            if x as usize == i {
                fitness += fragment;
            }
        }
        100.0 * fitness + removed_copies as f64
    }
}

fn apply_indices(body: &mut FunctionBody, cfg: &mut Cfg, indices: &[LocalId], set_gets: &SetGets) {
    assert_eq!(indices.len(), body.num_locals());
    for block in cfg.blocks.iter().collect::<Vec<_>>() {
        let mut actions = std::mem::take(&mut cfg.blocks[block].actions);
        for action in actions.iter_mut() {
            if let Some(get) = action.get_get() {
                let new_index = indices[get_index(body, get) as usize];
                match &mut body.exprs[get] {
                    ExprData::LocalGet { index, .. } => *index = new_index,
                    _ => unreachable!(),
                }
            } else if let Some(set) = action.get_set() {
                let new_index = indices[set_index(body, set) as usize];
                match &mut body.exprs[set] {
                    ExprData::LocalSet { index, .. } => *index = new_index,
                    _ => unreachable!(),
                }
                // A copy of a local onto itself does nothing now.
                let value = set_value(body, set);
                if matches!(&body.exprs[value],
                    ExprData::LocalGet { index, .. } if *index == new_index)
                {
                    action.remove_set(body);
                    continue;
                }
                // Sets no get can observe do nothing either.
                if !set_gets.has_gets(set) {
                    action.remove_set(body);
                }
            }
        }
        cfg.blocks[block].actions = actions;
    }

    // Renumber the variable declarations.
    let num_params = body.num_params();
    let num_locals = body.num_locals();
    let new_num_locals = indices.iter().map(|&i| i as usize + 1).max().unwrap();
    let old_types: Vec<Type> = (0..num_locals as LocalId).map(|i| body.local_type(i)).collect();
    let mut new_vars = vec![Type::I32; new_num_locals.saturating_sub(num_params)];
    for index in num_params..num_locals {
        let new_index = indices[index] as usize;
        if new_index >= num_params {
            new_vars[new_index - num_params] = old_types[index];
        }
    }
    body.vars = new_vars;
    // Names no longer describe anything.
    body.local_names.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coloring_fixture<'a>(
        interferences: &'a Interferences,
        copies: &'a Copies,
        types: Vec<Type>,
        num_params: u32,
    ) -> Coloring<'a> {
        Coloring {
            num_locals: types.len() as u32,
            num_params,
            local_types: types,
            interferences,
            copies,
        }
    }

    #[test]
    fn non_interfering_locals_merge() {
        let interferences = Interferences {
            index_interferences: vec![BTreeSet::new(); 3],
        };
        let mut copies = Copies {
            copies: SymmetricPairMap::new(),
            total_copies: vec![0; 3],
        };
        copies.note(1, 2, 2);
        let coloring = coloring_fixture(
            &interferences,
            &copies,
            vec![Type::I32, Type::I32, Type::I32],
            1,
        );
        let indices = coloring.pick_indices();
        assert_eq!(indices[0], 0);
        // Locals 1 and 2 copy each other and do not interfere: same slot.
        assert_eq!(indices[1], indices[2]);
    }

    #[test]
    fn interfering_locals_stay_apart() {
        let mut index_interferences = vec![BTreeSet::new(); 2];
        index_interferences[0].insert(1);
        index_interferences[1].insert(0);
        let interferences = Interferences { index_interferences };
        let copies = Copies {
            copies: SymmetricPairMap::new(),
            total_copies: vec![0; 2],
        };
        let coloring = coloring_fixture(&interferences, &copies, vec![Type::I32, Type::I32], 0);
        let indices = coloring.pick_indices();
        assert_ne!(indices[0], indices[1]);
    }

    #[test]
    fn types_never_mix() {
        let interferences = Interferences {
            index_interferences: vec![BTreeSet::new(); 2],
        };
        let copies = Copies {
            copies: SymmetricPairMap::new(),
            total_copies: vec![0; 2],
        };
        let coloring = coloring_fixture(&interferences, &copies, vec![Type::I32, Type::F64], 0);
        let indices = coloring.pick_indices();
        assert_ne!(indices[0], indices[1]);
    }

    #[test]
    fn learning_matches_or_beats_basic_on_small_input() {
        let interferences = Interferences {
            index_interferences: vec![BTreeSet::new(); 4],
        };
        let mut copies = Copies {
            copies: SymmetricPairMap::new(),
            total_copies: vec![0; 4],
        };
        copies.note(1, 3, 2);
        let coloring = coloring_fixture(
            &interferences,
            &copies,
            vec![Type::I32; 4],
            1,
        );
        let basic = coloring.pick_indices();
        let learned = coloring.pick_indices_learning(3);
        let basic_max = basic.iter().max().unwrap();
        let learned_max = learned.iter().max().unwrap();
        assert!(learned_max <= basic_max);
        // Params stay pinned either way.
        assert_eq!(learned[0], 0);
    }
}
