//! Propagate SSA local indices through copies:
//!
//! ```text
//! a = b        a = b
//! c = a   =>   c = b
//! ```
//!
//! Runs to a fixed point, recomputing reaching defs each round. Changes
//! are recorded in a dedup set so cycles of copies (possible in dead
//! code) cannot flip back and forth forever.

use crate::analysis::LocalGraph;
use crate::errors::OptError;
use crate::ir::{Expr, ExprData, FunctionBody, LocalId, Type};
use crate::passes::Pass;
use crate::support::OneTimeWorkList;
use fxhash::FxHashSet;
use std::collections::BTreeSet;

pub struct CopyPropagation;

impl Pass for CopyPropagation {
    fn name(&self) -> &'static str {
        "copy-propagation"
    }
    fn is_function_parallel(&self) -> bool {
        true
    }
    fn run_function(&self, body: &mut FunctionBody) -> Result<(), OptError> {
        run(body);
        Ok(())
    }
}

fn run(body: &mut FunctionBody) {
    let mut applied: FxHashSet<(Expr, LocalId)> = FxHashSet::default();
    loop {
        let mut graph = LocalGraph::new(body);
        graph.compute_ssa_indexes(body);
        let mut changed = false;
        let gets = graph.gets.clone();
        for get in gets {
            let index = match &body.exprs[get] {
                ExprData::LocalGet { index, .. } => *index,
                _ => unreachable!(),
            };
            if !graph.is_ssa(index) {
                continue;
            }
            let Some(set) = relevant_set(body, &graph, get) else {
                continue;
            };
            let Some(value) = relevant_set_value(body, set) else {
                continue;
            };
            // Walk the chain of copies, collecting every SSA index that
            // provably holds our value.
            let mut possible: BTreeSet<LocalId> = BTreeSet::new();
            let mut work: OneTimeWorkList<Expr> = OneTimeWorkList::new();
            work.push(value);
            while let Some(curr) = work.pop() {
                match &body.exprs[curr] {
                    ExprData::LocalSet {
                        index: other_index, ..
                    } => {
                        let other_index = *other_index;
                        if graph.is_ssa(other_index) {
                            if other_index != index {
                                possible.insert(other_index);
                            }
                            if let Some(next) = relevant_set_value(body, curr) {
                                work.push(next);
                            }
                        }
                    }
                    ExprData::LocalGet {
                        index: other_index, ..
                    } => {
                        let other_index = *other_index;
                        if graph.is_ssa(other_index) {
                            if other_index != index {
                                possible.insert(other_index);
                            }
                            if let Some(next) = relevant_set(body, &graph, curr) {
                                work.push(next);
                            }
                        }
                    }
                    _ => unreachable!("copy chain can only contain gets and sets"),
                }
            }
            // The lowest index wins: smallest LEBs, best compression, and
            // usually the earliest set, which may skip the middle copies.
            if let Some(&best) = possible.iter().next() {
                debug_assert_ne!(best, index);
                if applied.insert((get, best)) {
                    match &mut body.exprs[get] {
                        ExprData::LocalGet { index, .. } => *index = best,
                        _ => unreachable!(),
                    }
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
}

/// The get's one reachable defining set, if it has exactly one.
fn relevant_set(body: &FunctionBody, graph: &LocalGraph, get: Expr) -> Option<Expr> {
    let defs = graph.get_setses.get(&get)?;
    if defs.len() != 1 {
        return None;
    }
    let set = (*defs.iter().next().unwrap())?;
    let value = match &body.exprs[set] {
        &ExprData::LocalSet { value, .. } => value,
        _ => unreachable!(),
    };
    if body.expr_ty(value) == Type::Unreachable {
        return None;
    }
    Some(set)
}

/// A set value we can look through: another get or a tee, possibly behind
/// trivial fallthroughs.
fn relevant_set_value(body: &FunctionBody, set: Expr) -> Option<Expr> {
    let value = match &body.exprs[set] {
        &ExprData::LocalSet { value, .. } => value,
        _ => unreachable!(),
    };
    let value = body.fallthrough(value);
    match &body.exprs[value] {
        ExprData::LocalGet { .. } | ExprData::LocalSet { .. } => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn propagates_through_tee() {
        // (local.set $y (local.tee $z (local.get $x))) (drop (local.get $y))
        // with all three SSA: the drop should read $x directly.
        let mut f = FunctionBody::new("f", vec![], Type::None);
        let x = f.add_var(Type::I32);
        let z = f.add_var(Type::I32);
        let y = f.add_var(Type::I32);
        let seven = f.i32_const(7);
        let sx = f.local_set(x, seven);
        let gx = f.local_get(x);
        let tz = f.local_tee(z, gx);
        let sy = f.local_set(y, tz);
        let gy = f.local_get(y);
        let d = f.drop_(gy);
        let b = f.block(vec![sx, sy, d]);
        f.body = b;
        run(&mut f);
        assert!(matches!(f.exprs[gy], ExprData::LocalGet { index, .. } if index == x));
    }

    #[test]
    fn direct_copy_chain_collapses() {
        // a = <opaque>; b = a; c = b; the get of c reads a.
        let mut f = FunctionBody::new("f", vec![Type::I32], Type::None);
        let a = f.add_var(Type::I32);
        let b_var = f.add_var(Type::I32);
        let c = f.add_var(Type::I32);
        let g0 = f.local_get(0);
        let sa = f.local_set(a, g0);
        let ga = f.local_get(a);
        let sb = f.local_set(b_var, ga);
        let gb = f.local_get(b_var);
        let sc = f.local_set(c, gb);
        let gc = f.local_get(c);
        let d = f.drop_(gc);
        let blk = f.block(vec![sa, sb, sc, d]);
        f.body = blk;
        run(&mut f);
        assert!(matches!(f.exprs[gc], ExprData::LocalGet { index, .. } if index == a));
        // The middle copy's get collapses too.
        assert!(matches!(f.exprs[gb], ExprData::LocalGet { index, .. } if index == a));
    }

    #[test]
    fn non_ssa_targets_are_left_alone() {
        // b is written twice; gets of b must not be touched.
        let mut f = FunctionBody::new("f", vec![Type::I32], Type::None);
        let a = f.add_var(Type::I32);
        let b_var = f.add_var(Type::I32);
        let g0 = f.local_get(0);
        let sa = f.local_set(a, g0);
        let ga = f.local_get(a);
        let sb1 = f.local_set(b_var, ga);
        let ga2 = f.local_get(a);
        let sb2 = f.local_set(b_var, ga2);
        let gb = f.local_get(b_var);
        let d = f.drop_(gb);
        let blk = f.block(vec![sa, sb1, sb2, d]);
        f.body = blk;
        run(&mut f);
        assert!(matches!(f.exprs[gb], ExprData::LocalGet { index, .. } if index == b_var));
    }
}
