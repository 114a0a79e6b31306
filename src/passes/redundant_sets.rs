//! Eliminate redundant sets: writes of a value the local already holds.
//!
//! The common win is loops counting from zero, since locals start zeroed
//! anyhow. Removing a set can extend the live range of the previous value,
//! so this belongs late in a pipeline, after coalescing; it can also leave
//! drops of now-useless values behind for a later cleanup.
//!
//! Each set is instrumented to observe the value its local held just
//! before it runs: `(local.set $x V)` becomes
//! `(local.set $x (block (drop V) (local.get $x)))`. Reaching-def analysis
//! of the instrumented body then tells us which write that inner get saw;
//! if it is provably equal to the new value, the set does nothing.

use crate::analysis::{Equivalences, LocalGraph};
use crate::errors::OptError;
use crate::ir::{Expr, ExprData, FunctionBody, Literal, Type};
use crate::passes::Pass;
use fxhash::FxHashSet;

pub struct RedundantSetElimination;

impl Pass for RedundantSetElimination {
    fn name(&self) -> &'static str {
        "redundant-set-elimination"
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
    // Equivalences over the original, un-instrumented body.
    let graph = LocalGraph::new(body);
    let equivalences = Equivalences::compute(body, &graph.sets, &graph.get_setses);

    let instrumented = instrument(body);
    let instrumented_graph = LocalGraph::new(body);

    let mut unneeded: FxHashSet<Expr> = FxHashSet::default();
    for site in &instrumented {
        let Some(defs) = instrumented_graph.get_setses.get(&site.inner_get) else {
            continue;
        };
        // TODO: with multiple reaching defs, check whether all are in one
        // class.
        if defs.len() != 1 {
            continue;
        }
        let parent_class = match defs.iter().next().unwrap() {
            Some(parent) => equivalences.class_of_set(*parent),
            None => {
                // No reaching write. For a variable that is the zero init;
                // for a parameter it is the caller's value, which nothing
                // is provably equal to.
                if body.is_param(site.index) {
                    continue;
                }
                equivalences.class_of_literal(Literal::zero(site.value_ty))
            }
        };
        let set_class = equivalences.class_of_set(site.set);
        if set_class != 0 && set_class == parent_class {
            unneeded.insert(site.set);
        }
    }

    uninstrument(body, &instrumented, &unneeded);
}

struct InstrumentedSet {
    set: Expr,
    index: crate::ir::LocalId,
    value: Expr,
    value_ty: Type,
    inner_get: Expr,
}

/// Collect every set in the tree, in post-order.
fn find_all_sets(body: &FunctionBody, root: Expr) -> Vec<Expr> {
    let mut sets = vec![];
    let mut stack = vec![(root, false)];
    while let Some((e, visited)) = stack.pop() {
        if visited {
            if body.exprs[e].is_local_set() {
                sets.push(e);
            }
            continue;
        }
        stack.push((e, true));
        let mut children = vec![];
        body.exprs[e].visit_children(|c| children.push(c));
        for &c in children.iter().rev() {
            stack.push((c, false));
        }
    }
    sets
}

fn instrument(body: &mut FunctionBody) -> Vec<InstrumentedSet> {
    let mut instrumented = vec![];
    for set in find_all_sets(body, body.body) {
        let (index, value) = match &body.exprs[set] {
            &ExprData::LocalSet { index, value, .. } => (index, value),
            _ => unreachable!(),
        };
        let value_ty = body.expr_ty(value);
        if value_ty == Type::Unreachable {
            continue;
        }
        let drop = body.drop_(value);
        let inner_get = body.local_get(index);
        let observer = body.block(vec![drop, inner_get]);
        match &mut body.exprs[set] {
            ExprData::LocalSet { value: slot, .. } => *slot = observer,
            _ => unreachable!(),
        }
        instrumented.push(InstrumentedSet {
            set,
            index,
            value,
            value_ty,
            inner_get,
        });
    }
    instrumented
}

fn uninstrument(body: &mut FunctionBody, instrumented: &[InstrumentedSet], unneeded: &FxHashSet<Expr>) {
    for site in instrumented {
        if !unneeded.contains(&site.set) {
            match &mut body.exprs[site.set] {
                ExprData::LocalSet { value: slot, .. } => *slot = site.value,
                _ => unreachable!(),
            }
        } else if body.is_tee(site.set) {
            body.exprs[site.set] = body.exprs[site.value].clone();
        } else {
            body.replace(site.set, ExprData::Drop { value: site.value });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_store_on_zero_init_is_removed() {
        // (local.set $x (i32.const 0)) (drop (local.get $x))
        let mut f = FunctionBody::new("f", vec![], Type::None);
        let x = f.add_var(Type::I32);
        let zero = f.i32_const(0);
        let s = f.local_set(x, zero);
        let g = f.local_get(x);
        let d = f.drop_(g);
        let b = f.block(vec![s, d]);
        f.body = b;
        run(&mut f);
        // The set became a drop of its value.
        assert!(matches!(f.exprs[s], ExprData::Drop { .. }));
    }

    #[test]
    fn nonzero_store_is_kept() {
        let mut f = FunctionBody::new("f", vec![], Type::None);
        let x = f.add_var(Type::I32);
        let seven = f.i32_const(7);
        let s = f.local_set(x, seven);
        let g = f.local_get(x);
        let d = f.drop_(g);
        let b = f.block(vec![s, d]);
        f.body = b;
        run(&mut f);
        assert!(matches!(f.exprs[s], ExprData::LocalSet { value, .. } if value == seven));
    }

    #[test]
    fn rewrite_of_same_value_is_removed() {
        // x = 7; x = 7 again: the second set is redundant.
        let mut f = FunctionBody::new("f", vec![], Type::None);
        let x = f.add_var(Type::I32);
        let seven_a = f.i32_const(7);
        let s1 = f.local_set(x, seven_a);
        let g1 = f.local_get(x);
        let d1 = f.drop_(g1);
        let seven_b = f.i32_const(7);
        let s2 = f.local_set(x, seven_b);
        let g2 = f.local_get(x);
        let d2 = f.drop_(g2);
        let b = f.block(vec![s1, d1, s2, d2]);
        f.body = b;
        run(&mut f);
        assert!(matches!(f.exprs[s1], ExprData::LocalSet { .. }));
        assert!(matches!(f.exprs[s2], ExprData::Drop { .. }));
    }

    #[test]
    fn instrument_round_trip_is_identity() {
        let mut f = FunctionBody::new("f", vec![Type::I32], Type::None);
        let x = f.add_var(Type::I32);
        let g0 = f.local_get(0);
        let s = f.local_set(x, g0);
        let g = f.local_get(x);
        let d = f.drop_(g);
        let b = f.block(vec![s, d]);
        f.body = b;
        let snapshot = f.clone();
        let instrumented = instrument(&mut f);
        uninstrument(&mut f, &instrumented, &FxHashSet::default());
        // Same shape as before the round trip.
        assert_eq!(
            crate::binary::encode_function_body(&f),
            crate::binary::encode_function_body(&snapshot)
        );
    }
}
