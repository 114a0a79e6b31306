//! De-LICM: sink a set's value down into a deeper scope (typically a
//! loop) when its single consumer lives there, erasing a set and a get.
//!
//! Good for code size; optimizing JITs hoist loop invariants back out
//! anyhow, so this is a size-over-baseline-throughput trade.
//!
//! A candidate set is non-tee, of an SSA index, with a side-effect-free
//! value and exactly one consuming get whose control-flow stack strictly
//! extends the set's. The value may only move if the first control-flow
//! node that diverges between the two stacks cannot invalidate what the
//! value computes.

use crate::analysis::LocalGraph;
use crate::errors::OptError;
use crate::ir::effects::EffectAnalyzer;
use crate::ir::{Expr, ExprData, FunctionBody};
use crate::passes::Pass;
use fxhash::FxHashMap;

pub struct DeLoopInvariantCodeMotion;

impl Pass for DeLoopInvariantCodeMotion {
    fn name(&self) -> &'static str {
        "delicm"
    }
    fn is_function_parallel(&self) -> bool {
        true
    }
    fn run_function(&self, body: &mut FunctionBody) -> Result<(), OptError> {
        run(body);
        Ok(())
    }
}

struct SetInfo {
    effects: EffectAnalyzer,
    stack: Vec<Expr>,
}

fn run(body: &mut FunctionBody) {
    let mut graph = LocalGraph::new(body);
    graph.compute_influences();
    graph.compute_ssa_indexes(body);

    let mut walker = Walker {
        graph: &graph,
        set_infos: FxHashMap::default(),
        stack: vec![],
        rewrites: vec![],
    };
    walker.walk(body, body.body);
    for (get, set) in walker.rewrites {
        let value = match &body.exprs[set] {
            &ExprData::LocalSet { value, .. } => value,
            _ => unreachable!(),
        };
        body.exprs[get] = body.exprs[value].clone();
        body.nop_out(set);
    }
}

struct Walker<'a> {
    graph: &'a LocalGraph,
    set_infos: FxHashMap<Expr, SetInfo>,
    /// Enclosing control-flow nodes (blocks, ifs, loops), outermost first.
    stack: Vec<Expr>,
    /// (get, set) pairs to apply after the traversal.
    rewrites: Vec<(Expr, Expr)>,
}

impl<'a> Walker<'a> {
    fn walk(&mut self, body: &FunctionBody, e: Expr) {
        let is_control_flow = matches!(
            &body.exprs[e],
            ExprData::Block { .. } | ExprData::If { .. } | ExprData::Loop { .. }
        );
        if is_control_flow {
            self.stack.push(e);
        }
        let mut children = vec![];
        body.exprs[e].visit_children(|c| children.push(c));
        for c in children {
            self.walk(body, c);
        }
        if is_control_flow {
            self.stack.pop();
        }

        match &body.exprs[e] {
            &ExprData::LocalSet { index, value, ty } => {
                if !ty.is_concrete() && self.graph.is_ssa(index) {
                    let effects = EffectAnalyzer::new(body, value);
                    if !effects.has_side_effects() {
                        self.set_infos.insert(
                            e,
                            SetInfo {
                                effects,
                                stack: self.stack.clone(),
                            },
                        );
                    }
                }
            }
            &ExprData::LocalGet { index, .. } => {
                if !self.graph.is_ssa(index) {
                    return;
                }
                let Some(defs) = self.graph.get_setses.get(&e) else {
                    return;
                };
                if defs.len() != 1 {
                    return;
                }
                let Some(set) = *defs.iter().next().unwrap() else {
                    return;
                };
                let Some(info) = self.set_infos.get(&set) else {
                    return;
                };
                // Only a get in a strictly deeper scope is interesting.
                if self.stack.len() <= info.stack.len()
                    || self.stack[..info.stack.len()] != info.stack[..]
                {
                    return;
                }
                // This must be the set's only consumer.
                let consumers = self
                    .graph
                    .set_influences
                    .get(&set)
                    .map(|gets| gets.len())
                    .unwrap_or(0);
                if consumers != 1 {
                    return;
                }
                // The code between the set's scope and here must not be
                // able to change what the value computes.
                let diverging = self.stack[info.stack.len()];
                let diverging_effects = EffectAnalyzer::new(body, diverging);
                if diverging_effects.invalidates(&info.effects) {
                    return;
                }
                self.rewrites.push((e, set));
                self.set_infos.remove(&set);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Literal, Type};

    /// (local.set $x (i32.const 0))
    /// (loop $l (drop (local.get $x)) (br_if $l (i32.const 1)))
    fn loop_with_invariant() -> (FunctionBody, Expr, Expr) {
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
        (f, s, g)
    }

    #[test]
    fn sinks_constant_into_loop() {
        let (mut f, s, g) = loop_with_invariant();
        run(&mut f);
        assert!(matches!(
            f.exprs[g],
            ExprData::Const {
                value: Literal::I32(0)
            }
        ));
        assert!(matches!(f.exprs[s], ExprData::Nop));
    }

    #[test]
    fn leaves_set_with_two_consumers() {
        // Same shape, but a second get outside the loop keeps the set.
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
        let g2 = f.local_get(x);
        let d2 = f.drop_(g2);
        let b = f.block(vec![s, l, d2]);
        f.body = b;
        run(&mut f);
        assert!(matches!(f.exprs[s], ExprData::LocalSet { .. }));
        assert!(matches!(f.exprs[g], ExprData::LocalGet { .. }));
    }

    #[test]
    fn leaves_get_at_same_depth() {
        // Straight-line set then get: nothing to sink into.
        let mut f = FunctionBody::new("f", vec![], Type::None);
        let x = f.add_var(Type::I32);
        let zero = f.i32_const(0);
        let s = f.local_set(x, zero);
        let g = f.local_get(x);
        let d = f.drop_(g);
        let b = f.block(vec![s, d]);
        f.body = b;
        run(&mut f);
        assert!(matches!(f.exprs[s], ExprData::LocalSet { .. }));
    }

    #[test]
    fn invalidated_value_stays_put() {
        // The value reads a global that the loop writes; it cannot move.
        let mut f = FunctionBody::new("f", vec![], Type::None);
        let global = crate::ir::Global::from(0u32);
        let x = f.add_var(Type::I32);
        let read = f.global_get(global, Type::I32);
        let s = f.local_set(x, read);
        let g = f.local_get(x);
        let d = f.drop_(g);
        let five = f.i32_const(5);
        let write = f.global_set(global, five);
        let one = f.i32_const(1);
        let br = f.br_if("l", one);
        let loop_body = f.block(vec![d, write, br]);
        let l = f.loop_("l", loop_body);
        let b = f.block(vec![s, l]);
        f.body = b;
        run(&mut f);
        assert!(matches!(f.exprs[s], ExprData::LocalSet { .. }));
        assert!(matches!(f.exprs[g], ExprData::LocalGet { .. }));
    }
}
