//! Value equivalence: which sets (and constants) provably hold the same
//! value.
//!
//! Builds an undirected-plus-merge graph over set nodes, observed constant
//! literals, and a zero node per value type, then computes connected
//! closures. A merge node joins a class only once every one of its sources
//! is already in that class, so the flood re-checks merges as sources gain
//! classes. Class 0 means "not yet known".

use super::DefSet;
use crate::ir::{Expr, ExprData, FunctionBody, Literal, Type};
use crate::support::WorkList;
use fxhash::FxHashMap;

#[derive(Debug, Default)]
pub struct Equivalences {
    set_classes: FxHashMap<Expr, u32>,
    literal_classes: FxHashMap<Literal, u32>,
}

#[derive(Default)]
struct Node {
    set: Option<Expr>,
    literal: Option<Literal>,
    directs: Vec<usize>,
    merges_in: Vec<usize>,
    merges_out: Vec<usize>,
    /// A merge source is missing (opaque); the node can never be joined
    /// through its merges.
    merge_blocked: bool,
}

impl Equivalences {
    /// Compute equivalences for `sets` (in deterministic order), resolving
    /// each get's defs through `get_setses`.
    pub fn compute(
        body: &FunctionBody,
        sets: &[Expr],
        get_setses: &FxHashMap<Expr, DefSet>,
    ) -> Equivalences {
        let mut nodes: Vec<Node> = vec![];
        let mut set_nodes: FxHashMap<Expr, usize> = FxHashMap::default();
        for &set in sets {
            let id = nodes.len();
            nodes.push(Node {
                set: Some(set),
                ..Node::default()
            });
            set_nodes.insert(set, id);
        }
        // Zeros of all types, for the zero inits.
        let mut literal_nodes: FxHashMap<Literal, usize> = FxHashMap::default();
        for ty in Type::CONCRETE {
            let id = nodes.len();
            let zero = Literal::zero(ty);
            nodes.push(Node {
                literal: Some(zero),
                ..Node::default()
            });
            literal_nodes.insert(zero, id);
        }

        // A def of `None` is the zero init for a variable, but the incoming
        // argument (opaque) for a parameter.
        let node_of_def = |def: Option<Expr>,
                           index_ty: Type,
                           is_param: bool,
                           set_nodes: &FxHashMap<Expr, usize>,
                           literal_nodes: &FxHashMap<Literal, usize>|
         -> Option<usize> {
            match def {
                Some(set) => set_nodes.get(&set).copied(),
                None if is_param => None,
                None => literal_nodes.get(&Literal::zero(index_ty)).copied(),
            }
        };

        // Add connections.
        for node_id in 0..sets.len() {
            let set = nodes[node_id].set.unwrap();
            let value = match &body.exprs[set] {
                &ExprData::LocalSet { value, .. } => value,
                other => panic!("IR violation: equivalence over non-set {:?}", other),
            };
            if body.expr_ty(value) == Type::Unreachable {
                continue;
            }
            let value = body.fallthrough(value);
            match &body.exprs[value] {
                ExprData::LocalSet { .. } => {
                    // A tee: directly equivalent to it.
                    if let Some(&other) = set_nodes.get(&value) {
                        add_direct(&mut nodes, node_id, other);
                    }
                }
                ExprData::LocalGet { index, ty } => {
                    let is_param = body.is_param(*index);
                    let Some(defs) = get_setses.get(&value) else {
                        continue;
                    };
                    if defs.len() == 1 {
                        if let Some(other) = node_of_def(
                            *defs.iter().next().unwrap(),
                            *ty,
                            is_param,
                            &set_nodes,
                            &literal_nodes,
                        ) {
                            add_direct(&mut nodes, node_id, other);
                        }
                    } else if defs.len() > 1 {
                        let sources: Option<Vec<usize>> = defs
                            .iter()
                            .map(|&def| {
                                node_of_def(def, *ty, is_param, &set_nodes, &literal_nodes)
                            })
                            .collect();
                        match sources {
                            Some(sources) => {
                                for source in sources {
                                    nodes[node_id].merges_in.push(source);
                                    nodes[source].merges_out.push(node_id);
                                }
                            }
                            None => nodes[node_id].merge_blocked = true,
                        }
                    }
                }
                ExprData::Const { value: literal } => {
                    match literal_nodes.get(literal) {
                        Some(&other) => add_direct(&mut nodes, node_id, other),
                        None => {
                            literal_nodes.insert(*literal, node_id);
                        }
                    }
                    nodes[node_id].literal = Some(*literal);
                }
                _ => {}
            }
        }

        // Floodfill connected closures.
        let mut classes: Vec<u32> = vec![0; nodes.len()];
        let mut curr_class = 0u32;
        for start in 0..nodes.len() {
            if classes[start] != 0 {
                continue;
            }
            curr_class += 1;
            let mut work: WorkList<usize> = WorkList::new();
            work.push(start);
            while let Some(curr) = work.pop() {
                // We may re-reach a node that tentatively took another class
                // before its merges completed; only the current class is
                // final for it.
                if classes[curr] == curr_class {
                    continue;
                }
                classes[curr] = curr_class;
                for i in 0..nodes[curr].directs.len() {
                    work.push(nodes[curr].directs[i]);
                }
                // A merge target may have just become joinable.
                for i in 0..nodes[curr].merges_out.len() {
                    let merge_out = nodes[curr].merges_out[i];
                    if classes[merge_out] == curr_class || nodes[merge_out].merge_blocked {
                        continue;
                    }
                    debug_assert!(!nodes[merge_out].merges_in.is_empty());
                    if nodes[merge_out]
                        .merges_in
                        .iter()
                        .all(|&source| classes[source] == curr_class)
                    {
                        work.push(merge_out);
                    }
                }
            }
        }

        let mut result = Equivalences::default();
        for (node, class) in nodes.iter().zip(&classes) {
            if let Some(set) = node.set {
                result.set_classes.insert(set, *class);
            }
            if let Some(literal) = node.literal {
                result.literal_classes.insert(literal, *class);
            }
        }
        result
    }

    /// The class of a set; 0 if unknown.
    pub fn class_of_set(&self, set: Expr) -> u32 {
        self.set_classes.get(&set).copied().unwrap_or(0)
    }

    pub fn class_of_literal(&self, literal: Literal) -> u32 {
        self.literal_classes.get(&literal).copied().unwrap_or(0)
    }

    pub fn are_equivalent(&self, a: Expr, b: Expr) -> bool {
        let class_a = self.class_of_set(a);
        class_a != 0 && class_a == self.class_of_set(b)
    }
}

fn add_direct(nodes: &mut [Node], a: usize, b: usize) {
    nodes[a].directs.push(b);
    nodes[b].directs.push(a);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::LocalGraph;
    use crate::ir::FunctionBody;

    fn graph_of(f: &mut FunctionBody) -> LocalGraph {
        LocalGraph::new(f)
    }

    #[test]
    fn copy_chain_is_one_class() {
        // x = 1; y = x; both sets hold the same value.
        let mut f = FunctionBody::new("f", vec![], Type::None);
        let x = f.add_var(Type::I32);
        let y = f.add_var(Type::I32);
        let one = f.i32_const(1);
        let sx = f.local_set(x, one);
        let gx = f.local_get(x);
        let sy = f.local_set(y, gx);
        let gy = f.local_get(y);
        let d = f.drop_(gy);
        let b = f.block(vec![sx, sy, d]);
        f.body = b;
        let graph = graph_of(&mut f);
        let equivalences = Equivalences::compute(&f, &graph.sets, &graph.get_setses);
        assert!(equivalences.are_equivalent(sx, sy));
    }

    #[test]
    fn same_constant_same_class() {
        let mut f = FunctionBody::new("f", vec![], Type::None);
        let x = f.add_var(Type::I32);
        let y = f.add_var(Type::I32);
        let c1 = f.i32_const(7);
        let sx = f.local_set(x, c1);
        let c2 = f.i32_const(7);
        let sy = f.local_set(y, c2);
        let gx = f.local_get(x);
        let gy = f.local_get(y);
        let d1 = f.drop_(gx);
        let d2 = f.drop_(gy);
        let b = f.block(vec![sx, sy, d1, d2]);
        f.body = b;
        let graph = graph_of(&mut f);
        let equivalences = Equivalences::compute(&f, &graph.sets, &graph.get_setses);
        assert!(equivalences.are_equivalent(sx, sy));
    }

    #[test]
    fn different_constants_differ() {
        let mut f = FunctionBody::new("f", vec![], Type::None);
        let x = f.add_var(Type::I32);
        let y = f.add_var(Type::I32);
        let c1 = f.i32_const(1);
        let sx = f.local_set(x, c1);
        let c2 = f.i32_const(2);
        let sy = f.local_set(y, c2);
        let gx = f.local_get(x);
        let gy = f.local_get(y);
        let d1 = f.drop_(gx);
        let d2 = f.drop_(gy);
        let b = f.block(vec![sx, sy, d1, d2]);
        f.body = b;
        let graph = graph_of(&mut f);
        let equivalences = Equivalences::compute(&f, &graph.sets, &graph.get_setses);
        assert!(!equivalences.are_equivalent(sx, sy));
    }

    #[test]
    fn zero_constant_matches_zero_init_class() {
        // A set of zero is in the zero literal's class.
        let mut f = FunctionBody::new("f", vec![], Type::None);
        let x = f.add_var(Type::I32);
        let zero = f.i32_const(0);
        let sx = f.local_set(x, zero);
        let gx = f.local_get(x);
        let d = f.drop_(gx);
        let b = f.block(vec![sx, d]);
        f.body = b;
        let graph = graph_of(&mut f);
        let equivalences = Equivalences::compute(&f, &graph.sets, &graph.get_setses);
        assert_eq!(
            equivalences.class_of_set(sx),
            equivalences.class_of_literal(Literal::I32(0))
        );
        assert_ne!(equivalences.class_of_set(sx), 0);
    }

    #[test]
    fn merge_joins_only_when_all_sources_agree() {
        // x = 1 on both arms, then y = x: all in one class.
        let mut f = FunctionBody::new("f", vec![Type::I32], Type::None);
        let x = f.add_var(Type::I32);
        let y = f.add_var(Type::I32);
        let cond = f.local_get(0);
        let one_a = f.i32_const(1);
        let s1 = f.local_set(x, one_a);
        let one_b = f.i32_const(1);
        let s2 = f.local_set(x, one_b);
        let iff = f.if_(cond, s1, Some(s2));
        let gx = f.local_get(x);
        let sy = f.local_set(y, gx);
        let gy = f.local_get(y);
        let d = f.drop_(gy);
        let b = f.block(vec![iff, sy, d]);
        f.body = b;
        let graph = graph_of(&mut f);
        let equivalences = Equivalences::compute(&f, &graph.sets, &graph.get_setses);
        assert!(equivalences.are_equivalent(s1, s2));
        assert!(equivalences.are_equivalent(s1, sy));
    }

    #[test]
    fn divergent_merge_stays_apart() {
        // x = 1 or 2 depending on the arm; y = x must not join either.
        let mut f = FunctionBody::new("f", vec![Type::I32], Type::None);
        let x = f.add_var(Type::I32);
        let y = f.add_var(Type::I32);
        let cond = f.local_get(0);
        let one = f.i32_const(1);
        let s1 = f.local_set(x, one);
        let two = f.i32_const(2);
        let s2 = f.local_set(x, two);
        let iff = f.if_(cond, s1, Some(s2));
        let gx = f.local_get(x);
        let sy = f.local_set(y, gx);
        let gy = f.local_get(y);
        let d = f.drop_(gy);
        let b = f.block(vec![iff, sy, d]);
        f.body = b;
        let graph = graph_of(&mut f);
        let equivalences = Equivalences::compute(&f, &graph.sets, &graph.get_setses);
        assert!(!equivalences.are_equivalent(s1, s2));
        assert!(!equivalences.are_equivalent(sy, s1));
        assert!(!equivalences.are_equivalent(sy, s2));
    }
}
