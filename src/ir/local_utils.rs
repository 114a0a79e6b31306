//! Small local-related utilities.

use super::effects::EffectAnalyzer;
use super::{Expr, ExprData, FunctionBody, LocalId};

/// Counts gets per local index over a subtree.
pub struct GetLocalCounter {
    pub num: Vec<u32>,
}

impl GetLocalCounter {
    pub fn new(body: &FunctionBody) -> GetLocalCounter {
        let mut counter = GetLocalCounter {
            num: vec![0; body.num_locals()],
        };
        counter.walk(body, body.body);
        counter
    }

    fn walk(&mut self, body: &FunctionBody, e: Expr) {
        if let ExprData::LocalGet { index, .. } = &body.exprs[e] {
            self.num[*index as usize] += 1;
        }
        let mut children = vec![];
        body.exprs[e].visit_children(|c| children.push(c));
        for c in children {
            self.walk(body, c);
        }
    }
}

/// Removes trivially unneeded sets: sets no get can observe, and sets that
/// store the value their local already visibly holds (`x = x`, or `x`
/// through a tee chain). A cheap vacuum to run after passes that leave
/// such sets behind.
pub struct UnneededSetRemover {
    pub removed: bool,
}

impl UnneededSetRemover {
    pub fn run(body: &mut FunctionBody) -> bool {
        let counter = GetLocalCounter::new(body);
        let mut remover = UnneededSetRemover { removed: false };
        let root = body.body;
        remover.walk(body, &counter, root);
        remover.removed
    }

    fn walk(&mut self, body: &mut FunctionBody, counter: &GetLocalCounter, e: Expr) {
        let mut children = vec![];
        body.exprs[e].visit_children(|c| children.push(c));
        for c in children {
            self.walk(body, counter, c);
        }
        let &ExprData::LocalSet { index, value, .. } = &body.exprs[e] else {
            return;
        };
        if counter.num[index as usize] == 0 {
            self.remove(body, e);
            return;
        }
        if Self::stores_same_value(body, index, value) {
            self.remove(body, e);
        }
    }

    /// Whether `value` visibly yields what `index` already holds: a get of
    /// the same index, or a tee chain ending in one.
    fn stores_same_value(body: &FunctionBody, index: LocalId, value: Expr) -> bool {
        let mut curr = value;
        loop {
            match &body.exprs[curr] {
                &ExprData::LocalSet {
                    index: set_index,
                    value: inner,
                    ty,
                } if ty.is_concrete() => {
                    if set_index == index {
                        return true;
                    }
                    curr = inner;
                }
                &ExprData::LocalGet {
                    index: get_index, ..
                } => return get_index == index,
                _ => return false,
            }
        }
    }

    fn remove(&mut self, body: &mut FunctionBody, set: Expr) {
        let (value, tee) = match &body.exprs[set] {
            &ExprData::LocalSet { value, ty, .. } => (value, ty.is_concrete()),
            _ => unreachable!(),
        };
        if tee {
            body.exprs[set] = body.exprs[value].clone();
        } else if EffectAnalyzer::new(body, value).has_side_effects() {
            body.replace(set, ExprData::Drop { value });
        } else {
            body.nop_out(set);
        }
        self.removed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Type;

    #[test]
    fn set_with_no_gets_is_dropped() {
        let mut f = FunctionBody::new("f", vec![], Type::None);
        let x = f.add_var(Type::I32);
        let c = f.i32_const(3);
        let s = f.local_set(x, c);
        f.body = s;
        assert!(UnneededSetRemover::run(&mut f));
        assert!(matches!(f.exprs[s], ExprData::Nop));
    }

    #[test]
    fn self_copy_is_dropped_but_real_set_stays() {
        let mut f = FunctionBody::new("f", vec![], Type::None);
        let x = f.add_var(Type::I32);
        let c = f.i32_const(3);
        let s1 = f.local_set(x, c);
        let g = f.local_get(x);
        let s2 = f.local_set(x, g);
        let g2 = f.local_get(x);
        let d = f.drop_(g2);
        let b = f.block(vec![s1, s2, d]);
        f.body = b;
        assert!(UnneededSetRemover::run(&mut f));
        assert!(matches!(f.exprs[s1], ExprData::LocalSet { .. }));
        assert!(matches!(f.exprs[s2], ExprData::Nop));
    }
}
