//! Effect analysis over expression subtrees.
//!
//! Deliberately coarse: a call is assumed to read and write anything, and
//! any break out of the subtree counts as a transfer of control. Good
//! enough for the sinking and set-removal decisions that consume it.

use super::{BinaryOp, Expr, ExprData, FunctionBody, Global, HostOp, LocalId};
use fxhash::FxHashSet;

#[derive(Clone, Debug, Default)]
pub struct EffectAnalyzer {
    /// Breaks, switches, or returns that may leave the subtree.
    pub transfers_control: bool,
    pub calls: bool,
    pub local_reads: FxHashSet<LocalId>,
    pub local_writes: FxHashSet<LocalId>,
    pub global_reads: FxHashSet<Global>,
    pub global_writes: FxHashSet<Global>,
    pub reads_memory: bool,
    pub writes_memory: bool,
    pub implicit_trap: bool,
}

impl EffectAnalyzer {
    pub fn new(body: &FunctionBody, root: Expr) -> EffectAnalyzer {
        let mut analyzer = EffectAnalyzer::default();
        analyzer.walk(body, root);
        analyzer
    }

    fn walk(&mut self, body: &FunctionBody, e: Expr) {
        match &body.exprs[e] {
            ExprData::Break { .. } | ExprData::Switch { .. } | ExprData::Return { .. } => {
                self.transfers_control = true;
            }
            ExprData::Call { .. } | ExprData::CallIndirect { .. } => self.calls = true,
            ExprData::LocalGet { index, .. } => {
                self.local_reads.insert(*index);
            }
            ExprData::LocalSet { index, .. } => {
                self.local_writes.insert(*index);
            }
            ExprData::GlobalGet { global, .. } => {
                self.global_reads.insert(*global);
            }
            ExprData::GlobalSet { global, .. } => {
                self.global_writes.insert(*global);
            }
            ExprData::Load { .. } => {
                self.reads_memory = true;
                self.implicit_trap = true;
            }
            ExprData::Store { .. } => {
                self.writes_memory = true;
                self.implicit_trap = true;
            }
            ExprData::AtomicRmw { .. } | ExprData::AtomicCmpxchg { .. } => {
                self.reads_memory = true;
                self.writes_memory = true;
                self.implicit_trap = true;
            }
            ExprData::Binary { op, .. } => {
                if matches!(
                    op,
                    BinaryOp::DivSI32 | BinaryOp::DivUI32
                ) {
                    self.implicit_trap = true;
                }
            }
            ExprData::Host { op, .. } => {
                if *op == HostOp::MemoryGrow {
                    self.writes_memory = true;
                }
            }
            ExprData::Unreachable => self.implicit_trap = true,
            _ => {}
        }
        let mut children = smallvec::SmallVec::<[Expr; 4]>::new();
        body.exprs[e].visit_children(|c| children.push(c));
        for c in children {
            self.walk(body, c);
        }
    }

    pub fn has_side_effects(&self) -> bool {
        self.transfers_control
            || self.calls
            || !self.local_writes.is_empty()
            || !self.global_writes.is_empty()
            || self.writes_memory
            || self.implicit_trap
    }

    /// Whether this subtree's effects may change what `other` computes.
    pub fn invalidates(&self, other: &EffectAnalyzer) -> bool {
        if self.calls && (other.reads_memory || other.calls || !other.global_reads.is_empty()) {
            return true;
        }
        if other.calls && (self.writes_memory || !self.global_writes.is_empty()) {
            return true;
        }
        if self.writes_memory && other.reads_memory {
            return true;
        }
        if self
            .global_writes
            .iter()
            .any(|g| other.global_reads.contains(g))
        {
            return true;
        }
        if self
            .local_writes
            .iter()
            .any(|i| other.local_reads.contains(i))
        {
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Literal, Type};

    #[test]
    fn const_is_pure() {
        let mut f = FunctionBody::new("f", vec![], Type::None);
        let c = f.const_(Literal::I32(7));
        assert!(!EffectAnalyzer::new(&f, c).has_side_effects());
    }

    #[test]
    fn set_has_side_effects_and_invalidates_read() {
        let mut f = FunctionBody::new("f", vec![Type::I32], Type::None);
        let g = f.local_get(0);
        let s = f.local_set(0, g);
        let effects = EffectAnalyzer::new(&f, s);
        assert!(effects.has_side_effects());

        let g2 = f.local_get(0);
        let read = EffectAnalyzer::new(&f, g2);
        assert!(effects.invalidates(&read));
        assert!(!read.invalidates(&effects) || read.has_side_effects());
    }
}
