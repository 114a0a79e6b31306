//! Lower-bound estimate of the encoded size of an expression tree.
//!
//! The final binary size depends on LEBs whose widths depend on the rest
//! of the module, so this assumes every variable-width field is minimal.
//! Unnamed blocks are assumed not to be emitted at all, which is valid in
//! stacky code. A heuristic, not a promise.

use crate::binary::{s32_leb_len, s64_leb_len};
use crate::ir::{Expr, ExprData, FunctionBody, Literal};

pub fn estimate(body: &FunctionBody, root: Expr) -> u32 {
    let mut total = visit(body, root);
    let mut children = vec![];
    body.exprs[root].visit_children(|c| children.push(c));
    for child in children {
        total += estimate(body, child);
    }
    total
}

/// Binary size of a literal's payload. Smaller than a Const node, which
/// also carries an opcode.
fn literal_size(value: Literal) -> u32 {
    match value {
        Literal::I32(v) => s32_leb_len(v),
        Literal::I64(v) => s64_leb_len(v),
        Literal::F32(_) | Literal::F64(_) | Literal::V128(_) => value.ty().size(),
    }
}

fn visit(body: &FunctionBody, e: Expr) -> u32 {
    match &body.exprs[e] {
        // Without a name a block need not be emitted; with one there is a
        // block start, a type, and an end.
        ExprData::Block { name, .. } => {
            if name.is_some() {
                3
            } else {
                0
            }
        }
        ExprData::If { if_false, .. } => {
            if if_false.is_some() {
                4
            } else {
                3
            }
        }
        ExprData::Loop { .. } => 3,
        // Assume the label LEB32 is of minimal size.
        ExprData::Break { .. } => 2,
        ExprData::Switch { targets, .. } => 3 + targets.len() as u32,
        ExprData::Call { .. } => 2,
        ExprData::CallIndirect { .. } => 3,
        ExprData::LocalGet { .. } | ExprData::LocalSet { .. } => 2,
        ExprData::GlobalGet { .. } | ExprData::GlobalSet { .. } => 2,
        ExprData::Load { atomic, .. } | ExprData::Store { atomic, .. } => {
            if *atomic {
                4
            } else {
                3
            }
        }
        ExprData::AtomicRmw { .. } | ExprData::AtomicCmpxchg { .. } => 4,
        ExprData::Const { value } => {
            1 + literal_size(*value) + if value.ty() == crate::ir::Type::V128 { 1 } else { 0 }
        }
        ExprData::Unary { op, .. } => 1 + if op.is_prefixed() { 1 } else { 0 },
        ExprData::Binary { op, .. } => 1 + if op.is_prefixed() { 1 } else { 0 },
        ExprData::Select { .. } => 1,
        ExprData::Drop { .. } => 1,
        ExprData::Return { .. } => 1,
        ExprData::Host { .. } => 2,
        ExprData::Nop => 1,
        ExprData::Unreachable => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryOp, Type};

    #[test]
    fn small_constants_are_small() {
        let mut f = FunctionBody::new("f", vec![], Type::None);
        let small = f.i32_const(1);
        let big = f.i32_const(100_000);
        assert_eq!(estimate(&f, small), 2);
        assert!(estimate(&f, big) > estimate(&f, small));
    }

    #[test]
    fn unnamed_block_is_free() {
        let mut f = FunctionBody::new("f", vec![Type::I32], Type::None);
        let g = f.local_get(0);
        let d = f.drop_(g);
        let unnamed = f.block(vec![d]);
        assert_eq!(estimate(&f, unnamed), 3);
        let g2 = f.local_get(0);
        let d2 = f.drop_(g2);
        let named = f.named_block("b", vec![d2]);
        assert_eq!(estimate(&f, named), 6);
    }

    #[test]
    fn sums_over_children() {
        let mut f = FunctionBody::new("f", vec![Type::I32], Type::I32);
        let a = f.local_get(0);
        let b = f.i32_const(2);
        let add = f.binary(BinaryOp::AddI32, a, b, Type::I32);
        // get(2) + const(1+1) + add(1)
        assert_eq!(estimate(&f, add), 5);
    }
}
