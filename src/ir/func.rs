//! Function declarations and bodies.

use super::{Expr, ExprData, Literal, LocalId, Name, Signature, Type};
use crate::entity::EntityVec;

#[derive(Clone, Debug)]
pub enum FuncDecl {
    Import(Signature, Name),
    Body(Signature, FunctionBody),
}

impl FuncDecl {
    pub fn sig(&self) -> Signature {
        match self {
            FuncDecl::Import(sig, _) => *sig,
            FuncDecl::Body(sig, ..) => *sig,
        }
    }

    pub fn body(&self) -> Option<&FunctionBody> {
        match self {
            FuncDecl::Body(_, body) => Some(body),
            _ => None,
        }
    }

    pub fn body_mut(&mut self) -> Option<&mut FunctionBody> {
        match self {
            FuncDecl::Body(_, body) => Some(body),
            _ => None,
        }
    }

    pub fn is_import(&self) -> bool {
        matches!(self, FuncDecl::Import(..))
    }
}

/// A function body: local declarations plus an arena of expression nodes
/// rooted at `body`.
#[derive(Clone, Debug)]
pub struct FunctionBody {
    pub name: Name,
    /// Parameter types. Params occupy local indices `0..params.len()` and
    /// are positionally fixed.
    pub params: Vec<Type>,
    /// Result type; `Type::None` for a void function.
    pub result: Type,
    /// Non-parameter local types, indexed from `params.len()` upward.
    pub vars: Vec<Type>,
    /// Optional debug names per local. Cleared by index-rewriting passes.
    pub local_names: Vec<Option<Name>>,
    pub exprs: EntityVec<Expr, ExprData>,
    pub body: Expr,
}

impl FunctionBody {
    pub fn new(name: impl Into<Name>, params: Vec<Type>, result: Type) -> FunctionBody {
        let mut exprs = EntityVec::default();
        let body = exprs.push(ExprData::Nop);
        FunctionBody {
            name: name.into(),
            params,
            result,
            vars: vec![],
            local_names: vec![],
            exprs,
            body,
        }
    }

    pub fn num_params(&self) -> usize {
        self.params.len()
    }

    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    pub fn num_locals(&self) -> usize {
        self.params.len() + self.vars.len()
    }

    pub fn is_param(&self, index: LocalId) -> bool {
        (index as usize) < self.params.len()
    }

    pub fn local_type(&self, index: LocalId) -> Type {
        let index = index as usize;
        if index < self.params.len() {
            self.params[index]
        } else {
            self.vars[index - self.params.len()]
        }
    }

    pub fn add_var(&mut self, ty: Type) -> LocalId {
        self.vars.push(ty);
        (self.num_locals() - 1) as LocalId
    }

    pub fn add(&mut self, data: ExprData) -> Expr {
        self.exprs.push(data)
    }

    /// Overwrite a node in place. Every id that referenced `at` now sees the
    /// new expression.
    pub fn replace(&mut self, at: Expr, data: ExprData) {
        self.exprs[at] = data;
    }

    pub fn nop_out(&mut self, at: Expr) {
        self.exprs[at] = ExprData::Nop;
    }

    pub fn is_tee(&self, e: Expr) -> bool {
        matches!(&self.exprs[e], ExprData::LocalSet { ty, .. } if ty.is_concrete())
    }

    /// The type an expression yields.
    pub fn expr_ty(&self, e: Expr) -> Type {
        match &self.exprs[e] {
            ExprData::Block { ty, .. }
            | ExprData::If { ty, .. }
            | ExprData::Loop { ty, .. }
            | ExprData::Call { ty, .. }
            | ExprData::CallIndirect { ty, .. }
            | ExprData::LocalGet { ty, .. }
            | ExprData::LocalSet { ty, .. }
            | ExprData::GlobalGet { ty, .. }
            | ExprData::Load { ty, .. }
            | ExprData::AtomicRmw { ty, .. }
            | ExprData::AtomicCmpxchg { ty, .. }
            | ExprData::Unary { ty, .. }
            | ExprData::Binary { ty, .. }
            | ExprData::Select { ty, .. } => *ty,
            ExprData::Break { condition, .. } => {
                if condition.is_some() {
                    Type::None
                } else {
                    Type::Unreachable
                }
            }
            ExprData::Switch { .. } | ExprData::Return { .. } | ExprData::Unreachable => {
                Type::Unreachable
            }
            ExprData::Const { value } => value.ty(),
            ExprData::GlobalSet { .. }
            | ExprData::Store { .. }
            | ExprData::Drop { .. }
            | ExprData::Nop => Type::None,
            ExprData::Host { op, .. } => match op {
                super::HostOp::MemorySize | super::HostOp::MemoryGrow => Type::I32,
            },
        }
    }

    /// Recompute a node's stored type from its (already-finalized) children.
    pub fn finalize(&mut self, e: Expr) {
        let ty = match &self.exprs[e] {
            ExprData::Block { list, .. } => match list.last() {
                Some(&last) => match self.expr_ty(last) {
                    Type::Unreachable => Type::Unreachable,
                    t if t.is_concrete() => t,
                    _ => Type::None,
                },
                None => Type::None,
            },
            ExprData::If {
                condition,
                if_true,
                if_false,
                ..
            } => {
                if self.expr_ty(*condition) == Type::Unreachable {
                    Type::Unreachable
                } else if let Some(if_false) = if_false {
                    let t = self.expr_ty(*if_true);
                    let f = self.expr_ty(*if_false);
                    if t == f && t.is_concrete() {
                        t
                    } else if t == Type::Unreachable && f.is_concrete() {
                        f
                    } else if f == Type::Unreachable && t.is_concrete() {
                        t
                    } else if t == Type::Unreachable && f == Type::Unreachable {
                        Type::Unreachable
                    } else {
                        Type::None
                    }
                } else {
                    Type::None
                }
            }
            ExprData::Loop { body, .. } => self.expr_ty(*body),
            ExprData::LocalSet { value, ty, .. } => {
                if ty.is_concrete() || self.expr_ty(*value) == Type::Unreachable {
                    self.expr_ty(*value)
                } else {
                    Type::None
                }
            }
            _ => return,
        };
        match &mut self.exprs[e] {
            ExprData::Block { ty: slot, .. }
            | ExprData::If { ty: slot, .. }
            | ExprData::Loop { ty: slot, .. }
            | ExprData::LocalSet { ty: slot, .. } => *slot = ty,
            _ => unreachable!(),
        }
    }

    // Node constructors, for programmatic construction and tests.

    pub fn nop(&mut self) -> Expr {
        self.add(ExprData::Nop)
    }

    pub fn unreachable(&mut self) -> Expr {
        self.add(ExprData::Unreachable)
    }

    pub fn const_(&mut self, value: Literal) -> Expr {
        self.add(ExprData::Const { value })
    }

    pub fn i32_const(&mut self, value: i32) -> Expr {
        self.const_(Literal::I32(value))
    }

    pub fn local_get(&mut self, index: LocalId) -> Expr {
        let ty = self.local_type(index);
        self.add(ExprData::LocalGet { index, ty })
    }

    pub fn local_set(&mut self, index: LocalId, value: Expr) -> Expr {
        self.add(ExprData::LocalSet {
            index,
            value,
            ty: Type::None,
        })
    }

    pub fn local_tee(&mut self, index: LocalId, value: Expr) -> Expr {
        let ty = self.local_type(index);
        self.add(ExprData::LocalSet { index, value, ty })
    }

    pub fn global_get(&mut self, global: super::Global, ty: Type) -> Expr {
        self.add(ExprData::GlobalGet { global, ty })
    }

    pub fn global_set(&mut self, global: super::Global, value: Expr) -> Expr {
        self.add(ExprData::GlobalSet { global, value })
    }

    pub fn drop_(&mut self, value: Expr) -> Expr {
        self.add(ExprData::Drop { value })
    }

    pub fn block(&mut self, list: Vec<Expr>) -> Expr {
        let e = self.add(ExprData::Block {
            name: None,
            list,
            ty: Type::None,
        });
        self.finalize(e);
        e
    }

    pub fn named_block(&mut self, name: impl Into<Name>, list: Vec<Expr>) -> Expr {
        let e = self.add(ExprData::Block {
            name: Some(name.into()),
            list,
            ty: Type::None,
        });
        self.finalize(e);
        e
    }

    pub fn loop_(&mut self, name: impl Into<Name>, body: Expr) -> Expr {
        let e = self.add(ExprData::Loop {
            name: Some(name.into()),
            body,
            ty: Type::None,
        });
        self.finalize(e);
        e
    }

    pub fn if_(&mut self, condition: Expr, if_true: Expr, if_false: Option<Expr>) -> Expr {
        let e = self.add(ExprData::If {
            condition,
            if_true,
            if_false,
            ty: Type::None,
        });
        self.finalize(e);
        e
    }

    pub fn br(&mut self, name: impl Into<Name>) -> Expr {
        self.add(ExprData::Break {
            name: name.into(),
            condition: None,
            value: None,
        })
    }

    pub fn br_if(&mut self, name: impl Into<Name>, condition: Expr) -> Expr {
        self.add(ExprData::Break {
            name: name.into(),
            condition: Some(condition),
            value: None,
        })
    }

    pub fn ret(&mut self, value: Option<Expr>) -> Expr {
        self.add(ExprData::Return { value })
    }

    pub fn call(&mut self, target: super::Func, operands: Vec<Expr>, ty: Type) -> Expr {
        self.add(ExprData::Call {
            target,
            operands,
            ty,
        })
    }

    pub fn unary(&mut self, op: super::UnaryOp, value: Expr, ty: Type) -> Expr {
        self.add(ExprData::Unary { op, value, ty })
    }

    pub fn binary(&mut self, op: super::BinaryOp, left: Expr, right: Expr, ty: Type) -> Expr {
        self.add(ExprData::Binary {
            op,
            left,
            right,
            ty,
        })
    }

    /// Look through trivially value-forwarding wrappers (blocks yielding
    /// their last child, loops yielding their body) to the expression that
    /// produces the value.
    pub fn fallthrough(&self, e: Expr) -> Expr {
        let mut curr = e;
        loop {
            match &self.exprs[curr] {
                ExprData::Block { list, ty, .. } if ty.is_concrete() && !list.is_empty() => {
                    curr = *list.last().unwrap();
                }
                ExprData::Loop { body, ty, .. } if ty.is_concrete() => {
                    curr = *body;
                }
                _ => return curr,
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tee_vs_set() {
        let mut f = FunctionBody::new("f", vec![Type::I32], Type::None);
        let x = f.add_var(Type::I32);
        let g = f.local_get(0);
        let set = f.local_set(x, g);
        let g2 = f.local_get(0);
        let tee = f.local_tee(x, g2);
        assert!(!f.is_tee(set));
        assert!(f.is_tee(tee));
        assert_eq!(f.expr_ty(set), Type::None);
        assert_eq!(f.expr_ty(tee), Type::I32);
    }

    #[test]
    fn block_finalize_takes_last_type() {
        let mut f = FunctionBody::new("f", vec![], Type::None);
        let c = f.i32_const(1);
        let d = f.nop();
        let b = f.block(vec![d, c]);
        assert_eq!(f.expr_ty(b), Type::I32);
    }

    #[test]
    fn fallthrough_looks_through_blocks() {
        let mut f = FunctionBody::new("f", vec![], Type::None);
        let c = f.i32_const(5);
        let inner = f.block(vec![c]);
        let outer = f.block(vec![inner]);
        assert_eq!(f.fallthrough(outer), c);
    }
}
