//! Expression nodes.

use super::{Func, Global, Literal, LocalId, Name, Signature, Type};
use crate::declare_entity;

declare_entity!(Expr, "e");

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    ClzI32,
    CtzI32,
    PopcntI32,
    EqZI32,
    ClzI64,
    CtzI64,
    PopcntI64,
    EqZI64,
    NegF32,
    AbsF32,
    SqrtF32,
    NegF64,
    AbsF64,
    SqrtF64,
    WrapI64,
    ExtendSI32,
    ExtendUI32,
    ConvertSI32ToF64,
    PromoteF32,
    DemoteF64,
    NegI32x4,
    SplatI32x4,
}

impl UnaryOp {
    /// Post-MVP ops carry a one-byte opcode prefix in the binary format.
    pub fn is_prefixed(self) -> bool {
        matches!(self, UnaryOp::NegI32x4 | UnaryOp::SplatI32x4)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    AddI32,
    SubI32,
    MulI32,
    DivSI32,
    DivUI32,
    AndI32,
    OrI32,
    XorI32,
    ShlI32,
    ShrSI32,
    ShrUI32,
    EqI32,
    NeI32,
    LtSI32,
    LtUI32,
    GtSI32,
    GtUI32,
    AddI64,
    SubI64,
    MulI64,
    AndI64,
    OrI64,
    XorI64,
    EqI64,
    NeI64,
    AddF32,
    SubF32,
    MulF32,
    DivF32,
    MinF32,
    MaxF32,
    EqF32,
    LtF32,
    AddF64,
    SubF64,
    MulF64,
    DivF64,
    MinF64,
    MaxF64,
    EqF64,
    LtF64,
    AddI32x4,
    SubI32x4,
}

impl BinaryOp {
    pub fn is_prefixed(self) -> bool {
        matches!(self, BinaryOp::AddI32x4 | BinaryOp::SubI32x4)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AtomicRmwOp {
    Add,
    Sub,
    And,
    Or,
    Xor,
    Xchg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HostOp {
    MemorySize,
    MemoryGrow,
}

/// One expression node. Children are `Expr` ids into the owning function's
/// arena; a node never aliases another node's children.
#[derive(Clone, Debug, PartialEq)]
pub enum ExprData {
    Block {
        /// Break target label; unnamed blocks are pure sequencing.
        name: Option<Name>,
        list: Vec<Expr>,
        ty: Type,
    },
    If {
        condition: Expr,
        if_true: Expr,
        if_false: Option<Expr>,
        ty: Type,
    },
    Loop {
        name: Option<Name>,
        body: Expr,
        ty: Type,
    },
    Break {
        name: Name,
        condition: Option<Expr>,
        value: Option<Expr>,
    },
    Switch {
        targets: Vec<Name>,
        default: Name,
        condition: Expr,
        value: Option<Expr>,
    },
    Call {
        target: Func,
        operands: Vec<Expr>,
        ty: Type,
    },
    CallIndirect {
        sig: Signature,
        target: Expr,
        operands: Vec<Expr>,
        ty: Type,
    },
    LocalGet {
        index: LocalId,
        ty: Type,
    },
    /// A write to a local; a tee iff `ty` is concrete (the written value is
    /// also yielded).
    LocalSet {
        index: LocalId,
        value: Expr,
        ty: Type,
    },
    GlobalGet {
        global: Global,
        ty: Type,
    },
    GlobalSet {
        global: Global,
        value: Expr,
    },
    Load {
        bytes: u8,
        signed: bool,
        offset: u32,
        align: u32,
        atomic: bool,
        ptr: Expr,
        ty: Type,
    },
    Store {
        bytes: u8,
        offset: u32,
        align: u32,
        atomic: bool,
        ptr: Expr,
        value: Expr,
        value_ty: Type,
    },
    AtomicRmw {
        op: AtomicRmwOp,
        bytes: u8,
        offset: u32,
        ptr: Expr,
        value: Expr,
        ty: Type,
    },
    AtomicCmpxchg {
        bytes: u8,
        offset: u32,
        ptr: Expr,
        expected: Expr,
        replacement: Expr,
        ty: Type,
    },
    Const {
        value: Literal,
    },
    Unary {
        op: UnaryOp,
        value: Expr,
        ty: Type,
    },
    Binary {
        op: BinaryOp,
        left: Expr,
        right: Expr,
        ty: Type,
    },
    Select {
        condition: Expr,
        if_true: Expr,
        if_false: Expr,
        ty: Type,
    },
    Drop {
        value: Expr,
    },
    Return {
        value: Option<Expr>,
    },
    Host {
        op: HostOp,
        operand: Option<Expr>,
    },
    Nop,
    Unreachable,
}

impl ExprData {
    pub fn is_local_set(&self) -> bool {
        matches!(self, ExprData::LocalSet { .. })
    }

    /// Visit direct children in evaluation order.
    pub fn visit_children<F: FnMut(Expr)>(&self, mut f: F) {
        match self {
            ExprData::Block { list, .. } => {
                for &e in list {
                    f(e);
                }
            }
            ExprData::If {
                condition,
                if_true,
                if_false,
                ..
            } => {
                f(*condition);
                f(*if_true);
                if let Some(e) = if_false {
                    f(*e);
                }
            }
            ExprData::Loop { body, .. } => f(*body),
            ExprData::Break {
                condition, value, ..
            } => {
                if let Some(e) = value {
                    f(*e);
                }
                if let Some(e) = condition {
                    f(*e);
                }
            }
            ExprData::Switch {
                condition, value, ..
            } => {
                if let Some(e) = value {
                    f(*e);
                }
                f(*condition);
            }
            ExprData::Call { operands, .. } => {
                for &e in operands {
                    f(e);
                }
            }
            ExprData::CallIndirect {
                target, operands, ..
            } => {
                for &e in operands {
                    f(e);
                }
                f(*target);
            }
            ExprData::LocalGet { .. }
            | ExprData::GlobalGet { .. }
            | ExprData::Const { .. }
            | ExprData::Nop
            | ExprData::Unreachable => {}
            ExprData::LocalSet { value, .. } => f(*value),
            ExprData::GlobalSet { value, .. } => f(*value),
            ExprData::Load { ptr, .. } => f(*ptr),
            ExprData::Store { ptr, value, .. } => {
                f(*ptr);
                f(*value);
            }
            ExprData::AtomicRmw { ptr, value, .. } => {
                f(*ptr);
                f(*value);
            }
            ExprData::AtomicCmpxchg {
                ptr,
                expected,
                replacement,
                ..
            } => {
                f(*ptr);
                f(*expected);
                f(*replacement);
            }
            ExprData::Unary { value, .. } => f(*value),
            ExprData::Binary { left, right, .. } => {
                f(*left);
                f(*right);
            }
            ExprData::Select {
                condition,
                if_true,
                if_false,
                ..
            } => {
                f(*if_true);
                f(*if_false);
                f(*condition);
            }
            ExprData::Drop { value } => f(*value),
            ExprData::Return { value } => {
                if let Some(e) = value {
                    f(*e);
                }
            }
            ExprData::Host { operand, .. } => {
                if let Some(e) = operand {
                    f(*e);
                }
            }
        }
    }
}
