//! Binary encoding utilities: minimal-LEB size helpers and function-body
//! emission.
//!
//! Only function *bodies* are emitted, and only internally: the reorder
//! pass fingerprints each function by its encoded bytes. Emission goes
//! through `wasm-encoder`, so the bytes match what a vanilla writer
//! produces for the same expression tree.

use crate::ir::{
    AtomicRmwOp, BinaryOp, Expr, ExprData, FunctionBody, HostOp, Literal, Name, Type, UnaryOp,
};
use wasm_encoder::{BlockType, Encode, Function, Instruction, MemArg, ValType};

pub fn u32_leb_len(value: u32) -> u32 {
    let mut value = value;
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

pub fn s32_leb_len(value: i32) -> u32 {
    let mut value = value;
    let mut len = 0;
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        len += 1;
        let sign_clear = byte & 0x40 == 0;
        if (value == 0 && sign_clear) || (value == -1 && !sign_clear) {
            return len;
        }
    }
}

pub fn s64_leb_len(value: i64) -> u32 {
    let mut value = value;
    let mut len = 0;
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        len += 1;
        let sign_clear = byte & 0x40 == 0;
        if (value == 0 && sign_clear) || (value == -1 && !sign_clear) {
            return len;
        }
    }
}

fn val_type(ty: Type) -> ValType {
    match ty {
        Type::I32 => ValType::I32,
        Type::I64 => ValType::I64,
        Type::F32 => ValType::F32,
        Type::F64 => ValType::F64,
        Type::V128 => ValType::V128,
        Type::None | Type::Unreachable => panic!("no value type for {:?}", ty),
    }
}

fn block_type(ty: Type) -> BlockType {
    if ty.is_concrete() {
        BlockType::Result(val_type(ty))
    } else {
        BlockType::Empty
    }
}

/// Encode one function body (locals declarations plus code) to bytes.
pub fn encode_function_body(body: &FunctionBody) -> Vec<u8> {
    // Run-length compress the local declarations.
    let mut locals: Vec<(u32, ValType)> = vec![];
    for &ty in &body.vars {
        let vt = val_type(ty);
        match locals.last_mut() {
            Some((count, prev)) if *prev == vt => *count += 1,
            _ => locals.push((1, vt)),
        }
    }
    let mut function = Function::new(locals);
    let mut emitter = Emitter {
        body,
        function: &mut function,
        frames: vec![],
    };
    emitter.emit(body.body);
    emitter.function.instruction(&Instruction::End);
    let mut bytes = vec![];
    function.encode(&mut bytes);
    bytes
}

struct Emitter<'a> {
    body: &'a FunctionBody,
    function: &'a mut Function,
    /// Enclosing control frames, innermost last. `None` for unlabelled
    /// frames (ifs).
    frames: Vec<Option<Name>>,
}

impl<'a> Emitter<'a> {
    fn label_depth(&self, name: &Name) -> u32 {
        self.frames
            .iter()
            .rev()
            .position(|frame| frame.as_ref() == Some(name))
            .expect("branch to unknown label") as u32
    }

    fn mem_arg(&self, offset: u32, align: u32) -> MemArg {
        MemArg {
            offset: offset as u64,
            align,
            memory_index: 0,
        }
    }

    fn emit(&mut self, e: Expr) {
        use crate::entity::EntityRef;
        match &self.body.exprs[e] {
            ExprData::Block { name, list, ty } => match name {
                Some(name) => {
                    self.function.instruction(&Instruction::Block(block_type(*ty)));
                    self.frames.push(Some(name.clone()));
                    for &child in list {
                        self.emit(child);
                    }
                    self.frames.pop();
                    self.function.instruction(&Instruction::End);
                }
                None => {
                    // An unlabelled block is pure sequencing; stacky code
                    // needs no delimiters for it.
                    for &child in list {
                        self.emit(child);
                    }
                }
            },
            ExprData::Loop { name, body, ty } => {
                self.function.instruction(&Instruction::Loop(block_type(*ty)));
                self.frames.push(name.clone());
                self.emit(*body);
                self.frames.pop();
                self.function.instruction(&Instruction::End);
            }
            ExprData::If {
                condition,
                if_true,
                if_false,
                ty,
            } => {
                self.emit(*condition);
                self.function.instruction(&Instruction::If(block_type(*ty)));
                self.frames.push(None);
                self.emit(*if_true);
                if let Some(if_false) = if_false {
                    self.function.instruction(&Instruction::Else);
                    self.emit(*if_false);
                }
                self.frames.pop();
                self.function.instruction(&Instruction::End);
            }
            ExprData::Break {
                name,
                condition,
                value,
            } => {
                if let Some(value) = value {
                    self.emit(*value);
                }
                let depth = self.label_depth(name);
                match condition {
                    Some(condition) => {
                        self.emit(*condition);
                        self.function.instruction(&Instruction::BrIf(depth));
                    }
                    None => {
                        self.function.instruction(&Instruction::Br(depth));
                    }
                }
            }
            ExprData::Switch {
                targets,
                default,
                condition,
                value,
            } => {
                if let Some(value) = value {
                    self.emit(*value);
                }
                self.emit(*condition);
                let depths: Vec<u32> = targets.iter().map(|t| self.label_depth(t)).collect();
                let default = self.label_depth(default);
                self.function
                    .instruction(&Instruction::BrTable(depths.into(), default));
            }
            ExprData::Call {
                target, operands, ..
            } => {
                for &operand in operands {
                    self.emit(operand);
                }
                self.function
                    .instruction(&Instruction::Call(target.index() as u32));
            }
            ExprData::CallIndirect {
                sig,
                target,
                operands,
                ..
            } => {
                for &operand in operands {
                    self.emit(operand);
                }
                self.emit(*target);
                self.function.instruction(&Instruction::CallIndirect {
                    ty: sig.index() as u32,
                    table: 0,
                });
            }
            ExprData::LocalGet { index, .. } => {
                self.function.instruction(&Instruction::LocalGet(*index));
            }
            ExprData::LocalSet { index, value, ty } => {
                self.emit(*value);
                let instruction = if ty.is_concrete() {
                    Instruction::LocalTee(*index)
                } else {
                    Instruction::LocalSet(*index)
                };
                self.function.instruction(&instruction);
            }
            ExprData::GlobalGet { global, .. } => {
                self.function
                    .instruction(&Instruction::GlobalGet(global.index() as u32));
            }
            ExprData::GlobalSet { global, value } => {
                self.emit(*value);
                self.function
                    .instruction(&Instruction::GlobalSet(global.index() as u32));
            }
            ExprData::Load {
                bytes,
                signed,
                offset,
                align,
                atomic,
                ptr,
                ty,
            } => {
                self.emit(*ptr);
                let arg = self.mem_arg(*offset, *align);
                let instruction = load_instr(*ty, *bytes, *signed, *atomic, arg);
                self.function.instruction(&instruction);
            }
            ExprData::Store {
                bytes,
                offset,
                align,
                atomic,
                ptr,
                value,
                value_ty,
            } => {
                self.emit(*ptr);
                self.emit(*value);
                let arg = self.mem_arg(*offset, *align);
                let instruction = store_instr(*value_ty, *bytes, *atomic, arg);
                self.function.instruction(&instruction);
            }
            ExprData::AtomicRmw {
                op,
                bytes,
                offset,
                ptr,
                value,
                ty,
            } => {
                self.emit(*ptr);
                self.emit(*value);
                let arg = self.mem_arg(*offset, 0);
                let instruction = atomic_rmw_instr(*ty, *bytes, *op, arg);
                self.function.instruction(&instruction);
            }
            ExprData::AtomicCmpxchg {
                bytes,
                offset,
                ptr,
                expected,
                replacement,
                ty,
            } => {
                self.emit(*ptr);
                self.emit(*expected);
                self.emit(*replacement);
                let arg = self.mem_arg(*offset, 0);
                let instruction = atomic_cmpxchg_instr(*ty, *bytes, arg);
                self.function.instruction(&instruction);
            }
            ExprData::Const { value } => {
                let instruction = match value {
                    Literal::I32(v) => Instruction::I32Const(*v),
                    Literal::I64(v) => Instruction::I64Const(*v),
                    Literal::F32(bits) => Instruction::F32Const(f32::from_bits(*bits)),
                    Literal::F64(bits) => Instruction::F64Const(f64::from_bits(*bits)),
                    Literal::V128(bytes) => {
                        Instruction::V128Const(i128::from_le_bytes(*bytes))
                    }
                };
                self.function.instruction(&instruction);
            }
            ExprData::Unary { op, value, .. } => {
                self.emit(*value);
                self.function.instruction(&unary_instr(*op));
            }
            ExprData::Binary { op, left, right, .. } => {
                self.emit(*left);
                self.emit(*right);
                self.function.instruction(&binary_instr(*op));
            }
            ExprData::Select {
                condition,
                if_true,
                if_false,
                ..
            } => {
                self.emit(*if_true);
                self.emit(*if_false);
                self.emit(*condition);
                self.function.instruction(&Instruction::Select);
            }
            ExprData::Drop { value } => {
                self.emit(*value);
                self.function.instruction(&Instruction::Drop);
            }
            ExprData::Return { value } => {
                if let Some(value) = value {
                    self.emit(*value);
                }
                self.function.instruction(&Instruction::Return);
            }
            ExprData::Host { op, operand } => {
                if let Some(operand) = operand {
                    self.emit(*operand);
                }
                let instruction = match op {
                    HostOp::MemorySize => Instruction::MemorySize(0),
                    HostOp::MemoryGrow => Instruction::MemoryGrow(0),
                };
                self.function.instruction(&instruction);
            }
            ExprData::Nop => {
                self.function.instruction(&Instruction::Nop);
            }
            ExprData::Unreachable => {
                self.function.instruction(&Instruction::Unreachable);
            }
        }
    }
}

fn load_instr(ty: Type, bytes: u8, signed: bool, atomic: bool, arg: MemArg) -> Instruction<'static> {
    use Instruction::*;
    if atomic {
        return match (ty, bytes) {
            (Type::I32, 4) => I32AtomicLoad(arg),
            (Type::I32, 2) => I32AtomicLoad16U(arg),
            (Type::I32, 1) => I32AtomicLoad8U(arg),
            (Type::I64, 8) => I64AtomicLoad(arg),
            (Type::I64, 4) => I64AtomicLoad32U(arg),
            (Type::I64, 2) => I64AtomicLoad16U(arg),
            (Type::I64, 1) => I64AtomicLoad8U(arg),
            _ => panic!("bad atomic load {:?}/{}", ty, bytes),
        };
    }
    match (ty, bytes, signed) {
        (Type::I32, 4, _) => I32Load(arg),
        (Type::I32, 2, true) => I32Load16S(arg),
        (Type::I32, 2, false) => I32Load16U(arg),
        (Type::I32, 1, true) => I32Load8S(arg),
        (Type::I32, 1, false) => I32Load8U(arg),
        (Type::I64, 8, _) => I64Load(arg),
        (Type::I64, 4, true) => I64Load32S(arg),
        (Type::I64, 4, false) => I64Load32U(arg),
        (Type::I64, 2, true) => I64Load16S(arg),
        (Type::I64, 2, false) => I64Load16U(arg),
        (Type::I64, 1, true) => I64Load8S(arg),
        (Type::I64, 1, false) => I64Load8U(arg),
        (Type::F32, _, _) => F32Load(arg),
        (Type::F64, _, _) => F64Load(arg),
        (Type::V128, _, _) => V128Load(arg),
        _ => panic!("bad load {:?}/{}", ty, bytes),
    }
}

fn store_instr(value_ty: Type, bytes: u8, atomic: bool, arg: MemArg) -> Instruction<'static> {
    use Instruction::*;
    if atomic {
        return match (value_ty, bytes) {
            (Type::I32, 4) => I32AtomicStore(arg),
            (Type::I32, 2) => I32AtomicStore16(arg),
            (Type::I32, 1) => I32AtomicStore8(arg),
            (Type::I64, 8) => I64AtomicStore(arg),
            (Type::I64, 4) => I64AtomicStore32(arg),
            (Type::I64, 2) => I64AtomicStore16(arg),
            (Type::I64, 1) => I64AtomicStore8(arg),
            _ => panic!("bad atomic store {:?}/{}", value_ty, bytes),
        };
    }
    match (value_ty, bytes) {
        (Type::I32, 4) => I32Store(arg),
        (Type::I32, 2) => I32Store16(arg),
        (Type::I32, 1) => I32Store8(arg),
        (Type::I64, 8) => I64Store(arg),
        (Type::I64, 4) => I64Store32(arg),
        (Type::I64, 2) => I64Store16(arg),
        (Type::I64, 1) => I64Store8(arg),
        (Type::F32, _) => F32Store(arg),
        (Type::F64, _) => F64Store(arg),
        (Type::V128, _) => V128Store(arg),
        _ => panic!("bad store {:?}/{}", value_ty, bytes),
    }
}

fn atomic_rmw_instr(ty: Type, bytes: u8, op: AtomicRmwOp, arg: MemArg) -> Instruction<'static> {
    use Instruction::*;
    match (op, ty, bytes) {
        (AtomicRmwOp::Add, Type::I32, 4) => I32AtomicRmwAdd(arg),
        (AtomicRmwOp::Add, Type::I32, 2) => I32AtomicRmw16AddU(arg),
        (AtomicRmwOp::Add, Type::I32, 1) => I32AtomicRmw8AddU(arg),
        (AtomicRmwOp::Add, Type::I64, 8) => I64AtomicRmwAdd(arg),
        (AtomicRmwOp::Add, Type::I64, 4) => I64AtomicRmw32AddU(arg),
        (AtomicRmwOp::Sub, Type::I32, 4) => I32AtomicRmwSub(arg),
        (AtomicRmwOp::Sub, Type::I64, 8) => I64AtomicRmwSub(arg),
        (AtomicRmwOp::And, Type::I32, 4) => I32AtomicRmwAnd(arg),
        (AtomicRmwOp::And, Type::I64, 8) => I64AtomicRmwAnd(arg),
        (AtomicRmwOp::Or, Type::I32, 4) => I32AtomicRmwOr(arg),
        (AtomicRmwOp::Or, Type::I64, 8) => I64AtomicRmwOr(arg),
        (AtomicRmwOp::Xor, Type::I32, 4) => I32AtomicRmwXor(arg),
        (AtomicRmwOp::Xor, Type::I64, 8) => I64AtomicRmwXor(arg),
        (AtomicRmwOp::Xchg, Type::I32, 4) => I32AtomicRmwXchg(arg),
        (AtomicRmwOp::Xchg, Type::I64, 8) => I64AtomicRmwXchg(arg),
        _ => panic!("bad atomic rmw {:?} {:?}/{}", op, ty, bytes),
    }
}

fn atomic_cmpxchg_instr(ty: Type, bytes: u8, arg: MemArg) -> Instruction<'static> {
    use Instruction::*;
    match (ty, bytes) {
        (Type::I32, 4) => I32AtomicRmwCmpxchg(arg),
        (Type::I32, 2) => I32AtomicRmw16CmpxchgU(arg),
        (Type::I32, 1) => I32AtomicRmw8CmpxchgU(arg),
        (Type::I64, 8) => I64AtomicRmwCmpxchg(arg),
        (Type::I64, 4) => I64AtomicRmw32CmpxchgU(arg),
        _ => panic!("bad atomic cmpxchg {:?}/{}", ty, bytes),
    }
}

fn unary_instr(op: UnaryOp) -> Instruction<'static> {
    use Instruction::*;
    match op {
        UnaryOp::ClzI32 => I32Clz,
        UnaryOp::CtzI32 => I32Ctz,
        UnaryOp::PopcntI32 => I32Popcnt,
        UnaryOp::EqZI32 => I32Eqz,
        UnaryOp::ClzI64 => I64Clz,
        UnaryOp::CtzI64 => I64Ctz,
        UnaryOp::PopcntI64 => I64Popcnt,
        UnaryOp::EqZI64 => I64Eqz,
        UnaryOp::NegF32 => F32Neg,
        UnaryOp::AbsF32 => F32Abs,
        UnaryOp::SqrtF32 => F32Sqrt,
        UnaryOp::NegF64 => F64Neg,
        UnaryOp::AbsF64 => F64Abs,
        UnaryOp::SqrtF64 => F64Sqrt,
        UnaryOp::WrapI64 => I32WrapI64,
        UnaryOp::ExtendSI32 => I64ExtendI32S,
        UnaryOp::ExtendUI32 => I64ExtendI32U,
        UnaryOp::ConvertSI32ToF64 => F64ConvertI32S,
        UnaryOp::PromoteF32 => F64PromoteF32,
        UnaryOp::DemoteF64 => F32DemoteF64,
        UnaryOp::NegI32x4 => I32x4Neg,
        UnaryOp::SplatI32x4 => I32x4Splat,
    }
}

fn binary_instr(op: BinaryOp) -> Instruction<'static> {
    use Instruction::*;
    match op {
        BinaryOp::AddI32 => I32Add,
        BinaryOp::SubI32 => I32Sub,
        BinaryOp::MulI32 => I32Mul,
        BinaryOp::DivSI32 => I32DivS,
        BinaryOp::DivUI32 => I32DivU,
        BinaryOp::AndI32 => I32And,
        BinaryOp::OrI32 => I32Or,
        BinaryOp::XorI32 => I32Xor,
        BinaryOp::ShlI32 => I32Shl,
        BinaryOp::ShrSI32 => I32ShrS,
        BinaryOp::ShrUI32 => I32ShrU,
        BinaryOp::EqI32 => I32Eq,
        BinaryOp::NeI32 => I32Ne,
        BinaryOp::LtSI32 => I32LtS,
        BinaryOp::LtUI32 => I32LtU,
        BinaryOp::GtSI32 => I32GtS,
        BinaryOp::GtUI32 => I32GtU,
        BinaryOp::AddI64 => I64Add,
        BinaryOp::SubI64 => I64Sub,
        BinaryOp::MulI64 => I64Mul,
        BinaryOp::AndI64 => I64And,
        BinaryOp::OrI64 => I64Or,
        BinaryOp::XorI64 => I64Xor,
        BinaryOp::EqI64 => I64Eq,
        BinaryOp::NeI64 => I64Ne,
        BinaryOp::AddF32 => F32Add,
        BinaryOp::SubF32 => F32Sub,
        BinaryOp::MulF32 => F32Mul,
        BinaryOp::DivF32 => F32Div,
        BinaryOp::MinF32 => F32Min,
        BinaryOp::MaxF32 => F32Max,
        BinaryOp::EqF32 => F32Eq,
        BinaryOp::LtF32 => F32Lt,
        BinaryOp::AddF64 => F64Add,
        BinaryOp::SubF64 => F64Sub,
        BinaryOp::MulF64 => F64Mul,
        BinaryOp::DivF64 => F64Div,
        BinaryOp::MinF64 => F64Min,
        BinaryOp::MaxF64 => F64Max,
        BinaryOp::EqF64 => F64Eq,
        BinaryOp::LtF64 => F64Lt,
        BinaryOp::AddI32x4 => I32x4Add,
        BinaryOp::SubI32x4 => I32x4Sub,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::FunctionBody;

    #[test]
    fn leb_lengths() {
        assert_eq!(u32_leb_len(0), 1);
        assert_eq!(u32_leb_len(127), 1);
        assert_eq!(u32_leb_len(128), 2);
        assert_eq!(u32_leb_len(16511), 2);
        assert_eq!(u32_leb_len(16512), 3);
        assert_eq!(s32_leb_len(0), 1);
        assert_eq!(s32_leb_len(63), 1);
        assert_eq!(s32_leb_len(64), 2);
        assert_eq!(s32_leb_len(-64), 1);
        assert_eq!(s32_leb_len(-65), 2);
        assert_eq!(s64_leb_len(i64::MAX), 10);
    }

    #[test]
    fn emits_deterministic_bytes() {
        let mut f = FunctionBody::new("f", vec![Type::I32], Type::I32);
        let g = f.local_get(0);
        let one = f.i32_const(1);
        let add = f.binary(BinaryOp::AddI32, g, one, Type::I32);
        let r = f.ret(Some(add));
        f.body = r;
        let a = encode_function_body(&f);
        let b = encode_function_body(&f);
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }
}
