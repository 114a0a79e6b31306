//! JS interop ABI: the i64 high-bits scratch global.
//!
//! i64 values cross the JS boundary as a low i32 plus the high 32 bits in a
//! well-known mutable global, read and written through exported accessors.
//! There must be exactly one such global; a module that defines only part
//! of the surface is rejected.

use crate::errors::OptError;
use crate::ir::{
    Export, ExportKind, FuncDecl, FunctionBody, Global, GlobalData, Literal, Module, Type,
};

pub const TEMP_RET0: &str = "tempRet0";
pub const GET_TEMP_RET0: &str = "getTempRet0";
pub const SET_TEMP_RET0: &str = "setTempRet0";

/// Ensure the module can pass i64 high bits to and from JS, reusing the
/// existing support if present.
pub fn ensure_i64_support(module: &mut Module) -> Result<Global, OptError> {
    let get_export = module.export_by_name(GET_TEMP_RET0).is_some();
    let set_export = module.export_by_name(SET_TEMP_RET0).is_some();
    if let Some(global) = module.global_by_name(TEMP_RET0) {
        if !get_export || !set_export {
            return Err(OptError::ABIInconsistent(
                "scratch global present without both accessor exports".to_string(),
            ));
        }
        return Ok(global);
    }
    if get_export || set_export {
        return Err(OptError::ABIInconsistent(
            "accessor exports present without the scratch global".to_string(),
        ));
    }

    let global = module.globals.push(GlobalData {
        name: Some(TEMP_RET0.into()),
        ty: Type::I32,
        mutable: true,
        init: Some(Literal::I32(0)),
    });

    {
        let sig = module.add_signature(vec![], vec![Type::I32]);
        let mut body = FunctionBody::new(GET_TEMP_RET0, vec![], Type::I32);
        let read = body.global_get(global, Type::I32);
        body.body = read;
        let func = module.funcs.push(FuncDecl::Body(sig, body));
        module.exports.push(Export {
            name: GET_TEMP_RET0.into(),
            kind: ExportKind::Func(func),
        });
    }
    {
        let sig = module.add_signature(vec![Type::I32], vec![]);
        let mut body = FunctionBody::new(SET_TEMP_RET0, vec![Type::I32], Type::None);
        let arg = body.local_get(0);
        let write = body.global_set(global, arg);
        body.body = write;
        let func = module.funcs.push(FuncDecl::Body(sig, body));
        module.exports.push(Export {
            name: SET_TEMP_RET0.into(),
            kind: ExportKind::Func(func),
        });
    }

    Ok(global)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_full_support_once() {
        let mut module = Module::default();
        let global = ensure_i64_support(&mut module).unwrap();
        assert_eq!(module.globals[global].ty, Type::I32);
        assert!(module.globals[global].mutable);
        assert!(module.export_by_name(GET_TEMP_RET0).is_some());
        assert!(module.export_by_name(SET_TEMP_RET0).is_some());
        // Idempotent.
        let again = ensure_i64_support(&mut module).unwrap();
        assert_eq!(global, again);
        assert_eq!(module.globals.len(), 1);
    }

    #[test]
    fn rejects_partial_support() {
        let mut module = Module::default();
        module.globals.push(GlobalData {
            name: Some(TEMP_RET0.into()),
            ty: Type::I32,
            mutable: true,
            init: Some(Literal::I32(0)),
        });
        assert!(matches!(
            ensure_i64_support(&mut module),
            Err(OptError::ABIInconsistent(_))
        ));
    }

    #[test]
    fn rejects_exports_without_global() {
        let mut module = Module::default();
        let sig = module.add_signature(vec![], vec![Type::I32]);
        let body = FunctionBody::new(GET_TEMP_RET0, vec![], Type::I32);
        let func = module.funcs.push(FuncDecl::Body(sig, body));
        module.exports.push(Export {
            name: GET_TEMP_RET0.into(),
            kind: ExportKind::Func(func),
        });
        assert!(matches!(
            ensure_i64_support(&mut module),
            Err(OptError::ABIInconsistent(_))
        ));
    }
}
