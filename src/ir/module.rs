//! Module-level containers.

use super::{FuncDecl, Literal, Name, Type};
use crate::declare_entity;
use crate::entity::EntityVec;

declare_entity!(Func, "f");
declare_entity!(Global, "g");
declare_entity!(Signature, "sig");

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignatureData {
    pub params: Vec<Type>,
    pub returns: Vec<Type>,
}

#[derive(Clone, Debug)]
pub struct GlobalData {
    pub name: Option<Name>,
    pub ty: Type,
    pub mutable: bool,
    pub init: Option<Literal>,
}

#[derive(Clone, Debug)]
pub struct Export {
    pub name: Name,
    pub kind: ExportKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportKind {
    Func(Func),
    Global(Global),
}

/// A function table; elements are direct function references.
#[derive(Clone, Debug, Default)]
pub struct Table {
    pub func_elements: Vec<Func>,
}

#[derive(Clone, Copy, Debug)]
pub struct Memory {
    pub initial: u32,
    pub maximum: Option<u32>,
}

#[derive(Clone, Debug, Default)]
pub struct Module {
    /// All functions; imports occupy the leading indices.
    pub funcs: EntityVec<Func, FuncDecl>,
    pub signatures: EntityVec<Signature, SignatureData>,
    pub globals: EntityVec<Global, GlobalData>,
    pub exports: Vec<Export>,
    pub table: Table,
    pub memory: Option<Memory>,
    pub start: Option<Func>,
}

impl Module {
    /// Number of imported functions. Imports always precede owned functions
    /// in the index space.
    pub fn num_imports(&self) -> usize {
        self.funcs.values().filter(|f| f.is_import()).count()
    }

    pub fn add_signature(&mut self, params: Vec<Type>, returns: Vec<Type>) -> Signature {
        self.signatures.push(SignatureData { params, returns })
    }

    pub fn export_by_name(&self, name: &str) -> Option<&Export> {
        self.exports.iter().find(|e| e.name.as_str() == name)
    }

    pub fn global_by_name(&self, name: &str) -> Option<Global> {
        self.globals
            .entries()
            .find(|(_, g)| g.name.as_ref().map(|n| n.as_str()) == Some(name))
            .map(|(id, _)| id)
    }

    pub fn func_name(&self, f: Func) -> String {
        match &self.funcs[f] {
            FuncDecl::Import(_, name) => name.to_string(),
            FuncDecl::Body(_, body) => body.name.to_string(),
        }
    }
}
