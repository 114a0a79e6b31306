//! Structured-expression IR for Wasm modules.
//!
//! Function bodies are forests of structured expressions stored in a
//! per-function arena keyed by stable `Expr` ids. Passes rewrite nodes in
//! place by overwriting arena slots, so an id held by an analysis keeps
//! designating "the expression at this position" across rewrites.

pub mod effects;
mod expr;
mod func;
pub mod local_utils;
mod module;
mod types;

pub use expr::*;
pub use func::*;
pub use module::*;
pub use types::*;

/// A local (parameter or variable) index within one function.
pub type LocalId = u32;
