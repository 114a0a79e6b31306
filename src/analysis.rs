//! Per-function dataflow analyses over the block graph.

pub mod equivalence;
pub mod liveness;
pub mod local_graph;

pub use equivalence::Equivalences;
pub use local_graph::{DefSet, LocalGraph};
