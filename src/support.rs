//! Small support containers shared by the analyses.

pub mod learning;
pub mod sorted_vec;
pub mod symmetric;
pub mod work_list;

pub use learning::{GeneticLearner, Generator};
pub use sorted_vec::SortedVec;
pub use symmetric::{SymmetricPairMap, SymmetricRelation};
pub use work_list::{OneTimeWorkList, WorkList};
