//! Error types.

/// An error raised by an optimization pass.
#[derive(Clone, Debug)]
pub enum OptError {
    /// A structural precondition of the IR was violated. These are bugs in
    /// the caller or in a prior pass; the pipeline aborts.
    IRViolation(String),
    /// The module defines only part of the JS-i64 ABI surface (scratch
    /// global without both accessor exports, or vice versa).
    ABIInconsistent(String),
    /// A pass found its input preconditions unmet and skipped the function.
    /// Non-fatal; the function passes through unchanged.
    OptimizationAborted(String),
}

impl OptError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, OptError::OptimizationAborted(_))
    }
}

impl std::fmt::Display for OptError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            OptError::IRViolation(msg) => write!(f, "IR violation: {}", msg),
            OptError::ABIInconsistent(msg) => write!(f, "inconsistent ABI: {}", msg),
            OptError::OptimizationAborted(msg) => write!(f, "optimization aborted: {}", msg),
        }
    }
}

impl std::error::Error for OptError {}
