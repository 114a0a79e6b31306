//! Optimization passes and the runner that schedules them.

pub mod coalesce;
pub mod copy_propagation;
pub mod delicm;
pub mod redundant_sets;
pub mod reorder_funcs;

pub use coalesce::{CoalesceLocals, CoalesceLocalsWithLearning};
pub use copy_propagation::CopyPropagation;
pub use delicm::DeLoopInvariantCodeMotion;
pub use redundant_sets::RedundantSetElimination;
pub use reorder_funcs::ReorderFunctions;

use crate::errors::OptError;
use crate::ir::{FunctionBody, Module};
use anyhow::Result;
use rayon::prelude::*;

pub trait Pass: Sync {
    fn name(&self) -> &'static str;

    /// Whether distinct functions may be processed concurrently.
    fn is_function_parallel(&self) -> bool {
        false
    }

    fn run_function(&self, _body: &mut FunctionBody) -> Result<(), OptError> {
        Ok(())
    }

    fn run_module(&self, _module: &mut Module) -> Result<(), OptError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct PassRunner {
    passes: Vec<Box<dyn Pass>>,
}

impl PassRunner {
    pub fn new() -> PassRunner {
        PassRunner::default()
    }

    pub fn add(&mut self, pass: Box<dyn Pass>) -> &mut Self {
        self.passes.push(pass);
        self
    }

    /// Run all passes in order. A fatal error aborts the pipeline; an
    /// `OptimizationAborted` from a function pass skips just that function.
    pub fn run(&self, module: &mut Module) -> Result<()> {
        for pass in &self.passes {
            log::debug!("running pass {}", pass.name());
            if pass.is_function_parallel() {
                let results: Vec<Option<(String, OptError)>> = module
                    .funcs
                    .as_mut_slice()
                    .par_iter_mut()
                    .map(|decl| {
                        let body = decl.body_mut()?;
                        match pass.run_function(body) {
                            Ok(()) => None,
                            Err(e) => Some((body.name.to_string(), e)),
                        }
                    })
                    .collect();
                // Report deterministically: the first fatal error in
                // function order wins.
                for result in results.into_iter().flatten() {
                    let (func, error) = result;
                    if error.is_fatal() {
                        return Err(anyhow::Error::new(error)
                            .context(format!("pass {} on function {}", pass.name(), func)));
                    }
                    log::debug!("pass {} skipped function {}: {}", pass.name(), func, error);
                }
            } else {
                match pass.run_module(module) {
                    Ok(()) => {}
                    Err(error) if error.is_fatal() => {
                        return Err(anyhow::Error::new(error)
                            .context(format!("pass {}", pass.name())));
                    }
                    Err(error) => {
                        log::debug!("pass {} skipped: {}", pass.name(), error);
                    }
                }
            }
        }
        Ok(())
    }
}
