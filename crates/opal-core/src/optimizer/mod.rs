//! Optimizer driver
//!
//! Runs the rewrite passes over a [`Program`] with a shared
//! [`OptimizerContext`]. The loop passes repeat until none of them changes
//! anything or the iteration budget is spent; the lowering passes run once
//! afterwards. The optimization step advances after every pass.

use crate::ast::{Program, WellKnownSymbols};
use crate::config::{OptimizationLevel, OptimizerOptions};
use crate::diagnostics::DiagnosticHandler;
use crate::errors::{CompilationError, InternalError};
use crate::span::Span;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod consistency;
pub mod context;
pub mod graph;
pub mod graph_builder;
pub mod incremental;
pub mod passes;

mod devirtualization;
pub use devirtualization::{overrides_transitively, ClassHierarchy};

pub use context::{FullOptimizerContext, NoOpOptimizerContext, OptimizerContext};
pub use graph::{CallGraph, FieldReferenceGraph};
pub use passes::{OptimizationPass, OptimizerStats};

use passes::{
    AssertionRemover, CastElision, CompoundAssignmentNormalizer, Devirtualizer,
    EqualityNormalizer, Finalizer, LongEmulation, Pruner,
};

/// Result of one optimizer invocation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationReport {
    pub level: OptimizationLevel,
    /// Fixed-point iterations run
    pub iterations: usize,
    /// Whether the last iteration made no changes
    pub converged: bool,
    /// Step counter after the last pass
    pub final_step: usize,
    pub stats: OptimizerStats,
}

impl OptimizationReport {
    pub fn total_mods(&self) -> usize {
        self.stats.num_mods
    }
}

/// Optimizer for AST transformations
///
/// This struct manages optimization passes and runs them until a fixed point
/// is reached (no more changes).
pub struct Optimizer {
    options: OptimizerOptions,
    handler: Arc<dyn DiagnosticHandler>,
}

impl Optimizer {
    pub fn new(options: OptimizerOptions, handler: Arc<dyn DiagnosticHandler>) -> Self {
        Self { options, handler }
    }

    pub fn options(&self) -> &OptimizerOptions {
        &self.options
    }

    /// Returns the number of passes that run at the configured level
    pub fn pass_count(&self) -> usize {
        self.pass_names().len()
    }

    /// Returns the names of the passes that run at the configured level,
    /// in execution order
    pub fn pass_names(&self) -> Vec<&'static str> {
        let symbols = WellKnownSymbols::default();
        let mut names = Vec::new();
        names.extend(self.setup_passes().iter().map(|p| p.name()));
        names.extend(self.loop_passes().iter().map(|p| p.name()));
        names.extend(self.lowering_passes(&symbols).iter().map(|p| p.name()));
        names
    }

    /// Optimize the program with a context chosen by the `incremental`
    /// option
    pub fn optimize(&mut self, program: &mut Program) -> Result<OptimizationReport, CompilationError> {
        if self.options.incremental {
            let mut ctx = FullOptimizerContext::new(program);
            self.optimize_with_context(program, &mut ctx)
        } else {
            self.optimize_with_context(program, &mut NoOpOptimizerContext)
        }
    }

    pub fn optimize_with_context(
        &mut self,
        program: &mut Program,
        ctx: &mut dyn OptimizerContext,
    ) -> Result<OptimizationReport, CompilationError> {
        let level = self.options.level.effective();
        let symbols = WellKnownSymbols::resolve(program);
        info!("Optimizing at {:?}", level);

        let mut report = OptimizationReport {
            level,
            iterations: 0,
            converged: true,
            final_step: ctx.optimization_step(),
            stats: OptimizerStats::new("optimizer"),
        };

        for mut pass in self.setup_passes() {
            let stats = self.run_pass(pass.as_mut(), program, ctx)?;
            report.stats.add(stats);
        }

        let mut loop_passes = self.loop_passes();
        if !loop_passes.is_empty() {
            report.converged = false;
            while report.iterations < self.options.max_iterations {
                report.iterations += 1;
                let mut iteration = OptimizerStats::new(format!("iteration {}", report.iterations));
                for pass in loop_passes.iter_mut() {
                    let stats = self.run_pass(pass.as_mut(), program, ctx)?;
                    iteration.add(stats);
                }
                let changed = iteration.did_change();
                debug!(
                    "Iteration {}: {} modifications",
                    report.iterations, iteration.num_mods
                );
                report.stats.add(iteration);
                if !changed {
                    report.converged = true;
                    break;
                }
            }
            if !report.converged {
                warn!(
                    "Optimizer stopped after {} iterations without reaching a fixed point",
                    report.iterations
                );
                self.handler.warning(
                    Span::dummy(),
                    &format!(
                        "optimizer did not reach a fixed point within {} iterations",
                        self.options.max_iterations
                    ),
                );
                self.handler.flush();
            }
        }

        for mut pass in self.lowering_passes(&symbols) {
            let stats = self.run_pass(pass.as_mut(), program, ctx)?;
            report.stats.add(stats);
        }

        report.final_step = ctx.optimization_step();
        info!(
            "Optimization finished: {} iterations, {} modifications",
            report.iterations,
            report.total_mods()
        );
        Ok(report)
    }

    fn run_pass(
        &self,
        pass: &mut dyn OptimizationPass,
        program: &mut Program,
        ctx: &mut dyn OptimizerContext,
    ) -> Result<OptimizerStats, InternalError> {
        let name = pass.name();
        debug!("Running pass {} at step {}", name, ctx.optimization_step());
        let stats = pass
            .run(program, ctx)
            .map_err(|e| e.with_context(format!("in pass {}", name)))?;
        ctx.inc_optimization_step();
        if self.options.verify_after_each_pass {
            consistency::verify(program, ctx)
                .map_err(|e| e.with_context(format!("after pass {}", name)))?;
        }
        Ok(stats)
    }

    fn level(&self) -> OptimizationLevel {
        self.options.level.effective()
    }

    fn enabled(&self, passes: Vec<Box<dyn OptimizationPass>>) -> Vec<Box<dyn OptimizationPass>> {
        let level = self.level();
        passes
            .into_iter()
            .filter(|pass| pass.min_level() <= level)
            .collect()
    }

    fn setup_passes(&self) -> Vec<Box<dyn OptimizationPass>> {
        if self.options.enable_assertions {
            return Vec::new();
        }
        self.enabled(vec![Box::new(AssertionRemover)])
    }

    fn loop_passes(&self) -> Vec<Box<dyn OptimizationPass>> {
        self.enabled(vec![
            Box::new(Finalizer),
            Box::new(Devirtualizer),
            Box::new(CastElision),
            Box::new(Pruner),
        ])
    }

    fn lowering_passes(&self, symbols: &WellKnownSymbols) -> Vec<Box<dyn OptimizationPass>> {
        let mut passes: Vec<Box<dyn OptimizationPass>> = Vec::new();
        if self.options.emulate_longs {
            passes.push(Box::new(CompoundAssignmentNormalizer::new()));
            passes.push(Box::new(LongEmulation::new(symbols.clone())));
        }
        passes.push(Box::new(EqualityNormalizer::new(symbols.clone())));
        self.enabled(passes)
    }
}
