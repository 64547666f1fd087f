use crate::ast::{NodeId, NodeKind, Program};
use crate::config::OptimizationLevel;
use crate::errors::InternalError;
use crate::optimizer::{OptimizationPass, OptimizerContext, OptimizerStats};
use crate::traversal::{run_tracked, ChangeTrackingVisitor, Context, Scope, Tracking};

/// Drops `assert` statements when assertions are disabled
pub struct AssertionRemover;

impl OptimizationPass for AssertionRemover {
    fn name(&self) -> &'static str {
        "assertion-remover"
    }

    fn min_level(&self) -> OptimizationLevel {
        OptimizationLevel::O0
    }

    fn run(
        &mut self,
        program: &mut Program,
        ctx: &mut dyn OptimizerContext,
    ) -> Result<OptimizerStats, InternalError> {
        let outcome = run_tracked(program, ctx, &mut Remover, Scope::Program)?;
        Ok(OptimizerStats::from_outcome(self.name(), &outcome))
    }
}

struct Remover;

impl ChangeTrackingVisitor for Remover {
    fn enter(
        &mut self,
        _cx: &mut Tracking<'_>,
        program: &mut Program,
        node: NodeId,
        ctx: &mut Context,
    ) -> Result<bool, InternalError> {
        if matches!(program.kind(node), NodeKind::Assert { .. }) {
            ctx.remove_me()?;
            return Ok(false);
        }
        // Expressions cannot contain statements
        Ok(program.kind(node).is_statement())
    }
}
