use crate::ast::{NodeId, NodeKind, Program};
use crate::config::OptimizationLevel;
use crate::errors::InternalError;
use crate::optimizer::incremental::{affected_members, record_run};
use crate::optimizer::{OptimizationPass, OptimizerContext, OptimizerStats};
use crate::traversal::{run_tracked, ChangeTrackingVisitor, Context, Scope, Tracking};
use tracing::trace;

/// Removes casts whose operand already has a type assignable to the
/// target. Only members modified since the previous run are revisited.
pub struct CastElision;

impl OptimizationPass for CastElision {
    fn name(&self) -> &'static str {
        "cast-elision"
    }

    fn min_level(&self) -> OptimizationLevel {
        OptimizationLevel::O1
    }

    fn run(
        &mut self,
        program: &mut Program,
        ctx: &mut dyn OptimizerContext,
    ) -> Result<OptimizerStats, InternalError> {
        let affected = affected_members(program, ctx, self.name())?;
        let scope = Scope::Members {
            methods: &affected.methods,
            fields: &affected.fields,
        };
        let outcome = run_tracked(program, ctx, &mut Elider, scope)?;
        record_run(ctx, self.name());
        Ok(OptimizerStats::from_outcome(self.name(), &outcome))
    }
}

struct Elider;

impl ChangeTrackingVisitor for Elider {
    fn exit(
        &mut self,
        _cx: &mut Tracking<'_>,
        program: &mut Program,
        node: NodeId,
        ctx: &mut Context,
    ) -> Result<(), InternalError> {
        let NodeKind::Cast { target, expr } = program.kind(node) else {
            return Ok(());
        };
        let expr = *expr;
        if program.is_assignable(program.ty(expr), target) {
            trace!(
                "eliding cast from {} to {}",
                program.type_name(program.ty(expr)),
                program.type_name(target)
            );
            ctx.replace_me(expr)?;
        }
        Ok(())
    }
}
