use crate::ast::{BinaryOp, Literal, NodeId, NodeKind, Program, Type, UnaryOp, WellKnownSymbols};
use crate::config::OptimizationLevel;
use crate::errors::InternalError;
use crate::optimizer::{OptimizationPass, OptimizerContext, OptimizerStats};
use crate::traversal::{run_tracked, ChangeTrackingVisitor, Context, Scope, Tracking};

/// Turns `a == b` and `a != b` on two strings into calls to
/// `StringLib.equals`, since the target compares strings by identity.
///
/// A comparison against the `null` literal stays a reference comparison.
pub struct EqualityNormalizer {
    symbols: WellKnownSymbols,
}

impl EqualityNormalizer {
    pub fn new(symbols: WellKnownSymbols) -> Self {
        EqualityNormalizer { symbols }
    }
}

impl OptimizationPass for EqualityNormalizer {
    fn name(&self) -> &'static str {
        "equality-normalizer"
    }

    fn min_level(&self) -> OptimizationLevel {
        OptimizationLevel::O0
    }

    fn run(
        &mut self,
        program: &mut Program,
        ctx: &mut dyn OptimizerContext,
    ) -> Result<OptimizerStats, InternalError> {
        let mut visitor = Normalizer {
            symbols: &self.symbols,
        };
        let outcome = run_tracked(program, ctx, &mut visitor, Scope::Program)?;
        Ok(OptimizerStats::from_outcome(self.name(), &outcome))
    }
}

struct Normalizer<'s> {
    symbols: &'s WellKnownSymbols,
}

fn is_null_literal(program: &Program, node: NodeId) -> bool {
    matches!(program.kind(node), NodeKind::Literal(Literal::Null))
}

impl ChangeTrackingVisitor for Normalizer<'_> {
    fn exit(
        &mut self,
        _cx: &mut Tracking<'_>,
        program: &mut Program,
        node: NodeId,
        ctx: &mut Context,
    ) -> Result<(), InternalError> {
        let (negate, lhs, rhs) = match program.kind(node) {
            NodeKind::Binary { op: BinaryOp::Eq, lhs, rhs } => (false, *lhs, *rhs),
            NodeKind::Binary { op: BinaryOp::Ne, lhs, rhs } => (true, *lhs, *rhs),
            _ => return Ok(()),
        };
        let strings = program.ty(lhs) == &Type::String && program.ty(rhs) == &Type::String;
        if !strings || is_null_literal(program, lhs) || is_null_literal(program, rhs) {
            return Ok(());
        }

        let equals = self.symbols.require_string_equals()?;
        let span = program.node(node).span;
        let call = program.call(None, equals, vec![lhs, rhs]);
        program.node_mut(call).ty = Type::Boolean;
        let replacement = if negate {
            program.unary(UnaryOp::Not, call, Type::Boolean)
        } else {
            call
        };
        program.node_mut(call).span = span;
        program.node_mut(replacement).span = span;
        ctx.replace_me(replacement)
    }
}
