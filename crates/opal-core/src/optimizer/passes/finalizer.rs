use crate::ast::{FieldId, MethodId, NodeId, NodeKind, Program, TypeId};
use crate::config::OptimizationLevel;
use crate::errors::InternalError;
use crate::optimizer::{OptimizationPass, OptimizerContext, OptimizerStats};
use crate::traversal::{run_tracked, ChangeTrackingVisitor, Scope, Tracking};
use rustc_hash::FxHashSet;
use tracing::trace;

/// Marks classes without subclasses, methods without overriders and
/// fields that are never assigned as final.
///
/// Library types are left alone since native code may extend them.
pub struct Finalizer;

impl OptimizationPass for Finalizer {
    fn name(&self) -> &'static str {
        "finalizer"
    }

    fn min_level(&self) -> OptimizationLevel {
        OptimizationLevel::O2
    }

    fn run(
        &mut self,
        program: &mut Program,
        ctx: &mut dyn OptimizerContext,
    ) -> Result<OptimizerStats, InternalError> {
        let mut visitor = FinalizeVisitor::analyze(program);
        let outcome = run_tracked(program, ctx, &mut visitor, Scope::Program)?;
        Ok(OptimizerStats::from_outcome(self.name(), &outcome))
    }
}

struct FinalizeVisitor {
    extended: FxHashSet<TypeId>,
    overridden: FxHashSet<MethodId>,
    assigned: FxHashSet<FieldId>,
}

impl FinalizeVisitor {
    fn analyze(program: &Program) -> Self {
        let mut extended = FxHashSet::default();
        for ty in program.types() {
            let declared = program.declared_type(*ty);
            extended.extend(declared.super_class);
            extended.extend(declared.interfaces.iter().copied());
        }

        let mut overridden = FxHashSet::default();
        let mut assigned = FxHashSet::default();
        for method in program.methods() {
            let declared = program.method(method);
            overridden.extend(declared.overrides.iter().copied());
            if let Some(body) = declared.body {
                collect_assigned(program, body, &mut assigned);
            }
        }
        for field in program.fields() {
            if let Some(init) = program.field(field).initializer {
                collect_assigned(program, init, &mut assigned);
            }
        }
        FinalizeVisitor {
            extended,
            overridden,
            assigned,
        }
    }
}

/// Fields written by an assignment, an increment, or native code
fn collect_assigned(program: &Program, root: NodeId, assigned: &mut FxHashSet<FieldId>) {
    let target_field = |target: NodeId| match program.kind(target) {
        NodeKind::FieldRef { field, .. } => Some(*field),
        _ => None,
    };
    for node in program.preorder(root) {
        match program.kind(node) {
            NodeKind::Binary { op, lhs, .. } if op.is_assignment() => {
                assigned.extend(target_field(*lhs));
            }
            NodeKind::Unary { op, operand } if op.is_modifying() => {
                assigned.extend(target_field(*operand));
            }
            NodeKind::NativeBlock(native) => {
                assigned.extend(native.field_refs.iter().copied());
            }
            _ => {}
        }
    }
}

impl ChangeTrackingVisitor for FinalizeVisitor {
    fn enter_type(
        &mut self,
        cx: &mut Tracking<'_>,
        program: &mut Program,
        ty: TypeId,
    ) -> Result<bool, InternalError> {
        let declared = program.declared_type(ty);
        if declared.is_library {
            return Ok(false);
        }
        if !declared.is_final
            && !declared.is_interface()
            && !declared.is_abstract
            && !self.extended.contains(&ty)
        {
            trace!("finalizing class {}", declared.name);
            program.declared_type_mut(ty).is_final = true;
            cx.made_changes();
        }
        Ok(true)
    }

    fn enter_method(
        &mut self,
        cx: &mut Tracking<'_>,
        program: &mut Program,
        method: MethodId,
    ) -> Result<bool, InternalError> {
        let declared = program.method(method);
        if !declared.is_final
            && declared.is_virtual()
            && !declared.is_abstract()
            && !self.overridden.contains(&method)
        {
            trace!("finalizing method {}", program.qualified_method_name(method));
            program.method_mut(method).is_final = true;
            cx.made_changes();
        }
        Ok(false)
    }

    fn enter_field(
        &mut self,
        cx: &mut Tracking<'_>,
        program: &mut Program,
        field: FieldId,
    ) -> Result<bool, InternalError> {
        if !program.field(field).is_final && !self.assigned.contains(&field) {
            trace!("finalizing field {}", program.qualified_field_name(field));
            program.field_mut(field).is_final = true;
            cx.made_changes();
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{DeclaredType, Field, Method, Type, TypeKind};
    use crate::optimizer::FullOptimizerContext;

    #[test]
    fn test_finalizes_leaves_and_unwritten_fields() {
        let mut program = Program::new();
        let base = program.add_type(DeclaredType::new("Base", TypeKind::Class));
        let mut leaf = DeclaredType::new("Leaf", TypeKind::Class);
        leaf.super_class = Some(base);
        let leaf = program.add_type(leaf);

        let mut run = Method::new("run", base, Type::Void);
        run.body = Some(program.block(Vec::new()));
        let run = program.add_method(base, run);
        let mut leaf_run = Method::new("run", leaf, Type::Void);
        leaf_run.overrides.push(run);
        leaf_run.body = Some(program.block(Vec::new()));
        let leaf_run = program.add_method(leaf, leaf_run);

        let constant = program.add_field(base, Field::new("LIMIT", base, Type::Int));
        let counter = program.add_field(base, Field::new("count", base, Type::Int));
        let target = program.field_ref(None, counter);
        let one = program.int_literal(1);
        let bump = program.binary(crate::ast::BinaryOp::AssignAdd, target, one, Type::Int);
        let stmt = program.expr_stmt(bump);
        let body = program.method(leaf_run).body.unwrap();
        program.insert_statement(body, 0, stmt).unwrap();

        let mut ctx = FullOptimizerContext::new(&program);
        let stats = Finalizer.run(&mut program, &mut ctx).unwrap();

        assert!(!program.declared_type(base).is_final);
        assert!(program.declared_type(leaf).is_final);
        assert!(!program.method(run).is_final);
        assert!(program.method(leaf_run).is_final);
        assert!(program.field(constant).is_final);
        assert!(!program.field(counter).is_final);
        assert_eq!(stats.num_mods, 3);

        let again = Finalizer.run(&mut program, &mut ctx).unwrap();
        assert!(!again.did_change());
    }
}
