use crate::ast::{NodeId, NodeKind, Program, Type};
use crate::config::OptimizationLevel;
use crate::errors::InternalError;
use crate::optimizer::{ClassHierarchy, OptimizationPass, OptimizerContext, OptimizerStats};
use crate::traversal::{run_tracked, ChangeTrackingVisitor, Context, Scope, Tracking};
use tracing::debug;

/// Binds virtual calls whose receiver can only dispatch to one method.
///
/// The call keeps its receiver expression; it is retargeted to the
/// implementation and flagged `static_dispatch` so code generation can
/// call it directly. A call through an interface with one implementor is
/// retargeted to that implementation.
pub struct Devirtualizer;

impl OptimizationPass for Devirtualizer {
    fn name(&self) -> &'static str {
        "devirtualizer"
    }

    fn min_level(&self) -> OptimizationLevel {
        OptimizationLevel::O3
    }

    fn run(
        &mut self,
        program: &mut Program,
        ctx: &mut dyn OptimizerContext,
    ) -> Result<OptimizerStats, InternalError> {
        let mut visitor = DevirtualizeVisitor {
            hierarchy: ClassHierarchy::build(program),
        };
        let outcome = run_tracked(program, ctx, &mut visitor, Scope::Program)?;
        Ok(OptimizerStats::from_outcome(self.name(), &outcome))
    }
}

struct DevirtualizeVisitor {
    hierarchy: ClassHierarchy,
}

impl ChangeTrackingVisitor for DevirtualizeVisitor {
    fn exit(
        &mut self,
        _cx: &mut Tracking<'_>,
        program: &mut Program,
        node: NodeId,
        ctx: &mut Context,
    ) -> Result<(), InternalError> {
        let NodeKind::MethodCall {
            instance: Some(instance),
            method,
            static_dispatch: false,
            ..
        } = program.kind(node)
        else {
            return Ok(());
        };
        let method = *method;
        if !program.method(method).is_virtual() {
            return Ok(());
        }
        let Type::Class(receiver) = program.ty(*instance) else {
            return Ok(());
        };
        let Some(target) = self.hierarchy.single_target(program, *receiver, method) else {
            return Ok(());
        };

        debug!(
            "devirtualized call to {} as {}",
            program.qualified_method_name(method),
            program.qualified_method_name(target)
        );
        if let NodeKind::MethodCall {
            method,
            static_dispatch,
            ..
        } = &mut program.node_mut(node).kind
        {
            *method = target;
            *static_dispatch = true;
        }
        ctx.made_changes();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{DeclaredType, Method, MethodId, TypeId, TypeKind};
    use crate::optimizer::FullOptimizerContext;

    struct Fixture {
        program: Program,
        caller: MethodId,
        call: NodeId,
    }

    /// `Runnable r; r.run();` with `Task implements Runnable`
    fn interface_call(second_implementor: bool) -> (Fixture, MethodId) {
        let mut program = Program::new();
        let iface = program.add_type(DeclaredType::new("Runnable", TypeKind::Interface));
        let run = program.add_method(iface, Method::new("run", iface, Type::Void));
        let task_run = implementor(&mut program, "Task", iface, run);
        if second_implementor {
            implementor(&mut program, "Job", iface, run);
        }

        let main = program.add_type(DeclaredType::new("Main", TypeKind::Class));
        let caller = program.add_method(main, Method::new("main", main, Type::Void));
        let r = program.add_param(caller, "r", Type::Class(iface));
        let receiver = program.local_ref(r);
        let call = program.call(Some(receiver), run, Vec::new());
        let stmt = program.expr_stmt(call);
        let body = program.block(vec![stmt]);
        program.method_mut(caller).body = Some(body);
        (
            Fixture {
                program,
                caller,
                call,
            },
            task_run,
        )
    }

    fn implementor(program: &mut Program, name: &str, iface: TypeId, run: MethodId) -> MethodId {
        let mut class = DeclaredType::new(name, TypeKind::Class);
        class.interfaces.push(iface);
        let class = program.add_type(class);
        let mut method = Method::new("run", class, Type::Void);
        method.body = Some(program.block(Vec::new()));
        method.overrides.push(run);
        program.add_method(class, method)
    }

    #[test]
    fn test_single_implementor_is_bound() {
        let (mut f, task_run) = interface_call(false);
        let mut ctx = FullOptimizerContext::new(&f.program);
        let stats = Devirtualizer.run(&mut f.program, &mut ctx).unwrap();
        assert_eq!(stats.num_mods, 1);
        assert!(matches!(
            f.program.kind(f.call),
            NodeKind::MethodCall { method, static_dispatch: true, .. } if *method == task_run
        ));
        // The call graph follows the new target
        assert_eq!(ctx.callees(&[f.caller]).into_iter().collect::<Vec<_>>(), vec![task_run]);
    }

    #[test]
    fn test_two_implementors_stay_virtual() {
        let (mut f, _) = interface_call(true);
        let mut ctx = FullOptimizerContext::new(&f.program);
        let stats = Devirtualizer.run(&mut f.program, &mut ctx).unwrap();
        assert!(!stats.did_change());
        assert!(matches!(
            f.program.kind(f.call),
            NodeKind::MethodCall { static_dispatch: false, .. }
        ));
    }
}
