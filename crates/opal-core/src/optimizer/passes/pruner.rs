//! Dead member elimination.
//!
//! A method is live when it is reachable from the roots: entry methods,
//! indexed (well-known) methods, and the initializers of fields that are
//! live or whose initializer has side effects. Reachability follows call
//! edges, and a live method keeps every method overriding it. A field is
//! live when a live method or a live field's initializer refers to it.

use crate::ast::{FieldId, Member, MethodId, Program};
use crate::config::OptimizationLevel;
use crate::errors::InternalError;
use crate::optimizer::graph::FxIndexSet;
use crate::optimizer::graph_builder::References;
use crate::optimizer::{OptimizationPass, OptimizerContext, OptimizerStats};
use crate::traversal::Tracking;
use rustc_hash::FxHashMap;
use tracing::debug;

pub struct Pruner;

impl OptimizationPass for Pruner {
    fn name(&self) -> &'static str {
        "pruner"
    }

    fn min_level(&self) -> OptimizationLevel {
        OptimizationLevel::O1
    }

    fn run(
        &mut self,
        program: &mut Program,
        ctx: &mut dyn OptimizerContext,
    ) -> Result<OptimizerStats, InternalError> {
        let live = Liveness::compute(program, ctx);

        let dead_methods: Vec<MethodId> = program
            .methods()
            .into_iter()
            .filter(|m| !live.methods.contains(m))
            .collect();
        let dead_fields: Vec<FieldId> = program
            .fields()
            .into_iter()
            .filter(|f| !live.fields.contains(f) && !is_library_member(program, Member::Field(*f)))
            .collect();

        let mut cx = Tracking::new(ctx);
        for method in &dead_methods {
            debug!("pruning method {}", program.qualified_method_name(*method));
            cx.remove_method(program, *method);
        }
        for field in &dead_fields {
            debug!("pruning field {}", program.qualified_field_name(*field));
            cx.remove_field(program, *field);
        }
        let outcome = cx.finish(program, live.visited);
        Ok(OptimizerStats::from_outcome(self.name(), &outcome))
    }
}

fn is_library_member(program: &Program, member: Member) -> bool {
    let owner = match member {
        Member::Method(m) => program.method(m).enclosing,
        Member::Field(f) => program.field(f).enclosing,
    };
    program.declared_type(owner).is_library
}

#[derive(Debug, Default)]
struct Liveness {
    methods: FxIndexSet<MethodId>,
    fields: FxIndexSet<FieldId>,
    /// Members whose references were scanned
    visited: usize,
}

impl Liveness {
    fn compute(program: &Program, ctx: &dyn OptimizerContext) -> Self {
        let mut overriders: FxHashMap<MethodId, Vec<MethodId>> = FxHashMap::default();
        for method in program.methods() {
            for overridden in &program.method(method).overrides {
                overriders.entry(*overridden).or_default().push(method);
            }
        }

        let mut live = Liveness::default();
        let mut work: Vec<Member> = Vec::new();
        work.extend(program.entry_methods().iter().copied().map(Member::Method));
        work.extend(program.indexed_methods().map(Member::Method));
        for field in program.fields() {
            let impure = program
                .field(field)
                .initializer
                .is_some_and(|init| program.has_side_effects(init));
            if impure {
                work.push(Member::Field(field));
            }
        }

        while let Some(member) = work.pop() {
            match member {
                Member::Method(method) => {
                    if !program.is_live(member) || !live.methods.insert(method) {
                        continue;
                    }
                    live.visited += 1;
                    let (callees, fields) = references_of(program, ctx, method);
                    work.extend(callees.into_iter().map(Member::Method));
                    work.extend(fields.into_iter().map(Member::Field));
                    if let Some(subs) = overriders.get(&method) {
                        work.extend(subs.iter().copied().map(Member::Method));
                    }
                }
                Member::Field(field) => {
                    if !program.is_live(member) || !live.fields.insert(field) {
                        continue;
                    }
                    live.visited += 1;
                    if let Some(init) = program.field(field).initializer {
                        let refs = References::of_subtree(program, init);
                        work.extend(refs.callees.into_iter().map(Member::Method));
                        work.extend(refs.fields.into_iter().map(Member::Field));
                    }
                }
            }
        }
        live
    }
}

/// Callees and fields of a method, from the maintained graphs when the
/// context has them
fn references_of(
    program: &Program,
    ctx: &dyn OptimizerContext,
    method: MethodId,
) -> (Vec<MethodId>, Vec<FieldId>) {
    match (ctx.call_graph(), ctx.field_references()) {
        (Some(calls), Some(fields)) => (
            calls.callees_of(method).collect(),
            fields.fields_of(method).collect(),
        ),
        _ => {
            let refs = References::of_method(program, method);
            (
                refs.callees.into_iter().collect(),
                refs.fields.into_iter().collect(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{DeclaredType, Field, Method, Type, TypeKind};
    use crate::optimizer::{FullOptimizerContext, NoOpOptimizerContext};

    fn method(program: &mut Program, owner: crate::ast::TypeId, name: &str) -> MethodId {
        let mut method = Method::new(name, owner, Type::Void);
        method.is_static = true;
        method.body = Some(program.block(Vec::new()));
        program.add_method(owner, method)
    }

    fn add_call(program: &mut Program, from: MethodId, to: MethodId) {
        let call = program.call(None, to, Vec::new());
        let stmt = program.expr_stmt(call);
        let body = program.method(from).body.unwrap();
        let end = program.kind(body).children().len();
        program.insert_statement(body, end, stmt).unwrap();
    }

    #[test]
    fn test_prunes_unreachable_methods_and_fields() {
        let mut program = Program::new();
        let ty = program.add_type(DeclaredType::new("Main", TypeKind::Class));
        let main = method(&mut program, ty, "main");
        let used = method(&mut program, ty, "used");
        let unused = method(&mut program, ty, "unused");
        let only_from_unused = method(&mut program, ty, "onlyFromUnused");
        add_call(&mut program, main, used);
        add_call(&mut program, unused, only_from_unused);
        program.add_entry_method(main);

        let read = program.add_field(ty, Field::new("read", ty, Type::Int));
        let ignored = program.add_field(ty, Field::new("ignored", ty, Type::Int));
        let r = program.field_ref(None, read);
        let stmt = program.expr_stmt(r);
        let body = program.method(used).body.unwrap();
        program.insert_statement(body, 0, stmt).unwrap();

        let mut ctx = FullOptimizerContext::new(&program);
        let stats = Pruner.run(&mut program, &mut ctx).unwrap();

        assert_eq!(program.methods(), vec![main, used]);
        assert_eq!(program.fields(), vec![read]);
        assert_eq!(stats.num_mods, 3);
        assert!(!program.is_live(Member::Field(ignored)));
        assert!(ctx.callers(&[only_from_unused]).is_empty());
        ctx.check_consistency().unwrap();
    }

    #[test]
    fn test_overriders_of_live_methods_survive() {
        let mut program = Program::new();
        let base = program.add_type(DeclaredType::new("Base", TypeKind::Class));
        let mut sub = DeclaredType::new("Sub", TypeKind::Class);
        sub.super_class = Some(base);
        let sub = program.add_type(sub);

        let main = method(&mut program, base, "main");
        let mut run = Method::new("run", base, Type::Void);
        run.body = Some(program.block(Vec::new()));
        let run = program.add_method(base, run);
        let mut sub_run = Method::new("run", sub, Type::Void);
        sub_run.body = Some(program.block(Vec::new()));
        sub_run.overrides.push(run);
        let sub_run = program.add_method(sub, sub_run);
        add_call(&mut program, main, run);
        program.add_entry_method(main);

        let stats = Pruner.run(&mut program, &mut NoOpOptimizerContext).unwrap();
        assert!(!stats.did_change());
        assert!(program.is_live(Member::Method(sub_run)));
    }

    #[test]
    fn test_side_effecting_initializer_is_a_root() {
        let mut program = Program::new();
        let ty = program.add_type(DeclaredType::new("Main", TypeKind::Class));
        let init = method(&mut program, ty, "init");
        let call = program.call(None, init, Vec::new());
        let mut field = Field::new("instance", ty, Type::Void);
        field.is_static = true;
        field.initializer = Some(call);
        let field = program.add_field(ty, field);

        let stats = Pruner.run(&mut program, &mut NoOpOptimizerContext).unwrap();
        assert!(!stats.did_change());
        assert!(program.is_live(Member::Field(field)));
        assert!(program.is_live(Member::Method(init)));
    }
}
