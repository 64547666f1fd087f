//! Structural checks run between passes.
//!
//! A violation here is always a compiler defect, reported as an
//! [`InternalError`] naming the member where it was found.

use super::context::OptimizerContext;
use super::graph::FxIndexSet;
use super::graph_builder::References;
use crate::ast::{Category, LocalId, Member, MethodId, NodeId, NodeKind, Program};
use crate::errors::InternalError;
use crate::ice;
use rustc_hash::FxHashSet;

/// Check the program tree and, when it tracks anything, the optimizer
/// context against it
pub fn verify(program: &Program, ctx: &dyn OptimizerContext) -> Result<(), InternalError> {
    verify_program(program)?;
    verify_context(program, ctx)
}

/// Every node has one owner, every reference names a declared member, and
/// every child sits in a slot of its category
pub fn verify_program(program: &Program) -> Result<(), InternalError> {
    let mut owned = FxHashSet::default();
    for field in program.fields() {
        let Some(init) = program.field(field).initializer else {
            continue;
        };
        let frame = || format!("in the initializer of {}", program.qualified_field_name(field));
        if program.kind(init).category() != Category::Expression {
            return Err(ice!("field initializer is a statement").with_context(frame()));
        }
        verify_subtree(program, init, None, &mut owned).map_err(|e| e.with_context(frame()))?;
    }
    for method in program.methods() {
        let Some(body) = program.method(method).body else {
            continue;
        };
        let frame = || format!("in the body of {}", program.qualified_method_name(method));
        if program.kind(body).category() != Category::Statement {
            return Err(ice!("method body is an expression").with_context(frame()));
        }
        verify_subtree(program, body, Some(method), &mut owned)
            .map_err(|e| e.with_context(frame()))?;
    }
    Ok(())
}

fn verify_subtree(
    program: &Program,
    root: NodeId,
    method: Option<MethodId>,
    owned: &mut FxHashSet<NodeId>,
) -> Result<(), InternalError> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if !owned.insert(node) {
            return Err(ice!("node {:?} is held by more than one slot", node));
        }
        let kind = program.kind(node);
        verify_references(program, kind, method)?;
        for position in 0..kind.position_count() {
            let (child, shape) = kind
                .child_at(position)
                .ok_or_else(|| ice!("node has no child at position {}", position))?;
            let Some(child) = child else {
                continue;
            };
            let category = program.kind(child).category();
            if category != shape.category {
                return Err(ice!(
                    "{:?} stored in a {:?} slot at position {} of {:?}",
                    category,
                    shape.category,
                    position,
                    node
                ));
            }
            stack.push(child);
        }
    }
    Ok(())
}

fn verify_references(
    program: &Program,
    kind: &NodeKind,
    method: Option<MethodId>,
) -> Result<(), InternalError> {
    let check_method = |m: MethodId| {
        if program.is_live(Member::Method(m)) {
            Ok(())
        } else {
            Err(ice!("reference to removed method {}", program.qualified_method_name(m)))
        }
    };
    let check_local = |local: LocalId| {
        let owner = program.local(local).owner;
        if Some(owner) == method {
            Ok(())
        } else {
            Err(ice!(
                "local '{}' belongs to {}",
                program.local(local).name,
                program.qualified_method_name(owner)
            ))
        }
    };
    match kind {
        NodeKind::MethodCall { method: callee, .. } => check_method(*callee),
        NodeKind::New { constructor, .. } => check_method(*constructor),
        NodeKind::FieldRef { field, .. } => {
            if program.is_live(Member::Field(*field)) {
                Ok(())
            } else {
                Err(ice!("reference to removed field {}", program.qualified_field_name(*field)))
            }
        }
        NodeKind::NativeBlock(native) => {
            for callee in &native.method_refs {
                check_method(*callee)?;
            }
            for field in &native.field_refs {
                if !program.is_live(Member::Field(*field)) {
                    return Err(ice!(
                        "native code references removed field {}",
                        program.qualified_field_name(*field)
                    ));
                }
            }
            Ok(())
        }
        NodeKind::LocalRef(local) | NodeKind::LocalDecl { local, .. } => check_local(*local),
        NodeKind::Try { catch_locals, .. } => {
            for local in catch_locals {
                check_local(*local)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// The context's own indices agree with each other, and its graphs agree
/// with what the live method bodies actually reference
pub fn verify_context(program: &Program, ctx: &dyn OptimizerContext) -> Result<(), InternalError> {
    ctx.check_consistency()?;
    let (Some(calls), Some(field_refs)) = (ctx.call_graph(), ctx.field_references()) else {
        return Ok(());
    };
    let live: FxIndexSet<MethodId> = program.methods().into_iter().collect();
    for method in &live {
        let refs = References::of_method(program, *method);
        let callees: FxIndexSet<MethodId> = calls.callees_of(*method).collect();
        if callees != refs.callees {
            return Err(ice!(
                "call graph is stale for {}",
                program.qualified_method_name(*method)
            ));
        }
        let fields: FxIndexSet<_> = field_refs.fields_of(*method).collect();
        if fields != refs.fields {
            return Err(ice!(
                "field references are stale for {}",
                program.qualified_method_name(*method)
            ));
        }
    }
    if let Some((caller, _)) = calls.calls().find(|(caller, _)| !live.contains(caller)) {
        return Err(ice!(
            "call graph still has edges from removed method {}",
            program.qualified_method_name(caller)
        ));
    }
    Ok(())
}
