//! Change tracking on top of the traversal engine.
//!
//! A [`ChangeTrackingVisitor`] is driven by [`run_tracked`]. Every edit a
//! callback makes through its [`Context`], and every explicit
//! [`Tracking::made_changes`], marks the enclosing method or field as
//! modified in the optimizer context, once per run. When the walk is
//! complete the call graph and field references of each modified method
//! are recomputed.

use super::{Context, Traversal, Visitor};
use crate::ast::{FieldId, Member, MethodId, NodeId, Program, TypeId};
use crate::errors::InternalError;
use crate::optimizer::graph::{CallGraph, FxIndexSet};
use crate::optimizer::OptimizerContext;
use tracing::trace;

#[allow(unused_variables)]
pub trait ChangeTrackingVisitor {
    fn enter(
        &mut self,
        cx: &mut Tracking<'_>,
        program: &mut Program,
        node: NodeId,
        ctx: &mut Context,
    ) -> Result<bool, InternalError> {
        Ok(true)
    }

    fn exit(
        &mut self,
        cx: &mut Tracking<'_>,
        program: &mut Program,
        node: NodeId,
        ctx: &mut Context,
    ) -> Result<(), InternalError> {
        Ok(())
    }

    fn enter_type(
        &mut self,
        cx: &mut Tracking<'_>,
        program: &mut Program,
        ty: TypeId,
    ) -> Result<bool, InternalError> {
        Ok(true)
    }

    fn exit_type(
        &mut self,
        cx: &mut Tracking<'_>,
        program: &mut Program,
        ty: TypeId,
    ) -> Result<(), InternalError> {
        Ok(())
    }

    fn enter_method(
        &mut self,
        cx: &mut Tracking<'_>,
        program: &mut Program,
        method: MethodId,
    ) -> Result<bool, InternalError> {
        Ok(true)
    }

    fn exit_method(
        &mut self,
        cx: &mut Tracking<'_>,
        program: &mut Program,
        method: MethodId,
    ) -> Result<(), InternalError> {
        Ok(())
    }

    fn enter_field(
        &mut self,
        cx: &mut Tracking<'_>,
        program: &mut Program,
        field: FieldId,
    ) -> Result<bool, InternalError> {
        Ok(true)
    }

    fn exit_field(
        &mut self,
        cx: &mut Tracking<'_>,
        program: &mut Program,
        field: FieldId,
    ) -> Result<(), InternalError> {
        Ok(())
    }
}

/// Bookkeeping for one tracked run, handed to every hook
pub struct Tracking<'o> {
    optimizer: &'o mut dyn OptimizerContext,
    current_method: Option<MethodId>,
    current_field: Option<FieldId>,
    num_mods: usize,
    modified: FxIndexSet<Member>,
    removed: FxIndexSet<Member>,
}

impl<'o> Tracking<'o> {
    pub fn new(optimizer: &'o mut dyn OptimizerContext) -> Self {
        Tracking {
            optimizer,
            current_method: None,
            current_field: None,
            num_mods: 0,
            modified: FxIndexSet::default(),
            removed: FxIndexSet::default(),
        }
    }

    pub fn current_method(&self) -> Option<MethodId> {
        self.current_method
    }

    pub fn current_field(&self) -> Option<FieldId> {
        self.current_field
    }

    pub fn current_member(&self) -> Option<Member> {
        self.current_method
            .map(Member::Method)
            .or(self.current_field.map(Member::Field))
    }

    /// Count one modification of the enclosing member
    pub fn made_changes(&mut self) {
        self.record(1);
    }

    /// Mark a member other than the enclosing one, e.g. a method whose
    /// signature was rewritten from outside its body
    pub fn mark_modified(&mut self, member: Member) {
        if self.removed.contains(&member) {
            return;
        }
        if self.modified.insert(member) {
            self.optimizer.mark_modified(member);
        }
    }

    /// Remove a method from its type and purge it from the optimizer
    /// context. Returns `false` if it was already removed.
    pub fn remove_method(&mut self, program: &mut Program, method: MethodId) -> bool {
        if !program.detach_method(method) {
            return false;
        }
        trace!("removed method {}", program.qualified_method_name(method));
        self.forget(Member::Method(method));
        true
    }

    /// Remove a field from its type and purge it from the optimizer
    /// context. Returns `false` if it was already removed.
    pub fn remove_field(&mut self, program: &mut Program, field: FieldId) -> bool {
        if !program.detach_field(field) {
            return false;
        }
        trace!("removed field {}", program.qualified_field_name(field));
        self.forget(Member::Field(field));
        true
    }

    pub fn num_mods(&self) -> usize {
        self.num_mods
    }

    pub fn did_change(&self) -> bool {
        self.num_mods > 0
    }

    pub fn optimizer(&mut self) -> &mut dyn OptimizerContext {
        &mut *self.optimizer
    }

    /// Recompute the dependencies of every modified method and report what
    /// the run did
    pub fn finish(self, program: &Program, num_visits: usize) -> TrackingOutcome {
        let mut deleted_calls = CallGraph::new();
        let mut added_calls = CallGraph::new();
        for member in &self.modified {
            if let Member::Method(method) = member {
                self.optimizer.update_call_graph_of_method(
                    program,
                    *method,
                    &mut deleted_calls,
                    &mut added_calls,
                );
                self.optimizer
                    .update_field_references_of_method(program, *method);
            }
        }
        TrackingOutcome {
            num_mods: self.num_mods,
            num_visits,
            modified: self.modified.into_iter().collect(),
            removed: self.removed.into_iter().collect(),
            deleted_calls,
            added_calls,
        }
    }

    fn record(&mut self, changes: usize) {
        if changes == 0 {
            return;
        }
        self.num_mods += changes;
        if let Some(member) = self.current_member() {
            self.mark_modified(member);
        }
    }

    fn forget(&mut self, member: Member) {
        self.optimizer.remove(member);
        self.modified.shift_remove(&member);
        self.removed.insert(member);
        self.num_mods += 1;
    }
}

/// Summary of a tracked run
#[derive(Debug, Clone)]
pub struct TrackingOutcome {
    pub num_mods: usize,
    pub num_visits: usize,
    pub modified: Vec<Member>,
    pub removed: Vec<Member>,
    /// Call edges that disappeared from modified methods
    pub deleted_calls: CallGraph,
    /// Call edges that appeared in modified methods
    pub added_calls: CallGraph,
}

impl TrackingOutcome {
    pub fn did_change(&self) -> bool {
        self.num_mods > 0
    }
}

/// The part of the program a tracked run walks
#[derive(Debug, Clone, Copy)]
pub enum Scope<'a> {
    Program,
    /// Only these members; type hooks are not called
    Members {
        methods: &'a [MethodId],
        fields: &'a [FieldId],
    },
}

struct Tracked<'v, 'o, V: ?Sized> {
    visitor: &'v mut V,
    cx: Tracking<'o>,
}

impl<V: ChangeTrackingVisitor + ?Sized> Visitor for Tracked<'_, '_, V> {
    fn enter(
        &mut self,
        program: &mut Program,
        node: NodeId,
        ctx: &mut Context,
    ) -> Result<bool, InternalError> {
        let descend = self.visitor.enter(&mut self.cx, program, node, ctx)?;
        self.cx.record(ctx.change_count());
        Ok(descend)
    }

    fn exit(
        &mut self,
        program: &mut Program,
        node: NodeId,
        ctx: &mut Context,
    ) -> Result<(), InternalError> {
        self.visitor.exit(&mut self.cx, program, node, ctx)?;
        self.cx.record(ctx.change_count());
        Ok(())
    }

    fn enter_type(&mut self, program: &mut Program, ty: TypeId) -> Result<bool, InternalError> {
        self.visitor.enter_type(&mut self.cx, program, ty)
    }

    fn exit_type(&mut self, program: &mut Program, ty: TypeId) -> Result<(), InternalError> {
        self.visitor.exit_type(&mut self.cx, program, ty)
    }

    fn enter_method(
        &mut self,
        program: &mut Program,
        method: MethodId,
    ) -> Result<bool, InternalError> {
        self.cx.current_method = Some(method);
        self.visitor.enter_method(&mut self.cx, program, method)
    }

    fn exit_method(&mut self, program: &mut Program, method: MethodId) -> Result<(), InternalError> {
        let result = self.visitor.exit_method(&mut self.cx, program, method);
        self.cx.current_method = None;
        result
    }

    fn enter_field(&mut self, program: &mut Program, field: FieldId) -> Result<bool, InternalError> {
        self.cx.current_field = Some(field);
        self.visitor.enter_field(&mut self.cx, program, field)
    }

    fn exit_field(&mut self, program: &mut Program, field: FieldId) -> Result<(), InternalError> {
        let result = self.visitor.exit_field(&mut self.cx, program, field);
        self.cx.current_field = None;
        result
    }
}

/// Walk `scope` with a change-tracking visitor, apply deferred edits and
/// bring the optimizer context's graphs up to date
pub fn run_tracked<V: ChangeTrackingVisitor + ?Sized>(
    program: &mut Program,
    optimizer: &mut dyn OptimizerContext,
    visitor: &mut V,
    scope: Scope<'_>,
) -> Result<TrackingOutcome, InternalError> {
    let mut traversal = Traversal::new();
    let mut tracked = Tracked {
        visitor,
        cx: Tracking::new(optimizer),
    };
    match scope {
        Scope::Program => traversal.accept_program(program, &mut tracked)?,
        Scope::Members { methods, fields } => {
            for field in fields {
                traversal.accept_field(program, &mut tracked, *field)?;
            }
            for method in methods {
                traversal.accept_method(program, &mut tracked, *method)?;
            }
        }
    }
    let stats = traversal.finish(program)?;
    Ok(tracked.cx.finish(program, stats.visits))
}
