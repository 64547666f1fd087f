//! Depth-first traversal with in-flight mutation.
//!
//! A [`Visitor`] receives `enter` before a node's children and `exit` after
//! them. Returning `false` from `enter` skips the children; the node's own
//! `exit` still runs. Each callback gets a [`Context`] through which it can
//! replace or remove the node or insert statements before it.
//!
//! Commit rules:
//!
//! * an edit requested in `enter` lands before the children are walked; a
//!   replacement's children are walked instead of the original's and the
//!   replacement receives `exit`
//! * an edit requested in `exit` lands after the subtree is done; the
//!   replacement is not visited
//! * a removed node receives no `exit`
//! * inserted statements are spliced into the innermost open block in
//!   front of the statement being traversed, and are not visited
//! * deferred edits are applied in request order by [`Traversal::finish`]

mod change_list;
mod context;
pub mod tracking;

pub use change_list::ChangeList;
pub use context::Context;
pub use tracking::{run_tracked, ChangeTrackingVisitor, Scope, Tracking, TrackingOutcome};

use crate::ast::{Edge, FieldId, MethodId, NodeId, Program, Slot, TypeId};
use crate::errors::InternalError;
use crate::ice;
use context::Edit;
use rustc_hash::FxHashSet;
use tracing::trace;

pub trait Visitor {
    fn enter(
        &mut self,
        _program: &mut Program,
        _node: NodeId,
        _ctx: &mut Context,
    ) -> Result<bool, InternalError> {
        Ok(true)
    }

    fn exit(
        &mut self,
        _program: &mut Program,
        _node: NodeId,
        _ctx: &mut Context,
    ) -> Result<(), InternalError> {
        Ok(())
    }

    fn enter_type(&mut self, _program: &mut Program, _ty: TypeId) -> Result<bool, InternalError> {
        Ok(true)
    }

    fn exit_type(&mut self, _program: &mut Program, _ty: TypeId) -> Result<(), InternalError> {
        Ok(())
    }

    fn enter_method(
        &mut self,
        _program: &mut Program,
        _method: MethodId,
    ) -> Result<bool, InternalError> {
        Ok(true)
    }

    fn exit_method(&mut self, _program: &mut Program, _method: MethodId) -> Result<(), InternalError> {
        Ok(())
    }

    fn enter_field(&mut self, _program: &mut Program, _field: FieldId) -> Result<bool, InternalError> {
        Ok(true)
    }

    fn exit_field(&mut self, _program: &mut Program, _field: FieldId) -> Result<(), InternalError> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TraversalStats {
    pub visits: usize,
    /// Edits requested through contexts, immediate and deferred
    pub changes: usize,
}

/// A block whose statements are being walked
#[derive(Debug)]
struct InsertionPoint {
    block: NodeId,
    current: Option<NodeId>,
    pending: Vec<NodeId>,
}

/// What happened to a slot's position after its node was visited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// The position still exists (occupied or cleared)
    Stayed,
    /// The node was removed from a list and its successors moved up
    Shifted,
}

enum Committed {
    Unchanged,
    Replaced(NodeId),
    Removed(Outcome),
}

#[derive(Debug, Default)]
pub struct Traversal {
    insertion_points: Vec<InsertionPoint>,
    path: Vec<NodeId>,
    on_path: FxHashSet<NodeId>,
    change_list: ChangeList,
    stats: TraversalStats,
}

impl Traversal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> TraversalStats {
        self.stats
    }

    pub fn pending_changes(&self) -> usize {
        self.change_list.len()
    }

    /// Walk every type in declaration order. Does not apply deferred edits.
    pub fn accept_program<V: Visitor + ?Sized>(
        &mut self,
        program: &mut Program,
        visitor: &mut V,
    ) -> Result<(), InternalError> {
        let types = program.types().to_vec();
        for ty in types {
            self.accept_type(program, visitor, ty)?;
        }
        Ok(())
    }

    /// Walk the fields, then the methods, of one type. Members removed
    /// during the walk are skipped.
    pub fn accept_type<V: Visitor + ?Sized>(
        &mut self,
        program: &mut Program,
        visitor: &mut V,
        ty: TypeId,
    ) -> Result<(), InternalError> {
        if visitor.enter_type(program, ty)? {
            let fields = program.declared_type(ty).fields.clone();
            for field in fields {
                self.accept_field(program, visitor, field)?;
            }
            let methods = program.declared_type(ty).methods.clone();
            for method in methods {
                self.accept_method(program, visitor, method)?;
            }
        }
        visitor.exit_type(program, ty)
    }

    pub fn accept_method<V: Visitor + ?Sized>(
        &mut self,
        program: &mut Program,
        visitor: &mut V,
        method: MethodId,
    ) -> Result<(), InternalError> {
        if program.method(method).is_detached() {
            return Ok(());
        }
        trace!("visiting method {}", program.qualified_method_name(method));
        if visitor.enter_method(program, method)? && !program.method(method).is_detached() {
            self.traverse_slot(program, visitor, Slot::MethodBody(method))
                .map_err(|e| {
                    e.with_context(format!(
                        "while visiting method {}",
                        program.qualified_method_name(method)
                    ))
                })?;
        }
        visitor.exit_method(program, method)
    }

    pub fn accept_field<V: Visitor + ?Sized>(
        &mut self,
        program: &mut Program,
        visitor: &mut V,
        field: FieldId,
    ) -> Result<(), InternalError> {
        if program.field(field).is_detached() {
            return Ok(());
        }
        if visitor.enter_field(program, field)? && !program.field(field).is_detached() {
            self.traverse_slot(program, visitor, Slot::FieldInitializer(field))
                .map_err(|e| {
                    e.with_context(format!(
                        "while visiting field {}",
                        program.qualified_field_name(field)
                    ))
                })?;
        }
        visitor.exit_field(program, field)
    }

    /// Walk the subtree held by an arbitrary slot
    pub fn accept_slot<V: Visitor + ?Sized>(
        &mut self,
        program: &mut Program,
        visitor: &mut V,
        slot: Slot,
    ) -> Result<(), InternalError> {
        self.traverse_slot(program, visitor, slot).map(|_| ())
    }

    /// Apply deferred edits and return the totals for the whole traversal
    pub fn finish(&mut self, program: &mut Program) -> Result<TraversalStats, InternalError> {
        if !self.insertion_points.is_empty() {
            return Err(ice!("traversal finished with open blocks"));
        }
        let applied = self
            .change_list
            .apply(program)
            .map_err(|e| e.with_context("while applying deferred edits"))?;
        if applied > 0 {
            trace!("applied {} deferred edits", applied);
        }
        Ok(self.stats)
    }

    fn traverse_slot<V: Visitor + ?Sized>(
        &mut self,
        program: &mut Program,
        visitor: &mut V,
        slot: Slot,
    ) -> Result<Outcome, InternalError> {
        let Some(mut node) = program.slot_node(slot)? else {
            return Ok(Outcome::Stayed);
        };
        self.stats.visits += 1;
        self.enter_path(node)?;

        let mut ctx = self.context(program, slot, node)?;
        let descend = visitor.enter(program, node, &mut ctx)?;
        match self.commit(program, slot, ctx)? {
            Committed::Unchanged => {}
            Committed::Replaced(replacement) => {
                self.leave_path(node);
                node = replacement;
                self.enter_path(node)?;
                self.track_replacement(slot, node);
            }
            Committed::Removed(outcome) => {
                self.leave_path(node);
                return Ok(outcome);
            }
        }

        if descend {
            self.traverse_children(program, visitor, node)?;
        }

        let mut ctx = self.context(program, slot, node)?;
        visitor.exit(program, node, &mut ctx)?;
        let committed = self.commit(program, slot, ctx)?;
        self.leave_path(node);
        Ok(match committed {
            Committed::Removed(outcome) => outcome,
            Committed::Unchanged | Committed::Replaced(_) => Outcome::Stayed,
        })
    }

    fn traverse_children<V: Visitor + ?Sized>(
        &mut self,
        program: &mut Program,
        visitor: &mut V,
        node: NodeId,
    ) -> Result<(), InternalError> {
        let is_block = program.kind(node).is_block();
        if is_block {
            self.insertion_points.push(InsertionPoint {
                block: node,
                current: None,
                pending: Vec::new(),
            });
        }
        let result = self.traverse_positions(program, visitor, node, is_block);
        if is_block {
            self.insertion_points.pop();
        }
        result
    }

    /// The child count is re-read every step because visiting a child may
    /// remove it or insert statements in front of it.
    fn traverse_positions<V: Visitor + ?Sized>(
        &mut self,
        program: &mut Program,
        visitor: &mut V,
        parent: NodeId,
        is_block: bool,
    ) -> Result<(), InternalError> {
        let mut position = 0;
        while position < program.kind(parent).position_count() {
            let slot = Slot::Child { parent, position };
            if is_block {
                let current = program.slot_node(slot)?;
                if let Some(point) = self.insertion_points.last_mut() {
                    point.current = current;
                }
            }
            let outcome = self.traverse_slot(program, visitor, slot)?;
            if is_block {
                position += self.flush_insertions(program, parent, position)?;
            }
            if outcome == Outcome::Stayed {
                position += 1;
            }
        }
        Ok(())
    }

    fn flush_insertions(
        &mut self,
        program: &mut Program,
        block: NodeId,
        position: usize,
    ) -> Result<usize, InternalError> {
        let pending = match self.insertion_points.last_mut() {
            Some(point) => std::mem::take(&mut point.pending),
            None => return Ok(0),
        };
        let count = pending.len();
        for (offset, statement) in pending.into_iter().enumerate() {
            program.insert_statement(block, position + offset, statement)?;
        }
        Ok(count)
    }

    fn context(&self, program: &Program, slot: Slot, node: NodeId) -> Result<Context, InternalError> {
        let shape = program.slot_shape(slot)?;
        let anchor = self
            .insertion_points
            .last()
            .and_then(|point| point.current.map(|current| (point.block, current)));
        Ok(Context::new(node, slot, shape, self.path.len() - 1, anchor))
    }

    fn commit(
        &mut self,
        program: &mut Program,
        slot: Slot,
        mut ctx: Context,
    ) -> Result<Committed, InternalError> {
        self.stats.changes += ctx.change_count();
        if !ctx.inserts.is_empty() {
            let point = self
                .insertion_points
                .last_mut()
                .ok_or_else(|| ice!("insert_before outside of any statement sequence"))?;
            point.pending.append(&mut ctx.inserts);
        }
        for edit in ctx.deferred.drain(..) {
            self.change_list.push(edit);
        }
        match ctx.edit {
            None => Ok(Committed::Unchanged),
            Some(Edit::Replace(replacement)) => {
                program.replace_in_slot(slot, replacement)?;
                Ok(Committed::Replaced(replacement))
            }
            Some(Edit::Remove) => {
                let shape = program.slot_shape(slot)?;
                match change_list::remove_or_empty(program, slot)? {
                    Some(placeholder) => Ok(Committed::Replaced(placeholder)),
                    None if shape.edge == Edge::ListElement => {
                        Ok(Committed::Removed(Outcome::Shifted))
                    }
                    None => Ok(Committed::Removed(Outcome::Stayed)),
                }
            }
        }
    }

    /// Keep the insertion anchor pointing at the live statement when a
    /// direct child of the open block is replaced
    fn track_replacement(&mut self, slot: Slot, replacement: NodeId) {
        if let Slot::Child { parent, .. } = slot {
            if let Some(point) = self.insertion_points.last_mut() {
                if point.block == parent {
                    point.current = Some(replacement);
                }
            }
        }
    }

    fn enter_path(&mut self, node: NodeId) -> Result<(), InternalError> {
        if !self.on_path.insert(node) {
            return Err(ice!("node is reachable from itself"));
        }
        self.path.push(node);
        Ok(())
    }

    fn leave_path(&mut self, node: NodeId) {
        self.path.pop();
        self.on_path.remove(&node);
    }
}
