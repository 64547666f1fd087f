use super::change_list::{DeferredEdit, Owner};
use crate::ast::{Category, ChildSlot, NodeId, Slot};
use crate::errors::InternalError;
use crate::ice;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Edit {
    Replace(NodeId),
    Remove,
}

/// Mutation handle for the node currently being visited.
///
/// Edits are recorded here and committed by the engine. Immediate edits
/// (`replace_me`, `remove_me`, `insert_before`) land as soon as the callback
/// returns; the `defer_*` variants are queued on the traversal's change list
/// and applied by [`Traversal::finish`](super::Traversal::finish).
#[derive(Debug)]
pub struct Context {
    node: NodeId,
    slot: Slot,
    shape: ChildSlot,
    depth: usize,
    /// Open block and the statement of it currently being traversed
    anchor: Option<(NodeId, NodeId)>,
    pub(crate) edit: Option<Edit>,
    pub(crate) inserts: Vec<NodeId>,
    pub(crate) deferred: Vec<DeferredEdit>,
    changes: usize,
}

impl Context {
    pub(crate) fn new(
        node: NodeId,
        slot: Slot,
        shape: ChildSlot,
        depth: usize,
        anchor: Option<(NodeId, NodeId)>,
    ) -> Self {
        Context {
            node,
            slot,
            shape,
            depth,
            anchor,
            edit: None,
            inserts: Vec::new(),
            deferred: Vec::new(),
            changes: 0,
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    /// Enclosing node, `None` at a method body or field initializer root
    pub fn parent(&self) -> Option<NodeId> {
        match self.slot {
            Slot::Child { parent, .. } => Some(parent),
            Slot::MethodBody(_) | Slot::FieldInitializer(_) => None,
        }
    }

    /// Number of nodes on the path above this one
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn category(&self) -> Category {
        self.shape.category
    }

    /// Statements can always be removed; they are replaced by an empty
    /// statement where the slot is required.
    pub fn can_remove(&self) -> bool {
        self.shape.edge.is_removable() || self.shape.category == Category::Statement
    }

    pub fn replace_me(&mut self, replacement: NodeId) -> Result<(), InternalError> {
        self.set_edit(Edit::Replace(replacement))
    }

    pub fn remove_me(&mut self) -> Result<(), InternalError> {
        self.check_removable()?;
        self.set_edit(Edit::Remove)
    }

    /// Insert a statement before the statement of the innermost open block
    /// that contains this node. Inserted statements are not visited.
    pub fn insert_before(&mut self, statement: NodeId) -> Result<(), InternalError> {
        self.check_insertion_point()?;
        self.inserts.push(statement);
        self.changes += 1;
        Ok(())
    }

    pub fn defer_replace_me(&mut self, replacement: NodeId) -> Result<(), InternalError> {
        self.deferred.push(DeferredEdit::Replace {
            owner: Owner::of(self.slot),
            target: self.node,
            replacement,
        });
        self.changes += 1;
        Ok(())
    }

    pub fn defer_remove_me(&mut self) -> Result<(), InternalError> {
        self.check_removable()?;
        self.deferred.push(DeferredEdit::Remove {
            owner: Owner::of(self.slot),
            target: self.node,
        });
        self.changes += 1;
        Ok(())
    }

    pub fn defer_insert_before(&mut self, statement: NodeId) -> Result<(), InternalError> {
        let (block, anchor) = self.check_insertion_point()?;
        self.deferred.push(DeferredEdit::InsertBefore {
            block,
            anchor,
            statement,
        });
        self.changes += 1;
        Ok(())
    }

    /// Record a change made by mutating the node in place
    pub fn made_changes(&mut self) {
        self.changes += 1;
    }

    pub fn change_count(&self) -> usize {
        self.changes
    }

    fn set_edit(&mut self, edit: Edit) -> Result<(), InternalError> {
        if self.edit.is_some() {
            return Err(ice!("node was already replaced or removed in this callback"));
        }
        self.edit = Some(edit);
        self.changes += 1;
        Ok(())
    }

    fn check_removable(&self) -> Result<(), InternalError> {
        if self.can_remove() {
            Ok(())
        } else {
            Err(ice!("cannot remove a required expression"))
        }
    }

    fn check_insertion_point(&self) -> Result<(NodeId, NodeId), InternalError> {
        self.anchor
            .ok_or_else(|| ice!("insert_before outside of any statement sequence"))
    }
}
