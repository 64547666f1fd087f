use crate::ast::{Category, FieldId, MethodId, NodeId, Program, Slot};
use crate::errors::InternalError;
use crate::ice;

/// Holder of a slot, without the position. Positions shift as earlier
/// edits land, so deferred edits find their target again by identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Owner {
    Node(NodeId),
    MethodBody(MethodId),
    FieldInitializer(FieldId),
}

impl Owner {
    pub(crate) fn of(slot: Slot) -> Owner {
        match slot {
            Slot::Child { parent, .. } => Owner::Node(parent),
            Slot::MethodBody(m) => Owner::MethodBody(m),
            Slot::FieldInitializer(f) => Owner::FieldInitializer(f),
        }
    }

    fn locate(self, program: &Program, target: NodeId) -> Result<Slot, InternalError> {
        let found = match self {
            Owner::Node(parent) => program
                .kind(parent)
                .position_of(target)
                .map(|position| Slot::Child { parent, position }),
            Owner::MethodBody(m) => {
                (program.method(m).body == Some(target)).then_some(Slot::MethodBody(m))
            }
            Owner::FieldInitializer(f) => (program.field(f).initializer == Some(target))
                .then_some(Slot::FieldInitializer(f)),
        };
        found.ok_or_else(|| ice!("deferred edit target is no longer held by its parent"))
    }
}

#[derive(Debug, Clone)]
pub(crate) enum DeferredEdit {
    Replace {
        owner: Owner,
        target: NodeId,
        replacement: NodeId,
    },
    Remove {
        owner: Owner,
        target: NodeId,
    },
    InsertBefore {
        block: NodeId,
        anchor: NodeId,
        statement: NodeId,
    },
}

/// Edits queued during a traversal, applied in request order once the
/// traversal is complete
#[derive(Debug, Default)]
pub struct ChangeList {
    edits: Vec<DeferredEdit>,
}

impl ChangeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub(crate) fn push(&mut self, edit: DeferredEdit) {
        self.edits.push(edit);
    }

    /// Apply and drain every queued edit, returning how many were applied
    pub fn apply(&mut self, program: &mut Program) -> Result<usize, InternalError> {
        let edits = std::mem::take(&mut self.edits);
        let count = edits.len();
        for edit in edits {
            match edit {
                DeferredEdit::Replace {
                    owner,
                    target,
                    replacement,
                } => {
                    let slot = owner.locate(program, target)?;
                    program.replace_in_slot(slot, replacement)?;
                }
                DeferredEdit::Remove { owner, target } => {
                    let slot = owner.locate(program, target)?;
                    remove_or_empty(program, slot)?;
                }
                DeferredEdit::InsertBefore {
                    block,
                    anchor,
                    statement,
                } => {
                    let position = program
                        .kind(block)
                        .position_of(anchor)
                        .ok_or_else(|| ice!("insertion anchor is no longer in its block"))?;
                    program.insert_statement(block, position, statement)?;
                }
            }
        }
        Ok(count)
    }
}

/// Remove the occupant of a slot. A required statement becomes an empty
/// statement; returns the placeholder when one was created.
pub(crate) fn remove_or_empty(
    program: &mut Program,
    slot: Slot,
) -> Result<Option<NodeId>, InternalError> {
    let shape = program.slot_shape(slot)?;
    if shape.edge.is_removable() {
        program.remove_from_slot(slot)?;
        return Ok(None);
    }
    match shape.category {
        Category::Statement => {
            let empty = program.empty_statement();
            program.replace_in_slot(slot, empty)?;
            Ok(Some(empty))
        }
        Category::Expression => Err(ice!("cannot remove a required expression")),
    }
}
