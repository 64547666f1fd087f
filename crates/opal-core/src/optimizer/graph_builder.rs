use super::graph::{CallGraph, FieldReferenceGraph, FxIndexSet};
use crate::ast::{FieldId, MethodId, NodeId, NodeKind, Program};

/// Outgoing dependencies found in one subtree
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct References {
    pub callees: FxIndexSet<MethodId>,
    pub fields: FxIndexSet<FieldId>,
}

impl References {
    /// Calls, constructor invocations, field accesses and the references
    /// declared by native blocks
    pub fn of_subtree(program: &Program, root: NodeId) -> Self {
        let mut refs = References::default();
        refs.scan(program, root);
        refs
    }

    /// Dependencies of a method body; empty for abstract or removed methods
    pub fn of_method(program: &Program, method: MethodId) -> Self {
        let declared = program.method(method);
        match declared.body {
            Some(body) if !declared.is_detached() => Self::of_subtree(program, body),
            _ => References::default(),
        }
    }

    fn scan(&mut self, program: &Program, root: NodeId) {
        for id in program.preorder(root) {
            match program.kind(id) {
                NodeKind::MethodCall { method, .. } => {
                    self.callees.insert(*method);
                }
                NodeKind::New { constructor, .. } => {
                    self.callees.insert(*constructor);
                }
                NodeKind::FieldRef { field, .. } => {
                    self.fields.insert(*field);
                }
                NodeKind::NativeBlock(native) => {
                    self.callees.extend(native.method_refs.iter().copied());
                    self.fields.extend(native.field_refs.iter().copied());
                }
                _ => {}
            }
        }
    }
}

/// Build both graphs from scratch over every live method
pub fn build_graphs(program: &Program) -> (CallGraph, FieldReferenceGraph) {
    let mut calls = CallGraph::new();
    let mut field_refs = FieldReferenceGraph::new();
    for method in program.methods() {
        let refs = References::of_method(program, method);
        for callee in refs.callees {
            calls.add_call(method, callee);
        }
        for field in refs.fields {
            field_refs.add_reference(method, field);
        }
    }
    (calls, field_refs)
}
