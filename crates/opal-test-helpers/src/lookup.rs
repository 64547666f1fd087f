//! Finding members and nodes by name in loaded programs

use opal_core::ast::{FieldId, MethodId, NodeId, NodeKind, Program};

fn split(qualified: &str) -> (&str, &str) {
    qualified
        .split_once('.')
        .unwrap_or_else(|| panic!("'{}' is not a qualified name", qualified))
}

/// A method by `Type.name`, live or not
pub fn method(program: &Program, qualified: &str) -> MethodId {
    find_method(program, qualified).unwrap_or_else(|| panic!("no method {}", qualified))
}

/// A live method by `Type.name`
pub fn find_method(program: &Program, qualified: &str) -> Option<MethodId> {
    let (ty, name) = split(qualified);
    program
        .find_type(ty)
        .and_then(|ty| program.find_method(ty, name))
}

pub fn field(program: &Program, qualified: &str) -> FieldId {
    find_field(program, qualified).unwrap_or_else(|| panic!("no field {}", qualified))
}

pub fn find_field(program: &Program, qualified: &str) -> Option<FieldId> {
    let (ty, name) = split(qualified);
    program
        .find_type(ty)
        .and_then(|ty| program.find_field(ty, name))
}

/// Every node reachable from live method bodies and field initializers
pub fn all_nodes(program: &Program) -> Vec<NodeId> {
    let roots = program
        .methods()
        .into_iter()
        .filter_map(|m| program.method(m).body)
        .chain(
            program
                .fields()
                .into_iter()
                .filter_map(|f| program.field(f).initializer),
        );
    roots.flat_map(|root| program.preorder(root)).collect()
}

/// Calls anywhere in the program whose target is `Type.name`
pub fn calls_to(program: &Program, qualified: &str) -> usize {
    all_nodes(program)
        .into_iter()
        .filter(|n| match program.kind(*n) {
            NodeKind::MethodCall { method, .. } => {
                program.qualified_method_name(*method) == qualified
            }
            _ => false,
        })
        .count()
}

/// Nodes anywhere in the program matching `predicate`
pub fn count_nodes(program: &Program, predicate: impl Fn(&NodeKind) -> bool) -> usize {
    all_nodes(program)
        .into_iter()
        .filter(|n| predicate(program.kind(*n)))
        .count()
}
