//! Arena-backed program model.
//!
//! Every node, member and local lives in an [`id_arena::Arena`] owned by the
//! [`Program`] and is addressed by a copyable handle. Nodes reference their
//! children by handle and never their parent; the traversal engine keeps the
//! path. Replacing or removing a node is an update of the slot that holds it.

pub mod member;
pub mod node;
pub mod symbols;
pub mod types;

pub use member::{DeclaredType, Field, Local, Method, TypeKind};
pub use node::{
    BinaryOp, Category, ChildSlot, Edge, Literal, NativeCode, Node, NodeKind, Removal, UnaryOp,
};
pub use symbols::{LongLibrary, WellKnownSymbols};
pub use types::Type;

use crate::errors::InternalError;
use crate::ice;
use crate::span::Span;
use id_arena::{Arena, Id};
use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use std::fmt;

pub type NodeId = Id<Node>;
pub type MethodId = Id<Method>;
pub type FieldId = Id<Field>;
pub type TypeId = Id<DeclaredType>;
pub type LocalId = Id<Local>;

type FxIndexMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// A method or field, the unit of dependency tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Member {
    Method(MethodId),
    Field(FieldId),
}

/// The place a node is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Child { parent: NodeId, position: usize },
    MethodBody(MethodId),
    FieldInitializer(FieldId),
}

pub struct Program {
    nodes: Arena<Node>,
    types: Arena<DeclaredType>,
    methods: Arena<Method>,
    fields: Arena<Field>,
    locals: Arena<Local>,
    type_order: Vec<TypeId>,
    types_by_name: FxIndexMap<String, TypeId>,
    indexed_methods: FxIndexMap<String, MethodId>,
    entry_methods: Vec<MethodId>,
    object_type: Option<TypeId>,
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("types", &self.type_order.len())
            .field("methods", &self.methods.len())
            .field("fields", &self.fields.len())
            .field("nodes", &self.nodes.len())
            .field("entry_methods", &self.entry_methods.len())
            .finish_non_exhaustive()
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

impl Program {
    pub fn new() -> Self {
        Program {
            nodes: Arena::new(),
            types: Arena::new(),
            methods: Arena::new(),
            fields: Arena::new(),
            locals: Arena::new(),
            type_order: Vec::new(),
            types_by_name: FxIndexMap::default(),
            indexed_methods: FxIndexMap::default(),
            entry_methods: Vec::new(),
            object_type: None,
        }
    }

    // ---- types -------------------------------------------------------

    pub fn add_type(&mut self, declared: DeclaredType) -> TypeId {
        let name = declared.name.clone();
        let id = self.types.alloc(declared);
        self.type_order.push(id);
        self.types_by_name.insert(name, id);
        id
    }

    pub fn declared_type(&self, id: TypeId) -> &DeclaredType {
        &self.types[id]
    }

    pub fn declared_type_mut(&mut self, id: TypeId) -> &mut DeclaredType {
        &mut self.types[id]
    }

    pub fn find_type(&self, name: &str) -> Option<TypeId> {
        self.types_by_name.get(name).copied()
    }

    /// Types in declaration order
    pub fn types(&self) -> &[TypeId] {
        &self.type_order
    }

    pub fn set_object_type(&mut self, id: TypeId) {
        self.object_type = Some(id);
    }

    pub fn object_type(&self) -> Option<TypeId> {
        self.object_type
    }

    /// Reflexive, transitive subtype test over classes and interfaces
    pub fn is_subtype(&self, sub: TypeId, sup: TypeId) -> bool {
        if sub == sup {
            return true;
        }
        let declared = &self.types[sub];
        declared
            .super_class
            .into_iter()
            .chain(declared.interfaces.iter().copied())
            .any(|parent| self.is_subtype(parent, sup))
    }

    /// Whether a value of static type `from` can be used where `to` is
    /// expected without a conversion. Primitive types only match themselves.
    pub fn is_assignable(&self, from: &Type, to: &Type) -> bool {
        if from == to {
            return true;
        }
        let is_object = |t: &TypeId| Some(*t) == self.object_type;
        match (from, to) {
            (Type::Null, to) => to.is_reference(),
            (Type::String, Type::Class(c)) | (Type::Array(_), Type::Class(c)) => is_object(c),
            (Type::Class(a), Type::Class(b)) => is_object(b) || self.is_subtype(*a, *b),
            (Type::Array(a), Type::Array(b)) => {
                a.is_reference() && b.is_reference() && self.is_assignable(a, b)
            }
            _ => false,
        }
    }

    pub fn type_name(&self, ty: &Type) -> String {
        match ty {
            Type::Void => "void".to_string(),
            Type::Boolean => "boolean".to_string(),
            Type::Int => "int".to_string(),
            Type::Long => "long".to_string(),
            Type::Double => "double".to_string(),
            Type::String => "String".to_string(),
            Type::Null => "null".to_string(),
            Type::Class(id) => self.types[*id].name.clone(),
            Type::Array(element) => format!("{}[]", self.type_name(element)),
        }
    }

    // ---- members -----------------------------------------------------

    pub fn add_method(&mut self, owner: TypeId, mut method: Method) -> MethodId {
        method.enclosing = owner;
        let id = self.methods.alloc(method);
        self.types[owner].methods.push(id);
        id
    }

    pub fn add_field(&mut self, owner: TypeId, mut field: Field) -> FieldId {
        field.enclosing = owner;
        let id = self.fields.alloc(field);
        self.types[owner].fields.push(id);
        id
    }

    pub fn method(&self, id: MethodId) -> &Method {
        &self.methods[id]
    }

    pub fn method_mut(&mut self, id: MethodId) -> &mut Method {
        &mut self.methods[id]
    }

    pub fn field(&self, id: FieldId) -> &Field {
        &self.fields[id]
    }

    pub fn field_mut(&mut self, id: FieldId) -> &mut Field {
        &mut self.fields[id]
    }

    pub fn add_param(&mut self, method: MethodId, name: impl Into<String>, ty: Type) -> LocalId {
        let id = self.alloc_local(method, name.into(), ty, true);
        self.methods[method].params.push(id);
        id
    }

    pub fn add_local(&mut self, method: MethodId, name: impl Into<String>, ty: Type) -> LocalId {
        self.alloc_local(method, name.into(), ty, false)
    }

    fn alloc_local(&mut self, owner: MethodId, name: String, ty: Type, is_param: bool) -> LocalId {
        let id = self.locals.alloc(Local {
            name,
            ty,
            is_param,
            owner,
        });
        self.methods[owner].locals.push(id);
        id
    }

    pub fn local(&self, id: LocalId) -> &Local {
        &self.locals[id]
    }

    /// Live methods in declaration order
    pub fn methods(&self) -> Vec<MethodId> {
        self.type_order
            .iter()
            .flat_map(|t| self.types[*t].methods.iter().copied())
            .collect()
    }

    /// Live fields in declaration order
    pub fn fields(&self) -> Vec<FieldId> {
        self.type_order
            .iter()
            .flat_map(|t| self.types[*t].fields.iter().copied())
            .collect()
    }

    pub fn is_live(&self, member: Member) -> bool {
        match member {
            Member::Method(m) => !self.methods[m].detached,
            Member::Field(f) => !self.fields[f].detached,
        }
    }

    /// First method named `name` declared directly in `owner`
    pub fn find_method(&self, owner: TypeId, name: &str) -> Option<MethodId> {
        self.types[owner]
            .methods
            .iter()
            .copied()
            .find(|m| self.methods[*m].name == name)
    }

    pub fn find_field(&self, owner: TypeId, name: &str) -> Option<FieldId> {
        self.types[owner]
            .fields
            .iter()
            .copied()
            .find(|f| self.fields[*f].name == name)
    }

    /// Method lookup by name and arity through the supertypes of `owner`,
    /// nearest declaration first
    pub fn resolve_method(&self, owner: TypeId, name: &str, arity: usize) -> Option<MethodId> {
        let declared = &self.types[owner];
        let own = declared.methods.iter().copied().find(|m| {
            let method = &self.methods[*m];
            method.name == name && method.params.len() == arity
        });
        own.or_else(|| {
            declared
                .super_class
                .into_iter()
                .chain(declared.interfaces.iter().copied())
                .find_map(|parent| self.resolve_method(parent, name, arity))
        })
    }

    pub fn resolve_field(&self, owner: TypeId, name: &str) -> Option<FieldId> {
        self.find_field(owner, name).or_else(|| {
            self.types[owner]
                .super_class
                .and_then(|parent| self.resolve_field(parent, name))
        })
    }

    pub fn qualified_method_name(&self, id: MethodId) -> String {
        let method = &self.methods[id];
        format!("{}.{}", self.types[method.enclosing].name, method.name)
    }

    pub fn qualified_field_name(&self, id: FieldId) -> String {
        let field = &self.fields[id];
        format!("{}.{}", self.types[field.enclosing].name, field.name)
    }

    pub fn member_name(&self, member: Member) -> String {
        match member {
            Member::Method(m) => self.qualified_method_name(m),
            Member::Field(f) => self.qualified_field_name(f),
        }
    }

    /// Register a well-known method under `key`. Indexed methods are always
    /// reachable.
    pub fn index_method(&mut self, key: impl Into<String>, method: MethodId) {
        self.indexed_methods.insert(key.into(), method);
    }

    /// Look up a well-known method. Missing symbols are a compiler defect,
    /// not a user error.
    pub fn indexed_method(&self, key: &str) -> Result<MethodId, InternalError> {
        self.indexed_methods
            .get(key)
            .copied()
            .filter(|m| !self.methods[*m].detached)
            .ok_or_else(|| ice!("unknown indexed method '{}'", key))
    }

    pub fn indexed_methods(&self) -> impl Iterator<Item = MethodId> + '_ {
        self.indexed_methods.values().copied()
    }

    pub fn add_entry_method(&mut self, method: MethodId) {
        if !self.entry_methods.contains(&method) {
            self.entry_methods.push(method);
        }
    }

    pub fn entry_methods(&self) -> &[MethodId] {
        &self.entry_methods
    }

    /// Unlink a method from its type. Dependency state is not touched here;
    /// passes remove members through the change-tracking framework.
    pub(crate) fn detach_method(&mut self, id: MethodId) -> bool {
        if self.methods[id].detached {
            return false;
        }
        self.methods[id].detached = true;
        let owner = self.methods[id].enclosing;
        self.types[owner].methods.retain(|m| *m != id);
        self.entry_methods.retain(|m| *m != id);
        self.indexed_methods.retain(|_, m| *m != id);
        for (_, method) in self.methods.iter_mut() {
            method.overrides.retain(|m| *m != id);
        }
        true
    }

    pub(crate) fn detach_field(&mut self, id: FieldId) -> bool {
        if self.fields[id].detached {
            return false;
        }
        self.fields[id].detached = true;
        let owner = self.fields[id].enclosing;
        self.types[owner].fields.retain(|f| *f != id);
        true
    }

    // ---- nodes -------------------------------------------------------

    pub fn add_node(&mut self, kind: NodeKind, ty: Type, span: Span) -> NodeId {
        self.nodes.alloc(Node::new(kind, ty, span))
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id].kind
    }

    pub fn ty(&self, id: NodeId) -> &Type {
        &self.nodes[id].ty
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn literal(&mut self, value: Literal) -> NodeId {
        let ty = match &value {
            Literal::Null => Type::Null,
            Literal::Boolean(_) => Type::Boolean,
            Literal::Int(_) => Type::Int,
            Literal::Long(_) => Type::Long,
            Literal::Double(_) => Type::Double,
            Literal::String(_) => Type::String,
        };
        self.add_node(NodeKind::Literal(value), ty, Span::dummy())
    }

    pub fn int_literal(&mut self, value: i32) -> NodeId {
        self.literal(Literal::Int(value))
    }

    pub fn long_literal(&mut self, value: i64) -> NodeId {
        self.literal(Literal::Long(value))
    }

    pub fn bool_literal(&mut self, value: bool) -> NodeId {
        self.literal(Literal::Boolean(value))
    }

    pub fn null_literal(&mut self) -> NodeId {
        self.literal(Literal::Null)
    }

    pub fn string_literal(&mut self, value: impl Into<String>) -> NodeId {
        self.literal(Literal::String(value.into()))
    }

    pub fn empty_statement(&mut self) -> NodeId {
        self.add_node(NodeKind::Empty, Type::Void, Span::dummy())
    }

    pub fn block(&mut self, statements: Vec<NodeId>) -> NodeId {
        self.add_node(NodeKind::Block(statements), Type::Void, Span::dummy())
    }

    pub fn expr_stmt(&mut self, expr: NodeId) -> NodeId {
        let span = self.nodes[expr].span;
        self.add_node(NodeKind::ExprStmt(expr), Type::Void, span)
    }

    pub fn local_decl(&mut self, local: LocalId, init: Option<NodeId>) -> NodeId {
        self.add_node(NodeKind::LocalDecl { local, init }, Type::Void, Span::dummy())
    }

    pub fn local_ref(&mut self, local: LocalId) -> NodeId {
        let ty = self.locals[local].ty.clone();
        self.add_node(NodeKind::LocalRef(local), ty, Span::dummy())
    }

    pub fn field_ref(&mut self, instance: Option<NodeId>, field: FieldId) -> NodeId {
        let ty = self.fields[field].ty.clone();
        self.add_node(NodeKind::FieldRef { instance, field }, ty, Span::dummy())
    }

    /// Call with dynamic dispatch when `instance` is present
    pub fn call(&mut self, instance: Option<NodeId>, method: MethodId, args: Vec<NodeId>) -> NodeId {
        let ty = self.methods[method].return_type.clone();
        let kind = NodeKind::MethodCall {
            instance,
            method,
            args,
            static_dispatch: instance.is_none(),
        };
        self.add_node(kind, ty, Span::dummy())
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: NodeId, rhs: NodeId, ty: Type) -> NodeId {
        let span = self.nodes[lhs].span.combine(&self.nodes[rhs].span);
        self.add_node(NodeKind::Binary { op, lhs, rhs }, ty, span)
    }

    pub fn assign(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        let ty = self.nodes[lhs].ty.clone();
        self.binary(BinaryOp::Assign, lhs, rhs, ty)
    }

    pub fn unary(&mut self, op: UnaryOp, operand: NodeId, ty: Type) -> NodeId {
        let span = self.nodes[operand].span;
        self.add_node(NodeKind::Unary { op, operand }, ty, span)
    }

    /// Comma expression typed by its last element
    pub fn multi(&mut self, exprs: Vec<NodeId>) -> NodeId {
        let ty = exprs
            .last()
            .map(|last| self.nodes[*last].ty.clone())
            .unwrap_or(Type::Void);
        self.add_node(NodeKind::Multi(exprs), ty, Span::dummy())
    }

    /// Deep copy of a subtree. Locals and members are shared with the
    /// original.
    pub fn clone_subtree(&mut self, root: NodeId) -> NodeId {
        let mut node = self.nodes[root].clone();
        let positions = node.kind.position_count();
        for position in 0..positions {
            if let Some((Some(child), _)) = node.kind.child_at(position) {
                let copy = self.clone_subtree(child);
                // The position was just read back from the same kind
                let _ = node.kind.replace_child(position, copy);
            }
        }
        self.nodes.alloc(node)
    }

    /// Read-only pre-order walk of a subtree
    pub fn preorder(&self, root: NodeId) -> Preorder<'_> {
        Preorder {
            program: self,
            stack: vec![root],
        }
    }

    /// Conservative purity test: locals, literals, `this` and field reads
    /// of pure instances have no side effects.
    pub fn has_side_effects(&self, id: NodeId) -> bool {
        match &self.nodes[id].kind {
            NodeKind::Literal(_) | NodeKind::LocalRef(_) | NodeKind::This => false,
            NodeKind::FieldRef { instance, .. } => {
                instance.is_some_and(|inner| self.has_side_effects(inner))
            }
            _ => true,
        }
    }

    // ---- slots -------------------------------------------------------

    /// Current occupant of a slot; `Ok(None)` for an empty optional slot.
    /// A position that does not exist is an inconsistent tree.
    pub fn slot_node(&self, slot: Slot) -> Result<Option<NodeId>, InternalError> {
        match slot {
            Slot::Child { parent, position } => self.nodes[parent]
                .kind
                .child_at(position)
                .map(|(child, _)| child)
                .ok_or_else(|| ice!("node has no child at position {}", position)),
            Slot::MethodBody(m) => Ok(self.methods[m].body),
            Slot::FieldInitializer(f) => Ok(self.fields[f].initializer),
        }
    }

    pub fn slot_shape(&self, slot: Slot) -> Result<ChildSlot, InternalError> {
        match slot {
            Slot::Child { parent, position } => self.nodes[parent]
                .kind
                .child_at(position)
                .map(|(_, shape)| shape)
                .ok_or_else(|| ice!("node has no child at position {}", position)),
            Slot::MethodBody(_) => Ok(ChildSlot {
                category: Category::Statement,
                edge: Edge::Required,
            }),
            Slot::FieldInitializer(_) => Ok(ChildSlot {
                category: Category::Expression,
                edge: Edge::Optional,
            }),
        }
    }

    /// Store `new` into `slot`, checking that its category fits
    pub fn replace_in_slot(&mut self, slot: Slot, new: NodeId) -> Result<(), InternalError> {
        let shape = self.slot_shape(slot)?;
        let category = self.nodes[new].kind.category();
        if category != shape.category {
            return Err(ice!(
                "cannot store a {:?} in a {:?} slot",
                category,
                shape.category
            ));
        }
        match slot {
            Slot::Child { parent, position } => {
                self.nodes[parent].kind.replace_child(position, new)?;
            }
            Slot::MethodBody(m) => self.methods[m].body = Some(new),
            Slot::FieldInitializer(f) => self.fields[f].initializer = Some(new),
        }
        Ok(())
    }

    pub fn remove_from_slot(&mut self, slot: Slot) -> Result<Removal, InternalError> {
        match slot {
            Slot::Child { parent, position } => self.nodes[parent].kind.remove_child(position),
            Slot::MethodBody(m) => Err(ice!(
                "cannot remove the body of {}",
                self.qualified_method_name(m)
            )),
            Slot::FieldInitializer(f) => {
                self.fields[f].initializer = None;
                Ok(Removal::Cleared)
            }
        }
    }

    /// Insert a statement into a block at `position`
    pub fn insert_statement(
        &mut self,
        block: NodeId,
        position: usize,
        statement: NodeId,
    ) -> Result<(), InternalError> {
        if !self.nodes[statement].kind.is_statement() {
            return Err(ice!("only statements can be inserted into a block"));
        }
        if !self.nodes[block].kind.is_block() {
            return Err(ice!("insertion target is not a block"));
        }
        self.nodes[block].kind.insert_child(position, statement)
    }
}

/// Iterator returned by [`Program::preorder`]
pub struct Preorder<'a> {
    program: &'a Program,
    stack: Vec<NodeId>,
}

impl Iterator for Preorder<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        let children = self.program.nodes[id].kind.children();
        self.stack.extend(children.into_iter().rev());
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(program: &mut Program, name: &str, super_class: Option<TypeId>) -> TypeId {
        let mut declared = DeclaredType::new(name, TypeKind::Class);
        declared.super_class = super_class;
        program.add_type(declared)
    }

    #[test]
    fn test_subtype_and_assignability() {
        let mut program = Program::new();
        let object = class(&mut program, "Object", None);
        program.set_object_type(object);
        let a = class(&mut program, "A", Some(object));
        let b = class(&mut program, "B", Some(a));
        let i = program.add_type(DeclaredType::new("I", TypeKind::Interface));
        program.declared_type_mut(b).interfaces.push(i);

        assert!(program.is_subtype(b, a));
        assert!(program.is_subtype(b, i));
        assert!(!program.is_subtype(a, b));
        assert!(program.is_assignable(&Type::Class(b), &Type::Class(object)));
        assert!(program.is_assignable(&Type::Null, &Type::Class(a)));
        assert!(program.is_assignable(&Type::String, &Type::Class(object)));
        assert!(!program.is_assignable(&Type::Int, &Type::Long));
        assert!(program.is_assignable(
            &Type::array_of(Type::Class(b)),
            &Type::array_of(Type::Class(a))
        ));
        assert!(!program.is_assignable(
            &Type::array_of(Type::Int),
            &Type::array_of(Type::Long)
        ));
    }

    #[test]
    fn test_clone_subtree_is_deep() {
        let mut program = Program::new();
        let one = program.int_literal(1);
        let two = program.int_literal(2);
        let sum = program.binary(BinaryOp::Add, one, two, Type::Int);
        let copy = program.clone_subtree(sum);

        assert_ne!(copy, sum);
        let copied_children = program.kind(copy).children();
        assert_eq!(copied_children.len(), 2);
        assert!(!copied_children.contains(&one));
        assert_eq!(program.kind(copied_children[0]), &NodeKind::Literal(Literal::Int(1)));
    }

    #[test]
    fn test_preorder_visits_parent_before_children() {
        let mut program = Program::new();
        let one = program.int_literal(1);
        let stmt = program.expr_stmt(one);
        let empty = program.empty_statement();
        let block = program.block(vec![stmt, empty]);
        let order: Vec<_> = program.preorder(block).collect();
        assert_eq!(order, vec![block, stmt, one, empty]);
    }

    #[test]
    fn test_detach_method_unlinks_everywhere() {
        let mut program = Program::new();
        let a = class(&mut program, "A", None);
        let b = class(&mut program, "B", Some(a));
        let base = program.add_method(a, Method::new("run", a, Type::Void));
        let mut derived = Method::new("run", b, Type::Void);
        derived.overrides.push(base);
        let derived = program.add_method(b, derived);
        program.add_entry_method(base);
        program.index_method("A.run", base);

        assert!(program.detach_method(base));
        assert!(!program.detach_method(base));
        assert!(program.method(derived).overrides.is_empty());
        assert!(program.entry_methods().is_empty());
        assert!(program.indexed_method("A.run").is_err());
        assert_eq!(program.methods(), vec![derived]);
    }

    #[test]
    fn test_replace_in_slot_rejects_wrong_category() {
        let mut program = Program::new();
        let one = program.int_literal(1);
        let stmt = program.expr_stmt(one);
        let block = program.block(vec![stmt]);
        let slot = Slot::Child {
            parent: block,
            position: 0,
        };
        let expr = program.int_literal(2);
        assert!(program.replace_in_slot(slot, expr).is_err());
        let empty = program.empty_statement();
        program.replace_in_slot(slot, empty).unwrap();
        assert_eq!(program.slot_node(slot).unwrap(), Some(empty));
    }

    #[test]
    fn test_resolve_method_walks_supertypes() {
        let mut program = Program::new();
        let a = class(&mut program, "A", None);
        let b = class(&mut program, "B", Some(a));
        let m = program.add_method(a, Method::new("size", a, Type::Int));
        assert_eq!(program.resolve_method(b, "size", 0), Some(m));
        assert_eq!(program.resolve_method(b, "size", 1), None);
        assert_eq!(program.qualified_method_name(m), "A.size");
    }
}
