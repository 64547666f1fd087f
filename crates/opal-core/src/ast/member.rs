use super::{FieldId, LocalId, MethodId, NodeId, Type, TypeId};
use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Class,
    Interface,
}

/// A class or interface. Member order is declaration order and is kept
/// stable for deterministic output.
#[derive(Debug, Clone)]
pub struct DeclaredType {
    pub name: String,
    pub kind: TypeKind,
    pub super_class: Option<TypeId>,
    pub interfaces: Vec<TypeId>,
    pub fields: Vec<FieldId>,
    pub methods: Vec<MethodId>,
    pub is_final: bool,
    pub is_abstract: bool,
    /// Runtime support types whose methods are always reachable
    pub is_library: bool,
    pub span: Span,
}

impl DeclaredType {
    pub fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        DeclaredType {
            name: name.into(),
            kind,
            super_class: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            is_final: false,
            is_abstract: kind == TypeKind::Interface,
            is_library: false,
            span: Span::dummy(),
        }
    }

    pub fn is_interface(&self) -> bool {
        self.kind == TypeKind::Interface
    }
}

#[derive(Debug, Clone)]
pub struct Method {
    pub name: String,
    pub enclosing: TypeId,
    pub params: Vec<LocalId>,
    /// Every local owned by the method, parameters included
    pub locals: Vec<LocalId>,
    pub return_type: Type,
    /// `None` for abstract and interface methods
    pub body: Option<NodeId>,
    pub is_static: bool,
    pub is_final: bool,
    pub is_constructor: bool,
    pub is_synthetic: bool,
    /// Methods in supertypes this one directly overrides or implements
    pub overrides: Vec<MethodId>,
    pub span: Span,
    pub(crate) detached: bool,
}

impl Method {
    pub fn new(name: impl Into<String>, enclosing: TypeId, return_type: Type) -> Self {
        Method {
            name: name.into(),
            enclosing,
            params: Vec::new(),
            locals: Vec::new(),
            return_type,
            body: None,
            is_static: false,
            is_final: false,
            is_constructor: false,
            is_synthetic: false,
            overrides: Vec::new(),
            span: Span::dummy(),
            detached: false,
        }
    }

    pub fn is_abstract(&self) -> bool {
        self.body.is_none()
    }

    /// Instance methods other than constructors dispatch dynamically
    pub fn is_virtual(&self) -> bool {
        !self.is_static && !self.is_constructor
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub enclosing: TypeId,
    pub ty: Type,
    pub is_static: bool,
    pub is_final: bool,
    pub initializer: Option<NodeId>,
    pub span: Span,
    pub(crate) detached: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, enclosing: TypeId, ty: Type) -> Self {
        Field {
            name: name.into(),
            enclosing,
            ty,
            is_static: false,
            is_final: false,
            initializer: None,
            span: Span::dummy(),
            detached: false,
        }
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }
}

/// A parameter, local variable or synthesized temporary
#[derive(Debug, Clone, PartialEq)]
pub struct Local {
    pub name: String,
    pub ty: Type,
    pub is_param: bool,
    pub owner: MethodId,
}
