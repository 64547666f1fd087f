use super::{FieldId, LocalId, MethodId, NodeId, Type, TypeId};
use crate::errors::InternalError;
use crate::ice;
use crate::span::Span;

/// A single tree node. Children are referenced by handle; a node never
/// knows its parent.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    /// Static type. Statements are `Type::Void`.
    pub ty: Type,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Shru,
    BitAnd,
    BitOr,
    BitXor,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Assign,
    AssignAdd,
    AssignSub,
    AssignMul,
    AssignDiv,
    AssignRem,
    AssignShl,
    AssignShr,
    AssignShru,
    AssignBitAnd,
    AssignBitOr,
    AssignBitXor,
}

impl BinaryOp {
    pub fn is_assignment(self) -> bool {
        self == BinaryOp::Assign || self.is_compound_assignment()
    }

    pub fn is_compound_assignment(self) -> bool {
        self.without_assignment().is_some()
    }

    /// `+=` becomes `+`; plain operators and `=` have no arithmetic part
    pub fn without_assignment(self) -> Option<BinaryOp> {
        use BinaryOp::*;
        Some(match self {
            AssignAdd => Add,
            AssignSub => Sub,
            AssignMul => Mul,
            AssignDiv => Div,
            AssignRem => Rem,
            AssignShl => Shl,
            AssignShr => Shr,
            AssignShru => Shru,
            AssignBitAnd => BitAnd,
            AssignBitOr => BitOr,
            AssignBitXor => BitXor,
            _ => return None,
        })
    }

    pub fn is_comparison(self) -> bool {
        use BinaryOp::*;
        matches!(self, Eq | Ne | Lt | Le | Gt | Ge)
    }

    pub fn is_shift(self) -> bool {
        matches!(self, BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Shru)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn symbol(self) -> &'static str {
        use BinaryOp::*;
        match self {
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Rem => "%",
            Shl => "<<",
            Shr => ">>",
            Shru => ">>>",
            BitAnd => "&",
            BitOr => "|",
            BitXor => "^",
            And => "&&",
            Or => "||",
            Eq => "==",
            Ne => "!=",
            Lt => "<",
            Le => "<=",
            Gt => ">",
            Ge => ">=",
            Assign => "=",
            AssignAdd => "+=",
            AssignSub => "-=",
            AssignMul => "*=",
            AssignDiv => "/=",
            AssignRem => "%=",
            AssignShl => "<<=",
            AssignShr => ">>=",
            AssignShru => ">>>=",
            AssignBitAnd => "&=",
            AssignBitOr => "|=",
            AssignBitXor => "^=",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<BinaryOp> {
        use BinaryOp::*;
        const ALL: [BinaryOp; 31] = [
            Add, Sub, Mul, Div, Rem, Shl, Shr, Shru, BitAnd, BitOr, BitXor, And, Or, Eq, Ne, Lt,
            Le, Gt, Ge, Assign, AssignAdd, AssignSub, AssignMul, AssignDiv, AssignRem, AssignShl,
            AssignShr, AssignShru, AssignBitAnd, AssignBitOr, AssignBitXor,
        ];
        ALL.into_iter().find(|op| op.symbol() == symbol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

impl UnaryOp {
    /// Increment and decrement write their operand
    pub fn is_modifying(self) -> bool {
        matches!(
            self,
            UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec
        )
    }

    pub fn is_postfix(self) -> bool {
        matches!(self, UnaryOp::PostInc | UnaryOp::PostDec)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
            UnaryOp::PreInc | UnaryOp::PostInc => "++",
            UnaryOp::PreDec | UnaryOp::PostDec => "--",
        }
    }
}

/// Body of a method implemented in the target language. The references
/// are resolved by the front end so dependency analysis can see through it.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeCode {
    pub code: String,
    pub method_refs: Vec<MethodId>,
    pub field_refs: Vec<FieldId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    // Statements
    Block(Vec<NodeId>),
    ExprStmt(NodeId),
    LocalDecl {
        local: LocalId,
        init: Option<NodeId>,
    },
    If {
        cond: NodeId,
        then_branch: NodeId,
        else_branch: Option<NodeId>,
    },
    While {
        cond: NodeId,
        body: NodeId,
    },
    For {
        init: Vec<NodeId>,
        cond: Option<NodeId>,
        update: Vec<NodeId>,
        body: NodeId,
    },
    Return(Option<NodeId>),
    Break,
    Continue,
    Throw(NodeId),
    Assert {
        cond: NodeId,
        message: Option<NodeId>,
    },
    Try {
        body: NodeId,
        /// Parallel to `catch_bodies`
        catch_locals: Vec<LocalId>,
        catch_bodies: Vec<NodeId>,
        finally: Option<NodeId>,
    },
    Empty,
    NativeBlock(NativeCode),

    // Expressions
    Literal(Literal),
    LocalRef(LocalId),
    FieldRef {
        instance: Option<NodeId>,
        field: FieldId,
    },
    This,
    MethodCall {
        instance: Option<NodeId>,
        method: MethodId,
        args: Vec<NodeId>,
        /// Set once the call no longer needs dynamic dispatch
        static_dispatch: bool,
    },
    New {
        class: TypeId,
        constructor: MethodId,
        args: Vec<NodeId>,
    },
    Binary {
        op: BinaryOp,
        lhs: NodeId,
        rhs: NodeId,
    },
    Unary {
        op: UnaryOp,
        operand: NodeId,
    },
    Conditional {
        cond: NodeId,
        then_expr: NodeId,
        else_expr: NodeId,
    },
    Cast {
        target: Type,
        expr: NodeId,
    },
    InstanceOf {
        expr: NodeId,
        test: Type,
    },
    ArrayRef {
        array: NodeId,
        index: NodeId,
    },
    ArrayLength(NodeId),
    /// Comma expression; the value is the last element
    Multi(Vec<NodeId>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Statement,
    Expression,
}

/// How a child slot may be edited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    /// Must always hold a node
    Required,
    /// May be cleared
    Optional,
    /// Element of a list whose length may change
    ListElement,
    /// Element of a list whose length is fixed (arguments, catch bodies)
    FixedElement,
}

impl Edge {
    pub fn is_removable(self) -> bool {
        matches!(self, Edge::Optional | Edge::ListElement)
    }
}

/// Static description of one child position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildSlot {
    pub category: Category,
    pub edge: Edge,
}

/// Result of removing a child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The list shrank; the following siblings shifted left
    Shifted,
    /// An optional field was cleared; positions are unchanged
    Cleared,
}

enum Field<'a> {
    One(NodeId),
    Opt(Option<NodeId>),
    List(&'a [NodeId]),
    Fixed(&'a [NodeId]),
}

enum FieldMut<'a> {
    One(&'a mut NodeId),
    Opt(&'a mut Option<NodeId>),
    List(&'a mut Vec<NodeId>),
    Fixed(&'a mut [NodeId]),
}

impl Field<'_> {
    /// Optional fields always occupy one position so indices stay stable
    /// when they are cleared.
    fn width(&self) -> usize {
        match self {
            Field::One(_) | Field::Opt(_) => 1,
            Field::List(items) | Field::Fixed(items) => items.len(),
        }
    }
}

impl FieldMut<'_> {
    fn width(&self) -> usize {
        match self {
            FieldMut::One(_) | FieldMut::Opt(_) => 1,
            FieldMut::List(items) => items.len(),
            FieldMut::Fixed(items) => items.len(),
        }
    }
}

use Category::{Expression as E, Statement as S};

impl NodeKind {
    pub fn category(&self) -> Category {
        match self {
            NodeKind::Block(_)
            | NodeKind::ExprStmt(_)
            | NodeKind::LocalDecl { .. }
            | NodeKind::If { .. }
            | NodeKind::While { .. }
            | NodeKind::For { .. }
            | NodeKind::Return(_)
            | NodeKind::Break
            | NodeKind::Continue
            | NodeKind::Throw(_)
            | NodeKind::Assert { .. }
            | NodeKind::Try { .. }
            | NodeKind::Empty
            | NodeKind::NativeBlock(_) => S,
            _ => E,
        }
    }

    pub fn is_statement(&self) -> bool {
        self.category() == S
    }

    pub fn is_expression(&self) -> bool {
        self.category() == E
    }

    pub fn is_block(&self) -> bool {
        matches!(self, NodeKind::Block(_))
    }

    fn fields(&self) -> Vec<(Category, Field<'_>)> {
        use NodeKind::*;
        match self {
            Block(stmts) => vec![(S, Field::List(stmts))],
            ExprStmt(expr) => vec![(E, Field::One(*expr))],
            LocalDecl { init, .. } => vec![(E, Field::Opt(*init))],
            If {
                cond,
                then_branch,
                else_branch,
            } => vec![
                (E, Field::One(*cond)),
                (S, Field::One(*then_branch)),
                (S, Field::Opt(*else_branch)),
            ],
            While { cond, body } => vec![(E, Field::One(*cond)), (S, Field::One(*body))],
            For {
                init,
                cond,
                update,
                body,
            } => vec![
                (S, Field::List(init)),
                (E, Field::Opt(*cond)),
                (E, Field::List(update)),
                (S, Field::One(*body)),
            ],
            Return(value) => vec![(E, Field::Opt(*value))],
            Throw(value) => vec![(E, Field::One(*value))],
            Assert { cond, message } => vec![(E, Field::One(*cond)), (E, Field::Opt(*message))],
            Try {
                body,
                catch_bodies,
                finally,
                ..
            } => vec![
                (S, Field::One(*body)),
                (S, Field::Fixed(catch_bodies)),
                (S, Field::Opt(*finally)),
            ],
            FieldRef { instance, .. } => vec![(E, Field::Opt(*instance))],
            MethodCall { instance, args, .. } => {
                vec![(E, Field::Opt(*instance)), (E, Field::Fixed(args))]
            }
            New { args, .. } => vec![(E, Field::Fixed(args))],
            Binary { lhs, rhs, .. } => vec![(E, Field::One(*lhs)), (E, Field::One(*rhs))],
            Unary { operand, .. } => vec![(E, Field::One(*operand))],
            Conditional {
                cond,
                then_expr,
                else_expr,
            } => vec![
                (E, Field::One(*cond)),
                (E, Field::One(*then_expr)),
                (E, Field::One(*else_expr)),
            ],
            Cast { expr, .. } | InstanceOf { expr, .. } | ArrayLength(expr) => {
                vec![(E, Field::One(*expr))]
            }
            ArrayRef { array, index } => vec![(E, Field::One(*array)), (E, Field::One(*index))],
            Multi(exprs) => vec![(E, Field::List(exprs))],
            Break | Continue | Empty | NativeBlock(_) | Literal(_) | LocalRef(_) | This => {
                Vec::new()
            }
        }
    }

    fn fields_mut(&mut self) -> Vec<(Category, FieldMut<'_>)> {
        use NodeKind::*;
        match self {
            Block(stmts) => vec![(S, FieldMut::List(stmts))],
            ExprStmt(expr) => vec![(E, FieldMut::One(expr))],
            LocalDecl { init, .. } => vec![(E, FieldMut::Opt(init))],
            If {
                cond,
                then_branch,
                else_branch,
            } => vec![
                (E, FieldMut::One(cond)),
                (S, FieldMut::One(then_branch)),
                (S, FieldMut::Opt(else_branch)),
            ],
            While { cond, body } => vec![(E, FieldMut::One(cond)), (S, FieldMut::One(body))],
            For {
                init,
                cond,
                update,
                body,
            } => vec![
                (S, FieldMut::List(init)),
                (E, FieldMut::Opt(cond)),
                (E, FieldMut::List(update)),
                (S, FieldMut::One(body)),
            ],
            Return(value) => vec![(E, FieldMut::Opt(value))],
            Throw(value) => vec![(E, FieldMut::One(value))],
            Assert { cond, message } => {
                vec![(E, FieldMut::One(cond)), (E, FieldMut::Opt(message))]
            }
            Try {
                body,
                catch_bodies,
                finally,
                ..
            } => vec![
                (S, FieldMut::One(body)),
                (S, FieldMut::Fixed(catch_bodies)),
                (S, FieldMut::Opt(finally)),
            ],
            FieldRef { instance, .. } => vec![(E, FieldMut::Opt(instance))],
            MethodCall { instance, args, .. } => {
                vec![(E, FieldMut::Opt(instance)), (E, FieldMut::Fixed(args))]
            }
            New { args, .. } => vec![(E, FieldMut::Fixed(args))],
            Binary { lhs, rhs, .. } => vec![(E, FieldMut::One(lhs)), (E, FieldMut::One(rhs))],
            Unary { operand, .. } => vec![(E, FieldMut::One(operand))],
            Conditional {
                cond,
                then_expr,
                else_expr,
            } => vec![
                (E, FieldMut::One(cond)),
                (E, FieldMut::One(then_expr)),
                (E, FieldMut::One(else_expr)),
            ],
            Cast { expr, .. } | InstanceOf { expr, .. } | ArrayLength(expr) => {
                vec![(E, FieldMut::One(expr))]
            }
            ArrayRef { array, index } => {
                vec![(E, FieldMut::One(array)), (E, FieldMut::One(index))]
            }
            Multi(exprs) => vec![(E, FieldMut::List(exprs))],
            Break | Continue | Empty | NativeBlock(_) | Literal(_) | LocalRef(_) | This => {
                Vec::new()
            }
        }
    }

    /// Present children in traversal order. Cleared optional slots are
    /// skipped.
    pub fn children(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        for (_, field) in self.fields() {
            match field {
                Field::One(id) => out.push(id),
                Field::Opt(id) => out.extend(id),
                Field::List(ids) | Field::Fixed(ids) => out.extend_from_slice(ids),
            }
        }
        out
    }

    /// Number of child positions, counting empty optional slots
    pub fn position_count(&self) -> usize {
        self.fields().iter().map(|(_, f)| f.width()).sum()
    }

    /// The node at a position (if the slot is filled) and its slot shape.
    /// `None` when the position does not exist.
    pub fn child_at(&self, position: usize) -> Option<(Option<NodeId>, ChildSlot)> {
        let mut offset = 0;
        for (category, field) in self.fields() {
            let width = field.width();
            if position < offset + width {
                let local = position - offset;
                return Some(match field {
                    Field::One(id) => (Some(id), slot(category, Edge::Required)),
                    Field::Opt(id) => (id, slot(category, Edge::Optional)),
                    Field::List(ids) => (Some(ids[local]), slot(category, Edge::ListElement)),
                    Field::Fixed(ids) => (Some(ids[local]), slot(category, Edge::FixedElement)),
                });
            }
            offset += width;
        }
        None
    }

    /// Position of a direct child, by identity
    pub fn position_of(&self, child: NodeId) -> Option<usize> {
        let mut offset = 0;
        for (_, field) in self.fields() {
            match field {
                Field::One(id) if id == child => return Some(offset),
                Field::Opt(Some(id)) if id == child => return Some(offset),
                Field::List(ids) | Field::Fixed(ids) => {
                    if let Some(i) = ids.iter().position(|id| *id == child) {
                        return Some(offset + i);
                    }
                }
                _ => {}
            }
            offset += field.width();
        }
        None
    }

    /// Overwrite the child at `position`, returning the previous occupant
    pub fn replace_child(
        &mut self,
        position: usize,
        new: NodeId,
    ) -> Result<Option<NodeId>, InternalError> {
        let mut offset = 0;
        for (_, field) in self.fields_mut() {
            let width = field.width();
            if position < offset + width {
                let local = position - offset;
                return Ok(match field {
                    FieldMut::One(id) => Some(std::mem::replace(id, new)),
                    FieldMut::Opt(id) => id.replace(new),
                    FieldMut::List(ids) => Some(std::mem::replace(&mut ids[local], new)),
                    FieldMut::Fixed(ids) => Some(std::mem::replace(&mut ids[local], new)),
                });
            }
            offset += width;
        }
        Err(ice!("no child at position {} to replace", position))
    }

    /// Remove the child at `position`. Required and fixed slots cannot be
    /// removed.
    pub fn remove_child(&mut self, position: usize) -> Result<Removal, InternalError> {
        let mut offset = 0;
        for (_, field) in self.fields_mut() {
            let width = field.width();
            if position < offset + width {
                let local = position - offset;
                return match field {
                    FieldMut::List(ids) => {
                        ids.remove(local);
                        Ok(Removal::Shifted)
                    }
                    FieldMut::Opt(id) => {
                        *id = None;
                        Ok(Removal::Cleared)
                    }
                    FieldMut::One(_) | FieldMut::Fixed(_) => {
                        Err(ice!("child at position {} is not removable", position))
                    }
                };
            }
            offset += width;
        }
        Err(ice!("no child at position {} to remove", position))
    }

    /// Insert into a list so the new node lands at `position`
    pub fn insert_child(&mut self, position: usize, new: NodeId) -> Result<(), InternalError> {
        let mut offset = 0;
        for (_, field) in self.fields_mut() {
            let width = field.width();
            if let FieldMut::List(ids) = field {
                // The end of a list is a valid insertion point
                if position <= offset + width {
                    ids.insert(position - offset, new);
                    return Ok(());
                }
            } else if position < offset + width {
                return Err(ice!("position {} is not inside a list", position));
            }
            offset += width;
        }
        Err(ice!("no list at position {} to insert into", position))
    }
}

fn slot(category: Category, edge: Edge) -> ChildSlot {
    ChildSlot { category, edge }
}

impl Node {
    pub fn new(kind: NodeKind, ty: Type, span: Span) -> Self {
        Node { kind, ty, span }
    }

    pub fn is_statement(&self) -> bool {
        self.kind.is_statement()
    }
}
