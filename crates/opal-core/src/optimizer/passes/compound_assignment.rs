//! Splits `long` compound assignments and increments into plain
//! assignments so long emulation only sees `=` and binary operators.
//!
//! `a op= b` becomes `a = a op b`, `++a` becomes `a = a + 1L`, and a
//! postfix increment whose value is used becomes `($t = a, a = $t + 1L, $t)`.
//! Receivers and indices with side effects are evaluated once into
//! temporaries declared in front of the enclosing statement.

use crate::ast::{BinaryOp, LocalId, MethodId, NodeId, NodeKind, Program, Type, UnaryOp};
use crate::config::OptimizationLevel;
use crate::errors::InternalError;
use crate::ice;
use crate::optimizer::{OptimizationPass, OptimizerContext, OptimizerStats};
use crate::span::Span;
use crate::traversal::{run_tracked, ChangeTrackingVisitor, Context, Scope, Tracking};

#[derive(Debug, Default)]
pub struct CompoundAssignmentNormalizer {
    _private: (),
}

impl CompoundAssignmentNormalizer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OptimizationPass for CompoundAssignmentNormalizer {
    fn name(&self) -> &'static str {
        "compound-assignment-normalizer"
    }

    fn min_level(&self) -> OptimizationLevel {
        OptimizationLevel::O0
    }

    fn run(
        &mut self,
        program: &mut Program,
        ctx: &mut dyn OptimizerContext,
    ) -> Result<OptimizerStats, InternalError> {
        let mut visitor = Normalizer { next_temp: 0 };
        let outcome = run_tracked(program, ctx, &mut visitor, Scope::Program)?;
        Ok(OptimizerStats::from_outcome(self.name(), &outcome))
    }
}

struct Normalizer {
    /// Reset per method so temporaries are numbered from `$t0`
    next_temp: usize,
}

enum Rewrite {
    /// `lhs op= rhs`, with `op` already stripped of its assignment
    Compound(BinaryOp, NodeId, NodeId),
    /// Increment or decrement
    Step(UnaryOp, NodeId),
}

/// An lvalue taken apart so it can be both read and written while its
/// sub-expressions run once
struct Split {
    prelude: Vec<NodeId>,
    target: NodeId,
    read: NodeId,
}

impl ChangeTrackingVisitor for Normalizer {
    fn enter_method(
        &mut self,
        _cx: &mut Tracking<'_>,
        _program: &mut Program,
        _method: MethodId,
    ) -> Result<bool, InternalError> {
        self.next_temp = 0;
        Ok(true)
    }

    fn exit(
        &mut self,
        cx: &mut Tracking<'_>,
        program: &mut Program,
        node: NodeId,
        ctx: &mut Context,
    ) -> Result<(), InternalError> {
        let rewrite = match program.kind(node) {
            NodeKind::Binary { op, lhs, rhs } => match op.without_assignment() {
                Some(arith) if program.ty(*lhs).is_long() => Rewrite::Compound(arith, *lhs, *rhs),
                _ => return Ok(()),
            },
            NodeKind::Unary { op, operand }
                if op.is_modifying() && program.ty(*operand).is_long() =>
            {
                Rewrite::Step(*op, *operand)
            }
            _ => return Ok(()),
        };
        let replacement = match rewrite {
            Rewrite::Compound(arith, lhs, rhs) => {
                let split = self.split_lvalue(cx, program, ctx, lhs)?;
                let value = program.binary(arith, split.read, rhs, Type::Long);
                let store = program.assign(split.target, value);
                sequence(program, split.prelude, store)
            }
            Rewrite::Step(op, operand) => {
                let arith = match op {
                    UnaryOp::PreInc | UnaryOp::PostInc => BinaryOp::Add,
                    _ => BinaryOp::Sub,
                };
                let split = self.split_lvalue(cx, program, ctx, operand)?;
                let one = program.long_literal(1);
                if op.is_postfix() && value_is_used(program, ctx) {
                    let old = self.temp(cx, program, ctx, Type::Long)?;
                    let old_ref = program.local_ref(old);
                    let save = program.assign(old_ref, split.read);
                    let old_ref = program.local_ref(old);
                    let value = program.binary(arith, old_ref, one, Type::Long);
                    let store = program.assign(split.target, value);
                    let result = program.local_ref(old);
                    let mut exprs = split.prelude;
                    exprs.extend([save, store, result]);
                    program.multi(exprs)
                } else {
                    let value = program.binary(arith, split.read, one, Type::Long);
                    let store = program.assign(split.target, value);
                    sequence(program, split.prelude, store)
                }
            }
        };
        let span = program.node(node).span;
        program.node_mut(replacement).span = span;
        ctx.replace_me(replacement)
    }
}

impl Normalizer {
    fn split_lvalue(
        &mut self,
        cx: &mut Tracking<'_>,
        program: &mut Program,
        ctx: &mut Context,
        lvalue: NodeId,
    ) -> Result<Split, InternalError> {
        let ty = program.ty(lvalue).clone();
        let kind = program.kind(lvalue).clone();
        match kind {
            NodeKind::LocalRef(_) | NodeKind::FieldRef { instance: None, .. } => Ok(Split {
                prelude: Vec::new(),
                target: lvalue,
                read: program.clone_subtree(lvalue),
            }),
            NodeKind::FieldRef {
                instance: Some(instance),
                field,
            } => {
                let (prelude, first, second) = self.stash(cx, program, ctx, instance)?;
                Ok(Split {
                    prelude,
                    target: program.field_ref(Some(first), field),
                    read: program.field_ref(Some(second), field),
                })
            }
            NodeKind::ArrayRef { array, index } => {
                let (mut prelude, array_a, array_b) = self.stash(cx, program, ctx, array)?;
                let (index_prelude, index_a, index_b) = self.stash(cx, program, ctx, index)?;
                prelude.extend(index_prelude);
                let target = program.add_node(
                    NodeKind::ArrayRef {
                        array: array_a,
                        index: index_a,
                    },
                    ty.clone(),
                    Span::dummy(),
                );
                let read = program.add_node(
                    NodeKind::ArrayRef {
                        array: array_b,
                        index: index_b,
                    },
                    ty,
                    Span::dummy(),
                );
                Ok(Split {
                    prelude,
                    target,
                    read,
                })
            }
            other => Err(ice!("{:?} is not assignable", other)),
        }
    }

    /// Two uses of `expr` that evaluate it once. Pure expressions are
    /// copied; others are saved in a temporary first.
    fn stash(
        &mut self,
        cx: &mut Tracking<'_>,
        program: &mut Program,
        ctx: &mut Context,
        expr: NodeId,
    ) -> Result<(Vec<NodeId>, NodeId, NodeId), InternalError> {
        if !program.has_side_effects(expr) {
            let copy = program.clone_subtree(expr);
            return Ok((Vec::new(), expr, copy));
        }
        let ty = program.ty(expr).clone();
        let temp = self.temp(cx, program, ctx, ty)?;
        let temp_ref = program.local_ref(temp);
        let save = program.assign(temp_ref, expr);
        let first = program.local_ref(temp);
        let second = program.local_ref(temp);
        Ok((vec![save], first, second))
    }

    fn temp(
        &mut self,
        cx: &mut Tracking<'_>,
        program: &mut Program,
        ctx: &mut Context,
        ty: Type,
    ) -> Result<LocalId, InternalError> {
        let method = cx
            .current_method()
            .ok_or_else(|| ice!("cannot introduce a temporary outside a method body"))?;
        let name = format!("$t{}", self.next_temp);
        self.next_temp += 1;
        let local = program.add_local(method, name, ty);
        let decl = program.local_decl(local, None);
        ctx.insert_before(decl)?;
        Ok(local)
    }
}

fn sequence(program: &mut Program, mut prelude: Vec<NodeId>, last: NodeId) -> NodeId {
    if prelude.is_empty() {
        return last;
    }
    prelude.push(last);
    program.multi(prelude)
}

/// An increment directly under an expression statement or in a `for`
/// update list is evaluated only for its effect
fn value_is_used(program: &Program, ctx: &Context) -> bool {
    match ctx.parent() {
        Some(parent) => !matches!(
            program.kind(parent),
            NodeKind::ExprStmt(_) | NodeKind::For { .. }
        ),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{DeclaredType, Field, Method, TypeKind};
    use crate::optimizer::{consistency, FullOptimizerContext};

    struct Fixture {
        program: Program,
        method: MethodId,
        body: NodeId,
    }

    fn fixture() -> Fixture {
        let mut program = Program::new();
        let ty = program.add_type(DeclaredType::new("Main", TypeKind::Class));
        let body = program.block(Vec::new());
        let mut method = Method::new("main", ty, Type::Void);
        method.is_static = true;
        method.body = Some(body);
        let method = program.add_method(ty, method);
        Fixture {
            program,
            method,
            body,
        }
    }

    fn push(f: &mut Fixture, expr: NodeId) -> NodeId {
        let stmt = f.program.expr_stmt(expr);
        let end = f.program.kind(f.body).children().len();
        f.program.insert_statement(f.body, end, stmt).unwrap();
        stmt
    }

    fn run(f: &mut Fixture) -> OptimizerStats {
        let mut ctx = FullOptimizerContext::new(&f.program);
        let stats = CompoundAssignmentNormalizer::new()
            .run(&mut f.program, &mut ctx)
            .unwrap();
        consistency::verify(&f.program, &ctx).unwrap();
        stats
    }

    #[test]
    fn test_compound_on_local_becomes_plain_assignment() {
        let mut f = fixture();
        let x = f.program.add_local(f.method, "x", Type::Long);
        let decl = f.program.local_decl(x, None);
        f.program.insert_statement(f.body, 0, decl).unwrap();
        let lhs = f.program.local_ref(x);
        let rhs = f.program.long_literal(2);
        let compound = f.program.binary(BinaryOp::AssignMul, lhs, rhs, Type::Long);
        let stmt = push(&mut f, compound);

        assert_eq!(run(&mut f).num_mods, 1);
        let NodeKind::ExprStmt(expr) = *f.program.kind(stmt) else {
            panic!("statement replaced");
        };
        let NodeKind::Binary { op: BinaryOp::Assign, lhs: target, rhs: value } = *f.program.kind(expr) else {
            panic!("expected an assignment");
        };
        assert_eq!(target, lhs);
        assert!(matches!(
            f.program.kind(value),
            NodeKind::Binary { op: BinaryOp::Mul, rhs: r, .. } if *r == rhs
        ));
    }

    #[test]
    fn test_int_compound_is_left_alone() {
        let mut f = fixture();
        let x = f.program.add_local(f.method, "i", Type::Int);
        let lhs = f.program.local_ref(x);
        let rhs = f.program.int_literal(1);
        let compound = f.program.binary(BinaryOp::AssignAdd, lhs, rhs, Type::Int);
        let decl = f.program.local_decl(x, None);
        f.program.insert_statement(f.body, 0, decl).unwrap();
        push(&mut f, compound);
        assert!(!run(&mut f).did_change());
    }

    #[test]
    fn test_side_effecting_receiver_gets_temporary() {
        let mut f = fixture();
        let owner = f.program.method(f.method).enclosing;
        let total = f.program.add_field(owner, Field::new("total", owner, Type::Long));
        let mut make = Method::new("make", owner, Type::Class(owner));
        make.is_static = true;
        make.body = Some(f.program.block(Vec::new()));
        let make = f.program.add_method(owner, make);

        // make().total += 1L
        let receiver = f.program.call(None, make, Vec::new());
        let lhs = f.program.field_ref(Some(receiver), total);
        let rhs = f.program.long_literal(1);
        let compound = f.program.binary(BinaryOp::AssignAdd, lhs, rhs, Type::Long);
        push(&mut f, compound);

        run(&mut f);
        let statements = f.program.kind(f.body).children();
        assert_eq!(statements.len(), 2);
        let NodeKind::LocalDecl { local, init: None } = *f.program.kind(statements[0]) else {
            panic!("expected the temporary's declaration first");
        };
        assert_eq!(f.program.local(local).name, "$t0");
        let NodeKind::ExprStmt(expr) = *f.program.kind(statements[1]) else {
            panic!("expected the rewritten statement");
        };
        assert!(matches!(f.program.kind(expr), NodeKind::Multi(exprs) if exprs.len() == 2));
        // make() is still called exactly once
        let calls = f
            .program
            .preorder(f.body)
            .filter(|n| matches!(f.program.kind(*n), NodeKind::MethodCall { .. }))
            .count();
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_postfix_increment_in_expression_keeps_old_value() {
        let mut f = fixture();
        let x = f.program.add_local(f.method, "x", Type::Long);
        let y = f.program.add_local(f.method, "y", Type::Long);
        let x_decl = f.program.local_decl(x, None);
        f.program.insert_statement(f.body, 0, x_decl).unwrap();
        let operand = f.program.local_ref(x);
        let inc = f.program.unary(UnaryOp::PostInc, operand, Type::Long);
        let y_decl = f.program.local_decl(y, Some(inc));
        f.program.insert_statement(f.body, 1, y_decl).unwrap();

        run(&mut f);
        let NodeKind::LocalDecl { init: Some(init), .. } = *f.program.kind(y_decl) else {
            panic!("declaration lost its initializer");
        };
        let NodeKind::Multi(exprs) = f.program.kind(init) else {
            panic!("expected a comma expression");
        };
        assert_eq!(exprs.len(), 3);
        assert!(matches!(f.program.kind(exprs[2]), NodeKind::LocalRef(_)));
        // x, $t0 declaration, y
        assert_eq!(f.program.kind(f.body).children().len(), 3);
    }

    #[test]
    fn test_statement_increment_needs_no_temporary() {
        let mut f = fixture();
        let x = f.program.add_local(f.method, "x", Type::Long);
        let x_decl = f.program.local_decl(x, None);
        f.program.insert_statement(f.body, 0, x_decl).unwrap();
        let operand = f.program.local_ref(x);
        let inc = f.program.unary(UnaryOp::PostInc, operand, Type::Long);
        let stmt = push(&mut f, inc);

        run(&mut f);
        assert_eq!(f.program.kind(f.body).children().len(), 2);
        let NodeKind::ExprStmt(expr) = *f.program.kind(stmt) else {
            panic!("statement replaced");
        };
        assert!(matches!(
            f.program.kind(expr),
            NodeKind::Binary { op: BinaryOp::Assign, .. }
        ));
    }
}
