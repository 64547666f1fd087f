//! Lowers 64-bit integer operations to calls into the `LongLib` runtime.
//!
//! Runs after [`CompoundAssignmentNormalizer`](super::CompoundAssignmentNormalizer),
//! so a long operand only ever meets a plain operator or `=`. Assignments and
//! literals are left as they are; the runtime represents a long as an opaque
//! value that can be stored and copied.

use crate::ast::{BinaryOp, LongLibrary, MethodId, NodeId, NodeKind, Program, Type, UnaryOp, WellKnownSymbols};
use crate::config::OptimizationLevel;
use crate::errors::InternalError;
use crate::ice;
use crate::optimizer::{OptimizationPass, OptimizerContext, OptimizerStats};
use crate::traversal::{run_tracked, ChangeTrackingVisitor, Context, Scope, Tracking};
use tracing::trace;

pub struct LongEmulation {
    symbols: WellKnownSymbols,
}

impl LongEmulation {
    pub fn new(symbols: WellKnownSymbols) -> Self {
        LongEmulation { symbols }
    }
}

impl OptimizationPass for LongEmulation {
    fn name(&self) -> &'static str {
        "long-emulation"
    }

    fn min_level(&self) -> OptimizationLevel {
        OptimizationLevel::O0
    }

    fn run(
        &mut self,
        program: &mut Program,
        ctx: &mut dyn OptimizerContext,
    ) -> Result<OptimizerStats, InternalError> {
        let mut visitor = Emulator {
            symbols: &self.symbols,
        };
        let outcome = run_tracked(program, ctx, &mut visitor, Scope::Program)?;
        Ok(OptimizerStats::from_outcome(self.name(), &outcome))
    }
}

struct Emulator<'s> {
    symbols: &'s WellKnownSymbols,
}

/// A runtime call replacing one node
struct Lowered {
    method: MethodId,
    args: Vec<NodeId>,
    ty: Type,
}

impl Emulator<'_> {
    fn lower(&self, program: &Program, node: NodeId) -> Result<Option<Lowered>, InternalError> {
        let lowered = match program.kind(node) {
            NodeKind::Binary { op, lhs, rhs } => {
                let (op, lhs, rhs) = (*op, *lhs, *rhs);
                if !program.ty(lhs).is_long() {
                    return Ok(None);
                }
                if op.is_compound_assignment() {
                    return Err(ice!(
                        "compound assignment '{}' on a long survived normalization",
                        op.symbol()
                    ));
                }
                if op == BinaryOp::Assign {
                    return Ok(None);
                }
                if op.is_comparison() && !program.ty(rhs).is_long() {
                    return Err(ice!(
                        "long compared with {}",
                        program.type_name(program.ty(rhs))
                    ));
                }
                let lib = self.symbols.require_long_library()?;
                let (method, ty) = binary_entry(lib, op)?;
                Lowered {
                    method,
                    args: vec![lhs, rhs],
                    ty,
                }
            }
            NodeKind::Unary { op, operand } => {
                let (op, operand) = (*op, *operand);
                if !program.ty(operand).is_long() {
                    return Ok(None);
                }
                let lib = self.symbols.require_long_library()?;
                let method = match op {
                    UnaryOp::Neg => lib.neg,
                    UnaryOp::BitNot => lib.not,
                    other => {
                        return Err(ice!("unexpected '{}' on a long operand", other.symbol()));
                    }
                };
                Lowered {
                    method,
                    args: vec![operand],
                    ty: Type::Long,
                }
            }
            NodeKind::Cast { target, expr } => {
                let from = program.ty(*expr);
                let (method, ty) = match (from, target) {
                    (Type::Int, Type::Long) => (self.symbols.require_long_library()?.from_int, Type::Long),
                    (Type::Double, Type::Long) => {
                        (self.symbols.require_long_library()?.from_double, Type::Long)
                    }
                    (Type::Long, Type::Int) => (self.symbols.require_long_library()?.to_int, Type::Int),
                    (Type::Long, Type::Double) => {
                        (self.symbols.require_long_library()?.to_double, Type::Double)
                    }
                    _ => return Ok(None),
                };
                Lowered {
                    method,
                    args: vec![*expr],
                    ty,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(lowered))
    }
}

fn binary_entry(lib: &LongLibrary, op: BinaryOp) -> Result<(MethodId, Type), InternalError> {
    use BinaryOp::*;
    let arithmetic = match op {
        Add => lib.add,
        Sub => lib.sub,
        Mul => lib.mul,
        Div => lib.div,
        Rem => lib.rem,
        BitAnd => lib.and,
        BitOr => lib.or,
        BitXor => lib.xor,
        Shl => lib.shl,
        Shr => lib.shr,
        Shru => lib.shru,
        Eq => return Ok((lib.eq, Type::Boolean)),
        Ne => return Ok((lib.ne, Type::Boolean)),
        Lt => return Ok((lib.lt, Type::Boolean)),
        Le => return Ok((lib.le, Type::Boolean)),
        Gt => return Ok((lib.gt, Type::Boolean)),
        Ge => return Ok((lib.ge, Type::Boolean)),
        other => return Err(ice!("no long lowering for '{}'", other.symbol())),
    };
    Ok((arithmetic, Type::Long))
}

impl ChangeTrackingVisitor for Emulator<'_> {
    fn exit(
        &mut self,
        _cx: &mut Tracking<'_>,
        program: &mut Program,
        node: NodeId,
        ctx: &mut Context,
    ) -> Result<(), InternalError> {
        if let NodeKind::Unary { op, operand } = program.kind(node) {
            if op.is_modifying() && program.ty(*operand).is_long() {
                return Err(ice!("'{}' on a long survived normalization", op.symbol()));
            }
        }
        let Some(lowered) = self.lower(program, node)? else {
            return Ok(());
        };
        trace!(
            "lowering long operation to {}",
            program.qualified_method_name(lowered.method)
        );
        let span = program.node(node).span;
        let call = program.call(None, lowered.method, lowered.args);
        let replacement = program.node_mut(call);
        replacement.ty = lowered.ty;
        replacement.span = span;
        ctx.replace_me(call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{DeclaredType, Method, TypeId, TypeKind};
    use crate::optimizer::{consistency, FullOptimizerContext};
    use crate::span::Span;

    const ENTRIES: [(&str, Type); 23] = [
        ("add", Type::Long),
        ("sub", Type::Long),
        ("mul", Type::Long),
        ("div", Type::Long),
        ("rem", Type::Long),
        ("neg", Type::Long),
        ("not", Type::Long),
        ("and", Type::Long),
        ("or", Type::Long),
        ("xor", Type::Long),
        ("shl", Type::Long),
        ("shr", Type::Long),
        ("shru", Type::Long),
        ("eq", Type::Boolean),
        ("ne", Type::Boolean),
        ("lt", Type::Boolean),
        ("le", Type::Boolean),
        ("gt", Type::Boolean),
        ("ge", Type::Boolean),
        ("fromInt", Type::Long),
        ("fromDouble", Type::Long),
        ("toInt", Type::Int),
        ("toDouble", Type::Double),
    ];

    fn with_runtime() -> (Program, TypeId) {
        let mut program = Program::new();
        let mut lib = DeclaredType::new("LongLib", TypeKind::Class);
        lib.is_library = true;
        let lib = program.add_type(lib);
        for (name, ret) in ENTRIES {
            let mut method = Method::new(name, lib, ret);
            method.is_static = true;
            method.body = Some(program.block(Vec::new()));
            let method = program.add_method(lib, method);
            program.index_method(format!("LongLib.{}", name), method);
        }
        let main = program.add_type(DeclaredType::new("Main", TypeKind::Class));
        (program, main)
    }

    /// `static <ret> main() { return <value>; }`
    fn returning(program: &mut Program, owner: TypeId, value: NodeId) -> MethodId {
        let ret = program.add_node(NodeKind::Return(Some(value)), Type::Void, Span::dummy());
        let body = program.block(vec![ret]);
        let mut method = Method::new("main", owner, program.ty(value).clone());
        method.is_static = true;
        method.body = Some(body);
        program.add_method(owner, method)
    }

    fn returned(program: &Program, method: MethodId) -> NodeId {
        let body = program.method(method).body.unwrap();
        match program.kind(program.kind(body).children()[0]) {
            NodeKind::Return(Some(value)) => *value,
            other => panic!("expected a return, found {:?}", other),
        }
    }

    fn run(program: &mut Program) -> OptimizerStats {
        let symbols = WellKnownSymbols::resolve(program);
        let mut ctx = FullOptimizerContext::new(program);
        let stats = LongEmulation::new(symbols).run(program, &mut ctx).unwrap();
        consistency::verify(program, &ctx).unwrap();
        stats
    }

    fn callee(program: &Program, node: NodeId) -> String {
        match program.kind(node) {
            NodeKind::MethodCall { method, .. } => program.qualified_method_name(*method),
            other => panic!("expected a runtime call, found {:?}", other),
        }
    }

    #[test]
    fn test_nested_arithmetic_is_lowered_inside_out() {
        let (mut program, main) = with_runtime();
        // (1L + 2L) * 3L
        let one = program.long_literal(1);
        let two = program.long_literal(2);
        let sum = program.binary(BinaryOp::Add, one, two, Type::Long);
        let three = program.long_literal(3);
        let product = program.binary(BinaryOp::Mul, sum, three, Type::Long);
        let m = returning(&mut program, main, product);

        let stats = run(&mut program);
        assert_eq!(stats.num_mods, 2);
        let outer = returned(&program, m);
        assert_eq!(callee(&program, outer), "LongLib.mul");
        let NodeKind::MethodCall { args, .. } = program.kind(outer) else {
            unreachable!()
        };
        assert_eq!(callee(&program, args[0]), "LongLib.add");
        assert_eq!(args[1], three);
        assert_eq!(program.ty(outer), &Type::Long);
    }

    #[test]
    fn test_comparison_is_boolean_and_shift_count_stays_int() {
        let (mut program, main) = with_runtime();
        let value = program.long_literal(8);
        let count = program.int_literal(2);
        let shifted = program.binary(BinaryOp::Shl, value, count, Type::Long);
        let limit = program.long_literal(100);
        let less = program.binary(BinaryOp::Lt, shifted, limit, Type::Boolean);
        let m = returning(&mut program, main, less);

        run(&mut program);
        let compare = returned(&program, m);
        assert_eq!(callee(&program, compare), "LongLib.lt");
        assert_eq!(program.ty(compare), &Type::Boolean);
        let NodeKind::MethodCall { args, .. } = program.kind(compare) else {
            unreachable!()
        };
        let NodeKind::MethodCall { args: shift_args, .. } = program.kind(args[0]) else {
            panic!("shift not lowered");
        };
        assert_eq!(shift_args[1], count);
        assert_eq!(program.ty(count), &Type::Int);
    }

    #[test]
    fn test_conversions_and_unary_operators() {
        let (mut program, main) = with_runtime();
        let seven = program.int_literal(7);
        let widen = program.add_node(
            NodeKind::Cast {
                target: Type::Long,
                expr: seven,
            },
            Type::Long,
            Span::dummy(),
        );
        let negated = program.unary(UnaryOp::Neg, widen, Type::Long);
        let narrow = program.add_node(
            NodeKind::Cast {
                target: Type::Int,
                expr: negated,
            },
            Type::Int,
            Span::dummy(),
        );
        let m = returning(&mut program, main, narrow);

        assert_eq!(run(&mut program).num_mods, 3);
        let to_int = returned(&program, m);
        assert_eq!(callee(&program, to_int), "LongLib.toInt");
        assert_eq!(program.ty(to_int), &Type::Int);
        let NodeKind::MethodCall { args, .. } = program.kind(to_int) else {
            unreachable!()
        };
        assert_eq!(callee(&program, args[0]), "LongLib.neg");
    }

    #[test]
    fn test_int_arithmetic_and_long_assignment_untouched() {
        let (mut program, main) = with_runtime();
        let a = program.int_literal(1);
        let b = program.int_literal(2);
        let sum = program.binary(BinaryOp::Add, a, b, Type::Int);
        returning(&mut program, main, sum);
        assert!(!run(&mut program).did_change());
    }

    #[test]
    fn test_missing_runtime_is_internal_error() {
        let mut program = Program::new();
        let main = program.add_type(DeclaredType::new("Main", TypeKind::Class));
        let a = program.long_literal(1);
        let b = program.long_literal(2);
        let sum = program.binary(BinaryOp::Add, a, b, Type::Long);
        returning(&mut program, main, sum);

        let mut ctx = FullOptimizerContext::new(&program);
        let err = LongEmulation::new(WellKnownSymbols::resolve(&program))
            .run(&mut program, &mut ctx)
            .unwrap_err();
        assert!(err.to_string().contains("LongLib"));
    }

    #[test]
    fn test_leftover_compound_assignment_is_rejected() {
        let (mut program, main) = with_runtime();
        let mut method = Method::new("f", main, Type::Void);
        method.is_static = true;
        let method_body = program.block(Vec::new());
        method.body = Some(method_body);
        let f = program.add_method(main, method);
        let x = program.add_local(f, "x", Type::Long);
        let decl = program.local_decl(x, None);
        let target = program.local_ref(x);
        let one = program.long_literal(1);
        let compound = program.binary(BinaryOp::AssignAdd, target, one, Type::Long);
        let stmt = program.expr_stmt(compound);
        program.insert_statement(method_body, 0, decl).unwrap();
        program.insert_statement(method_body, 1, stmt).unwrap();

        let symbols = WellKnownSymbols::resolve(&program);
        let mut ctx = FullOptimizerContext::new(&program);
        assert!(LongEmulation::new(symbols).run(&mut program, &mut ctx).is_err());
    }
}
