//! End-to-end tests: interchange program in, optimized program out
//!
//! Every run here verifies graph and tree consistency after each pass.

use opal_core::ast::{BinaryOp, NodeKind, Type};
use opal_core::config::{OptimizationLevel, OptimizerOptions};
use opal_core::diagnostics::{CollectingDiagnosticHandler, DiagnosticHandler};
use opal_core::frontend::load_program;
use opal_core::print_program;
use opal_core::CompilationError;
use opal_test_helpers::compile::{
    load_with_runtime, optimize, optimize_with, options, parse, parse_with_runtime,
};
use opal_test_helpers::fixtures::{CONTROL_FLOW, LONGS, SHAPES, STRINGS, UNRESOLVED};
use opal_test_helpers::lookup::{calls_to, count_nodes, find_method, method};

#[test]
fn test_interface_call_is_devirtualized_at_o3() {
    let (program, report) = optimize(SHAPES, OptimizationLevel::O3);

    assert!(report.converged);
    assert_eq!(report.stats.mods_for("devirtualizer"), 1);
    let area = method(&program, "Square.area");
    let bound = count_nodes(&program, |kind| {
        matches!(kind, NodeKind::MethodCall { method, static_dispatch: true, .. } if *method == area)
    });
    assert_eq!(bound, 1);
    assert!(program.method(area).is_final);
}

#[test]
fn test_unreachable_members_are_pruned() {
    let (program, _) = optimize(SHAPES, OptimizationLevel::O3);

    assert!(find_method(&program, "Square.describe").is_none());
    // Nothing calls through the interface once the call is bound
    assert!(find_method(&program, "Shape.area").is_none());
    assert!(find_method(&program, "Main.main").is_some());
    // Runtime entry points are roots
    assert!(find_method(&program, "LongLib.add").is_some());
    assert!(find_method(&program, "StringLib.equals").is_some());
}

#[test]
fn test_o1_keeps_virtual_calls_but_elides_upcasts() {
    let (program, report) = optimize(SHAPES, OptimizationLevel::O1);

    assert_eq!(report.stats.mods_for("devirtualizer"), 0);
    assert_eq!(calls_to(&program, "Shape.area"), 1);
    assert_eq!(count_nodes(&program, |k| matches!(k, NodeKind::Cast { .. })), 0);
}

#[test]
fn test_longs_are_lowered_to_runtime_calls() {
    let (program, report) = optimize(LONGS, OptimizationLevel::O1);

    assert!(report.stats.mods_for("long-emulation") > 0);
    assert_eq!(calls_to(&program, "LongLib.mul"), 1);
    // `total += x` and `x++`
    assert!(calls_to(&program, "LongLib.add") >= 2);

    let main = method(&program, "Main.main");
    let body = program.method(main).body.unwrap();
    for node in program.preorder(body) {
        match program.kind(node) {
            NodeKind::Binary { op, .. } => {
                assert!(
                    *op == BinaryOp::Assign || program.ty(node) != &Type::Long,
                    "long operator {:?} survived",
                    op
                );
                assert!(!op.is_compound_assignment());
            }
            NodeKind::Unary { op, .. } => {
                assert!(program.ty(node) != &Type::Long, "long unary {:?} survived", op);
            }
            _ => {}
        }
    }
}

#[test]
fn test_longs_are_kept_without_emulation() {
    let mut program = load_with_runtime(LONGS);
    let report = optimize_with(
        &mut program,
        OptimizerOptions {
            emulate_longs: false,
            ..options(OptimizationLevel::O1)
        },
    );

    assert_eq!(report.stats.mods_for("long-emulation"), 0);
    assert_eq!(calls_to(&program, "LongLib.mul"), 0);
    let compound = count_nodes(&program, |k| {
        matches!(k, NodeKind::Binary { op, .. } if op.is_compound_assignment())
    });
    assert_eq!(compound, 1);
}

#[test]
fn test_string_comparison_uses_runtime_equals() {
    let (program, report) = optimize(STRINGS, OptimizationLevel::O2);

    assert_eq!(report.stats.mods_for("equality-normalizer"), 1);
    assert_eq!(calls_to(&program, "StringLib.equals"), 1);
    // `a == null` is still a reference comparison
    let reference_eq = count_nodes(&program, |k| {
        matches!(k, NodeKind::Binary { op: BinaryOp::Eq, .. })
    });
    assert_eq!(reference_eq, 1);
}

#[test]
fn test_assertions_removed_unless_enabled() {
    let is_assert = |k: &NodeKind| matches!(k, NodeKind::Assert { .. });

    let (program, report) = optimize(CONTROL_FLOW, OptimizationLevel::O0);
    assert_eq!(report.stats.mods_for("assertion-remover"), 1);
    assert_eq!(count_nodes(&program, is_assert), 0);

    let mut program = load_with_runtime(CONTROL_FLOW);
    optimize_with(
        &mut program,
        OptimizerOptions {
            enable_assertions: true,
            ..options(OptimizationLevel::O0)
        },
    );
    assert_eq!(count_nodes(&program, is_assert), 1);
}

#[test]
fn test_incremental_and_full_runs_agree() {
    for fixture in [SHAPES, LONGS, STRINGS, CONTROL_FLOW] {
        for level in [OptimizationLevel::O1, OptimizationLevel::O3] {
            let mut incremental = load_with_runtime(fixture);
            optimize_with(&mut incremental, options(level));

            let mut full = load_with_runtime(fixture);
            optimize_with(
                &mut full,
                OptimizerOptions {
                    incremental: false,
                    ..options(level)
                },
            );

            assert_eq!(print_program(&incremental), print_program(&full));
        }
    }
}

#[test]
fn test_second_optimization_finds_nothing() {
    let mut program = load_with_runtime(SHAPES);
    optimize_with(&mut program, options(OptimizationLevel::O3));
    let before = print_program(&program);

    let report = optimize_with(&mut program, options(OptimizationLevel::O3));
    assert_eq!(report.iterations, 1);
    assert_eq!(report.total_mods(), 0);
    assert_eq!(print_program(&program), before);
}

#[test]
fn test_iteration_budget_is_reported() {
    let mut program = load_with_runtime(SHAPES);
    let handler = std::sync::Arc::new(CollectingDiagnosticHandler::new());
    let mut optimizer = opal_core::Optimizer::new(
        OptimizerOptions {
            max_iterations: 1,
            ..options(OptimizationLevel::O3)
        },
        handler.clone(),
    );

    let report = optimizer.optimize(&mut program).unwrap();
    assert_eq!(report.iterations, 1);
    assert!(!report.converged);
    assert_eq!(handler.warning_count(), 1);
}

#[test]
fn test_long_program_without_runtime_is_an_internal_error() {
    let handler = CollectingDiagnosticHandler::new();
    let mut program = load_program(&parse(LONGS), &handler).unwrap();
    let mut optimizer = opal_core::Optimizer::new(
        options(OptimizationLevel::O0),
        std::sync::Arc::new(CollectingDiagnosticHandler::new()),
    );

    let err = optimizer.optimize(&mut program).unwrap_err();
    let CompilationError::Internal(ice) = err else {
        panic!("expected an internal error, got {}", err);
    };
    assert!(ice.to_string().contains("LongLib"));
}

#[test]
fn test_unresolved_names_fail_loading() {
    let handler = CollectingDiagnosticHandler::new();
    let err = load_program(&parse_with_runtime(UNRESOLVED), &handler).unwrap_err();

    assert!(matches!(err, CompilationError::Semantic { errors: 2 }));
    assert_eq!(handler.error_count(), 2);
}
