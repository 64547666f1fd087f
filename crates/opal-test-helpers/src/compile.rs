//! Loading and optimizing interchange programs in tests
//!
//! Panics with the collected diagnostics when a fixture fails to load, so
//! a broken fixture points at its own problem.

use crate::fixtures::RUNTIME;
use opal_core::ast::Program;
use opal_core::config::{OptimizationLevel, OptimizerOptions};
use opal_core::diagnostics::{CollectingDiagnosticHandler, DiagnosticHandler};
use opal_core::frontend::{load_program, ProgramDecl};
use opal_core::optimizer::{OptimizationReport, Optimizer};
use std::sync::Arc;

/// Parse a YAML fixture
pub fn parse(yaml: &str) -> ProgramDecl {
    match ProgramDecl::from_yaml_str(yaml) {
        Ok(decl) => decl,
        Err(e) => panic!("fixture does not parse: {}", e),
    }
}

/// Parse a YAML fixture and append the runtime support types
pub fn parse_with_runtime(yaml: &str) -> ProgramDecl {
    let mut decl = parse(yaml);
    decl.types.extend(parse(RUNTIME).types);
    decl
}

pub fn load_decl(decl: &ProgramDecl) -> Program {
    let handler = CollectingDiagnosticHandler::new();
    match load_program(decl, &handler) {
        Ok(program) => program,
        Err(e) => panic!("{}: {:#?}", e, handler.get_diagnostics()),
    }
}

pub fn load(yaml: &str) -> Program {
    load_decl(&parse(yaml))
}

pub fn load_with_runtime(yaml: &str) -> Program {
    load_decl(&parse_with_runtime(yaml))
}

/// Options with consistency checks on, whatever the build profile
pub fn options(level: OptimizationLevel) -> OptimizerOptions {
    OptimizerOptions {
        level,
        verify_after_each_pass: true,
        ..OptimizerOptions::default()
    }
}

/// Run the optimizer and fail the test on an internal error
pub fn optimize_with(program: &mut Program, options: OptimizerOptions) -> OptimizationReport {
    let handler = Arc::new(CollectingDiagnosticHandler::new());
    let mut optimizer = Optimizer::new(options, handler);
    match optimizer.optimize(program) {
        Ok(report) => report,
        Err(e) => panic!("optimizer failed: {}", e),
    }
}

/// Load a fixture with the runtime and optimize it at `level`
pub fn optimize(yaml: &str, level: OptimizationLevel) -> (Program, OptimizationReport) {
    let mut program = load_with_runtime(yaml);
    let report = optimize_with(&mut program, options(level));
    (program, report)
}
