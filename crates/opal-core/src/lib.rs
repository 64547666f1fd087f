pub mod ast;
pub mod config;
pub mod di;
pub mod diagnostics;
pub mod errors;
pub mod frontend;
pub mod optimizer;
pub mod printer;
pub mod span;
pub mod traversal;

pub use ast::Program;
pub use config::{CliOverrides, CompilerConfig, OptimizationLevel, OptimizerOptions};
pub use di::Container;
pub use diagnostics::{
    CollectingDiagnosticHandler, ConsoleDiagnosticHandler, Diagnostic, DiagnosticHandler,
    DiagnosticLevel,
};
pub use errors::{CompilationError, InternalError};
pub use frontend::{load_program, ProgramDecl};
pub use optimizer::{OptimizationReport, Optimizer};
pub use printer::print_program;
