use crate::ast::Program;
use crate::config::CompilerConfig;
use crate::diagnostics::{ConsoleDiagnosticHandler, DiagnosticHandler};
use crate::errors::CompilationError;
use crate::frontend::{load_program, ProgramDecl};
use crate::optimizer::{OptimizationReport, Optimizer};
use std::path::Path;
use std::sync::Arc;

/// Dependency injection container
/// Manages all shared dependencies and creates instances with proper wiring
pub struct Container {
    config: Arc<CompilerConfig>,
    diagnostic_handler: Arc<dyn DiagnosticHandler>,
}

impl Container {
    /// Create a new container with production dependencies
    pub fn new(config: CompilerConfig) -> Self {
        let config = Arc::new(config);
        let diagnostic_handler = Arc::new(ConsoleDiagnosticHandler::new(config.pretty));

        Container {
            config,
            diagnostic_handler,
        }
    }

    /// Create a container with custom dependencies (for testing)
    pub fn with_dependencies(
        config: CompilerConfig,
        diagnostic_handler: Arc<dyn DiagnosticHandler>,
    ) -> Self {
        Container {
            config: Arc::new(config),
            diagnostic_handler,
        }
    }

    pub fn config(&self) -> &Arc<CompilerConfig> {
        &self.config
    }

    pub fn diagnostic_handler(&self) -> &Arc<dyn DiagnosticHandler> {
        &self.diagnostic_handler
    }

    /// An optimizer wired to the configured options and this container's
    /// diagnostic handler
    pub fn optimizer(&self) -> Optimizer {
        Optimizer::new(
            self.config.optimizer.clone(),
            Arc::clone(&self.diagnostic_handler),
        )
    }

    /// Lower an interchange program, reporting resolution errors through
    /// the container's handler
    pub fn load(&self, decl: &ProgramDecl) -> Result<Program, CompilationError> {
        load_program(decl, self.diagnostic_handler.as_ref())
    }

    pub fn load_file(&self, path: &Path) -> Result<Program, CompilationError> {
        let decl = ProgramDecl::from_file(path)?;
        self.load(&decl)
    }

    /// Load and optimize in one step
    pub fn compile_file(&self, path: &Path) -> Result<(Program, OptimizationReport), CompilationError> {
        let mut program = self.load_file(path)?;
        let report = self.optimizer().optimize(&mut program)?;
        Ok((program, report))
    }

    /// Check if any errors have been reported
    pub fn has_errors(&self) -> bool {
        self.diagnostic_handler.has_errors()
    }

    pub fn error_count(&self) -> usize {
        self.diagnostic_handler.error_count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostic_handler.warning_count()
    }
}
