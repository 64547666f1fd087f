use std::fmt;
use thiserror::Error;

/// Internal compiler error.
///
/// Raised when an invariant of the tree or of the dependency context is
/// violated. It always indicates a defect in a pass, never a problem in the
/// user's program, and it aborts the current compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalError {
    message: String,
    /// Innermost frame first, e.g. "while visiting method A.foo"
    context: Vec<String>,
}

impl InternalError {
    pub fn new(message: impl Into<String>) -> Self {
        InternalError {
            message: message.into(),
            context: Vec::new(),
        }
    }

    /// Attach an enclosing frame to the error as it propagates outwards
    pub fn with_context(mut self, frame: impl Into<String>) -> Self {
        self.context.push(frame.into());
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &[String] {
        &self.context
    }
}

impl fmt::Display for InternalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "internal compiler error: {}", self.message)?;
        for frame in &self.context {
            write!(f, "\n  {}", frame)?;
        }
        Ok(())
    }
}

impl std::error::Error for InternalError {}

/// Build an [`InternalError`] with `format!` syntax
#[macro_export]
macro_rules! ice {
    ($($arg:tt)*) => {
        $crate::errors::InternalError::new(format!($($arg)*))
    };
}

/// Top-level failure of a compilation
#[derive(Debug, Error)]
pub enum CompilationError {
    #[error(transparent)]
    Internal(#[from] InternalError),

    #[error("compilation stopped after {errors} error(s)")]
    Semantic { errors: usize },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Failed to load program: {0}")]
    Load(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompilationError {
    pub fn is_internal(&self) -> bool {
        matches!(self, CompilationError::Internal(_))
    }
}
