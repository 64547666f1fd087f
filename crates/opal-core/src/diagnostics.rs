use crate::span::Span;
use std::fmt;
use std::sync::Mutex;

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Error,
    Warning,
}

impl DiagnosticLevel {
    fn as_str(self) -> &'static str {
        match self {
            DiagnosticLevel::Error => "error",
            DiagnosticLevel::Warning => "warning",
        }
    }
}

/// A user-facing diagnostic with location and severity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub span: Span,
    pub message: String,
}

impl Diagnostic {
    pub fn error(span: Span, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            span,
            message: message.into(),
        }
    }

    pub fn warning(span: Span, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Warning,
            span,
            message: message.into(),
        }
    }

    /// Diagnostics without a source line sort after located ones
    fn location_key(&self) -> (bool, u32, u32) {
        (self.span.is_dummy(), self.span.line, self.span.column)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.span.is_dummy() {
            write!(f, "{}: {}", self.level.as_str(), self.message)
        } else {
            write!(f, "{} at {}: {}", self.level.as_str(), self.span, self.message)
        }
    }
}

/// Trait for handling diagnostics
/// This allows for dependency injection and testing with mock handlers
pub trait DiagnosticHandler: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);

    fn error(&self, span: Span, message: &str) {
        self.report(Diagnostic::error(span, message));
    }

    fn warning(&self, span: Span, message: &str) {
        self.report(Diagnostic::warning(span, message));
    }

    /// Emit everything reported since the last flush as one batch
    fn flush(&self) {}

    fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    fn error_count(&self) -> usize;
    fn warning_count(&self) -> usize;
    fn get_diagnostics(&self) -> Vec<Diagnostic>;
}

#[derive(Debug, Default)]
struct Reported {
    diagnostics: Vec<Diagnostic>,
    /// Diagnostics before this index were already printed
    printed: usize,
}

impl Reported {
    fn count(&self, level: DiagnosticLevel) -> usize {
        self.diagnostics.iter().filter(|d| d.level == level).count()
    }
}

fn lock(reported: &Mutex<Reported>) -> std::sync::MutexGuard<'_, Reported> {
    // A poisoned lock only means another reporter panicked mid-push
    reported
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Console handler. Reports are buffered and printed to stderr on
/// [`DiagnosticHandler::flush`], ordered by source location.
pub struct ConsoleDiagnosticHandler {
    reported: Mutex<Reported>,
    pretty: bool,
}

impl ConsoleDiagnosticHandler {
    pub fn new(pretty: bool) -> Self {
        Self {
            reported: Mutex::new(Reported::default()),
            pretty,
        }
    }

    /// Render the unprinted diagnostics and mark them printed
    fn take_batch(&self) -> String {
        let mut reported = lock(&self.reported);
        let pending = &reported.diagnostics[reported.printed..];
        let mut batch: Vec<&Diagnostic> = pending.iter().collect();
        batch.sort_by_key(|d| d.location_key());

        let mut out = String::new();
        for diagnostic in batch {
            if !self.pretty {
                out.push_str(&format!("{}\n", diagnostic));
                continue;
            }
            let color = match diagnostic.level {
                DiagnosticLevel::Error => "\x1b[1;31m",
                DiagnosticLevel::Warning => "\x1b[1;33m",
            };
            out.push_str(&format!("{}{}\x1b[0m", color, diagnostic.level.as_str()));
            if !diagnostic.span.is_dummy() {
                out.push_str(&format!(" at {}", diagnostic.span));
            }
            out.push_str(&format!(": {}\n", diagnostic.message));
        }
        reported.printed = reported.diagnostics.len();
        out
    }
}

impl DiagnosticHandler for ConsoleDiagnosticHandler {
    fn report(&self, diagnostic: Diagnostic) {
        lock(&self.reported).diagnostics.push(diagnostic);
    }

    fn flush(&self) {
        let batch = self.take_batch();
        if !batch.is_empty() {
            eprint!("{}", batch);
        }
    }

    fn error_count(&self) -> usize {
        lock(&self.reported).count(DiagnosticLevel::Error)
    }

    fn warning_count(&self) -> usize {
        lock(&self.reported).count(DiagnosticLevel::Warning)
    }

    fn get_diagnostics(&self) -> Vec<Diagnostic> {
        lock(&self.reported).diagnostics.clone()
    }
}

/// Collecting diagnostic handler for testing
/// Collects all diagnostics without printing
#[derive(Default)]
pub struct CollectingDiagnosticHandler {
    reported: Mutex<Reported>,
}

impl CollectingDiagnosticHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DiagnosticHandler for CollectingDiagnosticHandler {
    fn report(&self, diagnostic: Diagnostic) {
        lock(&self.reported).diagnostics.push(diagnostic);
    }

    fn error_count(&self) -> usize {
        lock(&self.reported).count(DiagnosticLevel::Error)
    }

    fn warning_count(&self) -> usize {
        lock(&self.reported).count(DiagnosticLevel::Warning)
    }

    fn get_diagnostics(&self) -> Vec<Diagnostic> {
        lock(&self.reported).diagnostics.clone()
    }
}
