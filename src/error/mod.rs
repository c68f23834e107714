//! Diagnostics: error/warning collection with source coordinates, severity,
//! stable codes, optional suggestion, and optional rendered source context
//! (spec §4.1, §7).

use std::collections::HashSet;
use std::ops::ControlFlow;

use thiserror::Error;

use crate::ast::Span;

/// Diagnostic category, each with a stable code (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Syntax,
    Lexical,
    Name,
    Type,
    Semantic,
    Internal,
}

impl Category {
    pub fn code(self) -> &'static str {
        match self {
            Category::Syntax => "E0001",
            Category::Lexical => "E0002",
            Category::Name => "E0003",
            Category::Type => "E0004",
            Category::Semantic | Category::Internal => "E0005",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::Syntax => "syntax error",
            Category::Lexical => "lexical error",
            Category::Name => "name error",
            Category::Type => "type error",
            Category::Semantic => "semantic error",
            Category::Internal => "internal error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A warning kind. Only a handful are implemented by the core passes; the
/// remaining codes are reserved for forward use, matching the way the
/// taxonomy in spec §7 reserves `SemanticError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// W0001: code after a `return` in the same block can never execute.
    UnreachableAfterReturn,
    /// W0002: `while (0) { ... }` body is statically unreachable and will
    /// be elided by the MIR optimizer's unreachable-block pass.
    DeadLoopBody,
}

impl WarningKind {
    pub fn code(self) -> &'static str {
        match self {
            WarningKind::UnreachableAfterReturn => "W0001",
            WarningKind::DeadLoopBody => "W0002",
        }
    }
}

/// One error or warning, with everything needed to render spec §7's
/// user-visible format.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: &'static str,
    pub category_label: &'static str,
    pub message: String,
    pub span: Span,
    pub suggestion: Option<String>,
}

impl Diagnostic {
    pub fn error(category: Category, message: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Error,
            code: category.code(),
            category_label: category.label(),
            message: message.into(),
            span,
            suggestion: None,
        }
    }

    pub fn warning(kind: WarningKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Warning,
            code: kind.code(),
            category_label: "warning",
            message: message.into(),
            span,
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Render the plain-text layout spec §7 mandates, given the originating
    /// source text (used to produce the context line and column marker).
    pub fn render_plain(&self, source: &str) -> String {
        let mut out = format!(
            "{}: {}: {}\n  at line {}, column {}",
            self.code, self.category_label, self.message, self.span.line, self.span.column
        );
        if let Some(line) = source.lines().nth(self.span.line.saturating_sub(1) as usize) {
            let marker_col = self.span.column.saturating_sub(1) as usize;
            let marker = " ".repeat(marker_col) + "^";
            out.push_str(&format!("\n  context: {line}\n           {marker}"));
        }
        if let Some(s) = &self.suggestion {
            out.push_str(&format!("\n  suggestion: {s}"));
        }
        out
    }
}

/// Render with `ariadne` for terminal output with source highlighting.
pub fn report_ariadne(filename: &str, source: &str, diag: &Diagnostic) {
    use ariadne::{Color, Label, Report, ReportKind};

    let kind = match diag.severity {
        Severity::Error => ReportKind::Error,
        Severity::Warning => ReportKind::Warning,
    };
    let color = match diag.severity {
        Severity::Error => Color::Red,
        Severity::Warning => Color::Yellow,
    };
    let offset = line_col_to_byte_offset(source, diag.span);
    let range = offset..(offset + 1).max(offset);
    Report::build(kind, (filename, range.clone()))
        .with_message(format!("{}: {}", diag.code, diag.message))
        .with_label(Label::new((filename, range)).with_message(&diag.message).with_color(color))
        .finish()
        .eprint((filename, ariadne::Source::from(source)))
        .ok();
}

fn line_col_to_byte_offset(source: &str, span: Span) -> usize {
    let mut offset = 0usize;
    for (i, line) in source.split('\n').enumerate() {
        if (i as u32) + 1 == span.line {
            return offset + (span.column.saturating_sub(1) as usize).min(line.len());
        }
        offset += line.len() + 1;
    }
    offset
}

/// Configuration for a `DiagnosticSink` (spec §4.1: immediate vs. collect
/// mode, max errors, warnings-as-errors, suppression).
#[derive(Debug, Clone)]
pub struct DiagnosticConfig {
    pub mode: Mode,
    pub warnings_as_errors: bool,
    pub suppress: HashSet<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// The first error aborts the current phase.
    Immediate,
    /// Accumulate up to `cap` errors before aborting.
    Collect { cap: usize },
}

impl Default for DiagnosticConfig {
    fn default() -> Self {
        Self { mode: Mode::Collect { cap: 50 }, warnings_as_errors: false, suppress: HashSet::new() }
    }
}

impl DiagnosticConfig {
    pub fn immediate() -> Self {
        Self { mode: Mode::Immediate, ..Self::default() }
    }
}

/// Explicit diagnostics context threaded through each phase's entry point
/// (spec §9 "Global error state" design note), replacing the module-level
/// counters of the original program.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    pub config: DiagnosticConfig,
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
    warning_count: usize,
}

impl DiagnosticSink {
    pub fn new(config: DiagnosticConfig) -> Self {
        Self { config, diagnostics: Vec::new(), error_count: 0, warning_count: 0 }
    }

    /// Record a diagnostic. Returns `ControlFlow::Break` when the caller
    /// must stop processing the current phase (immediate mode on the first
    /// error, or collect mode once the cap is reached).
    pub fn emit(&mut self, mut diag: Diagnostic) -> ControlFlow<()> {
        if diag.severity == Severity::Warning {
            if self.config.suppress.contains(diag.code) {
                return ControlFlow::Continue(());
            }
            if self.config.warnings_as_errors {
                diag.severity = Severity::Error;
                diag.category_label = "error (promoted from warning)";
            }
        }

        match diag.severity {
            Severity::Error => {
                self.error_count += 1;
                self.diagnostics.push(diag);
                match self.config.mode {
                    Mode::Immediate => ControlFlow::Break(()),
                    Mode::Collect { cap } if self.error_count >= cap => ControlFlow::Break(()),
                    Mode::Collect { .. } => ControlFlow::Continue(()),
                }
            }
            Severity::Warning => {
                self.warning_count += 1;
                self.diagnostics.push(diag);
                ControlFlow::Continue(())
            }
        }
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn summary(&self) -> String {
        if self.error_count == 0 {
            "compilation successful".to_string()
        } else {
            format!(
                "compilation failed with {} error(s), {} warning(s)",
                self.error_count, self.warning_count
            )
        }
    }
}

/// Fatal, non-diagnostic failures: IO and genuine internal invariant
/// violations (the latter also appear as `E0005` diagnostics when caught
/// inside a pass, but an uncaught one propagates as this error instead).
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("{}", .0.summary())]
    Diagnostics(DiagnosticSummary),
}

/// A cheap, cloneable snapshot of a sink's outcome, used when the full
/// `DiagnosticSink` can't be moved into an error value.
#[derive(Debug, Clone)]
pub struct DiagnosticSummary {
    pub message: String,
}

impl DiagnosticSummary {
    pub fn summary(&self) -> &str {
        &self.message
    }
}

pub type Result<T> = std::result::Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immediate_mode_breaks_on_first_error() {
        let mut sink = DiagnosticSink::new(DiagnosticConfig::immediate());
        let flow = sink.emit(Diagnostic::error(Category::Name, "undeclared", Span::new(1, 1)));
        assert!(matches!(flow, ControlFlow::Break(())));
        assert!(sink.has_errors());
    }

    #[test]
    fn collect_mode_accumulates_until_cap() {
        let mut sink = DiagnosticSink::new(DiagnosticConfig { mode: Mode::Collect { cap: 2 }, ..Default::default() });
        assert!(matches!(
            sink.emit(Diagnostic::error(Category::Syntax, "a", Span::new(1, 1))),
            ControlFlow::Continue(())
        ));
        assert!(matches!(
            sink.emit(Diagnostic::error(Category::Syntax, "b", Span::new(1, 1))),
            ControlFlow::Break(())
        ));
        assert_eq!(sink.diagnostics().len(), 2);
    }

    #[test]
    fn suppressed_warning_is_dropped() {
        let mut config = DiagnosticConfig::default();
        config.suppress.insert("W0001");
        let mut sink = DiagnosticSink::new(config);
        sink.emit(Diagnostic::warning(WarningKind::UnreachableAfterReturn, "dead code", Span::new(2, 1)));
        assert_eq!(sink.diagnostics().len(), 0);
    }

    #[test]
    fn warnings_as_errors_promotes_severity() {
        let mut config = DiagnosticConfig::default();
        config.warnings_as_errors = true;
        let mut sink = DiagnosticSink::new(config);
        sink.emit(Diagnostic::warning(WarningKind::DeadLoopBody, "dead", Span::new(1, 1)));
        assert!(sink.has_errors());
    }

    #[test]
    fn summary_text_matches_spec_format() {
        let sink = DiagnosticSink::new(DiagnosticConfig::default());
        assert_eq!(sink.summary(), "compilation successful");
    }
}
