//! Output formatting.

use crate::cli::OutputFormat;
use camino::{Utf8Path, Utf8PathBuf};
use miette::{Diagnostic, GraphicalReportHandler, GraphicalTheme, NamedSource, SourceSpan};
use serde::Serialize;
use std::fs;
use sugar_compiler::{CompileError, ErrorKind, Location};
use thiserror::Error;

/// A template that failed to compile.
#[derive(Debug)]
pub struct TemplateFailure {
    /// Logical path of the template being compiled.
    pub path: Utf8PathBuf,
    /// The error, possibly located in a layout or component.
    pub error: CompileError,
}

/// A formatted error for JSON output.
#[derive(Debug, Serialize)]
pub struct FormattedError {
    /// The error kind (`Syntax`, `ComponentNotFound`, ...).
    pub kind: &'static str,
    /// The template being compiled.
    pub template: String,
    /// The file the error points into.
    pub filename: String,
    /// 1-indexed line number.
    pub line: Option<u32>,
    /// 1-indexed column number.
    pub column: Option<u32>,
    /// The message, without location.
    pub message: String,
}

/// A snippet report rendered by miette.
#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(sugar::compile))]
struct SnippetReport {
    message: String,
    #[source_code]
    src: NamedSource<String>,
    #[label("here")]
    span: SourceSpan,
}

fn kind_name(kind: &ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Syntax { .. } => "Syntax",
        ErrorKind::ComponentNotFound { .. } => "ComponentNotFound",
        ErrorKind::TemplateNotFound { .. } => "TemplateNotFound",
        ErrorKind::UnknownDirective { .. } => "UnknownDirective",
        ErrorKind::CircularInheritance { .. } => "CircularInheritance",
        ErrorKind::CompiledOutputParse { .. } => "CompiledOutputParse",
        ErrorKind::Io { .. } => "Io",
    }
}

/// Formats compile failures for output.
pub struct Formatter {
    format: OutputFormat,
    root: Option<Utf8PathBuf>,
}

impl Formatter {
    /// Creates a new formatter.
    pub fn new(format: OutputFormat) -> Self {
        Self { format, root: None }
    }

    /// Sets the template root used to load full sources for snippets.
    pub fn with_root(mut self, root: impl Into<Utf8PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Formats a collection of failures.
    pub fn format(&self, failures: &[TemplateFailure]) -> String {
        match self.format {
            OutputFormat::Human => failures.iter().map(|f| self.format_human(f)).collect(),
            OutputFormat::HumanVerbose => failures
                .iter()
                .map(|f| self.format_human_verbose(f))
                .collect(),
            OutputFormat::Json => self.format_json(failures),
        }
    }

    /// Formats as human-readable output.
    fn format_human(&self, failure: &TemplateFailure) -> String {
        let header = match &failure.error.location {
            Some(location) => format!(
                "{}:{}:{}",
                location.template, location.line, location.column
            ),
            None => failure.path.to_string(),
        };
        format!("{}\nError: {}\n\n", header, failure.error.message())
    }

    /// Formats with a miette snippet when the error has a location.
    fn format_human_verbose(&self, failure: &TemplateFailure) -> String {
        let Some(location) = &failure.error.location else {
            return self.format_human(failure);
        };

        let report = self.snippet_report(failure.error.message(), location);
        let mut output = String::new();
        let handler = GraphicalReportHandler::new_themed(GraphicalTheme::unicode_nocolor());
        if handler.render_report(&mut output, &report).is_err() {
            return self.format_human(failure);
        }
        if failure.path != location.template {
            output.push_str(&format!("  (while compiling {})\n", failure.path));
        }
        output.push('\n');
        output
    }

    /// Builds a report over the full template when it can be read, else
    /// over the single snippet line.
    fn snippet_report(&self, message: String, location: &Location) -> SnippetReport {
        let full = self
            .root
            .as_deref()
            .and_then(|root| fs::read_to_string(root.join(&location.template)).ok())
            .filter(|text| location.span.as_range().end <= text.len());

        let (text, span) = match full {
            Some(text) => {
                let range = location.span.as_range();
                (text, SourceSpan::from((range.start, range.len())))
            }
            None => {
                let snippet = location.snippet.clone();
                let start = column_offset(&snippet, location.column);
                let len = location
                    .span
                    .as_range()
                    .len()
                    .min(snippet.len().saturating_sub(start));
                (snippet, SourceSpan::from((start, len)))
            }
        };

        SnippetReport {
            message,
            src: NamedSource::new(location.template.as_str(), text),
            span,
        }
    }

    /// Formats as JSON output.
    fn format_json(&self, failures: &[TemplateFailure]) -> String {
        let formatted = Self::format_json_errors(failures);
        serde_json::to_string_pretty(&formatted).unwrap_or_default()
    }

    /// Formats failures into JSON-ready structs.
    pub fn format_json_errors(failures: &[TemplateFailure]) -> Vec<FormattedError> {
        failures
            .iter()
            .map(|failure| {
                let location = failure.error.location.as_ref();
                FormattedError {
                    kind: kind_name(&failure.error.kind),
                    template: failure.path.to_string(),
                    filename: location
                        .map(|l| l.template.to_string())
                        .unwrap_or_else(|| failure.path.to_string()),
                    line: location.map(|l| l.line),
                    column: location.map(|l| l.column),
                    message: failure.error.message(),
                }
            })
            .collect()
    }
}

/// Byte offset of a 1-based character column.
fn column_offset(line: &str, column: u32) -> usize {
    let index = column.saturating_sub(1) as usize;
    line.char_indices()
        .nth(index)
        .map(|(offset, _)| offset)
        .unwrap_or(line.len())
}

/// Summary of a compile run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CompileSummary {
    /// Number of templates considered.
    pub file_count: usize,
    /// Number compiled in this run.
    pub compiled_count: usize,
    /// Number skipped because the cache was fresh.
    pub cached_count: usize,
    /// Number of failures.
    pub error_count: usize,
}

impl CompileSummary {
    /// Formats the summary line.
    pub fn format(&self, out_dir: &Utf8Path) -> String {
        let error_word = if self.error_count == 1 {
            "error"
        } else {
            "errors"
        };
        let file_word = if self.file_count == 1 {
            "template"
        } else {
            "templates"
        };

        format!(
            "====================================\nsugar compiled {} of {} {} ({} cached) into {} with {} {}",
            self.compiled_count,
            self.file_count,
            file_word,
            self.cached_count,
            out_dir,
            self.error_count,
            error_word
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use sugar_compiler::{Compiler, MemoryTemplateLoader};

    const PAGE: &str = "<main>\n  <div s:if=\"$a\" s:foreach=\"$b\"></div>\n</main>";

    fn failure(path: &str, source: &str) -> TemplateFailure {
        let loader = MemoryTemplateLoader::new().with_template(path, source);
        let error = Compiler::new(Arc::new(loader))
            .compile(path)
            .expect_err("template should fail");
        TemplateFailure {
            path: path.into(),
            error,
        }
    }

    #[test]
    fn test_format_human() {
        let formatter = Formatter::new(OutputFormat::Human);
        let output = formatter.format(&[failure("pages/home.sugar.php", PAGE)]);
        assert_eq!(
            output,
            "pages/home.sugar.php:2:18\n\
             Error: Only one control flow directive allowed per element\n\n"
        );
    }

    #[test]
    fn test_format_human_without_location() {
        let failure = TemplateFailure {
            path: "pages/gone.sugar.php".into(),
            error: CompileError::syntax("boom"),
        };
        let output = Formatter::new(OutputFormat::Human).format(&[failure]);
        assert_eq!(output, "pages/gone.sugar.php\nError: boom\n\n");
    }

    #[test]
    fn test_format_human_verbose_snippet() {
        let formatter = Formatter::new(OutputFormat::HumanVerbose);
        let output = formatter.format(&[failure("pages/home.sugar.php", PAGE)]);
        assert!(output.contains("Only one control flow directive allowed per element"));
        assert!(output.contains("<div s:if=\"$a\" s:foreach=\"$b\"></div>"));
        assert!(output.contains("pages/home.sugar.php"));
    }

    #[test]
    fn test_format_json() {
        let failures = [failure("pages/home.sugar.php", "<s-bdge></s-bdge>")];
        let errors = Formatter::format_json_errors(&failures);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, "ComponentNotFound");
        assert_eq!(errors[0].filename, "pages/home.sugar.php");
        assert_eq!(errors[0].line, Some(1));

        let output = Formatter::new(OutputFormat::Json).format(&failures);
        assert!(output.contains("\"template\": \"pages/home.sugar.php\""));
    }

    #[test]
    fn test_column_offset() {
        assert_eq!(column_offset("abc", 1), 0);
        assert_eq!(column_offset("été x", 3), 4);
        assert_eq!(column_offset("ab", 9), 2);
    }

    #[test]
    fn test_summary() {
        let summary = CompileSummary {
            file_count: 5,
            compiled_count: 3,
            cached_count: 1,
            error_count: 1,
        };

        let output = summary.format(Utf8Path::new(".sugar-cache"));
        assert!(output.contains("compiled 3 of 5 templates (1 cached)"));
        assert!(output.ends_with("into .sugar-cache with 1 error"));
    }
}
