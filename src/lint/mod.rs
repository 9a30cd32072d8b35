//! Source validation and the report printed for it.

pub mod html;
pub mod js;

use std::fmt::Write;

use camino::Utf8PathBuf;
use console::Style;
use thiserror::Error;

const STYLE_FILE: Style = Style::new().underlined();
const STYLE_ERROR: Style = Style::new().red();
const STYLE_WARNING: Style = Style::new().yellow();
const STYLE_DIM: Style = Style::new().dim();
const STYLE_SUMMARY: Style = Style::new().bold();

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    /// Path relative to the project root.
    pub file: Utf8PathBuf,
    pub line: usize,
    pub column: usize,
    pub rule: &'static str,
    pub message: String,
    pub severity: Severity,
}

/// Whether error findings fail the step that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    Report,
    Fail,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Validation failed with {errors} error(s) in {files} file(s)")]
pub struct LintError {
    pub errors: usize,
    pub files: usize,
}

#[derive(Debug, Default)]
pub struct Report {
    findings: Vec<Finding>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, findings: impl IntoIterator<Item = Finding>) {
        self.findings.extend(findings);
    }

    pub fn errors(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warnings(&self) -> usize {
        self.count(Severity::Warning)
    }

    fn count(&self, severity: Severity) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == severity)
            .count()
    }

    /// Formats findings grouped by file, followed by a summary line.
    pub fn render(&self) -> String {
        let mut findings: Vec<&Finding> = self.findings.iter().collect();
        findings.sort_by(|a, b| (&a.file, a.line, a.column).cmp(&(&b.file, b.line, b.column)));

        let mut out = String::new();
        let mut current: Option<&Utf8PathBuf> = None;

        for finding in findings {
            if current != Some(&finding.file) {
                if current.is_some() {
                    out.push('\n');
                }
                let _ = writeln!(out, "{}", STYLE_FILE.apply_to(&finding.file));
                current = Some(&finding.file);
            }

            let severity = match finding.severity {
                Severity::Error => STYLE_ERROR.apply_to("error"),
                Severity::Warning => STYLE_WARNING.apply_to("warning"),
            };

            let _ = writeln!(
                out,
                "  {}  {severity}  {}  {}",
                STYLE_DIM.apply_to(format!("{}:{}", finding.line, finding.column)),
                finding.message,
                STYLE_DIM.apply_to(finding.rule),
            );
        }

        if !self.findings.is_empty() {
            let _ = writeln!(
                out,
                "\n{}",
                STYLE_SUMMARY.apply_to(format!(
                    "{} problem(s) ({} error(s), {} warning(s))",
                    self.findings.len(),
                    self.errors(),
                    self.warnings()
                ))
            );
        }

        out
    }

    /// Writes the report to stderr, clearing progress bars while it does.
    pub fn print(&self) {
        if !self.findings.is_empty() {
            let rendered = self.render();
            tracing_indicatif::suspend_tracing_indicatif(|| eprint!("{rendered}"));
        }
    }

    /// Fails when strict and at least one error was found.
    pub fn enforce(&self, strictness: Strictness) -> Result<(), LintError> {
        let errors = self.errors();

        if strictness == Strictness::Report || errors == 0 {
            return Ok(());
        }

        let mut files: Vec<&Utf8PathBuf> = self
            .findings
            .iter()
            .filter(|f| f.severity == Severity::Error)
            .map(|f| &f.file)
            .collect();
        files.sort();
        files.dedup();

        Err(LintError {
            errors,
            files: files.len(),
        })
    }
}
