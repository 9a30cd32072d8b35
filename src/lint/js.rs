use camino::Utf8Path;
use swc_ecma_ast::{DebuggerStmt, WithStmt};
use swc_ecma_visit::{Visit, VisitWith};

use super::{Finding, Severity};
use crate::js::{Diagnostic, Script};

/// Lints a script: syntax errors are errors, `debugger` and `with`
/// statements are warnings.
pub fn lint(file: &Utf8Path, code: &str) -> Vec<Finding> {
    let syntax = |d: Diagnostic| Finding {
        file: file.to_path_buf(),
        line: d.line,
        column: d.column,
        rule: "syntax",
        message: d.message,
        severity: Severity::Error,
    };

    let (script, recovered) = match Script::parse(file.as_str(), code) {
        Ok(parsed) => parsed,
        Err(diagnostic) => return vec![syntax(diagnostic)],
    };

    let mut visitor = Statements {
        file,
        script: &script,
        findings: recovered.into_iter().map(syntax).collect(),
    };
    script.program().visit_with(&mut visitor);

    visitor.findings
}

struct Statements<'a> {
    file: &'a Utf8Path,
    script: &'a Script,
    findings: Vec<Finding>,
}

impl Statements<'_> {
    fn warn(&mut self, span: swc_common::Span, rule: &'static str, message: &str) {
        let (line, column) = self.script.position(span);
        self.findings.push(Finding {
            file: self.file.to_path_buf(),
            line,
            column,
            rule,
            message: message.to_owned(),
            severity: Severity::Warning,
        });
    }
}

impl Visit for Statements<'_> {
    fn visit_debugger_stmt(&mut self, node: &DebuggerStmt) {
        self.warn(node.span, "no-debugger", "Unexpected 'debugger' statement.");
    }

    fn visit_with_stmt(&mut self, node: &WithStmt) {
        self.warn(node.span, "no-with", "Don't use 'with'.");
        node.visit_children_with(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_script() {
        let code = "angular.module('app', []);\nfunction f(a) { return a + 1; }\n";
        assert!(lint(Utf8Path::new("app/app.js"), code).is_empty());
    }

    #[test]
    fn test_debugger_is_warning() {
        let code = "function f() {\n  debugger;\n}\n";
        let findings = lint(Utf8Path::new("app/f.js"), code);

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule, "no-debugger");
        assert_eq!(findings[0].severity, Severity::Warning);
        assert_eq!((findings[0].line, findings[0].column), (2, 3));
    }

    #[test]
    fn test_syntax_error_is_error() {
        let findings = lint(Utf8Path::new("app/bad.js"), "var x = {;\n");

        assert!(!findings.is_empty());
        assert!(findings.iter().all(|f| f.severity == Severity::Error));
        assert_eq!(findings[0].file, "app/bad.js");
    }
}
