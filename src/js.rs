//! Script parsing and minification on top of swc.

use std::string::FromUtf8Error;

use swc_common::source_map::SourceMapGenConfig;
use swc_common::{FileName, SourceMap, SourceMapper, Span, Spanned, sync::Lrc};
use swc_ecma_ast::{EsVersion, Program};
use swc_ecma_codegen::Config as CodegenConfig;
use swc_ecma_codegen::Emitter;
use swc_ecma_codegen::text_writer::{JsWriter, WriteJs};
use swc_ecma_parser::{Syntax, parse_file_as_program};
use thiserror::Error;

/// Errors that can occur when processing JavaScript files.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The source could not be parsed at all.
    #[error("Syntax error in '{file}' at {line}:{column}: {message}")]
    Syntax {
        file: String,
        line: usize,
        column: usize,
        message: String,
    },

    /// Code generation failed while writing the minified output.
    #[error("Couldn't emit '{file}'.\n{source}")]
    Emit {
        file: String,
        source: std::io::Error,
    },

    #[error("Emitted script is not valid UTF-8.\n{0}")]
    Utf8(#[from] FromUtf8Error),

    #[error("Couldn't encode the source map of '{file}'.\n{message}")]
    SourceMap { file: String, message: String },
}

/// A positioned parser message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

/// A parsed script together with the source map needed to locate spans.
pub struct Script {
    name: String,
    cm: Lrc<SourceMap>,
    program: Program,
}

impl Script {
    /// Parses `code` as a script or module, whichever it looks like.
    ///
    /// On success, also returns the errors the parser recovered from.
    pub fn parse(name: &str, code: &str) -> Result<(Self, Vec<Diagnostic>), Diagnostic> {
        let cm: Lrc<SourceMap> = Lrc::new(SourceMap::default());

        let mut recovered = Vec::new();
        let program = parse_into(&cm, name, code, &mut recovered)?;

        let script = Self {
            name: name.to_owned(),
            cm,
            program,
        };

        Ok((script, recovered))
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// One-based line and column of the start of `span`.
    pub fn position(&self, span: Span) -> (usize, usize) {
        let loc = self.cm.lookup_char_pos(span.lo);
        (loc.line, loc.col_display + 1)
    }

    /// Source text covered by `span`.
    pub fn snippet(&self, span: Span) -> Option<String> {
        self.cm.span_to_snippet(span).ok()
    }

    /// Re-emits the program without comments or insignificant whitespace.
    /// Identifiers are left alone, which keeps Angular's implicit injection
    /// working.
    pub fn minify(&self) -> Result<String, ScriptError> {
        let mut buf = Vec::new();

        {
            let writer = JsWriter::new(Lrc::clone(&self.cm), "\n", &mut buf, None);
            let mut emitter = Emitter {
                cfg: CodegenConfig::default().with_minify(true),
                cm: Lrc::clone(&self.cm),
                comments: None,
                wr: writer,
            };

            emitter
                .emit_program(&self.program)
                .map_err(|source| ScriptError::Emit {
                    file: self.name.clone(),
                    source,
                })?;
        }

        Ok(String::from_utf8(buf)?)
    }
}

/// Adds `code` to `cm` under `name` and parses it.
fn parse_into(
    cm: &Lrc<SourceMap>,
    name: &str,
    code: &str,
    recovered: &mut Vec<Diagnostic>,
) -> Result<Program, Diagnostic> {
    let file = cm.new_source_file(Lrc::new(FileName::Custom(name.to_owned())), code.to_owned());

    let mut errors = Vec::new();
    let program = parse_file_as_program(
        &file,
        Syntax::Es(Default::default()),
        EsVersion::EsNext,
        None,
        &mut errors,
    )
    .map_err(|e| locate(cm, e.span(), e.kind().msg().into_owned()))?;

    recovered.extend(
        errors
            .into_iter()
            .map(|e| locate(cm, e.span(), e.kind().msg().into_owned())),
    );

    Ok(program)
}

fn locate(cm: &SourceMap, span: Span, message: String) -> Diagnostic {
    let loc = cm.lookup_char_pos(span.lo);
    Diagnostic {
        line: loc.line,
        column: loc.col_display + 1,
        message,
    }
}

fn syntax_error(file: &str, d: Diagnostic) -> ScriptError {
    ScriptError::Syntax {
        file: file.to_owned(),
        line: d.line,
        column: d.column,
        message: d.message,
    }
}

/// Parses and minifies a script in one go.
pub fn minify(name: &str, code: &str) -> Result<String, ScriptError> {
    let (script, _) = Script::parse(name, code).map_err(|d| syntax_error(name, d))?;
    script.minify()
}

/// Sources listed by name, with their content embedded.
struct Embedded;

impl SourceMapGenConfig for Embedded {
    fn file_name_to_source(&self, f: &FileName) -> String {
        f.to_string()
    }

    fn inline_sources_content(&self, _: &FileName) -> bool {
        true
    }
}

/// Minifies `files`, given as `(name, code)` pairs, into the single script
/// `target`. The result ends with an inline source map pointing back into
/// every file.
pub fn bundle<'a>(
    target: &str,
    files: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Result<String, ScriptError> {
    let cm: Lrc<SourceMap> = Lrc::new(SourceMap::default());

    let programs = files
        .into_iter()
        .map(|(name, code)| {
            parse_into(&cm, name, code, &mut Vec::new()).map_err(|d| syntax_error(name, d))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let emit = |source: std::io::Error| ScriptError::Emit {
        file: target.to_owned(),
        source,
    };

    let mut buf = Vec::new();
    let mut mappings = Vec::new();

    {
        let writer = JsWriter::new(Lrc::clone(&cm), "\n", &mut buf, Some(&mut mappings));
        let mut emitter = Emitter {
            cfg: CodegenConfig::default().with_minify(true),
            cm: Lrc::clone(&cm),
            comments: None,
            wr: writer,
        };

        for program in &programs {
            emitter.emit_program(program).map_err(emit)?;
            emitter.wr.write_line().map_err(emit)?;
        }
    }

    let url = cm
        .build_source_map(&mappings, None, Embedded)
        .to_data_url()
        .map_err(|e| ScriptError::SourceMap {
            file: target.to_owned(),
            message: e.to_string(),
        })?;

    let mut code = String::from_utf8(buf)?;
    code.push_str("//# sourceMappingURL=");
    code.push_str(&url);
    code.push('\n');

    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minify_drops_comments_and_whitespace() {
        let code = "// leading comment\nvar  answer = 42 ;\n\nfunction twice ( x ) {\n  /* block */\n  return x * 2 ;\n}\n";
        let min = minify("a.js", code).unwrap();

        assert!(!min.contains("comment"));
        assert!(!min.contains("block"));
        assert!(min.contains("answer"));
        assert!(min.contains("twice"));
        assert!(min.len() < code.len());
        assert!(Script::parse("a.min.js", &min).is_ok());
    }

    #[test]
    fn test_minify_is_deterministic() {
        let code = "angular.module('app', []).controller('Main', function ($scope) { $scope.x = 1; });";
        assert_eq!(minify("a.js", code).unwrap(), minify("a.js", code).unwrap());
    }

    #[test]
    fn test_syntax_error_position() {
        let err = minify("broken.js", "var a = 1;\nvar b = (;\n").unwrap_err();
        match err {
            ScriptError::Syntax { file, line, .. } => {
                assert_eq!(file, "broken.js");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bundle_carries_inline_source_map() {
        let files = [
            ("home/home.js", "angular.module('app.home', []);\n"),
            ("app.js", "// entry\nangular.module('app', ['app.home']);\n"),
        ];
        let code = bundle("app.min.js", files).unwrap();

        let (body, map) = code.split_once("//# sourceMappingURL=").unwrap();
        assert!(body.contains("app.home"));
        assert!(!body.contains("entry"));
        assert!(map.starts_with("data:application/json;charset=utf-8;base64,"));
        let url = map.trim_end().replacen(";charset=utf-8", "", 1);
        let Ok(swc_sourcemap::DecodedMap::Regular(map)) = swc_sourcemap::decode_data_url(&url) else {
            panic!("expected an inline source map");
        };
        let sources: Vec<&str> = (0..map.get_source_count())
            .filter_map(|i| map.get_source(i).map(|s| &**s))
            .collect();
        assert_eq!(sources, vec!["home/home.js", "app.js"]);
        assert!(map.get_source_contents(1).unwrap().contains("// entry"));
        assert!(code.ends_with('\n'));
        assert!(Script::parse("app.min.js", &code).is_ok());
    }

    #[test]
    fn test_bundle_reports_the_broken_file() {
        let files = [("ok.js", "var a = 1;"), ("broken.js", "var b = (;")];
        match bundle("app.min.js", files).unwrap_err() {
            ScriptError::Syntax { file, .. } => assert_eq!(file, "broken.js"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_script_parses() {
        let (script, recovered) = Script::parse("empty.js", "").unwrap();
        assert!(recovered.is_empty());
        assert!(script.minify().unwrap().trim().is_empty());
    }
}
