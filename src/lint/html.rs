//! Markup rules compatible with the htmlhint defaults.

use std::collections::HashSet;

use camino::Utf8Path;

use super::{Finding, Severity};
use crate::html::{Attribute, Position, Quote, Token, is_void, tokenize};

/// Which rules are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rules {
    pub tagname_lowercase: bool,
    pub attr_lowercase: bool,
    pub attr_value_double_quotes: bool,
    pub attr_no_duplication: bool,
    pub doctype_first: bool,
    pub tag_pair: bool,
    pub spec_char_escape: bool,
    pub id_unique: bool,
    pub src_not_empty: bool,
    pub title_require: bool,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            tagname_lowercase: true,
            attr_lowercase: true,
            attr_value_double_quotes: true,
            attr_no_duplication: true,
            doctype_first: true,
            tag_pair: true,
            spec_char_escape: true,
            id_unique: true,
            src_not_empty: true,
            title_require: true,
        }
    }
}

impl Rules {
    /// Rules for fragments that are never served as a whole document.
    pub fn partial() -> Self {
        Self {
            doctype_first: false,
            ..Self::default()
        }
    }
}

/// Attributes that must not be empty, per element.
const SOURCE_ATTRIBUTES: &[(&str, &str)] = &[
    ("img", "src"),
    ("script", "src"),
    ("iframe", "src"),
    ("embed", "src"),
    ("audio", "src"),
    ("video", "src"),
    ("source", "src"),
    ("track", "src"),
    ("input", "src"),
    ("link", "href"),
    ("object", "data"),
];

pub fn lint(file: &Utf8Path, source: &str, rules: Rules) -> Vec<Finding> {
    let mut linter = Linter {
        file,
        rules,
        findings: Vec::new(),
    };

    match tokenize(source) {
        Ok(tokens) => linter.check(&tokens),
        Err(e) => linter.error(e.position, "parse", e.message),
    }

    linter.findings
}

struct Linter<'a> {
    file: &'a Utf8Path,
    rules: Rules,
    findings: Vec<Finding>,
}

#[derive(Default)]
struct Head {
    open: Option<Position>,
    title: Option<String>,
    in_title: bool,
}

impl Linter<'_> {
    fn error(&mut self, position: Position, rule: &'static str, message: String) {
        self.findings.push(Finding {
            file: self.file.to_path_buf(),
            line: position.line,
            column: position.column,
            rule,
            message,
            severity: Severity::Error,
        });
    }

    fn check(&mut self, tokens: &[Token]) {
        if self.rules.doctype_first {
            self.doctype_first(tokens);
        }

        let mut stack: Vec<(String, Position)> = Vec::new();
        let mut ids: HashSet<String> = HashSet::new();
        let mut head = Head::default();

        for token in tokens {
            match token {
                Token::StartTag {
                    name,
                    attributes,
                    self_closing,
                    position,
                } => {
                    let lower = name.to_ascii_lowercase();
                    self.tag_name(name, *position);
                    self.attributes(&lower, attributes, &mut ids);

                    match lower.as_str() {
                        "head" => head.open = Some(*position),
                        "title" if head.open.is_some() => {
                            head.in_title = true;
                            head.title.get_or_insert_with(String::new);
                        }
                        _ => {}
                    }

                    if !self_closing && !is_void(&lower) {
                        stack.push((lower, *position));
                    }
                }
                Token::EndTag { name, position } => {
                    let lower = name.to_ascii_lowercase();
                    self.tag_name(name, *position);

                    match lower.as_str() {
                        "title" => head.in_title = false,
                        "head" => self.head(&mut head, *position),
                        _ => {}
                    }

                    if self.rules.tag_pair {
                        self.close(&mut stack, &lower, *position);
                    }
                }
                Token::Text {
                    text,
                    raw,
                    position,
                } => {
                    if head.in_title
                        && let Some(title) = head.title.as_mut()
                    {
                        title.push_str(text);
                    }
                    if !raw && self.rules.spec_char_escape {
                        self.special_chars(text, *position);
                    }
                }
                Token::Doctype { .. } | Token::Comment { .. } => {}
            }
        }

        if self.rules.tag_pair {
            for (name, position) in stack.into_iter().rev() {
                self.error(
                    position,
                    "tag-pair",
                    format!("Tag must be paired, missing: [ </{name}> ], start tag match failed [ <{name}> ] on line {}.", position.line),
                );
            }
        }
    }

    fn doctype_first(&mut self, tokens: &[Token]) {
        let first = tokens.iter().find(|token| match token {
            Token::Comment { .. } => false,
            Token::Text { text, .. } => !text.trim().is_empty(),
            _ => true,
        });

        match first {
            Some(Token::Doctype { text, .. })
                if text.trim_start().to_ascii_lowercase().starts_with("doctype") => {}
            Some(token) => {
                self.error(
                    token.position(),
                    "doctype-first",
                    "Doctype must be declared first.".into(),
                );
            }
            None => {}
        }
    }

    fn tag_name(&mut self, name: &str, position: Position) {
        if self.rules.tagname_lowercase && name.chars().any(|c| c.is_ascii_uppercase()) {
            self.error(
                position,
                "tagname-lowercase",
                format!("The html element name of [ {name} ] must be in lowercase."),
            );
        }
    }

    fn attributes(&mut self, tag: &str, attributes: &[Attribute], ids: &mut HashSet<String>) {
        let mut seen: HashSet<String> = HashSet::new();

        for attribute in attributes {
            let name = &attribute.name;
            let lower = name.to_ascii_lowercase();

            if self.rules.attr_lowercase && name.chars().any(|c| c.is_ascii_uppercase()) {
                self.error(
                    attribute.position,
                    "attr-lowercase",
                    format!("The attribute name of [ {name} ] must be in lowercase."),
                );
            }

            if self.rules.attr_value_double_quotes
                && attribute.value.is_some()
                && attribute.quote != Quote::Double
            {
                self.error(
                    attribute.position,
                    "attr-value-double-quotes",
                    format!("The value of attribute [ {name} ] must be in double quotes."),
                );
            }

            if self.rules.attr_no_duplication && !seen.insert(lower.clone()) {
                self.error(
                    attribute.position,
                    "attr-no-duplication",
                    format!("Duplicate of attribute name [ {name} ] was found."),
                );
            }

            if self.rules.id_unique
                && lower == "id"
                && let Some(id) = &attribute.value
                && !ids.insert(id.clone())
            {
                self.error(
                    attribute.position,
                    "id-unique",
                    format!("The id value [ {id} ] must be unique."),
                );
            }

            if self.rules.src_not_empty
                && SOURCE_ATTRIBUTES.contains(&(tag, lower.as_str()))
                && attribute.value.as_deref().is_none_or(|v| v.trim().is_empty())
            {
                self.error(
                    attribute.position,
                    "src-not-empty",
                    format!("The attribute [ {lower} ] of the tag [ {tag} ] must have a value."),
                );
            }
        }
    }

    fn head(&mut self, head: &mut Head, position: Position) {
        if !self.rules.title_require || head.open.take().is_none() {
            return;
        }

        match head.title.take() {
            None => self.error(
                position,
                "title-require",
                "<title></title> must be present in <head> tag.".into(),
            ),
            Some(title) if title.trim().is_empty() => self.error(
                position,
                "title-require",
                "<title></title> must not be empty.".into(),
            ),
            Some(_) => {}
        }
    }

    fn close(&mut self, stack: &mut Vec<(String, Position)>, name: &str, position: Position) {
        let Some(index) = stack.iter().rposition(|(open, _)| open == name) else {
            self.error(
                position,
                "tag-pair",
                format!("Tag must be paired, no start tag: [ </{name}> ]"),
            );
            return;
        };

        for (open, at) in stack.drain(index + 1..).rev().collect::<Vec<_>>() {
            self.error(
                at,
                "tag-pair",
                format!("Tag must be paired, missing: [ </{open}> ], start tag match failed [ <{open}> ] on line {}.", at.line),
            );
        }
        stack.pop();
    }

    fn special_chars(&mut self, text: &str, start: Position) {
        let mut position = start;

        for c in text.chars() {
            if c == '<' || c == '>' {
                self.error(
                    position,
                    "spec-char-escape",
                    format!("Special characters must be escaped : [ {c} ]."),
                );
            }

            if c == '\n' {
                position.line += 1;
                position.column = 1;
            } else {
                position.column += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = "<!DOCTYPE html>\n<html>\n<head>\n  <title>App</title>\n</head>\n<body>\n  <div id=\"main\"><img src=\"a.png\"></div>\n</body>\n</html>\n";

    fn rules_hit(source: &str, rules: Rules) -> Vec<&'static str> {
        lint(Utf8Path::new("app/x.html"), source, rules)
            .into_iter()
            .map(|f| f.rule)
            .collect()
    }

    #[test]
    fn test_valid_document() {
        assert!(rules_hit(DOCUMENT, Rules::default()).is_empty());
    }

    #[test]
    fn test_partial_without_doctype() {
        let partial = "<div class=\"home\">\n  <h1>{{ title }}</h1>\n</div>\n";
        assert!(rules_hit(partial, Rules::partial()).is_empty());
        assert_eq!(rules_hit(partial, Rules::default()), vec!["doctype-first"]);
    }

    #[test]
    fn test_tag_pair() {
        let findings = lint(Utf8Path::new("a.html"), "<div>\n<span>\n</div>", Rules::partial());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule, "tag-pair");
        assert_eq!(findings[0].line, 2);

        assert_eq!(rules_hit("</p>", Rules::partial()), vec!["tag-pair"]);
        assert_eq!(rules_hit("<ul><li>", Rules::partial()), vec!["tag-pair", "tag-pair"]);
    }

    #[test]
    fn test_attribute_rules() {
        let hits = rules_hit(
            "<div ID='a' class=\"x\" class=\"y\"></div><p id=\"a\"></p><img src=\"\">",
            Rules::partial(),
        );
        assert_eq!(
            hits,
            vec![
                "attr-lowercase",
                "attr-value-double-quotes",
                "attr-no-duplication",
                "id-unique",
                "src-not-empty",
            ]
        );
    }

    #[test]
    fn test_uppercase_tag() {
        assert_eq!(
            rules_hit("<DIV></DIV>", Rules::partial()),
            vec!["tagname-lowercase", "tagname-lowercase"]
        );
    }

    #[test]
    fn test_special_characters() {
        let findings = lint(Utf8Path::new("a.html"), "<p>\n 1 > 0</p>", Rules::partial());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule, "spec-char-escape");
        assert_eq!((findings[0].line, findings[0].column), (2, 4));
    }

    #[test]
    fn test_title_required() {
        let doc = "<!DOCTYPE html><html><head></head><body></body></html>";
        assert_eq!(rules_hit(doc, Rules::default()), vec!["title-require"]);

        let doc = "<!DOCTYPE html><html><head><title> </title></head></html>";
        assert_eq!(rules_hit(doc, Rules::default()), vec!["title-require"]);
    }

    #[test]
    fn test_parse_error_is_reported() {
        let findings = lint(Utf8Path::new("a.html"), "<div>\n<!-- open", Rules::partial());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule, "parse");
        assert_eq!(findings[0].severity, Severity::Error);
    }
}
