//! A small HTML tokenizer shared by the markup linter, the minifier and the
//! index injector.
//!
//! It is not a tree builder: it only splits the source into tags, text,
//! comments and declarations, keeping enough position information for lint
//! reports and enough of the original spelling (tag case, attribute quoting)
//! for the rules that care about it.

pub mod minify;

use std::fmt::Display;

use thiserror::Error;

pub use minify::minify;

/// One-based location in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Markup that could not be split into tokens.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{position}: {message}")]
pub struct MarkupError {
    pub position: Position,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quote {
    Double,
    Single,
    Bare,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    /// Raw value, `None` for boolean attributes.
    pub value: Option<String>,
    pub quote: Quote,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `<!…>` and `<?…>` declarations, most commonly the doctype.
    Doctype { text: String, position: Position },
    Comment { text: String, position: Position },
    StartTag {
        name: String,
        attributes: Vec<Attribute>,
        self_closing: bool,
        position: Position,
    },
    EndTag { name: String, position: Position },
    /// Character data. `raw` marks the contents of `script`, `style` and
    /// `textarea`, which are never interpreted as markup.
    Text {
        text: String,
        raw: bool,
        position: Position,
    },
}

impl Token {
    pub fn position(&self) -> Position {
        match self {
            Token::Doctype { position, .. }
            | Token::Comment { position, .. }
            | Token::StartTag { position, .. }
            | Token::EndTag { position, .. }
            | Token::Text { position, .. } => *position,
        }
    }
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "keygen", "link", "meta", "param",
    "source", "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea"];

/// Elements that never have content or an end tag.
pub fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name.to_ascii_lowercase().as_str())
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, MarkupError> {
    Tokenizer::new(source).run()
}

fn starts_tag_name(s: &str) -> bool {
    s.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | ':' | '_' | '.')
}

fn is_markup_start(s: &str) -> bool {
    s.starts_with("<!")
        || s.starts_with("<?")
        || (s.starts_with("</") && starts_tag_name(&s[2..]))
        || (s.starts_with('<') && starts_tag_name(&s[1..]))
}

struct Tokenizer<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
}

impl<'a> Tokenizer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
        }
    }

    fn position(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn advance(&mut self, bytes: usize) {
        for c in self.src[self.pos..self.pos + bytes].chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.pos += bytes;
    }

    fn take_while(&mut self, f: impl Fn(char) -> bool) -> &'a str {
        let rest = self.rest();
        let end = rest
            .char_indices()
            .find(|&(_, c)| !f(c))
            .map_or(rest.len(), |(i, _)| i);
        self.advance(end);
        &rest[..end]
    }

    fn skip_whitespace(&mut self) {
        self.take_while(char::is_whitespace);
    }

    fn run(mut self) -> Result<Vec<Token>, MarkupError> {
        while self.pos < self.src.len() {
            let rest = self.rest();

            if rest.starts_with("<!--") {
                self.comment()?;
            } else if rest.starts_with("<!") || rest.starts_with("<?") {
                self.declaration()?;
            } else if rest.starts_with("</") && starts_tag_name(&rest[2..]) {
                self.end_tag()?;
            } else if rest.starts_with('<') && starts_tag_name(&rest[1..]) {
                self.start_tag()?;
            } else {
                self.text();
            }
        }

        Ok(self.tokens)
    }

    fn comment(&mut self) -> Result<(), MarkupError> {
        let position = self.position();
        let rest = self.rest();

        let Some(end) = rest[4..].find("-->") else {
            return Err(MarkupError {
                position,
                message: "Unterminated comment".into(),
            });
        };

        self.tokens.push(Token::Comment {
            text: rest[4..4 + end].to_owned(),
            position,
        });
        self.advance(4 + end + 3);
        Ok(())
    }

    fn declaration(&mut self) -> Result<(), MarkupError> {
        let position = self.position();
        let rest = self.rest();

        let Some(end) = rest.find('>') else {
            return Err(MarkupError {
                position,
                message: "Unterminated declaration".into(),
            });
        };

        self.tokens.push(Token::Doctype {
            text: rest[2..end].to_owned(),
            position,
        });
        self.advance(end + 1);
        Ok(())
    }

    fn end_tag(&mut self) -> Result<(), MarkupError> {
        let position = self.position();
        self.advance(2);
        let name = self.take_while(is_name_char);

        let Some(end) = self.rest().find('>') else {
            return Err(MarkupError {
                position,
                message: format!("Unterminated end tag </{name}>"),
            });
        };

        self.advance(end + 1);
        self.tokens.push(Token::EndTag {
            name: name.to_owned(),
            position,
        });
        Ok(())
    }

    fn start_tag(&mut self) -> Result<(), MarkupError> {
        let position = self.position();
        self.advance(1);
        let name = self.take_while(is_name_char);

        let mut attributes = Vec::new();
        let mut self_closing = false;

        loop {
            self.skip_whitespace();
            let rest = self.rest();

            if rest.is_empty() {
                return Err(MarkupError {
                    position,
                    message: format!("Unterminated tag <{name}>"),
                });
            }
            if rest.starts_with("/>") {
                self_closing = true;
                self.advance(2);
                break;
            }
            if rest.starts_with('>') {
                self.advance(1);
                break;
            }
            if rest.starts_with('/') {
                self.advance(1);
                continue;
            }

            attributes.push(self.attribute(name)?);
        }

        self.tokens.push(Token::StartTag {
            name: name.to_owned(),
            attributes,
            self_closing,
            position,
        });

        let lower = name.to_ascii_lowercase();
        if !self_closing && RAW_TEXT_ELEMENTS.contains(&lower.as_str()) {
            self.raw_text(&lower)?;
        }

        Ok(())
    }

    fn attribute(&mut self, tag: &str) -> Result<Attribute, MarkupError> {
        let position = self.position();
        let name = self.take_while(|c| {
            !c.is_whitespace() && !matches!(c, '=' | '>' | '/' | '"' | '\'' | '<')
        });

        if name.is_empty() {
            return Err(MarkupError {
                position,
                message: format!("Unexpected character in tag <{tag}>"),
            });
        }

        self.skip_whitespace();
        if !self.rest().starts_with('=') {
            return Ok(Attribute {
                name: name.to_owned(),
                value: None,
                quote: Quote::Bare,
                position,
            });
        }

        self.advance(1);
        self.skip_whitespace();
        let rest = self.rest();

        let (value, quote) = match rest.chars().next() {
            Some(q @ ('"' | '\'')) => {
                let Some(end) = rest[1..].find(q) else {
                    return Err(MarkupError {
                        position,
                        message: format!("Unterminated value of attribute [ {name} ]"),
                    });
                };
                self.advance(end + 2);
                let quote = if q == '"' { Quote::Double } else { Quote::Single };
                (&rest[1..1 + end], quote)
            }
            _ => (
                self.take_while(|c| !c.is_whitespace() && c != '>'),
                Quote::Bare,
            ),
        };

        Ok(Attribute {
            name: name.to_owned(),
            value: Some(value.to_owned()),
            quote,
            position,
        })
    }

    fn raw_text(&mut self, name: &str) -> Result<(), MarkupError> {
        let position = self.position();
        let rest = self.rest();

        let Some(end) = rest.to_ascii_lowercase().find(&format!("</{name}")) else {
            return Err(MarkupError {
                position,
                message: format!("Unterminated <{name}> element"),
            });
        };

        if end > 0 {
            self.tokens.push(Token::Text {
                text: rest[..end].to_owned(),
                raw: true,
                position,
            });
            self.advance(end);
        }

        Ok(())
    }

    fn text(&mut self) {
        let position = self.position();
        let rest = self.rest();

        let end = rest
            .char_indices()
            .skip(1)
            .find(|&(i, c)| c == '<' && is_markup_start(&rest[i..]))
            .map_or(rest.len(), |(i, _)| i);

        self.tokens.push(Token::Text {
            text: rest[..end].to_owned(),
            raw: false,
            position,
        });
        self.advance(end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_document() {
        let tokens = tokenize("<!DOCTYPE html>\n<p class=\"a\" hidden>Hi</p><!-- c -->").unwrap();

        assert!(matches!(&tokens[0], Token::Doctype { text, .. } if text == "DOCTYPE html"));
        assert!(matches!(&tokens[1], Token::Text { text, .. } if text == "\n"));

        let Token::StartTag {
            name,
            attributes,
            position,
            ..
        } = &tokens[2]
        else {
            panic!("expected start tag, got {:?}", tokens[2]);
        };
        assert_eq!(name, "p");
        assert_eq!(*position, Position { line: 2, column: 1 });
        assert_eq!(attributes[0].value.as_deref(), Some("a"));
        assert_eq!(attributes[0].quote, Quote::Double);
        assert_eq!(attributes[1].name, "hidden");
        assert_eq!(attributes[1].value, None);

        assert!(matches!(&tokens[4], Token::EndTag { name, .. } if name == "p"));
        assert!(matches!(&tokens[5], Token::Comment { text, .. } if text == " c "));
    }

    #[test]
    fn test_raw_text_is_not_tokenized() {
        let tokens = tokenize("<script>if (a < b) { x = '<p>'; }</script>").unwrap();
        assert_eq!(tokens.len(), 3);
        assert!(matches!(&tokens[1], Token::Text { raw: true, text, .. } if text.contains("'<p>'")));
    }

    #[test]
    fn test_stray_angle_bracket_is_text() {
        let tokens = tokenize("<p>1 < 2</p>").unwrap();
        assert!(matches!(&tokens[1], Token::Text { text, .. } if text == "1 < 2"));
    }

    #[test]
    fn test_single_and_bare_quotes() {
        let tokens = tokenize("<a href='x' id=y>").unwrap();
        let Token::StartTag { attributes, .. } = &tokens[0] else {
            panic!("expected start tag");
        };
        assert_eq!(attributes[0].quote, Quote::Single);
        assert_eq!(attributes[1].quote, Quote::Bare);
        assert_eq!(attributes[1].value.as_deref(), Some("y"));
    }

    #[test]
    fn test_unterminated_comment() {
        let err = tokenize("<div>\n<!-- oops").unwrap_err();
        assert_eq!(err.position, Position { line: 2, column: 1 });
    }

    #[test]
    fn test_unterminated_tag() {
        assert!(tokenize("<div class=\"a\"").is_err());
    }
}
