//! Whitespace collapsing and comment removal for HTML documents.

use std::fmt::Write;

use super::{Attribute, MarkupError, Quote, Token, tokenize};

const INLINE_ELEMENTS: &[&str] = &[
    "a", "abbr", "acronym", "b", "bdi", "bdo", "big", "button", "cite", "code", "del", "dfn",
    "em", "font", "i", "img", "input", "ins", "kbd", "label", "mark", "math", "meter", "nobr",
    "object", "output", "progress", "q", "rp", "rt", "ruby", "s", "samp", "select", "small",
    "span", "strike", "strong", "sub", "sup", "svg", "textarea", "time", "tt", "u", "var", "wbr",
];

const PRESERVE_WHITESPACE: &[&str] = &["pre", "textarea"];

/// Minifies a document: comments are dropped, whitespace runs collapse to
/// one space, and whitespace next to block-level elements disappears.
/// Contents of `pre`, `textarea`, `script` and `style` are kept verbatim.
pub fn minify(source: &str) -> Result<String, MarkupError> {
    let tokens = without_comments(tokenize(source)?);

    let mut out = String::with_capacity(source.len());
    let mut preserve = 0usize;

    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::Doctype { text, .. } => {
                out.push_str("<!");
                out.push_str(collapse(text).trim());
                out.push('>');
            }
            Token::Comment { .. } => {}
            Token::StartTag {
                name,
                attributes,
                self_closing,
                ..
            } => {
                write_start_tag(&mut out, name, attributes, *self_closing);
                if !self_closing && is_one_of(PRESERVE_WHITESPACE, name) {
                    preserve += 1;
                }
            }
            Token::EndTag { name, .. } => {
                if is_one_of(PRESERVE_WHITESPACE, name) {
                    preserve = preserve.saturating_sub(1);
                }
                let _ = write!(out, "</{name}>");
            }
            Token::Text { text, raw, .. } => {
                if *raw || preserve > 0 {
                    out.push_str(text);
                    continue;
                }

                let left = i.checked_sub(1).and_then(|j| tokens.get(j));
                let right = tokens.get(i + 1);
                out.push_str(&collapse_text(text, is_inline(left), is_inline(right)));
            }
        }
    }

    Ok(out)
}

/// Drops comments and merges the text on both sides of them.
fn without_comments(tokens: Vec<Token>) -> Vec<Token> {
    let mut merged: Vec<Token> = Vec::with_capacity(tokens.len());

    for token in tokens {
        match token {
            Token::Comment { .. } => {}
            Token::Text {
                text, raw: false, ..
            } if matches!(merged.last(), Some(Token::Text { raw: false, .. })) => {
                if let Some(Token::Text { text: last, .. }) = merged.last_mut() {
                    last.push_str(&text);
                }
            }
            other => merged.push(other),
        }
    }

    merged
}

fn is_one_of(list: &[&str], name: &str) -> bool {
    list.contains(&name.to_ascii_lowercase().as_str())
}

fn is_inline(token: Option<&Token>) -> bool {
    match token {
        Some(Token::StartTag { name, .. } | Token::EndTag { name, .. }) => {
            is_one_of(INLINE_ELEMENTS, name)
        }
        _ => false,
    }
}

fn collapse(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;

    for c in text.chars() {
        if c.is_ascii_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }

    out
}

fn collapse_text(text: &str, left_inline: bool, right_inline: bool) -> String {
    let collapsed = collapse(text);

    if collapsed.trim().is_empty() {
        return if left_inline && right_inline && !collapsed.is_empty() {
            " ".into()
        } else {
            String::new()
        };
    }

    let mut s = collapsed.as_str();
    if !left_inline {
        s = s.trim_start();
    }
    if !right_inline {
        s = s.trim_end();
    }
    s.to_owned()
}

fn write_start_tag(out: &mut String, name: &str, attributes: &[Attribute], self_closing: bool) {
    out.push('<');
    out.push_str(name);

    for attribute in attributes {
        out.push(' ');
        out.push_str(&attribute.name);

        if let Some(value) = &attribute.value {
            let quote = match attribute.quote {
                Quote::Single => '\'',
                Quote::Bare if value.contains('"') => '\'',
                _ => '"',
            };
            let _ = write!(out, "={quote}{value}{quote}");
        }
    }

    out.push_str(if self_closing { "/>" } else { ">" });
}
