use std::ops::Range;

use crate::ast::{Directive, Node, Reference};
use crate::directive::{self, Signature};
use crate::parser::args;
use crate::parser::error::ParseError;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse raw template source into a list of body nodes.
pub fn parse_nodes(source: &str, file_id: usize) -> Result<Vec<Node>, Vec<ParseError>> {
    let mut scanner = Scanner::new(source, file_id);
    let nodes = scanner.parse_body(None);
    if scanner.errors.is_empty() {
        Ok(nodes)
    } else {
        Err(scanner.errors)
    }
}

/// Scan a reference at `pos` (which must point at `$`). Advances `pos` past
/// the reference on success; leaves it untouched when the `$` does not start
/// a well-formed reference (the caller emits it as literal text).
pub(crate) fn scan_reference(source: &str, pos: &mut usize) -> Option<Reference> {
    let bytes = source.as_bytes();
    let start = *pos;
    let mut cursor = start + 1;

    let quiet = bytes.get(cursor) == Some(&b'!');
    if quiet {
        cursor += 1;
    }
    let braced = bytes.get(cursor) == Some(&b'{');
    if braced {
        cursor += 1;
    }

    let name_start = cursor;
    if !bytes.get(cursor).is_some_and(u8::is_ascii_alphabetic) {
        return None;
    }
    while bytes
        .get(cursor)
        .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_' || *b == b'-')
    {
        cursor += 1;
    }
    let name_end = cursor;

    if braced {
        if bytes.get(cursor) != Some(&b'}') {
            return None;
        }
        cursor += 1;
    }

    let reference = Reference {
        name: source[name_start..name_end].to_string(),
        quiet,
        raw: source[start..cursor].to_string(),
        span: start..cursor,
    };
    *pos = cursor;
    Some(reference)
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

struct Scanner<'a> {
    source: &'a str,
    file_id: usize,
    pos: usize,
    errors: Vec<ParseError>,
}

impl<'a> Scanner<'a> {
    fn new(source: &'a str, file_id: usize) -> Self {
        Scanner {
            source,
            file_id,
            pos: 0,
            errors: Vec::new(),
        }
    }

    /// Parse nodes until `#end` (inside a block body) or end of input.
    /// `open` names the enclosing block directive and its header span.
    fn parse_body(&mut self, open: Option<(&str, Range<usize>)>) -> Vec<Node> {
        let mut nodes = Vec::new();
        let mut text = String::new();

        while self.pos < self.source.len() {
            match self.source.as_bytes()[self.pos] {
                b'$' => {
                    if let Some(reference) = scan_reference(self.source, &mut self.pos) {
                        flush_text(&mut text, &mut nodes);
                        nodes.push(Node::Reference(reference));
                    } else {
                        text.push('$');
                        self.pos += 1;
                    }
                }
                b'#' => {
                    let Some((name, name_end)) = self.peek_name() else {
                        text.push('#');
                        self.pos += 1;
                        continue;
                    };
                    if name == "end" {
                        if open.is_some() {
                            self.pos = name_end;
                            flush_text(&mut text, &mut nodes);
                            return nodes;
                        }
                        self.errors.push(ParseError::new(
                            "#end without a matching block directive",
                            self.pos..name_end,
                            self.file_id,
                        ));
                        self.pos = name_end;
                    } else if let Some(signature) = directive::lookup(name) {
                        flush_text(&mut text, &mut nodes);
                        if let Some(node) = self.parse_directive(signature, name_end) {
                            nodes.push(node);
                        }
                    } else {
                        // Unknown names fall through as literal text.
                        text.push('#');
                        self.pos += 1;
                    }
                }
                _ => {
                    // Copy plain text up to the next marker character.
                    let rest = &self.source[self.pos..];
                    let next = rest
                        .find(['$', '#'])
                        .map(|offset| self.pos + offset)
                        .unwrap_or(self.source.len());
                    text.push_str(&self.source[self.pos..next]);
                    self.pos = next;
                }
            }
        }

        if let Some((name, span)) = open {
            self.errors.push(
                ParseError::new(
                    format!("#{name}() is missing its #end"),
                    span,
                    self.file_id,
                )
                .with_note("block directives must be closed with #end"),
            );
        }
        flush_text(&mut text, &mut nodes);
        nodes
    }

    /// Directive name following the `#` at the current position.
    fn peek_name(&self) -> Option<(&'a str, usize)> {
        let bytes = self.source.as_bytes();
        let name_start = self.pos + 1;
        if !bytes.get(name_start).is_some_and(u8::is_ascii_alphabetic) {
            return None;
        }
        let mut cursor = name_start;
        while bytes.get(cursor).is_some_and(u8::is_ascii_alphanumeric) {
            cursor += 1;
        }
        Some((&self.source[name_start..cursor], cursor))
    }

    /// Parse one directive starting at the current `#`. Errors are recorded
    /// and `None` is returned; the body of a malformed block directive is
    /// still consumed so parsing can continue past its `#end`.
    fn parse_directive(&mut self, signature: &'static Signature, name_end: usize) -> Option<Node> {
        let start = self.pos;
        self.pos = name_end;

        let args = if self.source[self.pos..].starts_with('(') {
            match args::parse(self.source, &mut self.pos, self.file_id) {
                Ok(args) => args,
                Err(error) => {
                    self.errors.push(error);
                    self.recover_to_line_end();
                    return None;
                }
            }
        } else if signature.bare {
            Vec::new()
        } else {
            self.errors.push(ParseError::new(
                format!("#{}() requires a parenthesized argument list", signature.name),
                start..name_end,
                self.file_id,
            ));
            return None;
        };

        let header_span = start..self.pos;
        let mut valid = true;

        let too_many = signature.max_args.is_some_and(|max| args.len() > max);
        if args.len() < signature.min_args || too_many {
            self.errors.push(ParseError::new(
                format!("#{}() {}", signature.name, signature.arity_message()),
                header_span.clone(),
                self.file_id,
            ));
            valid = false;
        }
        for (index, arg) in args.iter().enumerate() {
            let rule = signature.rule_for(index);
            if !rule.admits(&arg.kind) {
                self.errors.push(ParseError::new(
                    format!("#{}() argument #{index} {}", signature.name, rule.expectation()),
                    arg.span.clone(),
                    self.file_id,
                ));
                valid = false;
            }
        }

        let body = if signature.has_body {
            self.parse_body(Some((signature.name, header_span.clone())))
        } else {
            Vec::new()
        };

        if !valid {
            return None;
        }
        Some(Node::Directive(Directive {
            name: signature.name.to_string(),
            args,
            body,
            span: header_span,
        }))
    }

    fn recover_to_line_end(&mut self) {
        self.pos = self.source[self.pos..]
            .find('\n')
            .map(|offset| self.pos + offset)
            .unwrap_or(self.source.len());
    }
}

fn flush_text(text: &mut String, nodes: &mut Vec<Node>) {
    if !text.is_empty() {
        nodes.push(Node::Text(std::mem::take(text)));
    }
}
