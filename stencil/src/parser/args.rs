use crate::ast::{Arg, ArgKind};
use crate::parser::error::ParseError;
use crate::parser::template::scan_reference;

/// Parse a parenthesized argument list starting at `pos` (which must point
/// at `(`). Advances `pos` past the closing `)`.
///
/// Arguments are separated by commas and/or whitespace. A `$ref = value`
/// pair folds into a single assignment argument.
pub(crate) fn parse(
    source: &str,
    pos: &mut usize,
    file_id: usize,
) -> Result<Vec<Arg>, ParseError> {
    let open = *pos;
    *pos += 1;
    let mut args = Vec::new();

    loop {
        skip_separators(source, pos);
        match current_char(source, *pos) {
            None => {
                return Err(ParseError::new(
                    "unterminated argument list",
                    open..source.len(),
                    file_id,
                ));
            }
            Some(')') => {
                *pos += 1;
                return Ok(args);
            }
            Some(_) => {
                let arg = parse_term(source, pos, file_id)?;
                skip_whitespace(source, pos);
                if current_char(source, *pos) == Some('=') {
                    *pos += 1;
                    skip_whitespace(source, pos);
                    let target = match arg.kind {
                        ArgKind::Reference(reference) if !reference.quiet => reference,
                        _ => {
                            return Err(ParseError::new(
                                "assignment target must be a reference",
                                arg.span,
                                file_id,
                            ));
                        }
                    };
                    let value = parse_term(source, pos, file_id)?;
                    let span = target.span.start..value.span.end;
                    args.push(Arg {
                        kind: ArgKind::Assignment {
                            target,
                            value: Box::new(value),
                        },
                        span,
                    });
                } else {
                    args.push(arg);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Terms
// ---------------------------------------------------------------------------

fn parse_term(source: &str, pos: &mut usize, file_id: usize) -> Result<Arg, ParseError> {
    skip_whitespace(source, pos);
    let start = *pos;
    let Some(first) = current_char(source, start) else {
        return Err(ParseError::new(
            "expected an argument",
            start..start,
            file_id,
        ));
    };

    match first {
        '\'' | '"' => {
            let content_start = start + 1;
            let Some(close) = source[content_start..].find(first) else {
                return Err(ParseError::new(
                    "unterminated string literal",
                    start..source.len(),
                    file_id,
                ));
            };
            let end = content_start + close + 1;
            *pos = end;
            Ok(Arg {
                kind: ArgKind::Str(source[content_start..end - 1].to_string()),
                span: start..end,
            })
        }
        '$' => scan_reference(source, pos)
            .map(|reference| Arg {
                span: reference.span.clone(),
                kind: ArgKind::Reference(reference),
            })
            .ok_or_else(|| {
                ParseError::new("expected a reference after '$'", start..start + 1, file_id)
            }),
        '-' | '0'..='9' => {
            let bytes = source.as_bytes();
            let mut cursor = start + 1;
            while bytes
                .get(cursor)
                .is_some_and(|b| b.is_ascii_digit() || *b == b'.')
            {
                cursor += 1;
            }
            let text = &source[start..cursor];
            let number = text.parse::<f64>().map_err(|_| {
                ParseError::new(
                    format!("invalid number literal '{text}'"),
                    start..cursor,
                    file_id,
                )
            })?;
            *pos = cursor;
            Ok(Arg {
                kind: ArgKind::Number(number),
                span: start..cursor,
            })
        }
        c if c.is_ascii_alphabetic() => {
            let bytes = source.as_bytes();
            let mut cursor = start;
            while bytes
                .get(cursor)
                .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_')
            {
                cursor += 1;
            }
            let word = &source[start..cursor];
            let kind = match word {
                "true" => ArgKind::Bool(true),
                "false" => ArgKind::Bool(false),
                _ => {
                    return Err(ParseError::new(
                        format!("argument '{word}' must be a literal or reference"),
                        start..cursor,
                        file_id,
                    ));
                }
            };
            *pos = cursor;
            Ok(Arg {
                kind,
                span: start..cursor,
            })
        }
        other => Err(ParseError::new(
            format!("unexpected character '{other}' in argument list"),
            start..start + other.len_utf8(),
            file_id,
        )),
    }
}

// ---------------------------------------------------------------------------
// Cursor helpers
// ---------------------------------------------------------------------------

fn current_char(source: &str, pos: usize) -> Option<char> {
    source[pos..].chars().next()
}

fn skip_whitespace(source: &str, pos: &mut usize) {
    while current_char(source, *pos).is_some_and(char::is_whitespace) {
        *pos += source[*pos..]
            .chars()
            .next()
            .map(char::len_utf8)
            .unwrap_or(0);
    }
}

fn skip_separators(source: &str, pos: &mut usize) {
    loop {
        skip_whitespace(source, pos);
        if current_char(source, *pos) == Some(',') {
            *pos += 1;
        } else {
            return;
        }
    }
}
