//! Binding of `{name}` placeholders to backend-native positional parameters.

use std::collections::HashMap;

mod parsers;
mod scanner;

use parsers::{at, closes_dollar_tag, digits_after, dollar_tag};
use scanner::{State, scan_identifier};

use crate::error::DbError;
use crate::types::{Params, RowValues};

/// Target placeholder style for binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// PostgreSQL-style placeholders like `$1`.
    Postgres,
    /// SQLite-style placeholders like `?1`.
    Sqlite,
}

impl PlaceholderStyle {
    fn push_marker(self, out: &mut Vec<u8>, position: usize) {
        out.push(match self {
            PlaceholderStyle::Postgres => b'$',
            PlaceholderStyle::Sqlite => b'?',
        });
        out.extend_from_slice(position.to_string().as_bytes());
    }
}

/// SQL text with positional placeholders and the values to bind, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub sql: String,
    pub values: Vec<RowValues>,
    /// Placeholder names in positional order; `names[i]` is bound at position `i + 1`.
    pub names: Vec<String>,
}

/// Replace every `{name}` placeholder in `template` with a positional parameter.
///
/// A name that occurs more than once is bound once and its position reused. Parameters no
/// placeholder mentions are ignored. `{{` and `}}` produce literal braces. Quoted strings,
/// comments and dollar-quoted blocks are copied verbatim, so `'{x}'` stays a literal.
/// Values are never spliced into the SQL text.
///
/// `query` names the statement in the error (the registered name, or `<raw sql>`).
///
/// # Errors
/// Returns `DbError::ParameterMissing` for the first placeholder without a value, and
/// `DbError::PositionalPlaceholder` when the template already holds a native marker
/// (`$1` for either style, `?` or `?1` for SQLite) outside quotes and comments.
pub fn bind_named(
    template: &str,
    params: &Params,
    style: PlaceholderStyle,
    query: &str,
) -> Result<BoundStatement, DbError> {
    let bytes = template.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut names: Vec<String> = Vec::new();
    let mut values: Vec<RowValues> = Vec::new();
    let mut state = State::Normal;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                _ if at(bytes, idx, b"--") => state = State::LineComment,
                _ if at(bytes, idx, b"/*") => {
                    state = State::BlockComment(1);
                    out.extend_from_slice(b"/*");
                    idx += 2;
                    continue;
                }
                b'$' => {
                    if let Some((tag, close)) = dollar_tag(bytes, idx) {
                        out.extend_from_slice(&bytes[idx..=close]);
                        state = State::DollarQuoted(tag.to_owned());
                        idx = close + 1;
                        continue;
                    }
                    if let Some(end) = digits_after(bytes, idx) {
                        return Err(positional_placeholder(query, &bytes[idx..end]));
                    }
                }
                // postgres reads a bare `?` as a jsonb operator
                b'?' if style == PlaceholderStyle::Sqlite => {
                    let end = digits_after(bytes, idx).unwrap_or(idx + 1);
                    return Err(positional_placeholder(query, &bytes[idx..end]));
                }
                b'{' if bytes.get(idx + 1) == Some(&b'{') => {
                    out.push(b'{');
                    idx += 2;
                    continue;
                }
                b'}' if bytes.get(idx + 1) == Some(&b'}') => {
                    out.push(b'}');
                    idx += 2;
                    continue;
                }
                b'{' => {
                    if let Some((end, name)) = scan_identifier(bytes, idx + 1)
                        && bytes.get(end) == Some(&b'}')
                    {
                        let position = match positions.get(name) {
                            Some(&position) => position,
                            None => {
                                let value = params.get(name).ok_or_else(|| {
                                    DbError::ParameterMissing {
                                        query: query.to_owned(),
                                        parameter: name.to_owned(),
                                    }
                                })?;
                                values.push(value.clone());
                                names.push(name.to_owned());
                                positions.insert(name, values.len());
                                values.len()
                            }
                        };
                        style.push_marker(&mut out, position);
                        idx = end + 1;
                        continue;
                    }
                }
                _ => {}
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        out.push(b);
                        idx += 1; // escaped quote
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        out.push(b);
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if at(bytes, idx, b"/*") {
                    state = State::BlockComment(depth + 1);
                    out.extend_from_slice(b"/*");
                    idx += 2;
                    continue;
                } else if at(bytes, idx, b"*/") {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    out.extend_from_slice(b"*/");
                    idx += 2;
                    continue;
                }
            }
            State::DollarQuoted(ref tag) => {
                if b == b'$' && closes_dollar_tag(bytes, idx, tag) {
                    let end = idx + tag.len() + 1;
                    out.extend_from_slice(&bytes[idx..=end]);
                    state = State::Normal;
                    idx = end + 1;
                    continue;
                }
            }
        }

        out.push(b);
        idx += 1;
    }

    let sql = String::from_utf8(out)
        .map_err(|e| DbError::ExecutionError(format!("placeholder binding produced invalid UTF-8: {e}")))?;
    Ok(BoundStatement { sql, values, names })
}

fn positional_placeholder(query: &str, marker: &[u8]) -> DbError {
    DbError::PositionalPlaceholder {
        query: query.to_owned(),
        marker: String::from_utf8_lossy(marker).into_owned(),
    }
}
