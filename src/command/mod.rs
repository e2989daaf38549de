//! Command construction and serialization.
//!
//! A request is a tag, a command name, and a tree of parameters. Nested
//! parameter lists render as parenthesized groups; string escaping and
//! credential redaction live here so the client never assembles raw
//! protocol text itself.

mod tag;

pub use tag::TagSequence;

/// One command parameter: a raw protocol token or a nested list.
///
/// `Raw` values are emitted verbatim, so callers quote them with
/// [`escape_string`] when they carry user data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    /// A verbatim token (atom, quoted string, range, literal marker).
    Raw(String),
    /// A parenthesized sublist. Empty lists are skipped entirely.
    List(Vec<Param>),
}

impl Param {
    /// Convenience constructor for a raw token.
    pub fn raw(s: impl Into<String>) -> Self {
        Self::Raw(s.into())
    }

    /// Convenience constructor for a quoted-string token.
    pub fn quoted(s: &str) -> Self {
        Self::Raw(escape_string(s))
    }
}

/// Renders parameters into the request-line suffix.
///
/// Each rendered parameter is preceded by a single space; a nested list
/// becomes ` (inner)` with the inner rendering trimmed.
#[must_use]
pub fn render_params(params: &[Param]) -> String {
    let mut out = String::new();
    for param in params {
        match param {
            Param::Raw(s) => {
                out.push(' ');
                out.push_str(s);
            }
            Param::List(items) if !items.is_empty() => {
                out.push_str(" (");
                out.push_str(render_params(items).trim());
                out.push(')');
            }
            Param::List(_) => {}
        }
    }
    out
}

/// Builds the full request line: `<tag> <command><params>`.
#[must_use]
pub fn render_request(tag: &str, command: &str, params: &[Param]) -> String {
    format!("{tag} {command}{}", render_params(params))
}

/// Quotes a string for the wire, escaping backslashes and double quotes.
#[must_use]
pub fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '\\' || c == '"' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Returns a copy of `params` safe to log, or `None` when the original
/// line is already safe.
///
/// For LOGIN the password parameter is replaced with a fixed mask.
#[must_use]
pub(crate) fn redact_params(command: &str, params: &[Param]) -> Option<Vec<Param>> {
    if command.eq_ignore_ascii_case("LOGIN") && params.len() >= 2 {
        let mut masked = params.to_vec();
        masked[1] = Param::Raw("\"********\"".to_string());
        return Some(masked);
    }
    None
}

/// Splits a rendered request at the first synchronizing literal marker.
///
/// Returns `(prefix, remainder)` where `prefix` ends with `}\r\n` and must
/// be sent first; `remainder` follows after the server's continuation. A
/// line containing a non-synchronizing literal (`{n+}`) is never split.
#[must_use]
pub(crate) fn split_on_literal(line: &str) -> Option<(&str, &str)> {
    let bytes = line.as_bytes();
    let nonsync = bytes
        .windows(5)
        .any(|w| w[0].is_ascii_digit() && &w[1..] == b"+}\r\n");
    if nonsync {
        return None;
    }
    let pos = line.find("}\r\n")?;
    Some((&line[..pos + 3], &line[pos + 3..]))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn render_flat_params() {
        let params = vec![Param::raw("1:*"), Param::raw("UID")];
        assert_eq!(render_params(&params), " 1:* UID");
    }

    #[test]
    fn render_nested_list() {
        let params = vec![
            Param::raw("1"),
            Param::List(vec![Param::raw("FLAGS"), Param::raw("UID")]),
        ];
        assert_eq!(render_params(&params), " 1 (FLAGS UID)");
    }

    #[test]
    fn empty_list_is_skipped() {
        let params = vec![Param::raw("A"), Param::List(vec![]), Param::raw("B")];
        assert_eq!(render_params(&params), " A B");
    }

    #[test]
    fn deeply_nested_lists() {
        let params = vec![Param::List(vec![
            Param::raw("STATUS"),
            Param::List(vec![Param::raw("MESSAGES"), Param::raw("UNSEEN")]),
        ])];
        assert_eq!(render_params(&params), " (STATUS (MESSAGES UNSEEN))");
    }

    #[test]
    fn render_request_line() {
        let line = render_request("TAG1", "STATUS", &[Param::quoted("INBOX")]);
        assert_eq!(line, "TAG1 STATUS \"INBOX\"");
    }

    #[test]
    fn escape_plain_string() {
        assert_eq!(escape_string("INBOX"), "\"INBOX\"");
    }

    #[test]
    fn escape_quotes_and_backslashes() {
        assert_eq!(escape_string(r#"a"b\c"#), r#""a\"b\\c""#);
    }

    #[test]
    fn escape_empty_string() {
        assert_eq!(escape_string(""), "\"\"");
    }

    #[test]
    fn login_password_is_masked() {
        let params = vec![Param::quoted("user"), Param::quoted("secret")];
        let masked = redact_params("LOGIN", &params).unwrap();
        assert_eq!(masked[0], Param::Raw("\"user\"".to_string()));
        assert_eq!(masked[1], Param::Raw("\"********\"".to_string()));
    }

    #[test]
    fn other_commands_are_not_masked() {
        let params = vec![Param::quoted("INBOX")];
        assert!(redact_params("SELECT", &params).is_none());
    }

    #[test]
    fn split_at_sync_literal() {
        let line = "TAG1 SEARCH CHARSET UTF-8 TEXT {4}\r\nm\u{e9}l ALL";
        let (prefix, rest) = split_on_literal(line).unwrap();
        assert_eq!(prefix, "TAG1 SEARCH CHARSET UTF-8 TEXT {4}\r\n");
        assert_eq!(rest, "m\u{e9}l ALL");
    }

    #[test]
    fn nonsync_literal_is_not_split() {
        let line = "TAG1 SEARCH TEXT {4+}\r\nmail";
        assert!(split_on_literal(line).is_none());
    }

    #[test]
    fn no_literal_no_split() {
        assert!(split_on_literal("TAG1 NOOP").is_none());
    }
}
