//! Response model and the streaming response decoder.
//!
//! A server reply is a sequence of response units, each one line plus any
//! literals it carries. The decoder turns a unit into a [`Response`]: a
//! classified tag, an uppercased status-or-index word, a tree of parsed
//! [`Item`]s, the bracketed response-code block if present, and the
//! trailing human-readable text of status lines.

mod decode;

pub(crate) use decode::Decoder;

use std::borrow::Cow;

/// How a response unit's tag classified it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseKind {
    /// `+` command continuation request.
    Continuation,
    /// `*` untagged server data.
    Untagged,
    /// Tagged completion for the command in flight.
    Tagged,
    /// A tag that matches nothing we sent.
    #[default]
    Unknown,
}

/// One node in a parsed response tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    /// An atom, quoted string (unescaped), or textual bracket group.
    Atom(String),
    /// A buffered literal, kept as raw bytes.
    Literal(Vec<u8>),
    /// A parenthesized or bracketed sublist.
    List(Vec<Item>),
}

impl Item {
    /// Returns the atom text, if this node is an atom.
    #[must_use]
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Self::Atom(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the sublist, if this node is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Item]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the node as text: atoms verbatim, literals lossily decoded.
    #[must_use]
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Atom(s) => Some(Cow::Borrowed(s)),
            Self::Literal(data) => Some(String::from_utf8_lossy(data)),
            Self::List(_) => None,
        }
    }
}

/// A single parsed response unit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Response {
    /// The raw tag token (`*`, `+`, or a command tag).
    pub tag: String,
    /// Tag classification.
    pub kind: ResponseKind,
    /// The second token, uppercased: a status word or a message index.
    pub status_or_index: String,
    /// Whether `status_or_index` is one of OK/NO/BAD/BYE/PREAUTH.
    pub is_status: bool,
    /// The parsed item tree, including tag and status as leading atoms.
    pub items: Vec<Item>,
    /// The bracketed response-code block of a status line, if any.
    pub optional: Option<Vec<Item>>,
    /// Trailing free text of a status or continuation line.
    pub human_readable: String,
}

impl Response {
    /// Returns the atom text of item `index`, if present.
    #[must_use]
    pub fn item_atom(&self, index: usize) -> Option<&str> {
        self.items.get(index).and_then(Item::as_atom)
    }

    /// Returns the sublist at item `index`, if present.
    #[must_use]
    pub fn item_list(&self, index: usize) -> Option<&[Item]> {
        self.items.get(index).and_then(Item::as_list)
    }

    /// True for untagged (`*`) units.
    #[must_use]
    pub fn is_untagged(&self) -> bool {
        self.kind == ResponseKind::Untagged
    }

    /// First atom of the response-code block, uppercased.
    #[must_use]
    pub fn optional_code(&self) -> Option<String> {
        self.optional
            .as_ref()
            .and_then(|items| items.first())
            .and_then(Item::as_atom)
            .map(str::to_ascii_uppercase)
    }
}

/// Undoes quoted-string escaping: `\\` and `\"` collapse to the bare char.
#[must_use]
pub(crate) fn unescape_quoted(raw: &[u8]) -> String {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'\\' && i + 1 < raw.len() && (raw[i + 1] == b'\\' || raw[i + 1] == b'"') {
            out.push(raw[i + 1]);
            i += 2;
        } else {
            out.push(raw[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
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
    fn unescape_handles_escaped_pairs() {
        assert_eq!(unescape_quoted(br#"a\"b\\c"#), r#"a"b\c"#);
    }

    #[test]
    fn unescape_leaves_plain_text() {
        assert_eq!(unescape_quoted(b"hello world"), "hello world");
    }

    #[test]
    fn unescape_keeps_lone_backslash() {
        assert_eq!(unescape_quoted(br"a\b"), r"a\b");
    }

    #[test]
    fn item_as_text_decodes_literal() {
        let item = Item::Literal(b"body".to_vec());
        assert_eq!(item.as_text().unwrap(), "body");
        assert!(Item::List(vec![]).as_text().is_none());
    }

    proptest::proptest! {
        #[test]
        fn escape_then_unescape_round_trips(s in proptest::string::string_regex(".*").unwrap()) {
            let quoted = crate::command::escape_string(&s);
            let inner = &quoted.as_bytes()[1..quoted.len() - 1];
            proptest::prop_assert_eq!(unescape_quoted(inner), s);
        }
    }

    #[test]
    fn optional_code_uppercases() {
        let resp = Response {
            optional: Some(vec![
                Item::Atom("AppendUid".to_string()),
                Item::Atom("1".to_string()),
            ]),
            ..Response::default()
        };
        assert_eq!(resp.optional_code().unwrap(), "APPENDUID");
    }
}
