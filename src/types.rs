//! Domain types built from parsed responses.

use std::collections::HashMap;

use crate::parser::{Item, Response, ResponseKind};

/// State of the selected folder, rebuilt on every SELECT/EXAMINE.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FolderInformation {
    /// Folder name as given to SELECT/EXAMINE.
    pub name: String,
    /// True for SELECT, false for EXAMINE.
    pub is_writable: bool,
    /// Flags defined for the folder.
    pub flags: Vec<String>,
    /// Flags that can be stored permanently.
    pub permanent_flags: Vec<String>,
    /// UIDVALIDITY value, if announced.
    pub uidvalidity: Option<u32>,
    /// Predicted next UID, if announced.
    pub uidnext: Option<u32>,
    /// First unseen message number, if announced.
    pub unseen: Option<u32>,
    /// Highest mod-sequence (CONDSTORE), if announced.
    pub highest_mod_seq: Option<u64>,
    /// Message count.
    pub exists: Option<u32>,
    /// Recent message count.
    pub recent: Option<u32>,
}

/// One folder from a LIST/LSUB reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    /// Full folder name.
    pub name: String,
    /// Hierarchy delimiter as reported (`NIL` when flat).
    pub delimiter: String,
    /// Name attributes (`\HasChildren`, `\Noselect`, ...).
    pub attributes: Vec<String>,
    /// STATUS values attached by a LIST-STATUS reply.
    pub status: Option<HashMap<String, String>>,
}

impl Folder {
    /// True when this is the INBOX (case-insensitive per protocol).
    #[must_use]
    pub fn is_inbox(&self) -> bool {
        self.name.eq_ignore_ascii_case("INBOX")
    }

    /// True when an attribute is present, compared case-insensitively.
    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes
            .iter()
            .any(|a| a.eq_ignore_ascii_case(name))
    }
}

/// A validated `* N FETCH (...)` unit with keyed access to its pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// Message sequence number from the reply.
    pub index: u32,
    pairs: Vec<Item>,
}

impl FetchResponse {
    /// Builds a fetch response from a parsed unit, or `None` when the
    /// unit is not a well-formed non-empty FETCH data line.
    #[must_use]
    pub fn from_response(resp: &Response) -> Option<Self> {
        if resp.kind != ResponseKind::Untagged {
            return None;
        }
        let index = resp.item_atom(1)?.parse().ok()?;
        if !resp
            .item_atom(2)
            .is_some_and(|a| a.eq_ignore_ascii_case("FETCH"))
        {
            return None;
        }
        let pairs = resp.item_list(3)?;
        if pairs.is_empty() {
            return None;
        }
        Some(Self {
            index,
            pairs: pairs.to_vec(),
        })
    }

    /// Looks up the value following a data item name, case-insensitively.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&Item> {
        let mut i = 0;
        while i + 1 < self.pairs.len() {
            if self.pairs[i]
                .as_atom()
                .is_some_and(|a| a.eq_ignore_ascii_case(key))
            {
                return self.pairs.get(i + 1);
            }
            i += 2;
        }
        None
    }

    /// The UID data item as a number, if present.
    #[must_use]
    pub fn uid(&self) -> Option<u32> {
        self.value("UID").and_then(Item::as_atom)?.parse().ok()
    }
}

/// Quota usage from GETQUOTAROOT, in the units the server reports
/// (kilobytes for STORAGE, messages for MESSAGE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QuotaUsage {
    /// Storage used.
    pub storage_used: u64,
    /// Storage limit.
    pub storage_limit: u64,
    /// Messages used.
    pub message_used: u64,
    /// Message limit.
    pub message_limit: u64,
}

/// One namespace prefix/delimiter pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceEntry {
    /// Folder name prefix for this namespace.
    pub prefix: String,
    /// Hierarchy delimiter within the namespace.
    pub delimiter: String,
}

/// The three NAMESPACE groups.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Namespaces {
    /// Personal namespaces.
    pub personal: Vec<NamespaceEntry>,
    /// Other users' namespaces.
    pub other_users: Vec<NamespaceEntry>,
    /// Shared namespaces.
    pub shared: Vec<NamespaceEntry>,
}

/// One node of a THREAD reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadNode {
    /// A single message UID.
    Id(u32),
    /// A subtree of related messages.
    Group(Vec<ThreadNode>),
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

    fn atom(s: &str) -> Item {
        Item::Atom(s.to_string())
    }

    fn fetch_unit(pairs: Vec<Item>) -> Response {
        Response {
            tag: "*".to_string(),
            kind: ResponseKind::Untagged,
            status_or_index: "1".to_string(),
            items: vec![
                atom("*"),
                atom("1"),
                atom("FETCH"),
                Item::List(pairs),
            ],
            ..Response::default()
        }
    }

    #[test]
    fn fetch_response_from_valid_unit() {
        let resp = fetch_unit(vec![atom("UID"), atom("42"), atom("FLAGS"), Item::List(vec![])]);
        let fetched = FetchResponse::from_response(&resp).unwrap();
        assert_eq!(fetched.index, 1);
        assert_eq!(fetched.uid(), Some(42));
    }

    #[test]
    fn fetch_value_is_case_insensitive() {
        let resp = fetch_unit(vec![atom("Body[1]"), Item::Literal(b"hi".to_vec())]);
        let fetched = FetchResponse::from_response(&resp).unwrap();
        assert_eq!(
            fetched.value("BODY[1]"),
            Some(&Item::Literal(b"hi".to_vec()))
        );
        assert!(fetched.value("RFC822.SIZE").is_none());
    }

    #[test]
    fn fetch_value_only_matches_key_positions() {
        let resp = fetch_unit(vec![atom("UID"), atom("2"), atom("FLAGS"), atom("x")]);
        let fetched = FetchResponse::from_response(&resp).unwrap();
        assert_eq!(fetched.uid(), Some(2));
        // "2" and "x" sit in value positions and never match as keys
        assert!(fetched.value("2").is_none());
        assert!(fetched.value("x").is_none());
    }

    #[test]
    fn fetch_rejects_malformed_units() {
        let mut resp = fetch_unit(vec![atom("UID"), atom("1")]);
        resp.items[1] = atom("abc");
        assert!(FetchResponse::from_response(&resp).is_none());

        let empty = fetch_unit(vec![]);
        assert!(FetchResponse::from_response(&empty).is_none());

        let mut tagged = fetch_unit(vec![atom("UID"), atom("1")]);
        tagged.kind = ResponseKind::Tagged;
        assert!(FetchResponse::from_response(&tagged).is_none());
    }

    #[test]
    fn folder_inbox_and_attributes() {
        let folder = Folder {
            name: "inbox".to_string(),
            delimiter: "/".to_string(),
            attributes: vec!["\\HasChildren".to_string()],
            status: None,
        };
        assert!(folder.is_inbox());
        assert!(folder.has_attribute("\\haschildren"));
        assert!(!folder.has_attribute("\\Noselect"));
    }
}
