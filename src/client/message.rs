//! Message operations on the selected folder.

use std::collections::HashMap;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use crate::command::{self, Param};
use crate::parser::{Item, Response, ResponseKind};
use crate::sink::{FetchKey, LiteralSink};
use crate::types::{FetchResponse, NamespaceEntry, Namespaces, QuotaUsage, ThreadNode};
use crate::{Error, Result};

use super::ImapClient;

/// Keys an ESEARCH/ESORT result map may carry.
const ESEARCH_KEYS: [&str; 4] = ["ALL", "MIN", "MAX", "COUNT"];

/// One requested FETCH data item.
pub enum FetchItem {
    /// Buffer the value into the response tree.
    Plain(String),
    /// Stream the value's literal to a sink instead of buffering it.
    Streamed {
        /// The data item as sent in the request (e.g. `BODY.PEEK[1]`).
        key: String,
        /// Receives the literal chunks.
        sink: Box<dyn LiteralSink>,
    },
}

impl FetchItem {
    /// A buffered data item.
    pub fn plain(key: impl Into<String>) -> Self {
        Self::Plain(key.into())
    }

    /// A streamed data item.
    pub fn streamed(key: impl Into<String>, sink: Box<dyn LiteralSink>) -> Self {
        Self::Streamed {
            key: key.into(),
            sink,
        }
    }
}

impl<S> ImapClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Runs a legacy SEARCH and returns the matching ids.
    ///
    /// Criteria may embed synchronizing literals (`{n}\r\ndata`); the
    /// request is then sent one literal part at a time, each following a
    /// server continuation, until the tagged completion arrives. The
    /// collected id list is reversed, which assumes servers emit
    /// newest-first; this is a compatibility behavior, not a protocol
    /// guarantee.
    pub async fn search(&mut self, criteria: &str, is_uid: bool) -> Result<Vec<u32>> {
        let criteria = normalized_criteria(criteria);
        let command = if is_uid { "UID SEARCH" } else { "SEARCH" };
        let remainder = self
            .send_request(command, &[Param::raw(criteria)], true)
            .await?;

        let tag = self.current_tag();
        let mut batch = self.read_batch(&tag, false).await?;
        let mut pending = remainder;
        while let Some(rest) = pending.take() {
            if !batch
                .last()
                .is_some_and(|r| r.kind == ResponseKind::Continuation)
            {
                break;
            }
            match command::split_on_literal(&rest) {
                Some((part, more)) => {
                    self.wire.write_raw(part.as_bytes()).await?;
                    pending = Some(more.to_string());
                }
                None => self.wire.write_line(rest.as_bytes()).await?,
            }
            batch = self.read_batch(&tag, false).await?;
        }
        let batch = Self::validate(batch)?;

        let mut ids = collect_simple_ids(&batch, "SEARCH", is_uid);
        ids.reverse();
        Ok(ids)
    }

    /// Runs a server-side SORT (capability gated).
    pub async fn sort(
        &mut self,
        sort_types: &[&str],
        criteria: &str,
        is_uid: bool,
    ) -> Result<Vec<u32>> {
        if sort_types.is_empty() {
            return Err(Error::InvalidArgument("no sort criteria".to_string()));
        }
        if !self.is_supported("SORT").await? {
            return Err(Error::Unsupported("SORT".to_string()));
        }
        let criteria = normalized_criteria(criteria);
        let command = if is_uid { "UID SORT" } else { "SORT" };
        let params = [
            Param::List(sort_types.iter().map(|t| Param::raw(*t)).collect()),
            Param::raw("UTF-8"),
            Param::raw(criteria),
        ];
        let batch = self.send_request_checked(command, &params, false).await?;
        Ok(collect_simple_ids(&batch, "SORT", is_uid))
    }

    /// Runs SEARCH with RETURN options (ESEARCH capability gated) and
    /// returns the result map keyed ALL/MIN/MAX/COUNT.
    pub async fn esearch(
        &mut self,
        criteria: &str,
        return_options: &[&str],
        is_uid: bool,
    ) -> Result<HashMap<String, String>> {
        if !self.is_supported("ESEARCH").await? {
            return Err(Error::Unsupported("ESEARCH".to_string()));
        }
        self.esearch_or_esort(None, criteria, return_options, is_uid)
            .await
    }

    /// Runs SORT with RETURN options (ESORT capability gated).
    pub async fn esort(
        &mut self,
        sort_types: &[&str],
        criteria: &str,
        return_options: &[&str],
        is_uid: bool,
    ) -> Result<HashMap<String, String>> {
        if sort_types.is_empty() {
            return Err(Error::InvalidArgument("no sort criteria".to_string()));
        }
        if !self.is_supported("ESORT").await? {
            return Err(Error::Unsupported("ESORT".to_string()));
        }
        self.esearch_or_esort(Some(sort_types), criteria, return_options, is_uid)
            .await
    }

    async fn esearch_or_esort(
        &mut self,
        sort_types: Option<&[&str]>,
        criteria: &str,
        return_options: &[&str],
        is_uid: bool,
    ) -> Result<HashMap<String, String>> {
        let criteria = normalized_criteria(criteria);
        let base = if sort_types.is_some() {
            "SORT"
        } else {
            "SEARCH"
        };
        let command = if is_uid {
            format!("UID {base}")
        } else {
            base.to_string()
        };

        // RETURN options come right after the command word; the sort
        // criteria list and charset follow for SORT
        let mut params = vec![Param::raw("RETURN")];
        if return_options.is_empty() {
            params.push(Param::List(vec![Param::raw("ALL")]));
        } else {
            params.push(Param::List(
                return_options.iter().map(|o| Param::raw(*o)).collect(),
            ));
        }
        if let Some(types) = sort_types {
            params.push(Param::List(types.iter().map(|t| Param::raw(*t)).collect()));
            params.push(Param::raw("UTF-8"));
        }
        params.push(Param::raw(criteria));

        let batch = self.send_request_checked(&command, &params, false).await?;
        let tag = self.current_tag();
        Ok(collect_esearch(&batch, &tag))
    }

    /// Runs THREAD with the best advertised algorithm (REFS, then
    /// REFERENCES, then ORDEREDSUBJECT). Malformed nodes are dropped.
    pub async fn thread(&mut self, criteria: &str, is_uid: bool) -> Result<Vec<ThreadNode>> {
        let mut algorithm = None;
        for candidate in ["REFS", "REFERENCES", "ORDEREDSUBJECT"] {
            if self.is_supported(&format!("THREAD={candidate}")).await? {
                algorithm = Some(candidate);
                break;
            }
        }
        let Some(algorithm) = algorithm else {
            return Err(Error::Unsupported("THREAD".to_string()));
        };

        let criteria = normalized_criteria(criteria);
        let command = if is_uid { "UID THREAD" } else { "THREAD" };
        let params = [
            Param::raw(algorithm),
            Param::raw("UTF-8"),
            Param::raw(criteria),
        ];
        let batch = self.send_request_checked(command, &params, false).await?;

        let mut nodes = Vec::new();
        for unit in batch.iter().filter(|u| u.is_untagged()) {
            if let Some(start) = data_start(unit, "THREAD", is_uid) {
                nodes.extend(unit.items[start..].iter().filter_map(validate_thread_item));
            }
        }
        Ok(nodes)
    }

    /// Fetches data items for a message range.
    ///
    /// Streamed items register their sinks before the request goes out;
    /// the registry is cleared unconditionally afterwards, success or
    /// not. Units that do not form a well-formed FETCH reply are skipped.
    pub async fn fetch(
        &mut self,
        items: Vec<FetchItem>,
        range: &str,
        is_uid: bool,
    ) -> Result<Vec<FetchResponse>> {
        let range = range.trim();
        if range.is_empty() || items.is_empty() {
            return Err(Error::InvalidArgument(
                "FETCH requires a range and at least one item".to_string(),
            ));
        }

        let mut keys = Vec::with_capacity(items.len());
        for item in items {
            match item {
                FetchItem::Plain(key) => keys.push(Param::raw(key)),
                FetchItem::Streamed { key, sink } => {
                    self.sinks.insert(FetchKey::new(&key), sink);
                    keys.push(Param::raw(key));
                }
            }
        }

        let command = if is_uid { "UID FETCH" } else { "FETCH" };
        let result = self
            .send_request_checked(command, &[Param::raw(range), Param::List(keys)], false)
            .await;
        self.sinks.clear();
        let batch = result?;

        let mut fetched = Vec::new();
        for unit in batch.iter().filter(|u| u.is_untagged()) {
            let mentions_fetch = unit
                .items
                .iter()
                .take(4)
                .any(|i| i.as_atom().is_some_and(|a| a.eq_ignore_ascii_case("FETCH")));
            if !mentions_fetch {
                continue;
            }
            match FetchResponse::from_response(unit) {
                Some(one) => fetched.push(one),
                None => debug!("skipping malformed FETCH unit"),
            }
        }
        Ok(fetched)
    }

    /// Applies a flag change (`FLAGS`, `+FLAGS.SILENT`, ...) to a range.
    pub async fn store(
        &mut self,
        range: &str,
        is_uid: bool,
        action: &str,
        flags: &[&str],
    ) -> Result<()> {
        let range = range.trim();
        let action = action.trim();
        if range.is_empty() || action.is_empty() || flags.is_empty() {
            return Err(Error::InvalidArgument(
                "STORE requires a range, an action, and flags".to_string(),
            ));
        }
        let command = if is_uid { "UID STORE" } else { "STORE" };
        let params = [
            Param::raw(range),
            Param::raw(action),
            Param::List(flags.iter().map(|f| Param::raw(*f)).collect()),
        ];
        self.send_request_checked(command, &params, false).await?;
        Ok(())
    }

    /// Copies a message range into another folder.
    pub async fn copy(&mut self, range: &str, folder: &str, is_uid: bool) -> Result<()> {
        self.transfer("COPY", range, folder, is_uid).await
    }

    /// Moves a message range into another folder (MOVE capability gated).
    pub async fn move_(&mut self, range: &str, folder: &str, is_uid: bool) -> Result<()> {
        if !self.is_supported("MOVE").await? {
            return Err(Error::Unsupported("MOVE".to_string()));
        }
        self.transfer("MOVE", range, folder, is_uid).await
    }

    async fn transfer(
        &mut self,
        base: &str,
        range: &str,
        folder: &str,
        is_uid: bool,
    ) -> Result<()> {
        let range = range.trim();
        if range.is_empty() || folder.is_empty() {
            return Err(Error::InvalidArgument(
                "transfer requires a range and a folder".to_string(),
            ));
        }
        let command = if is_uid {
            format!("UID {base}")
        } else {
            base.to_string()
        };
        self.send_request_checked(&command, &[Param::raw(range), Param::quoted(folder)], false)
            .await?;
        Ok(())
    }

    /// Expunges deleted messages. With a UID range and UIDPLUS support,
    /// only that range is expunged.
    pub async fn expunge(&mut self, uid_range: Option<&str>) -> Result<()> {
        let range = uid_range.map(str::trim).filter(|r| !r.is_empty());
        if let Some(range) = range {
            if self.is_supported("UIDPLUS").await? {
                self.send_request_checked("UID EXPUNGE", &[Param::raw(range)], false)
                    .await?;
                return Ok(());
            }
        }
        self.send_request_checked("EXPUNGE", &[], false).await?;
        Ok(())
    }

    /// Appends a message streamed from `source` (`size` bytes) to a
    /// folder. Returns the new UID when the server reports APPENDUID.
    pub async fn append<R>(
        &mut self,
        folder: &str,
        source: &mut R,
        size: usize,
        flags: Option<&[&str]>,
        internal_date: Option<&str>,
    ) -> Result<Option<u32>>
    where
        R: AsyncRead + Unpin,
    {
        if folder.is_empty() {
            return Err(Error::InvalidArgument("empty folder name".to_string()));
        }

        let mut params = vec![Param::quoted(folder)];
        if let Some(flags) = flags {
            params.push(Param::List(flags.iter().map(|f| Param::raw(*f)).collect()));
        }
        if let Some(date) = internal_date {
            params.push(Param::quoted(date));
        }
        params.push(Param::raw(format!("{{{size}}}")));

        self.send_request("APPEND", &params, false).await?;
        let tag = self.current_tag();
        let batch = Self::validate(self.read_batch(&tag, false).await?)?;
        if !batch
            .last()
            .is_some_and(|r| r.kind == ResponseKind::Continuation)
        {
            return Err(Error::Protocol(
                "expected continuation before APPEND literal".to_string(),
            ));
        }

        let written = self.wire.write_stream(source).await?;
        if written != size as u64 {
            warn!(announced = size, written, "APPEND body size mismatch");
        }
        self.wire.write_line(b"").await?;

        let batch = Self::validate(self.read_batch(&tag, false).await?)?;
        Ok(extract_append_uid(&batch))
    }

    /// Reads quota usage via GETQUOTAROOT, or `None` when the server
    /// does not support QUOTA.
    pub async fn quota(&mut self) -> Result<Option<QuotaUsage>> {
        if !self.is_supported("QUOTA").await? {
            return Ok(None);
        }
        let batch = self
            .send_request_checked("GETQUOTAROOT", &[Param::quoted("INBOX")], false)
            .await?;
        Ok(Some(collect_quota(&batch)))
    }

    /// Reads the server's namespaces, or `None` when the server does not
    /// support NAMESPACE.
    pub async fn namespace(&mut self) -> Result<Option<Namespaces>> {
        if !self.is_supported("NAMESPACE").await? {
            return Ok(None);
        }
        let batch = self.send_request_checked("NAMESPACE", &[], false).await?;
        let spaces = batch
            .iter()
            .filter(|u| u.is_untagged())
            .find(|u| {
                u.item_atom(1)
                    .is_some_and(|a| a.eq_ignore_ascii_case("NAMESPACE"))
            })
            .map(|unit| Namespaces {
                personal: namespace_entries(unit.items.get(2)),
                other_users: namespace_entries(unit.items.get(3)),
                shared: namespace_entries(unit.items.get(4)),
            })
            .unwrap_or_default();
        Ok(Some(spaces))
    }
}

fn normalized_criteria(criteria: &str) -> &str {
    let trimmed = criteria.trim();
    if trimmed.is_empty() { "ALL" } else { criteria }
}

/// Start of the id payload in an untagged unit for `command`, handling
/// both `* SEARCH ...` and the `* UID SEARCH ...` spelling.
fn data_start(unit: &Response, command: &str, is_uid: bool) -> Option<usize> {
    if unit
        .item_atom(1)
        .is_some_and(|a| a.eq_ignore_ascii_case(command))
    {
        return Some(2);
    }
    if is_uid
        && unit
            .item_atom(1)
            .is_some_and(|a| a.eq_ignore_ascii_case("UID"))
        && unit
            .item_atom(2)
            .is_some_and(|a| a.eq_ignore_ascii_case(command))
    {
        return Some(3);
    }
    None
}

fn collect_simple_ids(batch: &[Response], command: &str, is_uid: bool) -> Vec<u32> {
    let mut ids = Vec::new();
    for unit in batch.iter().filter(|u| u.is_untagged()) {
        if let Some(start) = data_start(unit, command, is_uid) {
            ids.extend(
                unit.items[start..]
                    .iter()
                    .filter_map(Item::as_atom)
                    .filter_map(|a| a.parse::<u32>().ok()),
            );
        }
    }
    ids
}

/// Collects the result map from `* ESEARCH (TAG "...") ...` units whose
/// correlator matches our own tag.
fn collect_esearch(batch: &[Response], tag: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for unit in batch.iter().filter(|u| u.is_untagged()) {
        if !unit
            .item_atom(1)
            .is_some_and(|a| a.eq_ignore_ascii_case("ESEARCH"))
        {
            continue;
        }
        let correlated = unit.item_list(2).is_some_and(|pair| {
            pair.first()
                .and_then(Item::as_atom)
                .is_some_and(|a| a.eq_ignore_ascii_case("TAG"))
                && pair
                    .get(1)
                    .and_then(Item::as_text)
                    .is_some_and(|t| t == tag)
        });
        if !correlated {
            continue;
        }
        // scan item by item: UID responses carry a marker atom before
        // the first key, so fixed pair parity cannot be assumed
        let mut i = 3;
        while i < unit.items.len() {
            let key = unit.items[i]
                .as_atom()
                .map(str::to_ascii_uppercase)
                .filter(|k| ESEARCH_KEYS.contains(&k.as_str()));
            if let Some(key) = key {
                if let Some(value) = unit.items.get(i + 1).and_then(Item::as_atom) {
                    map.insert(key, value.to_string());
                }
                i += 2;
            } else {
                i += 1;
            }
        }
    }
    map
}

/// Validates one THREAD node: positive ids stay, single-child groups
/// collapse, empty or malformed nodes are dropped.
fn validate_thread_item(item: &Item) -> Option<ThreadNode> {
    match item {
        Item::Atom(a) => a.parse::<u32>().ok().filter(|n| *n > 0).map(ThreadNode::Id),
        Item::Literal(_) => None,
        Item::List(list) => {
            let mut children: Vec<ThreadNode> =
                list.iter().filter_map(validate_thread_item).collect();
            match children.len() {
                0 => None,
                1 => children.pop(),
                _ => Some(ThreadNode::Group(children)),
            }
        }
    }
}

fn extract_append_uid(batch: &[Response]) -> Option<u32> {
    let last = batch.last()?;
    if last.kind != ResponseKind::Tagged || last.optional_code().as_deref() != Some("APPENDUID") {
        return None;
    }
    last.optional
        .as_deref()?
        .get(2)
        .and_then(Item::as_atom)
        .and_then(|a| a.parse().ok())
}

fn collect_quota(batch: &[Response]) -> QuotaUsage {
    let mut usage = QuotaUsage::default();
    for unit in batch.iter().filter(|u| u.is_untagged()) {
        if !unit
            .item_atom(1)
            .is_some_and(|a| a.eq_ignore_ascii_case("QUOTA"))
        {
            continue;
        }
        let Some(triples) = unit.item_list(3) else {
            continue;
        };
        let mut i = 0;
        while i + 2 < triples.len() {
            let Some(resource) = triples.get(i).and_then(Item::as_atom) else {
                break;
            };
            let used = triples
                .get(i + 1)
                .and_then(Item::as_atom)
                .and_then(|a| a.parse().ok())
                .unwrap_or(0);
            let limit = triples
                .get(i + 2)
                .and_then(Item::as_atom)
                .and_then(|a| a.parse().ok())
                .unwrap_or(0);
            match resource.to_ascii_uppercase().as_str() {
                "STORAGE" => {
                    usage.storage_used = used;
                    usage.storage_limit = limit;
                }
                "MESSAGE" => {
                    usage.message_used = used;
                    usage.message_limit = limit;
                }
                _ => {}
            }
            i += 3;
        }
    }
    usage
}

fn namespace_entries(item: Option<&Item>) -> Vec<NamespaceEntry> {
    let Some(Item::List(groups)) = item else {
        return Vec::new();
    };
    groups
        .iter()
        .filter_map(Item::as_list)
        .filter_map(|pair| {
            Some(NamespaceEntry {
                prefix: pair.first()?.as_text()?.into_owned(),
                delimiter: pair.get(1)?.as_text()?.into_owned(),
            })
        })
        .collect()
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

    fn untagged(items: Vec<Item>) -> Response {
        Response {
            tag: "*".to_string(),
            kind: ResponseKind::Untagged,
            items,
            ..Response::default()
        }
    }

    #[test]
    fn simple_ids_from_search_unit() {
        let batch = vec![untagged(vec![
            atom("*"),
            atom("SEARCH"),
            atom("5"),
            atom("4"),
            atom("junk"),
            atom("2"),
        ])];
        assert_eq!(collect_simple_ids(&batch, "SEARCH", false), vec![5, 4, 2]);
    }

    #[test]
    fn simple_ids_from_uid_spelling() {
        let batch = vec![untagged(vec![
            atom("*"),
            atom("UID"),
            atom("SEARCH"),
            atom("7"),
        ])];
        assert_eq!(collect_simple_ids(&batch, "SEARCH", true), vec![7]);
        // without the uid flag the spelling does not match
        assert!(collect_simple_ids(&batch, "SEARCH", false).is_empty());
    }

    #[test]
    fn esearch_map_requires_matching_tag() {
        let unit = untagged(vec![
            atom("*"),
            atom("ESEARCH"),
            Item::List(vec![atom("TAG"), atom("TAG3")]),
            atom("MIN"),
            atom("2"),
            atom("COUNT"),
            atom("10"),
            atom("BOGUS"),
            atom("1"),
        ]);
        let map = collect_esearch(&[unit.clone()], "TAG3");
        assert_eq!(map.get("MIN").unwrap(), "2");
        assert_eq!(map.get("COUNT").unwrap(), "10");
        assert!(!map.contains_key("BOGUS"));

        assert!(collect_esearch(&[unit], "TAG4").is_empty());
    }

    #[test]
    fn esearch_map_skips_uid_marker() {
        let unit = untagged(vec![
            atom("*"),
            atom("ESEARCH"),
            Item::List(vec![atom("TAG"), atom("TAG1")]),
            atom("UID"),
            atom("ALL"),
            atom("2:4"),
            atom("COUNT"),
            atom("3"),
        ]);
        let map = collect_esearch(&[unit], "TAG1");
        assert_eq!(map.get("ALL").unwrap(), "2:4");
        assert_eq!(map.get("COUNT").unwrap(), "3");
    }

    #[test]
    fn thread_nodes_validate_recursively() {
        let item = Item::List(vec![
            atom("3"),
            atom("6"),
            Item::List(vec![atom("4"), atom("23")]),
            Item::List(vec![atom("0"), atom("nope")]),
        ]);
        let node = validate_thread_item(&item).unwrap();
        let ThreadNode::Group(children) = node else {
            panic!("expected a group");
        };
        assert_eq!(children[0], ThreadNode::Id(3));
        assert_eq!(children[1], ThreadNode::Id(6));
        assert_eq!(
            children[2],
            ThreadNode::Group(vec![ThreadNode::Id(4), ThreadNode::Id(23)])
        );
        // the all-invalid sublist was dropped entirely
        assert_eq!(children.len(), 3);
    }

    #[test]
    fn thread_single_member_group_collapses() {
        let item = Item::List(vec![Item::List(vec![atom("9")])]);
        assert_eq!(validate_thread_item(&item), Some(ThreadNode::Id(9)));
    }

    #[test]
    fn append_uid_from_tagged_code() {
        let last = Response {
            tag: "TAG2".to_string(),
            kind: ResponseKind::Tagged,
            status_or_index: "OK".to_string(),
            is_status: true,
            optional: Some(vec![atom("APPENDUID"), atom("38505"), atom("3955")]),
            ..Response::default()
        };
        assert_eq!(extract_append_uid(&[last]), Some(3955));
    }

    #[test]
    fn append_uid_absent_without_code() {
        let last = Response {
            tag: "TAG2".to_string(),
            kind: ResponseKind::Tagged,
            status_or_index: "OK".to_string(),
            is_status: true,
            ..Response::default()
        };
        assert_eq!(extract_append_uid(&[last]), None);
    }

    #[test]
    fn quota_storage_and_message_roots() {
        let unit = untagged(vec![
            atom("*"),
            atom("QUOTA"),
            atom(""),
            Item::List(vec![
                atom("STORAGE"),
                atom("10"),
                atom("512"),
                atom("MESSAGE"),
                atom("20"),
                atom("5000"),
            ]),
        ]);
        let usage = collect_quota(&[unit]);
        assert_eq!(usage.storage_used, 10);
        assert_eq!(usage.storage_limit, 512);
        assert_eq!(usage.message_used, 20);
        assert_eq!(usage.message_limit, 5000);
    }

    #[test]
    fn namespace_groups_parse_and_nil_is_empty() {
        let unit = untagged(vec![
            atom("*"),
            atom("NAMESPACE"),
            Item::List(vec![Item::List(vec![atom(""), atom("/")])]),
            atom("NIL"),
            Item::List(vec![Item::List(vec![
                atom("#shared/"),
                atom("/"),
            ])]),
        ]);
        let personal = namespace_entries(unit.items.get(2));
        assert_eq!(personal.len(), 1);
        assert_eq!(personal[0].prefix, "");
        assert_eq!(personal[0].delimiter, "/");
        assert!(namespace_entries(unit.items.get(3)).is_empty());
        let shared = namespace_entries(unit.items.get(4));
        assert_eq!(shared[0].prefix, "#shared/");
    }

    #[test]
    fn empty_criteria_defaults_to_all() {
        assert_eq!(normalized_criteria("  "), "ALL");
        assert_eq!(normalized_criteria("UNSEEN"), "UNSEEN");
    }
}
