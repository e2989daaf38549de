//! The recursive response decoder.
//!
//! Parsing is driven by an explicit cursor over one owned line buffer:
//! an offset into the current line plus a refill flag set whenever a
//! literal consumes the rest of the line. Nested groups recurse through
//! boxed futures so a literal can be read from the wire mid-branch.

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{error, warn};

use crate::Result;
use crate::sink::SinkRegistry;
use crate::wire::Wire;

use super::{Item, Response, ResponseKind, unescape_quoted};

/// Iteration cap for a single parse branch.
const PARSE_GUARD_LIMIT: u32 = 100_000;

/// Result of parsing one branch: an item list, or flattened text when the
/// branch is part of a larger atom (fetch keys like `BODY[HEADER]`).
enum Branch {
    Items(Vec<Item>),
    Text(String),
}

/// Decodes response units from the wire, one line-plus-literals at a time.
pub(crate) struct Decoder<'a, S> {
    wire: &'a mut Wire<S>,
    sinks: &'a mut SinkRegistry,
    end_tag: String,
    buf: Vec<u8>,
    pos: usize,
    need_next: bool,
}

impl<'a, S> Decoder<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub(crate) fn new(
        wire: &'a mut Wire<S>,
        sinks: &'a mut SinkRegistry,
        end_tag: String,
    ) -> Self {
        Self {
            wire,
            sinks,
            end_tag,
            buf: Vec::new(),
            pos: 0,
            need_next: true,
        }
    }

    /// Reads and parses the next complete response unit.
    pub(crate) async fn read_unit(&mut self) -> Result<Response> {
        self.need_next = true;
        self.pos = 0;
        let mut resp = Response::default();
        if let Branch::Items(items) = self
            .parse_branch(Some(&mut resp), false, String::new(), 0)
            .await?
        {
            resp.items = items;
        }
        Ok(resp)
    }

    /// Content end of the current line, excluding the trailing CRLF.
    fn line_end(&self) -> usize {
        self.buf.len().saturating_sub(2)
    }

    #[allow(clippy::too_many_lines)]
    fn parse_branch<'s>(
        &'s mut self,
        mut resp: Option<&'s mut Response>,
        as_atom: bool,
        parent_atom: String,
        open: u8,
    ) -> Pin<Box<dyn Future<Output = Result<Branch>> + Send + 's>> {
        Box::pin(async move {
            let mut items: Vec<Item> = Vec::new();
            let mut atom_builder: Option<String> = as_atom.then(String::new);
            let mut prev_atom: Option<String> = None;
            let mut first_done = false;
            let mut second_done = false;
            let mut goto_default = false;
            let mut guard: u32 = 0;

            loop {
                guard += 1;
                if guard >= PARSE_GUARD_LIMIT {
                    error!(
                        limit = PARSE_GUARD_LIMIT,
                        "response parsing did not converge, abandoning branch"
                    );
                    break;
                }

                if self.need_next {
                    self.buf = self.wire.read_line().await?;
                    self.pos = 0;
                    self.need_next = false;
                }

                let mut run_default = goto_default;
                goto_default = false;

                if !run_default {
                    if self.pos >= self.line_end() {
                        break;
                    }
                    match self.buf[self.pos] {
                        b')' | b']' => {
                            self.pos += 1;
                            break;
                        }
                        b' ' => {
                            if let Some(ab) = atom_builder.as_mut() {
                                ab.push(' ');
                            }
                            self.pos += 1;
                        }
                        c @ (b'(' | b'[') => {
                            self.pos += 1;
                            let parent = prev_atom
                                .take()
                                .map(|s| s.to_ascii_uppercase())
                                .unwrap_or_default();
                            if as_atom {
                                let text = match self.parse_branch(None, true, parent, c).await? {
                                    Branch::Text(t) => t,
                                    Branch::Items(_) => String::new(),
                                };
                                if let Some(ab) = atom_builder.as_mut() {
                                    ab.push(char::from(c));
                                    ab.push_str(&text);
                                    ab.push(if c == b'(' { ')' } else { ']' });
                                }
                            } else {
                                let sub = match self.parse_branch(None, false, parent, c).await? {
                                    Branch::Items(list) => list,
                                    Branch::Text(_) => Vec::new(),
                                };
                                if let Some(r) = resp.as_deref_mut() {
                                    if r.is_status {
                                        r.optional = Some(sub.clone());
                                        items.push(Item::List(sub));
                                        // the rest of the line is free text
                                        goto_default = true;
                                        continue;
                                    }
                                }
                                items.push(Item::List(sub));
                            }
                        }
                        b'{' => {
                            let mut parsed: Option<(usize, usize)> = None;
                            if let Some(rel) =
                                self.buf[self.pos + 1..].iter().position(|&b| b == b'}')
                            {
                                let close = self.pos + 1 + rel;
                                let digits = &self.buf[self.pos + 1..close];
                                if !digits.is_empty() && digits.iter().all(u8::is_ascii_digit) {
                                    if let Some(len) = std::str::from_utf8(digits)
                                        .ok()
                                        .and_then(|s| s.parse::<usize>().ok())
                                    {
                                        parsed = Some((len, close));
                                    }
                                }
                            }
                            if let Some((len, close)) = parsed {
                                self.pos = close + 1;
                                let key = prev_atom.clone().unwrap_or_default();
                                let routed = self
                                    .sinks
                                    .dispatch(self.wire, &parent_atom, &key, len)
                                    .await?;
                                if routed {
                                    if !as_atom {
                                        items.push(Item::Atom(String::new()));
                                    }
                                } else {
                                    let (data, missing) = self.wire.read_literal(len).await?;
                                    if missing > 0 {
                                        warn!(expected = len, missing, "literal ended early");
                                    }
                                    if as_atom {
                                        if let Some(ab) = atom_builder.as_mut() {
                                            ab.push_str(&String::from_utf8_lossy(&data));
                                        }
                                    } else {
                                        items.push(Item::Literal(data));
                                    }
                                }
                                self.need_next = true;
                            } else {
                                // unparsable literal marker, abandon the line
                                self.pos = self.line_end();
                            }
                            prev_atom = None;
                        }
                        b'"' => {
                            let mut close: Option<usize> = None;
                            let mut i = self.pos + 1;
                            while i < self.buf.len() {
                                if self.buf[i] == b'"' {
                                    let delim_ok = matches!(
                                        self.buf.get(i + 1).copied(),
                                        None | Some(b' ' | b'\r' | b'\n' | b']' | b')')
                                    );
                                    if delim_ok {
                                        // a quote preceded by an odd run of
                                        // backslashes is escaped content
                                        let mut slashes = 0;
                                        while i > self.pos + slashes + 1
                                            && self.buf[i - slashes - 1] == b'\\'
                                        {
                                            slashes += 1;
                                        }
                                        if slashes % 2 == 0 {
                                            close = Some(i);
                                            break;
                                        }
                                    }
                                }
                                i += 1;
                            }
                            if let Some(c) = close {
                                if let Some(ab) = atom_builder.as_mut() {
                                    ab.push_str(&String::from_utf8_lossy(
                                        &self.buf[self.pos..=c],
                                    ));
                                } else {
                                    items.push(Item::Atom(unescape_quoted(
                                        &self.buf[self.pos + 1..c],
                                    )));
                                }
                                self.pos = c + 1;
                            } else {
                                // no closing quote on this line, abandon it
                                self.pos = self.line_end();
                            }
                            prev_atom = None;
                        }
                        _ => run_default = true,
                    }
                    if !run_default {
                        continue;
                    }
                }

                // atom scanning; also the landing point after a status
                // line's response-code block
                let is_status_line = resp.as_deref().is_some_and(|r| r.is_status);
                let mut start = self.pos;
                let last_block: String;
                if is_status_line {
                    let end = self.line_end();
                    while start < end && self.buf[start] == b' ' {
                        start += 1;
                    }
                    self.pos = end;
                    last_block = String::from_utf8_lossy(&self.buf[start..end]).into_owned();
                } else {
                    loop {
                        let end = self.line_end();
                        if self.pos >= end {
                            break;
                        }
                        match self.buf[self.pos] {
                            b'[' => {
                                let ab = atom_builder.get_or_insert_with(String::new);
                                ab.push_str(&String::from_utf8_lossy(
                                    &self.buf[start..=self.pos],
                                ));
                                self.pos += 1;
                                let parent = prev_atom
                                    .clone()
                                    .map(|s| s.to_ascii_uppercase())
                                    .unwrap_or_default();
                                let text =
                                    match self.parse_branch(None, true, parent, b'[').await? {
                                        Branch::Text(t) => t,
                                        Branch::Items(_) => String::new(),
                                    };
                                let ab = atom_builder.get_or_insert_with(String::new);
                                ab.push_str(&text);
                                ab.push(']');
                                start = self.pos;
                            }
                            b' ' => break,
                            b')' if open == b'(' => break,
                            b']' if open == b'[' => break,
                            _ => self.pos += 1,
                        }
                    }
                    last_block =
                        String::from_utf8_lossy(&self.buf[start..self.pos]).into_owned();
                }

                if as_atom {
                    if let Some(ab) = atom_builder.as_mut() {
                        ab.push_str(&last_block);
                    }
                } else if atom_builder.is_some() || !last_block.is_empty() {
                    let full = match atom_builder.take() {
                        Some(mut ab) => {
                            ab.push_str(&last_block);
                            ab
                        }
                        None => last_block.clone(),
                    };
                    items.push(Item::Atom(full.clone()));
                    prev_atom = Some(full.clone());
                    if let Some(r) = resp.as_deref_mut() {
                        if !first_done && items.len() == 1 {
                            first_done = true;
                            r.tag = full;
                            r.kind = classify(&r.tag, &self.end_tag);
                        } else if !second_done && items.len() == 2 {
                            second_done = true;
                            r.status_or_index = full.to_ascii_uppercase();
                            r.is_status = matches!(
                                r.status_or_index.as_str(),
                                "OK" | "NO" | "BAD" | "BYE" | "PREAUTH"
                            );
                        } else if r.kind == ResponseKind::Continuation || r.is_status {
                            r.human_readable = last_block;
                        }
                    }
                }
            }

            if as_atom {
                Ok(Branch::Text(atom_builder.unwrap_or_default()))
            } else {
                Ok(Branch::Items(items))
            }
        })
    }
}

fn classify(tag: &str, end_tag: &str) -> ResponseKind {
    match tag {
        "+" => ResponseKind::Continuation,
        "*" => ResponseKind::Untagged,
        t if t == end_tag => ResponseKind::Tagged,
        _ => ResponseKind::Unknown,
    }
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
    use crate::sink::{FetchKey, LiteralSink};
    use std::io;
    use std::sync::{Arc, Mutex};

    async fn parse(script: &[u8], units: usize) -> Vec<Response> {
        parse_with_sinks(script, units, SinkRegistry::default()).await.0
    }

    async fn parse_with_sinks(
        script: &[u8],
        units: usize,
        mut sinks: SinkRegistry,
    ) -> (Vec<Response>, SinkRegistry) {
        let mock = tokio_test::io::Builder::new().read(script).build();
        let mut wire = Wire::new(mock);
        let mut out = Vec::new();
        {
            let mut dec = Decoder::new(&mut wire, &mut sinks, "TAG1".to_string());
            for _ in 0..units {
                out.push(dec.read_unit().await.unwrap());
            }
        }
        (out, sinks)
    }

    fn atom(s: &str) -> Item {
        Item::Atom(s.to_string())
    }

    #[tokio::test]
    async fn tagged_ok_line() {
        let resp = &parse(b"TAG1 OK CAPABILITY completed\r\n", 1).await[0];
        assert_eq!(resp.tag, "TAG1");
        assert_eq!(resp.kind, ResponseKind::Tagged);
        assert_eq!(resp.status_or_index, "OK");
        assert!(resp.is_status);
        assert_eq!(resp.human_readable, "CAPABILITY completed");
    }

    #[tokio::test]
    async fn untagged_flags_list() {
        let resp = &parse(b"* FLAGS (\\Answered \\Seen)\r\n", 1).await[0];
        assert_eq!(resp.kind, ResponseKind::Untagged);
        assert_eq!(resp.item_atom(1), Some("FLAGS"));
        assert_eq!(
            resp.item_list(2).unwrap(),
            &[atom("\\Answered"), atom("\\Seen")]
        );
    }

    #[tokio::test]
    async fn status_with_response_code() {
        let resp = &parse(b"* OK [UNSEEN 12] Message 12 is first unseen\r\n", 1).await[0];
        assert!(resp.is_status);
        assert_eq!(
            resp.optional.as_deref().unwrap(),
            &[atom("UNSEEN"), atom("12")]
        );
        assert_eq!(resp.human_readable, "Message 12 is first unseen");
    }

    #[tokio::test]
    async fn lowercase_status_is_uppercased() {
        let resp = &parse(b"* ok ready\r\n", 1).await[0];
        assert_eq!(resp.status_or_index, "OK");
        assert!(resp.is_status);
    }

    #[tokio::test]
    async fn quoted_string_with_escapes() {
        let resp = &parse(
            b"* LIST (\\HasNoChildren) \"/\" \"Say \\\"Hi\\\"\"\r\n",
            1,
        )
        .await[0];
        assert_eq!(resp.item_atom(3), Some("/"));
        assert_eq!(resp.item_atom(4), Some("Say \"Hi\""));
    }

    #[tokio::test]
    async fn quote_inside_atomish_text_is_not_closing() {
        // the first inner quote is followed by a letter, so the scan keeps
        // going until a quote with a proper delimiter after it
        let resp = &parse(b"* LIST () \".\" \"a\\\"b\"\r\n", 1).await[0];
        assert_eq!(resp.item_atom(4), Some("a\"b"));
    }

    #[tokio::test]
    async fn literal_is_buffered_into_tree() {
        let resp = &parse(b"* 1 FETCH (BODY[1] {5}\r\nhello UID 7)\r\n", 1).await[0];
        assert_eq!(resp.item_atom(2), Some("FETCH"));
        let list = resp.item_list(3).unwrap();
        assert_eq!(list[0], atom("BODY[1]"));
        assert_eq!(list[1], Item::Literal(b"hello".to_vec()));
        assert_eq!(list[2], atom("UID"));
        assert_eq!(list[3], atom("7"));
    }

    #[tokio::test]
    async fn literal_at_line_end_continues_on_next_line() {
        let resp = &parse(b"* 1 FETCH (BODY[] {4}\r\nbody)\r\n", 1).await[0];
        let list = resp.item_list(3).unwrap();
        assert_eq!(list[0], atom("BODY[]"));
        assert_eq!(list[1], Item::Literal(b"body".to_vec()));
    }

    #[tokio::test]
    async fn continuation_line() {
        let resp = &parse(b"+ aGVsbG8=\r\n", 1).await[0];
        assert_eq!(resp.kind, ResponseKind::Continuation);
        assert_eq!(resp.item_atom(1), Some("aGVsbG8="));
    }

    #[tokio::test]
    async fn unknown_tag_is_classified() {
        let resp = &parse(b"XYZ OK done\r\n", 1).await[0];
        assert_eq!(resp.kind, ResponseKind::Unknown);
    }

    #[tokio::test]
    async fn nested_thread_lists() {
        let resp = &parse(b"* THREAD (2)(3 6 (4 23)(44 7 96))\r\n", 1).await[0];
        assert_eq!(resp.item_list(2).unwrap(), &[atom("2")]);
        let second = resp.item_list(3).unwrap();
        assert_eq!(second[0], atom("3"));
        assert_eq!(second[1], atom("6"));
        assert_eq!(
            second[2],
            Item::List(vec![atom("4"), atom("23")])
        );
        assert_eq!(
            second[3],
            Item::List(vec![atom("44"), atom("7"), atom("96")])
        );
    }

    #[tokio::test]
    async fn multiple_units_in_sequence() {
        let script = b"* 3 EXISTS\r\n* 0 RECENT\r\nTAG1 OK done\r\n";
        let units = parse(script, 3).await;
        assert_eq!(units[0].status_or_index, "3");
        assert_eq!(units[0].item_atom(2), Some("EXISTS"));
        assert_eq!(units[1].status_or_index, "0");
        assert_eq!(units[2].kind, ResponseKind::Tagged);
    }

    struct Capture {
        data: Arc<Mutex<Vec<u8>>>,
        fail_after: Option<usize>,
    }

    impl LiteralSink for Capture {
        fn chunk(&mut self, data: &[u8]) -> io::Result<()> {
            let mut buf = self.data.lock().unwrap();
            if let Some(limit) = self.fail_after {
                if buf.len() + data.len() > limit {
                    return Err(io::Error::other("stopped"));
                }
            }
            buf.extend_from_slice(data);
            Ok(())
        }
    }

    #[tokio::test]
    async fn literal_routed_to_sink_leaves_placeholder() {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let mut sinks = SinkRegistry::default();
        sinks.insert(
            FetchKey::new("BODY[1]"),
            Box::new(Capture {
                data: captured.clone(),
                fail_after: None,
            }),
        );
        let script = b"* 1 FETCH (BODY[1] {5}\r\nhello UID 7)\r\nTAG1 OK done\r\n";
        let (units, _) = parse_with_sinks(script, 2, sinks).await;
        let list = units[0].item_list(3).unwrap();
        assert_eq!(list[1], atom(""));
        assert_eq!(list[2], atom("UID"));
        assert_eq!(list[3], atom("7"));
        assert_eq!(&*captured.lock().unwrap(), b"hello");
    }

    #[tokio::test]
    async fn failing_sink_still_advances_past_literal() {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let mut sinks = SinkRegistry::default();
        sinks.insert(
            FetchKey::new("BODY[]"),
            Box::new(Capture {
                data: captured.clone(),
                fail_after: Some(0),
            }),
        );
        // the sink rejects everything; the parser must still consume all
        // five literal bytes and resume cleanly at " UID 7)"
        let script = b"* 1 FETCH (BODY[] {5}\r\nhello UID 7)\r\nTAG1 OK done\r\n";
        let (units, _) = parse_with_sinks(script, 2, sinks).await;
        let list = units[0].item_list(3).unwrap();
        assert_eq!(list[2], atom("UID"));
        assert_eq!(list[3], atom("7"));
        assert!(captured.lock().unwrap().is_empty());
        assert_eq!(units[1].kind, ResponseKind::Tagged);
    }

    #[tokio::test]
    async fn peek_alias_matches_plain_body_key() {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let mut sinks = SinkRegistry::default();
        // registered under BODY.PEEK, the server answers with BODY
        sinks.insert(
            FetchKey::new("BODY.PEEK[1]"),
            Box::new(Capture {
                data: captured.clone(),
                fail_after: None,
            }),
        );
        let script = b"* 1 FETCH (BODY[1] {2}\r\nok)\r\nTAG1 OK done\r\n";
        let (_, _) = parse_with_sinks(script, 2, sinks).await;
        assert_eq!(&*captured.lock().unwrap(), b"ok");
    }
}
