//! Literal sink dispatch for FETCH.
//!
//! Large message bodies arrive as counted literals. Instead of buffering
//! them into the response tree, a caller can register a [`LiteralSink`]
//! per fetch item; the decoder then streams the literal to the sink in
//! bounded chunks. The wire position always advances by exactly the
//! announced byte count: a sink that errors or stops early only changes
//! where the bytes go, never what the parser consumes.

use std::collections::HashMap;
use std::io;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use crate::Result;
use crate::wire::{LITERAL_CHUNK_SIZE, Wire};

/// A normalized FETCH item key.
///
/// Keys are trimmed and uppercased so that lookup is case-insensitive,
/// and `BODY[...]` server replies match sinks registered under the
/// `BODY.PEEK[...]` form they were requested with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchKey(String);

impl FetchKey {
    /// Normalizes a raw fetch item into a key.
    #[must_use]
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_ascii_uppercase())
    }

    /// Returns the normalized key text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `BODY.PEEK` spelling of a plain `BODY` key, if different.
    fn peek_alias(&self) -> Option<Self> {
        if self.0.starts_with("BODY") && !self.0.starts_with("BODY.PEEK") {
            Some(Self(self.0.replacen("BODY", "BODY.PEEK", 1)))
        } else {
            None
        }
    }
}

/// Receives one literal as a sequence of chunks.
///
/// Returning an error from [`chunk`](Self::chunk) stops delivery; the
/// remaining literal bytes are drained and discarded by the dispatcher.
pub trait LiteralSink: Send {
    /// Called once before the first chunk with the surrounding fetch
    /// context and the total literal length.
    fn begin(&mut self, _parent: &str, _key: &str, _len: usize) {}

    /// Delivers the next chunk of literal data.
    ///
    /// # Errors
    ///
    /// Any error aborts delivery for the rest of this literal.
    fn chunk(&mut self, data: &[u8]) -> io::Result<()>;
}

impl<F> LiteralSink for F
where
    F: FnMut(&[u8]) -> io::Result<()> + Send,
{
    fn chunk(&mut self, data: &[u8]) -> io::Result<()> {
        self(data)
    }
}

/// Registered literal sinks for the FETCH in flight.
#[derive(Default)]
pub struct SinkRegistry {
    sinks: HashMap<FetchKey, Box<dyn LiteralSink>>,
}

impl SinkRegistry {
    /// Registers a sink for a fetch item key.
    pub fn insert(&mut self, key: FetchKey, sink: Box<dyn LiteralSink>) {
        self.sinks.insert(key, sink);
    }

    /// Removes all registered sinks.
    pub fn clear(&mut self) {
        self.sinks.clear();
    }

    /// True when no sinks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// The sink for a server-reported key, trying the `BODY.PEEK` alias
    /// first so requests made with PEEK match their plain replies.
    fn resolve(&mut self, key: &FetchKey) -> Option<&mut Box<dyn LiteralSink>> {
        if let Some(alias) = key.peek_alias() {
            if self.sinks.contains_key(&alias) {
                return self.sinks.get_mut(&alias);
            }
        }
        self.sinks.get_mut(key)
    }

    /// Streams a literal of `len` bytes to the matching sink, if any.
    ///
    /// Returns `Ok(false)` without touching the wire when no sink
    /// matches. Otherwise consumes exactly `len` bytes (or as many as the
    /// connection yields): chunks go to the sink until it errors, the
    /// rest is drained and the discard is logged.
    pub(crate) async fn dispatch<S>(
        &mut self,
        wire: &mut Wire<S>,
        parent: &str,
        key: &str,
        len: usize,
    ) -> Result<bool>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if self.sinks.is_empty() {
            return Ok(false);
        }
        let normalized = FetchKey::new(key);
        let Some(sink) = self.resolve(&normalized) else {
            return Ok(false);
        };

        debug!(key = normalized.as_str(), len, "streaming literal to sink");
        sink.begin(parent, normalized.as_str(), len);

        let mut chunk = [0u8; LITERAL_CHUNK_SIZE];
        let mut remaining = len;
        let mut discarded = 0usize;
        let mut delivering = true;
        while remaining > 0 {
            let want = remaining.min(LITERAL_CHUNK_SIZE);
            let n = wire.read_chunk(&mut chunk[..want]).await?;
            if n == 0 {
                warn!(expected = len, remaining, "literal ended early");
                break;
            }
            remaining -= n;
            if delivering {
                if let Err(err) = sink.chunk(&chunk[..n]) {
                    warn!(key = normalized.as_str(), %err, "sink rejected literal chunk");
                    delivering = false;
                    discarded += n;
                }
            } else {
                discarded += n;
            }
        }
        if discarded > 0 {
            warn!(
                key = normalized.as_str(),
                discarded, "discarded undelivered literal bytes"
            );
        }
        Ok(true)
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
    use std::sync::{Arc, Mutex};

    #[test]
    fn key_normalizes_case_and_whitespace() {
        assert_eq!(FetchKey::new(" body[header] ").as_str(), "BODY[HEADER]");
    }

    #[test]
    fn peek_alias_only_for_plain_body() {
        assert_eq!(
            FetchKey::new("BODY[1]").peek_alias().unwrap().as_str(),
            "BODY.PEEK[1]"
        );
        assert!(FetchKey::new("BODY.PEEK[1]").peek_alias().is_none());
        assert!(FetchKey::new("RFC822.SIZE").peek_alias().is_none());
    }

    fn capture_sink(buf: Arc<Mutex<Vec<u8>>>) -> Box<dyn LiteralSink> {
        Box::new(move |data: &[u8]| {
            buf.lock().unwrap().extend_from_slice(data);
            Ok(())
        })
    }

    #[tokio::test]
    async fn dispatch_without_match_leaves_wire_untouched() {
        let mock = tokio_test::io::Builder::new().read(b"12345").build();
        let mut wire = Wire::new(mock);
        let mut registry = SinkRegistry::default();
        let buf = Arc::new(Mutex::new(Vec::new()));
        registry.insert(FetchKey::new("RFC822.HEADER"), capture_sink(buf));
        let routed = registry.dispatch(&mut wire, "", "BODY[1]", 5).await.unwrap();
        assert!(!routed);
        // the literal is still on the wire for the caller to buffer
        let (data, missing) = wire.read_literal(5).await.unwrap();
        assert_eq!(data, b"12345");
        assert_eq!(missing, 0);
    }

    #[tokio::test]
    async fn dispatch_streams_to_matching_sink() {
        let mock = tokio_test::io::Builder::new().read(b"hello").build();
        let mut wire = Wire::new(mock);
        let mut registry = SinkRegistry::default();
        let buf = Arc::new(Mutex::new(Vec::new()));
        registry.insert(FetchKey::new("body[1]"), capture_sink(buf.clone()));
        let routed = registry.dispatch(&mut wire, "FETCH", "BODY[1]", 5).await.unwrap();
        assert!(routed);
        assert_eq!(&*buf.lock().unwrap(), b"hello");
    }

    #[tokio::test]
    async fn dispatch_drains_after_sink_error() {
        let mock = tokio_test::io::Builder::new()
            .read(b"abcdef")
            .read(b"rest of stream")
            .build();
        let mut wire = Wire::new(mock);
        let mut registry = SinkRegistry::default();
        registry.insert(
            FetchKey::new("BODY[]"),
            Box::new(|_: &[u8]| Err(io::Error::other("no thanks"))),
        );
        let routed = registry.dispatch(&mut wire, "", "BODY[]", 6).await.unwrap();
        assert!(routed);
        // exactly six bytes were consumed despite the failing sink
        let (data, missing) = wire.read_literal(14).await.unwrap();
        assert_eq!(data, b"rest of stream");
        assert_eq!(missing, 0);
    }

    #[tokio::test]
    async fn clear_empties_registry() {
        let mut registry = SinkRegistry::default();
        assert!(registry.is_empty());
        registry.insert(FetchKey::new("UID"), Box::new(|_: &[u8]| Ok(())));
        assert!(!registry.is_empty());
        registry.clear();
        assert!(registry.is_empty());
    }
}
