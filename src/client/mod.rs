//! The IMAP client: command pipeline and connection state.
//!
//! [`ImapClient`] owns the wire, the tag sequence, the capability cache,
//! and the selected-folder snapshot. Every operation goes through the
//! same three steps: render and send a tagged command, read response
//! units until the matching tag (or a continuation request), and judge
//! the terminal unit.

mod auth;
mod folder;
mod message;

pub use auth::{AuthState, LoginOptions};
pub use message::FetchItem;

use std::collections::{HashMap, HashSet};
use std::io;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::command::{self, Param, TagSequence};
use crate::parser::{Decoder, Item, Response, ResponseKind};
use crate::sink::SinkRegistry;
use crate::types::FolderInformation;
use crate::wire::{self, ImapStream, Wire};
use crate::{Error, Result};

/// Connection security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// TLS from the first byte (usually port 993).
    #[default]
    Implicit,
    /// Plaintext connect, STARTTLS required.
    StartTls,
    /// Plaintext connect, upgraded when the server advertises STARTTLS.
    Auto,
    /// Plaintext throughout.
    Plaintext,
}

/// Default limit for connection establishment.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings.
#[derive(Debug, Clone)]
pub struct Config {
    host: String,
    port: u16,
    security: Security,
    connect_timeout: Duration,
}

impl Config {
    /// Creates a config with implicit TLS.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            security: Security::Implicit,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    /// Sets the limit for TCP connect and the initial TLS handshake.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Server host name.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Server port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }
}

/// An IMAP client over any async stream.
pub struct ImapClient<S> {
    wire: Wire<S>,
    tags: TagSequence,
    tag_times: HashMap<String, Instant>,
    capabilities: Option<HashSet<String>>,
    folder: Option<FolderInformation>,
    last_batch: Vec<Response>,
    sinks: SinkRegistry,
    auth: AuthState,
    login_user: Option<String>,
    /// When set, EXAMINE requests are issued as SELECT.
    pub force_select_on_examine: bool,
}

impl ImapClient<ImapStream> {
    /// Connects to a server, reads the greeting, and negotiates STARTTLS
    /// according to the security mode.
    pub async fn connect(config: &Config) -> Result<Self> {
        let stream = tokio::time::timeout(config.connect_timeout, async {
            match config.security {
                Security::Implicit => wire::connect_tls(&config.host, config.port).await,
                Security::StartTls | Security::Auto | Security::Plaintext => {
                    wire::connect_plain(&config.host, config.port).await
                }
            }
        })
        .await
        .map_err(|_| Error::Io(io::Error::new(io::ErrorKind::TimedOut, "connect timed out")))??;
        let mut client = Self::from_stream(stream).await?;

        let upgrade = match config.security {
            Security::StartTls => {
                if !client.is_supported("STARTTLS").await? {
                    return Err(Error::Unsupported("STARTTLS".to_string()));
                }
                true
            }
            Security::Auto => client.is_supported("STARTTLS").await?,
            Security::Implicit | Security::Plaintext => false,
        };
        if upgrade {
            client.request_starttls().await?;
            client = client.into_tls(&config.host).await?;
        }
        Ok(client)
    }

    /// Performs the TLS handshake on the already-connected stream.
    async fn into_tls(self, host: &str) -> Result<Self> {
        let Self {
            wire,
            tags,
            tag_times,
            capabilities,
            folder,
            last_batch,
            sinks,
            auth,
            login_user,
            force_select_on_examine,
        } = self;
        let stream = wire.into_inner().upgrade_to_tls(host).await?;
        Ok(Self {
            wire: Wire::new(stream),
            tags,
            tag_times,
            capabilities,
            folder,
            last_batch,
            sinks,
            auth,
            login_user,
            force_select_on_examine,
        })
    }
}

impl<S> ImapClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps an established stream and consumes the server greeting.
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut client = Self {
            wire: Wire::new(stream),
            tags: TagSequence::new(),
            tag_times: HashMap::new(),
            capabilities: None,
            folder: None,
            last_batch: Vec::new(),
            sinks: SinkRegistry::default(),
            auth: AuthState::Unauthenticated,
            login_user: None,
            force_select_on_examine: false,
        };
        let greeting = client.read_batch("*", true).await?;
        Self::validate(greeting)?;
        Ok(client)
    }

    /// Sends a tagged command.
    ///
    /// With `break_on_literal` set and a synchronizing literal in the
    /// rendered line, only the part up to the literal marker is sent and
    /// the remainder is returned for delivery after the continuation.
    pub(crate) async fn send_request(
        &mut self,
        command: &str,
        params: &[Param],
        break_on_literal: bool,
    ) -> Result<Option<String>> {
        let command = command.trim();
        if command.is_empty() {
            return Err(Error::InvalidArgument("empty command".to_string()));
        }

        let tag = self.tags.next_tag();
        self.tag_times.insert(tag.clone(), Instant::now());
        let line = command::render_request(&tag, command, params);

        match command::redact_params(command, params) {
            Some(masked) => {
                debug!(command = %command::render_request(&tag, command, &masked), "sending");
            }
            None => debug!(command = %line, "sending"),
        }

        if break_on_literal {
            if let Some((prefix, rest)) = command::split_on_literal(&line) {
                self.wire.write_raw(prefix.as_bytes()).await?;
                return Ok(Some(rest.to_string()));
            }
        }
        self.wire.write_line(line.as_bytes()).await?;
        Ok(None)
    }

    /// Reads response units until the end tag or a continuation request.
    ///
    /// Capability advertisements are absorbed into the cache when
    /// `find_capa` is set. A unit whose tag matches nothing aborts with
    /// an invalid-response error.
    pub(crate) async fn read_batch(
        &mut self,
        end_tag: &str,
        find_capa: bool,
    ) -> Result<Vec<Response>> {
        let mut batch = Vec::new();
        {
            let mut decoder = Decoder::new(&mut self.wire, &mut self.sinks, end_tag.to_string());
            loop {
                let unit = decoder.read_unit().await?;
                if unit.kind == ResponseKind::Unknown {
                    batch.push(unit);
                    self.last_batch = batch.clone();
                    return Err(Error::InvalidResponse(batch));
                }
                if find_capa {
                    absorb_capabilities(&unit, &mut self.capabilities);
                }
                let done =
                    unit.kind == ResponseKind::Continuation || unit.tag == end_tag;
                batch.push(unit);
                if done {
                    break;
                }
            }
        }
        if let Some(sent_at) = self.tag_times.remove(end_tag) {
            debug!(
                tag = end_tag,
                elapsed_ms = u64::try_from(sent_at.elapsed().as_millis()).unwrap_or(u64::MAX),
                "command round trip"
            );
        }
        self.last_batch = batch.clone();
        Ok(batch)
    }

    /// Judges a batch by its terminal unit.
    pub(crate) fn validate(batch: Vec<Response>) -> Result<Vec<Response>> {
        let Some(last) = batch.last() else {
            return Err(Error::ResponseNotFound);
        };
        if last.kind == ResponseKind::Continuation {
            return Ok(batch);
        }
        if !last.is_status {
            return Err(Error::InvalidResponse(batch));
        }
        if last.status_or_index != "OK" {
            return Err(Error::NegativeResponse(batch));
        }
        Ok(batch)
    }

    /// Reads and validates the batch for the current tag.
    pub(crate) async fn parse_checked(&mut self, find_capa: bool) -> Result<Vec<Response>> {
        let tag = self.tags.current();
        let batch = self.read_batch(&tag, find_capa).await?;
        Self::validate(batch)
    }

    /// Sends a command and reads its validated batch.
    pub(crate) async fn send_request_checked(
        &mut self,
        command: &str,
        params: &[Param],
        find_capa: bool,
    ) -> Result<Vec<Response>> {
        self.send_request(command, params, false).await?;
        self.parse_checked(find_capa).await
    }

    /// Queries the server's capabilities and refreshes the cache.
    pub async fn capability(&mut self) -> Result<HashSet<String>> {
        self.send_request_checked("CAPABILITY", &[], true).await?;
        Ok(self.capabilities.clone().unwrap_or_default())
    }

    /// Checks one capability, querying the server only when the cache is
    /// unset. Comparison is case-insensitive; an empty name never matches.
    pub async fn is_supported(&mut self, name: &str) -> Result<bool> {
        let name = name.trim().to_ascii_uppercase();
        if name.is_empty() {
            return Ok(false);
        }
        if self.capabilities.is_none() {
            self.capability().await?;
        }
        Ok(self
            .capabilities
            .as_ref()
            .is_some_and(|caps| caps.contains(&name)))
    }

    /// Drops the capability cache; the next check asks the server again.
    pub fn invalidate_capabilities(&mut self) {
        self.capabilities = None;
    }

    /// Sends STARTTLS and drops the capability cache; the advertisement
    /// changes once the connection is encrypted.
    pub(crate) async fn request_starttls(&mut self) -> Result<()> {
        self.send_request_checked("STARTTLS", &[], false).await?;
        self.invalidate_capabilities();
        Ok(())
    }

    /// The cached capability set, if populated.
    #[must_use]
    pub fn cached_capabilities(&self) -> Option<&HashSet<String>> {
        self.capabilities.as_ref()
    }

    /// Sends NOOP.
    pub async fn noop(&mut self) -> Result<()> {
        self.send_request_checked("NOOP", &[], false).await?;
        Ok(())
    }

    /// Sends LOGOUT when logged in. The logged-in flag is cleared before
    /// the command so a failing LOGOUT cannot wedge the state.
    pub async fn logout(&mut self) -> Result<()> {
        if self.auth == AuthState::Authenticated {
            self.auth = AuthState::Unauthenticated;
            self.login_user = None;
            self.send_request_checked("LOGOUT", &[], false).await?;
        }
        Ok(())
    }

    /// The most recently read response batch.
    #[must_use]
    pub fn last_response(&self) -> &[Response] {
        &self.last_batch
    }

    /// State of the selected folder, if one is selected.
    #[must_use]
    pub fn folder_information(&self) -> Option<&FolderInformation> {
        self.folder.as_ref()
    }

    /// The login name recorded by the last successful authentication.
    #[must_use]
    pub fn logged_in_user(&self) -> Option<&str> {
        self.login_user.as_deref()
    }

    /// Current authentication state.
    #[must_use]
    pub const fn auth_state(&self) -> AuthState {
        self.auth
    }

    /// The most recently allocated command tag.
    pub(crate) fn current_tag(&self) -> String {
        self.tags.current()
    }
}

/// Absorbs a `* CAPABILITY ...` line or `[CAPABILITY ...]` response code
/// into the cache, replacing any previous set.
fn absorb_capabilities(unit: &Response, cache: &mut Option<HashSet<String>>) {
    if unit.kind != ResponseKind::Untagged {
        return;
    }
    let tokens: Option<&[Item]> = if unit
        .item_atom(1)
        .is_some_and(|a| a.eq_ignore_ascii_case("CAPABILITY"))
    {
        Some(&unit.items[2..])
    } else if unit.optional_code().as_deref() == Some("CAPABILITY") {
        unit.optional.as_deref().map(|opt| &opt[1..])
    } else {
        None
    };
    if let Some(tokens) = tokens {
        let caps: HashSet<String> = tokens
            .iter()
            .filter_map(Item::as_atom)
            .map(str::to_ascii_uppercase)
            .collect();
        debug!(count = caps.len(), "capabilities advertised");
        *cache = Some(caps);
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

    fn atom(s: &str) -> Item {
        Item::Atom(s.to_string())
    }

    fn status_unit(tag: &str, kind: ResponseKind, status: &str) -> Response {
        Response {
            tag: tag.to_string(),
            kind,
            status_or_index: status.to_string(),
            is_status: matches!(status, "OK" | "NO" | "BAD" | "BYE" | "PREAUTH"),
            ..Response::default()
        }
    }

    type TestClient = ImapClient<tokio_test::io::Mock>;

    #[test]
    fn validate_empty_batch() {
        assert!(matches!(
            TestClient::validate(vec![]),
            Err(Error::ResponseNotFound)
        ));
    }

    #[test]
    fn validate_ok_terminal() {
        let batch = vec![status_unit("TAG1", ResponseKind::Tagged, "OK")];
        assert!(TestClient::validate(batch).is_ok());
    }

    #[test]
    fn validate_continuation_terminal() {
        let batch = vec![status_unit("+", ResponseKind::Continuation, "")];
        assert!(TestClient::validate(batch).is_ok());
    }

    #[test]
    fn validate_negative_terminal() {
        let batch = vec![status_unit("TAG1", ResponseKind::Tagged, "NO")];
        assert!(matches!(
            TestClient::validate(batch),
            Err(Error::NegativeResponse(_))
        ));
    }

    #[test]
    fn validate_non_status_terminal() {
        let batch = vec![status_unit("TAG1", ResponseKind::Tagged, "FOO")];
        assert!(matches!(
            TestClient::validate(batch),
            Err(Error::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn starttls_request_drops_capability_cache() {
        let mock = tokio_test::io::Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1 STARTTLS] ready\r\n")
            .write(b"TAG1 STARTTLS\r\n")
            .read(b"TAG1 OK begin TLS negotiation\r\n")
            .build();
        let mut client = ImapClient::from_stream(mock).await.unwrap();
        assert!(client.cached_capabilities().is_some());
        client.request_starttls().await.unwrap();
        assert!(client.cached_capabilities().is_none());
    }

    #[test]
    fn config_connect_timeout_override() {
        let config = Config::new("example.com", 993);
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        let config = config.connect_timeout(Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn absorb_from_capability_line() {
        let unit = Response {
            tag: "*".to_string(),
            kind: ResponseKind::Untagged,
            items: vec![atom("*"), atom("CAPABILITY"), atom("IMAP4rev1"), atom("sort")],
            ..Response::default()
        };
        let mut cache = None;
        absorb_capabilities(&unit, &mut cache);
        let caps = cache.unwrap();
        assert!(caps.contains("IMAP4REV1"));
        assert!(caps.contains("SORT"));
    }

    #[test]
    fn absorb_from_response_code() {
        let unit = Response {
            tag: "*".to_string(),
            kind: ResponseKind::Untagged,
            status_or_index: "OK".to_string(),
            is_status: true,
            optional: Some(vec![atom("CAPABILITY"), atom("IMAP4rev1"), atom("IDLE")]),
            ..Response::default()
        };
        let mut cache = None;
        absorb_capabilities(&unit, &mut cache);
        assert!(cache.unwrap().contains("IDLE"));
    }

    #[test]
    fn absorb_ignores_other_units() {
        let unit = Response {
            tag: "*".to_string(),
            kind: ResponseKind::Untagged,
            items: vec![atom("*"), atom("FLAGS")],
            ..Response::default()
        };
        let mut cache = None;
        absorb_capabilities(&unit, &mut cache);
        assert!(cache.is_none());
    }
}
