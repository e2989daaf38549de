//! Authentication workflows.
//!
//! `login` prefers CRAM-MD5, then AUTH=PLAIN, then the plain LOGIN
//! command, honoring the caller's mechanism switches and the server's
//! advertised `AUTH=` capabilities. A negative server verdict anywhere
//! in a handshake surfaces as bad credentials; handshake breakdowns
//! (missing challenge, undecodable payloads) as login failures.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use md5::Md5;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::command::Param;
use crate::parser::ResponseKind;
use crate::{Error, Result};

use super::ImapClient;

/// Authentication lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    /// No authentication attempted yet, or logged out.
    #[default]
    Unauthenticated,
    /// A login handshake is in flight.
    Authenticating,
    /// Credentials accepted.
    Authenticated,
    /// The last login attempt failed.
    Failed,
}

/// Options for [`ImapClient::login`].
#[derive(Debug, Clone)]
pub struct LoginOptions {
    /// Allow SASL PLAIN when advertised.
    pub use_auth_plain: bool,
    /// Allow CRAM-MD5 when advertised.
    pub use_auth_cram_md5: bool,
    /// Administrator proxy: authenticate as the credential owner, then
    /// issue PROXYAUTH for this user.
    pub proxy_auth_user: Option<String>,
}

impl Default for LoginOptions {
    fn default() -> Self {
        Self {
            use_auth_plain: true,
            use_auth_cram_md5: true,
            proxy_auth_user: None,
        }
    }
}

impl<S> ImapClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Authenticates with a username and password.
    ///
    /// On success the capability cache is invalidated (servers change
    /// their advertisement after login) and the login name is recorded,
    /// even when proxying onto another mailbox. A server rejection maps
    /// to [`Error::BadCredentials`].
    pub async fn login(
        &mut self,
        user: &str,
        password: &str,
        options: &LoginOptions,
    ) -> Result<()> {
        let user = user.trim();
        if user.is_empty() || password.is_empty() {
            return Err(Error::InvalidArgument(
                "login requires a user and a password".to_string(),
            ));
        }

        self.auth = AuthState::Authenticating;
        match self.login_exchange(user, password, options).await {
            Ok(()) => {
                self.auth = AuthState::Authenticated;
                self.login_user = Some(user.to_string());
                self.invalidate_capabilities();
                Ok(())
            }
            Err(Error::NegativeResponse(batch)) => {
                self.auth = AuthState::Failed;
                Err(Error::BadCredentials(batch))
            }
            Err(err) => {
                self.auth = AuthState::Failed;
                Err(err)
            }
        }
    }

    async fn login_exchange(
        &mut self,
        user: &str,
        password: &str,
        options: &LoginOptions,
    ) -> Result<()> {
        if options.use_auth_cram_md5 && self.is_supported("AUTH=CRAM-MD5").await? {
            self.authenticate_cram_md5(user, password).await?;
        } else if options.use_auth_plain && self.is_supported("AUTH=PLAIN").await? {
            self.authenticate_plain(user, password).await?;
        } else {
            self.send_request_checked(
                "LOGIN",
                &[Param::quoted(user), Param::quoted(password)],
                false,
            )
            .await?;
        }

        if let Some(proxy) = options.proxy_auth_user.as_deref() {
            if !proxy.is_empty() {
                self.send_request_checked("PROXYAUTH", &[Param::quoted(proxy)], false)
                    .await?;
            }
        }
        Ok(())
    }

    async fn authenticate_cram_md5(&mut self, user: &str, password: &str) -> Result<()> {
        self.send_request("AUTHENTICATE", &[Param::raw("CRAM-MD5")], false)
            .await?;
        let batch = self.parse_checked(false).await?;
        let challenge = batch
            .iter()
            .rev()
            .find(|r| r.kind == ResponseKind::Continuation)
            .and_then(|r| r.item_atom(1))
            .ok_or_else(|| Error::LoginFailed("no CRAM-MD5 challenge received".to_string()))?;
        let answer = cram_md5_answer(user, password, challenge)?;
        debug!(command = "*******", "sending");
        self.wire.write_line(answer.as_bytes()).await?;
        self.parse_checked(false).await?;
        Ok(())
    }

    async fn authenticate_plain(&mut self, user: &str, password: &str) -> Result<()> {
        self.send_request("AUTHENTICATE", &[Param::raw("PLAIN")], false)
            .await?;
        self.parse_checked(false).await?;
        let token = BASE64.encode(format!("\0{user}\0{password}"));
        debug!(command = "*******", "sending");
        self.wire.write_line(token.as_bytes()).await?;
        self.parse_checked(false).await?;
        Ok(())
    }

    /// Authenticates with an XOAUTH2 token string.
    ///
    /// On failure the server answers the AUTHENTICATE line with a
    /// continuation carrying a base64 error blob; the handshake then
    /// requires an empty reply before the tagged rejection arrives.
    pub async fn login_xoauth2(&mut self, token: &str) -> Result<()> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::InvalidArgument("empty XOAUTH2 token".to_string()));
        }

        self.auth = AuthState::Authenticating;
        match self.xoauth2_exchange(token).await {
            Ok(()) => {
                self.auth = AuthState::Authenticated;
                self.invalidate_capabilities();
                Ok(())
            }
            Err(Error::NegativeResponse(batch)) => {
                self.auth = AuthState::Failed;
                Err(Error::BadCredentials(batch))
            }
            Err(err) => {
                self.auth = AuthState::Failed;
                Err(err)
            }
        }
    }

    async fn xoauth2_exchange(&mut self, token: &str) -> Result<()> {
        self.send_request(
            "AUTHENTICATE",
            &[Param::raw("XOAUTH2"), Param::raw(token)],
            false,
        )
        .await?;
        let batch = self.parse_checked(false).await?;
        if batch
            .last()
            .is_some_and(|r| r.kind == ResponseKind::Continuation)
        {
            if let Some(blob) = batch.last().and_then(|r| r.item_atom(1)) {
                if let Ok(raw) = BASE64.decode(blob) {
                    debug!(detail = %String::from_utf8_lossy(&raw), "XOAUTH2 rejected");
                }
            }
            self.wire.write_line(b"").await?;
            self.parse_checked(false).await?;
        }
        Ok(())
    }
}

/// Builds the CRAM-MD5 response: `base64(user " " hex(hmac_md5(password,
/// base64decode(challenge))))`.
fn cram_md5_answer(user: &str, password: &str, challenge_b64: &str) -> Result<String> {
    let challenge = BASE64
        .decode(challenge_b64.trim())
        .map_err(|_| Error::LoginFailed("malformed CRAM-MD5 challenge".to_string()))?;
    let mut mac = Hmac::<Md5>::new_from_slice(password.as_bytes())
        .map_err(|_| Error::LoginFailed("invalid CRAM-MD5 key".to_string()))?;
    mac.update(&challenge);
    let digest = mac.finalize().into_bytes();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    Ok(BASE64.encode(format!("{user} {hex}")))
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
    fn cram_md5_rfc2195_vector() {
        // RFC 2195 section 2 example
        let challenge = "PDE4OTYuNjk3MTcwOTUyQHBvc3RvZmZpY2UucmVzdG9uLm1jaS5uZXQ+";
        let answer = cram_md5_answer("tim", "tanstaaftanstaaf", challenge).unwrap();
        assert_eq!(answer, "dGltIGI5MTNhNjAyYzdlZGE3YTQ5NWI0ZTZlNzMzNGQzODkw");
    }

    #[test]
    fn cram_md5_rejects_bad_challenge() {
        let err = cram_md5_answer("tim", "pw", "not base64 at all!").unwrap_err();
        assert!(matches!(err, Error::LoginFailed(_)));
    }

    #[test]
    fn plain_token_layout() {
        let token = BASE64.encode(format!("\0{}\0{}", "user", "pass"));
        assert_eq!(token, "AHVzZXIAcGFzcw==");
    }

    #[test]
    fn default_options_allow_both_mechanisms() {
        let opts = LoginOptions::default();
        assert!(opts.use_auth_plain);
        assert!(opts.use_auth_cram_md5);
        assert!(opts.proxy_auth_user.is_none());
    }
}
