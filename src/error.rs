//! Error types for the IMAP engine.

use thiserror::Error;

use crate::parser::Response;

/// Errors that can occur during IMAP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or encryption error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// The connection is not established or was closed.
    #[error("Not connected")]
    NotConnected,

    /// The caller passed empty or malformed input.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A command completed without producing any response units.
    #[error("No response received")]
    ResponseNotFound,

    /// The terminal response unit is neither a continuation nor a status line.
    #[error("Invalid terminal response")]
    InvalidResponse(Vec<Response>),

    /// The server answered with a non-OK status (NO, BAD, BYE or unexpected).
    /// Carries the full response batch for diagnostics.
    #[error("Negative response: {}", last_status(.0))]
    NegativeResponse(Vec<Response>),

    /// Authentication handshake broke down before credentials were judged.
    #[error("Login failed: {0}")]
    LoginFailed(String),

    /// The server rejected the supplied credentials.
    #[error("Bad credentials: {}", last_status(.0))]
    BadCredentials(Vec<Response>),

    /// A required capability is not advertised by the server.
    #[error("Unsupported operation: {0} is not supported by the server")]
    Unsupported(String),

    /// Protocol violation or unexpected data on the wire.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// Returns the response batch attached to this error, if any.
    #[must_use]
    pub fn responses(&self) -> Option<&[Response]> {
        match self {
            Self::InvalidResponse(batch)
            | Self::NegativeResponse(batch)
            | Self::BadCredentials(batch) => Some(batch),
            _ => None,
        }
    }
}

fn last_status(batch: &[Response]) -> String {
    batch.last().map_or_else(
        || "empty batch".to_string(),
        |r| {
            if r.human_readable.is_empty() {
                r.status_or_index.clone()
            } else {
                format!("{} {}", r.status_or_index, r.human_readable)
            }
        },
    )
}

/// Result type alias using our [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{Response, ResponseKind};

    fn no_response() -> Response {
        Response {
            tag: "TAG1".to_string(),
            kind: ResponseKind::Tagged,
            status_or_index: "NO".to_string(),
            is_status: true,
            human_readable: "failure".to_string(),
            ..Response::default()
        }
    }

    #[test]
    fn negative_response_display_includes_status() {
        let err = Error::NegativeResponse(vec![no_response()]);
        assert_eq!(err.to_string(), "Negative response: NO failure");
    }

    #[test]
    fn responses_accessor() {
        let err = Error::BadCredentials(vec![no_response()]);
        assert_eq!(err.responses().map(<[Response]>::len), Some(1));
        assert!(Error::NotConnected.responses().is_none());
    }
}
