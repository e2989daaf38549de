//! # letterbox-imap
//!
//! An async IMAP4rev1 (RFC 3501) client protocol engine: tagged command
//! dispatch, a streaming response parser, and the mailbox operations
//! built on top of them.
//!
//! ## Features
//!
//! - **Streaming literal sinks**: message bodies are delivered to
//!   registered sinks in bounded chunks instead of being buffered, and
//!   the parser position stays correct no matter what a sink does
//! - **Capability-aware operations**: ESEARCH/ESORT, THREAD, UIDPLUS,
//!   MOVE, UNSELECT, LIST-STATUS, QUOTA, and NAMESPACE are gated on the
//!   server's advertisement, which is cached and sniffed from replies
//! - **SASL authentication**: CRAM-MD5, PLAIN, XOAUTH2, plus the LOGIN
//!   fallback with credential redaction in logs
//! - **TLS via rustls**: implicit TLS or STARTTLS upgrade, no OpenSSL
//! - **Generic transport**: every operation works over any
//!   `AsyncRead + AsyncWrite` stream, so tests drive the real client
//!   with scripted mock connections
//!
//! ## Quick Start
//!
//! ```ignore
//! use letterbox_imap::{Config, FetchItem, ImapClient, LoginOptions, Security};
//!
//! #[tokio::main]
//! async fn main() -> letterbox_imap::Result<()> {
//!     let config = Config::new("imap.example.com", 993).security(Security::Implicit);
//!     let mut client = ImapClient::connect(&config).await?;
//!
//!     client
//!         .login("user@example.com", "password", &LoginOptions::default())
//!         .await?;
//!
//!     let info = client.folder_select("INBOX", false).await?;
//!     println!("messages: {:?}", info.exists);
//!
//!     let unseen = client.search("UNSEEN", true).await?;
//!     for fetched in client
//!         .fetch(
//!             vec![FetchItem::plain("UID"), FetchItem::plain("RFC822.SIZE")],
//!             "1:10",
//!             false,
//!         )
//!         .await?
//!     {
//!         println!("#{} uid {:?}", fetched.index, fetched.uid());
//!     }
//!     println!("unseen: {unseen:?}");
//!
//!     client.logout().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`command`]: request rendering, escaping, tag allocation
//! - [`parser`]: response model and the streaming decoder
//! - [`sink`]: literal sink registration and dispatch
//! - [`wire`]: buffered transport, TLS streams, STARTTLS upgrade
//! - [`client`]: the client itself and its operations
//! - [`types`]: folder, fetch, quota, namespace, and thread types

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod client;
pub mod command;
mod error;
pub mod parser;
pub mod sink;
pub mod types;
pub mod wire;

pub use client::{AuthState, Config, FetchItem, ImapClient, LoginOptions, Security};
pub use command::{Param, TagSequence, escape_string};
pub use error::{Error, Result};
pub use parser::{Item, Response, ResponseKind};
pub use sink::{FetchKey, LiteralSink, SinkRegistry};
pub use types::{
    FetchResponse, Folder, FolderInformation, NamespaceEntry, Namespaces, QuotaUsage, ThreadNode,
};
pub use wire::ImapStream;

/// IMAP protocol version supported.
pub const IMAP_VERSION: &str = "IMAP4rev1";
