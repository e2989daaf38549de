//! Buffered wire I/O for the IMAP protocol.
//!
//! IMAP interleaves CRLF-terminated lines with counted `{n}` literals, so
//! the transport exposes three read shapes: a full line, an exact-length
//! read, and a bounded chunk read for streaming literal bodies. Writes go
//! through a reusable buffer and are flushed per command.

#![allow(clippy::missing_errors_doc)]

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::BytesMut;
use rustls::pki_types::ServerName;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf,
};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use crate::{Error, Result};

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum line length to prevent memory exhaustion.
const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Maximum buffered literal size to prevent memory exhaustion.
/// Literals routed to a sink are streamed in chunks and are not capped.
pub(crate) const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024; // 100 MB

/// Chunk size for streamed literal reads.
pub(crate) const LITERAL_CHUNK_SIZE: usize = 8192;

/// Buffered IMAP transport over any async stream.
pub struct Wire<S> {
    reader: BufReader<S>,
    write_buffer: BytesMut,
}

impl<S> Wire<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new wire over the given stream.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream),
            write_buffer: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
        }
    }

    /// Reads a single CRLF-terminated line, including the CRLF.
    pub async fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();

        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed",
                )));
            }

            if let Some(pos) = find_crlf(buf) {
                line.extend_from_slice(&buf[..pos + 2]);
                self.reader.consume(pos + 2);
                break;
            }

            let len = buf.len();
            line.extend_from_slice(buf);
            self.reader.consume(len);

            if line.len() > MAX_LINE_LENGTH {
                return Err(Error::Protocol("line too long".to_string()));
            }
        }

        Ok(line)
    }

    /// Reads exactly `len` bytes into memory.
    ///
    /// Returns the data along with the number of bytes missing if the
    /// connection closed early; the caller decides how to report that.
    pub async fn read_literal(&mut self, len: usize) -> Result<(Vec<u8>, usize)> {
        if len > MAX_LITERAL_SIZE {
            return Err(Error::Protocol(format!(
                "literal too large: {len} bytes (max {MAX_LITERAL_SIZE})"
            )));
        }

        let mut data = Vec::with_capacity(len);
        let mut chunk = [0u8; LITERAL_CHUNK_SIZE];
        while data.len() < len {
            let want = (len - data.len()).min(LITERAL_CHUNK_SIZE);
            let n = self.reader.read(&mut chunk[..want]).await?;
            if n == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..n]);
        }

        let missing = len - data.len();
        Ok((data, missing))
    }

    /// Reads up to `buf.len()` bytes. Returns 0 at end of stream.
    pub async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.reader.read(buf).await?)
    }

    /// Writes a line followed by CRLF and flushes.
    pub async fn write_line(&mut self, data: &[u8]) -> Result<()> {
        self.write_buffer.clear();
        self.write_buffer.extend_from_slice(data);
        self.write_buffer.extend_from_slice(b"\r\n");

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buffer).await?;
        stream.flush().await?;

        Ok(())
    }

    /// Writes raw data without framing (for literal bodies).
    pub async fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.reader.get_mut();
        stream.write_all(data).await?;
        stream.flush().await?;

        Ok(())
    }

    /// Copies an entire source stream onto the wire in bounded chunks.
    ///
    /// Returns the number of bytes written. Flushes once at the end.
    pub async fn write_stream<R>(&mut self, source: &mut R) -> Result<u64>
    where
        R: AsyncRead + Unpin,
    {
        let stream = self.reader.get_mut();
        let mut chunk = [0u8; LITERAL_CHUNK_SIZE];
        let mut written = 0u64;
        loop {
            let n = source.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            stream.write_all(&chunk[..n]).await?;
            written += n as u64;
        }
        stream.flush().await?;
        Ok(written)
    }

    /// Consumes the wire and returns the inner stream.
    ///
    /// Any buffered read data is lost, so this is only safe between
    /// complete protocol exchanges (the STARTTLS upgrade point).
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }
}

/// A stream that can be either plaintext or TLS.
pub enum ImapStream {
    /// Plaintext TCP stream.
    Plain(TcpStream),
    /// TLS-encrypted stream (boxed to reduce enum size).
    Tls(Box<TlsStream<TcpStream>>),
}

impl ImapStream {
    /// Upgrades a plaintext stream to TLS after a STARTTLS exchange.
    pub async fn upgrade_to_tls(self, host: &str) -> Result<Self> {
        match self {
            Self::Plain(tcp) => {
                let connector = create_tls_connector();
                let server_name = ServerName::try_from(host.to_string())?;
                let tls = connector.connect(server_name, tcp).await?;
                Ok(Self::Tls(Box::new(tls)))
            }
            Self::Tls(_) => Err(Error::Protocol("stream is already TLS".to_string())),
        }
    }

    /// Returns true if the stream is TLS-encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl AsyncRead for ImapStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ImapStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Creates a TLS connector with the webpki root certificates.
pub fn create_tls_connector() -> TlsConnector {
    let root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}

/// Connects to a server with TLS from the start.
pub async fn connect_tls(host: &str, port: u16) -> Result<ImapStream> {
    let addr = format!("{host}:{port}");
    let tcp = TcpStream::connect(&addr).await?;

    let connector = create_tls_connector();
    let server_name = ServerName::try_from(host.to_string())?;
    let tls = connector.connect(server_name, tcp).await?;

    Ok(ImapStream::Tls(Box::new(tls)))
}

/// Connects to a server without TLS (for STARTTLS or plaintext test setups).
pub async fn connect_plain(host: &str, port: u16) -> Result<ImapStream> {
    let addr = format!("{host}:{port}");
    let tcp = TcpStream::connect(&addr).await?;
    Ok(ImapStream::Plain(tcp))
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
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

    #[tokio::test]
    async fn read_line_returns_full_line() {
        let mock = tokio_test::io::Builder::new()
            .read(b"* OK ready\r\n")
            .build();
        let mut wire = Wire::new(mock);
        let line = wire.read_line().await.unwrap();
        assert_eq!(line, b"* OK ready\r\n");
    }

    #[tokio::test]
    async fn read_line_spans_multiple_fills() {
        let mock = tokio_test::io::Builder::new()
            .read(b"* OK par")
            .read(b"tial\r\n")
            .build();
        let mut wire = Wire::new(mock);
        let line = wire.read_line().await.unwrap();
        assert_eq!(line, b"* OK partial\r\n");
    }

    #[tokio::test]
    async fn read_line_eof_is_error() {
        let mock = tokio_test::io::Builder::new().build();
        let mut wire = Wire::new(mock);
        let err = wire.read_line().await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn read_literal_exact() {
        let mock = tokio_test::io::Builder::new().read(b"hello world").build();
        let mut wire = Wire::new(mock);
        let (data, missing) = wire.read_literal(11).await.unwrap();
        assert_eq!(data, b"hello world");
        assert_eq!(missing, 0);
    }

    #[tokio::test]
    async fn read_literal_short() {
        let mock = tokio_test::io::Builder::new().read(b"hel").build();
        let mut wire = Wire::new(mock);
        let (data, missing) = wire.read_literal(10).await.unwrap();
        assert_eq!(data, b"hel");
        assert_eq!(missing, 7);
    }

    #[tokio::test]
    async fn read_literal_rejects_oversize() {
        let mock = tokio_test::io::Builder::new().build();
        let mut wire = Wire::new(mock);
        let err = wire.read_literal(MAX_LITERAL_SIZE + 1).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn write_line_appends_crlf() {
        let mock = tokio_test::io::Builder::new()
            .write(b"TAG1 NOOP\r\n")
            .build();
        let mut wire = Wire::new(mock);
        wire.write_line(b"TAG1 NOOP").await.unwrap();
    }

    #[tokio::test]
    async fn write_stream_copies_all() {
        let mock = tokio_test::io::Builder::new().write(b"body bytes").build();
        let mut wire = Wire::new(mock);
        let mut source = std::io::Cursor::new(b"body bytes".to_vec());
        let written = wire.write_stream(&mut source).await.unwrap();
        assert_eq!(written, 10);
    }
}
