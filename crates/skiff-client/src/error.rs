//! Client error types.
//!
//! Fatal startup failures (`TrustError`, `ConnectionError`, `RelayError::Bind`)
//! and per-connection failures (the other `RelayError` variants) are kept
//! apart so the caller can tell which ones end the process.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use skiff_config::ConfigError;
use skiff_core::errors::{
    ERROR_BIND, ERROR_CONNECT, ERROR_IO, ERROR_NEGOTIATION, ERROR_PROTOCOL,
    ERROR_REJECTED, ERROR_STREAM, ERROR_TIMEOUT, ERROR_TRUST,
};
use skiff_proto::{ParseError, WriteError};

/// Top-level error returned by [`crate::run`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("trust error: {0}")]
    Trust(#[from] TrustError),
    #[error("connection error: {0}")]
    Connect(#[from] ConnectionError),
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),
}

impl ClientError {
    /// Get the error type string for logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            ClientError::Config(e) => e.error_type(),
            ClientError::Trust(_) => ERROR_TRUST,
            ClientError::Connect(e) => e.error_type(),
            ClientError::Relay(e) => e.error_type(),
        }
    }
}

/// Failure to build the TLS trust context.
#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    #[error("failed to read CA bundle {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no certificate could be parsed from CA bundle {} ({ignored} rejected)", path.display())]
    Parse { path: PathBuf, ignored: usize },
    #[error("invalid TLS server name: {0}")]
    ServerName(String),
    #[error("tls: {0}")]
    Tls(#[from] rustls::Error),
}

/// Failure to establish the transport session.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("failed to resolve {addr}: {source}")]
    Resolve {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("no address found for {0}")]
    NoAddress(String),
    #[error("failed to open UDP endpoint: {0}")]
    Endpoint(#[source] io::Error),
    #[error("tls: {0}")]
    Crypto(#[from] quinn::crypto::rustls::NoInitialCipherSuite),
    #[error("connect: {0}")]
    Connect(#[from] quinn::ConnectError),
    #[error("handshake: {0}")]
    Handshake(#[from] quinn::ConnectionError),
    #[error("hello: {0}")]
    Hello(#[source] StreamError),
    #[error("rejected by server: {0}")]
    Rejected(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("session lost: {0}")]
    Lost(#[source] quinn::ConnectionError),
}

impl ConnectionError {
    pub fn error_type(&self) -> &'static str {
        match self {
            ConnectionError::Rejected(_) => ERROR_REJECTED,
            ConnectionError::Timeout(_) => ERROR_TIMEOUT,
            ConnectionError::Hello(e) => e.error_type(),
            _ => ERROR_CONNECT,
        }
    }
}

/// Failure on a single tunnel stream.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("session closed")]
    SessionClosed,
    #[error("open: {0}")]
    Open(#[from] quinn::ConnectionError),
    #[error("write: {0}")]
    Write(#[from] quinn::WriteError),
    #[error("read: {0}")]
    Read(#[from] quinn::ReadError),
    #[error("proto: {0}")]
    Proto(ParseError),
    #[error("proto write: {0}")]
    ProtoWrite(WriteError),
    #[error("control frame exceeds {0} bytes")]
    FrameTooLarge(usize),
    #[error("stream closed before reply")]
    UnexpectedEof,
    #[error("remote refused: {0}")]
    Rejected(String),
}

impl StreamError {
    pub fn error_type(&self) -> &'static str {
        match self {
            StreamError::Proto(_) | StreamError::ProtoWrite(_) | StreamError::FrameTooLarge(_) => {
                ERROR_PROTOCOL
            }
            StreamError::Rejected(_) => ERROR_REJECTED,
            _ => ERROR_STREAM,
        }
    }
}

/// Local relay errors.
///
/// Only `Bind` aborts the accept loop; everything else is scoped to one
/// relayed connection and reported through `RelayObserver::on_close`.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("SOCKS5 negotiation: {0}")]
    Negotiation(#[from] Socks5Error),
    #[error("stream: {0}")]
    Stream(#[from] StreamError),
    #[error("io: {0}")]
    Io(#[from] io::Error),
}

impl RelayError {
    pub fn error_type(&self) -> &'static str {
        match self {
            RelayError::Bind { .. } => ERROR_BIND,
            RelayError::Negotiation(_) => ERROR_NEGOTIATION,
            RelayError::Stream(e) => e.error_type(),
            RelayError::Io(_) => ERROR_IO,
        }
    }

    /// Whether this error ends the relay loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RelayError::Bind { .. })
    }
}

/// SOCKS5 protocol errors.
#[derive(Debug)]
pub enum Socks5Error {
    InvalidVersion(u8),
    NoAcceptableMethods,
    UnsupportedCommand(u8),
    UnsupportedAddressType(u8),
    /// Domain name that is empty or not valid UTF-8.
    InvalidDomain,
    Truncated,
}

impl fmt::Display for Socks5Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidVersion(v) => write!(f, "invalid SOCKS version: 0x{v:02x}"),
            Self::NoAcceptableMethods => write!(f, "no acceptable authentication methods"),
            Self::UnsupportedCommand(c) => write!(f, "unsupported command: 0x{c:02x}"),
            Self::UnsupportedAddressType(a) => write!(f, "unsupported address type: 0x{a:02x}"),
            Self::InvalidDomain => write!(f, "invalid domain name"),
            Self::Truncated => write!(f, "connection closed during negotiation"),
        }
    }
}

impl std::error::Error for Socks5Error {}
