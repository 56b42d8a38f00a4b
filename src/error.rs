//! strongly typed library error.

use core::fmt;
use std::{error, io};

/// error returned by [`Connection::open`](crate::Connection::open),
/// [`Connection::post`](crate::Connection::post), and configuration helpers.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// the request's deadline elapsed. the caller may retry on another connection or later.
    Timeout,
    /// this connection can't accept a new stream right now. the caller should pick a
    /// different connection or wait.
    Blocked,
    /// the connection has terminated or is terminating; the stream can't complete.
    Closed,
    /// the response body was present but not valid JSON.
    FormatError(FormatError),
    /// the `h2` protocol engine reported an error while the connection was still being
    /// established (handshake, settings exchange). Once a `post` has committed a stream, a
    /// protocol error on that stream is mapped to [`Error::Closed`] instead of this variant —
    /// see `Connection::protocol_failure`.
    Protocol(h2::Error),
    /// io error from the underlying transport (connect, tls handshake, read, write).
    Io(io::Error),
    /// tls setup or handshake failure.
    Tls(TlsError),
    /// ALPN negotiated something other than "h2", or no protocol was negotiated at all.
    AlpnMismatch(Option<String>),
    /// the configured base url is missing a required part or uses an unsupported scheme.
    InvalidUrl(InvalidUrl),
    /// the request body exceeds the configured maximum payload size. programmer error:
    /// callers are expected to check this before calling `post`.
    PayloadTooLarge { len: usize, max: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("request deadline elapsed"),
            Self::Blocked => f.write_str("connection is not currently accepting new streams"),
            Self::Closed => f.write_str("connection is closed"),
            Self::FormatError(e) => write!(f, "malformed response body: {e}"),
            Self::Protocol(e) => write!(f, "http/2 protocol error: {e}"),
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Tls(e) => write!(f, "tls error: {e}"),
            Self::AlpnMismatch(Some(proto)) => write!(f, "peer negotiated unsupported protocol {proto:?} instead of h2"),
            Self::AlpnMismatch(None) => f.write_str("peer did not negotiate any alpn protocol, expected h2"),
            Self::InvalidUrl(e) => write!(f, "invalid base url: {e}"),
            Self::PayloadTooLarge { len, max } => write!(f, "request body of {len} bytes exceeds max payload size of {max} bytes"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Protocol(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::FormatError(FormatError { source, .. }) => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<h2::Error> for Error {
    fn from(e: h2::Error) -> Self {
        Self::Protocol(e)
    }
}

/// response body was non-empty but failed to parse as JSON.
#[derive(Debug)]
pub struct FormatError {
    /// a short, truncated preview of the offending body, for logging.
    pub preview: String,
    pub(crate) source: serde_json::Error,
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not json: {:?} ({})", self.preview, self.source)
    }
}

impl error::Error for FormatError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(&self.source)
    }
}

impl From<FormatError> for Error {
    fn from(e: FormatError) -> Self {
        Self::FormatError(e)
    }
}

/// failure while constructing or running the tls handshake.
#[derive(Debug)]
pub enum TlsError {
    InvalidCertificate(io::Error),
    InvalidPrivateKey,
    InvalidDnsName,
    Handshake(io::Error),
    HandshakeTimeout,
}

impl fmt::Display for TlsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCertificate(e) => write!(f, "failed to load certificate chain: {e}"),
            Self::InvalidPrivateKey => f.write_str("failed to load private key"),
            Self::InvalidDnsName => f.write_str("host is not a valid dns name for sni"),
            Self::Handshake(e) => write!(f, "tls handshake failed: {e}"),
            Self::HandshakeTimeout => f.write_str("tls handshake timed out"),
        }
    }
}

impl error::Error for TlsError {}

impl From<TlsError> for Error {
    fn from(e: TlsError) -> Self {
        Self::Tls(e)
    }
}

#[derive(Debug)]
pub enum InvalidUrl {
    MissingHost,
    MissingScheme,
    UnknownScheme(String),
    Other(http::uri::InvalidUri),
}

impl fmt::Display for InvalidUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingHost => f.write_str("missing host"),
            Self::MissingScheme => f.write_str("missing scheme"),
            Self::UnknownScheme(s) => write!(f, "unsupported scheme {s:?}, expected http or https"),
            Self::Other(e) => write!(f, "{e}"),
        }
    }
}

impl error::Error for InvalidUrl {}

impl From<http::uri::InvalidUri> for InvalidUrl {
    fn from(e: http::uri::InvalidUri) -> Self {
        Self::Other(e)
    }
}

impl From<InvalidUrl> for Error {
    fn from(e: InvalidUrl) -> Self {
        Self::InvalidUrl(e)
    }
}
