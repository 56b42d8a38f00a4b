use core::time::Duration;
use std::path::{Path, PathBuf};

use http::uri::{Authority, Scheme, Uri};

use crate::error::{Error, InvalidUrl};

/// request body size cap. Apple limits APNs payloads to 4KB or 5KB depending on
/// notification type; header bytes are not subject to flow control so this bound
/// only concerns the body.
pub const MAX_PAYLOAD_SIZE: usize = 5120;

/// free-window threshold used by [`Connection::blocked`](crate::Connection::blocked). Chosen to
/// exceed [`MAX_PAYLOAD_SIZE`] plus per-frame overhead so a connection never accepts a request it
/// can't immediately flush.
pub const REQUIRED_FREE_SPACE: i64 = 6000;

/// advisory default for the peer's `MAX_CONCURRENT_STREAMS`, used until corrected. Recommended
/// starting point per RFC 7540 section 6.5.2.
pub const DEFAULT_MAX_CONCURRENT_STREAMS: u32 = 100;

const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// client certificate material supplied by the embedding layer. the core never reads
/// environment variables to locate these; callers pass paths explicitly.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub certificate_chain_path: PathBuf,
    pub private_key_path: PathBuf,
}

impl ClientIdentity {
    pub fn new(certificate_chain_path: impl Into<PathBuf>, private_key_path: impl Into<PathBuf>) -> Self {
        Self {
            certificate_chain_path: certificate_chain_path.into(),
            private_key_path: private_key_path.into(),
        }
    }
}

/// builder for [`Config`]. mirrors the base url, optional mutual-tls identity, and the
/// handful of tunable limits a caller may want to override from their defaults.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    scheme: Scheme,
    host: String,
    port: u16,
    identity: Option<ClientIdentity>,
    extra_trust_anchor_paths: Vec<PathBuf>,
    max_payload_size: usize,
    required_free_space: i64,
    handshake_timeout: Duration,
    max_concurrent_streams: u32,
}

impl ConfigBuilder {
    /// parse `base_url` (e.g. `https://api.push.apple.com:443`) into scheme/host/port.
    pub fn new(base_url: &str) -> Result<Self, Error> {
        let uri: Uri = base_url.parse().map_err(InvalidUrl::from)?;
        let scheme = uri.scheme().cloned().ok_or(InvalidUrl::MissingScheme)?;
        let authority = uri.authority().ok_or(InvalidUrl::MissingHost)?;
        let default_port = default_port(&scheme).ok_or_else(|| InvalidUrl::UnknownScheme(scheme.to_string()))?;
        Ok(Self {
            host: authority.host().to_string(),
            port: authority.port_u16().unwrap_or(default_port),
            scheme,
            identity: None,
            extra_trust_anchor_paths: Vec::new(),
            max_payload_size: MAX_PAYLOAD_SIZE,
            required_free_space: REQUIRED_FREE_SPACE,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            max_concurrent_streams: DEFAULT_MAX_CONCURRENT_STREAMS,
        })
    }

    /// configure mutual tls with a client certificate chain and private key.
    pub fn client_identity(mut self, identity: ClientIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// add a PEM file of extra trust anchors, on top of the platform's default trust store.
    /// used in tests against a local CA.
    pub fn trust_anchor_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.extra_trust_anchor_paths.push(path.into());
        self
    }

    pub fn max_payload_size(mut self, n: usize) -> Self {
        self.max_payload_size = n;
        self
    }

    pub fn required_free_space(mut self, n: i64) -> Self {
        self.required_free_space = n;
        self
    }

    pub fn handshake_timeout(mut self, dur: Duration) -> Self {
        self.handshake_timeout = dur;
        self
    }

    pub fn max_concurrent_streams(mut self, n: u32) -> Self {
        self.max_concurrent_streams = n;
        self
    }

    pub fn build(self) -> Config {
        Config {
            scheme: self.scheme,
            host: self.host,
            port: self.port,
            identity: self.identity,
            extra_trust_anchor_paths: self.extra_trust_anchor_paths,
            max_payload_size: self.max_payload_size,
            required_free_space: self.required_free_space,
            handshake_timeout: self.handshake_timeout,
            max_concurrent_streams: self.max_concurrent_streams,
        }
    }
}

/// resolved, immutable configuration for a [`Connection`](crate::Connection).
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) scheme: Scheme,
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) identity: Option<ClientIdentity>,
    pub(crate) extra_trust_anchor_paths: Vec<PathBuf>,
    pub(crate) max_payload_size: usize,
    pub(crate) required_free_space: i64,
    pub(crate) handshake_timeout: Duration,
    pub(crate) max_concurrent_streams: u32,
}

impl Config {
    pub fn builder(base_url: &str) -> Result<ConfigBuilder, Error> {
        ConfigBuilder::new(base_url)
    }

    /// authority to send as the `:authority` pseudo-header: `host` when the port matches the
    /// scheme default, `host:port` otherwise.
    pub(crate) fn authority(&self) -> Authority {
        let authority = if Some(self.port) == default_port(&self.scheme) {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        };
        authority.parse().expect("host/port produced an invalid authority")
    }

    pub(crate) fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    pub(crate) fn host(&self) -> &str {
        &self.host
    }

    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    pub(crate) fn extra_trust_anchor_paths(&self) -> &[PathBuf] {
        &self.extra_trust_anchor_paths
    }

    pub(crate) fn identity(&self) -> Option<&ClientIdentity> {
        self.identity.as_ref()
    }

    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }
}

fn default_port(scheme: &Scheme) -> Option<u16> {
    match scheme.as_str() {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

pub(crate) fn is_https(scheme: &Scheme) -> bool {
    scheme.as_str() == "https"
}

#[allow(dead_code)]
pub(crate) fn identity_paths(identity: &ClientIdentity) -> (&Path, &Path) {
    (&identity.certificate_chain_path, &identity.private_key_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authority_omits_default_https_port() {
        let cfg = Config::builder("https://api.push.apple.com").unwrap().build();
        assert_eq!(cfg.authority().as_str(), "api.push.apple.com");
    }

    #[test]
    fn authority_keeps_nondefault_port() {
        let cfg = Config::builder("https://localhost:2197").unwrap().build();
        assert_eq!(cfg.authority().as_str(), "localhost:2197");
    }

    #[test]
    fn authority_keeps_explicit_default_http_port() {
        let cfg = Config::builder("http://example.com:80").unwrap().build();
        assert_eq!(cfg.authority().as_str(), "example.com");
    }

    #[test]
    fn rejects_missing_scheme() {
        let err = Config::builder("example.com").unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(InvalidUrl::MissingScheme) | Error::InvalidUrl(InvalidUrl::Other(_))));
    }

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::builder("https://localhost:2197").unwrap().build();
        assert_eq!(cfg.max_payload_size, MAX_PAYLOAD_SIZE);
        assert_eq!(cfg.required_free_space, REQUIRED_FREE_SPACE);
        assert_eq!(cfg.max_concurrent_streams, DEFAULT_MAX_CONCURRENT_STREAMS);
    }
}
