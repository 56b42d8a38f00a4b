//! tls connector: client-certificate (mutual tls) setup, trust anchor loading, and an
//! ALPN "h2" check that fails fast when the peer negotiates anything else.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::config::Config;
use crate::error::Error;

/// any transport `h2` can drive: a plain [`TcpStream`] (only reachable via the
/// `dangerous` feature, for test harnesses) or a tls-wrapped one.
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin {}
impl<S> Io for S where S: AsyncRead + AsyncWrite + Send + Unpin {}

pub(crate) type BoxedIo = Box<dyn Io>;

pub(crate) async fn connect(config: &Config) -> Result<BoxedIo, Error> {
    let tcp = TcpStream::connect((config.host(), config.port())).await?;
    tcp.set_nodelay(true).ok();

    if !crate::config::is_https(config.scheme()) {
        return connect_cleartext(tcp).await;
    }

    #[cfg(feature = "rustls")]
    {
        rustls_backend::connect(config, tcp).await
    }
    #[cfg(not(feature = "rustls"))]
    {
        let _ = tcp;
        Err(crate::error::TlsError::Handshake(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "no tls backend compiled in; enable the `rustls` feature",
        ))
        .into())
    }
}

#[cfg(feature = "dangerous")]
async fn connect_cleartext(tcp: TcpStream) -> Result<BoxedIo, Error> {
    tracing::warn!("connecting over cleartext tcp, tls is disabled");
    Ok(Box::new(tcp))
}

#[cfg(not(feature = "dangerous"))]
async fn connect_cleartext(_tcp: TcpStream) -> Result<BoxedIo, Error> {
    Err(crate::error::TlsError::Handshake(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "cleartext http/2 requires the `dangerous` feature",
    ))
    .into())
}

#[cfg(feature = "rustls")]
mod rustls_backend {
    use std::fs::File;
    use std::io::BufReader;
    use std::path::Path;
    use std::sync::Arc;

    use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
    use rustls::{ClientConfig, RootCertStore};
    use tokio::net::TcpStream;
    use tokio_rustls::{client::TlsStream as RustlsStream, TlsConnector};

    use super::BoxedIo;
    use crate::config::Config;
    use crate::error::{Error, TlsError};

    const ALPN_H2: &[u8] = b"h2";

    pub(super) async fn connect(config: &Config, tcp: TcpStream) -> Result<BoxedIo, Error> {
        let tls_config = build_config(config)?;
        let connector = TlsConnector::from(Arc::new(tls_config));

        let server_name =
            ServerName::try_from(config.host().to_string()).map_err(|_| TlsError::InvalidDnsName)?;

        let stream = tokio::time::timeout(config.handshake_timeout(), connector.connect(server_name, tcp))
            .await
            .map_err(|_| TlsError::HandshakeTimeout)?
            .map_err(TlsError::Handshake)?;

        check_alpn(&stream)?;

        Ok(Box::new(stream))
    }

    fn check_alpn(stream: &RustlsStream<TcpStream>) -> Result<(), Error> {
        let (_, session) = stream.get_ref();
        match session.alpn_protocol() {
            Some(proto) if proto == ALPN_H2 => Ok(()),
            Some(proto) => Err(Error::AlpnMismatch(Some(String::from_utf8_lossy(proto).into_owned()))),
            None => Err(Error::AlpnMismatch(None)),
        }
    }

    fn build_config(config: &Config) -> Result<ClientConfig, Error> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        for path in config.extra_trust_anchor_paths() {
            for cert in load_certs(path)? {
                roots
                    .add(cert)
                    .map_err(|e| TlsError::InvalidCertificate(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
            }
        }

        let builder = ClientConfig::builder().with_root_certificates(roots);

        let mut tls_config = match config.identity() {
            Some(identity) => {
                let certs = load_certs(&identity.certificate_chain_path)?;
                let key = load_private_key(&identity.private_key_path)?;
                builder
                    .with_client_auth_cert(certs, key)
                    .map_err(|e| TlsError::InvalidCertificate(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?
            }
            None => builder.with_no_client_auth(),
        };

        tls_config.alpn_protocols = vec![ALPN_H2.to_vec()];
        Ok(tls_config)
    }

    fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, Error> {
        let file = File::open(path).map_err(TlsError::InvalidCertificate)?;
        rustls_pemfile::certs(&mut BufReader::new(file))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TlsError::InvalidCertificate(e).into())
    }

    fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, Error> {
        let file = File::open(path).map_err(TlsError::InvalidCertificate)?;
        rustls_pemfile::private_key(&mut BufReader::new(file))
            .map_err(TlsError::InvalidCertificate)?
            .ok_or(TlsError::InvalidPrivateKey)
            .map_err(Error::from)
    }
}
