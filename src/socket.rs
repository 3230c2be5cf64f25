//! The transport collaborator (spec §6 "Transport collaborator
//! interface"). The core only needs an async byte stream with TLS
//! already established; `tokio::io::{AsyncRead, AsyncWrite}` is that
//! interface, so [`Session`](crate::session::Session) is generic over it
//! instead of a bespoke trait — a real connection plugs in a
//! `tokio_rustls::client::TlsStream<TcpStream>`, tests plug in one half
//! of a `tokio::io::duplex`. `connect` below is the one concrete
//! collaborator that builds the former, constructed the way the
//! teacher's `Client::default` builds its rustls config.

use crate::error::TransportError;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::rustls::{OwnedTrustAnchor, RootCertStore, ServerName};
use tokio_rustls::{client::TlsStream, TlsConnector};

pub async fn connect(
    host: &str,
    port: u16,
    connect_timeout: Option<Duration>,
    tls_config: Arc<tokio_rustls::rustls::ClientConfig>,
) -> Result<TlsStream<TcpStream>, TransportError> {
    let addr = format!("{host}:{port}");
    let tcp = match connect_timeout {
        Some(d) => timeout(d, TcpStream::connect(&addr))
            .await
            .map_err(|_| TransportError::ConnectTimeout)??,
        None => TcpStream::connect(&addr).await?,
    };
    tcp.set_nodelay(true).ok();

    let connector = TlsConnector::from(tls_config);
    let server_name =
        ServerName::try_from(host).map_err(|_| TransportError::TlsVerificationFailed)?;
    connector
        .connect(server_name, tcp)
        .await
        .map_err(|_| TransportError::TlsVerificationFailed)
}

/// Reads back the negotiated protocol string (spec.md's Non-goals keep
/// ALPN/NPN negotiation itself out of core; this just exposes the result).
pub fn negotiated_protocol(stream: &TlsStream<TcpStream>) -> Option<String> {
    stream
        .get_ref()
        .1
        .alpn_protocol()
        .map(|p| String::from_utf8_lossy(p).into_owned())
}

/// Builds the `rustls::ClientConfig` the way the teacher's `Client::default`
/// does (webpki-roots trust anchors), advertising SPDY's ALPN id instead
/// of h2's.
pub fn default_tls_config() -> Arc<tokio_rustls::rustls::ClientConfig> {
    let mut root_store = RootCertStore::empty();
    root_store.add_server_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.0.iter().map(|ta| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            ta.subject,
            ta.spki,
            ta.name_constraints,
        )
    }));
    let mut config = tokio_rustls::rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    config.alpn_protocols = vec![b"spdy/3.1".to_vec()];
    Arc::new(config)
}
