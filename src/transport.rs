//! non-blocking transport adapter: a plain TCP socket or a TLS session
//! behind one `Read + Write`-shaped type, translating `WouldBlock` (and,
//! under the `rustls` feature, a TLS handshake still in progress) into the
//! core's "want-read"/"want-write" soft-failure signal.
//!
//! Generalized from the teacher's `src/stream.rs` `WsStream` enum, which
//! dispatches `Read`/`Write` over `Plain`/`Tls` variants for a blocking
//! socket; here the same shape drives a non-blocking one instead.

use std::io::{self, Read, Write};
use std::net::TcpStream;

/// how strictly TLS certificates are verified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    Off,
    /// verify against the configured root store
    Verified,
    /// accept self-signed certificates
    Permissive,
}

/// the result of a non-blocking operation that did not make progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Soft {
    WantRead,
    WantWrite,
}

/// a plain or TLS-wrapped non-blocking byte stream
pub enum Transport {
    Plain(TcpStream),
    #[cfg(feature = "rustls")]
    Tls(Box<TlsTransport>),
}

#[cfg(feature = "rustls")]
pub struct TlsTransport {
    pub conn: rustls::ClientConnection,
    pub sock: TcpStream,
}

impl Transport {
    pub fn plain(sock: TcpStream) -> Result<Self, io::Error> {
        sock.set_nonblocking(true)?;
        Ok(Transport::Plain(sock))
    }

    /// wrap `sock` in a `rustls::ClientConnection` for `server_name`, using
    /// (and populating) `ctx`'s shared TLS config for `mode`. The returned
    /// transport is non-blocking; the caller drives the handshake itself via
    /// [`Transport::drive_tls_connect`] from `Mode::IssueHandshake`.
    #[cfg(feature = "rustls")]
    pub fn tls(
        sock: TcpStream,
        server_name: &str,
        mode: TlsMode,
        ctx: &mut crate::registry::Context,
    ) -> Result<Self, TransportError> {
        sock.set_nonblocking(true)?;
        let config = ctx.tls_config_for(mode);
        let name = rustls::ServerName::try_from(server_name).map_err(|e| {
            TransportError::Hard(io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))
        })?;
        let conn = rustls::ClientConnection::new(config, name)
            .map_err(|e| TransportError::Hard(io::Error::new(io::ErrorKind::Other, e.to_string())))?;
        Ok(Transport::Tls(Box::new(TlsTransport { conn, sock })))
    }

    /// non-blocking read of up to `buf.len()` bytes. `Ok(0)` means EOF.
    pub fn try_read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match self {
            Transport::Plain(sock) => match sock.read(buf) {
                Ok(n) => Ok(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    Err(TransportError::Soft(Soft::WantRead))
                }
                Err(e) => Err(TransportError::Hard(e)),
            },
            #[cfg(feature = "rustls")]
            Transport::Tls(t) => tls_read(t, buf),
        }
    }

    /// non-blocking write of as much of `buf` as will fit
    pub fn try_write(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
        match self {
            Transport::Plain(sock) => match sock.write(buf) {
                Ok(n) => Ok(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    Err(TransportError::Soft(Soft::WantWrite))
                }
                Err(e) => Err(TransportError::Hard(e)),
            },
            #[cfg(feature = "rustls")]
            Transport::Tls(t) => tls_write(t, buf),
        }
    }

    /// drive one step of the TLS handshake; a no-op for plain transports
    pub fn drive_tls_connect(&mut self) -> Result<bool, TransportError> {
        match self {
            Transport::Plain(_) => Ok(true),
            #[cfg(feature = "rustls")]
            Transport::Tls(t) => tls_drive_connect(t),
        }
    }
}

/// error from a transport operation: either a soft, locally-recoverable
/// condition (re-arm interest and return) or a hard failure (close)
#[derive(Debug)]
pub enum TransportError {
    Soft(Soft),
    Hard(io::Error),
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        TransportError::Hard(e)
    }
}

/// build the `rustls::ClientConfig` for `mode`: a root-store-backed,
/// certificate-verifying config for `Verified` (and as the fallback for
/// `Off`, which never reaches this function in practice since a plain
/// transport is built with [`Transport::plain`] instead), or a config with
/// a [`PermissiveVerifier`] installed for `Permissive`, mirroring the
/// teacher's `wrap_tls` (`examples/PrivateRookie-ws-client/src/protocol.rs`)
/// which seeds its root store from `webpki_roots::TLS_SERVER_ROOTS`.
#[cfg(feature = "rustls")]
pub(crate) fn build_tls_config(mode: TlsMode) -> std::sync::Arc<rustls::ClientConfig> {
    use std::sync::Arc;

    let builder = rustls::ClientConfig::builder().with_safe_defaults();
    let config = match mode {
        TlsMode::Permissive => builder
            .with_custom_certificate_verifier(Arc::new(PermissiveVerifier))
            .with_no_client_auth(),
        TlsMode::Verified | TlsMode::Off => {
            let mut roots = rustls::RootCertStore::empty();
            roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
                rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(
                    ta.subject,
                    ta.spki,
                    ta.name_constraints,
                )
            }));
            builder.with_root_certificates(roots).with_no_client_auth()
        }
    };
    Arc::new(config)
}

/// a certificate verifier that accepts anything, including self-signed
/// certificates, for `TlsMode::Permissive`
#[cfg(feature = "rustls")]
struct PermissiveVerifier;

#[cfg(feature = "rustls")]
impl rustls::client::ServerCertVerifier for PermissiveVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::Certificate,
        _intermediates: &[rustls::Certificate],
        _server_name: &rustls::ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> Result<rustls::client::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::ServerCertVerified::assertion())
    }
}

#[cfg(feature = "rustls")]
fn tls_drive_connect(t: &mut TlsTransport) -> Result<bool, TransportError> {
    if !t.conn.is_handshaking() {
        return Ok(true);
    }
    let done = tls_drive_connect_inner(t)?;
    if done {
        tracing::debug!("tls handshake complete");
    }
    Ok(done)
}

#[cfg(feature = "rustls")]
fn tls_drive_connect_inner(t: &mut TlsTransport) -> Result<bool, TransportError> {
    if t.conn.wants_write() {
        match t.conn.write_tls(&mut t.sock) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                return Err(TransportError::Soft(Soft::WantWrite))
            }
            Err(e) => return Err(TransportError::Hard(e)),
        }
    }
    if t.conn.wants_read() {
        match t.conn.read_tls(&mut t.sock) {
            Ok(0) => {
                return Err(TransportError::Hard(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "tls peer closed during handshake",
                )))
            }
            Ok(_) => {
                t.conn
                    .process_new_packets()
                    .map_err(|e| TransportError::Hard(io::Error::new(io::ErrorKind::Other, e)))?;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                return Err(TransportError::Soft(Soft::WantRead))
            }
            Err(e) => return Err(TransportError::Hard(e)),
        }
    }
    Ok(!t.conn.is_handshaking())
}

#[cfg(feature = "rustls")]
fn tls_read(t: &mut TlsTransport, buf: &mut [u8]) -> Result<usize, TransportError> {
    match t.conn.reader().read(buf) {
        Ok(n) => Ok(n),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
            match t.conn.read_tls(&mut t.sock) {
                Ok(0) => Ok(0),
                Ok(_) => {
                    t.conn
                        .process_new_packets()
                        .map_err(|e| TransportError::Hard(io::Error::new(io::ErrorKind::Other, e)))?;
                    t.conn.reader().read(buf).map_err(TransportError::Hard)
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    Err(TransportError::Soft(Soft::WantRead))
                }
                Err(e) => Err(TransportError::Hard(e)),
            }
        }
        Err(e) => Err(TransportError::Hard(e)),
    }
}

#[cfg(feature = "rustls")]
fn tls_write(t: &mut TlsTransport, buf: &[u8]) -> Result<usize, TransportError> {
    let n = t.conn.writer().write(buf).map_err(TransportError::Hard)?;
    match t.conn.write_tls(&mut t.sock) {
        Ok(_) => Ok(n),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(TransportError::Soft(Soft::WantWrite)),
        Err(e) => Err(TransportError::Hard(e)),
    }
}
