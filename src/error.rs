use thiserror::Error;

/// errors surfaced while driving a connection through the handshake
#[derive(Debug, Error)]
pub enum WsError {
    /// the underlying transport reported POLLERR/POLLHUP, or a read/write
    /// failed in a way that cannot be retried
    #[error("transport is dead")]
    TransportDead,

    /// the CONNECT reply from an HTTP proxy lacked the `HTTP/1.0 200 ` prefix
    #[error("proxy rejected CONNECT: {0}")]
    ProxyRejected(String),

    /// TLS connect returned a hard error, or certificate verification failed
    #[error("tls handshake failed: {0}")]
    TlsHandshakeFailed(String),

    /// the response status line did not begin with `101`
    #[error("bad status line: {0}")]
    BadStatusLine(String),

    /// the `Upgrade` header was missing or not equal to `websocket`
    #[error("bad Upgrade header: {0:?}")]
    BadUpgrade(Option<String>),

    /// the `Connection` header was missing or did not contain `upgrade`
    #[error("bad Connection header: {0:?}")]
    BadConnection(Option<String>),

    /// the `Sec-WebSocket-Accept` header did not match the expected value
    #[error("bad Sec-WebSocket-Accept value")]
    BadAccept,

    /// the server selected a sub-protocol that was never offered
    #[error("server selected unknown protocol: {0}")]
    UnknownProtocol(String),

    /// the server listed an extension that is not locally registered
    #[error("server selected unknown extension: {0}")]
    UnknownExtension(String),

    /// a per-session or receive-buffer allocation failed
    #[error("allocation failed: {0}")]
    AllocFailed(String),

    /// the key nonce could not be sourced from the random source
    #[error("random source exhausted")]
    RandomExhausted,

    /// the deadline for the current mode elapsed before it completed
    #[error("handshake timed out")]
    Timeout,

    /// the header parser rejected malformed input
    #[error("header parse error: {0}")]
    HeaderParse(#[from] crate::parser::ParseError),

    /// a user callback vetoed the connection before establishment
    #[error("connection vetoed by filter_pre_establish")]
    FilteredOut,

    /// low-level I/O failure not otherwise classified above
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// the request or target URI was malformed
    #[error("invalid uri: {0}")]
    InvalidUri(String),
}

/// which close status applies once a connection is torn down, mirroring the
/// distinction `client.c` draws between a bare dead-socket close and a
/// close caused by a protocol violation the interpreter detected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseStatus {
    /// transport-level failure, proxy rejection, TLS failure, timeout
    NoStatus,
    /// a validation rule in the handshake interpreter was violated
    ProtocolErr,
}

impl WsError {
    /// the close status a fatal error maps to, per spec §7
    pub fn close_status(&self) -> CloseStatus {
        match self {
            // validation failures the interpreter (component 4.3) raises
            // after a complete parse
            WsError::BadStatusLine(_)
            | WsError::BadUpgrade(_)
            | WsError::BadConnection(_)
            | WsError::BadAccept
            | WsError::UnknownProtocol(_)
            | WsError::UnknownExtension(_) => CloseStatus::ProtocolErr,
            // everything else, including `HeaderParse`: the byte-fed parser
            // (component 4.1) rejects malformed input before the
            // interpreter ever runs, which `client.c`'s `bail3` path closes
            // with `NOSTATUS`, not the interpreter's `bail2`/`PROTOCOL_ERR`
            _ => CloseStatus::NoStatus,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParseError;

    #[test]
    fn interpreter_validation_failures_are_protocol_err() {
        assert_eq!(WsError::BadAccept.close_status(), CloseStatus::ProtocolErr);
        assert_eq!(
            WsError::UnknownProtocol("video".into()).close_status(),
            CloseStatus::ProtocolErr
        );
    }

    #[test]
    fn parser_failures_are_nostatus_not_protocol_err() {
        let err = WsError::HeaderParse(ParseError::BadStatusLine);
        assert_eq!(err.close_status(), CloseStatus::NoStatus);
    }

    #[test]
    fn transport_and_timeout_failures_are_nostatus() {
        assert_eq!(WsError::TransportDead.close_status(), CloseStatus::NoStatus);
        assert_eq!(WsError::Timeout.close_status(), CloseStatus::NoStatus);
    }
}
