//! programmatic handshake configuration, kept from the teacher's
//! `ClientBuilder` and adapted from its one-shot blocking `connect` to this
//! crate's non-blocking `Connection`.

use crate::connection::Connection;
use crate::request::Target;
use crate::transport::Transport;

/// builder for the per-connection handshake configuration: offered
/// sub-protocols, version, and fixed request headers. Extension proposal is
/// driven by the `Context`'s `ExtensionRegistry`, not by this builder,
/// since extensions are capability objects registered once per process.
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    protocols: Vec<String>,
    version: u8,
    headers: Vec<(String, String)>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            protocols: Vec::new(),
            version: 13,
            headers: Vec::new(),
        }
    }
}

impl ClientBuilder {
    /// a builder with no protocols, version 13, and no fixed headers
    pub fn new() -> Self {
        Self::default()
    }

    /// add one offered sub-protocol
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocols.push(protocol.into());
        self
    }

    /// replace the offered sub-protocol list
    pub fn protocols(self, protocols: Vec<String>) -> Self {
        Self { protocols, ..self }
    }

    /// set the WebSocket version (13 emits `Origin:`, anything else
    /// `Sec-WebSocket-Origin:`)
    pub fn version(self, version: u8) -> Self {
        Self { version, ..self }
    }

    /// add one fixed request header, written ahead of the
    /// `append_handshake_header` callback
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// replace the fixed request header list
    pub fn headers(self, headers: Vec<(String, String)>) -> Self {
        Self { headers, ..self }
    }

    /// build the `Connection` that will drive the handshake over
    /// `transport`, bound to `target` (whose `version` is overridden by
    /// this builder's) and optionally dialed through a CONNECT proxy
    pub fn connect(self, transport: Transport, mut target: Target, using_proxy: bool) -> Connection {
        target.version = self.version;
        let offered: Vec<&str> = self.protocols.iter().map(String::as_str).collect();
        Connection::new(transport, target, &offered, using_proxy).with_extra_headers(self.headers)
    }
}
