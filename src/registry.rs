//! process-wide state: protocol registry, extension registry, shared TLS
//! config, and the scratch buffer reused across connections on one thread

use crate::extension::ExtensionRegistry;

/// default receive-buffer size used when a protocol does not request one
pub const DEFAULT_RX_BUFFER_SIZE: usize = 4096;
/// padding kept before/after the payload region of the receive buffer, so
/// the framing layer can operate in place without reallocating
pub const PRE_PAD: usize = 16;
pub const POST_PAD: usize = 16;

/// a sub-protocol the embedder is willing to speak
pub struct ProtocolHandler {
    pub name: &'static str,
    /// size of the per-session user data block allocated when this
    /// protocol is selected; zero means no allocation
    pub per_session_data_size: usize,
    /// size of the post-handshake receive buffer this protocol wants;
    /// `DEFAULT_RX_BUFFER_SIZE` is used when zero
    pub rx_buffer_size: usize,
}

impl ProtocolHandler {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            per_session_data_size: 0,
            rx_buffer_size: 0,
        }
    }

    pub fn with_session_data_size(mut self, size: usize) -> Self {
        self.per_session_data_size = size;
        self
    }

    pub fn with_rx_buffer_size(mut self, size: usize) -> Self {
        self.rx_buffer_size = size;
        self
    }

    pub(crate) fn effective_rx_buffer_size(&self) -> usize {
        if self.rx_buffer_size == 0 {
            DEFAULT_RX_BUFFER_SIZE
        } else {
            self.rx_buffer_size
        }
    }
}

/// process-wide registries and shared scratch storage. One `Context` is
/// created at library init and lives until teardown; no connection
/// outlives it. Connections belonging to a context are only ever touched
/// from the thread that owns that context (spec §5).
pub struct Context {
    pub protocols: Vec<ProtocolHandler>,
    pub extensions: ExtensionRegistry,
    /// shared scratch buffer for building the outbound handshake request.
    /// Reused across connections within one dispatch tick; the generator
    /// may not be called re-entrantly for the same context. `pub(crate)` so
    /// `request::build_client_request` can borrow it disjointly from
    /// `extensions` within one `&mut Context`.
    pub(crate) scratch: Vec<u8>,
    /// cached `rustls::ClientConfig` plus the [`crate::transport::TlsMode`]
    /// it was built for; rebuilt by [`Context::tls_config_for`] whenever the
    /// requested mode differs from whatever is cached.
    #[cfg(feature = "rustls")]
    pub tls_config: Option<(crate::transport::TlsMode, std::sync::Arc<rustls::ClientConfig>)>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            protocols: Vec::new(),
            extensions: ExtensionRegistry::new(),
            scratch: vec![0u8; 8192],
            #[cfg(feature = "rustls")]
            tls_config: None,
        }
    }

    pub fn register_protocol(&mut self, protocol: ProtocolHandler) -> &mut Self {
        self.protocols.push(protocol);
        self
    }

    pub fn protocol_by_name(&self, name: &str) -> Option<&ProtocolHandler> {
        self.protocols.iter().find(|p| p.name == name)
    }

    pub fn default_protocol(&self) -> Option<&ProtocolHandler> {
        self.protocols.first()
    }

    /// the shared `rustls::ClientConfig` for `mode`, built once and cached
    /// until a connection asks for a different mode (spec §3 `use_tls`)
    #[cfg(feature = "rustls")]
    pub fn tls_config_for(&mut self, mode: crate::transport::TlsMode) -> std::sync::Arc<rustls::ClientConfig> {
        if let Some((cached_mode, config)) = &self.tls_config {
            if *cached_mode == mode {
                return config.clone();
            }
        }
        let config = crate::transport::build_tls_config(mode);
        self.tls_config = Some((mode, config.clone()));
        config
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
