//! `permessage-deflate` extension (RFC 7692), gated behind the `deflate`
//! feature, matching the teacher's own `codec/deflate.rs` gate.
//!
//! Only the handshake-time surface lives here: offer construction and
//! per-connection `Compress`/`Decompress` allocation. The data-plane side
//! (compressing/decompressing frame payloads) belongs to the framing layer,
//! which is out of this crate's scope — the allocated codecs are handed off
//! ready for whatever framing layer the embedder builds on top.

use flate2::{Compress, Compression, Decompress};

use crate::extension::{Extension, ExtensionState};

const EXT_ID: &str = "permessage-deflate";

/// negotiable parameters this client is willing to offer, mirroring the
/// teacher's `DeflateConfig`
#[derive(Debug, Clone, Default)]
pub struct PermessageDeflate {
    pub server_no_context_takeover: bool,
    pub client_no_context_takeover: bool,
    pub client_max_window_bits: Option<u8>,
}

/// the per-connection compressor/decompressor pair, idle until the framing
/// layer drives them
#[derive(Debug)]
pub struct DeflateState {
    pub compress: Compress,
    pub decompress: Decompress,
}

impl ExtensionState for DeflateState {
    fn as_any(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

impl Extension for PermessageDeflate {
    fn name(&self) -> &'static str {
        EXT_ID
    }

    fn offer_header_value(&self) -> String {
        let mut parts = vec![EXT_ID.to_string()];
        if self.server_no_context_takeover {
            parts.push("server_no_context_takeover".to_string());
        }
        if self.client_no_context_takeover {
            parts.push("client_no_context_takeover".to_string());
        }
        if let Some(bits) = self.client_max_window_bits {
            parts.push(format!("client_max_window_bits={bits}"));
        }
        parts.join("; ")
    }

    fn client_construct(&self) -> Box<dyn ExtensionState> {
        Box::new(DeflateState {
            compress: Compress::new(Compression::fast(), false),
            decompress: Decompress::new(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offer_header_includes_requested_params() {
        let ext = PermessageDeflate {
            client_no_context_takeover: true,
            client_max_window_bits: Some(10),
            ..Default::default()
        };
        assert_eq!(
            ext.offer_header_value(),
            "permessage-deflate; client_no_context_takeover; client_max_window_bits=10"
        );
    }

    #[test]
    fn bare_offer_with_no_params() {
        let ext = PermessageDeflate::default();
        assert_eq!(ext.offer_header_value(), "permessage-deflate");
    }

    #[test]
    fn client_construct_yields_idle_codec_pair() {
        let ext = PermessageDeflate::default();
        let mut state = ext.client_construct();
        assert!(state.as_any().downcast_mut::<DeflateState>().is_some());
    }
}
