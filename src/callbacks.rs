//! collaborator callback contract the core consumes (spec §6)
//!
//! Generalized from the teacher's one-shot `FnMut` closures passed into
//! `ClientBuilder::connect` (`src/lib.rs`) into a full trait covering every
//! callback point the handshake core fires, each with a no-op default so
//! embedders only override what they need.

use crate::extension::ExtensionState;

/// the eight callback points the core fires while driving a handshake
pub trait ClientCallbacks {
    /// the core wants to drop POLLOUT interest, typically mid-TLS-handshake
    fn clear_mode_poll_fd(&mut self) {}

    /// asked once per candidate extension before it is proposed; `true`
    /// (the zero-return convention in spec terms) means allow
    fn confirm_extension_supported(&mut self, _name: &str) -> bool {
        true
    }

    /// invoked once while building the request, with the remaining buffer
    /// capacity, to permit cookie-like additions
    fn append_handshake_header(&mut self, _out: &mut dyn std::io::Write) -> std::io::Result<()> {
        Ok(())
    }

    /// after full validation, before commit; returning `false` vetoes the
    /// connection
    fn filter_pre_establish(&mut self) -> bool {
        true
    }

    /// the handshake committed and the connection is ready for data frames
    fn on_established(&mut self, protocol_name: &str) {
        let _ = protocol_name;
    }

    /// any fatal handshake failure
    fn on_connection_error(&mut self, _err: &crate::error::WsError) {}

    /// fired per accepted extension, in server-listed order
    fn extension_client_construct(&mut self, _name: &str, _state: &mut dyn ExtensionState) {}

    /// fired after establishment, for every *registered* extension; `state`
    /// is `Some` only for extensions actually negotiated on this connection
    fn extension_any_wsi_established(&mut self, _name: &str, _state: Option<&mut dyn ExtensionState>) {}
}

/// a callback set that takes no action, used when the embedder hasn't
/// bound anything yet
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCallbacks;

impl ClientCallbacks for NoopCallbacks {}
