//! thin placeholder for the post-handshake, established connection state.
//!
//! Framing and masking are out of this crate's scope (spec §1); this module
//! carries only the allocation-sizing contract spec §4.3 assigns to the
//! `ESTABLISHED` transition, so the connection has somewhere to hand off to
//! once negotiation completes.

use bytes::BytesMut;

use crate::registry::{POST_PAD, PRE_PAD};

/// the receive buffer for post-handshake frame data, sized
/// `max(protocol.rx_buffer_size, DEFAULT) + PRE_PAD + POST_PAD` per spec
/// §4.3, allocated exactly once on the success path.
#[derive(Debug)]
pub struct WsFrameState {
    pub rx_buffer: BytesMut,
}

impl WsFrameState {
    pub fn allocate(rx_buffer_size: usize) -> Self {
        let capacity = rx_buffer_size + PRE_PAD + POST_PAD;
        Self {
            rx_buffer: BytesMut::with_capacity(capacity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_with_pre_and_post_padding() {
        let state = WsFrameState::allocate(1024);
        assert_eq!(state.rx_buffer.capacity(), 1024 + PRE_PAD + POST_PAD);
    }
}
