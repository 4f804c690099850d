//! injectable source of the 16-byte client key nonce

use crate::error::WsError;

/// produces cryptographically acceptable bytes for the `Sec-WebSocket-Key`
/// nonce. production code uses [`OsRandom`]; tests supply a fixed stream so
/// that `expected_accept_b64` is a reproducible golden value.
pub trait RandomSource {
    /// fill `buf` with random bytes, or report that the source is exhausted
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), WsError>;
}

/// the OS CSPRNG, via `rand::random`
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), WsError> {
        rand::RngCore::try_fill_bytes(&mut rand::rngs::OsRng, buf)
            .map_err(|_| WsError::RandomExhausted)
    }
}

#[cfg(test)]
pub(crate) struct FixedRandom(pub Vec<u8>);

#[cfg(test)]
impl RandomSource for FixedRandom {
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), WsError> {
        if self.0.len() < buf.len() {
            return Err(WsError::RandomExhausted);
        }
        let tail = self.0.split_off(buf.len());
        buf.copy_from_slice(&self.0);
        self.0 = tail;
        Ok(())
    }
}
