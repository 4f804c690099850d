//! `Sec-WebSocket-Key` generation and `Sec-WebSocket-Accept` precomputation

use base64::Engine;
use sha1::Digest;

use crate::error::WsError;
use crate::random::RandomSource;

/// the fixed GUID RFC 6455 mandates for the accept-value derivation
pub const GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

const BASE64: base64::engine::general_purpose::GeneralPurpose =
    base64::engine::general_purpose::STANDARD;

/// draw 16 random bytes from `source` and return their base64 encoding,
/// the value sent as `Sec-WebSocket-Key`
pub fn gen_key(source: &mut dyn RandomSource) -> Result<String, WsError> {
    let mut nonce = [0u8; 16];
    source.fill(&mut nonce)?;
    Ok(BASE64.encode(nonce))
}

/// `base64(SHA1(key_b64 ++ GUID))`, the value a conforming server must
/// return in `Sec-WebSocket-Accept`
pub fn accept_key(key_b64: &str) -> String {
    let mut hasher = sha1::Sha1::new();
    hasher.update(key_b64.as_bytes());
    hasher.update(GUID);
    BASE64.encode(hasher.finalize())
}
