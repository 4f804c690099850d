//! client handshake request builder (spec §4.2 / §6)

use std::io::Write;

use crate::callbacks::ClientCallbacks;
use crate::error::WsError;
use crate::extension::propose_extensions;
use crate::key::{accept_key, gen_key};
use crate::random::RandomSource;
use crate::registry::Context;

/// bytes the safety tail reserves so `append_headers` can never overrun the
/// caller's buffer before the terminating blank line is written
const SAFETY_TAIL: usize = 12;

/// target of a single client connection's handshake
#[derive(Debug, Clone)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub origin: Option<String>,
    /// protocol version; selects `Origin:` (13) vs `Sec-WebSocket-Origin:`
    /// (anything else)
    pub version: u8,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            path: path.into(),
            origin: None,
            version: 13,
        }
    }
}

/// the fully built request plus the precomputed expected accept value
pub struct BuiltRequest {
    pub bytes_written: usize,
    pub expected_accept_b64: String,
}

/// produce the client Upgrade request in the wire-authoritative order from
/// spec §6, writing into `ctx`'s scratch buffer. Takes `ctx` by unique
/// reference (rather than a separate `dst` slice plus a shared `&Context`)
/// so the scratch buffer and the extension registry — disjoint fields of
/// the same `Context` — can be borrowed simultaneously without aliasing.
/// `offered_protocols` is the comma-joined list already owned by the
/// connection; `extra_headers` are fixed `name: value` pairs (from
/// `ClientBuilder::header`) written ahead of the user's
/// `CLIENT_APPEND_HANDSHAKE_HEADER` callback; `callbacks` supplies both that
/// callback and the `CLIENT_CONFIRM_EXTENSION_SUPPORTED` veto (spec §4.5)
/// applied after the pairwise extension veto check. Threading a single
/// `&mut dyn ClientCallbacks` through (rather than a confirmation closure
/// plus a separate append closure, each independently capturing it) avoids
/// needing two live mutable borrows of the same callbacks object at once.
pub fn build_client_request(
    ctx: &mut Context,
    random: &mut dyn RandomSource,
    target: &Target,
    offered_protocols: &str,
    extra_headers: &[(String, String)],
    callbacks: &mut dyn ClientCallbacks,
) -> Result<BuiltRequest, WsError> {
    let key_b64 = gen_key(random)?;
    let expected_accept_b64 = accept_key(&key_b64);

    let extensions: Vec<String> =
        propose_extensions(&ctx.extensions, |name| callbacks.confirm_extension_supported(name))
            .into_iter()
            .filter_map(|name| ctx.extensions.by_name(name).map(|e| e.offer_header_value()))
            .collect();

    let mut cursor = std::io::Cursor::new(ctx.scratch.as_mut_slice());

    write!(cursor, "GET {} HTTP/1.1\r\n", target.path)?;
    write!(cursor, "Pragma: no-cache\r\nCache-Control: no-cache\r\n")?;
    write!(cursor, "Host: {}\r\n", target.host)?;
    write!(
        cursor,
        "Upgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: {}\r\n",
        key_b64
    )?;

    if let Some(origin) = &target.origin {
        if target.version == 13 {
            write!(cursor, "Origin: {}\r\n", origin)?;
        } else {
            write!(cursor, "Sec-WebSocket-Origin: {}\r\n", origin)?;
        }
    }

    if !offered_protocols.is_empty() {
        write!(cursor, "Sec-WebSocket-Protocol: {}\r\n", offered_protocols)?;
    }

    // unconditional per spec §6's wire-authoritative order, matching
    // `lib/client.c`'s unconditional `sprintf(p, "Sec-WebSocket-Extensions: ")`
    // even when no extension survives negotiation
    write!(cursor, "Sec-WebSocket-Extensions: {}\r\n", extensions.join(", "))?;

    if target.version != 0 {
        write!(cursor, "Sec-WebSocket-Version: {}\r\n", target.version)?;
    }

    let pos = cursor.position() as usize;
    let total_len = cursor.get_ref().len();
    let usable = total_len.saturating_sub(pos).saturating_sub(SAFETY_TAIL);
    let written = {
        let window = &mut cursor.get_mut()[pos..pos + usable];
        let mut window_cursor = std::io::Cursor::new(window);
        for (name, value) in extra_headers {
            write!(window_cursor, "{name}: {value}\r\n")?;
        }
        callbacks
            .append_handshake_header(&mut window_cursor)
            .map_err(WsError::from)?;
        window_cursor.position() as usize
    };
    cursor.set_position((pos + written) as u64);

    write!(cursor, "\r\n")?;

    Ok(BuiltRequest {
        bytes_written: cursor.position() as usize,
        expected_accept_b64,
    })
}
