//! handshake response validation, sub-protocol selection, and extension
//! instantiation (spec §4.3)

use crate::error::WsError;
use crate::extension::ExtensionState;
use crate::parser::{HeaderParser, HeaderToken};
use crate::registry::Context;

/// everything the interpreter produced on success: the bound protocol name,
/// its declared per-session/rx-buffer sizing, and the ordered, constructed
/// extension state blocks
pub struct Negotiated {
    pub protocol_name: &'static str,
    pub per_session_data_size: usize,
    pub rx_buffer_size: usize,
    pub extensions: Vec<(&'static str, Box<dyn ExtensionState>)>,
}

fn header_str<'a>(parser: &'a HeaderParser, token: HeaderToken) -> Option<&'a str> {
    parser.value(token).and_then(|v| std::str::from_utf8(v).ok())
}

/// split a comma-separated list, trimming whitespace around each token.
/// spec §9 tightens the original's substring-anchored match to this strict
/// form.
fn csv_tokens(s: &str) -> impl Iterator<Item = &str> {
    s.split(',').map(str::trim).filter(|t| !t.is_empty())
}

/// run the six ordered validation rules from spec §4.3 against a completed
/// parse, select a sub-protocol, and instantiate accepted extensions.
/// the first violated rule is reported; later rules are skipped.
pub fn interpret_response(
    parser: &HeaderParser,
    ctx: &Context,
    expected_accept_b64: &str,
    offered_protocols: &[&str],
) -> Result<Negotiated, WsError> {
    // 1. status token begins with ASCII "101"
    let status_line = header_str(parser, HeaderToken::Http).unwrap_or_default();
    if !status_line.as_bytes().starts_with(b"101") {
        tracing::warn!(status_line, "handshake rejected: bad status line");
        return Err(WsError::BadStatusLine(status_line.to_string()));
    }

    // 2. Upgrade == "websocket" (case-insensitive)
    let upgrade = header_str(parser, HeaderToken::Upgrade);
    match upgrade {
        Some(v) if v.eq_ignore_ascii_case("websocket") => {}
        other => {
            tracing::warn!(?other, "handshake rejected: bad Upgrade header");
            return Err(WsError::BadUpgrade(other.map(str::to_string)));
        }
    }

    // 3. Connection equals "upgrade" (case-insensitive). Not a token-contains
    // scan over a comma-separated list: `client.c:401` does a plain `strcmp`
    // against the whole lower-cased value, and spec §4.3/§6 both say the
    // header value must *equal* "upgrade".
    let connection = header_str(parser, HeaderToken::Connection);
    match connection {
        Some(v) if v.eq_ignore_ascii_case("upgrade") => {}
        other => {
            tracing::warn!(?other, "handshake rejected: bad Connection header");
            return Err(WsError::BadConnection(other.map(str::to_string)));
        }
    }

    // 4. sub-protocol: server value must be one of the offered tokens;
    // omission selects the first locally registered protocol. Only free
    // any transient "default protocol" bookkeeping after this decision is
    // final (spec §9 open question 2) — here there is nothing to free,
    // `selected` below borrows straight from the registry.
    let protocol_name = match header_str(parser, HeaderToken::Protocol) {
        Some(server_value) => {
            let matched = offered_protocols
                .iter()
                .find(|offered| offered.eq_ignore_ascii_case(server_value.trim()));
            match matched {
                Some(name) => *name,
                None => return Err(WsError::UnknownProtocol(server_value.to_string())),
            }
        }
        None => {
            let default = ctx
                .default_protocol()
                .ok_or_else(|| WsError::UnknownProtocol(String::new()))?;
            default.name
        }
    };
    let protocol = ctx
        .protocol_by_name(protocol_name)
        .ok_or_else(|| WsError::UnknownProtocol(protocol_name.to_string()))?;

    // 5. extensions: every server-listed name must be locally known;
    // unknown extensions are fatal. Instantiate in server-listed order.
    // Uses two distinct loop variables for the server name and the
    // registry search index (spec §9 open question 3).
    let mut extensions = Vec::new();
    if let Some(ext_value) = header_str(parser, HeaderToken::Extensions) {
        for server_ext_name in csv_tokens(ext_value) {
            let server_ext_name = server_ext_name
                .split(';')
                .next()
                .unwrap_or(server_ext_name)
                .trim();
            let found = ctx.extensions.by_name(server_ext_name);
            match found {
                Some(extension) => {
                    let state = extension.client_construct();
                    extensions.push((extension.name(), state));
                }
                None => return Err(WsError::UnknownExtension(server_ext_name.to_string())),
            }
        }
    }

    // 6. Sec-WebSocket-Accept must byte-equal the precomputed value
    let accept = header_str(parser, HeaderToken::Accept);
    match accept {
        Some(v) if v == expected_accept_b64 => {}
        _ => {
            tracing::warn!("handshake rejected: Sec-WebSocket-Accept mismatch");
            return Err(WsError::BadAccept);
        }
    }

    tracing::debug!(
        protocol = protocol.name,
        extensions = extensions.len(),
        "handshake validated"
    );
    Ok(Negotiated {
        protocol_name: protocol.name,
        per_session_data_size: protocol.per_session_data_size,
        rx_buffer_size: protocol.effective_rx_buffer_size(),
        extensions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::Extension;
    use crate::parser::{Feed, HeaderParser};
    use crate::registry::{Context, ProtocolHandler};

    fn parse(resp: &[u8]) -> HeaderParser {
        let mut parser = HeaderParser::new();
        for b in resp {
            if parser.feed(*b).unwrap() == Feed::Complete {
                break;
            }
        }
        parser
    }

    #[derive(Debug)]
    struct NullState;
    impl ExtensionState for NullState {
        fn as_any(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }
    #[derive(Debug)]
    struct Deflate;
    impl Extension for Deflate {
        fn name(&self) -> &'static str {
            "permessage-deflate"
        }
        fn client_construct(&self) -> Box<dyn ExtensionState> {
            Box::new(NullState)
        }
    }

    fn ctx_with_chat() -> Context {
        let mut ctx = Context::new();
        ctx.register_protocol(ProtocolHandler::new("chat"));
        ctx.register_protocol(ProtocolHandler::new("superchat"));
        ctx
    }

    #[test]
    fn scenario_1_happy_path_no_protocol_offered() {
        let resp = b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: ICX+Yqv66kxgM0FcWaLWlFLwTAI=\r\n\r\n";
        let parser = parse(resp);
        let ctx = ctx_with_chat();
        let negotiated =
            interpret_response(&parser, &ctx, "ICX+Yqv66kxgM0FcWaLWlFLwTAI=", &[]).unwrap();
        assert_eq!(negotiated.protocol_name, "chat");
    }

    #[test]
    fn scenario_2_protocol_mismatch_is_unknown_protocol() {
        let resp = b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Protocol: video\r\nSec-WebSocket-Accept: ICX+Yqv66kxgM0FcWaLWlFLwTAI=\r\n\r\n";
        let parser = parse(resp);
        let ctx = ctx_with_chat();
        let err = interpret_response(
            &parser,
            &ctx,
            "ICX+Yqv66kxgM0FcWaLWlFLwTAI=",
            &["chat", "superchat"],
        )
        .unwrap_err();
        assert!(matches!(err, WsError::UnknownProtocol(p) if p == "video"));
    }

    #[test]
    fn scenario_3_bad_accept() {
        let resp = b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: AAAAAAAAAAAAAAAAAAAAAAAAAAA=\r\n\r\n";
        let parser = parse(resp);
        let ctx = ctx_with_chat();
        let err = interpret_response(&parser, &ctx, "ICX+Yqv66kxgM0FcWaLWlFLwTAI=", &[]).unwrap_err();
        assert!(matches!(err, WsError::BadAccept));
    }

    #[test]
    fn unknown_extension_is_fatal() {
        let resp = b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Extensions: bogus-ext\r\nSec-WebSocket-Accept: ICX+Yqv66kxgM0FcWaLWlFLwTAI=\r\n\r\n";
        let parser = parse(resp);
        let ctx = ctx_with_chat();
        let err = interpret_response(&parser, &ctx, "ICX+Yqv66kxgM0FcWaLWlFLwTAI=", &[]).unwrap_err();
        assert!(matches!(err, WsError::UnknownExtension(e) if e == "bogus-ext"));
    }

    #[test]
    fn known_extension_is_instantiated_in_server_order() {
        let resp = b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Extensions: permessage-deflate\r\nSec-WebSocket-Accept: ICX+Yqv66kxgM0FcWaLWlFLwTAI=\r\n\r\n";
        let parser = parse(resp);
        let mut ctx = ctx_with_chat();
        ctx.extensions.register(Box::new(Deflate));
        let negotiated =
            interpret_response(&parser, &ctx, "ICX+Yqv66kxgM0FcWaLWlFLwTAI=", &[]).unwrap();
        assert_eq!(negotiated.extensions.len(), 1);
        assert_eq!(negotiated.extensions[0].0, "permessage-deflate");
    }

    #[test]
    fn bad_status_line_is_rejected() {
        let resp = b"HTTP/1.1 400 Bad Request\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: ICX+Yqv66kxgM0FcWaLWlFLwTAI=\r\n\r\n";
        let parser = parse(resp);
        let ctx = ctx_with_chat();
        let err = interpret_response(&parser, &ctx, "ICX+Yqv66kxgM0FcWaLWlFLwTAI=", &[]).unwrap_err();
        assert!(matches!(err, WsError::BadStatusLine(_)));
    }
}
