//! incremental, single-byte-fed HTTP/1.1 response parser
//!
//! The transport may deliver the handshake response coalesced with the
//! first WebSocket frame in a single read, so this parser is fed one byte
//! at a time and stops consuming the instant the terminating blank line is
//! seen — any bytes after that point belong to the framing layer and are
//! never touched here.

use thiserror::Error;

/// the closed set of header tokens this parser understands. `Http` is the
/// status line itself, treated as a pseudo-header whose value is the text
/// following `HTTP/1.1 ` up to the end of the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderToken {
    Http,
    Upgrade,
    Connection,
    Accept,
    Nonce,
    Protocol,
    Extensions,
}

impl HeaderToken {
    fn match_name(name: &[u8]) -> Option<HeaderToken> {
        let eq = |a: &[u8], b: &str| a.eq_ignore_ascii_case(b.as_bytes());
        match () {
            _ if eq(name, "Upgrade") => Some(HeaderToken::Upgrade),
            _ if eq(name, "Connection") => Some(HeaderToken::Connection),
            _ if eq(name, "Sec-WebSocket-Accept") => Some(HeaderToken::Accept),
            _ if eq(name, "Sec-WebSocket-Key") => Some(HeaderToken::Nonce),
            _ if eq(name, "Sec-WebSocket-Protocol") => Some(HeaderToken::Protocol),
            _ if eq(name, "Sec-WebSocket-Extensions") => Some(HeaderToken::Extensions),
            _ => None,
        }
    }
}

/// fatal parse failures; any of these end the connection
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed status line")]
    BadStatusLine,
    #[error("too many headers (> {0})")]
    HeaderCountOverflow(usize),
    #[error("header name too long (> {0} bytes)")]
    HeaderNameOverflow(usize),
    #[error("header value too long (> {0} bytes)")]
    HeaderValueOverflow(usize),
}

/// maximum length of a header name, mirroring the per-token name cap
pub const MAX_HEADER_NAME: usize = 128;

/// result of feeding one byte to the parser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    /// more bytes are needed
    Continue,
    /// the terminating blank line was just consumed; this was the last
    /// byte the parser will accept
    Complete,
}

/// per-token accumulated value cap, mirroring `client.c`'s fixed per-header
/// buffer sizes
pub const MAX_HEADER_VALUE: usize = 4096;
/// maximum distinct headers the response may present before the client
/// gives up, mirroring the teacher's fixed-size header table philosophy
pub const MAX_HEADERS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    NamePart,
    NameSkippingWs,
    Argument,
    SkippingSawCr { at_blank_line: bool },
    Complete,
}

/// the incremental parser itself
#[derive(Debug)]
pub struct HeaderParser {
    state: State,
    is_first_line: bool,
    name_buf: Vec<u8>,
    current_token: Option<HeaderToken>,
    headers_seen: usize,
    /// ordered `(token, value)` pairs — linear search is correct given the
    /// small, fixed token set (spec §9 "Header table")
    pub tokens: Vec<(HeaderToken, Vec<u8>)>,
    bytes_consumed: usize,
}

impl Default for HeaderParser {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderParser {
    pub fn new() -> Self {
        Self {
            state: State::NamePart,
            is_first_line: true,
            name_buf: Vec::new(),
            current_token: None,
            headers_seen: 0,
            tokens: Vec::new(),
            bytes_consumed: 0,
        }
    }

    /// total bytes fed to the parser so far; once `Complete` is returned
    /// this equals the offset of the end of the terminating `\r\n\r\n`
    pub fn bytes_consumed(&self) -> usize {
        self.bytes_consumed
    }

    pub fn value(&self, token: HeaderToken) -> Option<&[u8]> {
        self.tokens
            .iter()
            .find(|(t, _)| *t == token)
            .map(|(_, v)| v.as_slice())
    }

    fn finalize_value(&mut self) {
        if let Some(token) = self.current_token.take() {
            // trim trailing whitespace that may precede the CR we already
            // stripped out at the call site
            let mut value = std::mem::take(&mut self.name_buf);
            while value.last().is_some_and(u8::is_ascii_whitespace) {
                value.pop();
            }
            self.tokens.push((token, value));
        } else {
            self.name_buf.clear();
        }
    }

    /// feed one byte; returns `Complete` exactly once, on the byte that
    /// finishes the terminating blank line
    pub fn feed(&mut self, byte: u8) -> Result<Feed, ParseError> {
        self.bytes_consumed += 1;
        match self.state {
            State::Complete => Ok(Feed::Complete),
            State::NamePart => self.feed_name_part(byte),
            State::NameSkippingWs => self.feed_name_skipping_ws(byte),
            State::Argument => self.feed_argument(byte),
            State::SkippingSawCr { at_blank_line } => self.feed_skipping_cr(byte, at_blank_line),
        }
    }

    fn feed_name_part(&mut self, byte: u8) -> Result<Feed, ParseError> {
        if byte == b'\r' {
            // CR seen with zero name bytes accumulated: either the blank
            // line terminator, or (only legal on the very first line) a
            // malformed empty status line.
            let at_blank_line = self.name_buf.is_empty() && !self.is_first_line;
            if self.name_buf.is_empty() && self.is_first_line {
                tracing::warn!("malformed status line: empty first line");
                return Err(ParseError::BadStatusLine);
            }
            if at_blank_line {
                self.state = State::SkippingSawCr { at_blank_line: true };
                return Ok(Feed::Continue);
            }
            // header line with a name but no colon ever seen: malformed,
            // but tolerate by treating whatever we have as a nameless,
            // unrecognized header and moving on.
            self.current_token = None;
            self.name_buf.clear();
            self.state = State::SkippingSawCr { at_blank_line: false };
            return Ok(Feed::Continue);
        }
        if self.is_first_line && byte == b' ' && !self.name_buf.is_empty() {
            // "HTTP/1.1" consumed as the name; what follows is the
            // status code + reason phrase, captured verbatim as the
            // argument for HeaderToken::Http.
            self.current_token = Some(HeaderToken::Http);
            self.name_buf.clear();
            self.state = State::Argument;
            return Ok(Feed::Continue);
        }
        if !self.is_first_line && byte == b':' {
            self.current_token = HeaderToken::match_name(&self.name_buf);
            self.name_buf.clear();
            self.state = State::NameSkippingWs;
            return Ok(Feed::Continue);
        }
        if self.name_buf.len() >= MAX_HEADER_NAME {
            tracing::warn!(cap = MAX_HEADER_NAME, "header name overflow");
            return Err(ParseError::HeaderNameOverflow(MAX_HEADER_NAME));
        }
        self.name_buf.push(byte);
        Ok(Feed::Continue)
    }

    fn feed_name_skipping_ws(&mut self, byte: u8) -> Result<Feed, ParseError> {
        if byte == b' ' || byte == b'\t' {
            return Ok(Feed::Continue);
        }
        self.state = State::Argument;
        self.feed_argument(byte)
    }

    fn feed_argument(&mut self, byte: u8) -> Result<Feed, ParseError> {
        if byte == b'\r' {
            self.headers_seen += 1;
            if self.headers_seen > MAX_HEADERS {
                tracing::warn!(cap = MAX_HEADERS, "header count overflow");
                return Err(ParseError::HeaderCountOverflow(MAX_HEADERS));
            }
            self.finalize_value();
            self.state = State::SkippingSawCr { at_blank_line: false };
            return Ok(Feed::Continue);
        }
        if self.name_buf.len() >= MAX_HEADER_VALUE {
            tracing::warn!(cap = MAX_HEADER_VALUE, "header value overflow");
            return Err(ParseError::HeaderValueOverflow(MAX_HEADER_VALUE));
        }
        self.name_buf.push(byte);
        Ok(Feed::Continue)
    }

    fn feed_skipping_cr(&mut self, byte: u8, at_blank_line: bool) -> Result<Feed, ParseError> {
        if byte != b'\n' {
            return Err(ParseError::BadStatusLine);
        }
        if at_blank_line {
            self.state = State::Complete;
            return Ok(Feed::Complete);
        }
        self.is_first_line = false;
        self.state = State::NamePart;
        Ok(Feed::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(resp: &[u8]) -> (HeaderParser, usize) {
        let mut parser = HeaderParser::new();
        let mut consumed_at_complete = None;
        for (i, b) in resp.iter().enumerate() {
            match parser.feed(*b).unwrap() {
                Feed::Continue => {}
                Feed::Complete => {
                    consumed_at_complete = Some(i + 1);
                    break;
                }
            }
        }
        (parser, consumed_at_complete.expect("parser never completed"))
    }

    #[test]
    fn parses_happy_path_response() {
        let resp = b"HTTP/1.1 101 Switching Protocols\r\n\
Upgrade: websocket\r\n\
Connection: Upgrade\r\n\
Sec-WebSocket-Accept: ICX+Yqv66kxgM0FcWaLWlFLwTAI=\r\n\
\r\n";
        let (parser, consumed) = feed_all(resp);
        assert_eq!(consumed, resp.len());
        assert_eq!(
            parser.value(HeaderToken::Http).unwrap(),
            b"101 Switching Protocols"
        );
        assert_eq!(parser.value(HeaderToken::Upgrade).unwrap(), b"websocket");
        assert_eq!(parser.value(HeaderToken::Connection).unwrap(), b"Upgrade");
        assert_eq!(
            parser.value(HeaderToken::Accept).unwrap(),
            b"ICX+Yqv66kxgM0FcWaLWlFLwTAI="
        );
    }

    #[test]
    fn non_over_read_leaves_coalesced_frame_untouched() {
        let mut resp = b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: ICX+Yqv66kxgM0FcWaLWlFLwTAI=\r\n\r\n".to_vec();
        let frame = [0x81u8, 0x05, b'H', b'e', b'l', b'l', b'o'];
        let header_len = resp.len();
        resp.extend_from_slice(&frame);

        let mut parser = HeaderParser::new();
        let mut i = 0;
        loop {
            let feed = parser.feed(resp[i]).unwrap();
            i += 1;
            if feed == Feed::Complete {
                break;
            }
        }
        assert_eq!(i, header_len);
        assert_eq!(&resp[i..], &frame);
    }

    #[test]
    fn case_insensitive_header_names_and_values_preserved() {
        let resp = b"HTTP/1.1 101 Switching Protocols\r\nUPGRADE: WebSocket\r\nCONNECTION: UPGRADE\r\nsec-websocket-accept: x\r\n\r\n";
        let (parser, _) = feed_all(resp);
        assert_eq!(parser.value(HeaderToken::Upgrade).unwrap(), b"WebSocket");
        assert_eq!(parser.value(HeaderToken::Connection).unwrap(), b"UPGRADE");
        assert_eq!(parser.value(HeaderToken::Accept).unwrap(), b"x");
    }

    #[test]
    fn unrecognized_headers_are_ignored_but_consumed() {
        let resp = b"HTTP/1.1 101 Switching Protocols\r\nX-Custom: whatever\r\nUpgrade: websocket\r\n\r\n";
        let (parser, consumed) = feed_all(resp);
        assert_eq!(consumed, resp.len());
        assert_eq!(parser.value(HeaderToken::Upgrade).unwrap(), b"websocket");
    }

    #[test]
    fn value_overflow_is_fatal() {
        let mut parser = HeaderParser::new();
        for b in b"HTTP/1.1 101 " {
            parser.feed(*b).unwrap();
        }
        for _ in 0..(MAX_HEADER_VALUE + 1) {
            if let Err(e) = parser.feed(b'x') {
                assert_eq!(e, ParseError::HeaderValueOverflow(MAX_HEADER_VALUE));
                return;
            }
        }
        panic!("expected overflow error");
    }
}
