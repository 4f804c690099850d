//! client-side WebSocket (RFC 6455) handshake core.
//!
//! Drives a single client connection from an established TCP (or tunneled,
//! or TLS-wrapped) socket through the HTTP/1.1 Upgrade negotiation, to the
//! point where the connection is ready to exchange WebSocket data frames.
//! The core is a non-blocking state machine driven by readiness events from
//! an external event loop — see [`connection::EventLoopAdapter`].
//!
//! Out of scope: the HTTP CONNECT proxy dialogue beyond its trivial reply
//! check, the event loop itself, TLS certificate store management beyond
//! the pinned `rustls` adapter, DNS resolution and TCP connect, and the
//! post-handshake framing/masking codec.

#![warn(missing_docs)]

/// collaborator callback contract (spec §6)
pub mod callbacks;
/// programmatic handshake configuration, kept from the teacher's builder
pub mod client;
/// the connection lifecycle state machine (spec §4.4)
pub mod connection;
/// `permessage-deflate` extension offer construction (spec §4.5)
#[cfg(feature = "deflate")]
pub mod deflate;
/// `WsError` and the close-status classification (spec §7)
pub mod error;
/// extension negotiation (spec §4.5) and per-connection instantiation
pub mod extension;
/// handshake response validation (spec §4.3)
pub mod interpreter;
/// `Sec-WebSocket-Key`/`Sec-WebSocket-Accept` derivation (spec §4.2)
pub mod key;
/// incremental HTTP/1.1 response parser (spec §4.1)
pub mod parser;
/// injectable random nonce source
pub mod random;
/// process-wide protocol/extension registries and scratch storage (spec §3)
pub mod registry;
/// client handshake request builder (spec §4.2 / §6)
pub mod request;
/// non-blocking transport adapter (plain or TLS)
pub mod transport;
/// post-handshake established-state placeholder
pub mod ws_frame;

pub use callbacks::{ClientCallbacks, NoopCallbacks};
pub use client::ClientBuilder;
pub use connection::{Connection, EventLoopAdapter, Mode, Readiness, Timeouts};
#[cfg(feature = "deflate")]
pub use deflate::{DeflateState, PermessageDeflate};
pub use error::{CloseStatus, WsError};
pub use extension::{Extension, ExtensionRegistry, ExtensionState};
pub use random::{OsRandom, RandomSource};
pub use registry::{Context, ProtocolHandler};
pub use request::Target;
pub use transport::{Transport, TlsMode};
