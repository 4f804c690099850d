//! extension negotiation: registry of capability objects, proposal
//! filtering (spec §4.5), and per-connection instantiation (spec §4.3)

use std::any::Any;

/// per-connection extension state, owned by the connection once
/// `client_construct` has been called
pub trait ExtensionState: Any + std::fmt::Debug {
    fn as_any(&mut self) -> &mut dyn Any;
}

/// capability set an extension exposes, per spec §9's "Extension registry
/// as a sequence of capability objects"
pub trait Extension: std::fmt::Debug {
    /// the name advertised/matched in `Sec-WebSocket-Extensions`
    fn name(&self) -> &'static str;

    /// asked of every *other* registered extension before this one is
    /// proposed; a `false` return vetoes the candidate
    fn check_ok_to_propose(&self, _candidate: &str) -> bool {
        true
    }

    /// construct per-connection state once the server has accepted this
    /// extension; called in the order the server listed extensions
    fn client_construct(&self) -> Box<dyn ExtensionState>;

    /// fired on every registered extension after establishment; `state`
    /// is `Some` only for extensions that were actually negotiated
    fn any_wsi_established(&self, _state: Option<&mut dyn ExtensionState>) {}

    /// the exact `Sec-WebSocket-Extensions` offer fragment for this
    /// extension, e.g. `"permessage-deflate; client_no_context_takeover"`.
    /// Defaults to the bare name for extensions with no parameters.
    fn offer_header_value(&self) -> String {
        self.name().to_string()
    }
}

/// process-wide table of known extensions, registry order preserved
#[derive(Default)]
pub struct ExtensionRegistry {
    extensions: Vec<Box<dyn Extension>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self {
            extensions: Vec::new(),
        }
    }

    pub fn register(&mut self, extension: Box<dyn Extension>) -> &mut Self {
        self.extensions.push(extension);
        self
    }

    pub fn by_name(&self, name: &str) -> Option<&dyn Extension> {
        self.extensions
            .iter()
            .find(|e| e.name() == name)
            .map(|e| e.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Extension> {
        self.extensions.iter().map(|e| e.as_ref())
    }
}

/// before emitting `Sec-WebSocket-Extensions:`, every registered extension
/// is polled by every other registered extension
/// (`CHECK_OK_TO_PROPOSE_EXTENSION`); a veto from any peer drops the
/// candidate. Survivors are then filtered by the user-supplied
/// `confirm_supported` callback (`CLIENT_CONFIRM_EXTENSION_SUPPORTED`,
/// zero/true means allow). Registry order is preserved throughout.
pub fn propose_extensions(
    registry: &ExtensionRegistry,
    mut confirm_supported: impl FnMut(&str) -> bool,
) -> Vec<&'static str> {
    let all: Vec<&dyn Extension> = registry.iter().collect();
    all.iter()
        .enumerate()
        .filter(|(candidate_idx, candidate)| {
            all.iter()
                .enumerate()
                .all(|(peer_idx, peer)| peer_idx == *candidate_idx || peer.check_ok_to_propose(candidate.name()))
        })
        .filter(|(_, candidate)| confirm_supported(candidate.name()))
        .map(|(_, e)| e.name())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct NullState;
    impl ExtensionState for NullState {
        fn as_any(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[derive(Debug)]
    struct Noop(&'static str);
    impl Extension for Noop {
        fn name(&self) -> &'static str {
            self.0
        }
        fn client_construct(&self) -> Box<dyn ExtensionState> {
            Box::new(NullState)
        }
    }

    #[derive(Debug)]
    struct Vetoer;
    impl Extension for Vetoer {
        fn name(&self) -> &'static str {
            "vetoer"
        }
        fn check_ok_to_propose(&self, candidate: &str) -> bool {
            candidate != "permessage-deflate"
        }
        fn client_construct(&self) -> Box<dyn ExtensionState> {
            Box::new(NullState)
        }
    }

    #[test]
    fn proposal_preserves_registry_order() {
        let mut reg = ExtensionRegistry::new();
        reg.register(Box::new(Noop("a")));
        reg.register(Box::new(Noop("b")));
        let proposed = propose_extensions(&reg, |_| true);
        assert_eq!(proposed, vec!["a", "b"]);
    }

    #[test]
    fn peer_veto_drops_candidate() {
        let mut reg = ExtensionRegistry::new();
        reg.register(Box::new(Vetoer));
        reg.register(Box::new(Noop("permessage-deflate")));
        let proposed = propose_extensions(&reg, |_| true);
        assert_eq!(proposed, vec!["vetoer"]);
    }

    #[test]
    fn user_callback_filters_remaining() {
        let mut reg = ExtensionRegistry::new();
        reg.register(Box::new(Noop("a")));
        reg.register(Box::new(Noop("b")));
        let proposed = propose_extensions(&reg, |name| name != "b");
        assert_eq!(proposed, vec!["a"]);
    }
}
