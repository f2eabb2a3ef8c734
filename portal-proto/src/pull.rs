//! PULL protocol
//!
//! Read-only fan-in: every PUSH peer's messages are forwarded to the shared
//! receive channel.

use crate::utils::{forward_inbound, protocol_signature, register, unregister};

use portal_core::endpoint::Endpoint;
use portal_core::neighborhood::Neighborhood;
use portal_core::protocol::{PortalCell, Protocol, ProtocolKind, ProtocolPortal};
use portal_core::task;
use tracing::debug;

/// PULL protocol state.
#[derive(Default)]
pub struct Pull {
    portal: PortalCell,
    peers: Neighborhood,
}

impl Pull {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

protocol_signature!(Pull, ProtocolKind::Pull);

impl Protocol for Pull {
    fn init(&self, portal: ProtocolPortal) {
        self.portal.set(portal);
    }

    fn add_endpoint(&self, endpoint: Endpoint) {
        debug!("[PULL] adding peer {}", endpoint.id());
        let peer = register(&self.peers, endpoint);
        task::spawn(forward_inbound(self.portal.get().clone(), peer, false));
    }

    fn remove_endpoint(&self, endpoint: &Endpoint) {
        debug!("[PULL] removing peer {}", endpoint.id());
        unregister(&self.peers, endpoint);
    }
}
