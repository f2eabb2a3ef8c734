//! PUSH protocol
//!
//! Write-only fan-out. Every connected PULL peer runs its own send pump and
//! the pumps compete for the portal's send channel, so each message goes to
//! exactly one peer: whichever is ready first.

use crate::utils::{forward_outbound, protocol_signature, register, unregister};

use portal_core::endpoint::Endpoint;
use portal_core::neighborhood::Neighborhood;
use portal_core::protocol::{PortalCell, Protocol, ProtocolKind, ProtocolPortal};
use portal_core::task;
use tracing::debug;

/// PUSH protocol state.
#[derive(Default)]
pub struct Push {
    portal: PortalCell,
    peers: Neighborhood,
}

impl Push {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

protocol_signature!(Push, ProtocolKind::Push);

impl Protocol for Push {
    fn init(&self, mut portal: ProtocolPortal) {
        portal.close_recv_channel();
        self.portal.set(portal);
    }

    fn add_endpoint(&self, endpoint: Endpoint) {
        debug!("[PUSH] adding peer {}", endpoint.id());
        let peer = register(&self.peers, endpoint);
        task::spawn(forward_outbound(self.portal.get().clone(), peer));
    }

    fn remove_endpoint(&self, endpoint: &Endpoint) {
        debug!("[PUSH] removing peer {}", endpoint.id());
        unregister(&self.peers, endpoint);
    }
}
