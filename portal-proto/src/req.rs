//! REQ protocol
//!
//! Client side of request/reply. Each REP peer runs a send pump competing
//! for outbound requests and a receive pump that tags replies with the peer's
//! id (`HeaderKey::ORIGIN`) before handing them to the application.

use crate::utils::{forward_inbound, forward_outbound, protocol_signature, register, unregister};

use portal_core::endpoint::Endpoint;
use portal_core::neighborhood::Neighborhood;
use portal_core::protocol::{PortalCell, Protocol, ProtocolKind, ProtocolPortal};
use portal_core::task;
use tracing::debug;

/// REQ protocol state.
#[derive(Default)]
pub struct Req {
    portal: PortalCell,
    peers: Neighborhood,
}

impl Req {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

protocol_signature!(Req, ProtocolKind::Req);

impl Protocol for Req {
    fn init(&self, portal: ProtocolPortal) {
        self.portal.set(portal);
    }

    fn add_endpoint(&self, endpoint: Endpoint) {
        debug!("[REQ] adding server {}", endpoint.id());
        let peer = register(&self.peers, endpoint);
        let portal = self.portal.get();
        task::spawn(forward_outbound(portal.clone(), peer.clone()));
        task::spawn(forward_inbound(portal.clone(), peer, true));
    }

    fn remove_endpoint(&self, endpoint: &Endpoint) {
        debug!("[REQ] removing server {}", endpoint.id());
        unregister(&self.peers, endpoint);
    }
}
