//! BUS protocol
//!
//! Every connected BUS peer receives every message. Inbound messages are
//! stamped with the peer they came from (`HeaderKey::ORIGIN`); when the
//! application sends such a message back out, that origin peer is skipped so
//! a relayed message never returns to where it came from.

use crate::utils::{
    broadcast, forward_inbound, protocol_signature, register, snapshot, unregister,
};

use portal_core::endpoint::Endpoint;
use portal_core::neighborhood::Neighborhood;
use portal_core::protocol::{PortalCell, Protocol, ProtocolKind, ProtocolPortal};
use portal_core::task;
use std::sync::Arc;
use tracing::{debug, trace};

/// BUS protocol state.
#[derive(Default)]
pub struct Bus {
    portal: PortalCell,
    peers: Arc<Neighborhood>,
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

protocol_signature!(Bus, ProtocolKind::Bus);

impl Protocol for Bus {
    fn init(&self, portal: ProtocolPortal) {
        self.portal.set(portal.clone());

        let peers = Arc::clone(&self.peers);
        task::spawn(async move {
            while let Some(msg) = portal.next_outbound().await {
                let origin = msg.origin();
                let targets = snapshot(&peers, origin);
                trace!(
                    "[BUS] broadcasting to {} peers (origin {:?})",
                    targets.len(),
                    origin
                );
                broadcast(&targets, msg).await;
            }
            debug!("[BUS] broadcaster stopped");
        });
    }

    fn add_endpoint(&self, endpoint: Endpoint) {
        debug!("[BUS] adding peer {}", endpoint.id());
        let peer = register(&self.peers, endpoint);
        task::spawn(forward_inbound(self.portal.get().clone(), peer, true));
    }

    fn remove_endpoint(&self, endpoint: &Endpoint) {
        debug!("[BUS] removing peer {}", endpoint.id());
        unregister(&self.peers, endpoint);
    }
}
