//! PAIR protocol
//!
//! PAIR portals connect exactly two endpoints and move messages in both
//! directions without routing or filtering.
//!
//! # Characteristics
//!
//! - **Exclusive**: a second peer is rejected by closing its endpoint
//! - **Bidirectional**: one receive pump and one send pump per peer
//! - **Lossy on peer loss**: an in-flight outbound message is dropped

use crate::utils::{forward_inbound, forward_outbound, protocol_signature};

use parking_lot::Mutex;
use portal_core::endpoint::{Endpoint, PeerEndpoint};
use portal_core::protocol::{PortalCell, Protocol, ProtocolKind, ProtocolPortal};
use portal_core::task;
use tracing::debug;

/// PAIR protocol state.
#[derive(Default)]
pub struct Pair {
    portal: PortalCell,
    peer: Mutex<Option<PeerEndpoint>>,
}

impl Pair {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a peer is currently attached.
    pub fn is_paired(&self) -> bool {
        self.peer.lock().is_some()
    }
}

protocol_signature!(Pair, ProtocolKind::Pair);

impl Protocol for Pair {
    fn init(&self, portal: ProtocolPortal) {
        self.portal.set(portal);
    }

    fn add_endpoint(&self, endpoint: Endpoint) {
        let mut slot = self.peer.lock();
        if slot.is_some() {
            debug!("[PAIR] rejecting extra peer {}", endpoint.id());
            endpoint.close();
            return;
        }

        debug!("[PAIR] paired with {}", endpoint.id());
        let peer = PeerEndpoint::new(endpoint);
        *slot = Some(peer.clone());
        drop(slot);

        let portal = self.portal.get();
        task::spawn(forward_inbound(portal.clone(), peer.clone(), false));
        task::spawn(forward_outbound(portal.clone(), peer));
    }

    fn remove_endpoint(&self, endpoint: &Endpoint) {
        let mut slot = self.peer.lock();
        let current = slot
            .as_ref()
            .is_some_and(|peer| peer.endpoint().same_link(endpoint));
        if current {
            if let Some(peer) = slot.take() {
                debug!("[PAIR] peer {} gone", peer.id());
                peer.close();
            }
        }
    }
}
