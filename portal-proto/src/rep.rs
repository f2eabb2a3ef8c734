//! REP protocol
//!
//! Server side of request/reply. One serving pump per REQ peer; all pumps
//! share a protocol-wide turn lock so exactly one transaction is in flight:
//!
//! ```text
//! announce request ─► take turn ─► deliver to app ─► await reply ─► notify peer ─► release turn
//! ```
//!
//! The turn is released only after the reply has been handed to the peer, so
//! a reply can never be routed to a different requester. A reply for a
//! requester that disconnected meanwhile is dropped.

use crate::utils::{protocol_signature, register, unregister};

use futures::FutureExt;
use portal_core::endpoint::{Endpoint, PeerEndpoint};
use portal_core::neighborhood::Neighborhood;
use portal_core::protocol::{PortalCell, Protocol, ProtocolKind, ProtocolPortal};
use portal_core::task;
use std::sync::Arc;
use tracing::{debug, trace};

/// REP protocol state.
#[derive(Default)]
pub struct Rep {
    portal: PortalCell,
    peers: Neighborhood,
    turn: Arc<async_lock::Mutex<()>>,
}

impl Rep {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

protocol_signature!(Rep, ProtocolKind::Rep);

async fn serve(portal: ProtocolPortal, peer: PeerEndpoint, turn: Arc<async_lock::Mutex<()>>) {
    while let Some(request) = peer.announce().await {
        let _turn = futures::select! {
            guard = turn.lock().fuse() => guard,
            _ = peer.done().fuse() => break,
        };

        request.set_origin(peer.id());
        trace!("[REP] serving request from {}", peer.id());
        if !portal.deliver(request).await {
            break;
        }

        // The app owes this requester a reply even if it already left.
        let Some(reply) = portal.next_outbound().await else {
            break;
        };
        if !peer.notify(reply).await {
            trace!("[REP] requester {} left before the reply", peer.id());
        }
    }
    debug!("[REP] stopped serving {}", peer.id());
}

impl Protocol for Rep {
    fn init(&self, portal: ProtocolPortal) {
        self.portal.set(portal);
    }

    fn add_endpoint(&self, endpoint: Endpoint) {
        debug!("[REP] adding client {}", endpoint.id());
        let peer = register(&self.peers, endpoint);
        task::spawn(serve(
            self.portal.get().clone(),
            peer,
            Arc::clone(&self.turn),
        ));
    }

    fn remove_endpoint(&self, endpoint: &Endpoint) {
        debug!("[REP] removing client {}", endpoint.id());
        unregister(&self.peers, endpoint);
    }
}
