//! PUB protocol
//!
//! Write-only broadcast. A single pump takes each sent message, snapshots the
//! connected SUB peers and hands every one of them a reference concurrently.
//! The local reference is freed only after all hand-offs finished, so a
//! synchronous `send` returns once every subscriber consumed (or dropped) it.

use crate::utils::{broadcast, protocol_signature, register, snapshot, unregister};

use portal_core::endpoint::Endpoint;
use portal_core::neighborhood::Neighborhood;
use portal_core::protocol::{Protocol, ProtocolKind, ProtocolPortal};
use portal_core::task;
use std::sync::Arc;
use tracing::{debug, trace};

/// PUB protocol state.
#[derive(Default)]
pub struct Pub {
    peers: Arc<Neighborhood>,
}

impl Pub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

protocol_signature!(Pub, ProtocolKind::Pub);

impl Protocol for Pub {
    fn init(&self, mut portal: ProtocolPortal) {
        portal.close_recv_channel();

        let peers = Arc::clone(&self.peers);
        task::spawn(async move {
            while let Some(msg) = portal.next_outbound().await {
                let targets = snapshot(&peers, None);
                trace!("[PUB] publishing to {} peers", targets.len());
                broadcast(&targets, msg).await;
            }
            debug!("[PUB] publisher stopped");
        });
    }

    fn add_endpoint(&self, endpoint: Endpoint) {
        debug!("[PUB] adding subscriber {}", endpoint.id());
        register(&self.peers, endpoint);
    }

    fn remove_endpoint(&self, endpoint: &Endpoint) {
        debug!("[PUB] removing subscriber {}", endpoint.id());
        unregister(&self.peers, endpoint);
    }
}
