//! STAR protocol
//!
//! A BUS that relays. Messages sent locally are broadcast to every peer.
//! Messages arriving from a peer are surfaced to the local application and
//! rebroadcast to every other peer, never back to the one they came from.
//!
//! Each message entering the mesh is given a trace id (`HeaderKey::TRACE`).
//! A star remembers the trace ids it has sent or relayed and drops any copy
//! it sees again, so a message crosses each star once even in cyclic meshes.

use crate::utils::{broadcast, protocol_signature, register, snapshot, unregister};

use flume::{Receiver, Sender};
use futures::FutureExt;
use hashbrown::HashSet;
use portal_core::endpoint::{Endpoint, PeerEndpoint};
use portal_core::id::PortalId;
use portal_core::message::Message;
use portal_core::neighborhood::Neighborhood;
use portal_core::protocol::{Protocol, ProtocolKind, ProtocolPortal};
use portal_core::task;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Trace ids remembered per star.
const SEEN_CAPACITY: usize = 1024;

static NEXT_TRACE: AtomicU64 = AtomicU64::new(1);

/// A message received from a peer, with the peer it came from.
type Relayed = (Message, PortalId);

/// Bounded set of recently seen trace ids; the oldest is forgotten first.
#[derive(Debug, Default)]
struct Seen {
    order: VecDeque<u64>,
    ids: HashSet<u64>,
}

impl Seen {
    /// Record `trace`. Returns `false` if it was already known.
    fn insert(&mut self, trace: u64) -> bool {
        if !self.ids.insert(trace) {
            return false;
        }
        self.order.push_back(trace);
        if self.order.len() > SEEN_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        true
    }

    /// Give `msg` a fresh trace id and record it.
    fn stamp(&mut self, msg: &Message) {
        let trace = NEXT_TRACE.fetch_add(1, Ordering::Relaxed);
        msg.set_trace(trace);
        self.insert(trace);
    }
}

/// STAR protocol state.
pub struct Star {
    peers: Arc<Neighborhood>,
    relay_tx: Sender<Relayed>,
    relay_rx: Receiver<Relayed>,
}

impl Star {
    pub fn new() -> Self {
        let (relay_tx, relay_rx) = flume::unbounded();
        Self {
            peers: Arc::default(),
            relay_tx,
            relay_rx,
        }
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

impl Default for Star {
    fn default() -> Self {
        Self::new()
    }
}

protocol_signature!(Star, ProtocolKind::Star);

async fn run(portal: ProtocolPortal, peers: Arc<Neighborhood>, relay: Receiver<Relayed>) {
    let mut seen = Seen::default();
    loop {
        futures::select! {
            msg = portal.next_outbound().fuse() => {
                let Some(msg) = msg else { break };
                seen.stamp(&msg);
                let targets = snapshot(&peers, None);
                trace!("[STAR] broadcasting local message to {} peers", targets.len());
                broadcast(&targets, msg).await;
            }
            relayed = relay.recv_async().fuse() => {
                let Ok((msg, origin)) = relayed else { break };
                let fresh = match msg.trace() {
                    Some(id) => seen.insert(id),
                    None => {
                        seen.stamp(&msg);
                        true
                    }
                };
                if fresh {
                    let targets = snapshot(&peers, Some(origin));
                    trace!("[STAR] relaying from {} to {} peers", origin, targets.len());
                    let local = msg.add_ref();
                    let (_, delivered) =
                        futures::join!(broadcast(&targets, msg), portal.deliver(local));
                    if !delivered {
                        break;
                    }
                } else {
                    trace!("[STAR] dropping repeat from {}", origin);
                    msg.free();
                }
            }
        }
    }
    debug!("[STAR] core stopped");
}

async fn collect(peer: PeerEndpoint, relay: Sender<Relayed>) {
    while let Some(msg) = peer.announce().await {
        msg.set_origin(peer.id());
        if relay.send((msg, peer.id())).is_err() {
            break;
        }
    }
}

impl Protocol for Star {
    fn init(&self, portal: ProtocolPortal) {
        task::spawn(run(
            portal,
            Arc::clone(&self.peers),
            self.relay_rx.clone(),
        ));
    }

    fn add_endpoint(&self, endpoint: Endpoint) {
        debug!("[STAR] adding peer {}", endpoint.id());
        let peer = register(&self.peers, endpoint);
        task::spawn(collect(peer, self.relay_tx.clone()));
    }

    fn remove_endpoint(&self, endpoint: &Endpoint) {
        debug!("[STAR] removing peer {}", endpoint.id());
        unregister(&self.peers, endpoint);
    }
}
