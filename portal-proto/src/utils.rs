//! Pumps and helpers shared by the protocol implementations.

use futures::FutureExt;
use portal_core::endpoint::{Endpoint, PeerEndpoint};
use portal_core::id::PortalId;
use portal_core::message::Message;
use portal_core::neighborhood::Neighborhood;
use portal_core::protocol::ProtocolPortal;
use smallvec::SmallVec;
use tracing::trace;

/// Peers copied out of a neighborhood for one broadcast.
pub(crate) type PeerSnapshot = SmallVec<[PeerEndpoint; 8]>;

/// Implement `ProtocolSignature` for a protocol type from its `ProtocolKind`.
macro_rules! protocol_signature {
    ($ty:ty, $kind:expr) => {
        impl ::portal_core::protocol::ProtocolSignature for $ty {
            fn number(&self) -> u16 {
                $kind.number()
            }

            fn name(&self) -> &'static str {
                $kind.as_str()
            }

            fn peer_number(&self) -> u16 {
                $kind.peer().number()
            }

            fn peer_name(&self) -> &'static str {
                $kind.peer().as_str()
            }
        }
    };
}
pub(crate) use protocol_signature;

/// Register `endpoint`, halting any entry it replaces and tearing down that
/// entry's link.
pub(crate) fn register(peers: &Neighborhood, endpoint: Endpoint) -> PeerEndpoint {
    let peer = PeerEndpoint::new(endpoint);
    if let Some(stale) = peers.set_peer(peer.id(), peer.clone()) {
        trace!("[NEIGHBORHOOD] replacing link to {}", stale.id());
        stale.close();
        stale.endpoint().close();
    }
    peer
}

/// Drop the peer registered for `endpoint`, if it is still this link.
pub(crate) fn unregister(peers: &Neighborhood, endpoint: &Endpoint) {
    let current = peers
        .get_peer(endpoint.id())
        .is_some_and(|peer| peer.endpoint().same_link(endpoint));
    if current {
        peers.drop_peer(endpoint.id());
    }
}

/// Copy every peer except `exclude` and release the read lock.
pub(crate) fn snapshot(peers: &Neighborhood, exclude: Option<PortalId>) -> PeerSnapshot {
    let view = peers.rmap();
    let out = view
        .iter()
        .filter(|(id, _)| Some(**id) != exclude)
        .map(|(_, peer)| peer.clone())
        .collect();
    view.release();
    out
}

/// Hand one reference of `msg` to every peer concurrently, then free it.
pub(crate) async fn broadcast(peers: &[PeerEndpoint], msg: Message) {
    let sends = peers.iter().map(|peer| peer.notify(msg.add_ref()));
    let delivered = futures::future::join_all(sends).await;
    trace!(
        "[BROADCAST] delivered to {}/{} peers",
        delivered.iter().filter(|ok| **ok).count(),
        peers.len()
    );
    msg.free();
}

/// Move the peer's messages to the application until either side is done.
///
/// With `stamp`, each message is tagged with the peer's id as its origin.
pub(crate) async fn forward_inbound(portal: ProtocolPortal, peer: PeerEndpoint, stamp: bool) {
    while let Some(msg) = peer.announce().await {
        if stamp {
            msg.set_origin(peer.id());
        }
        if !portal.deliver(msg).await {
            break;
        }
    }
    trace!("[INBOUND] pump for {} stopped", peer.id());
}

/// Move application messages to the peer until either side is done.
///
/// Several of these may compete for the same send channel; each message goes
/// to whichever pump takes it first. A message taken for a peer that goes
/// away is dropped.
pub(crate) async fn forward_outbound(portal: ProtocolPortal, peer: PeerEndpoint) {
    loop {
        let msg = futures::select! {
            msg = portal.next_outbound().fuse() => msg,
            _ = peer.done().fuse() => None,
        };
        let Some(msg) = msg else {
            break;
        };
        if !peer.notify(msg).await {
            trace!("[OUTBOUND] peer {} lost, message dropped", peer.id());
            break;
        }
    }
    trace!("[OUTBOUND] pump for {} stopped", peer.id());
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_core::endpoint::PeerInfo;
    use portal_core::message::MessagePool;
    use portal_core::protocol::ProtocolKind;
    use portal_core::signal::Signal;

    fn info() -> PeerInfo {
        PeerInfo {
            id: PortalId::next(),
            signature: ProtocolKind::Bus.into(),
            done: Signal::new(),
        }
    }

    #[test]
    fn test_snapshot_excludes_origin() {
        let hood = Neighborhood::new();
        let me = info();
        let others: Vec<_> = (0..3).map(|_| info()).collect();
        for other in &others {
            let (endpoint, _) = Endpoint::link(&me, other);
            register(&hood, endpoint);
        }

        assert_eq!(snapshot(&hood, None).len(), 3);
        let without = snapshot(&hood, Some(others[1].id));
        assert_eq!(without.len(), 2);
        assert!(without.iter().all(|peer| peer.id() != others[1].id));
    }

    #[test]
    fn test_unregister_ignores_other_links() {
        let hood = Neighborhood::new();
        let me = info();
        let other = info();
        let (first, _) = Endpoint::link(&me, &other);
        let (second, _) = Endpoint::link(&me, &other);

        let first_peer = register(&hood, first.clone());
        register(&hood, second.clone());
        assert!(first_peer.is_done());
        assert!(first.is_done(), "replaced link left open");
        assert!(!second.is_done());

        unregister(&hood, &first);
        assert_eq!(hood.len(), 1);
    }

    #[compio::test]
    async fn test_broadcast_frees_every_reference() {
        let pool = MessagePool::new();
        let hood = Neighborhood::new();
        let me = info();
        let mut remotes = Vec::new();
        for _ in 0..3 {
            let other = info();
            let (endpoint, remote) = Endpoint::link(&me, &other);
            register(&hood, endpoint);
            remotes.push(remote);
        }

        let peers = snapshot(&hood, None);
        let receive_all = futures::future::join_all(remotes.iter().map(|r| async move {
            r.announce().await.map(|msg| msg.value())
        }));
        let (received, ()) =
            futures::join!(receive_all, broadcast(&peers, pool.alloc_with("fan")));

        assert!(received.iter().all(|v| v.as_deref() == Some(&b"fan"[..])));
        assert_eq!(pool.stats().recycled, 1);
    }
}
