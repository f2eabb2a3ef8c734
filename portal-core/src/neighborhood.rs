//! Concurrent registry of connected peers.
//!
//! Single-key operations take the write lock briefly. Bulk iteration goes
//! through [`Neighborhood::rmap`], which holds the read lock until the
//! returned view is released; callers copy what they need and release it
//! before doing anything that can suspend.

use crate::endpoint::PeerEndpoint;
use crate::id::PortalId;

use hashbrown::HashMap;
use parking_lot::{RwLock, RwLockReadGuard};
use std::ops::Deref;
use tracing::trace;

#[derive(Debug, Default)]
pub struct Neighborhood {
    peers: RwLock<HashMap<PortalId, PeerEndpoint>>,
}

impl Neighborhood {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `peer` under `id`, returning the entry it replaced.
    pub fn set_peer(&self, id: PortalId, peer: PeerEndpoint) -> Option<PeerEndpoint> {
        self.peers.write().insert(id, peer)
    }

    pub fn get_peer(&self, id: PortalId) -> Option<PeerEndpoint> {
        self.peers.read().get(&id).cloned()
    }

    /// Remove the peer and close its halt signal.
    ///
    /// # Panics
    ///
    /// Panics if the removed peer had already been closed.
    pub fn drop_peer(&self, id: PortalId) -> Option<PeerEndpoint> {
        let peer = self.peers.write().remove(&id);
        if let Some(peer) = &peer {
            trace!("[NEIGHBORHOOD] dropping peer {}", id);
            peer.close();
        }
        peer
    }

    /// Read-locked view of every peer. Release it as soon as iteration ends.
    pub fn rmap(&self) -> NeighborhoodView<'_> {
        NeighborhoodView {
            guard: self.peers.read(),
        }
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}

/// Read-locked snapshot returned by [`Neighborhood::rmap`].
pub struct NeighborhoodView<'a> {
    guard: RwLockReadGuard<'a, HashMap<PortalId, PeerEndpoint>>,
}

impl NeighborhoodView<'_> {
    /// Give the read lock back.
    pub fn release(self) {
        drop(self);
    }
}

impl Deref for NeighborhoodView<'_> {
    type Target = HashMap<PortalId, PeerEndpoint>;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}
