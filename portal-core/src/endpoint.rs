//! Endpoints: a protocol's view of a connected peer portal.
//!
//! A connection between two portals ("link") is a pair of rendezvous pipes
//! plus a link close signal. Each side gets an [`Endpoint`] describing the
//! *other* side. An endpoint is done when the link is closed, when the local
//! portal closes, or when the remote portal closes, whichever comes first.

use crate::id::PortalId;
use crate::message::Message;
use crate::protocol::Signature;
use crate::signal::Signal;

use flume::{Receiver, Sender};
use futures::FutureExt;
use std::fmt;

/// Identity, signature and lifetime of one side of a link.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub id: PortalId,
    pub signature: Signature,
    pub done: Signal,
}

/// Handle to a remote peer portal.
#[derive(Clone)]
pub struct Endpoint {
    id: PortalId,
    signature: Signature,
    outbound: Sender<Message>,
    inbound: Receiver<Message>,
    link: Signal,
    local: Signal,
    remote: Signal,
}

impl Endpoint {
    /// Build both views of a new link between `local` and `remote`.
    ///
    /// Returns `(local view, remote view)`: the first leads to `remote` and is
    /// used by `local`'s protocol, the second mirrors it for `remote`.
    pub fn link(local: &PeerInfo, remote: &PeerInfo) -> (Self, Self) {
        let (to_remote_tx, to_remote_rx) = flume::bounded(0);
        let (to_local_tx, to_local_rx) = flume::bounded(0);
        let link = Signal::new();

        let local_view = Self {
            id: remote.id,
            signature: remote.signature,
            outbound: to_remote_tx,
            inbound: to_local_rx,
            link: link.clone(),
            local: local.done.clone(),
            remote: remote.done.clone(),
        };
        let remote_view = Self {
            id: local.id,
            signature: local.signature,
            outbound: to_local_tx,
            inbound: to_remote_rx,
            link,
            local: remote.done.clone(),
            remote: local.done.clone(),
        };
        (local_view, remote_view)
    }

    /// Id of the remote portal.
    pub fn id(&self) -> PortalId {
        self.id
    }

    /// Signature of the remote portal's protocol.
    pub fn signature(&self) -> Signature {
        self.signature
    }

    /// Whether both handles belong to the same link.
    pub fn same_link(&self, other: &Self) -> bool {
        self.link.same_as(&other.link)
    }

    /// Tear the link down. Never blocks; both sides observe it.
    pub fn close(&self) -> bool {
        self.link.close()
    }

    pub fn is_done(&self) -> bool {
        self.link.is_closed() || self.local.is_closed() || self.remote.is_closed()
    }

    /// Whether the remote portal itself has closed.
    pub fn remote_closed(&self) -> bool {
        self.remote.is_closed()
    }

    pub async fn done(&self) {
        futures::select! {
            _ = self.link.done().fuse() => {},
            _ = self.local.done().fuse() => {},
            _ = self.remote.done().fuse() => {},
        }
    }

    /// Hand `msg` to the peer, waiting until it is taken.
    ///
    /// Returns `false` when the endpoint is done first; `msg` is freed then.
    pub async fn notify(&self, msg: Message) -> bool {
        if self.is_done() {
            return false;
        }
        futures::select! {
            sent = self.outbound.send_async(msg).fuse() => sent.is_ok(),
            _ = self.done().fuse() => false,
        }
    }

    /// Wait for the peer's next message, or `None` once the endpoint is done.
    pub async fn announce(&self) -> Option<Message> {
        if self.is_done() {
            return None;
        }
        futures::select! {
            msg = self.inbound.recv_async().fuse() => msg.ok(),
            _ = self.done().fuse() => None,
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("peer", &self.signature.name)
            .field("done", &self.is_done())
            .finish()
    }
}

/// Endpoint registered in a `Neighborhood`, with its own halt signal.
///
/// `Neighborhood::drop_peer` closes the halt, which stops every pump serving
/// this peer without touching the link itself.
#[derive(Clone)]
pub struct PeerEndpoint {
    endpoint: Endpoint,
    halt: Signal,
}

impl PeerEndpoint {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            halt: Signal::new(),
        }
    }

    pub fn id(&self) -> PortalId {
        self.endpoint.id()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn is_done(&self) -> bool {
        self.halt.is_closed() || self.endpoint.is_done()
    }

    pub async fn done(&self) {
        futures::select! {
            _ = self.halt.done().fuse() => {},
            _ = self.endpoint.done().fuse() => {},
        }
    }

    /// Close the halt signal.
    ///
    /// # Panics
    ///
    /// Panics if the peer was already closed.
    pub fn close(&self) {
        if !self.halt.close() {
            panic!("peer endpoint {} closed twice", self.id());
        }
    }

    pub async fn notify(&self, msg: Message) -> bool {
        if self.is_done() {
            return false;
        }
        futures::select! {
            sent = self.endpoint.notify(msg).fuse() => sent,
            _ = self.halt.done().fuse() => false,
        }
    }

    pub async fn announce(&self) -> Option<Message> {
        if self.is_done() {
            return None;
        }
        futures::select! {
            msg = self.endpoint.announce().fuse() => msg,
            _ = self.halt.done().fuse() => None,
        }
    }
}

impl fmt::Debug for PeerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerEndpoint")
            .field("endpoint", &self.endpoint)
            .field("halted", &self.halt.is_closed())
            .finish()
    }
}
