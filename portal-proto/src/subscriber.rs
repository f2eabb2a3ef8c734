//! SUB protocol
//!
//! Read-only, filtered fan-in from PUB peers. Each peer gets a receive pump
//! that checks the value against the subscription set; non-matching messages
//! are freed without reaching the application.
//!
//! A fresh SUB portal has no subscriptions and therefore receives nothing.

use crate::subscription::{Subscriptions, Topic};
use crate::utils::{protocol_signature, register, unregister};

use bytes::Bytes;
use parking_lot::RwLock;
use portal_core::endpoint::{Endpoint, PeerEndpoint};
use portal_core::error::Result;
use portal_core::guard::ReadOnly;
use portal_core::id::PortalId;
use portal_core::message::Message;
use portal_core::neighborhood::Neighborhood;
use portal_core::portal::Portal;
use portal_core::protocol::{PortalCell, Protocol, ProtocolKind, ProtocolPortal};
use portal_core::signal::Signal;
use portal_core::task;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// SUB protocol state.
#[derive(Default)]
pub struct Sub {
    portal: PortalCell,
    peers: Neighborhood,
    topics: Arc<RwLock<Subscriptions>>,
}

impl Sub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a topic to the subscription set.
    ///
    /// # Errors
    ///
    /// `AlreadySubscribed` if an equal topic is already subscribed.
    pub fn subscribe(&self, topic: Topic) -> Result<()> {
        trace!("[SUB] subscribe {:?}", topic);
        self.topics.write().subscribe(topic)
    }

    /// Remove a topic. Messages already queued for the application stay.
    pub fn unsubscribe(&self, topic: &Topic) {
        trace!("[SUB] unsubscribe {:?}", topic);
        self.topics.write().unsubscribe(topic);
    }

    pub fn subscription_count(&self) -> usize {
        self.topics.read().len()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

protocol_signature!(Sub, ProtocolKind::Sub);

async fn filter_inbound(
    portal: ProtocolPortal,
    peer: PeerEndpoint,
    topics: Arc<RwLock<Subscriptions>>,
) {
    while let Some(msg) = peer.announce().await {
        let wanted = topics.read().matches(&msg.value());
        if !wanted {
            trace!("[SUB] filtered message from {}", peer.id());
            msg.free();
            continue;
        }
        if !portal.deliver(msg).await {
            break;
        }
    }
}

impl Protocol for Sub {
    fn init(&self, portal: ProtocolPortal) {
        self.portal.set(portal);
    }

    fn add_endpoint(&self, endpoint: Endpoint) {
        debug!("[SUB] adding publisher {}", endpoint.id());
        let peer = register(&self.peers, endpoint);
        task::spawn(filter_inbound(
            self.portal.get().clone(),
            peer,
            Arc::clone(&self.topics),
        ));
    }

    fn remove_endpoint(&self, endpoint: &Endpoint) {
        debug!("[SUB] removing publisher {}", endpoint.id());
        unregister(&self.peers, endpoint);
    }
}

/// Read-only SUB portal with subscription management.
pub struct SubPortal(ReadOnly<Sub>);

impl SubPortal {
    pub fn new(portal: Portal<Sub>) -> Self {
        Self(ReadOnly::new(portal))
    }

    /// See [`Sub::subscribe`].
    pub fn subscribe(&self, topic: Topic) -> Result<()> {
        self.0.protocol().subscribe(topic)
    }

    /// See [`Sub::unsubscribe`].
    pub fn unsubscribe(&self, topic: &Topic) {
        self.0.protocol().unsubscribe(topic);
    }

    pub fn id(&self) -> PortalId {
        self.0.id()
    }

    pub fn is_ready(&self) -> bool {
        self.0.is_ready()
    }

    pub fn done(&self) -> Signal {
        self.0.done()
    }

    pub fn bind(&self, addr: &str) -> Result<()> {
        self.0.bind(addr)
    }

    pub async fn connect(&self, addr: &str) -> Result<()> {
        self.0.connect(addr).await
    }

    pub async fn recv(&self) -> Result<Option<Bytes>> {
        self.0.recv().await
    }

    pub async fn recv_msg(&self) -> Result<Option<Message>> {
        self.0.recv_msg().await
    }

    pub fn close(&self) {
        self.0.close();
    }

    pub fn protocol(&self) -> &Sub {
        self.0.protocol()
    }
}

impl fmt::Debug for SubPortal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubPortal")
            .field("portal", &self.0)
            .field("subscriptions", &self.protocol().subscription_count())
            .finish()
    }
}
