//! Address broker: bind/connect rendezvous between portals.
//!
//! One mutex guards the whole table of bindings. A binding maps an address to
//! the bound portal's identity and an inbound connection channel; the bound
//! portal's accept loop drains that channel through a [`Listener`].
//!
//! A binding whose owner has already closed counts as absent: `bind` may
//! replace it and `lookup` refuses it.

use crate::endpoint::{Endpoint, PeerInfo};
use crate::error::{PortalError, Result};
use crate::id::PortalId;

use flume::{Receiver, Sender};
use futures::channel::oneshot;
use futures::FutureExt;
use hashbrown::HashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

static GLOBAL_BROKER: Lazy<Broker> = Lazy::new(Broker::new);

/// Inbound connection delivered to a bound portal.
pub struct Handoff {
    endpoint: Endpoint,
    ack: oneshot::Sender<()>,
}

impl Handoff {
    /// The binder's view of the connecting portal.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Tell the connector the endpoint has been registered.
    pub fn acknowledge(self) {
        let _ = self.ack.send(());
    }
}

/// A live binding, as returned by [`Broker::lookup`].
#[derive(Clone)]
pub struct Binding {
    owner: PeerInfo,
    conn_tx: Sender<Handoff>,
}

impl Binding {
    /// The bound portal.
    pub fn owner(&self) -> &PeerInfo {
        &self.owner
    }

    /// Deliver `endpoint` to the bound portal and wait until it has been
    /// registered there.
    ///
    /// # Errors
    ///
    /// `ConnectionRefused` if the bound portal goes away first.
    pub async fn hand_off(&self, addr: &str, endpoint: Endpoint) -> Result<()> {
        let (ack, acked) = oneshot::channel();
        if self.conn_tx.send(Handoff { endpoint, ack }).is_err() {
            return Err(PortalError::connection_refused(addr));
        }

        let accepted = futures::select! {
            acked = acked.fuse() => acked.is_ok(),
            _ = self.owner.done.done().fuse() => false,
        };
        if accepted {
            Ok(())
        } else {
            Err(PortalError::connection_refused(addr))
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("owner", &self.owner.id)
            .field("protocol", &self.owner.signature.name)
            .finish()
    }
}

/// Accepting side of a binding. Dropping it releases the address.
pub struct Listener {
    addr: String,
    owner: PortalId,
    conn_rx: Receiver<Handoff>,
    broker: Broker,
}

impl Listener {
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Next inbound connection, or `None` once the binding is gone.
    pub async fn accept(&self) -> Option<Handoff> {
        self.conn_rx.recv_async().await.ok()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.broker.release(&self.addr, self.owner);
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("addr", &self.addr)
            .field("owner", &self.owner)
            .finish()
    }
}

/// Cloneable handle to an address table.
#[derive(Clone, Default)]
pub struct Broker {
    bindings: Arc<Mutex<HashMap<String, Binding>>>,
}

impl Broker {
    /// An isolated broker, unrelated to [`Broker::global`].
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide broker used unless another one is configured.
    pub fn global() -> Self {
        GLOBAL_BROKER.clone()
    }

    /// Register `owner` as the portal listening on `addr`.
    ///
    /// # Errors
    ///
    /// - `InvalidAddress` for an empty address
    /// - `AddressInUse` if a live portal is already bound there
    pub fn bind(&self, addr: &str, owner: PeerInfo) -> Result<Listener> {
        validate(addr)?;

        let (conn_tx, conn_rx) = flume::unbounded();
        let owner_id = owner.id;
        {
            let mut bindings = self.bindings.lock();
            if let Some(existing) = bindings.get(addr) {
                if !existing.owner.done.is_closed() {
                    return Err(PortalError::address_in_use(addr));
                }
                trace!(
                    "[BROKER] replacing stale binding {} held by {}",
                    addr,
                    existing.owner.id
                );
            }
            bindings.insert(addr.to_string(), Binding { owner, conn_tx });
        }

        debug!("[BROKER] bound {} to {}", addr, owner_id);
        Ok(Listener {
            addr: addr.to_string(),
            owner: owner_id,
            conn_rx,
            broker: self.clone(),
        })
    }

    /// Find the live portal bound to `addr`.
    ///
    /// # Errors
    ///
    /// - `InvalidAddress` for an empty address
    /// - `ConnectionRefused` if nothing live is bound there
    pub fn lookup(&self, addr: &str) -> Result<Binding> {
        validate(addr)?;

        let bindings = self.bindings.lock();
        match bindings.get(addr) {
            Some(binding) if !binding.owner.done.is_closed() => Ok(binding.clone()),
            _ => Err(PortalError::connection_refused(addr)),
        }
    }

    /// Remove the binding at `addr` if `owner` still holds it.
    ///
    /// Idempotent; returns whether an entry was removed.
    pub fn release(&self, addr: &str, owner: PortalId) -> bool {
        let removed = {
            let mut bindings = self.bindings.lock();
            match bindings.get(addr) {
                Some(binding) if binding.owner.id == owner => bindings.remove(addr),
                _ => None,
            }
        };
        if removed.is_some() {
            debug!("[BROKER] released {} from {}", addr, owner);
        }
        removed.is_some()
    }

    /// Whether a live portal is bound to `addr`.
    pub fn is_bound(&self, addr: &str) -> bool {
        self.bindings
            .lock()
            .get(addr)
            .is_some_and(|binding| !binding.owner.done.is_closed())
    }

    /// Every address with a binding entry, sorted.
    pub fn addresses(&self) -> Vec<String> {
        let mut addrs: Vec<String> = self.bindings.lock().keys().cloned().collect();
        addrs.sort();
        addrs
    }
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("addresses", &self.addresses())
            .finish()
    }
}

fn validate(addr: &str) -> Result<()> {
    if addr.is_empty() {
        return Err(PortalError::InvalidAddress(addr.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ProtocolKind;
    use crate::signal::Signal;
    use std::time::Duration;

    fn owner(kind: ProtocolKind) -> PeerInfo {
        PeerInfo {
            id: PortalId::next(),
            signature: kind.into(),
            done: Signal::new(),
        }
    }

    #[test]
    fn test_bind_duplicate() {
        let broker = Broker::new();
        let _listener = broker.bind("/dup", owner(ProtocolKind::Pair)).unwrap();

        let err = broker.bind("/dup", owner(ProtocolKind::Pair)).unwrap_err();
        assert_eq!(err, PortalError::AddressInUse("/dup".into()));
    }

    #[test]
    fn test_lookup_unbound() {
        let broker = Broker::new();
        assert_eq!(
            broker.lookup("/nowhere").unwrap_err(),
            PortalError::ConnectionRefused("/nowhere".into())
        );
    }

    #[test]
    fn test_binding_debug_names_owner() {
        let broker = Broker::new();
        let info = owner(ProtocolKind::Rep);
        let id = info.id;
        let _listener = broker.bind("/debug", info).unwrap();

        let shown = format!("{:?}", broker.lookup("/debug"));
        assert!(shown.contains("Binding"), "{shown}");
        assert!(shown.contains(&format!("{id:?}")), "{shown}");
        assert!(shown.contains("rep"), "{shown}");
    }

    #[test]
    fn test_empty_address() {
        let broker = Broker::new();
        assert!(matches!(
            broker.bind("", owner(ProtocolKind::Bus)),
            Err(PortalError::InvalidAddress(_))
        ));
        assert!(matches!(
            broker.lookup(""),
            Err(PortalError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_listener_drop_releases() {
        let broker = Broker::new();
        let listener = broker.bind("/drop", owner(ProtocolKind::Pair)).unwrap();
        assert!(broker.is_bound("/drop"));

        drop(listener);
        assert!(!broker.is_bound("/drop"));
        assert!(broker.bind("/drop", owner(ProtocolKind::Pair)).is_ok());
    }

    #[test]
    fn test_release_checks_owner() {
        let broker = Broker::new();
        let first = owner(ProtocolKind::Pair);
        let first_id = first.id;
        let _listener = broker.bind("/owned", first).unwrap();

        assert!(!broker.release("/owned", PortalId::next()));
        assert!(broker.is_bound("/owned"));
        assert!(broker.release("/owned", first_id));
        assert!(!broker.release("/owned", first_id));
    }

    #[test]
    fn test_closed_owner_counts_as_absent() {
        let broker = Broker::new();
        let stale = owner(ProtocolKind::Pair);
        let stale_done = stale.done.clone();
        let _stale_listener = broker.bind("/stale", stale).unwrap();

        stale_done.close();
        assert!(!broker.is_bound("/stale"));
        assert!(matches!(
            broker.lookup("/stale"),
            Err(PortalError::ConnectionRefused(_))
        ));

        let fresh = owner(ProtocolKind::Pair);
        let fresh_id = fresh.id;
        let _fresh_listener = broker.bind("/stale", fresh).unwrap();
        assert_eq!(broker.lookup("/stale").unwrap().owner().id, fresh_id);
    }

    #[test]
    fn test_addresses_sorted() {
        let broker = Broker::new();
        let _b = broker.bind("/b", owner(ProtocolKind::Bus)).unwrap();
        let _a = broker.bind("/a", owner(ProtocolKind::Bus)).unwrap();
        assert_eq!(broker.addresses(), vec!["/a".to_string(), "/b".to_string()]);
    }

    #[compio::test]
    async fn test_hand_off_acknowledged() {
        let broker = Broker::new();
        let binder = owner(ProtocolKind::Pair);
        let listener = broker.bind("/handoff", binder.clone()).unwrap();

        let connector = owner(ProtocolKind::Pair);
        let (_local, remote) = Endpoint::link(&connector, &binder);
        let binding = broker.lookup("/handoff").unwrap();

        let accept = async {
            let handoff = listener.accept().await.unwrap();
            assert_eq!(handoff.endpoint().id(), connector.id);
            handoff.acknowledge();
        };

        let result = compio::time::timeout(Duration::from_secs(1), async {
            let (connected, ()) = futures::join!(binding.hand_off("/handoff", remote), accept);
            connected
        })
        .await;
        assert!(matches!(result, Ok(Ok(()))));
    }

    #[compio::test]
    async fn test_hand_off_refused_when_dropped() {
        let broker = Broker::new();
        let binder = owner(ProtocolKind::Pair);
        let listener = broker.bind("/refused", binder.clone()).unwrap();

        let connector = owner(ProtocolKind::Pair);
        let (_local, remote) = Endpoint::link(&connector, &binder);
        let binding = broker.lookup("/refused").unwrap();

        let reject = async {
            let handoff = listener.accept().await.unwrap();
            drop(handoff);
        };

        let (connected, ()) = futures::join!(binding.hand_off("/refused", remote), reject);
        assert!(matches!(connected, Err(PortalError::ConnectionRefused(_))));
    }
}
