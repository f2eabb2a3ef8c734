//! Portal core.
//!
//! A portal owns two channels (application → protocol and protocol →
//! application), a close signal and one protocol instance. It never moves
//! messages between peers itself: it only registers links with the protocol
//! and gates the application's `send` / `recv` on readiness, hooks and the
//! close signal.
//!
//! # Lifecycle
//!
//! ```text
//! new ──► bind / connect ──► ready ──► close (or parent cancel)
//!              │                           │
//!              └─ accept loop / watchers ──┴─► remove_endpoint, release address
//! ```

use crate::broker::{Broker, Listener};
use crate::config::PortalConfig;
use crate::endpoint::{Endpoint, PeerInfo};
use crate::error::{PortalError, Result};
use crate::id::PortalId;
use crate::message::{Message, MessagePool};
use crate::protocol::{must_be_compatible, HookSet, Protocol, ProtocolPortal, Signature};
use crate::signal::Signal;
use crate::task;

use bytes::Bytes;
use flume::{Receiver, Sender};
use futures::FutureExt;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

struct PortalCore {
    id: PortalId,
    signature: Signature,
    send_tx: Sender<Message>,
    recv_rx: Receiver<Message>,
    done: Signal,
    ready: AtomicBool,
    links: AtomicUsize,
    bindings: Mutex<Vec<String>>,
    broker: Broker,
    pool: MessagePool,
    capacity: usize,
    hooks: HookSet,
}

impl PortalCore {
    fn info(&self) -> PeerInfo {
        PeerInfo {
            id: self.id,
            signature: self.signature,
            done: self.done.clone(),
        }
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire) && !self.done.is_closed()
    }

    fn close(&self) {
        if self.done.close() {
            debug!("[PORTAL] {} ({}) closed", self.id, self.signature.name);
        }
        self.ready.store(false, Ordering::Release);

        let bindings: Vec<String> = self.bindings.lock().drain(..).collect();
        for addr in bindings {
            self.broker.release(&addr, self.id);
        }
    }
}

/// Application-facing socket driven by protocol `P`.
pub struct Portal<P: Protocol> {
    core: Arc<PortalCore>,
    proto: Arc<P>,
}

impl<P: Protocol> Portal<P> {
    /// Create a portal and initialise its protocol.
    ///
    /// Must be called from within a compio runtime.
    pub fn new(proto: P, config: PortalConfig) -> Self {
        let (send_tx, send_rx) = flume::bounded(config.capacity);
        let (recv_tx, recv_rx) = flume::bounded(config.capacity);
        let done = config.cancel_or_process().child();

        let core = Arc::new(PortalCore {
            id: PortalId::next(),
            signature: Signature::of(&proto),
            send_tx,
            recv_rx,
            done: done.clone(),
            ready: AtomicBool::new(false),
            links: AtomicUsize::new(0),
            bindings: Mutex::new(Vec::new()),
            broker: config.broker_or_global(),
            pool: config.pool_or_global(),
            capacity: config.capacity,
            hooks: proto.hooks(),
        });

        let proto = Arc::new(proto);
        proto.init(ProtocolPortal::new(send_rx, recv_tx, done));
        debug!(
            "[PORTAL] {} created ({}, capacity {})",
            core.id, core.signature.name, core.capacity
        );

        Self { core, proto }
    }

    pub fn id(&self) -> PortalId {
        self.core.id
    }

    pub fn signature(&self) -> Signature {
        self.core.signature
    }

    pub fn protocol(&self) -> &P {
        &self.proto
    }

    /// True once `bind` or `connect` succeeded, false again after close.
    pub fn is_ready(&self) -> bool {
        self.core.is_ready()
    }

    pub fn is_async(&self) -> bool {
        self.core.capacity > 0
    }

    /// The portal's close signal.
    pub fn done(&self) -> Signal {
        self.core.done.clone()
    }

    pub fn pool(&self) -> &MessagePool {
        &self.core.pool
    }

    /// Listen on `addr`. Inbound connections are registered with the
    /// protocol by a background accept loop.
    ///
    /// # Errors
    ///
    /// - `NotReady` if the portal is closed
    /// - `InvalidAddress` / `AddressInUse` from the broker
    pub fn bind(&self, addr: &str) -> Result<()> {
        if self.core.done.is_closed() {
            return Err(PortalError::NotReady);
        }

        let listener = self.core.broker.bind(addr, self.core.info())?;
        self.core.bindings.lock().push(addr.to_string());
        self.core.ready.store(true, Ordering::Release);
        debug!(
            "[PORTAL] {} ({}) bound to {}",
            self.core.id, self.core.signature.name, addr
        );

        task::spawn(accept_loop(
            Arc::clone(&self.core),
            Arc::clone(&self.proto),
            listener,
        ));
        Ok(())
    }

    /// Connect to the portal bound at `addr`.
    ///
    /// Returns once both sides have registered the link. If the bound portal
    /// later closes, this portal closes too.
    ///
    /// # Errors
    ///
    /// - `NotReady` if the portal is (or gets) closed
    /// - `InvalidAddress` / `ConnectionRefused` from the broker
    ///
    /// # Panics
    ///
    /// Panics with `ProtocolIncompatible` if the bound portal's protocol does
    /// not pair with this one.
    pub async fn connect(&self, addr: &str) -> Result<()> {
        if self.core.done.is_closed() {
            return Err(PortalError::NotReady);
        }

        let binding = self.core.broker.lookup(addr)?;
        must_be_compatible(&self.core.signature, &binding.owner().signature);

        let (local, remote) = Endpoint::link(&self.core.info(), binding.owner());
        futures::select! {
            handed = binding.hand_off(addr, remote).fuse() => handed?,
            _ = self.core.done.done().fuse() => return Err(PortalError::NotReady),
        }

        self.core.ready.store(true, Ordering::Release);
        debug!(
            "[PORTAL] {} ({}) connected to {} ({})",
            self.core.id,
            self.core.signature.name,
            addr,
            binding.owner().id
        );
        attach(&self.core, &self.proto, local, true);
        Ok(())
    }

    /// Send `value`.
    ///
    /// On a synchronous portal this waits until every holder of the message
    /// released it, or until the portal closes.
    ///
    /// # Errors
    ///
    /// `NotReady` before a successful bind/connect or after close.
    pub async fn send(&self, value: impl Into<Bytes>) -> Result<()> {
        self.send_msg(self.core.pool.alloc_with(value)).await
    }

    /// Receive the next value. `Ok(None)` once the portal closed.
    ///
    /// # Errors
    ///
    /// `NotReady` before a successful bind/connect or after close.
    pub async fn recv(&self) -> Result<Option<Bytes>> {
        Ok(self.recv_msg().await?.map(|msg| {
            let value = msg.value();
            msg.free();
            value
        }))
    }

    /// Hand a message to the protocol. A send-hook rejection drops it
    /// silently.
    ///
    /// # Errors
    ///
    /// `NotReady` before a successful bind/connect or after close.
    pub async fn send_msg(&self, msg: Message) -> Result<()> {
        if !self.core.is_ready() {
            return Err(PortalError::NotReady);
        }
        if !self.core.hooks.allow_send(&msg) {
            trace!("[PORTAL] {} send hook dropped message", self.core.id);
            msg.free();
            return Ok(());
        }

        let delivery = (self.core.capacity == 0).then(|| msg.delivery());
        let queued = futures::select! {
            sent = self.core.send_tx.send_async(msg).fuse() => sent.is_ok(),
            _ = self.core.done.done().fuse() => false,
        };

        if let (true, Some(delivery)) = (queued, delivery) {
            futures::select! {
                _ = delivery.wait().fuse() => {},
                _ = self.core.done.done().fuse() => {},
            }
        }
        Ok(())
    }

    /// Take the next message from the protocol. Recv-hook rejections are
    /// freed and skipped. `Ok(None)` once the portal closed.
    ///
    /// # Errors
    ///
    /// `NotReady` before a successful bind/connect or after close.
    pub async fn recv_msg(&self) -> Result<Option<Message>> {
        if !self.core.is_ready() {
            return Err(PortalError::NotReady);
        }

        loop {
            let msg = futures::select! {
                msg = self.core.recv_rx.recv_async().fuse() => msg.ok(),
                _ = self.core.done.done().fuse() => None,
            };
            let Some(msg) = msg else {
                return Ok(None);
            };
            if self.core.hooks.allow_recv(&msg) {
                return Ok(Some(msg));
            }
            trace!("[PORTAL] {} recv hook dropped message", self.core.id);
            msg.free();
        }
    }

    /// Close the portal. Idempotent.
    ///
    /// Wakes every blocked `send` / `recv`, releases bound addresses and
    /// tears down every link.
    pub fn close(&self) {
        self.core.close();
    }
}

impl<P: Protocol> Drop for Portal<P> {
    fn drop(&mut self) {
        self.core.close();
    }
}

impl<P: Protocol> fmt::Debug for Portal<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Portal")
            .field("id", &self.core.id)
            .field("protocol", &self.core.signature.name)
            .field("ready", &self.is_ready())
            .field("capacity", &self.core.capacity)
            .finish()
    }
}

async fn accept_loop<P: Protocol>(core: Arc<PortalCore>, proto: Arc<P>, listener: Listener) {
    loop {
        let handoff = futures::select! {
            handoff = listener.accept().fuse() => handoff,
            _ = core.done.done().fuse() => None,
        };
        let Some(handoff) = handoff else {
            break;
        };

        attach(&core, &proto, handoff.endpoint().clone(), false);
        handoff.acknowledge();
    }
    debug!("[PORTAL] {} stopped accepting on {}", core.id, listener.addr());
}

/// Register `endpoint` with the protocol and watch it until it is done.
///
/// With `follow_remote`, the remote portal closing also closes this one once
/// it was the last live link.
fn attach<P: Protocol>(
    core: &Arc<PortalCore>,
    proto: &Arc<P>,
    endpoint: Endpoint,
    follow_remote: bool,
) {
    debug!(
        "[PORTAL] {} ({}) adding peer {} ({})",
        core.id,
        core.signature.name,
        endpoint.id(),
        endpoint.signature().name
    );
    core.links.fetch_add(1, Ordering::AcqRel);
    proto.add_endpoint(endpoint.clone());

    let core = Arc::clone(core);
    let proto = Arc::clone(proto);
    task::spawn(async move {
        endpoint.done().await;
        debug!("[PORTAL] {} removing peer {}", core.id, endpoint.id());
        proto.remove_endpoint(&endpoint);
        endpoint.close();

        let remaining = core.links.fetch_sub(1, Ordering::AcqRel) - 1;
        if follow_remote && endpoint.remote_closed() && remaining == 0 {
            debug!("[PORTAL] {} lost its last peer {}", core.id, endpoint.id());
            core.close();
        }
    });
}
