//! Protocol abstraction.
//!
//! A protocol is the pluggable topology behind a portal. The portal core hands
//! it three primitives through [`ProtocolPortal`] and reports peer
//! connections through `add_endpoint` / `remove_endpoint`; everything else is
//! up to the protocol's own pump tasks.

use crate::endpoint::Endpoint;
use crate::error::PortalError;
use crate::message::Message;
use crate::signal::Signal;

use flume::{Receiver, Sender};
use futures::FutureExt;
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;

/// Known protocol numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ProtocolKind {
    /// Exclusive one-to-one link
    Pair = 0,

    /// Write-only fan-out, one peer per message
    Push = 1,

    /// Read-only fan-in
    Pull = 2,

    /// Request side of request/reply
    Req = 3,

    /// Reply side of request/reply
    Rep = 4,

    /// Broadcast publisher
    Pub = 5,

    /// Filtering subscriber
    Sub = 6,

    /// Survey broadcaster (number reserved)
    Surveyor = 7,

    /// Survey responder (number reserved)
    Respondent = 8,

    /// Full broadcast bus
    Bus = 9,

    /// Relaying broadcast bus
    Star = 10,
}

impl ProtocolKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pair => "pair",
            Self::Push => "push",
            Self::Pull => "pull",
            Self::Req => "req",
            Self::Rep => "rep",
            Self::Pub => "pub",
            Self::Sub => "sub",
            Self::Surveyor => "surveyor",
            Self::Respondent => "respondent",
            Self::Bus => "bus",
            Self::Star => "star",
        }
    }

    pub const fn number(self) -> u16 {
        self as u16
    }

    /// The kind this protocol talks to.
    pub const fn peer(self) -> Self {
        match self {
            Self::Pair => Self::Pair,
            Self::Push => Self::Pull,
            Self::Pull => Self::Push,
            Self::Req => Self::Rep,
            Self::Rep => Self::Req,
            Self::Pub => Self::Sub,
            Self::Sub => Self::Pub,
            Self::Surveyor => Self::Respondent,
            Self::Respondent => Self::Surveyor,
            Self::Bus => Self::Bus,
            Self::Star => Self::Star,
        }
    }

    /// Check if this protocol may be wired to `peer`.
    pub fn is_compatible(self, peer: Self) -> bool {
        self.peer() == peer && peer.peer() == self
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Numbers and names identifying a protocol and the peer it expects.
pub trait ProtocolSignature {
    fn number(&self) -> u16;
    fn name(&self) -> &'static str;
    fn peer_number(&self) -> u16;
    fn peer_name(&self) -> &'static str;
}

impl ProtocolSignature for ProtocolKind {
    fn number(&self) -> u16 {
        ProtocolKind::number(*self)
    }

    fn name(&self) -> &'static str {
        self.as_str()
    }

    fn peer_number(&self) -> u16 {
        self.peer().number()
    }

    fn peer_name(&self) -> &'static str {
        self.peer().as_str()
    }
}

/// Captured signature, carried by endpoints so either side can check the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub number: u16,
    pub name: &'static str,
    pub peer_number: u16,
    pub peer_name: &'static str,
}

impl Signature {
    pub fn of<S: ProtocolSignature + ?Sized>(sig: &S) -> Self {
        Self {
            number: sig.number(),
            name: sig.name(),
            peer_number: sig.peer_number(),
            peer_name: sig.peer_name(),
        }
    }
}

impl From<ProtocolKind> for Signature {
    fn from(kind: ProtocolKind) -> Self {
        Self::of(&kind)
    }
}

impl ProtocolSignature for Signature {
    fn number(&self) -> u16 {
        self.number
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn peer_number(&self) -> u16 {
        self.peer_number
    }

    fn peer_name(&self) -> &'static str {
        self.peer_name
    }
}

/// Whether `a` and `b` expect each other.
pub fn endpoints_compatible<A, B>(a: &A, b: &B) -> bool
where
    A: ProtocolSignature + ?Sized,
    B: ProtocolSignature + ?Sized,
{
    a.number() == b.peer_number() && b.number() == a.peer_number()
}

/// Panic with `ProtocolIncompatible` unless `local` and `remote` may be wired.
///
/// # Panics
///
/// Always, on a mismatch. Wiring incompatible protocols is a topology bug.
pub fn must_be_compatible<A, B>(local: &A, remote: &B)
where
    A: ProtocolSignature + ?Sized,
    B: ProtocolSignature + ?Sized,
{
    if !endpoints_compatible(local, remote) {
        panic!(
            "{}",
            PortalError::ProtocolIncompatible {
                local: local.name(),
                remote: remote.name(),
            }
        );
    }
}

/// Message filter; returning `false` drops the message.
pub type Hook = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

/// Optional per-protocol send/recv filters, read once at portal construction.
#[derive(Clone, Default)]
pub struct HookSet {
    pub send: Option<Hook>,
    pub recv: Option<Hook>,
}

impl HookSet {
    #[must_use]
    pub fn with_send(mut self, hook: impl Fn(&Message) -> bool + Send + Sync + 'static) -> Self {
        self.send = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn with_recv(mut self, hook: impl Fn(&Message) -> bool + Send + Sync + 'static) -> Self {
        self.recv = Some(Arc::new(hook));
        self
    }

    pub fn allow_send(&self, msg: &Message) -> bool {
        self.send.as_ref().map_or(true, |hook| hook(msg))
    }

    pub fn allow_recv(&self, msg: &Message) -> bool {
        self.recv.as_ref().map_or(true, |hook| hook(msg))
    }
}

impl fmt::Debug for HookSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookSet")
            .field("send", &self.send.is_some())
            .field("recv", &self.recv.is_some())
            .finish()
    }
}

/// The three primitives a protocol gets from its portal.
///
/// - the outbound side of the portal's send channel
/// - the inbound side of the portal's receive channel
/// - the portal's close signal
#[derive(Clone)]
pub struct ProtocolPortal {
    send: Receiver<Message>,
    recv: Option<Sender<Message>>,
    done: Signal,
}

impl ProtocolPortal {
    pub(crate) fn new(send: Receiver<Message>, recv: Sender<Message>, done: Signal) -> Self {
        Self {
            send,
            recv: Some(recv),
            done,
        }
    }

    /// Messages the application sent.
    pub fn send_channel(&self) -> &Receiver<Message> {
        &self.send
    }

    /// Where messages for the application go. `None` once closed.
    pub fn recv_channel(&self) -> Option<&Sender<Message>> {
        self.recv.as_ref()
    }

    pub fn close_channel(&self) -> &Signal {
        &self.done
    }

    /// Drop this handle's receive sender.
    ///
    /// Write-only protocols call this in `init` before storing the portal, so
    /// the application's `recv` sees a disconnected channel.
    pub fn close_recv_channel(&mut self) {
        self.recv = None;
    }

    /// Next message from the application, or `None` once the portal closed.
    pub async fn next_outbound(&self) -> Option<Message> {
        futures::select! {
            msg = self.send.recv_async().fuse() => msg.ok(),
            _ = self.done.done().fuse() => None,
        }
    }

    /// Hand `msg` to the application. Returns `false` (and frees `msg`) when
    /// the portal closed first.
    pub async fn deliver(&self, msg: Message) -> bool {
        let Some(recv) = &self.recv else {
            return false;
        };
        futures::select! {
            sent = recv.send_async(msg).fuse() => sent.is_ok(),
            _ = self.done.done().fuse() => false,
        }
    }
}

impl fmt::Debug for ProtocolPortal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolPortal")
            .field("recv_open", &self.recv.is_some())
            .field("done", &self.done)
            .finish()
    }
}

/// Set-once slot for the primitives received in `init`.
#[derive(Default)]
pub struct PortalCell(OnceCell<ProtocolPortal>);

impl PortalCell {
    pub fn new() -> Self {
        Self(OnceCell::new())
    }

    /// Store the primitives; returns `false` if already initialised.
    pub fn set(&self, portal: ProtocolPortal) -> bool {
        self.0.set(portal).is_ok()
    }

    /// # Panics
    ///
    /// Panics if `init` has not run yet.
    pub fn get(&self) -> &ProtocolPortal {
        match self.0.get() {
            Some(portal) => portal,
            None => panic!("protocol not initialised"),
        }
    }

    pub fn try_get(&self) -> Option<&ProtocolPortal> {
        self.0.get()
    }
}

/// A pluggable messaging topology.
///
/// `add_endpoint` / `remove_endpoint` are called exactly once per peer
/// connection, possibly concurrently for different peers.
pub trait Protocol: ProtocolSignature + Send + Sync + 'static {
    /// Save the portal primitives and start any portal-wide pumps.
    fn init(&self, portal: ProtocolPortal);

    fn add_endpoint(&self, endpoint: Endpoint);

    fn remove_endpoint(&self, endpoint: &Endpoint);

    fn hooks(&self) -> HookSet {
        HookSet::default()
    }
}
