//! # Portal
//!
//! In-process "scalable protocols" messaging: typed sockets ("portals") bound
//! or connected to named addresses, exchanging messages according to a
//! pluggable topology.
//!
//! ## Architecture
//!
//! - **`portal-core`**: pooled messages, close signals, endpoints, the address
//!   broker and the portal core
//! - **`portal-proto`**: the protocols (pair, push/pull, pub/sub, req/rep,
//!   bus, star)
//! - **`portal`**: public API surface (this crate)
//!
//! ## Quick Start
//!
//! Portals run on a compio runtime. With the default synchronous
//! configuration a `send` waits until the message was consumed, so the two
//! sides run concurrently:
//!
//! ```rust,no_run
//! use portal::prelude::*;
//!
//! #[compio::main]
//! async fn main() -> Result<()> {
//!     let server = portal::pair::new(PortalConfig::default());
//!     let client = portal::pair::new(PortalConfig::default());
//!
//!     server.bind("/quick-start")?;
//!     client.connect("/quick-start").await?;
//!
//!     let (sent, got) = futures::join!(server.send("ping"), client.recv());
//!     sent?;
//!     assert_eq!(got?.as_deref(), Some(&b"ping"[..]));
//!     Ok(())
//! }
//! ```
//!
//! ## Errors
//!
//! Address problems (`AddressInUse`, `ConnectionRefused`, `InvalidAddress`)
//! and `NotReady` are returned. Wiring incompatible protocols together and
//! releasing a message more often than it was referenced are bugs and panic.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dev_tracing;

/// The runtime portals run on; every portal must be created inside it.
pub use compio;

// Re-export core types
pub use bytes::Bytes;
pub use portal_core::broker::Broker;
pub use portal_core::config::PortalConfig;
pub use portal_core::error::{PortalError, Result};
pub use portal_core::guard::{ReadOnly, WriteOnly};
pub use portal_core::id::PortalId;
pub use portal_core::message::{HeaderKey, HeaderValue, Message, MessagePool, PoolStats};
pub use portal_core::portal::Portal;
pub use portal_core::signal::Signal;
pub use portal_proto::{SubPortal, Topic};

/// Building blocks for custom protocols.
pub mod spi {
    pub use portal_core::endpoint::{Endpoint, PeerEndpoint, PeerInfo};
    pub use portal_core::neighborhood::{Neighborhood, NeighborhoodView};
    pub use portal_core::protocol::{
        endpoints_compatible, must_be_compatible, Hook, HookSet, PortalCell, Protocol,
        ProtocolKind, ProtocolPortal, ProtocolSignature, Signature,
    };
    pub use portal_core::task::spawn;
}

/// PAIR portals: exactly one peer, both directions.
pub mod pair {
    use super::{Portal, PortalConfig};
    pub use portal_proto::Pair;

    /// Create a PAIR portal.
    pub fn new(config: PortalConfig) -> Portal<Pair> {
        Portal::new(Pair::new(), config)
    }
}

/// PUSH portals: each message goes to one PULL peer.
pub mod push {
    use super::{Portal, PortalConfig, WriteOnly};
    pub use portal_proto::Push;

    /// Create a write-only PUSH portal.
    pub fn new(config: PortalConfig) -> WriteOnly<Push> {
        WriteOnly::new(Portal::new(Push::new(), config))
    }
}

/// PULL portals: fan-in from every PUSH peer.
pub mod pull {
    use super::{Portal, PortalConfig, ReadOnly};
    pub use portal_proto::Pull;

    /// Create a read-only PULL portal.
    pub fn new(config: PortalConfig) -> ReadOnly<Pull> {
        ReadOnly::new(Portal::new(Pull::new(), config))
    }
}

/// PUB portals: every message goes to every SUB peer.
pub mod publisher {
    use super::{Portal, PortalConfig, WriteOnly};
    pub use portal_proto::Pub;

    /// Create a write-only PUB portal.
    pub fn new(config: PortalConfig) -> WriteOnly<Pub> {
        WriteOnly::new(Portal::new(Pub::new(), config))
    }
}

/// SUB portals: receive the published values matching a subscribed topic.
pub mod subscriber {
    use super::{Portal, PortalConfig, SubPortal};
    pub use portal_proto::{Sub, Subscriptions, Topic, TopicFn};

    /// Create a SUB portal with no subscriptions.
    pub fn new(config: PortalConfig) -> SubPortal {
        SubPortal::new(Portal::new(Sub::new(), config))
    }
}

/// REQ portals: send requests, receive replies.
pub mod req {
    use super::{Portal, PortalConfig};
    pub use portal_proto::Req;

    /// Create a REQ portal.
    pub fn new(config: PortalConfig) -> Portal<Req> {
        Portal::new(Req::new(), config)
    }
}

/// REP portals: serve one request at a time.
pub mod rep {
    use super::{Portal, PortalConfig};
    pub use portal_proto::Rep;

    /// Create a REP portal.
    pub fn new(config: PortalConfig) -> Portal<Rep> {
        Portal::new(Rep::new(), config)
    }
}

/// BUS portals: broadcast to every peer, skipping a message's origin.
pub mod bus {
    use super::{Portal, PortalConfig};
    pub use portal_proto::Bus;

    /// Create a BUS portal.
    pub fn new(config: PortalConfig) -> Portal<Bus> {
        Portal::new(Bus::new(), config)
    }
}

/// STAR portals: a bus that relays received messages to its other peers.
pub mod star {
    use super::{Portal, PortalConfig};
    pub use portal_proto::Star;

    /// Create a STAR portal.
    pub fn new(config: PortalConfig) -> Portal<Star> {
        Portal::new(Star::new(), config)
    }
}

/// Convenient imports.
///
/// ```rust
/// use portal::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Broker, Bytes, Message, Portal, PortalConfig, PortalError, ReadOnly, Result, Signal,
        SubPortal, Topic, WriteOnly,
    };
}
