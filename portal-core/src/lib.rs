//! Portal Core
//!
//! This crate contains the protocol-agnostic building blocks:
//! - Reference-counted, pooled messages (`message`)
//! - Broadcast-once close signals (`signal`)
//! - Peer endpoints and the neighborhood registry (`endpoint`, `neighborhood`)
//! - The in-process address broker (`broker`)
//! - The portal core and the protocol SPI (`portal`, `protocol`)
//! - Read/write guards, configuration and error types

#![deny(unsafe_code)]
// Allow some pedantic lints that are intentional in this crate
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod broker;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod guard;
pub mod id;
pub mod message;
pub mod neighborhood;
pub mod portal;
pub mod protocol;
pub mod signal;
pub mod task;

/// Types most protocol implementations need.
pub mod prelude {
    pub use crate::broker::Broker;
    pub use crate::config::PortalConfig;
    pub use crate::endpoint::{Endpoint, PeerEndpoint};
    pub use crate::error::{PortalError, Result};
    pub use crate::guard::{ReadOnly, WriteOnly};
    pub use crate::id::PortalId;
    pub use crate::message::{HeaderKey, HeaderValue, Message, MessagePool};
    pub use crate::neighborhood::Neighborhood;
    pub use crate::portal::Portal;
    pub use crate::protocol::{
        HookSet, PortalCell, Protocol, ProtocolKind, ProtocolPortal, ProtocolSignature, Signature,
    };
    pub use crate::signal::Signal;
}
