//! # Portal Protocols
//!
//! Messaging topologies plugged into `portal_core::portal::Portal`:
//! - **PAIR**: exclusive one-to-one link
//! - **PUSH / PULL**: load-balanced fan-out and fair fan-in
//! - **PUB / SUB**: broadcast with subscriber-side topic filtering
//! - **REQ / REP**: request/reply with one transaction in flight per server
//! - **BUS**: full broadcast with origin-based loop avoidance
//! - **STAR**: a bus that relays what it receives
//!
//! Each protocol only talks to its portal through `ProtocolPortal` and to
//! its peers through endpoints; every pump it spawns exits on the portal's
//! close signal or the peer's done signal.

// Allow some pedantic lints
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::needless_pass_by_value)]

mod utils;

pub mod bus;
pub mod pair;
pub mod publisher;
pub mod pull;
pub mod push;
pub mod rep;
pub mod req;
pub mod star;
pub mod subscriber;
pub mod subscription;

// Re-export protocol types for clean API
pub use bus::Bus;
pub use pair::Pair;
pub use publisher::Pub;
pub use pull::Pull;
pub use push::Push;
pub use rep::Rep;
pub use req::Req;
pub use star::Star;
pub use subscriber::{Sub, SubPortal};
pub use subscription::{Subscriptions, Topic, TopicFn};
