//! Read-only and write-only portal wrappers.
//!
//! One-directional protocols hand out a guarded portal so the wrong half of
//! the API is not reachable at all.

use crate::error::Result;
use crate::id::PortalId;
use crate::message::Message;
use crate::portal::Portal;
use crate::protocol::Protocol;
use crate::signal::Signal;

use bytes::Bytes;
use std::fmt;

macro_rules! delegate_common {
    () => {
        pub fn id(&self) -> PortalId {
            self.0.id()
        }

        pub fn protocol(&self) -> &P {
            self.0.protocol()
        }

        pub fn is_ready(&self) -> bool {
            self.0.is_ready()
        }

        pub fn done(&self) -> Signal {
            self.0.done()
        }

        /// See [`Portal::bind`].
        pub fn bind(&self, addr: &str) -> Result<()> {
            self.0.bind(addr)
        }

        /// See [`Portal::connect`].
        pub async fn connect(&self, addr: &str) -> Result<()> {
            self.0.connect(addr).await
        }

        pub fn close(&self) {
            self.0.close();
        }

        pub fn into_inner(self) -> Portal<P> {
            self.0
        }
    };
}

/// Portal that can only receive.
pub struct ReadOnly<P: Protocol>(Portal<P>);

impl<P: Protocol> ReadOnly<P> {
    pub fn new(portal: Portal<P>) -> Self {
        Self(portal)
    }

    delegate_common!();

    /// See [`Portal::recv`].
    pub async fn recv(&self) -> Result<Option<Bytes>> {
        self.0.recv().await
    }

    /// See [`Portal::recv_msg`].
    pub async fn recv_msg(&self) -> Result<Option<Message>> {
        self.0.recv_msg().await
    }
}

impl<P: Protocol> fmt::Debug for ReadOnly<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReadOnly").field(&self.0).finish()
    }
}

impl<P: Protocol> From<Portal<P>> for ReadOnly<P> {
    fn from(portal: Portal<P>) -> Self {
        Self::new(portal)
    }
}

/// Portal that can only send.
pub struct WriteOnly<P: Protocol>(Portal<P>);

impl<P: Protocol> WriteOnly<P> {
    pub fn new(portal: Portal<P>) -> Self {
        Self(portal)
    }

    delegate_common!();

    /// See [`Portal::send`].
    pub async fn send(&self, value: impl Into<Bytes>) -> Result<()> {
        self.0.send(value).await
    }

    /// See [`Portal::send_msg`].
    pub async fn send_msg(&self, msg: Message) -> Result<()> {
        self.0.send_msg(msg).await
    }
}

impl<P: Protocol> fmt::Debug for WriteOnly<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WriteOnly").field(&self.0).finish()
    }
}

impl<P: Protocol> From<Portal<P>> for WriteOnly<P> {
    fn from(portal: Portal<P>) -> Self {
        Self::new(portal)
    }
}
