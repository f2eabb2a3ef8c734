//! Portal configuration.

use crate::broker::Broker;
use crate::message::MessagePool;
use crate::signal::Signal;

/// Construction-time options for a portal.
///
/// # Examples
///
/// ```
/// use portal_core::config::PortalConfig;
/// use portal_core::broker::Broker;
///
/// let config = PortalConfig::new()
///     .with_capacity(16)
///     .with_broker(Broker::new());
/// assert!(config.is_async());
/// ```
#[derive(Debug, Clone, Default)]
pub struct PortalConfig {
    /// Channel depth between the application and the protocol.
    ///
    /// - `0`: synchronous; `send` waits until the message is fully consumed (default)
    /// - `n > 0`: asynchronous; `send` returns once the message is queued
    pub capacity: usize,

    /// Parent lifetime. The portal closes when this signal closes.
    /// Defaults to `Signal::process()`.
    pub cancel: Option<Signal>,

    /// Address table used by `bind` / `connect`. Defaults to `Broker::global()`.
    pub broker: Option<Broker>,

    /// Pool used by `send`. Defaults to `MessagePool::global()`.
    pub pool: Option<MessagePool>,
}

impl PortalConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: Signal) -> Self {
        self.cancel = Some(cancel);
        self
    }

    #[must_use]
    pub fn with_broker(mut self, broker: Broker) -> Self {
        self.broker = Some(broker);
        self
    }

    #[must_use]
    pub fn with_pool(mut self, pool: MessagePool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Whether sends return without waiting for consumption.
    #[must_use]
    pub const fn is_async(&self) -> bool {
        self.capacity > 0
    }

    pub(crate) fn cancel_or_process(&self) -> Signal {
        self.cancel.clone().unwrap_or_else(Signal::process)
    }

    pub(crate) fn broker_or_global(&self) -> Broker {
        self.broker.clone().unwrap_or_else(Broker::global)
    }

    pub(crate) fn pool_or_global(&self) -> MessagePool {
        self.pool.clone().unwrap_or_else(MessagePool::global)
    }
}
