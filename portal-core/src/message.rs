//! Reference-counted, pooled messages.
//!
//! A `Message` is a handle to a pooled slot holding an opaque value and a
//! small header map. Every handle accounts for exactly one reference:
//!
//! - `add_ref()` takes another reference and returns a new handle
//! - `free()` (or dropping the handle) gives one back
//!
//! When the last reference is released the slot is cleared and returned to
//! its pool. A release that would take the count below zero panics with
//! `PortalError::RefCountUnderflow`.
//!
//! Synchronous sends use [`Delivery`] to wait for that final release.

use crate::error::PortalError;
use crate::id::PortalId;

use bytes::Bytes;
use futures::channel::oneshot;
use hashbrown::HashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Default bound on idle slots kept by a pool.
pub const POOL_CAPACITY: usize = 1024;

static GLOBAL_POOL: Lazy<MessagePool> = Lazy::new(MessagePool::new);

/// Small integer key into a message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeaderKey(pub u8);

impl HeaderKey {
    /// Peer portal a message arrived from. Rewritten on every hop.
    pub const ORIGIN: Self = Self(0);
    /// Mesh-wide identity of a relayed message. Set once where the message
    /// enters the mesh and left alone by relays.
    pub const TRACE: Self = Self(1);
}

/// Opaque header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Peer(PortalId),
    Trace(u64),
    Bytes(Bytes),
}

impl HeaderValue {
    #[must_use]
    pub const fn as_peer(&self) -> Option<PortalId> {
        match self {
            Self::Peer(id) => Some(*id),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_trace(&self) -> Option<u64> {
        match self {
            Self::Trace(trace) => Some(*trace),
            _ => None,
        }
    }
}

#[derive(Default)]
struct Body {
    value: Bytes,
    header: HashMap<HeaderKey, HeaderValue>,
    waiter: Option<oneshot::Sender<()>>,
}

struct Slot {
    refcnt: AtomicI32,
    body: Mutex<Body>,
    pool: Weak<PoolShared>,
}

/// Give back one reference to `slot`, recycling it on the last one.
fn release(slot: &Arc<Slot>) {
    let prev = slot.refcnt.fetch_sub(1, Ordering::AcqRel);
    if prev <= 0 {
        panic!("{}", PortalError::RefCountUnderflow(prev - 1));
    }
    if prev > 1 {
        return;
    }

    let waiter = {
        let mut body = slot.body.lock();
        body.value = Bytes::new();
        body.header.clear();
        body.waiter.take()
    };

    if let Some(pool) = slot.pool.upgrade() {
        pool.put(Arc::clone(slot));
    }

    if let Some(waiter) = waiter {
        let _ = waiter.send(());
    }
}

/// Handle to a pooled message. Not `Clone`: use [`Message::add_ref`].
pub struct Message {
    slot: Arc<Slot>,
}

impl Message {
    /// Allocate an empty message from the global pool.
    #[must_use]
    pub fn new() -> Self {
        GLOBAL_POOL.alloc()
    }

    /// Allocate a message carrying `value` from the global pool.
    #[must_use]
    pub fn with_value(value: impl Into<Bytes>) -> Self {
        GLOBAL_POOL.alloc_with(value)
    }

    #[must_use]
    pub fn value(&self) -> Bytes {
        self.slot.body.lock().value.clone()
    }

    pub fn set_value(&self, value: impl Into<Bytes>) {
        self.slot.body.lock().value = value.into();
    }

    #[must_use]
    pub fn header(&self, key: HeaderKey) -> Option<HeaderValue> {
        self.slot.body.lock().header.get(&key).cloned()
    }

    pub fn set_header(&self, key: HeaderKey, value: HeaderValue) {
        self.slot.body.lock().header.insert(key, value);
    }

    pub fn remove_header(&self, key: HeaderKey) -> Option<HeaderValue> {
        self.slot.body.lock().header.remove(&key)
    }

    /// Peer this message arrived from, if a protocol stamped it.
    #[must_use]
    pub fn origin(&self) -> Option<PortalId> {
        self.header(HeaderKey::ORIGIN)
            .and_then(|value| value.as_peer())
    }

    pub fn set_origin(&self, id: PortalId) {
        self.set_header(HeaderKey::ORIGIN, HeaderValue::Peer(id));
    }

    #[must_use]
    pub fn trace(&self) -> Option<u64> {
        self.header(HeaderKey::TRACE)
            .and_then(|value| value.as_trace())
    }

    pub fn set_trace(&self, trace: u64) {
        self.set_header(HeaderKey::TRACE, HeaderValue::Trace(trace));
    }

    /// Take one more reference to the same message.
    #[must_use]
    pub fn add_ref(&self) -> Self {
        self.slot.refcnt.fetch_add(1, Ordering::AcqRel);
        Self {
            slot: Arc::clone(&self.slot),
        }
    }

    /// Give this handle's reference back.
    pub fn free(self) {
        drop(self);
    }

    /// Current number of live references.
    #[must_use]
    pub fn ref_count(&self) -> i32 {
        self.slot.refcnt.load(Ordering::Acquire)
    }

    /// Hold an extra reference that can later wait for the final release.
    #[must_use]
    pub fn delivery(&self) -> Delivery {
        Delivery {
            held: self.add_ref(),
        }
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Message {
    fn drop(&mut self) {
        release(&self.slot);
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = self.slot.body.lock();
        f.debug_struct("Message")
            .field("value", &body.value)
            .field("header", &body.header)
            .field("refcnt", &self.slot.refcnt.load(Ordering::Relaxed))
            .finish()
    }
}

/// Completion handle for a synchronous send.
///
/// Holds one reference of its own. `wait` drops that reference and resolves
/// once every other holder has released theirs.
#[must_use = "dropping a Delivery releases its reference without waiting"]
pub struct Delivery {
    held: Message,
}

impl Delivery {
    pub async fn wait(self) {
        let (tx, rx) = oneshot::channel();
        self.held.slot.body.lock().waiter = Some(tx);
        drop(self.held);
        let _ = rx.await;
    }
}

struct PoolShared {
    free: Mutex<Vec<Arc<Slot>>>,
    capacity: usize,
    allocated: AtomicUsize,
    reused: AtomicUsize,
    recycled: AtomicUsize,
}

impl PoolShared {
    fn put(&self, slot: Arc<Slot>) {
        self.recycled.fetch_add(1, Ordering::Relaxed);
        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push(slot);
        }
    }
}

/// Counters describing pool activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Slots created fresh.
    pub allocated: usize,
    /// Allocations served from the free list.
    pub reused: usize,
    /// Messages whose last reference was released.
    pub recycled: usize,
    /// Slots currently on the free list.
    pub idle: usize,
}

/// Cloneable handle to a message free list.
#[derive(Clone)]
pub struct MessagePool {
    shared: Arc<PoolShared>,
}

impl MessagePool {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(POOL_CAPACITY)
    }

    /// Pool keeping at most `capacity` idle slots.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                free: Mutex::new(Vec::new()),
                capacity,
                allocated: AtomicUsize::new(0),
                reused: AtomicUsize::new(0),
                recycled: AtomicUsize::new(0),
            }),
        }
    }

    /// The pool used by `Message::new`.
    #[must_use]
    pub fn global() -> Self {
        GLOBAL_POOL.clone()
    }

    /// Allocate an empty message with a reference count of one.
    #[must_use]
    pub fn alloc(&self) -> Message {
        let reused = self.shared.free.lock().pop();
        let slot = match reused {
            Some(slot) => {
                self.shared.reused.fetch_add(1, Ordering::Relaxed);
                slot.refcnt.store(1, Ordering::Release);
                slot
            }
            None => {
                self.shared.allocated.fetch_add(1, Ordering::Relaxed);
                Arc::new(Slot {
                    refcnt: AtomicI32::new(1),
                    body: Mutex::new(Body::default()),
                    pool: Arc::downgrade(&self.shared),
                })
            }
        };
        Message { slot }
    }

    #[must_use]
    pub fn alloc_with(&self, value: impl Into<Bytes>) -> Message {
        let msg = self.alloc();
        msg.set_value(value);
        msg
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.shared.allocated.load(Ordering::Relaxed),
            reused: self.shared.reused.load(Ordering::Relaxed),
            recycled: self.shared.recycled.load(Ordering::Relaxed),
            idle: self.shared.free.lock().len(),
        }
    }
}

impl Default for MessagePool {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MessagePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MessagePool").field(&self.stats()).finish()
    }
}
