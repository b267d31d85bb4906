//! A subscriber's cursor into a topic buffer.

use crate::context::Context;
use crate::error::{Result, StreamError};
use crossbeam_channel::{Receiver, TryRecvError};
use std::fmt;
use std::sync::Arc;

use super::buffer::BufferItem;
use super::event::{Event, SubscribeRequest};
use super::publisher::Shared;

/// Unique identifier for a subscription.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A live subscription created by
/// [`EventPublisher::subscribe`](super::EventPublisher::subscribe).
///
/// Owned by a single consumer. Dropping it unsubscribes.
pub struct Subscription {
    id: SubscriptionId,
    req: SubscribeRequest,
    item: Arc<BufferItem>,
    /// Offset of the next event within `item`.
    offset: usize,
    /// Disconnected when the publisher force-closes this subscription.
    closed: Receiver<()>,
    publisher: Arc<Shared>,
    unsubscribed: bool,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriptionId,
        req: SubscribeRequest,
        item: Arc<BufferItem>,
        closed: Receiver<()>,
        publisher: Arc<Shared>,
    ) -> Self {
        Self {
            id,
            req,
            item,
            offset: 0,
            closed,
            publisher,
            unsubscribed: false,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn request(&self) -> &SubscribeRequest {
        &self.req
    }

    /// Whether the publisher has force-closed this subscription.
    pub fn is_closed(&self) -> bool {
        matches!(self.closed.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Return the next event, blocking while caught up with the buffer tail.
    ///
    /// Fails with [`StreamError::SubscriptionClosed`] once the subscription is
    /// force-closed, or with the context's error if `ctx` is done first.
    pub fn next(&mut self, ctx: &Context) -> Result<Event> {
        loop {
            if self.unsubscribed || self.is_closed() {
                return Err(StreamError::SubscriptionClosed);
            }
            if let Some(event) = self.item.events.get(self.offset) {
                self.offset += 1;
                return Ok(event.clone());
            }
            self.item = self.item.wait_next(ctx, &self.closed)?;
            self.offset = 0;
        }
    }

    /// Detach from the buffer. Idempotent.
    pub fn unsubscribe(&mut self) {
        if self.unsubscribed {
            return;
        }
        self.unsubscribed = true;
        self.publisher.unsubscribe(self.id);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.req.topic)
            .field("key", &self.req.key)
            .field("closed", &self.is_closed())
            .finish()
    }
}
