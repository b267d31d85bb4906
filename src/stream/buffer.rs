//! Append-only event chains shared by many readers.
//!
//! An [`EventBuffer`] is a singly-linked list of [`BufferItem`]s. The writer
//! links a new item onto the tail and disconnects the old tail's readiness
//! channel, which wakes every reader blocked on it at once. Readers hold an
//! `Arc` to the item they are on and follow `next` without taking any lock,
//! so a slow reader keeps only its own suffix of the chain alive.

use crate::context::Context;
use crate::error::{ContextError, Result, StreamError};
use crossbeam_channel::{bounded, select, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use super::event::Event;

/// One link of the chain, holding the events of a single append.
pub(crate) struct BufferItem {
    pub(crate) events: Vec<Event>,
    /// Disconnected once `next` is set.
    ready: Receiver<()>,
    signal: Mutex<Option<Sender<()>>>,
    next: OnceLock<Arc<BufferItem>>,
}

impl BufferItem {
    fn new(events: Vec<Event>) -> Arc<Self> {
        let (tx, rx) = bounded(0);
        Arc::new(Self {
            events,
            ready: rx,
            signal: Mutex::new(Some(tx)),
            next: OnceLock::new(),
        })
    }

    /// The following item, if one has been appended.
    pub(crate) fn next(&self) -> Option<&Arc<BufferItem>> {
        self.next.get()
    }

    fn link(&self, item: Arc<BufferItem>) {
        if self.next.set(item).is_ok() {
            // Publish `next` before waking readers.
            self.signal.lock().take();
        }
    }

    /// Block until the following item exists, `closed` disconnects, or `ctx`
    /// is done.
    pub(crate) fn wait_next(&self, ctx: &Context, closed: &Receiver<()>) -> Result<Arc<BufferItem>> {
        loop {
            if let Some(next) = self.next.get() {
                return Ok(Arc::clone(next));
            }
            let timer = ctx.timer();
            select! {
                recv(self.ready) -> _ => continue,
                recv(closed) -> _ => return Err(StreamError::SubscriptionClosed),
                recv(ctx.done()) -> _ => return Err(ContextError::Canceled.into()),
                recv(timer) -> _ => return Err(ContextError::DeadlineExceeded.into()),
            }
        }
    }
}

impl Drop for BufferItem {
    // Unlink iteratively so dropping a long chain cannot overflow the stack.
    fn drop(&mut self) {
        let mut next = self.next.take();
        while let Some(item) = next {
            match Arc::try_unwrap(item) {
                Ok(mut item) => next = item.next.take(),
                Err(_) => break,
            }
        }
    }
}

/// Head and tail of a chain. Only the owner of `&mut EventBuffer` appends.
pub(crate) struct EventBuffer {
    head: Arc<BufferItem>,
    tail: Arc<BufferItem>,
    /// Spliced items waiting to be linked to the next append.
    joins: Vec<Arc<BufferItem>>,
}

impl EventBuffer {
    pub(crate) fn new() -> Self {
        let sentinel = BufferItem::new(Vec::new());
        Self {
            head: Arc::clone(&sentinel),
            tail: sentinel,
            joins: Vec::new(),
        }
    }

    pub(crate) fn append(&mut self, events: Vec<Event>) {
        let item = BufferItem::new(events);
        self.tail.link(Arc::clone(&item));
        for join in self.joins.drain(..) {
            join.link(Arc::clone(&item));
        }
        self.tail = item;
    }

    /// Start a new head holding `events` that continues with whatever is
    /// appended after the current tail.
    ///
    /// Readers already on the chain are unaffected. Items before the old
    /// head are freed once those readers move past them.
    pub(crate) fn splice(&mut self, events: Vec<Event>) {
        let item = BufferItem::new(events);
        self.joins.push(Arc::clone(&item));
        self.head = item;
    }

    /// The item new readers start from. Readers starting here see every
    /// event from the current head on.
    pub(crate) fn head(&self) -> Arc<BufferItem> {
        Arc::clone(&self.head)
    }
}

/// The chain for one subject plus its snapshot and reader bookkeeping.
pub(crate) struct TopicBuffer {
    buffer: EventBuffer,
    /// Index the snapshot at the head of the chain was taken at.
    pub(crate) snapshot_index: u64,
    /// Events appended since the snapshot at the head.
    backlog: usize,
    readers: usize,
    /// Armed when the last reader detaches, cleared when one attaches.
    idle_deadline: Option<Instant>,
}

impl TopicBuffer {
    /// A buffer whose chain starts with `snapshot`.
    ///
    /// The snapshot events and the closing sentinel are appended as one item,
    /// so a reader sees the sentinel after every snapshot event and before any
    /// later append.
    pub(crate) fn with_snapshot(mut snapshot: Vec<Event>, end: Event, snapshot_index: u64) -> Self {
        let mut buffer = EventBuffer::new();
        snapshot.push(end);
        buffer.append(snapshot);
        Self {
            buffer,
            snapshot_index,
            backlog: 0,
            readers: 0,
            idle_deadline: None,
        }
    }

    /// Replace the snapshot new readers start from. The fresh snapshot must
    /// be current as of the buffer's tail.
    pub(crate) fn resnapshot(&mut self, mut snapshot: Vec<Event>, end: Event, snapshot_index: u64) {
        snapshot.push(end);
        self.buffer.splice(snapshot);
        self.snapshot_index = snapshot_index;
        self.backlog = 0;
    }

    pub(crate) fn backlog(&self) -> usize {
        self.backlog
    }

    pub(crate) fn append(&mut self, events: Vec<Event>) {
        if !events.is_empty() {
            self.backlog += events.len();
            self.buffer.append(events);
        }
    }

    /// Attach a reader, disarming any pending eviction. Returns the position
    /// the reader starts from.
    pub(crate) fn attach(&mut self) -> Arc<BufferItem> {
        self.readers += 1;
        self.idle_deadline = None;
        self.buffer.head()
    }

    /// Detach a reader. Arms the eviction timer when the last one leaves and
    /// returns the deadline it was armed with.
    pub(crate) fn detach(&mut self, now: Instant, ttl: Duration) -> Option<Instant> {
        self.readers = self.readers.saturating_sub(1);
        if self.readers == 0 {
            // A ttl past the end of time never expires.
            self.idle_deadline = now.checked_add(ttl);
        }
        self.idle_deadline
    }

    pub(crate) fn readers(&self) -> usize {
        self.readers
    }

    pub(crate) fn idle_deadline(&self) -> Option<Instant> {
        self.idle_deadline
    }

    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        self.readers == 0 && self.idle_deadline.map_or(false, |d| d <= now)
    }
}
