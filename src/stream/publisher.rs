//! The event publisher: owns every topic buffer and hands out subscriptions.

use crate::context::Context;
use crate::error::{BoxError, Result, StreamError};
use crate::types::Topic;
use crossbeam_channel::{at, bounded, never, select, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::buffer::TopicBuffer;
use super::event::{Event, SubscribeRequest, Subject};
use super::subscription::{Subscription, SubscriptionId};

/// Default time an unread buffer and its snapshot are kept for reuse.
const DEFAULT_IDLE_BUFFER_TTL: Duration = Duration::from_secs(10);

/// Default number of events a buffer may hold past its snapshot before a new
/// subscriber gets a fresh snapshot instead of replaying them.
const DEFAULT_MAX_SNAPSHOT_BACKLOG: usize = 10_000;

/// Publisher configuration.
#[derive(Clone, Debug)]
pub struct PublisherConfig {
    /// How long a buffer with no readers is kept before it is evicted.
    /// A subscriber arriving within this window reuses the buffer's snapshot.
    /// Zero discards a buffer as soon as its last reader detaches; a ttl too
    /// large to add to the current time never evicts.
    /// Default: 10s
    pub idle_buffer_ttl: Duration,
    /// Events appended past a buffer's snapshot before the next subscriber
    /// takes a fresh snapshot instead of replaying them.
    /// Default: 10000
    pub max_snapshot_backlog: usize,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            idle_buffer_ttl: DEFAULT_IDLE_BUFFER_TTL,
            max_snapshot_backlog: DEFAULT_MAX_SNAPSHOT_BACKLOG,
        }
    }
}

/// Current state of a subject as produced by a snapshot handler.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pub events: Vec<Event>,
    /// Index the state was read at.
    pub index: u64,
}

/// Produces the snapshot for a subscribe request.
pub type SnapshotFn =
    Arc<dyn Fn(&SubscribeRequest) -> std::result::Result<Snapshot, BoxError> + Send + Sync>;

/// Snapshot handlers by topic. A topic without a handler cannot be subscribed to.
#[derive(Clone, Default)]
pub struct SnapshotHandlers {
    handlers: HashMap<Topic, SnapshotFn>,
}

impl SnapshotHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, topic: Topic, handler: F) -> &mut Self
    where
        F: Fn(&SubscribeRequest) -> std::result::Result<Snapshot, BoxError> + Send + Sync + 'static,
    {
        self.handlers.insert(topic, Arc::new(handler));
        self
    }

    pub fn with<F>(mut self, topic: Topic, handler: F) -> Self
    where
        F: Fn(&SubscribeRequest) -> std::result::Result<Snapshot, BoxError> + Send + Sync + 'static,
    {
        self.register(topic, handler);
        self
    }

    fn get(&self, topic: Topic) -> Option<&SnapshotFn> {
        self.handlers.get(&topic)
    }
}

/// A live subscription as tracked by the publisher.
struct Registration {
    subject: Subject,
    token: String,
    /// Dropping this force-closes the subscription.
    _close: Sender<()>,
}

struct State {
    /// Buffers by topic, then by key.
    buffers: HashMap<Topic, HashMap<String, TopicBuffer>>,
    subscriptions: HashMap<SubscriptionId, Registration>,
    /// Last index published per topic.
    last_index: HashMap<Topic, u64>,
    closed: bool,
}

impl State {
    /// Forget a subscription and detach it from its buffer. Returns true if
    /// an eviction timer was armed.
    fn remove_subscription(&mut self, id: SubscriptionId, now: Instant, ttl: Duration) -> bool {
        let Some(reg) = self.subscriptions.remove(&id) else {
            return false;
        };
        let Some(buffers) = self.buffers.get_mut(&reg.subject.topic) else {
            return false;
        };
        let Some(buffer) = buffers.get_mut(&reg.subject.key) else {
            return false;
        };
        if buffer.detach(now, ttl).is_none() {
            return false;
        }
        if ttl.is_zero() {
            buffers.remove(&reg.subject.key);
            debug!(subject = %reg.subject, "discarded unread buffer");
            return false;
        }
        true
    }

    fn next_eviction(&self) -> Option<Instant> {
        self.buffers
            .values()
            .flat_map(|buffers| buffers.values())
            .filter(|buffer| buffer.readers() == 0)
            .filter_map(|buffer| buffer.idle_deadline())
            .min()
    }

    fn evict_expired(&mut self, now: Instant) {
        for (topic, buffers) in self.buffers.iter_mut() {
            buffers.retain(|key, buffer| {
                let expired = buffer.is_expired(now);
                if expired {
                    debug!(
                        topic = %topic,
                        key = %key,
                        snapshot_index = buffer.snapshot_index,
                        "evicted idle buffer"
                    );
                }
                !expired
            });
        }
        self.buffers.retain(|_, buffers| !buffers.is_empty());
    }
}

/// State shared between the publisher and its subscriptions.
pub(crate) struct Shared {
    state: Mutex<State>,
    handlers: SnapshotHandlers,
    config: PublisherConfig,
    next_id: AtomicU64,
    /// Nudges the run loop to recompute its eviction timer.
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl Shared {
    pub(crate) fn unsubscribe(&self, id: SubscriptionId) {
        let armed = {
            let mut state = self.state.lock();
            state.remove_subscription(id, Instant::now(), self.config.idle_buffer_ttl)
        };
        if armed {
            self.wake();
        }
    }

    fn wake(&self) {
        // A pending wake-up already covers this one.
        let _ = self.wake_tx.try_send(());
    }
}

/// Owns every topic buffer, accepts published events and creates
/// subscriptions.
///
/// Cloning yields another handle to the same publisher.
#[derive(Clone)]
pub struct EventPublisher {
    shared: Arc<Shared>,
}

impl EventPublisher {
    pub fn new(handlers: SnapshotHandlers, config: PublisherConfig) -> Self {
        let (wake_tx, wake_rx) = bounded(1);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    buffers: HashMap::new(),
                    subscriptions: HashMap::new(),
                    last_index: HashMap::new(),
                    closed: false,
                }),
                handlers,
                config,
                next_id: AtomicU64::new(1),
                wake_tx,
                wake_rx,
            }),
        }
    }

    /// Drive buffer eviction until `ctx` is done, then shut down.
    ///
    /// Shutdown force-closes every subscription and rejects later subscribe
    /// and publish calls. Blocks the calling thread.
    pub fn run(&self, ctx: &Context) {
        debug!("event publisher running");
        loop {
            let eviction = match self.shared.state.lock().next_eviction() {
                Some(deadline) => at(deadline),
                None => never(),
            };
            let deadline = ctx.timer();
            select! {
                recv(ctx.done()) -> _ => break,
                recv(deadline) -> _ => break,
                recv(self.shared.wake_rx) -> _ => {}
                recv(eviction) -> _ => self.shared.state.lock().evict_expired(Instant::now()),
            }
        }
        self.shutdown();
    }

    fn shutdown(&self) {
        let mut state = self.shared.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        let closed = state.subscriptions.len();
        // Dropping the registrations disconnects every close channel.
        state.subscriptions.clear();
        state.buffers.clear();
        info!(subscriptions = closed, "event publisher shut down");
    }

    /// Append events to the buffers of their topics.
    ///
    /// Events are grouped by topic, keeping their relative order. Each group
    /// goes to every buffer of the topic whose key is empty or equal to the
    /// event key. Topics nobody is subscribed to are not buffered.
    ///
    /// Per topic, indices must not decrease within the call and the first must
    /// be greater than the last index already published. A violation rejects
    /// the whole call before anything is appended.
    pub fn publish(&self, events: Vec<Event>) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let groups = group_by_topic(events);

        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(StreamError::PublisherClosed);
        }
        for (topic, events) in &groups {
            if let Err(e) = check_indexes(*topic, state.last_index.get(topic).copied(), events) {
                warn!(error = %e, "rejected publish");
                return Err(e);
            }
        }

        for (topic, events) in groups {
            if let Some(last) = events.last() {
                state.last_index.insert(topic, last.index);
            }
            let Some(buffers) = state.buffers.get_mut(&topic) else {
                continue;
            };
            for (key, buffer) in buffers.iter_mut() {
                let matching = if key.is_empty() {
                    events.clone()
                } else {
                    events.iter().filter(|e| e.key == *key).cloned().collect()
                };
                buffer.append(matching);
            }
        }
        Ok(())
    }

    /// Create a subscription positioned at the start of the subject's buffer.
    ///
    /// If no buffer exists for the request's topic and key, the topic's
    /// snapshot handler runs while the publisher lock is held and its events,
    /// closed by an end-of-snapshot sentinel, start the new buffer. An existing
    /// buffer is reused: the subscriber replays its snapshot and every event
    /// appended since. Once more than
    /// [`max_snapshot_backlog`](PublisherConfig::max_snapshot_backlog) events
    /// were appended past the snapshot, a fresh snapshot is taken and spliced
    /// in at the tail instead. Readers already attached are unaffected.
    pub fn subscribe(&self, req: SubscribeRequest) -> Result<Subscription> {
        let handler = self
            .shared
            .handlers
            .get(req.topic)
            .ok_or(StreamError::NoSnapshotHandler(req.topic))?;

        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(StreamError::PublisherClosed);
        }

        let subject = req.subject();
        let max_backlog = self.shared.config.max_snapshot_backlog;
        let buffers = state.buffers.entry(req.topic).or_default();
        let buffer = match buffers.entry(req.key.clone()) {
            Entry::Occupied(entry) => {
                let buffer = entry.into_mut();
                if buffer.backlog() > max_backlog {
                    let (events, end, index) = take_snapshot(handler, &req)?;
                    debug!(
                        subject = %subject,
                        index,
                        backlog = buffer.backlog(),
                        "replaced stale snapshot"
                    );
                    buffer.resnapshot(events, end, index);
                } else {
                    debug!(subject = %subject, "reusing buffer");
                }
                buffer
            }
            Entry::Vacant(entry) => {
                let (events, end, index) = take_snapshot(handler, &req)?;
                debug!(
                    subject = %subject,
                    index,
                    events = events.len(),
                    "built snapshot"
                );
                entry.insert(TopicBuffer::with_snapshot(events, end, index))
            }
        };
        let item = buffer.attach();
        let readers = buffer.readers();

        let id = SubscriptionId(self.shared.next_id.fetch_add(1, Ordering::SeqCst));
        let (close, closed) = bounded(0);
        state.subscriptions.insert(
            id,
            Registration {
                subject,
                token: req.token.clone(),
                _close: close,
            },
        );
        debug!(id = %id, readers, "subscribed");

        Ok(Subscription::new(
            id,
            req,
            item,
            closed,
            Arc::clone(&self.shared),
        ))
    }

    /// Force-close every subscription created with one of `tokens`, e.g. after
    /// the tokens' permissions changed. Closed subscribers must resubscribe.
    pub fn close_subscriptions_for_tokens<T: AsRef<str>>(&self, tokens: &[T]) {
        let armed = {
            let mut state = self.shared.state.lock();
            let ids: Vec<SubscriptionId> = state
                .subscriptions
                .iter()
                .filter(|(_, reg)| tokens.iter().any(|t| t.as_ref() == reg.token))
                .map(|(id, _)| *id)
                .collect();
            let now = Instant::now();
            let ttl = self.shared.config.idle_buffer_ttl;
            let mut armed = false;
            for id in &ids {
                armed |= state.remove_subscription(*id, now, ttl);
            }
            if !ids.is_empty() {
                debug!(count = ids.len(), "closed subscriptions for tokens");
            }
            armed
        };
        if armed {
            self.shared.wake();
        }
    }

    /// Force-close every subscription on `topic` and discard its buffers, so
    /// the next subscriber gets a fresh snapshot.
    pub fn refresh_topic(&self, topic: Topic) {
        let mut state = self.shared.state.lock();
        state
            .subscriptions
            .retain(|_, reg| reg.subject.topic != topic);
        if let Some(buffers) = state.buffers.remove(&topic) {
            debug!(topic = %topic, buffers = buffers.len(), "refreshed topic");
        }
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.shared.state.lock().subscriptions.len()
    }

    /// Number of retained buffers, including idle ones awaiting eviction.
    pub fn buffer_count(&self) -> usize {
        self.shared
            .state
            .lock()
            .buffers
            .values()
            .map(|buffers| buffers.len())
            .sum()
    }
}

/// Run the topic's handler for `req`, returning the snapshot events, the
/// sentinel that closes them and the snapshot index.
fn take_snapshot(handler: &SnapshotFn, req: &SubscribeRequest) -> Result<(Vec<Event>, Event, u64)> {
    let snapshot = handler(req).map_err(|source| StreamError::Snapshot {
        topic: req.topic,
        source,
    })?;
    let end = if snapshot.events.is_empty() {
        Event::end_of_empty_snapshot(req.topic, &req.key, snapshot.index)
    } else {
        Event::end_of_snapshot(req.topic, &req.key, snapshot.index)
    };
    Ok((snapshot.events, end, snapshot.index))
}

/// Split events by topic, preserving order within each topic.
fn group_by_topic(events: Vec<Event>) -> Vec<(Topic, Vec<Event>)> {
    let mut groups: Vec<(Topic, Vec<Event>)> = Vec::new();
    for event in events {
        match groups.iter_mut().find(|(topic, _)| *topic == event.topic) {
            Some((_, group)) => group.push(event),
            None => groups.push((event.topic, vec![event])),
        }
    }
    groups
}

fn check_indexes(topic: Topic, last: Option<u64>, events: &[Event]) -> Result<()> {
    let mut prev = last;
    for (i, event) in events.iter().enumerate() {
        if let Some(last) = prev {
            let regressed = if i == 0 {
                event.index <= last
            } else {
                event.index < last
            };
            if regressed {
                return Err(StreamError::IndexRegression {
                    topic,
                    index: event.index,
                    last,
                });
            }
        }
        prev = Some(event.index);
    }
    Ok(())
}
