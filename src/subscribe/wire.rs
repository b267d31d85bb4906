//! Messages exchanged with remote subscribers and peer servers.

use crate::stream;
use crate::types::{ServiceHealthUpdate, Topic, Update};
use serde::{Deserialize, Serialize};

/// A subscribe call as received from a client or relayed to a peer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub topic: Topic,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub token: String,
    /// Last index the client has seen, 0 for a full snapshot.
    #[serde(default)]
    pub index: u64,
    /// Datacenter that should serve the call. Empty means the local one.
    #[serde(default)]
    pub datacenter: String,
}

impl SubscribeRequest {
    pub fn to_stream_request(&self) -> stream::SubscribeRequest {
        stream::SubscribeRequest {
            topic: self.topic,
            key: self.key.clone(),
            token: self.token.clone(),
            index: self.index,
        }
    }
}

/// An event as sent to subscribers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub topic: Topic,
    pub key: String,
    pub index: u64,
    pub payload: WirePayload,
}

/// Exactly one payload per wire event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WirePayload {
    EndOfSnapshot,
    EndOfEmptySnapshot,
    EventBatch(Vec<Event>),
    ServiceHealth(ServiceHealthUpdate),
}

impl Event {
    /// Translate a streamed event for the subscriber that asked for `req`.
    ///
    /// The top-level event is labelled with the request's topic and key;
    /// batch entries keep their own key and index. Entries also carry their
    /// topic, which always equals the batch's since publishes are grouped by
    /// topic, so every wire event decodes the same way.
    pub fn from_stream(req: &stream::SubscribeRequest, event: &stream::Event) -> Self {
        Self {
            topic: req.topic,
            key: req.key.clone(),
            index: event.index,
            payload: WirePayload::from_stream(&event.payload),
        }
    }

    fn batch_entry(event: &stream::Event) -> Self {
        Self {
            topic: event.topic,
            key: event.key.clone(),
            index: event.index,
            payload: WirePayload::from_stream(&event.payload),
        }
    }

    pub fn is_end_of_snapshot(&self) -> bool {
        matches!(self.payload, WirePayload::EndOfSnapshot)
    }

    pub fn is_end_of_empty_snapshot(&self) -> bool {
        matches!(self.payload, WirePayload::EndOfEmptySnapshot)
    }
}

impl WirePayload {
    fn from_stream(payload: &stream::Payload) -> Self {
        match payload {
            stream::Payload::EndOfSnapshot => WirePayload::EndOfSnapshot,
            stream::Payload::EndOfEmptySnapshot => WirePayload::EndOfEmptySnapshot,
            stream::Payload::Batch(events) => {
                WirePayload::EventBatch(events.iter().map(Event::batch_entry).collect())
            }
            stream::Payload::Update(update) => match update.as_ref() {
                Update::ServiceHealth(update) => WirePayload::ServiceHealth(update.clone()),
            },
        }
    }
}
