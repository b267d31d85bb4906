//! Events, payloads and subscribe requests.

use crate::types::{Topic, Update};
use std::sync::Arc;

/// Payload of an [`Event`]. Exactly one shape holds per event.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// A single domain record.
    Update(Arc<Update>),
    /// An ordered batch of events, used for bulk snapshot delivery and
    /// coalesced updates.
    Batch(Arc<[Event]>),
    /// Marks the end of a snapshot; everything after it is live.
    EndOfSnapshot,
    /// Marks the end of a snapshot that contained no events.
    EndOfEmptySnapshot,
}

/// An immutable unit of change.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// Raft index of the change. Monotonic within a topic.
    pub index: u64,
    pub topic: Topic,
    pub key: String,
    pub payload: Payload,
}

impl Event {
    pub fn new(topic: Topic, key: impl Into<String>, index: u64, update: impl Into<Update>) -> Self {
        Self {
            index,
            topic,
            key: key.into(),
            payload: Payload::Update(Arc::new(update.into())),
        }
    }

    pub fn batch(topic: Topic, key: impl Into<String>, index: u64, events: Vec<Event>) -> Self {
        Self {
            index,
            topic,
            key: key.into(),
            payload: Payload::Batch(events.into()),
        }
    }

    pub(crate) fn end_of_snapshot(topic: Topic, key: &str, index: u64) -> Self {
        Self {
            index,
            topic,
            key: key.to_string(),
            payload: Payload::EndOfSnapshot,
        }
    }

    pub(crate) fn end_of_empty_snapshot(topic: Topic, key: &str, index: u64) -> Self {
        Self {
            index,
            topic,
            key: key.to_string(),
            payload: Payload::EndOfEmptySnapshot,
        }
    }

    pub fn is_end_of_snapshot(&self) -> bool {
        matches!(self.payload, Payload::EndOfSnapshot)
    }

    pub fn is_end_of_empty_snapshot(&self) -> bool {
        matches!(self.payload, Payload::EndOfEmptySnapshot)
    }

    /// True for snapshot delimiters, which carry no domain payload.
    pub fn is_sentinel(&self) -> bool {
        self.is_end_of_snapshot() || self.is_end_of_empty_snapshot()
    }

    /// Number of records carried: the batch size for a batch, else 1.
    pub fn len(&self) -> usize {
        match &self.payload {
            Payload::Batch(events) => events.len(),
            _ => 1,
        }
    }

    /// Returns the event reduced to what `keep` accepts, or `None` if nothing
    /// survives.
    ///
    /// A batch is filtered per element and dropped only if every element is
    /// rejected. Any other event is kept or dropped whole. `self` is never
    /// modified; a reduced batch is a new event.
    pub fn filter<F>(&self, mut keep: F) -> Option<Event>
    where
        F: FnMut(&Event) -> bool,
    {
        let events = match &self.payload {
            Payload::Batch(events) => events,
            _ => return keep(self).then(|| self.clone()),
        };

        let kept: Vec<Event> = events.iter().filter(|e| keep(e)).cloned().collect();
        if kept.is_empty() {
            return None;
        }
        if kept.len() == events.len() {
            return Some(self.clone());
        }
        Some(Event {
            index: self.index,
            topic: self.topic,
            key: self.key.clone(),
            payload: Payload::Batch(kept.into()),
        })
    }
}

/// Parameters of a subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub topic: Topic,
    /// Restricts the subscription to one key. Empty means every key.
    pub key: String,
    /// Credential of the subscriber; used to force-close on token changes.
    pub token: String,
    /// Last index the caller has already seen, 0 for a full snapshot.
    pub index: u64,
}

impl SubscribeRequest {
    pub fn new(topic: Topic, key: impl Into<String>) -> Self {
        Self {
            topic,
            key: key.into(),
            token: String::new(),
            index: 0,
        }
    }

    pub fn subject(&self) -> Subject {
        Subject {
            topic: self.topic,
            key: self.key.clone(),
        }
    }
}

/// The topic and key a buffer serves.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Subject {
    pub topic: Topic,
    pub key: String,
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.key.is_empty() {
            write!(f, "{}", self.topic)
        } else {
            write!(f, "{}/{}", self.topic, self.key)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CatalogOp, CheckServiceNode, Node, ServiceHealthUpdate, ServiceInstance};

    fn health(service: &str, index: u64) -> Event {
        Event::new(
            Topic::ServiceHealth,
            service,
            index,
            ServiceHealthUpdate {
                op: CatalogOp::Register,
                check_service_node: CheckServiceNode {
                    node: Some(Node {
                        name: "node1".to_string(),
                        address: "10.0.0.1".to_string(),
                        datacenter: "dc1".to_string(),
                    }),
                    service: Some(ServiceInstance {
                        id: format!("{}-1", service),
                        service: service.to_string(),
                        port: 8080,
                        tags: vec![],
                    }),
                    checks: vec![],
                },
            },
        )
    }

    #[test]
    fn test_filter_single_event() {
        let event = health("web", 5);
        assert_eq!(event.filter(|_| true), Some(event.clone()));
        assert_eq!(event.filter(|_| false), None);
    }

    #[test]
    fn test_filter_batch_keeps_subset() {
        let batch = Event::batch(
            Topic::ServiceHealth,
            "",
            7,
            vec![health("web", 7), health("db", 7), health("web", 7)],
        );

        let filtered = batch.filter(|e| e.key == "web").unwrap();
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered.index, 7);

        // Input untouched
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn test_filter_batch_all_rejected() {
        let batch = Event::batch(Topic::ServiceHealth, "", 7, vec![health("db", 7)]);
        assert_eq!(batch.filter(|e| e.key == "web"), None);
    }

    #[test]
    fn test_filter_batch_all_kept_shares_payload() {
        let batch = Event::batch(Topic::ServiceHealth, "", 7, vec![health("web", 7)]);
        let filtered = batch.filter(|_| true).unwrap();
        match (&batch.payload, &filtered.payload) {
            (Payload::Batch(a), Payload::Batch(b)) => assert!(Arc::ptr_eq(a, b)),
            _ => panic!("expected batches"),
        }
    }

    #[test]
    fn test_sentinels() {
        let end = Event::end_of_snapshot(Topic::ServiceHealth, "web", 3);
        assert!(end.is_end_of_snapshot());
        assert!(end.is_sentinel());
        assert!(!end.is_end_of_empty_snapshot());

        let empty = Event::end_of_empty_snapshot(Topic::ServiceHealth, "web", 3);
        assert!(empty.is_end_of_empty_snapshot());
        assert_eq!(empty.len(), 1);
    }

    #[test]
    fn test_subject_display() {
        let all = SubscribeRequest::new(Topic::ServiceHealth, "").subject();
        let web = SubscribeRequest::new(Topic::ServiceHealth, "web").subject();
        assert_eq!(all.to_string(), "ServiceHealth");
        assert_eq!(web.to_string(), "ServiceHealth/web");
    }
}
