//! Per-subscriber authorization filtering of streamed events.

use crate::acl::{enforce_event, Authorizer};
use crate::stream::Event;

/// Reduce `event` to what `authz` may read.
///
/// `None` means ACLs are disabled and every event passes unchanged. A batch
/// keeps only its readable entries and is dropped when none remain; other
/// events are kept or dropped whole. Sentinels always pass.
pub fn filter_by_auth(authz: Option<&dyn Authorizer>, event: &Event) -> Option<Event> {
    match authz {
        None => Some(event.clone()),
        Some(authz) => event.filter(|e| enforce_event(authz, e).is_allow()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::Decision;
    use crate::stream::Payload;
    use crate::types::{CatalogOp, CheckServiceNode, Node, ServiceHealthUpdate, ServiceInstance, Topic};

    struct AllowServices(Vec<&'static str>);

    impl Authorizer for AllowServices {
        fn node_read(&self, _node: &str) -> Decision {
            Decision::Allow
        }

        fn service_read(&self, service: &str) -> Decision {
            if self.0.iter().any(|s| *s == service) {
                Decision::Allow
            } else {
                Decision::Deny
            }
        }
    }

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

    fn batch(services: &[&str]) -> Event {
        Event::batch(
            Topic::ServiceHealth,
            "",
            9,
            services.iter().map(|s| health(s, 9)).collect(),
        )
    }

    fn batch_keys(event: &Event) -> Vec<String> {
        match &event.payload {
            Payload::Batch(events) => events.iter().map(|e| e.key.clone()).collect(),
            other => panic!("expected batch, got {:?}", other),
        }
    }

    #[test]
    fn test_acls_disabled_keeps_everything() {
        let event = batch(&["web", "db"]);
        assert_eq!(filter_by_auth(None, &event), Some(event));
    }

    #[test]
    fn test_single_event() {
        let authz = AllowServices(vec!["web"]);
        assert!(filter_by_auth(Some(&authz), &health("web", 1)).is_some());
        assert!(filter_by_auth(Some(&authz), &health("db", 1)).is_none());
    }

    #[test]
    fn test_batch_reduced_to_allowed_subset() {
        let authz = AllowServices(vec!["web", "cache"]);
        let event = batch(&["web", "db", "cache", "secret"]);

        let filtered = filter_by_auth(Some(&authz), &event).unwrap();
        assert_eq!(batch_keys(&filtered), vec!["web", "cache"]);
        assert_eq!(filtered.index, 9);
        assert_eq!(batch_keys(&event).len(), 4);
    }

    #[test]
    fn test_batch_with_nothing_allowed_is_dropped() {
        let authz = AllowServices(vec![]);
        assert_eq!(filter_by_auth(Some(&authz), &batch(&["web", "db"])), None);
    }

    #[test]
    fn test_sentinels_pass() {
        let authz = AllowServices(vec![]);
        let end = Event {
            index: 4,
            topic: Topic::ServiceHealth,
            key: "web".to_string(),
            payload: Payload::EndOfSnapshot,
        };
        assert_eq!(filter_by_auth(Some(&authz), &end), Some(end));
    }
}
