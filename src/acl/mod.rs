//! Read authorization for streamed records.
//!
//! The policy engine lives outside this crate; it is reached through the
//! [`Authorizer`] capability resolved from a subscriber's token.

use crate::stream::{Event, Payload};
use crate::types::{ServiceHealthUpdate, Update};

/// Outcome of an authorization check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allow(self) -> bool {
        self == Decision::Allow
    }
}

/// Read permissions resolved from a token. Immutable once resolved.
pub trait Authorizer: Send + Sync {
    fn node_read(&self, node: &str) -> Decision;
    fn service_read(&self, service: &str) -> Decision;
}

/// Whether `authz` may read `update`.
pub fn enforce_read(authz: &dyn Authorizer, update: &Update) -> Decision {
    match update {
        Update::ServiceHealth(update) => enforce_service_health(authz, update),
    }
}

fn enforce_service_health(authz: &dyn Authorizer, update: &ServiceHealthUpdate) -> Decision {
    let csn = &update.check_service_node;
    let (Some(node), Some(service)) = (csn.node_name(), csn.service_name()) else {
        return Decision::Deny;
    };
    if node.is_empty() || service.is_empty() {
        return Decision::Deny;
    }
    if !authz.node_read(node).is_allow() {
        return Decision::Deny;
    }
    authz.service_read(service)
}

/// Whether `authz` may read an event as a whole. Sentinels carry no
/// record and are always readable.
pub fn enforce_event(authz: &dyn Authorizer, event: &Event) -> Decision {
    match &event.payload {
        Payload::Update(update) => enforce_read(authz, update),
        Payload::EndOfSnapshot | Payload::EndOfEmptySnapshot => Decision::Allow,
        // A batch nested inside a batch is not reduced: it is readable only
        // if every record in it is.
        Payload::Batch(events) => {
            if events.iter().all(|e| enforce_event(authz, e).is_allow()) {
                Decision::Allow
            } else {
                Decision::Deny
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CatalogOp, CheckServiceNode, Node, ServiceInstance, Topic};

    struct ServicesOnly(&'static [&'static str]);

    impl Authorizer for ServicesOnly {
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

    struct NoNodes;

    impl Authorizer for NoNodes {
        fn node_read(&self, _node: &str) -> Decision {
            Decision::Deny
        }

        fn service_read(&self, _service: &str) -> Decision {
            Decision::Allow
        }
    }

    fn update(node: Option<&str>, service: Option<&str>) -> Update {
        Update::ServiceHealth(ServiceHealthUpdate {
            op: CatalogOp::Register,
            check_service_node: CheckServiceNode {
                node: node.map(|name| Node {
                    name: name.to_string(),
                    address: "10.0.0.1".to_string(),
                    datacenter: "dc1".to_string(),
                }),
                service: service.map(|name| ServiceInstance {
                    id: format!("{}-1", name),
                    service: name.to_string(),
                    port: 80,
                    tags: vec![],
                }),
                checks: vec![],
            },
        })
    }

    #[test]
    fn test_service_read() {
        let authz = ServicesOnly(&["web"]);
        assert_eq!(
            enforce_read(&authz, &update(Some("n1"), Some("web"))),
            Decision::Allow
        );
        assert_eq!(
            enforce_read(&authz, &update(Some("n1"), Some("db"))),
            Decision::Deny
        );
    }

    #[test]
    fn test_node_read_required() {
        assert_eq!(
            enforce_read(&NoNodes, &update(Some("n1"), Some("web"))),
            Decision::Deny
        );
    }

    #[test]
    fn test_incomplete_records_denied() {
        let authz = ServicesOnly(&["web", ""]);
        assert_eq!(enforce_read(&authz, &update(None, Some("web"))), Decision::Deny);
        assert_eq!(enforce_read(&authz, &update(Some("n1"), None)), Decision::Deny);
        assert_eq!(enforce_read(&authz, &update(Some(""), Some("web"))), Decision::Deny);
        assert_eq!(enforce_read(&authz, &update(Some("n1"), Some(""))), Decision::Deny);
    }

    #[test]
    fn test_sentinels_always_allowed() {
        let event = Event {
            index: 1,
            topic: Topic::ServiceHealth,
            key: String::new(),
            payload: Payload::EndOfEmptySnapshot,
        };
        assert_eq!(enforce_event(&NoNodes, &event), Decision::Allow);
    }
}
