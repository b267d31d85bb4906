//! Core types shared by the stream and the subscribe server.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A class of events a subscriber can watch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// Health changes for instances of a service.
    ServiceHealth,
    /// Health changes for the connect-capable instances of a service.
    ServiceHealthConnect,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::ServiceHealth => "ServiceHealth",
            Topic::ServiceHealthConnect => "ServiceHealthConnect",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of catalog mutation carried by an update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogOp {
    Register,
    Deregister,
}

/// Aggregated status of a health check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Passing,
    Warning,
    Critical,
}

/// A node in the catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub address: String,
    pub datacenter: String,
}

/// A service instance registered on a node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub id: String,
    /// Logical service name, the unit ACLs are written against.
    pub service: String,
    pub port: u16,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub check_id: String,
    pub name: String,
    pub status: HealthStatus,
    /// Empty for node-level checks.
    #[serde(default)]
    pub service_name: String,
}

/// A service instance together with its node and checks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckServiceNode {
    pub node: Option<Node>,
    pub service: Option<ServiceInstance>,
    #[serde(default)]
    pub checks: Vec<HealthCheck>,
}

impl CheckServiceNode {
    pub fn node_name(&self) -> Option<&str> {
        self.node.as_ref().map(|n| n.name.as_str())
    }

    pub fn service_name(&self) -> Option<&str> {
        self.service.as_ref().map(|s| s.service.as_str())
    }
}

/// A single service health change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceHealthUpdate {
    pub op: CatalogOp,
    pub check_service_node: CheckServiceNode,
}

/// A single domain record carried by an event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Update {
    ServiceHealth(ServiceHealthUpdate),
}

impl From<ServiceHealthUpdate> for Update {
    fn from(update: ServiceHealthUpdate) -> Self {
        Update::ServiceHealth(update)
    }
}
