//! Result records of a reconciliation run.
//!
//! A [`ReconcileReport`] is handed back to the driver next to the patched
//! template. It carries everything needed for a human-readable summary and
//! is serialized as JSON when a report file is requested.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::Gateway;

/// A declared path resource that already exists live and was removed from
/// the template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedundantResource {
    /// Logical name of the removed template node.
    pub key: String,
    /// Id of the live resource standing in for it.
    pub live_id: String,
    /// Id of that live resource's parent.
    pub live_parent_id: String,
}

/// A declared path resource that will be created by the deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewResource {
    /// Logical name of the template node.
    pub key: String,
    /// Declared path segment, if literal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_part: Option<String>,
}

/// Summary of one reconciliation run.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    /// Correlation id of the run (also present on every log line).
    pub run_id: Uuid,
    /// When reconciliation finished.
    pub reconciled_at: DateTime<Utc>,
    /// The shared gateway the template now targets.
    pub gateway: Gateway,
    /// Whether the gateway was created during this run.
    pub gateway_created: bool,
    /// Id of the resource new paths are grafted under.
    pub attachment_resource_id: String,
    /// Logical name of the removed gateway declaration, if there was one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed_gateway_node: Option<String>,
    /// Path resources that already existed live.
    pub redundant: Vec<RedundantResource>,
    /// Path resources left for the deployment to create.
    pub new_resources: Vec<NewResource>,
}

impl ReconcileReport {
    /// One-line human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let created = if self.gateway_created { " (created)" } else { "" };
        format!(
            "shared gateway {}{created}, attachment {}: {} new path resource(s), {} already live",
            self.gateway,
            self.attachment_resource_id,
            self.new_resources.len(),
            self.redundant.len(),
        )
    }
}
