//! In-memory gateway administration API backed by a JSON snapshot.
//!
//! Used for offline runs (`--snapshot`) and as the collaborator in tests.
//! Behaves like the real service where it matters to reconciliation:
//! resources are paged with opaque tokens, a new gateway comes with a root
//! resource, and sibling path parts are unique.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{GatewayAdmin, ResourcePage};
use crate::domain::{Expr, Gateway, LiveResource, NodeKind, Template};
use crate::error::ReconcileError;

/// Serializable state of every gateway and its resources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveSnapshot {
    /// Known gateways.
    #[serde(default)]
    pub gateways: Vec<Gateway>,
    /// Path resources keyed by gateway id.
    #[serde(default)]
    pub resources: HashMap<String, Vec<LiveResource>>,
}

/// [`GatewayAdmin`] over an in-process [`LiveSnapshot`].
#[derive(Debug, Default)]
pub struct InMemoryGatewayAdmin {
    state: RwLock<LiveSnapshot>,
    resource_page_requests: AtomicUsize,
    gateways_created: AtomicUsize,
}

impl InMemoryGatewayAdmin {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with `snapshot`.
    #[must_use]
    pub fn from_snapshot(snapshot: LiveSnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
            ..Self::default()
        }
    }

    /// Parses a snapshot file's contents.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Configuration`] if the text is not a valid
    /// snapshot.
    pub fn from_json_str(text: &str) -> Result<Self, ReconcileError> {
        let snapshot: LiveSnapshot = serde_json::from_str(text)
            .map_err(|e| ReconcileError::Configuration(format!("invalid live snapshot: {e}")))?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Returns a copy of the current state.
    pub async fn snapshot(&self) -> LiveSnapshot {
        self.state.read().await.clone()
    }

    /// Number of `list_resources` calls served so far.
    #[must_use]
    pub fn resource_page_requests(&self) -> usize {
        self.resource_page_requests.load(Ordering::Relaxed)
    }

    /// Number of gateways created through [`GatewayAdmin::create_gateway`].
    #[must_use]
    pub fn gateways_created(&self) -> usize {
        self.gateways_created.load(Ordering::Relaxed)
    }

    /// Creates every path resource declared in `template` on `gateway_id`,
    /// as a deployment of the reconciled template would.
    ///
    /// Parents must be literal live ids or references to other path
    /// resources of the same template. Returns the created resources in
    /// creation order.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Upstream`] if the gateway is unknown, a
    /// sibling with the same path part already exists, or a parent cannot
    /// be resolved.
    pub async fn provision(
        &self,
        gateway_id: &str,
        template: &Template,
    ) -> Result<Vec<LiveResource>, ReconcileError> {
        let mut state = self.state.write().await;
        let resources = state.resources.get_mut(gateway_id).ok_or_else(|| {
            ReconcileError::Upstream(format!("gateway {gateway_id} not found"))
        })?;

        let mut pending: Vec<_> = template
            .resources_of_kind(&NodeKind::PathResource)
            .collect();
        let mut created_ids: HashMap<String, String> = HashMap::new();
        let mut created = Vec::with_capacity(pending.len());

        while !pending.is_empty() {
            let before = pending.len();
            let mut waiting = Vec::with_capacity(pending.len());

            for node in pending {
                let parent_id = match node.parent() {
                    Some(Expr::Ref(key)) => created_ids.get(key).cloned(),
                    Some(other) => other.as_str().map(str::to_string),
                    None => None,
                };
                let parent = parent_id
                    .as_deref()
                    .and_then(|id| resources.iter().find(|r| r.id == id))
                    .cloned();
                let (Some(parent), Some(path_part)) = (parent, node.path_part()) else {
                    waiting.push(node);
                    continue;
                };

                let duplicate = resources.iter().any(|r| {
                    r.parent_id.as_deref() == Some(parent.id.as_str())
                        && r.path_part.as_deref() == Some(path_part)
                });
                if duplicate {
                    return Err(ReconcileError::Upstream(format!(
                        "conflict: {} already has a child '{path_part}'",
                        parent.path
                    )));
                }

                let resource = LiveResource::child(generate_id(), &parent, path_part);
                created_ids.insert(node.key().to_string(), resource.id.clone());
                resources.push(resource.clone());
                created.push(resource);
            }

            if waiting.len() == before {
                let keys: Vec<&str> = waiting.iter().map(|n| n.key()).collect();
                return Err(ReconcileError::Upstream(format!(
                    "cannot resolve parents of {}",
                    keys.join(", ")
                )));
            }
            pending = waiting;
        }

        tracing::debug!(gateway_id, created = created.len(), "provisioned path resources");
        Ok(created)
    }
}

#[async_trait]
impl GatewayAdmin for InMemoryGatewayAdmin {
    async fn list_gateways(&self) -> Result<Vec<Gateway>, ReconcileError> {
        Ok(self.state.read().await.gateways.clone())
    }

    async fn create_gateway(&self, name: &str) -> Result<Gateway, ReconcileError> {
        let gateway = Gateway::new(generate_id(), name);
        let mut state = self.state.write().await;
        state.gateways.push(gateway.clone());
        state
            .resources
            .insert(gateway.id.clone(), vec![LiveResource::root(generate_id())]);
        self.gateways_created.fetch_add(1, Ordering::Relaxed);
        Ok(gateway)
    }

    async fn list_resources(
        &self,
        gateway_id: &str,
        continuation_token: Option<&str>,
        page_size: u32,
    ) -> Result<ResourcePage, ReconcileError> {
        self.resource_page_requests.fetch_add(1, Ordering::Relaxed);

        let state = self.state.read().await;
        let resources = state.resources.get(gateway_id).ok_or_else(|| {
            ReconcileError::Upstream(format!("gateway {gateway_id} not found"))
        })?;

        let offset = match continuation_token {
            Some(token) => token.parse::<usize>().map_err(|_| {
                ReconcileError::Upstream(format!("invalid continuation token '{token}'"))
            })?,
            None => 0,
        };
        let limit = usize::try_from(page_size).unwrap_or(usize::MAX);
        let items: Vec<LiveResource> = resources.iter().skip(offset).take(limit).cloned().collect();

        let next = offset.saturating_add(items.len());
        let continuation_token = (next < resources.len()).then(|| next.to_string());
        Ok(ResourcePage {
            items,
            continuation_token,
        })
    }
}

/// Generates a 10-character lowercase id in the style of the real service.
fn generate_id() -> String {
    Uuid::new_v4().simple().to_string().chars().take(10).collect()
}
