//! Gateway administration API capability.
//!
//! [`GatewayAdmin`] is the seam between the reconciliation core and the
//! service that actually owns gateways. The core only lists gateways,
//! creates one when a named gateway does not exist yet, and pages through
//! a gateway's path resources. Two adapters are provided: an HTTP client
//! and an in-memory store backed by a JSON snapshot.

pub mod http;
pub mod memory;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Gateway, LiveResource};
use crate::error::ReconcileError;

pub use http::HttpGatewayAdmin;
pub use memory::{InMemoryGatewayAdmin, LiveSnapshot};

/// Largest page the administration API hands out.
pub const MAX_PAGE_SIZE: u32 = 500;

/// One page of live resources plus the continuation token, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePage {
    /// Resources on this page, in API order.
    #[serde(default, rename = "item")]
    pub items: Vec<LiveResource>,
    /// Opaque token to request the next page.
    #[serde(default, rename = "position", skip_serializing_if = "Option::is_none")]
    pub continuation_token: Option<String>,
}

/// Operations the reconciliation core needs from the gateway owner.
///
/// Every failure is reported as [`ReconcileError::Upstream`]. Implementations
/// do not retry.
#[async_trait]
pub trait GatewayAdmin: Send + Sync + fmt::Debug {
    /// Lists every gateway visible to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Upstream`] if the call fails.
    async fn list_gateways(&self) -> Result<Vec<Gateway>, ReconcileError>;

    /// Creates a gateway with the given name.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Upstream`] if the call fails.
    async fn create_gateway(&self, name: &str) -> Result<Gateway, ReconcileError>;

    /// Returns one page of path resources of `gateway_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Upstream`] if the call fails or the
    /// gateway does not exist.
    async fn list_resources(
        &self,
        gateway_id: &str,
        continuation_token: Option<&str>,
        page_size: u32,
    ) -> Result<ResourcePage, ReconcileError>;
}
