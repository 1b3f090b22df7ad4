//! Reconciliation session: sequences resolver, fetcher and reconciler.

use std::sync::Arc;

use chrono::Utc;
use tracing::Instrument;
use uuid::Uuid;

use super::fetcher::ResourceFetcher;
use super::reconciler::Reconciler;
use super::resolver::{GatewayResolver, resolve_attachment};
use crate::admin::GatewayAdmin;
use crate::config::ReconcileConfig;
use crate::domain::{Gateway, LiveResource, LiveResourceSet, ReconcileReport, Template};
use crate::error::ReconcileError;

/// Patched template plus the report describing how it was produced.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// Template retargeted at the shared gateway.
    pub template: Template,
    /// Run summary for the driver.
    pub report: ReconcileReport,
}

/// One reconciliation run against one shared gateway.
///
/// Steps must run in order: [`resolve_gateway`](Self::resolve_gateway),
/// [`fetch_resources`](Self::fetch_resources),
/// [`resolve_attachment`](Self::resolve_attachment), then
/// [`reconcile`](Self::reconcile). [`run`](Self::run) does all of them.
/// The resolved gateway is cached, so a gateway is created at most once per
/// session.
#[derive(Debug)]
pub struct ReconcileSession {
    admin: Arc<dyn GatewayAdmin>,
    config: ReconcileConfig,
    run_id: Uuid,
    gateway: Option<Gateway>,
    gateway_created: bool,
    live: Option<LiveResourceSet>,
    attachment: Option<LiveResource>,
}

impl ReconcileSession {
    /// Creates a session with a fresh run id.
    #[must_use]
    pub fn new(admin: Arc<dyn GatewayAdmin>, config: ReconcileConfig) -> Self {
        Self {
            admin,
            config,
            run_id: Uuid::new_v4(),
            gateway: None,
            gateway_created: false,
            live: None,
            attachment: None,
        }
    }

    /// Correlation id of this run.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Resolves the shared gateway, creating it if the configured name has
    /// no live match. Later calls return the cached result.
    ///
    /// # Errors
    ///
    /// See [`GatewayResolver::resolve`].
    pub async fn resolve_gateway(&mut self) -> Result<Gateway, ReconcileError> {
        if let Some(gateway) = &self.gateway {
            return Ok(gateway.clone());
        }
        let resolved = GatewayResolver::new(self.admin.as_ref())
            .resolve(&self.config.gateway)
            .await?;
        self.gateway_created = resolved.created;
        self.gateway = Some(resolved.gateway.clone());
        Ok(resolved.gateway)
    }

    /// Fetches every live path resource of the resolved gateway.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Precondition`] if the gateway is not
    /// resolved yet, and otherwise any fetch or indexing error.
    pub async fn fetch_resources(&mut self) -> Result<&LiveResourceSet, ReconcileError> {
        let gateway = self.gateway.as_ref().ok_or_else(|| {
            ReconcileError::Precondition(
                "gateway must be resolved before fetching resources".to_string(),
            )
        })?;
        let resources = ResourceFetcher::new(self.admin.as_ref(), self.config.page_size)
            .fetch_all(&gateway.id)
            .await?;
        Ok(self.live.insert(LiveResourceSet::new(resources)?))
    }

    /// Picks the attachment point from the fetched live resources.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Precondition`] if resources were not
    /// fetched yet, and otherwise see [`resolve_attachment`].
    pub fn resolve_attachment(&mut self) -> Result<&LiveResource, ReconcileError> {
        let live = self.live.as_ref().ok_or_else(|| {
            ReconcileError::Precondition(
                "live resources must be fetched before resolving the attachment point"
                    .to_string(),
            )
        })?;
        let attachment = resolve_attachment(live, self.config.attachment_resource_id.as_deref())?;
        tracing::info!(
            attachment_id = %attachment.id,
            path = %attachment.path,
            "resolved attachment point"
        );
        Ok(self.attachment.insert(attachment))
    }

    /// Reconciles `template` against the state gathered by the earlier
    /// steps.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Precondition`] if an earlier step has not
    /// run, and otherwise any reconciliation error.
    pub fn reconcile(&self, template: &Template) -> Result<Reconciliation, ReconcileError> {
        let gateway = self.gateway.as_ref().ok_or_else(|| {
            ReconcileError::Precondition("gateway must be resolved before reconciling".to_string())
        })?;
        let live = self.live.as_ref().ok_or_else(|| {
            ReconcileError::Precondition(
                "live resources must be fetched before reconciling".to_string(),
            )
        })?;
        let attachment = self.attachment.as_ref().ok_or_else(|| {
            ReconcileError::Precondition(
                "attachment point must be resolved before reconciling".to_string(),
            )
        })?;
        let reconciled = Reconciler::new()
            .with_gateway(gateway)
            .with_live_resources(live)
            .with_attachment(attachment)
            .reconcile(template)?;

        let new_resources = reconciled.new_resources();
        let report = ReconcileReport {
            run_id: self.run_id,
            reconciled_at: Utc::now(),
            gateway: gateway.clone(),
            gateway_created: self.gateway_created,
            attachment_resource_id: attachment.id.clone(),
            removed_gateway_node: reconciled.removed_gateway_node,
            redundant: reconciled.redundant.into_vec(),
            new_resources,
        };
        Ok(Reconciliation {
            template: reconciled.template,
            report,
        })
    }

    /// Runs every step in order and reconciles `template`.
    ///
    /// # Errors
    ///
    /// Returns the first error of any step; nothing partial is returned.
    pub async fn run(&mut self, template: &Template) -> Result<Reconciliation, ReconcileError> {
        let span = tracing::info_span!("reconcile", run_id = %self.run_id);
        async {
            let gateway = self.resolve_gateway().await?;
            tracing::info!(gateway = %gateway, "targeting shared gateway");
            self.fetch_resources().await?;
            self.resolve_attachment()?;
            self.reconcile(template)
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;
    use crate::admin::{InMemoryGatewayAdmin, LiveSnapshot};
    use crate::config::{AdminConfig, LogFormat};
    use crate::domain::GatewaySelector;

    fn config(selector: GatewaySelector) -> ReconcileConfig {
        ReconcileConfig {
            gateway: selector,
            attachment_resource_id: None,
            page_size: 2,
            admin: AdminConfig {
                endpoint: "http://localhost:4566".to_string(),
                token: None,
                timeout_secs: 5,
            },
            log_format: LogFormat::Text,
        }
    }

    fn admin() -> Arc<InMemoryGatewayAdmin> {
        let root = LiveResource::root("r0");
        let users = LiveResource::child("r1", &root, "users");
        let orders = LiveResource::child("r2", &root, "orders");
        Arc::new(InMemoryGatewayAdmin::from_snapshot(LiveSnapshot {
            gateways: vec![Gateway::new("gw1", "dev-shared")],
            resources: HashMap::from([("gw1".to_string(), vec![root, users, orders])]),
        }))
    }

    fn template() -> Template {
        let Ok(template) = Template::from_value(&json!({
            "Resources": {
                "ApiGatewayRestApi": {"Type": "AWS::ApiGateway::RestApi"},
                "ApiGatewayResourceUsers": {
                    "Type": "AWS::ApiGateway::Resource",
                    "Properties": {
                        "ParentId": {"Fn::GetAtt": ["ApiGatewayRestApi", "RootResourceId"]},
                        "PathPart": "users",
                        "RestApiId": {"Ref": "ApiGatewayRestApi"}
                    }
                }
            }
        })) else {
            panic!("valid template");
        };
        template
    }

    #[tokio::test]
    async fn run_reconciles_against_paged_live_state() {
        let admin = admin();
        let shared: Arc<dyn GatewayAdmin> = Arc::clone(&admin) as Arc<dyn GatewayAdmin>;
        let mut session =
            ReconcileSession::new(shared, config(GatewaySelector::Name("dev-shared".to_string())));

        let Ok(result) = session.run(&template()).await else {
            panic!("run should succeed");
        };
        assert_eq!(result.template.resources().count(), 0);
        assert_eq!(result.report.gateway, Gateway::new("gw1", "dev-shared"));
        assert_eq!(result.report.attachment_resource_id, "r0");
        assert_eq!(result.report.redundant.len(), 1);
        assert!(!result.report.gateway_created);
        assert_eq!(result.report.run_id, session.run_id());
        // Three resources in pages of two.
        assert_eq!(admin.resource_page_requests(), 2);
    }

    #[tokio::test]
    async fn steps_out_of_order_are_precondition_errors() {
        let mut session = ReconcileSession::new(
            admin(),
            config(GatewaySelector::Id("gw1".to_string())),
        );
        assert!(matches!(
            session.fetch_resources().await,
            Err(ReconcileError::Precondition(_))
        ));
        assert!(matches!(
            session.resolve_attachment(),
            Err(ReconcileError::Precondition(_))
        ));
        assert!(matches!(
            session.reconcile(&template()),
            Err(ReconcileError::Precondition(_))
        ));

        assert!(session.resolve_gateway().await.is_ok());
        assert!(matches!(
            session.reconcile(&template()),
            Err(ReconcileError::Precondition(_))
        ));
    }

    #[tokio::test]
    async fn reconcile_without_attachment_names_the_missing_step() {
        let mut session =
            ReconcileSession::new(admin(), config(GatewaySelector::Id("gw1".to_string())));
        assert!(session.resolve_gateway().await.is_ok());
        assert!(session.fetch_resources().await.is_ok());

        match session.reconcile(&template()) {
            Err(ReconcileError::Precondition(message)) => {
                assert!(message.contains("attachment point"));
            }
            other => panic!("expected precondition error, got {other:?}"),
        }

        let Ok(attachment) = session.resolve_attachment() else {
            panic!("root attachment");
        };
        assert_eq!(attachment.id, "r0");
        let Ok(result) = session.reconcile(&template()) else {
            panic!("reconcile after every step");
        };
        assert_eq!(result.report.gateway, Gateway::new("gw1", "dev-shared"));
        assert_eq!(result.report.attachment_resource_id, "r0");
    }

    #[tokio::test]
    async fn gateway_is_created_once_per_session() {
        let admin = Arc::new(InMemoryGatewayAdmin::new());
        let shared: Arc<dyn GatewayAdmin> = Arc::clone(&admin) as Arc<dyn GatewayAdmin>;
        let mut session =
            ReconcileSession::new(shared, config(GatewaySelector::Name("fresh".to_string())));

        let Ok(first) = session.resolve_gateway().await else {
            panic!("gateway created");
        };
        let Ok(second) = session.resolve_gateway().await else {
            panic!("cached gateway");
        };
        assert_eq!(first, second);
        assert_eq!(admin.gateways_created(), 1);

        let Ok(result) = session.run(&template()).await else {
            panic!("run should succeed");
        };
        assert!(result.report.gateway_created);
        assert_eq!(result.report.new_resources.len(), 1);
        assert_eq!(admin.gateways_created(), 1);
    }

    #[tokio::test]
    async fn explicit_attachment_must_exist() {
        let mut cfg = config(GatewaySelector::Id("gw1".to_string()));
        cfg.attachment_resource_id = Some("missing".to_string());
        let mut session = ReconcileSession::new(admin(), cfg);

        let result = session.run(&template()).await;
        assert!(matches!(result, Err(ReconcileError::NotFound(_))));
    }
}
