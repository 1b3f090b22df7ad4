//! Gateway resolver: locates (or creates) the shared gateway and picks the
//! attachment point new paths are grafted under.

use crate::admin::GatewayAdmin;
use crate::domain::{Gateway, GatewaySelector, LiveResource, LiveResourceSet, ROOT_PATH};
use crate::error::ReconcileError;

/// Outcome of gateway resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGateway {
    /// The target gateway.
    pub gateway: Gateway,
    /// Whether it was created by this resolution.
    pub created: bool,
}

/// Resolves a [`GatewaySelector`] against the live gateway list.
#[derive(Debug, Clone, Copy)]
pub struct GatewayResolver<'a> {
    admin: &'a dyn GatewayAdmin,
}

impl<'a> GatewayResolver<'a> {
    /// Creates a resolver over `admin`.
    #[must_use]
    pub fn new(admin: &'a dyn GatewayAdmin) -> Self {
        Self { admin }
    }

    /// Finds the unique gateway selected by `selector`.
    ///
    /// A name with no live match means the shared gateway has not been
    /// created yet; it is created here. An id with no live match is an
    /// error, since ids cannot be chosen up front.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::AmbiguousMatch`] if several gateways match.
    /// - [`ReconcileError::NotFound`] if an explicit id does not exist.
    /// - [`ReconcileError::Upstream`] if listing or creation fails.
    pub async fn resolve(
        &self,
        selector: &GatewaySelector,
    ) -> Result<ResolvedGateway, ReconcileError> {
        let gateways = self.admin.list_gateways().await?;
        let matching: Vec<&Gateway> = gateways.iter().filter(|g| selector.matches(g)).collect();

        match (selector, matching.as_slice()) {
            (_, [gateway]) => {
                tracing::debug!(gateway = %gateway, "resolved shared gateway");
                Ok(ResolvedGateway {
                    gateway: (*gateway).clone(),
                    created: false,
                })
            }
            (GatewaySelector::Name(name), []) => {
                tracing::info!(name = %name, "shared gateway does not exist yet, creating it");
                let gateway = self.admin.create_gateway(name).await?;
                tracing::info!(gateway = %gateway, "created shared gateway");
                Ok(ResolvedGateway {
                    gateway,
                    created: true,
                })
            }
            (GatewaySelector::Id(id), []) => Err(ReconcileError::NotFound(format!(
                "gateway id '{id}' does not exist"
            ))),
            (_, many) => Err(ReconcileError::AmbiguousMatch {
                subject: selector.to_string(),
                count: many.len(),
            }),
        }
    }
}

/// Picks the live resource new paths attach to: the resource with id
/// `explicit_parent_id` when given, otherwise the gateway root.
///
/// # Errors
///
/// - [`ReconcileError::NotFound`] if the explicit id is not live, or no
///   root resource exists.
/// - [`ReconcileError::AmbiguousMatch`] if several resources claim the
///   root path.
pub fn resolve_attachment(
    resources: &LiveResourceSet,
    explicit_parent_id: Option<&str>,
) -> Result<LiveResource, ReconcileError> {
    if let Some(id) = explicit_parent_id {
        return resources.by_id(id).cloned().ok_or_else(|| {
            ReconcileError::NotFound(format!("attachment resource '{id}' is not on the gateway"))
        });
    }

    let roots: Vec<&LiveResource> = resources.roots().collect();
    match roots.as_slice() {
        [root] => Ok((*root).clone()),
        [] => Err(ReconcileError::NotFound(format!(
            "gateway has no root resource '{ROOT_PATH}'"
        ))),
        many => Err(ReconcileError::AmbiguousMatch {
            subject: format!("root path '{ROOT_PATH}'"),
            count: many.len(),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::admin::{InMemoryGatewayAdmin, LiveSnapshot};

    fn admin_with(gateways: Vec<Gateway>) -> InMemoryGatewayAdmin {
        InMemoryGatewayAdmin::from_snapshot(LiveSnapshot {
            gateways,
            resources: HashMap::new(),
        })
    }

    #[tokio::test]
    async fn resolves_unique_name() {
        let admin = admin_with(vec![
            Gateway::new("gw1", "dev-shared"),
            Gateway::new("gw2", "prod-shared"),
        ]);
        let resolver = GatewayResolver::new(&admin);
        let result = resolver
            .resolve(&GatewaySelector::Name("prod-shared".to_string()))
            .await;
        let Ok(resolved) = result else {
            panic!("name should resolve");
        };
        assert_eq!(resolved.gateway.id, "gw2");
        assert!(!resolved.created);
    }

    #[tokio::test]
    async fn resolves_by_id_even_when_names_collide() {
        let admin = admin_with(vec![
            Gateway::new("gw1", "shared"),
            Gateway::new("gw2", "shared"),
        ]);
        let resolver = GatewayResolver::new(&admin);
        let Ok(resolved) = resolver.resolve(&GatewaySelector::Id("gw2".to_string())).await else {
            panic!("id should resolve");
        };
        assert_eq!(resolved.gateway, Gateway::new("gw2", "shared"));
    }

    #[tokio::test]
    async fn duplicate_names_are_ambiguous_and_create_nothing() {
        let admin = admin_with(vec![
            Gateway::new("gw1", "shared"),
            Gateway::new("gw2", "shared"),
        ]);
        let resolver = GatewayResolver::new(&admin);
        let result = resolver
            .resolve(&GatewaySelector::Name("shared".to_string()))
            .await;
        assert!(matches!(
            result,
            Err(ReconcileError::AmbiguousMatch { count: 2, .. })
        ));
        assert_eq!(admin.gateways_created(), 0);
        assert_eq!(admin.snapshot().await.gateways.len(), 2);
    }

    #[tokio::test]
    async fn missing_name_creates_gateway() {
        let admin = admin_with(Vec::new());
        let resolver = GatewayResolver::new(&admin);
        let Ok(resolved) = resolver
            .resolve(&GatewaySelector::Name("dev-shared".to_string()))
            .await
        else {
            panic!("gateway should be created");
        };
        assert!(resolved.created);
        assert_eq!(resolved.gateway.name, "dev-shared");
        assert_eq!(admin.gateways_created(), 1);
    }

    #[tokio::test]
    async fn missing_id_is_not_found() {
        let admin = admin_with(vec![Gateway::new("gw1", "shared")]);
        let resolver = GatewayResolver::new(&admin);
        let result = resolver.resolve(&GatewaySelector::Id("gw9".to_string())).await;
        assert!(matches!(result, Err(ReconcileError::NotFound(_))));
        assert_eq!(admin.gateways_created(), 0);
    }

    fn live() -> LiveResourceSet {
        let root = LiveResource::root("r0");
        let users = LiveResource::child("r1", &root, "users");
        let Ok(set) = LiveResourceSet::new(vec![root, users]) else {
            panic!("valid live set");
        };
        set
    }

    #[test]
    fn attachment_defaults_to_root() {
        let Ok(attachment) = resolve_attachment(&live(), None) else {
            panic!("root should resolve");
        };
        assert_eq!(attachment.id, "r0");
    }

    #[test]
    fn explicit_attachment_by_id() {
        let Ok(attachment) = resolve_attachment(&live(), Some("r1")) else {
            panic!("explicit id should resolve");
        };
        assert_eq!(attachment.path, "/users");
        assert!(matches!(
            resolve_attachment(&live(), Some("r7")),
            Err(ReconcileError::NotFound(_))
        ));
    }

    #[test]
    fn missing_root_is_not_found() {
        let Ok(empty) = LiveResourceSet::new(Vec::new()) else {
            panic!("empty set is valid");
        };
        assert!(matches!(
            resolve_attachment(&empty, None),
            Err(ReconcileError::NotFound(_))
        ));
    }
}
