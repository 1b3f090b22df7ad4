//! Template reconciler: retargets a desired-state template at a shared
//! gateway.
//!
//! Reconciliation runs four phases, each total over the template before the
//! next one starts, and each a pure function from one [`Template`] to the
//! next:
//!
//! 1. [`substitute_gateway`] replaces references to the declared gateway
//!    with the shared gateway id, the root-resource placeholder with the
//!    attachment id, and drops the gateway declaration.
//! 2. [`collect_redundant`] finds declared path resources that already exist
//!    live under the same resolved parent; [`drop_redundant`] removes them.
//! 3. [`repair_parents`] points every reference to a removed path resource
//!    at the live resource standing in for it.
//! 4. [`verify_references`] rejects any reference still naming a removed
//!    node.

use std::collections::HashSet;

use crate::domain::template::ROOT_RESOURCE_ATTRIBUTE;
use crate::domain::{
    Expr, Gateway, LiveResource, LiveResourceSet, NewResource, NodeKind, RedundantResource,
    Substitution, Template, TemplateNode,
};
use crate::error::ReconcileError;

/// Attribute of a path resource holding its own id.
const RESOURCE_ID_ATTRIBUTE: &str = "ResourceId";

/// Declared path resources found to exist live, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedundantSet {
    entries: Vec<RedundantResource>,
}

impl RedundantSet {
    /// Looks up the record for a template key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&RedundantResource> {
        self.entries.iter().find(|entry| entry.key == key)
    }

    /// Returns `true` if `key` was found redundant.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Template keys of every redundant node.
    #[must_use]
    pub fn keys(&self) -> HashSet<String> {
        self.entries.iter().map(|entry| entry.key.clone()).collect()
    }

    /// Iterates over the records in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &RedundantResource> {
        self.entries.iter()
    }

    /// Number of redundant nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing was redundant.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consumes the set, returning the records.
    #[must_use]
    pub fn into_vec(self) -> Vec<RedundantResource> {
        self.entries
    }
}

/// Output of a full reconciliation.
#[derive(Debug, Clone)]
pub struct Reconciled {
    /// The patched template.
    pub template: Template,
    /// Path resources removed because they already exist live.
    pub redundant: RedundantSet,
    /// Key of the removed gateway declaration, if the template had one.
    pub removed_gateway_node: Option<String>,
}

impl Reconciled {
    /// Path resources the deployment will still create.
    #[must_use]
    pub fn new_resources(&self) -> Vec<NewResource> {
        self.template
            .resources_of_kind(&NodeKind::PathResource)
            .map(|node| NewResource {
                key: node.key().to_string(),
                path_part: node.path_part().map(str::to_string),
            })
            .collect()
    }
}

/// Phase 1: gateway substitution.
///
/// Returns the rewritten template and the key of the removed gateway
/// declaration. A template without a gateway declaration is returned
/// unchanged.
///
/// # Errors
///
/// Returns [`ReconcileError::InvalidTemplate`] if the template declares more
/// than one gateway.
pub fn substitute_gateway(
    template: &Template,
    gateway_id: &str,
    attachment_id: &str,
) -> Result<(Template, Option<String>), ReconcileError> {
    let declared: Vec<&str> = template
        .resources_of_kind(&NodeKind::GatewayRoot)
        .map(TemplateNode::key)
        .collect();
    let root_key = match declared.as_slice() {
        [] => return Ok((template.clone(), None)),
        [key] => (*key).to_string(),
        many => {
            return Err(ReconcileError::InvalidTemplate(format!(
                "template declares {} gateways ({}), expected at most one",
                many.len(),
                many.join(", ")
            )));
        }
    };

    let substitution = Substitution::new()
        .with_ref(root_key.as_str(), gateway_id)
        .with_attribute(root_key.as_str(), ROOT_RESOURCE_ATTRIBUTE, attachment_id);
    let removed = HashSet::from([root_key.clone()]);

    tracing::debug!(node = %root_key, gateway_id, attachment_id, "substituted gateway references");
    Ok((
        template.substitute(&substitution).without_resources(&removed),
        Some(root_key),
    ))
}

/// Phase 2a: finds path resources that already exist live.
///
/// A node is redundant when a live resource has the same path part under
/// the node's resolved parent. Parents referencing another node resolve
/// through that node's live counterpart once it is known, so the scan is
/// repeated until no new match appears and whole collapsible chains are
/// found regardless of declaration order.
#[must_use]
pub fn collect_redundant(template: &Template, live: &LiveResourceSet) -> RedundantSet {
    let candidates: Vec<&TemplateNode> = template
        .resources_of_kind(&NodeKind::PathResource)
        .filter(|node| {
            if node.path_part().is_none() {
                tracing::warn!(node = %node.key(), "path resource has no literal PathPart, treating as new");
                return false;
            }
            true
        })
        .collect();

    let mut redundant = RedundantSet::default();
    loop {
        let mut grew = false;
        for node in &candidates {
            if redundant.contains(node.key()) {
                continue;
            }
            let (Some(parent_id), Some(path_part)) =
                (resolved_parent_id(node.parent(), &redundant), node.path_part())
            else {
                continue;
            };
            let Some(existing) = live.child(parent_id, path_part) else {
                continue;
            };

            tracing::debug!(
                node = %node.key(),
                live_id = %existing.id,
                path = %existing.path,
                "path resource already live"
            );
            let record = RedundantResource {
                key: node.key().to_string(),
                live_id: existing.id.clone(),
                live_parent_id: parent_id.to_string(),
            };
            redundant.entries.push(record);
            grew = true;
        }
        if !grew {
            return redundant;
        }
    }
}

fn resolved_parent_id<'a>(
    parent: Option<&'a Expr>,
    redundant: &'a RedundantSet,
) -> Option<&'a str> {
    match parent? {
        Expr::Ref(key) => redundant.get(key).map(|entry| entry.live_id.as_str()),
        other => other.as_str(),
    }
}

/// Phase 2b: removes every redundant node from the template.
#[must_use]
pub fn drop_redundant(template: &Template, redundant: &RedundantSet) -> Template {
    template.without_resources(&redundant.keys())
}

/// Phase 3: repoints references to removed path resources at their live
/// counterparts. Both `Ref` and `Fn::GetAtt` of `ResourceId` resolve to the
/// live id.
///
/// Uses the completed redundant set in a single pass, so children of a
/// collapsed chain always land on the deepest live ancestor.
#[must_use]
pub fn repair_parents(template: &Template, redundant: &RedundantSet) -> Template {
    if redundant.is_empty() {
        return template.clone();
    }
    let substitution = redundant.iter().fold(Substitution::new(), |sub, entry| {
        sub.with_ref(entry.key.as_str(), entry.live_id.as_str())
            .with_attribute(entry.key.as_str(), RESOURCE_ID_ATTRIBUTE, entry.live_id.as_str())
    });
    template.substitute(&substitution)
}

/// Phase 4: consistency check over the reconciled template.
///
/// # Errors
///
/// Returns [`ReconcileError::DanglingReference`] if any reference or
/// `DependsOn` entry names a node in `removed`, or a path resource's parent
/// is neither another path resource of the template nor a live resource.
/// Returns [`ReconcileError::InvalidTemplate`] if a path resource has no
/// `ParentId`.
pub fn verify_references(
    template: &Template,
    removed: &HashSet<String>,
    live: &LiveResourceSet,
) -> Result<(), ReconcileError> {
    let nodes = template.resources().chain(template.outputs());
    for node in nodes {
        if let Some(target) = node
            .referenced_nodes()
            .into_iter()
            .find(|target| removed.contains(*target))
        {
            return Err(dangling(node.key(), target));
        }
    }
    if let Some((section, target)) = template
        .section_references()
        .into_iter()
        .find(|(_, target)| removed.contains(*target))
    {
        return Err(dangling(section, target));
    }

    for node in template.resources_of_kind(&NodeKind::PathResource) {
        let parent = node.parent().ok_or_else(|| {
            ReconcileError::InvalidTemplate(format!(
                "path resource '{}' has no ParentId",
                node.key()
            ))
        })?;
        let attached = match parent {
            Expr::Ref(key) => template
                .resource(key)
                .is_some_and(|target| *target.kind() == NodeKind::PathResource),
            other => other.as_str().is_some_and(|id| live.by_id(id).is_some()),
        };
        if !attached {
            let target = match parent {
                Expr::Ref(key) => key.clone(),
                other => other.to_value().to_string(),
            };
            return Err(dangling(node.key(), &target));
        }
    }
    Ok(())
}

fn dangling(referrer: &str, target: &str) -> ReconcileError {
    ReconcileError::DanglingReference {
        referrer: referrer.to_string(),
        target: target.to_string(),
    }
}

/// Runs all four phases once its inputs are supplied.
///
/// Inputs are attached with the `with_*` methods in any order; calling
/// [`Reconciler::reconcile`] before all of them are present is a sequencing
/// bug in the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler<'a> {
    gateway: Option<&'a Gateway>,
    attachment: Option<&'a LiveResource>,
    live: Option<&'a LiveResourceSet>,
}

impl<'a> Reconciler<'a> {
    /// Creates a reconciler with no inputs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the resolved shared gateway.
    #[must_use]
    pub const fn with_gateway(mut self, gateway: &'a Gateway) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Sets the resolved attachment point.
    #[must_use]
    pub const fn with_attachment(mut self, attachment: &'a LiveResource) -> Self {
        self.attachment = Some(attachment);
        self
    }

    /// Sets the fetched live resource set.
    #[must_use]
    pub const fn with_live_resources(mut self, live: &'a LiveResourceSet) -> Self {
        self.live = Some(live);
        self
    }

    /// Reconciles `template` against the live state.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Precondition`] if an input is missing,
    /// and otherwise any error of the individual phases.
    pub fn reconcile(&self, template: &Template) -> Result<Reconciled, ReconcileError> {
        let gateway = self.gateway.ok_or_else(|| {
            ReconcileError::Precondition("gateway must be resolved before reconciling".to_string())
        })?;
        let live = self.live.ok_or_else(|| {
            ReconcileError::Precondition(
                "live resources must be fetched before reconciling".to_string(),
            )
        })?;
        let attachment = self.attachment.ok_or_else(|| {
            ReconcileError::Precondition(
                "attachment point must be resolved before reconciling".to_string(),
            )
        })?;

        let (substituted, removed_gateway_node) =
            substitute_gateway(template, &gateway.id, &attachment.id)?;
        let redundant = collect_redundant(&substituted, live);
        let repaired = repair_parents(&drop_redundant(&substituted, &redundant), &redundant);

        let mut removed = redundant.keys();
        removed.extend(removed_gateway_node.iter().cloned());
        verify_references(&repaired, &removed, live)?;

        tracing::info!(
            gateway = %gateway,
            attachment_id = %attachment.id,
            redundant = redundant.len(),
            "template reconciled"
        );
        Ok(Reconciled {
            template: repaired,
            redundant,
            removed_gateway_node,
        })
    }
}
