//! Desired-state template produced by the build step.
//!
//! A [`Template`] is an immutable, typed view over a CloudFormation-style
//! JSON document. Every value is held as an [`Expr`] so references can be
//! rewritten anywhere in the document, and every `Resources` / `Outputs`
//! entry is tagged with a [`NodeKind`]. Transformations return a new
//! template; key order is preserved end to end.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::expr::{Expr, Substitution};
use crate::error::ReconcileError;

/// Resource type declaring a brand-new gateway.
pub const GATEWAY_ROOT_TYPE: &str = "AWS::ApiGateway::RestApi";
/// Resource type declaring one path segment.
pub const PATH_RESOURCE_TYPE: &str = "AWS::ApiGateway::Resource";
/// Resource type declaring an HTTP method on a path.
pub const METHOD_TYPE: &str = "AWS::ApiGateway::Method";
/// Resource type declaring a gateway deployment.
pub const DEPLOYMENT_TYPE: &str = "AWS::ApiGateway::Deployment";
/// Resource type granting the gateway permission to invoke a function.
pub const PERMISSION_TYPE: &str = "AWS::Lambda::Permission";
/// Gateway attribute holding the id of its root (`/`) resource.
pub const ROOT_RESOURCE_ATTRIBUTE: &str = "RootResourceId";

const RESOURCES: &str = "Resources";
const OUTPUTS: &str = "Outputs";
const TYPE: &str = "Type";
const PROPERTIES: &str = "Properties";
const DEPENDS_ON: &str = "DependsOn";
const PATH_PART: &str = "PathPart";
const PARENT_ID: &str = "ParentId";

/// Kind of a template node, derived from its resource type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Declaration of a new gateway.
    GatewayRoot,
    /// One path segment with a parent reference.
    PathResource,
    /// A method attached to a path resource.
    Method,
    /// A deployment of the gateway.
    Deployment,
    /// An invoke permission whose source ARN references the gateway.
    Permission,
    /// A stack output, typically the published endpoint URL.
    Output,
    /// Any other resource type; carried through untouched apart from
    /// reference substitution.
    Other(String),
}

impl NodeKind {
    /// Maps a resource `Type` string to its kind.
    #[must_use]
    pub fn from_resource_type(resource_type: &str) -> Self {
        match resource_type {
            GATEWAY_ROOT_TYPE => Self::GatewayRoot,
            PATH_RESOURCE_TYPE => Self::PathResource,
            METHOD_TYPE => Self::Method,
            DEPLOYMENT_TYPE => Self::Deployment,
            PERMISSION_TYPE => Self::Permission,
            other => Self::Other(other.to_string()),
        }
    }
}

/// One keyed entry of the `Resources` or `Outputs` section.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateNode {
    key: String,
    kind: NodeKind,
    body: Expr,
}

impl TemplateNode {
    fn resource(key: &str, value: &Value) -> Result<Self, ReconcileError> {
        let resource_type = value
            .get(TYPE)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ReconcileError::InvalidTemplate(format!("resource '{key}' has no string Type"))
            })?;
        Ok(Self {
            key: key.to_string(),
            kind: NodeKind::from_resource_type(resource_type),
            body: Expr::from_value(value),
        })
    }

    fn output(key: &str, value: &Value) -> Self {
        Self {
            key: key.to_string(),
            kind: NodeKind::Output,
            body: Expr::from_value(value),
        }
    }

    /// Logical name of the node.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Kind of the node.
    #[must_use]
    pub const fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Full node body.
    #[must_use]
    pub const fn body(&self) -> &Expr {
        &self.body
    }

    /// Returns a property from the node's `Properties` map.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Expr> {
        self.body.get(PROPERTIES).and_then(|props| props.get(name))
    }

    /// Literal `PathPart` of a path resource.
    #[must_use]
    pub fn path_part(&self) -> Option<&str> {
        self.property(PATH_PART).and_then(Expr::as_str)
    }

    /// `ParentId` expression of a path resource.
    #[must_use]
    pub fn parent(&self) -> Option<&Expr> {
        self.property(PARENT_ID)
    }

    /// Node names listed under `DependsOn`.
    #[must_use]
    pub fn depends_on(&self) -> Vec<&str> {
        match self.body.get(DEPENDS_ON) {
            Some(Expr::Sequence(items)) => items.iter().filter_map(Expr::as_str).collect(),
            Some(single) => single.as_str().into_iter().collect(),
            None => Vec::new(),
        }
    }

    /// Every node name this node points at, through references or
    /// `DependsOn`.
    #[must_use]
    pub fn referenced_nodes(&self) -> Vec<&str> {
        let mut names = self.body.referenced_nodes();
        names.extend(self.depends_on());
        names
    }

    fn substituted(&self, substitution: &Substitution) -> Self {
        Self {
            key: self.key.clone(),
            kind: self.kind.clone(),
            body: substitution.apply(&self.body),
        }
    }

    fn without_dependencies(&self, removed: &HashSet<String>) -> Self {
        let pruned = match self.body.get(DEPENDS_ON) {
            Some(Expr::Sequence(items)) => {
                let kept: Vec<Expr> = items
                    .iter()
                    .filter(|item| item.as_str().is_none_or(|name| !removed.contains(name)))
                    .cloned()
                    .collect();
                if kept.len() == items.len() {
                    return self.clone();
                }
                (!kept.is_empty()).then_some(Expr::Sequence(kept))
            }
            Some(single) => match single.as_str() {
                Some(name) if removed.contains(name) => None,
                _ => return self.clone(),
            },
            None => return self.clone(),
        };
        Self {
            key: self.key.clone(),
            kind: self.kind.clone(),
            body: self.body.with_entry(DEPENDS_ON, pruned),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Section {
    Resources(Vec<TemplateNode>),
    Outputs(Vec<TemplateNode>),
    Other(Expr),
}

/// Immutable desired-state document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Template {
    sections: Vec<(String, Section)>,
}

impl Template {
    /// Parses a template from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InvalidTemplate`] if the text is not JSON
    /// or does not have the expected shape.
    pub fn from_json_str(text: &str) -> Result<Self, ReconcileError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| ReconcileError::InvalidTemplate(e.to_string()))?;
        Self::from_value(&value)
    }

    /// Builds a template from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InvalidTemplate`] if the document is not an
    /// object, has no `Resources` object, or a resource lacks a `Type`.
    pub fn from_value(value: &Value) -> Result<Self, ReconcileError> {
        let Value::Object(document) = value else {
            return Err(ReconcileError::InvalidTemplate(
                "template must be a JSON object".to_string(),
            ));
        };
        if !document.contains_key(RESOURCES) {
            return Err(ReconcileError::InvalidTemplate(
                "template has no Resources section".to_string(),
            ));
        }

        let mut sections = Vec::with_capacity(document.len());
        for (name, value) in document {
            let section = match name.as_str() {
                RESOURCES => Section::Resources(
                    section_entries(name, value)?
                        .iter()
                        .map(|(key, value)| TemplateNode::resource(key, value))
                        .collect::<Result<_, _>>()?,
                ),
                OUTPUTS => Section::Outputs(
                    section_entries(name, value)?
                        .iter()
                        .map(|(key, value)| TemplateNode::output(key, value))
                        .collect(),
                ),
                _ => Section::Other(Expr::from_value(value)),
            };
            sections.push((name.clone(), section));
        }
        Ok(Self { sections })
    }

    /// Converts the template back into a JSON document.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut document = Map::with_capacity(self.sections.len());
        for (name, section) in &self.sections {
            let value = match section {
                Section::Resources(nodes) | Section::Outputs(nodes) => Value::Object(
                    nodes
                        .iter()
                        .map(|node| (node.key.clone(), node.body.to_value()))
                        .collect(),
                ),
                Section::Other(expr) => expr.to_value(),
            };
            document.insert(name.clone(), value);
        }
        Value::Object(document)
    }

    /// Serializes the template as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InvalidTemplate`] if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, ReconcileError> {
        serde_json::to_string_pretty(&self.to_value())
            .map_err(|e| ReconcileError::InvalidTemplate(e.to_string()))
    }

    /// Iterates over the `Resources` entries in document order.
    pub fn resources(&self) -> impl Iterator<Item = &TemplateNode> {
        self.sections
            .iter()
            .filter_map(|(_, section)| match section {
                Section::Resources(nodes) => Some(nodes),
                _ => None,
            })
            .flatten()
    }

    /// Iterates over the `Outputs` entries in document order.
    pub fn outputs(&self) -> impl Iterator<Item = &TemplateNode> {
        self.sections
            .iter()
            .filter_map(|(_, section)| match section {
                Section::Outputs(nodes) => Some(nodes),
                _ => None,
            })
            .flatten()
    }

    /// Iterates over the resources of one kind.
    pub fn resources_of_kind<'a>(
        &'a self,
        kind: &'a NodeKind,
    ) -> impl Iterator<Item = &'a TemplateNode> {
        self.resources().filter(move |node| node.kind() == kind)
    }

    /// Looks up a resource by logical name.
    #[must_use]
    pub fn resource(&self, key: &str) -> Option<&TemplateNode> {
        self.resources().find(|node| node.key() == key)
    }

    /// Every reference held outside `Resources` and `Outputs`, paired with
    /// the section name.
    #[must_use]
    pub fn section_references(&self) -> Vec<(&str, &str)> {
        self.sections
            .iter()
            .filter_map(|(name, section)| match section {
                Section::Other(expr) => Some((name.as_str(), expr)),
                _ => None,
            })
            .flat_map(|(name, expr)| {
                expr.referenced_nodes()
                    .into_iter()
                    .map(move |target| (name, target))
            })
            .collect()
    }

    /// Returns a new template with `substitution` applied to every value in
    /// every section.
    #[must_use]
    pub fn substitute(&self, substitution: &Substitution) -> Self {
        let sections = self
            .sections
            .iter()
            .map(|(name, section)| {
                let section = match section {
                    Section::Resources(nodes) => Section::Resources(
                        nodes.iter().map(|n| n.substituted(substitution)).collect(),
                    ),
                    Section::Outputs(nodes) => Section::Outputs(
                        nodes.iter().map(|n| n.substituted(substitution)).collect(),
                    ),
                    Section::Other(expr) => Section::Other(substitution.apply(expr)),
                };
                (name.clone(), section)
            })
            .collect();
        Self { sections }
    }

    /// Returns a new template without the named resources. `DependsOn`
    /// entries naming them are pruned from the remaining resources.
    #[must_use]
    pub fn without_resources(&self, removed: &HashSet<String>) -> Self {
        if removed.is_empty() {
            return self.clone();
        }
        let sections = self
            .sections
            .iter()
            .map(|(name, section)| {
                let section = match section {
                    Section::Resources(nodes) => Section::Resources(
                        nodes
                            .iter()
                            .filter(|node| !removed.contains(node.key()))
                            .map(|node| node.without_dependencies(removed))
                            .collect(),
                    ),
                    other => other.clone(),
                };
                (name.clone(), section)
            })
            .collect();
        Self { sections }
    }
}

fn section_entries<'a>(
    name: &str,
    value: &'a Value,
) -> Result<&'a Map<String, Value>, ReconcileError> {
    value
        .as_object()
        .ok_or_else(|| ReconcileError::InvalidTemplate(format!("{name} must be a JSON object")))
}

impl TryFrom<Value> for Template {
    type Error = ReconcileError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(&value)
    }
}

impl From<Template> for Value {
    fn from(template: Template) -> Self {
        template.to_value()
    }
}
