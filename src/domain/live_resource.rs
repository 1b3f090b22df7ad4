//! Path resources already provisioned on the shared gateway.
//!
//! [`LiveResourceSet`] is a read-only snapshot fetched once per run. It is
//! indexed by id and by `(parent id, path part)` so the reconciler can ask
//! "does this segment already exist under that parent?" in constant time.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use serde::{Deserialize, Serialize};

use crate::error::ReconcileError;

/// Path of the root resource every gateway owns.
pub const ROOT_PATH: &str = "/";

/// One path segment provisioned on the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveResource {
    /// Resource identifier assigned by the administration API.
    pub id: String,
    /// Full path, e.g. `/users/{id}`.
    pub path: String,
    /// Last path segment. Absent for the root resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_part: Option<String>,
    /// Parent resource id. Absent for the root resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl LiveResource {
    /// Creates the root resource of a gateway.
    #[must_use]
    pub fn root(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: ROOT_PATH.to_string(),
            path_part: None,
            parent_id: None,
        }
    }

    /// Creates a child resource of `parent`.
    #[must_use]
    pub fn child(id: impl Into<String>, parent: &Self, path_part: impl Into<String>) -> Self {
        let path_part = path_part.into();
        let path = if parent.path == ROOT_PATH {
            format!("/{path_part}")
        } else {
            format!("{}/{path_part}", parent.path)
        };
        Self {
            id: id.into(),
            path,
            path_part: Some(path_part),
            parent_id: Some(parent.id.clone()),
        }
    }

    /// Returns `true` if this is the gateway root (`/`).
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.path == ROOT_PATH
    }
}

/// Indexed, immutable view over every live resource of one gateway.
#[derive(Debug, Clone, Default)]
pub struct LiveResourceSet {
    resources: Vec<LiveResource>,
    by_id: HashMap<String, usize>,
    by_sibling: HashMap<(String, String), usize>,
}

impl LiveResourceSet {
    /// Builds the set and its indexes, keeping fetch order.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::DuplicateLiveResource`] if two resources
    /// share the same parent and path part. The administration API is
    /// expected to forbid that, so such a snapshot is not trusted.
    pub fn new(resources: Vec<LiveResource>) -> Result<Self, ReconcileError> {
        let mut by_id = HashMap::with_capacity(resources.len());
        let mut by_sibling = HashMap::with_capacity(resources.len());

        for (idx, resource) in resources.iter().enumerate() {
            by_id.entry(resource.id.clone()).or_insert(idx);

            let (Some(parent_id), Some(path_part)) = (&resource.parent_id, &resource.path_part)
            else {
                continue;
            };
            match by_sibling.entry((parent_id.clone(), path_part.clone())) {
                Entry::Vacant(slot) => {
                    slot.insert(idx);
                }
                Entry::Occupied(_) => {
                    return Err(ReconcileError::DuplicateLiveResource {
                        parent_id: parent_id.clone(),
                        path_part: path_part.clone(),
                    });
                }
            }
        }

        Ok(Self {
            resources,
            by_id,
            by_sibling,
        })
    }

    /// Looks up a resource by id.
    #[must_use]
    pub fn by_id(&self, id: &str) -> Option<&LiveResource> {
        self.by_id.get(id).and_then(|&idx| self.resources.get(idx))
    }

    /// Looks up the child of `parent_id` whose path part is `path_part`.
    #[must_use]
    pub fn child(&self, parent_id: &str, path_part: &str) -> Option<&LiveResource> {
        self.by_sibling
            .get(&(parent_id.to_string(), path_part.to_string()))
            .and_then(|&idx| self.resources.get(idx))
    }

    /// Iterates over every resource whose path is the root path.
    pub fn roots(&self) -> impl Iterator<Item = &LiveResource> {
        self.resources.iter().filter(|r| r.is_root())
    }

    /// Iterates over all resources in fetch order.
    pub fn iter(&self) -> impl Iterator<Item = &LiveResource> {
        self.resources.iter()
    }

    /// Returns the number of live resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns `true` if the set holds no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn sample() -> Vec<LiveResource> {
        let root = LiveResource::root("r0");
        let users = LiveResource::child("r1", &root, "users");
        let user = LiveResource::child("r2", &users, "{id}");
        vec![root, users, user]
    }

    #[test]
    fn child_paths_are_joined_from_parent() {
        let resources = sample();
        let paths: Vec<&str> = resources.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, ["/", "/users", "/users/{id}"]);
    }

    #[test]
    fn lookups_by_id_and_sibling() {
        let Ok(set) = LiveResourceSet::new(sample()) else {
            panic!("valid live set");
        };
        assert_eq!(set.len(), 3);
        assert_eq!(set.by_id("r2").map(|r| r.path.as_str()), Some("/users/{id}"));
        assert_eq!(set.child("r0", "users").map(|r| r.id.as_str()), Some("r1"));
        assert!(set.child("r1", "users").is_none());
        assert_eq!(set.roots().count(), 1);
    }

    #[test]
    fn duplicate_siblings_are_rejected() {
        let mut resources = sample();
        let Some(root) = resources.first().cloned() else {
            panic!("sample has a root");
        };
        resources.push(LiveResource::child("r9", &root, "users"));

        let result = LiveResourceSet::new(resources);
        let Err(ReconcileError::DuplicateLiveResource { parent_id, path_part }) = result else {
            panic!("expected duplicate sibling error");
        };
        assert_eq!(parent_id, "r0");
        assert_eq!(path_part, "users");
    }

    #[test]
    fn deserializes_camel_case_wire_shape() {
        let json = r#"[{"id":"r0","path":"/"},
                       {"id":"r1","parentId":"r0","pathPart":"users","path":"/users"}]"#;
        let Ok(resources) = serde_json::from_str::<Vec<LiveResource>>(json) else {
            panic!("live resources should deserialize");
        };
        assert_eq!(resources, sample().into_iter().take(2).collect::<Vec<_>>());
    }
}
