//! Shared gateway identity and the configured way of selecting one.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ReconcileError;

/// A live API gateway as reported by the administration API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Gateway {
    /// Gateway identifier assigned by the administration API.
    pub id: String,
    /// Human-readable gateway name. Not guaranteed unique upstream.
    pub name: String,
}

impl Gateway {
    /// Creates a gateway value from its id and name.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// How the target shared gateway is identified.
///
/// An explicit id always wins over a name when both are configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewaySelector {
    /// Select the gateway whose id equals the value.
    Id(String),
    /// Select the unique gateway with this name, creating it when absent.
    Name(String),
}

impl GatewaySelector {
    /// Builds a selector from the optional id and name settings.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Configuration`] if neither is set.
    pub fn from_parts(id: Option<String>, name: Option<String>) -> Result<Self, ReconcileError> {
        match (id, name) {
            (Some(id), _) => Ok(Self::Id(id)),
            (None, Some(name)) => Ok(Self::Name(name)),
            (None, None) => Err(ReconcileError::Configuration(
                "either a gateway id or a gateway name must be configured".to_string(),
            )),
        }
    }

    /// Returns `true` if `gateway` is selected by this selector.
    #[must_use]
    pub fn matches(&self, gateway: &Gateway) -> bool {
        match self {
            Self::Id(id) => gateway.id == *id,
            Self::Name(name) => gateway.name == *name,
        }
    }
}

impl fmt::Display for GatewaySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "gateway id '{id}'"),
            Self::Name(name) => write!(f, "gateway name '{name}'"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn id_wins_over_name() {
        let selector =
            GatewaySelector::from_parts(Some("abc123".to_string()), Some("shared".to_string()));
        let Ok(selector) = selector else {
            panic!("selector should build");
        };
        assert_eq!(selector, GatewaySelector::Id("abc123".to_string()));
    }

    #[test]
    fn missing_both_is_configuration_error() {
        let result = GatewaySelector::from_parts(None, None);
        assert!(matches!(result, Err(ReconcileError::Configuration(_))));
    }

    #[test]
    fn matches_by_selected_field_only() {
        let gateway = Gateway::new("abc123", "shared");
        assert!(GatewaySelector::Name("shared".to_string()).matches(&gateway));
        assert!(!GatewaySelector::Id("shared".to_string()).matches(&gateway));
        assert_eq!(gateway.to_string(), "shared (abc123)");
    }

    #[test]
    fn deserializes_admin_api_shape() {
        let json = r#"{"id":"k1x2","name":"shared","description":"ignored"}"#;
        let Ok(gateway) = serde_json::from_str::<Gateway>(json) else {
            panic!("gateway should deserialize");
        };
        assert_eq!(gateway, Gateway::new("k1x2", "shared"));
    }
}
