//! Reconciliation error types with exit code mapping.
//!
//! [`ReconcileError`] is the central error type for the crate. Every
//! failure aborts the whole reconciliation run; nothing is retried
//! internally and no partial template is ever returned.

/// Error enum covering configuration, live state, upstream and internal
/// failures.
///
/// # Error Code Ranges
///
/// | Range     | Category       | Exit code |
/// |-----------|----------------|-----------|
/// | 1000–1999 | Configuration  | 2         |
/// | 2000–2999 | Live state     | 3         |
/// | 3000–3999 | Upstream       | 4         |
/// | 4000–4999 | Internal       | 70        |
/// | 5000–5999 | Template       | 65        |
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Neither a gateway id nor a gateway name was configured, or a
    /// configuration value could not be used.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A name lookup matched more than one live object.
    #[error("ambiguous match: {subject} matches {count} live entries")]
    AmbiguousMatch {
        /// What was looked up, e.g. `gateway name 'shared'`.
        subject: String,
        /// Number of live entries that matched.
        count: usize,
    },

    /// A required live object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The administration API call failed.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// A reconciliation step was invoked before the steps it depends on.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// A reference in the reconciled template still names a removed node.
    #[error("dangling reference: '{referrer}' still references '{target}'")]
    DanglingReference {
        /// Logical name of the node holding the reference.
        referrer: String,
        /// Logical name (or id) the reference points at.
        target: String,
    },

    /// Two live siblings share the same path part.
    #[error("live resources under parent {parent_id} share path part '{path_part}'")]
    DuplicateLiveResource {
        /// Id of the common parent resource.
        parent_id: String,
        /// The duplicated path part.
        path_part: String,
    },

    /// The template document does not have the expected shape.
    #[error("invalid template: {0}")]
    InvalidTemplate(String),
}

impl ReconcileError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Configuration(_) => 1001,
            Self::AmbiguousMatch { .. } => 2001,
            Self::NotFound(_) => 2002,
            Self::DuplicateLiveResource { .. } => 2003,
            Self::Upstream(_) => 3001,
            Self::Precondition(_) => 4001,
            Self::DanglingReference { .. } => 4002,
            Self::InvalidTemplate(_) => 5001,
        }
    }

    /// Returns the process exit code the binary reports for this variant.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration(_) => 2,
            Self::AmbiguousMatch { .. } | Self::NotFound(_) | Self::DuplicateLiveResource { .. } => {
                3
            }
            Self::Upstream(_) => 4,
            Self::Precondition(_) | Self::DanglingReference { .. } => 70,
            Self::InvalidTemplate(_) => 65,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_category_ranges() {
        assert_eq!(ReconcileError::Configuration(String::new()).error_code(), 1001);
        assert_eq!(ReconcileError::NotFound(String::new()).error_code(), 2002);
        assert_eq!(ReconcileError::Upstream(String::new()).error_code(), 3001);
        assert_eq!(ReconcileError::Precondition(String::new()).error_code(), 4001);
        assert_eq!(
            ReconcileError::InvalidTemplate(String::new()).error_code(),
            5001
        );
    }

    #[test]
    fn internal_defects_exit_with_software_error() {
        let err = ReconcileError::DanglingReference {
            referrer: "ApiGatewayMethodUsersGet".to_string(),
            target: "ApiGatewayResourceUsers".to_string(),
        };
        assert_eq!(err.exit_code(), 70);
        assert!(err.to_string().contains("ApiGatewayResourceUsers"));
    }

    #[test]
    fn ambiguous_match_message_names_subject() {
        let err = ReconcileError::AmbiguousMatch {
            subject: "gateway name 'shared'".to_string(),
            count: 2,
        };
        assert_eq!(
            err.to_string(),
            "ambiguous match: gateway name 'shared' matches 2 live entries"
        );
        assert_eq!(err.exit_code(), 3);
    }
}
