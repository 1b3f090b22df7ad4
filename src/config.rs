//! Reconciliation configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Blank values count as unset.
//!
//! | Variable                             | Default                  |
//! |--------------------------------------|--------------------------|
//! | `SHARED_GATEWAY_ID`                  | unset                    |
//! | `SHARED_GATEWAY_NAME`                | required without id      |
//! | `SHARED_GATEWAY_PARENT_RESOURCE_ID`  | gateway root             |
//! | `SHARED_GATEWAY_PAGE_SIZE`           | `500`                    |
//! | `GATEWAY_ADMIN_URL`                  | `http://localhost:4566`  |
//! | `GATEWAY_ADMIN_TOKEN`                | unset                    |
//! | `GATEWAY_ADMIN_TIMEOUT_SECS`         | `30`                     |
//! | `LOG_FORMAT`                         | `text`                   |

use crate::admin::MAX_PAGE_SIZE;
use crate::domain::GatewaySelector;
use crate::error::ReconcileError;

/// Top-level configuration.
///
/// Loaded once at startup via [`ReconcileConfig::from_env`].
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Which shared gateway to target.
    pub gateway: GatewaySelector,

    /// Existing resource to graft new paths under; the gateway root when
    /// `None`.
    pub attachment_resource_id: Option<String>,

    /// Page size for live resource listing (1..=500).
    pub page_size: u32,

    /// Administration API connection settings.
    pub admin: AdminConfig,

    /// Log output format.
    pub log_format: LogFormat,
}

/// Connection settings for [`crate::admin::HttpGatewayAdmin`].
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// Base URL of the administration API.
    pub endpoint: String,

    /// Bearer token sent with every request.
    pub token: Option<String>,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

/// Log output format selected by `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl ReconcileConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Configuration`] if neither a gateway id nor
    /// a gateway name is set, or the page size is out of range.
    pub fn from_env() -> Result<Self, ReconcileError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`ReconcileConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ReconcileError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let gateway =
            GatewaySelector::from_parts(get("SHARED_GATEWAY_ID"), get("SHARED_GATEWAY_NAME"))?;
        let attachment_resource_id = get("SHARED_GATEWAY_PARENT_RESOURCE_ID");

        let page_size = match get("SHARED_GATEWAY_PAGE_SIZE") {
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|size| (1..=MAX_PAGE_SIZE).contains(size))
                .ok_or_else(|| {
                    ReconcileError::Configuration(format!(
                        "SHARED_GATEWAY_PAGE_SIZE must be between 1 and {MAX_PAGE_SIZE}, got '{raw}'"
                    ))
                })?,
            None => MAX_PAGE_SIZE,
        };

        let admin = AdminConfig {
            endpoint: get("GATEWAY_ADMIN_URL")
                .unwrap_or_else(|| "http://localhost:4566".to_string()),
            token: get("GATEWAY_ADMIN_TOKEN"),
            timeout_secs: parse_or(get("GATEWAY_ADMIN_TIMEOUT_SECS"), 30),
        };

        let log_format = match get("LOG_FORMAT").as_deref() {
            Some("json") | Some("JSON") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            gateway,
            attachment_resource_id,
            page_size,
            admin,
            log_format,
        })
    }
}

/// Parses `raw` as `T`, returning `default` on missing or invalid values.
fn parse_or<T: std::str::FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.parse().ok()).unwrap_or(default)
}
