//! # shared-gateway
//!
//! Retargets a deployment template at a shared, long-lived API gateway.
//!
//! A service template normally declares its own gateway root and the full
//! tree of path resources under it. This crate rewrites such a template so
//! that it attaches to an existing gateway instead: the template's own
//! gateway root is removed, path resources that already exist on the shared
//! gateway are dropped, and every reference to a removed node is repointed
//! at the live id.
//!
//! ## Architecture
//!
//! ```text
//! CLI (main.rs)
//!     │
//!     ├── ReconcileSession (service/)
//!     │       ├── GatewayResolver   ── locate or create the gateway
//!     │       ├── ResourceFetcher   ── page through live resources
//!     │       └── Reconciler        ── pure template rewrite
//!     │
//!     ├── Template / Expr (domain/)
//!     │
//!     └── GatewayAdmin (admin/)
//!             ├── HttpGatewayAdmin
//!             └── InMemoryGatewayAdmin
//! ```

pub mod admin;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
