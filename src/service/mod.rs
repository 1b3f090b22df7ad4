//! Service layer: reconciliation orchestration.
//!
//! [`ReconcileSession`] sequences the [`GatewayResolver`], the
//! [`ResourceFetcher`] and the pure [`Reconciler`] for one run.

pub mod fetcher;
pub mod reconciler;
pub mod resolver;
pub mod session;

pub use fetcher::ResourceFetcher;
pub use reconciler::{Reconciled, Reconciler, RedundantSet};
pub use resolver::{GatewayResolver, ResolvedGateway, resolve_attachment};
pub use session::{ReconcileSession, Reconciliation};
