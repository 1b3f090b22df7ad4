//! Domain layer: gateway identity, live resources, and the template model.
//!
//! This module contains the pure data model: the shared gateway, the
//! indexed set of live path resources, the structured reference
//! expressions, the typed template, and the records describing a
//! reconciliation result. Nothing here talks to the network.

pub mod expr;
pub mod gateway;
pub mod live_resource;
pub mod report;
pub mod template;

pub use expr::{Expr, Substitution};
pub use gateway::{Gateway, GatewaySelector};
pub use live_resource::{LiveResource, LiveResourceSet, ROOT_PATH};
pub use report::{NewResource, ReconcileReport, RedundantResource};
pub use template::{NodeKind, Template, TemplateNode};
