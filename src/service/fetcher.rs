//! Live resource fetcher: pages through every path resource of a gateway.

use crate::admin::{GatewayAdmin, MAX_PAGE_SIZE};
use crate::domain::LiveResource;
use crate::error::ReconcileError;

/// Sequential pager over [`GatewayAdmin::list_resources`].
///
/// Keeps requesting pages while the previous page was full and came with a
/// continuation token. A short page ends the listing even if a token is
/// present, which guards against services handing out a stale token on the
/// trailing page.
#[derive(Debug, Clone, Copy)]
pub struct ResourceFetcher<'a> {
    admin: &'a dyn GatewayAdmin,
    page_size: u32,
}

impl<'a> ResourceFetcher<'a> {
    /// Creates a fetcher requesting pages of `page_size` items.
    #[must_use]
    pub fn new(admin: &'a dyn GatewayAdmin, page_size: u32) -> Self {
        Self { admin, page_size }
    }

    /// Creates a fetcher using the largest page the API allows.
    #[must_use]
    pub fn with_max_page_size(admin: &'a dyn GatewayAdmin) -> Self {
        Self::new(admin, MAX_PAGE_SIZE)
    }

    /// Fetches the complete resource list of `gateway_id`, in request order.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Configuration`] for a zero page size and
    /// propagates the first page failure unchanged. No partial list is
    /// returned.
    pub async fn fetch_all(&self, gateway_id: &str) -> Result<Vec<LiveResource>, ReconcileError> {
        if self.page_size == 0 {
            return Err(ReconcileError::Configuration(
                "page size must be at least 1".to_string(),
            ));
        }
        let full_page = usize::try_from(self.page_size).unwrap_or(usize::MAX);

        let mut resources = Vec::new();
        let mut token: Option<String> = None;
        let mut pages: usize = 0;

        loop {
            let page = self
                .admin
                .list_resources(gateway_id, token.as_deref(), self.page_size)
                .await?;
            pages += 1;

            let count = page.items.len();
            tracing::debug!(gateway_id, page = pages, count, "fetched resource page");
            resources.extend(page.items);

            match page.continuation_token {
                Some(next) if count >= full_page => {
                    if token.as_deref() == Some(next.as_str()) {
                        return Err(ReconcileError::Upstream(format!(
                            "resource listing of {gateway_id} repeated continuation token '{next}'"
                        )));
                    }
                    token = Some(next);
                }
                _ => break,
            }
        }

        tracing::info!(
            gateway_id,
            pages,
            total = resources.len(),
            "fetched live resources"
        );
        Ok(resources)
    }
}
