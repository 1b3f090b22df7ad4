//! HTTP implementation of the gateway administration API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::{GatewayAdmin, MAX_PAGE_SIZE, ResourcePage};
use crate::config::AdminConfig;
use crate::domain::Gateway;
use crate::error::ReconcileError;

/// Gateway administration API client over `reqwest`.
///
/// Talks to the REST shape `GET /restapis`, `POST /restapis` and
/// `GET /restapis/{id}/resources`, with pages of the form
/// `{"item": [...], "position": "..."}`.
#[derive(Debug, Clone)]
pub struct HttpGatewayAdmin {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GatewayPage {
    #[serde(default, rename = "item")]
    items: Vec<Gateway>,
}

impl HttpGatewayAdmin {
    /// Creates a client from connection settings.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Configuration`] if the HTTP client cannot
    /// be built.
    pub fn new(config: &AdminConfig) -> Result<Self, ReconcileError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ReconcileError::Configuration(format!("admin client: {e}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{path}", self.endpoint));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

/// Checks the status and decodes the JSON body of an admin API response.
async fn decode<T: DeserializeOwned>(
    sent: Result<Response, reqwest::Error>,
    operation: &str,
) -> Result<T, ReconcileError> {
    let response = sent.map_err(|e| ReconcileError::Upstream(format!("{operation}: {e}")))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ReconcileError::Upstream(format!(
            "{operation} returned {status}: {body}"
        )));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| ReconcileError::Upstream(format!("{operation}: unreadable body: {e}")))
}

#[async_trait]
impl GatewayAdmin for HttpGatewayAdmin {
    async fn list_gateways(&self) -> Result<Vec<Gateway>, ReconcileError> {
        let sent = self
            .request(Method::GET, "/restapis")
            .query(&[("limit", MAX_PAGE_SIZE)])
            .send()
            .await;
        let page: GatewayPage = decode(sent, "list gateways").await?;
        Ok(page.items)
    }

    async fn create_gateway(&self, name: &str) -> Result<Gateway, ReconcileError> {
        let sent = self
            .request(Method::POST, "/restapis")
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await;
        decode(sent, "create gateway").await
    }

    async fn list_resources(
        &self,
        gateway_id: &str,
        continuation_token: Option<&str>,
        page_size: u32,
    ) -> Result<ResourcePage, ReconcileError> {
        let mut builder = self
            .request(Method::GET, &format!("/restapis/{gateway_id}/resources"))
            .query(&[("limit", page_size.to_string())]);
        if let Some(token) = continuation_token {
            builder = builder.query(&[("position", token)]);
        }
        decode(builder.send().await, "list resources").await
    }
}
