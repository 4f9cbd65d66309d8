//! HTTP implementation of the dataset service gateway.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use super::{CredentialProvider, Gateway, GatewayError};
use crate::config::ClientConfig;
use crate::model::{
    Category, CommitAck, CommitRequest, DatasetId, DatasetProgress, Item, ItemId,
};

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Transport {
                message: e.to_string(),
            }
        }
    }
}

/// Pull the human-readable message out of an error body.
///
/// The server answers errors with `{"detail": ...}`; anything else is passed
/// through as text, falling back to the status reason.
fn error_detail(body: &str, reason: Option<&str>) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        match value.get("detail") {
            Some(serde_json::Value::String(s)) => return s.clone(),
            Some(other) => return other.to_string(),
            None => {}
        }
    }
    let body = body.trim();
    if body.is_empty() {
        reason.unwrap_or("request failed").to_string()
    } else {
        body.to_string()
    }
}

/// Talks to the dataset service over HTTP with a bearer credential.
pub struct HttpGateway {
    client: Client,
    /// Base URL including the `/api` prefix, without trailing slash
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpGateway {
    /// Create a gateway for `server_url` (e.g. `http://host:8000`).
    pub fn new(
        server_url: &str,
        timeout: Duration,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: format!("{}/api", server_url.trim_end_matches('/')),
            credentials,
        })
    }

    /// Create a gateway from the client configuration.
    pub fn from_config(
        config: &ClientConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, GatewayError> {
        Self::new(&config.server_url, config.request_timeout(), credentials)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, GatewayError> {
        let request = match self.credentials.bearer_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = error_detail(&body, status.canonical_reason());
        log::warn!("Gateway request failed with {}: {}", status, detail);
        Err(GatewayError::from_status(status.as_u16(), detail))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        let response = self.send(self.client.get(self.url(path))).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn categories(&self, dataset: DatasetId) -> Result<Vec<Category>, GatewayError> {
        self.get_json(&format!("/categories/dataset/{dataset}")).await
    }

    async fn next_batch(
        &self,
        dataset: DatasetId,
        count: usize,
    ) -> Result<Vec<Item>, GatewayError> {
        let request = self
            .client
            .get(self.url(&format!("/images/next/{dataset}/batch")))
            .query(&[("count", count)]);
        let bytes = self.send(request).await?.bytes().await?;
        // A null body means "nothing assigned"
        let items: Option<Vec<Item>> = serde_json::from_slice(&bytes)?;
        Ok(items.unwrap_or_default())
    }

    async fn next_item(&self, dataset: DatasetId) -> Result<Option<Item>, GatewayError> {
        self.get_json(&format!("/images/next/{dataset}")).await
    }

    async fn item(&self, id: ItemId) -> Result<Item, GatewayError> {
        self.get_json(&format!("/images/{id}")).await
    }

    async fn payload(&self, id: ItemId) -> Result<Vec<u8>, GatewayError> {
        let response = self
            .send(self.client.get(self.url(&format!("/images/{id}/file"))))
            .await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn commit(
        &self,
        id: ItemId,
        request: &CommitRequest,
    ) -> Result<CommitAck, GatewayError> {
        let response = self
            .send(
                self.client
                    .post(self.url(&format!("/images/{id}/save")))
                    .json(request),
            )
            .await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn progress(&self, dataset: DatasetId) -> Result<DatasetProgress, GatewayError> {
        self.get_json(&format!("/images/dataset/{dataset}/progress"))
            .await
    }
}
