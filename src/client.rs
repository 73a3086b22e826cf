//! Access to the twin graph store.
//!
//! [`TwinGraph`] is the query + patch surface the pipeline needs and
//! [`Connect`] produces fresh handles after a fault. [`AdtConnector`] talks
//! to Azure Digital Twins over its REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::error::TwinError;
use crate::patch::PatchDocument;
use crate::twin::Twin;

/// Query and patch operations on the twin graph.
#[async_trait]
pub trait TwinGraph: Send + Sync {
    /// Run a twin query and return every matching node.
    async fn query(&self, query: &str) -> Result<Vec<Twin>, TwinError>;

    /// Apply a patch document to one twin.
    async fn patch(&self, dt_id: &str, patch: &PatchDocument) -> Result<(), TwinError>;
}

/// Establishes [`TwinGraph`] handles.
#[async_trait]
pub trait Connect: Send + Sync {
    type Client: TwinGraph;

    async fn connect(&self) -> Result<Self::Client, TwinError>;
}

const JSON_PATCH: &str = "application/json-patch+json";

/// Connection settings for an Azure Digital Twins instance.
#[derive(Debug, Clone)]
pub struct AdtConnector {
    endpoint: String,
    access_token: String,
    api_version: String,
    timeout: Duration,
}

impl AdtConnector {
    pub fn new(endpoint: impl Into<String>, access_token: impl Into<String>) -> Self {
        AdtConnector {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            api_version: "2020-10-31".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Connect for AdtConnector {
    type Client = AdtClient;

    async fn connect(&self) -> Result<AdtClient, TwinError> {
        if self.access_token.is_empty() {
            return Err(TwinError::Auth("no access token".to_string()));
        }
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", self.access_token))
            .map_err(|e| TwinError::Auth(format!("unusable access token: {e}")))?;
        bearer.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(self.timeout)
            .build()
            .map_err(|e| TwinError::Connection(e.to_string()))?;

        log::info!("Azure Digital Twins client connection created for {}", self.endpoint);

        Ok(AdtClient {
            client,
            endpoint: self.endpoint.clone(),
            api_version: self.api_version.clone(),
        })
    }
}

/// Authenticated handle to an Azure Digital Twins instance.
#[derive(Debug, Clone)]
pub struct AdtClient {
    client: Client,
    endpoint: String,
    api_version: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    query: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    continuation_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryPage {
    #[serde(default)]
    value: Vec<Twin>,
    #[serde(default)]
    continuation_token: Option<String>,
}

impl AdtClient {
    async fn query_page(&self, request: &QueryRequest<'_>) -> Result<QueryPage, TwinError> {
        let url = format!("{}/query?api-version={}", self.endpoint, self.api_version);
        let response = self.client.post(&url).json(request).send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl TwinGraph for AdtClient {
    async fn query(&self, query: &str) -> Result<Vec<Twin>, TwinError> {
        let mut twins = Vec::new();
        let mut request = QueryRequest {
            query: Some(query),
            continuation_token: None,
        };

        loop {
            let page = self.query_page(&request).await?;
            twins.extend(page.value);
            match page.continuation_token {
                Some(token) => {
                    request = QueryRequest {
                        query: None,
                        continuation_token: Some(token),
                    }
                }
                None => break,
            }
        }

        log::debug!("query returned {} twins: {}", twins.len(), query);
        Ok(twins)
    }

    async fn patch(&self, dt_id: &str, patch: &PatchDocument) -> Result<(), TwinError> {
        if patch.is_empty() {
            return Ok(());
        }
        let url = twin_url(&self.endpoint, dt_id, &self.api_version)?;
        let body = serde_json::to_vec(patch)
            .map_err(|e| TwinError::Store(format!("unserializable patch: {e}")))?;

        let response = self
            .client
            .patch(url)
            .header(CONTENT_TYPE, JSON_PATCH)
            .body(body)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, TwinError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(TwinError::Auth(format!("{status}: {detail}")))
        }
        _ => Err(TwinError::Store(format!("{status}: {detail}"))),
    }
}

/// `{endpoint}/digitaltwins/{dt_id}` with the dtId encoded as one path segment.
fn twin_url(endpoint: &str, dt_id: &str, api_version: &str) -> Result<Url, TwinError> {
    let invalid = || TwinError::Connection(format!("invalid endpoint: {endpoint}"));
    let mut url = Url::parse(endpoint).map_err(|_| invalid())?;
    url.path_segments_mut()
        .map_err(|_| invalid())?
        .pop_if_empty()
        .push("digitaltwins")
        .push(dt_id);
    url.query_pairs_mut().append_pair("api-version", api_version);
    Ok(url)
}
