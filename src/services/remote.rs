//! HTTP/JSON adapters for the external collaborators
//!
//! Every adapter POSTs a JSON body to its configured endpoint with an optional
//! bearer token and maps the response status onto [`ServiceError`]:
//!
//! | Status | Error |
//! |--------|-------|
//! | 429 | `RateLimited` |
//! | 5xx | `Unavailable` |
//! | other 4xx | `Rejected` |
//! | 2xx with an undecodable body | `Malformed` |
//! | timeout / connection failure | `Transient` |

use super::{DocumentUnderstanding, ImagePayload, MatchScorer, ServiceError, TextQuality};
use crate::config::{ServicesConfig, UserAgentConfig};
use crate::crawler::user_agent_string;
use crate::scoring::MatchResult;
use crate::storage::DetailRecord;
use crate::HarvestError;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Shared HTTP client and credentials for service calls
#[derive(Debug, Clone)]
pub struct ServiceClient {
    client: Client,
    api_key: Option<String>,
}

impl ServiceClient {
    /// Builds a client from configuration
    ///
    /// The bearer token is read from the environment variable named by
    /// `api-key-env`; a missing variable is a configuration error.
    pub fn from_config(
        services: &ServicesConfig,
        user_agent: &UserAgentConfig,
    ) -> Result<Self, HarvestError> {
        let api_key = match &services.api_key_env {
            Some(var) => Some(std::env::var(var).map_err(|_| {
                crate::ConfigError::Validation(format!(
                    "environment variable {} is not set",
                    var
                ))
            })?),
            None => None,
        };

        let client = Client::builder()
            .user_agent(user_agent_string(user_agent))
            .timeout(Duration::from_millis(services.timeout_ms))
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self { client, api_key })
    }

    pub fn with_client(client: Client, api_key: Option<String>) -> Self {
        Self { client, api_key }
    }

    async fn post_json<Req, Resp>(&self, endpoint: &str, body: &Req) -> Result<Resp, ServiceError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let mut request = self.client.post(endpoint).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(classify_transport_error)?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ServiceError::RateLimited);
        }
        if status.is_server_error() {
            return Err(ServiceError::Unavailable {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ServiceError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response.bytes().await.map_err(classify_transport_error)?;
        serde_json::from_slice(&bytes).map_err(|e| ServiceError::Malformed(e.to_string()))
    }
}

fn classify_transport_error(err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::Transient("request timeout".to_string())
    } else if err.is_connect() {
        ServiceError::Transient("connection failed".to_string())
    } else {
        ServiceError::Transient(err.to_string())
    }
}

#[derive(Serialize)]
struct OcrRequest<'a> {
    mime_type: &'a str,
    image: String,
}

#[derive(Serialize)]
struct RewriteRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct TextResponse {
    text: String,
}

#[derive(Serialize)]
struct ScoreRequest<'a> {
    profile: &'a str,
    records: Vec<ScoredRecord<'a>>,
}

#[derive(Serialize)]
struct ScoredRecord<'a> {
    id: i64,
    url: &'a str,
    title: Option<&'a str>,
    fields: &'a BTreeMap<String, String>,
    body: &'a str,
}

#[derive(Deserialize)]
struct ScoreResponse {
    results: Vec<MatchResult>,
}

/// OCR over HTTP; images travel base64-encoded
#[derive(Debug, Clone)]
pub struct HttpDocumentUnderstanding {
    client: ServiceClient,
    endpoint: String,
}

impl HttpDocumentUnderstanding {
    pub fn new(client: ServiceClient, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl DocumentUnderstanding for HttpDocumentUnderstanding {
    async fn ocr(&self, image: &ImagePayload) -> Result<String, ServiceError> {
        let request = OcrRequest {
            mime_type: &image.mime_type,
            image: BASE64_STANDARD.encode(&image.bytes),
        };
        let response: TextResponse = self.client.post_json(&self.endpoint, &request).await?;
        Ok(response.text)
    }
}

/// Readability rewrite over HTTP
#[derive(Debug, Clone)]
pub struct HttpTextQuality {
    client: ServiceClient,
    endpoint: String,
}

impl HttpTextQuality {
    pub fn new(client: ServiceClient, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl TextQuality for HttpTextQuality {
    async fn rewrite(&self, text: &str) -> Result<String, ServiceError> {
        let response: TextResponse = self
            .client
            .post_json(&self.endpoint, &RewriteRequest { text })
            .await?;
        Ok(response.text)
    }
}

/// Batch scoring over HTTP
#[derive(Debug, Clone)]
pub struct HttpMatchScorer {
    client: ServiceClient,
    endpoint: String,
}

impl HttpMatchScorer {
    pub fn new(client: ServiceClient, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl MatchScorer for HttpMatchScorer {
    async fn score(
        &self,
        profile: &str,
        batch: &[DetailRecord],
    ) -> Result<Vec<MatchResult>, ServiceError> {
        let records = batch
            .iter()
            .filter_map(|record| {
                record.id.map(|id| ScoredRecord {
                    id,
                    url: &record.url,
                    title: record.title.as_deref(),
                    fields: &record.fields,
                    body: &record.body_text,
                })
            })
            .collect();

        let response: ScoreResponse = self
            .client
            .post_json(&self.endpoint, &ScoreRequest { profile, records })
            .await?;
        Ok(response.results)
    }
}
