//! HTTP Lease Store
//!
//! Client for a remote lease server (see [`crate::api::LeaseServer`]).
//! Status codes from the server map straight onto the error taxonomy:
//! 404 is not-found, 409 is a conflict, anything else is a store error.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode, Url};

use super::{LeaseRecord, LeaseStore};
use crate::api::ErrorResponse;
use crate::error::{Error, Result};

/// Lease store reached over HTTP
pub struct HttpLeaseStore {
    /// Underlying HTTP client
    client: reqwest::Client,
    /// Base URL of the lease server, without trailing slash
    endpoint: String,
    /// Parsed form of `endpoint`
    base: Url,
}

impl HttpLeaseStore {
    /// Create a client for the lease server at `endpoint`
    pub fn new(endpoint: &str, request_timeout: Duration) -> Result<Self> {
        let endpoint = endpoint.trim_end_matches('/').to_string();
        let base = Url::parse(&endpoint)
            .map_err(|e| Error::Config(format!("Invalid lease server URL {}: {}", endpoint, e)))?;
        if base.cannot_be_a_base() {
            return Err(Error::Config(format!("Invalid lease server URL {}", endpoint)));
        }

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, endpoint, base })
    }

    /// Base URL of the lease server
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Base URL extended by `segments`, each percent-encoded as one path segment
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn lease_url(&self, namespace: &str, name: &str) -> Url {
        self.url(&["leases", namespace, name])
    }

    async fn into_record(response: Response, namespace: &str, name: &str) -> Result<LeaseRecord> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<LeaseRecord>().await?);
        }

        let message = match response.json::<ErrorResponse>().await {
            Ok(body) => body.error,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string(),
        };

        Err(match status {
            StatusCode::NOT_FOUND => Error::not_found(namespace, name),
            StatusCode::CONFLICT => Error::Conflict(message),
            _ => Error::Store {
                status: Some(status.as_u16()),
                message,
            },
        })
    }
}

#[async_trait]
impl LeaseStore for HttpLeaseStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<LeaseRecord> {
        let response = self
            .client
            .get(self.lease_url(namespace, name))
            .send()
            .await?;
        Self::into_record(response, namespace, name).await
    }

    async fn create(&self, record: &LeaseRecord) -> Result<LeaseRecord> {
        let response = self
            .client
            .post(self.url(&["leases"]))
            .json(record)
            .send()
            .await?;
        Self::into_record(response, &record.namespace, &record.name).await
    }

    async fn update(&self, record: &LeaseRecord) -> Result<LeaseRecord> {
        let response = self
            .client
            .put(self.lease_url(&record.namespace, &record.name))
            .json(record)
            .send()
            .await?;
        Self::into_record(response, &record.namespace, &record.name).await
    }

    fn backend(&self) -> &'static str {
        "http"
    }
}
