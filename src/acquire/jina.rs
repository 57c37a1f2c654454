// src/acquire/jina.rs
//! Reader/search client for the hosted markdown renderer (r.jina.ai / s.jina.ai),
//! plus plain GET for RSS feeds.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ContentSource, FetchTarget};
use crate::error::AcquisitionError;
use crate::event::SourceKind;

/// Upstream endpoints, overridable for staging or local fakes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JinaEndpoints {
    pub reader_url: String,
    pub search_url: String,
    /// Country hint sent with search requests.
    pub locale: String,
}

impl Default for JinaEndpoints {
    fn default() -> Self {
        Self {
            reader_url: "https://r.jina.ai/".to_string(),
            search_url: "https://s.jina.ai/".to_string(),
            locale: "UK".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    q: &'a str,
}

pub struct JinaClient {
    api_key: String,
    endpoints: JinaEndpoints,
    timeout: Duration,
    client: reqwest::Client,
}

impl JinaClient {
    pub fn new(api_key: impl Into<String>, endpoints: JinaEndpoints, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("community-event-discovery/0.1")
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to create HTTP client: {e}"))?;
        Ok(Self {
            api_key: api_key.into(),
            endpoints,
            timeout,
            client,
        })
    }

    async fn read(&self, url: &str) -> Result<String, AcquisitionError> {
        let resp = self
            .client
            .get(format!("{}{}", self.endpoints.reader_url, url))
            .bearer_auth(&self.api_key)
            .header("Accept", "text/plain")
            .header("X-Return-Format", "markdown")
            .header("X-Timeout", self.timeout.as_secs().to_string())
            .send()
            .await?;
        body_or_error(resp).await
    }

    async fn search(&self, query: &str) -> Result<String, AcquisitionError> {
        let resp = self
            .client
            .post(&self.endpoints.search_url)
            .bearer_auth(&self.api_key)
            .header("Accept", "text/plain")
            .header("X-Locale", &self.endpoints.locale)
            .json(&SearchRequest { q: query })
            .send()
            .await?;
        body_or_error(resp).await
    }

    async fn feed(&self, url: &str) -> Result<String, AcquisitionError> {
        let resp = self.client.get(url).send().await?;
        body_or_error(resp).await
    }
}

async fn body_or_error(resp: reqwest::Response) -> Result<String, AcquisitionError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let body: String = body.chars().take(300).collect();
        return Err(AcquisitionError::Http {
            status: status.as_u16(),
            body,
        });
    }
    Ok(resp.text().await?)
}

#[async_trait]
impl ContentSource for JinaClient {
    async fn fetch(&self, target: &FetchTarget) -> Result<String, AcquisitionError> {
        match target.kind {
            SourceKind::Read => self.read(&target.endpoint).await,
            SourceKind::Search => self.search(&target.endpoint).await,
            SourceKind::Feed => self.feed(&target.endpoint).await,
        }
    }

    fn name(&self) -> &'static str {
        "jina"
    }
}
