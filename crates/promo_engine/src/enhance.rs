use std::fmt::Write as _;
use std::time::Duration;

use engine_logging::engine_warn;
use serde::Deserialize;

use crate::types::{EnhanceError, RetryPolicy};

#[derive(Debug, Clone)]
pub struct EnhanceSettings {
    pub base_url: String,
    pub request_timeout: Duration,
    pub max_results: usize,
    pub retry: RetryPolicy,
}

impl Default for EnhanceSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8081".to_string(),
            request_timeout: Duration::from_secs(15),
            max_results: 3,
            retry: RetryPolicy::default(),
        }
    }
}

/// Best-effort web lookup that enriches the prompt with fresh context about
/// the article topic. Failures never abort a session.
#[async_trait::async_trait]
pub trait Enhancer: Send + Sync {
    async fn enhance(&self, topic: &str) -> Result<String, EnhanceError>;
}

pub struct HttpEnhancer {
    client: reqwest::Client,
    settings: EnhanceSettings,
}

impl HttpEnhancer {
    pub fn new(settings: EnhanceSettings) -> Result<Self, EnhanceError> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| EnhanceError::Http(err.to_string()))?;
        Ok(Self { client, settings })
    }

    async fn search_once(&self, topic: &str) -> Result<SearchResponse, EnhanceError> {
        let response = self
            .client
            .get(format!("{}/v1/search", self.settings.base_url))
            .query(&[("q", topic)])
            .send()
            .await
            .map_err(|err| EnhanceError::Http(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnhanceError::Status(status.as_u16()));
        }

        response
            .json::<SearchResponse>()
            .await
            .map_err(|err| EnhanceError::Malformed(err.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

#[async_trait::async_trait]
impl Enhancer for HttpEnhancer {
    async fn enhance(&self, topic: &str) -> Result<String, EnhanceError> {
        let mut attempt = 0;
        let response = loop {
            match self.search_once(topic).await {
                Ok(response) => break response,
                Err(err @ EnhanceError::Malformed(_)) => return Err(err),
                Err(err) if attempt < self.settings.retry.max_retries => {
                    attempt += 1;
                    engine_warn!("enhancement attempt {attempt} failed, retrying: {err}");
                    tokio::time::sleep(self.settings.retry.delay_for(attempt)).await;
                }
                Err(err) => return Err(err),
            }
        };

        let mut summary = String::new();
        for result in response.results.iter().take(self.settings.max_results) {
            let snippet = result.snippet.trim();
            if snippet.is_empty() {
                continue;
            }
            let _ = writeln!(summary, "- {}: {}", result.title.trim(), snippet);
        }
        Ok(summary.trim_end().to_string())
    }
}
