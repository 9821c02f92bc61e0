use std::time::Duration;

use engine_logging::{engine_debug, engine_warn};
use futures_util::StreamExt;
use promo_core::ScrapedArticle;
use reqwest::header::CONTENT_TYPE;

use crate::decode::decode_page;
use crate::extract::{ArticleExtractor, Extractor};
use crate::types::{RetryPolicy, ScrapeError, ScrapeFailureKind};

#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_bytes: u64,
    pub max_images: usize,
    pub retry: RetryPolicy,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            max_bytes: 5 * 1024 * 1024,
            max_images: 8,
            retry: RetryPolicy::default(),
        }
    }
}

/// Article scrape collaborator: URL in, `{title, content, images}` out.
#[async_trait::async_trait]
pub trait Scraper: Send + Sync {
    async fn scrape(&self, url: &str) -> Result<ScrapedArticle, ScrapeError>;
}

pub struct HttpScraper {
    client: reqwest::Client,
    extractor: ArticleExtractor,
    settings: ScrapeSettings,
}

impl HttpScraper {
    pub fn new(settings: ScrapeSettings) -> Result<Self, ScrapeError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| ScrapeError::new(ScrapeFailureKind::Network, err.to_string()))?;

        Ok(Self {
            client,
            extractor: ArticleExtractor::new(settings.max_images),
            settings,
        })
    }

    async fn fetch_page(
        &self,
        url: &reqwest::Url,
    ) -> Result<(Vec<u8>, Option<String>), ScrapeError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::new(
                ScrapeFailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        if let Some(content_len) = response.content_length() {
            if content_len > self.settings.max_bytes {
                return Err(ScrapeError::new(
                    ScrapeFailureKind::TooLarge {
                        max_bytes: self.settings.max_bytes,
                        actual: Some(content_len),
                    },
                    "response too large",
                ));
            }
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > self.settings.max_bytes {
                return Err(ScrapeError::new(
                    ScrapeFailureKind::TooLarge {
                        max_bytes: self.settings.max_bytes,
                        actual: Some(next_len),
                    },
                    "response too large",
                ));
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok((bytes, content_type))
    }
}

#[async_trait::async_trait]
impl Scraper for HttpScraper {
    async fn scrape(&self, url: &str) -> Result<ScrapedArticle, ScrapeError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|err| ScrapeError::new(ScrapeFailureKind::InvalidUrl, err.to_string()))?;

        let mut attempt = 0;
        let (bytes, content_type) = loop {
            match self.fetch_page(&parsed).await {
                Ok(page) => break page,
                Err(err) if err.kind.is_retryable() && attempt < self.settings.retry.max_retries => {
                    attempt += 1;
                    engine_warn!("scrape attempt {attempt} for {url} failed, retrying: {err}");
                    tokio::time::sleep(self.settings.retry.delay_for(attempt)).await;
                }
                Err(err) => return Err(err),
            }
        };

        let page = decode_page(&bytes, content_type.as_deref())
            .map_err(|err| ScrapeError::new(ScrapeFailureKind::Decode, err.to_string()))?;
        engine_debug!(
            "scraped {} bytes from {url} as {}",
            bytes.len(),
            page.encoding_label
        );

        let article = self.extractor.extract(&page.html, &parsed);
        let title = article
            .title
            .or_else(|| parsed.host_str().map(|host| host.to_string()))
            .unwrap_or_else(|| url.to_string());

        Ok(ScrapedArticle {
            title,
            content: article.text,
            images: article.images,
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> ScrapeError {
    if err.is_timeout() {
        return ScrapeError::new(ScrapeFailureKind::Timeout, err.to_string());
    }
    ScrapeError::new(ScrapeFailureKind::Network, err.to_string())
}
