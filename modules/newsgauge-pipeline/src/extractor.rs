//! Content Extractor.
//!
//! Fetches resolved article URLs concurrently and pulls out readable
//! main-body text. A primary Readability pass runs over a single fetch; if
//! it yields nothing, an independent plain-text strategy retries with its
//! own fetch. Both failing maps the URL to `None`; item failures never
//! surface to the caller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use spider_transformations::transformation::content::{
    transform_content_input, ReturnFormat, TransformConfig, TransformInput,
};
use tracing::{debug, info, warn};

/// One way of turning a URL into readable text. Strategies own their own
/// retrieval so a fallback is genuinely independent of the primary's fetch.
#[async_trait]
pub trait ExtractStrategy: Send + Sync {
    /// Returns non-empty article text, or an error explaining why not.
    async fn extract(&self, url: &str) -> Result<String>;
    fn name(&self) -> &str;
}

/// Convert raw HTML into clean markdown using Readability extraction.
fn html_to_markdown(html: &[u8], url: &str) -> String {
    let parsed_url = url::Url::parse(url).ok();
    let config = TransformConfig {
        readability: true,
        main_content: true,
        return_format: ReturnFormat::Markdown,
        filter_images: true,
        filter_svg: true,
        clean_html: true,
    };
    let input = TransformInput {
        url: parsed_url.as_ref(),
        content: html,
        screenshot_bytes: None,
        encoding: None,
        selector_config: None,
        ignore_tags: None,
    };

    transform_content_input(input, &config)
}

async fn fetch_html(client: &reqwest::Client, url: &str) -> Result<String> {
    let resp = client.get(url).send().await.context("Request failed")?;
    let status = resp.status();
    if !status.is_success() {
        anyhow::bail!("HTTP status {status}");
    }
    resp.text().await.context("Failed to read response body")
}

fn article_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent("Mozilla/5.0 (compatible; newsgauge/0.1)")
        .build()
        .expect("Failed to build HTTP client")
}

// --- Primary: fetch + Readability ---

pub struct ReadabilityStrategy {
    client: reqwest::Client,
}

impl ReadabilityStrategy {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: article_client(timeout),
        }
    }
}

#[async_trait]
impl ExtractStrategy for ReadabilityStrategy {
    async fn extract(&self, url: &str) -> Result<String> {
        let html = fetch_html(&self.client, url).await?;
        let text = html_to_markdown(html.as_bytes(), url);
        if text.trim().is_empty() {
            anyhow::bail!("Readability produced no content");
        }
        Ok(text)
    }

    fn name(&self) -> &str {
        "readability"
    }
}

// --- Fallback: independent fetch + plain-text conversion ---

pub struct PlainTextStrategy {
    client: reqwest::Client,
}

impl PlainTextStrategy {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: article_client(timeout),
        }
    }
}

#[async_trait]
impl ExtractStrategy for PlainTextStrategy {
    async fn extract(&self, url: &str) -> Result<String> {
        let html = fetch_html(&self.client, url).await?;
        let text = html2text::from_read(html.as_bytes(), 80)
            .context("Plain-text conversion failed")?;
        if text.trim().is_empty() {
            anyhow::bail!("Plain-text conversion produced no content");
        }
        Ok(text)
    }

    fn name(&self) -> &str {
        "plaintext"
    }
}

// --- Extractor ---

pub struct ContentExtractor {
    primary: Arc<dyn ExtractStrategy>,
    fallback: Arc<dyn ExtractStrategy>,
    /// In-flight request ceiling. Protects the local network stack; results
    /// are keyed by URL so completion order does not matter.
    max_in_flight: usize,
}

impl ContentExtractor {
    pub fn new(http_timeout: Duration, max_in_flight: usize) -> Self {
        Self::with_strategies(
            Arc::new(ReadabilityStrategy::new(http_timeout)),
            Arc::new(PlainTextStrategy::new(http_timeout)),
            max_in_flight,
        )
    }

    pub fn with_strategies(
        primary: Arc<dyn ExtractStrategy>,
        fallback: Arc<dyn ExtractStrategy>,
        max_in_flight: usize,
    ) -> Self {
        Self {
            primary,
            fallback,
            max_in_flight: max_in_flight.max(1),
        }
    }

    /// Extract content from every URL. The returned map's key set equals the
    /// input set exactly; `None` means both strategies failed.
    pub async fn extract_all(&self, urls: &[String]) -> HashMap<String, Option<String>> {
        let mut results: HashMap<String, Option<String>> =
            urls.iter().map(|u| (u.clone(), None)).collect();
        if results.is_empty() {
            return results;
        }

        let unique: Vec<String> = results.keys().cloned().collect();
        let attempted = unique.len();
        info!(urls = attempted, "Extracting article content");

        let outcomes: Vec<(String, Option<String>)> = futures::stream::iter(unique)
            .map(|url| async move {
                let content = self.extract_one(&url).await;
                (url, content)
            })
            .buffer_unordered(self.max_in_flight)
            .collect()
            .await;

        let mut succeeded = 0usize;
        for (url, content) in outcomes {
            if content.is_some() {
                succeeded += 1;
            }
            results.insert(url, content);
        }

        info!(
            attempted,
            succeeded,
            failed = attempted - succeeded,
            "Content extraction complete"
        );
        results
    }

    async fn extract_one(&self, url: &str) -> Option<String> {
        match self.primary.extract(url).await {
            Ok(text) => {
                debug!(url, strategy = self.primary.name(), bytes = text.len(), "Extracted");
                return Some(text);
            }
            Err(e) => {
                debug!(url, strategy = self.primary.name(), error = %e, "Primary extraction failed");
            }
        }

        match self.fallback.extract(url).await {
            Ok(text) => {
                debug!(url, strategy = self.fallback.name(), bytes = text.len(), "Extracted");
                Some(text)
            }
            Err(e) => {
                warn!(url, error = %e, "Both extraction strategies failed");
                None
            }
        }
    }
}
