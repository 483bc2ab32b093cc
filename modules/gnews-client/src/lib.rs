pub mod error;

pub use error::{GnewsError, Result};

use std::time::Duration;

use chrono::NaiveDate;
use newsgauge_common::ArticleCandidate;
use tracing::{info, warn};

const DEFAULT_BASE_URL: &str = "https://news.google.com/rss/search";

/// Client for the Google News RSS search endpoint. Results carry aggregator
/// redirect links, not article URLs; resolution happens downstream.
pub struct GoogleNewsClient {
    client: reqwest::Client,
    base_url: String,
}

impl GoogleNewsClient {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (compatible; newsgauge/0.1)")
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Search news for `query` within the inclusive `[start, end]` date range.
    /// Entries missing a title or link are skipped with a warning.
    pub async fn search(
        &self,
        query: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ArticleCandidate>> {
        let dated_query = format!("{query} after:{start} before:{end}");
        let url = format!(
            "{}?q={}&hl=en-US&gl=US&ceid=US:en",
            self.base_url,
            urlencoding::encode(&dated_query)
        );

        info!(query, %start, %end, "Google News search");

        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(GnewsError::Api {
                status: status.as_u16(),
            });
        }

        let bytes = resp.bytes().await?;
        let articles = parse_feed(&bytes)?;

        info!(query, count = articles.len(), "Google News search complete");
        Ok(articles)
    }
}

/// Parse a Google News RSS payload into article candidates.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<ArticleCandidate>> {
    let feed = feed_rs::parser::parse(bytes).map_err(|e| GnewsError::Parse(e.to_string()))?;

    let articles = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let title = entry.title.map(|t| t.content).filter(|t| !t.is_empty());
            let link = entry.links.first().map(|l| l.href.clone());
            let published = entry
                .published
                .or(entry.updated)
                .map(|dt| dt.date_naive());

            match (title, link, published) {
                (Some(title), Some(source_link), Some(published_date)) => {
                    Some(ArticleCandidate {
                        title,
                        source_link,
                        published_date,
                    })
                }
                _ => {
                    warn!("Skipping feed entry with missing title, link or date");
                    None
                }
            }
        })
        .collect();

    Ok(articles)
}
