//! Pipeline orchestrator.
//!
//! Drives one company run through discovery, link resolution, content
//! extraction and analysis. Stages narrow the record set: an article that
//! fails resolution or extraction is dropped, while a stage that cannot run
//! at all fails the whole run with the stage named in the error.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use gemini_client::GeminiClient;
use gnews_client::GoogleNewsClient;
use newsgauge_common::{
    AnalyzedArticle, ArticleCandidate, Config, DateGroup, EnrichedArticle, PipelineError, Stage,
    TimeWindow,
};

use crate::analysis::GeminiAnalyzer;
use crate::discovery::NewsDiscovery;
use crate::extractor::ContentExtractor;
use crate::report::{render_html, ReportGenerator};
use crate::resolver::{ChromiumProvider, LinkResolverPool, ResolverConfig};

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

// --- Stage seams ---

#[async_trait]
pub trait DiscoveryService: Send + Sync {
    async fn discover(
        &self,
        company: &str,
        window: TimeWindow,
    ) -> anyhow::Result<Vec<ArticleCandidate>>;
}

#[async_trait]
pub trait LinkResolverService: Send + Sync {
    async fn resolve(&self, links: &[String]) -> anyhow::Result<HashMap<String, Option<String>>>;
}

#[async_trait]
pub trait ContentService: Send + Sync {
    async fn extract_all(&self, urls: &[String]) -> HashMap<String, Option<String>>;
}

#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(
        &self,
        company: &str,
        groups: &[DateGroup],
    ) -> anyhow::Result<Vec<AnalyzedArticle>>;
}

#[async_trait]
pub trait ReportService: Send + Sync {
    async fn generate(
        &self,
        company: &str,
        articles: &[AnalyzedArticle],
    ) -> anyhow::Result<String>;
}

#[async_trait]
impl DiscoveryService for NewsDiscovery {
    async fn discover(
        &self,
        company: &str,
        window: TimeWindow,
    ) -> anyhow::Result<Vec<ArticleCandidate>> {
        NewsDiscovery::discover(self, company, window).await
    }
}

#[async_trait]
impl LinkResolverService for LinkResolverPool {
    async fn resolve(&self, links: &[String]) -> anyhow::Result<HashMap<String, Option<String>>> {
        LinkResolverPool::resolve(self, links).await
    }
}

#[async_trait]
impl ContentService for ContentExtractor {
    async fn extract_all(&self, urls: &[String]) -> HashMap<String, Option<String>> {
        ContentExtractor::extract_all(self, urls).await
    }
}

#[async_trait]
impl AnalysisService for GeminiAnalyzer {
    async fn analyze(
        &self,
        company: &str,
        groups: &[DateGroup],
    ) -> anyhow::Result<Vec<AnalyzedArticle>> {
        self.analyze_groups(company, groups).await
    }
}

#[async_trait]
impl ReportService for ReportGenerator {
    async fn generate(
        &self,
        company: &str,
        articles: &[AnalyzedArticle],
    ) -> anyhow::Result<String> {
        ReportGenerator::generate(self, company, articles).await
    }
}

// --- Merging ---

/// Join candidates with their resolved links, preserving candidate order and
/// dropping unresolved entries.
fn merge_resolved(
    candidates: &[ArticleCandidate],
    resolved: &HashMap<String, Option<String>>,
) -> Vec<(ArticleCandidate, String)> {
    candidates
        .iter()
        .filter_map(|c| {
            resolved
                .get(&c.source_link)
                .and_then(|r| r.clone())
                .map(|link| (c.clone(), link))
        })
        .collect()
}

/// Join resolved articles with their extracted content, preserving order and
/// dropping entries whose extraction failed.
fn merge_extracted(
    resolved: Vec<(ArticleCandidate, String)>,
    contents: &HashMap<String, Option<String>>,
) -> Vec<EnrichedArticle> {
    resolved
        .into_iter()
        .filter_map(|(candidate, resolved_link)| {
            contents
                .get(&resolved_link)
                .and_then(|c| c.clone())
                .map(|content| EnrichedArticle {
                    title: candidate.title,
                    source_link: candidate.source_link,
                    resolved_link,
                    published_date: candidate.published_date,
                    content,
                })
        })
        .collect()
}

/// Partition surviving articles by publish date, groups in ascending date
/// order and in-group order preserved.
fn group_by_date(articles: Vec<EnrichedArticle>) -> Vec<DateGroup> {
    let mut by_date: BTreeMap<chrono::NaiveDate, Vec<EnrichedArticle>> = BTreeMap::new();
    for article in articles {
        by_date.entry(article.published_date).or_default().push(article);
    }
    by_date
        .into_iter()
        .map(|(date, articles)| DateGroup { date, articles })
        .collect()
}

// --- Pipeline ---

pub struct Pipeline {
    discovery: Arc<dyn DiscoveryService>,
    resolver: Arc<dyn LinkResolverService>,
    extractor: Arc<dyn ContentService>,
    analyzer: Arc<dyn AnalysisService>,
    reporter: Arc<dyn ReportService>,
}

impl Pipeline {
    pub fn new(
        discovery: Arc<dyn DiscoveryService>,
        resolver: Arc<dyn LinkResolverService>,
        extractor: Arc<dyn ContentService>,
        analyzer: Arc<dyn AnalysisService>,
        reporter: Arc<dyn ReportService>,
    ) -> Self {
        Self {
            discovery,
            resolver,
            extractor,
            analyzer,
            reporter,
        }
    }

    /// Production wiring from configuration.
    pub fn from_config(config: &Config) -> Self {
        let gemini = GeminiClient::new(&config.gemini_api_key);
        Self::new(
            Arc::new(NewsDiscovery::new(GoogleNewsClient::new(config.http_timeout))),
            Arc::new(LinkResolverPool::new(
                Arc::new(ChromiumProvider::new(config.chrome_bin.clone())),
                ResolverConfig {
                    concurrency: config.resolver_concurrency,
                    nav_timeout: config.resolver_nav_timeout,
                    wait_budget: config.resolver_wait_budget,
                    poll_interval: config.resolver_poll_interval,
                    aggregator_prefix: config.aggregator_prefix.clone(),
                },
            )),
            Arc::new(ContentExtractor::new(
                config.http_timeout,
                config.extractor_max_in_flight,
            )),
            Arc::new(GeminiAnalyzer::new(gemini.clone(), &config.gemini_model)),
            Arc::new(ReportGenerator::new(gemini, &config.gemini_report_model)),
        )
    }

    /// Run the full analysis pipeline for `company` over the trailing
    /// `window`. An empty result at any stage short-circuits to an empty
    /// success; only a stage that cannot run at all is an error.
    pub async fn run(
        &self,
        company: &str,
        window: TimeWindow,
    ) -> PipelineResult<Vec<AnalyzedArticle>> {
        info!(company, period = %window, "Pipeline run starting");

        let candidates = self
            .discovery
            .discover(company, window)
            .await
            .map_err(|e| PipelineError::stage(Stage::Discovery, format!("{e:#}")))?;
        if candidates.is_empty() {
            info!(company, "No articles discovered");
            return Ok(Vec::new());
        }

        let links: Vec<String> = candidates.iter().map(|c| c.source_link.clone()).collect();
        let resolved = self
            .resolver
            .resolve(&links)
            .await
            .map_err(|e| PipelineError::stage(Stage::Resolution, format!("{e:#}")))?;
        let with_links = merge_resolved(&candidates, &resolved);
        info!(
            company,
            discovered = candidates.len(),
            resolved = with_links.len(),
            "Resolution stage done"
        );
        if with_links.is_empty() {
            return Ok(Vec::new());
        }

        let urls: Vec<String> = with_links.iter().map(|(_, url)| url.clone()).collect();
        let contents = self.extractor.extract_all(&urls).await;
        let enriched = merge_extracted(with_links, &contents);
        info!(company, enriched = enriched.len(), "Extraction stage done");
        if enriched.is_empty() {
            return Ok(Vec::new());
        }

        let groups = group_by_date(enriched);
        let analyzed = self
            .analyzer
            .analyze(company, &groups)
            .await
            .map_err(|e| PipelineError::stage(Stage::Analysis, format!("{e:#}")))?;

        info!(company, analyzed = analyzed.len(), "Pipeline run complete");
        Ok(analyzed)
    }

    /// Generate the narrative report for a finished run, rendered as a
    /// standalone HTML document.
    pub async fn generate_report(
        &self,
        company: &str,
        articles: &[AnalyzedArticle],
    ) -> PipelineResult<String> {
        let markdown = self
            .reporter
            .generate(company, articles)
            .await
            .map_err(|e| PipelineError::stage(Stage::Report, format!("{e:#}")))?;
        Ok(render_html(&markdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use newsgauge_common::QuestionAnswer;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn candidate(title: &str, link: &str, day: u32) -> ArticleCandidate {
        ArticleCandidate {
            title: title.to_string(),
            source_link: link.to_string(),
            published_date: date(day),
        }
    }

    fn na() -> QuestionAnswer {
        QuestionAnswer {
            categorical: "N/A".into(),
            text: None,
        }
    }

    fn analyzed(headline: &str) -> AnalyzedArticle {
        AnalyzedArticle {
            headline: headline.to_string(),
            positive_sentiment: 50.0,
            negative_sentiment: 25.0,
            neutral_sentiment: 25.0,
            red_flag_score: 10.0,
            tags: vec![],
            unique_id: 1,
            q1: na(),
            q2: na(),
            q3: na(),
            q4: na(),
            q5: na(),
            q6: na(),
            q7: na(),
            q8: na(),
            q9: na(),
            q10: na(),
            q11: na(),
            q12: na(),
            date: None,
            link: None,
        }
    }

    struct FakeDiscovery {
        candidates: Vec<ArticleCandidate>,
        fail: bool,
    }

    #[async_trait]
    impl DiscoveryService for FakeDiscovery {
        async fn discover(
            &self,
            _company: &str,
            _window: TimeWindow,
        ) -> anyhow::Result<Vec<ArticleCandidate>> {
            if self.fail {
                anyhow::bail!("all 5 discovery slices failed");
            }
            Ok(self.candidates.clone())
        }
    }

    /// Resolves links by lookup; anything absent stays unresolved.
    struct FakeResolver {
        map: HashMap<String, String>,
        calls: AtomicUsize,
    }

    impl FakeResolver {
        fn new(pairs: &[(&str, &str)]) -> Self {
            Self {
                map: pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LinkResolverService for FakeResolver {
        async fn resolve(
            &self,
            links: &[String],
        ) -> anyhow::Result<HashMap<String, Option<String>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(links
                .iter()
                .map(|l| (l.clone(), self.map.get(l).cloned()))
                .collect())
        }
    }

    struct FakeContent {
        map: HashMap<String, String>,
    }

    impl FakeContent {
        fn new(pairs: &[(&str, &str)]) -> Self {
            Self {
                map: pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl ContentService for FakeContent {
        async fn extract_all(&self, urls: &[String]) -> HashMap<String, Option<String>> {
            urls.iter()
                .map(|u| (u.clone(), self.map.get(u).cloned()))
                .collect()
        }
    }

    /// Records the groups it was handed and emits one record per article.
    struct FakeAnalyzer {
        seen: Mutex<Vec<DateGroup>>,
    }

    impl FakeAnalyzer {
        fn new() -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl AnalysisService for FakeAnalyzer {
        async fn analyze(
            &self,
            _company: &str,
            groups: &[DateGroup],
        ) -> anyhow::Result<Vec<AnalyzedArticle>> {
            self.seen.lock().await.extend(groups.iter().cloned());
            Ok(groups
                .iter()
                .flat_map(|g| g.articles.iter())
                .map(|a| {
                    let mut record = analyzed(&a.title);
                    record.date = Some(a.published_date);
                    record.link = Some(a.resolved_link.clone());
                    record
                })
                .collect())
        }
    }

    struct FakeReporter;

    #[async_trait]
    impl ReportService for FakeReporter {
        async fn generate(
            &self,
            company: &str,
            articles: &[AnalyzedArticle],
        ) -> anyhow::Result<String> {
            Ok(format!(
                "# {company} Financial Analysis Report\n\n{} articles analyzed.",
                articles.len()
            ))
        }
    }

    fn pipeline(
        discovery: FakeDiscovery,
        resolver: FakeResolver,
        content: FakeContent,
    ) -> (Pipeline, Arc<FakeAnalyzer>) {
        let analyzer = Arc::new(FakeAnalyzer::new());
        let p = Pipeline::new(
            Arc::new(discovery),
            Arc::new(resolver),
            Arc::new(content),
            analyzer.clone(),
            Arc::new(FakeReporter),
        );
        (p, analyzer)
    }

    #[tokio::test]
    async fn only_fully_enriched_articles_reach_analysis() {
        // Three candidates: one resolves and extracts, one never resolves,
        // one resolves but extraction fails. Exactly one record survives.
        let discovery = FakeDiscovery {
            candidates: vec![
                candidate("Profit up", "https://news.google.com/rss/articles/1", 3),
                candidate("Probe opened", "https://news.google.com/rss/articles/2", 3),
                candidate("Guidance cut", "https://news.google.com/rss/articles/3", 4),
            ],
            fail: false,
        };
        let resolver = FakeResolver::new(&[
            (
                "https://news.google.com/rss/articles/1",
                "https://real1.example.com/story",
            ),
            (
                "https://news.google.com/rss/articles/3",
                "https://real3.example.com/story",
            ),
        ]);
        let content = FakeContent::new(&[("https://real1.example.com/story", "Profit body")]);
        let (pipeline, analyzer) = pipeline(discovery, resolver, content);

        let results = pipeline
            .run("Acme Corp", TimeWindow::new(30))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].headline, "Profit up");
        assert_eq!(
            results[0].link.as_deref(),
            Some("https://real1.example.com/story")
        );

        let seen = analyzer.seen.lock().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].date, date(3));
        assert_eq!(seen[0].articles.len(), 1);
        assert_eq!(seen[0].articles[0].content, "Profit body");
    }

    #[tokio::test]
    async fn empty_discovery_short_circuits_without_resolving() {
        let resolver = Arc::new(FakeResolver::new(&[]));
        let analyzer = Arc::new(FakeAnalyzer::new());
        let pipeline = Pipeline::new(
            Arc::new(FakeDiscovery {
                candidates: vec![],
                fail: false,
            }),
            resolver.clone(),
            Arc::new(FakeContent::new(&[])),
            analyzer.clone(),
            Arc::new(FakeReporter),
        );

        let results = pipeline
            .run("Acme Corp", TimeWindow::new(30))
            .await
            .unwrap();

        assert!(results.is_empty());
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
        assert!(analyzer.seen.lock().await.is_empty());
    }

    #[tokio::test]
    async fn discovery_failure_names_the_stage() {
        let discovery = FakeDiscovery {
            candidates: vec![],
            fail: true,
        };
        let resolver = FakeResolver::new(&[]);
        let content = FakeContent::new(&[]);
        let (pipeline, _) = pipeline(discovery, resolver, content);

        let err = pipeline
            .run("Acme Corp", TimeWindow::new(30))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("discovery stage:"));
    }

    #[tokio::test]
    async fn articles_are_grouped_by_date_in_ascending_order() {
        let discovery = FakeDiscovery {
            candidates: vec![
                candidate("Later", "https://news.google.com/rss/articles/b", 9),
                candidate("Earlier", "https://news.google.com/rss/articles/a", 2),
            ],
            fail: false,
        };
        let resolver = FakeResolver::new(&[
            (
                "https://news.google.com/rss/articles/a",
                "https://a.example.com",
            ),
            (
                "https://news.google.com/rss/articles/b",
                "https://b.example.com",
            ),
        ]);
        let content = FakeContent::new(&[
            ("https://a.example.com", "a body"),
            ("https://b.example.com", "b body"),
        ]);
        let (pipeline, analyzer) = pipeline(discovery, resolver, content);

        pipeline
            .run("Acme Corp", TimeWindow::new(30))
            .await
            .unwrap();

        let seen = analyzer.seen.lock().await;
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].date, date(2));
        assert_eq!(seen[1].date, date(9));
    }

    #[tokio::test]
    async fn report_is_rendered_as_html() {
        let discovery = FakeDiscovery {
            candidates: vec![],
            fail: false,
        };
        let (pipeline, _) = pipeline(discovery, FakeResolver::new(&[]), FakeContent::new(&[]));

        let html = pipeline
            .generate_report("Acme Corp", &[analyzed("Profit up")])
            .await
            .unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<h1>Acme Corp Financial Analysis Report</h1>"));
        assert!(html.contains("1 articles analyzed."));
    }

    #[test]
    fn merge_preserves_candidate_order() {
        let candidates = vec![
            candidate("one", "l1", 1),
            candidate("two", "l2", 1),
            candidate("three", "l3", 1),
        ];
        let resolved: HashMap<String, Option<String>> = [
            ("l1".to_string(), Some("r1".to_string())),
            ("l2".to_string(), None),
            ("l3".to_string(), Some("r3".to_string())),
        ]
        .into_iter()
        .collect();

        let merged = merge_resolved(&candidates, &resolved);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].0.title, "one");
        assert_eq!(merged[1].0.title, "three");
        assert_eq!(merged[1].1, "r3");
    }
}
