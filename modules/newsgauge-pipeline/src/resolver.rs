//! Link Resolver Pool.
//!
//! Resolves aggregator redirect links to their final article URLs by driving
//! a fixed pool of long-lived browser pages. Each worker owns one page for
//! the whole call, so page startup cost is amortized across many links and
//! steady-state resource use is bounded by the pool size, not the input size.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use headless_client::HeadlessBrowser;

/// Tunables for one `resolve` call.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Number of pool workers, each owning one persistent page.
    pub concurrency: usize,
    /// Hard cap on a single navigation.
    pub nav_timeout: Duration,
    /// How long to wait for a loaded page to escape the aggregator redirect.
    pub wait_budget: Duration,
    /// Interval between redirect-completion polls.
    pub poll_interval: Duration,
    /// A final URL still under this prefix counts as unresolved.
    pub aggregator_prefix: String,
}

// --- Browser seams ---

#[async_trait]
pub trait RedirectPage: Send + Sync {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()>;
    async fn current_url(&self) -> Result<String>;
    async fn close(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait RedirectBrowser: Send + Sync {
    async fn open_page(&self) -> Result<Box<dyn RedirectPage>>;
    async fn shutdown(self: Box<Self>) -> Result<()>;
}

/// Launches a browser scoped to one `resolve` call.
#[async_trait]
pub trait BrowserProvider: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn RedirectBrowser>>;
}

// --- Pool ---

pub struct LinkResolverPool {
    provider: Arc<dyn BrowserProvider>,
    config: ResolverConfig,
}

impl LinkResolverPool {
    pub fn new(provider: Arc<dyn BrowserProvider>, config: ResolverConfig) -> Self {
        Self { provider, config }
    }

    /// Resolve every link. The returned map's key set equals the input set
    /// exactly; a `None` value means the link could not be resolved within
    /// its budget. Per-link failures never abort sibling work; the browser
    /// and all pages are torn down before this returns.
    pub async fn resolve(&self, links: &[String]) -> Result<HashMap<String, Option<String>>> {
        let mut results: HashMap<String, Option<String>> =
            links.iter().map(|l| (l.clone(), None)).collect();
        if results.is_empty() {
            return Ok(results);
        }

        let queued: Vec<String> = results.keys().cloned().collect();
        let workers = self.config.concurrency.clamp(1, queued.len());

        // Infrastructure failures here are stage-level: nothing has been
        // resolved yet and the caller needs to know the pool could not start.
        let browser = self
            .provider
            .launch()
            .await
            .context("Failed to launch resolver browser")?;

        let mut pages = Vec::with_capacity(workers);
        for _ in 0..workers {
            match browser.open_page().await {
                Ok(page) => pages.push(page),
                Err(e) => {
                    for page in pages {
                        let _ = page.close().await;
                    }
                    let _ = browser.shutdown().await;
                    return Err(e.context("Failed to open resolver page"));
                }
            }
        }

        info!(
            links = queued.len(),
            workers,
            "Resolving aggregator links"
        );

        let (tx, rx) = mpsc::channel(queued.len());
        for link in queued {
            // Capacity equals queue length, so this never blocks.
            let _ = tx.send(link).await;
        }
        // Dropping the sender is the end-of-work signal: workers see
        // `recv() -> None` and exit instead of spinning on an empty queue.
        drop(tx);

        let queue = Arc::new(Mutex::new(rx));
        let outcomes = join_all(
            pages
                .into_iter()
                .enumerate()
                .map(|(id, page)| self.worker(id, page, Arc::clone(&queue))),
        )
        .await;

        if let Err(e) = browser.shutdown().await {
            warn!(error = %e, "Resolver browser shutdown failed");
        }

        let mut resolved = 0usize;
        for pairs in outcomes {
            for (link, outcome) in pairs {
                if outcome.is_some() {
                    resolved += 1;
                }
                results.insert(link, outcome);
            }
        }

        info!(
            resolved,
            failed = results.len() - resolved,
            "Link resolution complete"
        );
        Ok(results)
    }

    /// One pool worker: pull links until the queue closes, then release the
    /// page.
    async fn worker(
        &self,
        id: usize,
        page: Box<dyn RedirectPage>,
        queue: Arc<Mutex<mpsc::Receiver<String>>>,
    ) -> Vec<(String, Option<String>)> {
        let mut out = Vec::new();
        loop {
            let link = { queue.lock().await.recv().await };
            let Some(link) = link else { break };
            let outcome = self.resolve_one(page.as_ref(), &link).await;
            out.push((link, outcome));
        }
        if let Err(e) = page.close().await {
            warn!(worker = id, error = %e, "Failed to close resolver page");
        }
        out
    }

    /// Navigate to one link and poll until the page escapes the aggregator
    /// prefix or the wait budget runs out. Any failure maps to `None` for
    /// this link only.
    async fn resolve_one(&self, page: &dyn RedirectPage, link: &str) -> Option<String> {
        if let Err(e) = page.goto(link, self.config.nav_timeout).await {
            warn!(link, error = %e, "Navigation failed");
            return None;
        }

        let started = tokio::time::Instant::now();
        loop {
            match page.current_url().await {
                Ok(url)
                    if !url.is_empty() && !url.starts_with(&self.config.aggregator_prefix) =>
                {
                    return Some(url);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(link, error = %e, "Failed to read page URL");
                    return None;
                }
            }
            if started.elapsed() >= self.config.wait_budget {
                warn!(link, "Redirect wait budget exhausted");
                return None;
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

// --- Chromium-backed production implementation ---

pub struct ChromiumProvider {
    chrome_bin: Option<String>,
}

impl ChromiumProvider {
    pub fn new(chrome_bin: Option<String>) -> Self {
        Self { chrome_bin }
    }
}

#[async_trait]
impl BrowserProvider for ChromiumProvider {
    async fn launch(&self) -> Result<Box<dyn RedirectBrowser>> {
        let browser = HeadlessBrowser::launch(self.chrome_bin.as_deref()).await?;
        Ok(Box::new(ChromiumBrowser { browser }))
    }
}

struct ChromiumBrowser {
    browser: HeadlessBrowser,
}

#[async_trait]
impl RedirectBrowser for ChromiumBrowser {
    async fn open_page(&self) -> Result<Box<dyn RedirectPage>> {
        let page = self.browser.new_page().await?;
        Ok(Box::new(ChromiumPage { page }))
    }

    async fn shutdown(self: Box<Self>) -> Result<()> {
        self.browser.shutdown().await?;
        Ok(())
    }
}

struct ChromiumPage {
    page: headless_client::BrowserPage,
}

#[async_trait]
impl RedirectPage for ChromiumPage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()> {
        self.page.goto(url, timeout).await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.page.current_url().await?)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.page.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const AGG: &str = "https://news.google.com";

    fn config(concurrency: usize) -> ResolverConfig {
        ResolverConfig {
            concurrency,
            nav_timeout: Duration::from_secs(10),
            wait_budget: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
            aggregator_prefix: AGG.to_string(),
        }
    }

    /// Where a fake navigation ends up.
    #[derive(Clone)]
    enum Target {
        ResolvesTo(&'static str),
        NeverResolves,
        NavFails,
    }

    #[derive(Default)]
    struct Counters {
        open_pages: AtomicUsize,
        peak_pages: AtomicUsize,
        total_opened: AtomicUsize,
        shutdowns: AtomicUsize,
    }

    struct FakeProvider {
        targets: Arc<HashMap<String, Target>>,
        counters: Arc<Counters>,
        fail_launch: bool,
    }

    impl FakeProvider {
        fn new(targets: Vec<(&str, Target)>) -> Self {
            Self {
                targets: Arc::new(
                    targets
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), v))
                        .collect(),
                ),
                counters: Arc::new(Counters::default()),
                fail_launch: false,
            }
        }
    }

    #[async_trait]
    impl BrowserProvider for FakeProvider {
        async fn launch(&self) -> Result<Box<dyn RedirectBrowser>> {
            if self.fail_launch {
                anyhow::bail!("no browser available");
            }
            Ok(Box::new(FakeBrowser {
                targets: Arc::clone(&self.targets),
                counters: Arc::clone(&self.counters),
            }))
        }
    }

    struct FakeBrowser {
        targets: Arc<HashMap<String, Target>>,
        counters: Arc<Counters>,
    }

    #[async_trait]
    impl RedirectBrowser for FakeBrowser {
        async fn open_page(&self) -> Result<Box<dyn RedirectPage>> {
            let open = self.counters.open_pages.fetch_add(1, Ordering::SeqCst) + 1;
            self.counters.peak_pages.fetch_max(open, Ordering::SeqCst);
            self.counters.total_opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakePage {
                targets: Arc::clone(&self.targets),
                counters: Arc::clone(&self.counters),
                current: Mutex::new(String::new()),
            }))
        }

        async fn shutdown(self: Box<Self>) -> Result<()> {
            self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakePage {
        targets: Arc<HashMap<String, Target>>,
        counters: Arc<Counters>,
        current: Mutex<String>,
    }

    #[async_trait]
    impl RedirectPage for FakePage {
        async fn goto(&self, url: &str, _timeout: Duration) -> Result<()> {
            let landing = match self.targets.get(url) {
                Some(Target::ResolvesTo(dest)) => dest.to_string(),
                Some(Target::NeverResolves) => url.to_string(),
                Some(Target::NavFails) => anyhow::bail!("net::ERR_CONNECTION_RESET"),
                // A link that is already a real article URL loads as itself.
                None => url.to_string(),
            };
            *self.current.lock().await = landing;
            Ok(())
        }

        async fn current_url(&self) -> Result<String> {
            Ok(self.current.lock().await.clone())
        }

        async fn close(self: Box<Self>) -> Result<()> {
            self.counters.open_pages.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn links(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn key_set_equals_input_with_mixed_outcomes() {
        let provider = FakeProvider::new(vec![
            (
                "https://news.google.com/rss/articles/1",
                Target::ResolvesTo("https://real1.example.com/story"),
            ),
            ("https://news.google.com/rss/articles/2", Target::NeverResolves),
            ("https://news.google.com/rss/articles/3", Target::NavFails),
        ]);
        let pool = LinkResolverPool::new(Arc::new(provider), config(2));

        let input = links(&[
            "https://news.google.com/rss/articles/1",
            "https://news.google.com/rss/articles/2",
            "https://news.google.com/rss/articles/3",
        ]);
        let results = pool.resolve(&input).await.unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(
            results["https://news.google.com/rss/articles/1"].as_deref(),
            Some("https://real1.example.com/story")
        );
        assert_eq!(results["https://news.google.com/rss/articles/2"], None);
        assert_eq!(results["https://news.google.com/rss/articles/3"], None);
    }

    #[tokio::test(start_paused = true)]
    async fn never_escaping_link_fails_within_budget() {
        let provider =
            FakeProvider::new(vec![("https://news.google.com/x", Target::NeverResolves)]);
        let pool = LinkResolverPool::new(Arc::new(provider), config(1));

        let started = tokio::time::Instant::now();
        let results = pool
            .resolve(&links(&["https://news.google.com/x"]))
            .await
            .unwrap();

        assert_eq!(results["https://news.google.com/x"], None);
        // Budget is 5s; with a 100ms poll interval the call must finish just
        // past the budget, never hang.
        assert!(started.elapsed() < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn pool_never_opens_more_pages_than_concurrency() {
        let targets: Vec<(&str, Target)> = vec![];
        let provider = FakeProvider::new(targets);
        let counters = Arc::clone(&provider.counters);
        let pool = LinkResolverPool::new(Arc::new(provider), config(3));

        let input: Vec<String> = (0..10)
            .map(|i| format!("https://real{i}.example.com/a"))
            .collect();
        let results = pool.resolve(&input).await.unwrap();

        assert_eq!(results.len(), 10);
        assert_eq!(counters.peak_pages.load(Ordering::SeqCst), 3);
        assert_eq!(counters.total_opened.load(Ordering::SeqCst), 3);
        // Every page released, browser shut down.
        assert_eq!(counters.open_pages.load(Ordering::SeqCst), 0);
        assert_eq!(counters.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn already_resolved_url_is_a_no_op() {
        let provider = FakeProvider::new(vec![]);
        let pool = LinkResolverPool::new(Arc::new(provider), config(1));

        let results = pool
            .resolve(&links(&["https://real.example.com/article"]))
            .await
            .unwrap();

        assert_eq!(
            results["https://real.example.com/article"].as_deref(),
            Some("https://real.example.com/article")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn empty_input_returns_empty_without_launching() {
        let mut provider = FakeProvider::new(vec![]);
        provider.fail_launch = true;
        let pool = LinkResolverPool::new(Arc::new(provider), config(4));

        let results = pool.resolve(&[]).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn launch_failure_is_a_stage_level_error() {
        let mut provider = FakeProvider::new(vec![]);
        provider.fail_launch = true;
        let pool = LinkResolverPool::new(Arc::new(provider), config(4));

        let err = pool
            .resolve(&links(&["https://news.google.com/a"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("resolver browser"));
    }
}
