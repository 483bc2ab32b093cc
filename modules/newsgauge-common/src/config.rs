use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables.
/// Constructed once per run and passed into each component rather than held
/// in a process-wide singleton.
#[derive(Debug, Clone)]
pub struct Config {
    // Gemini
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_report_model: String,

    // Link resolver
    pub resolver_concurrency: usize,
    pub resolver_nav_timeout: Duration,
    pub resolver_wait_budget: Duration,
    pub resolver_poll_interval: Duration,
    pub aggregator_prefix: String,

    // Content extractor
    pub extractor_max_in_flight: usize,
    pub http_timeout: Duration,

    // Headless browser
    pub chrome_bin: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            gemini_api_key: required_env("GEMINI_API_KEY"),
            gemini_model: env_or("GEMINI_MODEL", "gemini-1.5-flash-8b"),
            gemini_report_model: env_or("GEMINI_REPORT_MODEL", "gemini-1.5-pro"),
            resolver_concurrency: parsed_env("RESOLVER_CONCURRENCY", 20),
            resolver_nav_timeout: Duration::from_secs(parsed_env("RESOLVER_NAV_TIMEOUT_SECS", 20)),
            resolver_wait_budget: Duration::from_secs(parsed_env("RESOLVER_WAIT_BUDGET_SECS", 5)),
            resolver_poll_interval: Duration::from_millis(parsed_env(
                "RESOLVER_POLL_INTERVAL_MS",
                250,
            )),
            aggregator_prefix: env_or("AGGREGATOR_PREFIX", "https://news.google.com"),
            extractor_max_in_flight: parsed_env("EXTRACTOR_MAX_IN_FLIGHT", 200),
            http_timeout: Duration::from_secs(parsed_env("HTTP_TIMEOUT_SECS", 20)),
            chrome_bin: env::var("CHROME_BIN").ok(),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a number, got {raw:?}")),
        Err(_) => default,
    }
}
