pub mod error;

pub use error::{HeadlessError, Result};

use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One headless Chromium process plus its CDP event loop. Pages opened from
/// it stay valid until `shutdown` is called or the value is dropped (drop
/// kills the child process).
pub struct HeadlessBrowser {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

impl HeadlessBrowser {
    /// Launch a headless Chromium instance. `chrome_bin` overrides the
    /// executable discovered on PATH.
    pub async fn launch(chrome_bin: Option<&str>) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage");
        if let Some(bin) = chrome_bin {
            builder = builder.chrome_executable(bin);
        }
        let config = builder.build().map_err(HeadlessError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| HeadlessError::Launch(e.to_string()))?;

        // The handler stream must be polled for the CDP connection to make
        // progress. It ends when the browser closes.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "CDP handler event error");
                }
            }
        });

        info!("Headless browser launched");
        Ok(Self {
            browser,
            handler_task,
        })
    }

    /// Open a fresh blank page.
    pub async fn new_page(&self) -> Result<BrowserPage> {
        let page = self.browser.new_page("about:blank").await?;
        Ok(BrowserPage { page })
    }

    /// Close every page, the browser process and the CDP event loop.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "Browser close failed, killing process");
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        info!("Headless browser shut down");
        Ok(())
    }
}

/// One browser tab. Holds no state beyond the CDP target handle, so it can
/// be reused for many navigations.
pub struct BrowserPage {
    page: chromiumoxide::Page,
}

impl BrowserPage {
    /// Navigate to `url`, bounded by `timeout`.
    pub async fn goto(&self, url: &str, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(HeadlessError::NavigationTimeout {
                url: url.to_string(),
            }),
        }
    }

    /// The URL the page currently shows, after any redirects so far.
    pub async fn current_url(&self) -> Result<String> {
        let url = self.page.url().await?;
        Ok(url.unwrap_or_default())
    }

    pub async fn close(self) -> Result<()> {
        self.page.close().await?;
        Ok(())
    }
}
