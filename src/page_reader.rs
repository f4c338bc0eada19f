//! Navigation and extraction engine
//!
//! Drives one page load on the shared session page and turns it into a
//! [`PageSnapshot`]. Only one request drives the page at a time: the engine
//! holds its in-flight lock from session acquisition through screenshot
//! capture.

use crate::{
    extract_article, PageDriver, PageSnapshot, RawDocument, ReaderError, ScrapingOptions,
    SessionHandle, SessionProvider, DEFAULT_SELECTOR_WAIT,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub struct PageReader {
    session: Arc<dyn SessionProvider>,
    in_flight: Mutex<()>,
    selector_wait: Duration,
}

impl PageReader {
    pub fn new(session: Arc<dyn SessionProvider>) -> Self {
        Self {
            session,
            in_flight: Mutex::new(()),
            selector_wait: DEFAULT_SELECTOR_WAIT,
        }
    }

    /// Budget applied to each `wait_for_selector` entry.
    pub fn with_selector_wait(mut self, selector_wait: Duration) -> Self {
        self.selector_wait = selector_wait;
        self
    }

    /// Loads `url` and captures it.
    ///
    /// Never fails: session, user-agent and navigation errors come back as a
    /// failure snapshot carrying the message. Everything after navigation is
    /// best-effort.
    pub async fn scrape(&self, url: &str, options: &ScrapingOptions) -> PageSnapshot {
        let _guard = self.in_flight.lock().await;
        let start = Instant::now();

        let page = match self.load(url, options).await {
            Ok(page) => page,
            Err(e) => {
                warn!(url = %url, error = %e, "Page load failed");
                return PageSnapshot::failure(url, e.to_string());
            }
        };

        self.wait_for_selectors(page.as_ref(), &options.wait_for_selector)
            .await;

        let mut snapshot = Self::extract(page.as_ref(), url).await;

        if options.favor_screenshot {
            snapshot.screenshot = Self::capture(page.as_ref(), false).await;
            snapshot.full_page_screenshot = Self::capture(page.as_ref(), true).await;
        }

        info!(
            url = %url,
            final_url = %snapshot.final_url,
            article = snapshot.parsed_article.is_some(),
            elapsed = ?start.elapsed(),
            "Page captured"
        );
        snapshot
    }

    /// Waits for any in-flight request to finish, then closes the session.
    pub async fn shutdown(&self) {
        let _guard = self.in_flight.lock().await;
        self.session.close().await;
    }

    async fn load(&self, url: &str, options: &ScrapingOptions) -> Result<SessionHandle, ReaderError> {
        let page = self.session.ensure_ready().await?;

        match options.override_user_agent.as_deref() {
            Some(user_agent) => page.set_user_agent(user_agent).await?,
            None => page.reset_user_agent().await?,
        }

        let timeout = options.timeout();
        debug!(url = %url, timeout_ms = options.timeout_ms, "Navigating");
        tokio::time::timeout(timeout, page.navigate(url))
            .await
            .map_err(|_| ReaderError::NavigationTimeout(timeout))??;

        Ok(page)
    }

    async fn wait_for_selectors(&self, page: &dyn PageDriver, selectors: &[String]) {
        for selector in selectors {
            if let Err(ignored) = page.wait_for_selector(selector, self.selector_wait).await {
                debug!("{}", ignored);
            }
        }
    }

    async fn extract(page: &dyn PageDriver, url: &str) -> PageSnapshot {
        let document = match page.extract_document().await {
            Ok(document) => document,
            Err(e) => {
                warn!(url = %url, error = %e, "Document extraction failed, returning empty content");
                RawDocument {
                    href: url.to_string(),
                    ..Default::default()
                }
            }
        };

        let parsed_article = match extract_article(&document.html) {
            Ok(article) => Some(article),
            Err(ignored) => {
                debug!(url = %url, "{}", ignored);
                None
            }
        };

        PageSnapshot::success(document, parsed_article)
    }

    async fn capture(page: &dyn PageDriver, full_page: bool) -> Option<Vec<u8>> {
        match page.capture_screenshot(full_page).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(full_page, error = %e, "Screenshot capture failed");
                None
            }
        }
    }
}
