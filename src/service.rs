//! Reader pipeline: validate the target, scrape it, render it, and publish the
//! screenshot a screenshot mode asks for.

use crate::{
    normalize_target_url, render, screenshot_path, Metrics, PageReader, PageSnapshot,
    ReaderError, ReaderResponse, RequestOptions, ResponseMode, ScreenshotSink,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Result of one read that got as far as the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Rendered(ReaderResponse),
    /// The page could not be loaded; carries the failure message.
    Failed(String),
}

pub struct ReaderService {
    page_reader: Arc<PageReader>,
    sink: Arc<dyn ScreenshotSink>,
    metrics: Arc<Metrics>,
}

impl ReaderService {
    pub fn new(
        page_reader: Arc<PageReader>,
        sink: Arc<dyn ScreenshotSink>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            page_reader,
            sink,
            metrics,
        }
    }

    pub fn sink(&self) -> &Arc<dyn ScreenshotSink> {
        &self.sink
    }

    /// Reads `target` as described by `options`.
    ///
    /// Returns `InvalidUrl` before any browser work when the target is not a
    /// usable http(s) URL, and `Storage` when a screenshot mode cannot publish
    /// its image. Page load failures are a [`ReadOutcome::Failed`].
    pub async fn read(&self, target: &str, options: &RequestOptions) -> Result<ReadOutcome, ReaderError> {
        let url = normalize_target_url(target)?;
        let start = Instant::now();

        let in_flight = self.metrics.track_in_flight();
        let mut snapshot = self.page_reader.scrape(url.as_str(), &options.scraping).await;
        drop(in_flight);
        self.metrics.record_read(start.elapsed(), !snapshot.is_failure());

        if let Some(error) = snapshot.error.take() {
            return Ok(ReadOutcome::Failed(error));
        }

        let mut response = render(&snapshot, options.mode);
        if let Some(bytes) = screenshot_for_mode(snapshot, options.mode) {
            let id = self.sink.put(bytes).await.map_err(|e| {
                warn!(url = %url, error = %e, "Failed to publish screenshot");
                match e {
                    ReaderError::Storage(_) => e,
                    other => ReaderError::Storage(other.to_string()),
                }
            })?;
            self.metrics.record_screenshot_published();
            response.attach_screenshot_reference(screenshot_path(&id));
        }

        info!(
            url = %url,
            mode = options.mode.as_str(),
            elapsed = %crate::format_duration(start.elapsed()),
            "Read complete"
        );
        Ok(ReadOutcome::Rendered(response))
    }

    pub async fn shutdown(&self) {
        self.page_reader.shutdown().await;
    }
}

/// The screenshot bytes `mode` publishes, if any were captured.
fn screenshot_for_mode(snapshot: PageSnapshot, mode: ResponseMode) -> Option<Vec<u8>> {
    match mode {
        ResponseMode::Screenshot => snapshot.screenshot,
        ResponseMode::Pageshot => snapshot.full_page_screenshot,
        _ => None,
    }
}
