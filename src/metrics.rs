use metrics::{register_counter, register_gauge, register_histogram, Counter, Gauge, Histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use tracing::info;

/// Instrument handles for the reader pipeline.
///
/// Handles are registered against whatever recorder is installed when the
/// struct is built; with none installed they are no-ops.
pub struct Metrics {
    pub pages_read: Counter,
    pub navigation_failures: Counter,
    pub screenshots_published: Counter,
    pub read_duration: Histogram,
    pub in_flight: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            pages_read: register_counter!("page_reader_pages_read_total"),
            navigation_failures: register_counter!("page_reader_navigation_failures_total"),
            screenshots_published: register_counter!("page_reader_screenshots_published_total"),
            read_duration: register_histogram!("page_reader_read_duration_seconds"),
            in_flight: register_gauge!("page_reader_in_flight_requests"),
        }
    }

    pub fn noop() -> Self {
        Self {
            pages_read: Counter::noop(),
            navigation_failures: Counter::noop(),
            screenshots_published: Counter::noop(),
            read_duration: Histogram::noop(),
            in_flight: Gauge::noop(),
        }
    }

    pub fn record_read(&self, duration: Duration, success: bool) {
        if success {
            self.pages_read.increment(1);
        } else {
            self.navigation_failures.increment(1);
        }
        self.read_duration.record(duration.as_secs_f64());
    }

    pub fn record_screenshot_published(&self) {
        self.screenshots_published.increment(1);
    }

    /// Counts a request as in flight until the returned guard is dropped,
    /// including when the request future is cancelled.
    pub fn track_in_flight(&self) -> InFlightGuard<'_> {
        self.in_flight.increment(1.0);
        InFlightGuard {
            gauge: &self.in_flight,
        }
    }
}

pub struct InFlightGuard<'a> {
    gauge: &'a Gauge,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.gauge.decrement(1.0);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs the global Prometheus recorder. Call before building [`Metrics`].
pub fn install_prometheus_recorder() -> Result<PrometheusHandle, crate::ReaderError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| crate::ReaderError::Configuration(format!("metrics recorder: {e}")))?;
    info!("Prometheus metrics recorder installed");
    Ok(handle)
}
