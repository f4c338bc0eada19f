use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReaderError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("Browser session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("{0}")]
    NavigationFailed(String),

    #[error("Navigation timeout of {} ms exceeded", .0.as_millis())]
    NavigationTimeout(Duration),

    #[error("Page error: {0}")]
    PageError(String),

    #[error("Screenshot capture failed: {0}")]
    CaptureFailed(String),

    #[error("Screenshot storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ReaderError {
    /// Errors caused by the caller's input rather than by the browser or the
    /// environment.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ReaderError::InvalidUrl(_))
    }

    /// Errors that end a scrape with a failure snapshot.
    pub fn is_navigation_failure(&self) -> bool {
        matches!(
            self,
            ReaderError::BrowserLaunchFailed(_)
                | ReaderError::SessionUnavailable(_)
                | ReaderError::NavigationFailed(_)
                | ReaderError::NavigationTimeout(_)
                | ReaderError::PageError(_)
        )
    }
}

/// Expected, named outcomes of best-effort steps. These never fail a request;
/// the step's contribution is simply left out.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Ignored {
    #[error("selector `{selector}` did not appear within {} ms", .budget.as_millis())]
    SelectorMissing { selector: String, budget: Duration },

    #[error("document has no readable article content")]
    NotReadable,

    #[error("article extraction failed: {0}")]
    ExtractionFailed(String),
}

impl From<std::io::Error> for ReaderError {
    fn from(err: std::io::Error) -> Self {
        ReaderError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ReaderError {
    fn from(err: serde_json::Error) -> Self {
        ReaderError::Serialization(err.to_string())
    }
}

impl From<chromiumoxide::error::CdpError> for ReaderError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        ReaderError::PageError(err.to_string())
    }
}
