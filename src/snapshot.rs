//! Page snapshots produced by a single page load

use serde::{Deserialize, Serialize};

/// Title every failure snapshot carries.
pub const FAILURE_TITLE: &str = "Error";

/// Best-effort "main content" recovered from a page.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedArticle {
    pub title: Option<String>,
    pub content: Option<String>,
    pub text_content: Option<String>,
    pub published_time: Option<String>,
}

/// Document properties read from the loaded page in one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct RawDocument {
    pub title: String,
    pub href: String,
    pub html: String,
    pub text: String,
}

/// Normalized capture of a single page load.
///
/// A snapshot is either a success (no `error`, content reflects the page) or a
/// failure (`error` set, title `"Error"`, empty html, text carrying the message,
/// nothing else). Use [`PageSnapshot::failure`] to build the latter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageSnapshot {
    pub title: String,
    /// Post-redirect location; the requested URL on failure.
    pub final_url: String,
    pub html: String,
    pub text: String,
    pub parsed_article: Option<ParsedArticle>,
    pub screenshot: Option<Vec<u8>>,
    pub full_page_screenshot: Option<Vec<u8>>,
    pub error: Option<String>,
}

impl PageSnapshot {
    pub fn success(document: RawDocument, parsed_article: Option<ParsedArticle>) -> Self {
        Self {
            title: document.title,
            final_url: document.href,
            html: document.html,
            text: document.text,
            parsed_article,
            screenshot: None,
            full_page_screenshot: None,
            error: None,
        }
    }

    pub fn failure(requested_url: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            title: FAILURE_TITLE.to_string(),
            final_url: requested_url.to_string(),
            html: String::new(),
            text: message.clone(),
            parsed_article: None,
            screenshot: None,
            full_page_screenshot: None,
            error: Some(message),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}
