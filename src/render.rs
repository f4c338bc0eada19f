//! Conversion of a [`PageSnapshot`] into the caller's output representation

use crate::{PageSnapshot, ResponseMode};
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;

/// Rendered view of a snapshot: always a title and url plus exactly one body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReaderResponse {
    pub title: String,
    pub url: String,
    #[serde(flatten)]
    pub body: ReaderBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReaderBody {
    /// Markdown
    Content(String),
    Html(String),
    Text(String),
    ScreenshotUrl(Option<String>),
    FullPageScreenshotUrl(Option<String>),
}

impl ReaderResponse {
    /// The textual payload for non-screenshot bodies.
    pub fn text_body(&self) -> Option<&str> {
        match &self.body {
            ReaderBody::Content(body) | ReaderBody::Html(body) | ReaderBody::Text(body) => {
                Some(body.as_str())
            }
            ReaderBody::ScreenshotUrl(_) | ReaderBody::FullPageScreenshotUrl(_) => None,
        }
    }

    /// The published screenshot reference, once patched in.
    pub fn screenshot_reference(&self) -> Option<&str> {
        match &self.body {
            ReaderBody::ScreenshotUrl(reference) | ReaderBody::FullPageScreenshotUrl(reference) => {
                reference.as_deref()
            }
            _ => None,
        }
    }

    /// Fills in the reference of a screenshot body. Text bodies are left as is.
    pub fn attach_screenshot_reference(&mut self, reference: String) {
        match &mut self.body {
            ReaderBody::ScreenshotUrl(slot) | ReaderBody::FullPageScreenshotUrl(slot) => {
                *slot = Some(reference);
            }
            _ => {}
        }
    }

    pub fn to_json(&self) -> Result<String, crate::ReaderError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Renders `snapshot` as `mode`. Pure: no I/O, no browser access.
pub fn render(snapshot: &PageSnapshot, mode: ResponseMode) -> ReaderResponse {
    let title = snapshot
        .parsed_article
        .as_ref()
        .and_then(|article| article.title.as_deref())
        .filter(|title| !title.is_empty())
        .unwrap_or(snapshot.title.as_str())
        .to_string();

    let body = match mode {
        ResponseMode::Markdown => ReaderBody::Content(to_markdown(&snapshot.title, &snapshot.html)),
        ResponseMode::Html => ReaderBody::Html(snapshot.html.clone()),
        ResponseMode::Text => ReaderBody::Text(snapshot.text.clone()),
        ResponseMode::Screenshot => ReaderBody::ScreenshotUrl(None),
        ResponseMode::Pageshot => ReaderBody::FullPageScreenshotUrl(None),
    };

    ReaderResponse {
        title,
        url: snapshot.final_url.clone(),
        body,
    }
}

fn text_content(element: ElementRef<'_>) -> String {
    element.text().collect()
}

/// Three fixed passes over the document: paragraphs, then links, then
/// headings. Output order follows the passes, not the document.
pub fn to_markdown(title: &str, html: &str) -> String {
    let document = Html::parse_document(html);
    let mut markdown = format!("# {title}\n\n");

    if let Ok(paragraphs) = Selector::parse("p") {
        for paragraph in document.select(&paragraphs) {
            markdown.push_str(&text_content(paragraph));
            markdown.push_str("\n\n");
        }
    }

    if let Ok(anchors) = Selector::parse("a") {
        for anchor in document.select(&anchors) {
            let href = anchor.value().attr("href").unwrap_or_default();
            let text = text_content(anchor);
            if !href.is_empty() && !text.is_empty() {
                markdown.push_str(&format!("[{text}]({href})"));
            }
        }
    }

    if let Ok(headings) = Selector::parse("h1, h2, h3, h4, h5, h6") {
        for heading in document.select(&headings) {
            let level = heading_level(heading.value().name());
            markdown.push('\n');
            markdown.push_str(&"#".repeat(level));
            markdown.push(' ');
            markdown.push_str(&text_content(heading));
            markdown.push_str("\n\n");
        }
    }

    markdown
}

fn heading_level(tag: &str) -> usize {
    tag.strip_prefix('h')
        .and_then(|level| level.parse().ok())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ParsedArticle, RawDocument};

    fn snapshot(html: &str) -> PageSnapshot {
        PageSnapshot::success(
            RawDocument {
                title: "Example Domain".to_string(),
                href: "https://example.com/".to_string(),
                html: html.to_string(),
                text: "Example Domain\nThis domain is for use.".to_string(),
            },
            None,
        )
    }

    #[test]
    fn test_markdown_passes_in_fixed_order() {
        let html = r#"<html><body>
            <h1>Heading</h1>
            <p>First <a href="/x">link</a> para</p>
            <h3>Sub</h3>
            <p>Second</p>
            <a href="">empty href</a><a href="/y"></a><a href="/z">Zed</a>
        </body></html>"#;

        let markdown = to_markdown("Title", html);
        assert_eq!(
            markdown,
            "# Title\n\nFirst link para\n\nSecond\n\n[link](/x)[Zed](/z)\n# Heading\n\n\n### Sub\n\n"
        );
    }

    #[test]
    fn test_markdown_keeps_empty_paragraphs() {
        let markdown = to_markdown("T", "<p></p><p>x</p>");
        assert_eq!(markdown, "# T\n\n\n\nx\n\n");
    }

    #[test]
    fn test_markdown_without_paragraphs() {
        let markdown = to_markdown("T", "<a href=\"/a\">A</a><h2>H</h2>");
        assert_eq!(markdown, "# T\n\n[A](/a)\n## H\n\n");

        assert_eq!(to_markdown("Blank", ""), "# Blank\n\n");
    }

    #[test]
    fn test_markdown_is_deterministic() {
        let snap = snapshot(
            r#"<h1>One</h1><p>Two <a href="/three">three</a></p><h4>Four</h4><p>Five</p>"#,
        );

        let first = render(&snap, ResponseMode::Markdown);
        let second = render(&snap, ResponseMode::Markdown);
        assert_eq!(first, second);
        assert_eq!(
            first.text_body().map(str::as_bytes),
            second.text_body().map(str::as_bytes)
        );
    }

    #[test]
    fn test_render_modes_pick_one_body() {
        let snap = snapshot("<html><body><p>Hi</p></body></html>");

        let html = render(&snap, ResponseMode::Html);
        assert_eq!(html.body, ReaderBody::Html(snap.html.clone()));
        assert_eq!(html.url, "https://example.com/");

        let text = render(&snap, ResponseMode::Text);
        assert_eq!(text.text_body(), Some(snap.text.as_str()));

        let markdown = render(&snap, ResponseMode::Markdown);
        assert_eq!(
            markdown.body,
            ReaderBody::Content("# Example Domain\n\nHi\n\n".to_string())
        );

        let shot = render(&snap, ResponseMode::Screenshot);
        assert_eq!(shot.body, ReaderBody::ScreenshotUrl(None));
        assert!(shot.text_body().is_none());
    }

    #[test]
    fn test_title_prefers_parsed_article() {
        let mut snap = snapshot("");
        snap.parsed_article = Some(ParsedArticle {
            title: Some("Readable".to_string()),
            ..Default::default()
        });
        assert_eq!(render(&snap, ResponseMode::Text).title, "Readable");

        snap.parsed_article = Some(ParsedArticle {
            title: Some(String::new()),
            ..Default::default()
        });
        assert_eq!(render(&snap, ResponseMode::Text).title, "Example Domain");
    }

    #[test]
    fn test_failure_snapshot_renders_error_title() {
        let snap = PageSnapshot::failure("https://nope.invalid/", "net::ERR_NAME_NOT_RESOLVED");

        let response = render(&snap, ResponseMode::Markdown);
        assert_eq!(response.title, "Error");
        assert_eq!(response.url, "https://nope.invalid/");
        assert_eq!(response.body, ReaderBody::Content("# Error\n\n".to_string()));
    }

    #[test]
    fn test_screenshot_reference_serializes_camel_case() {
        let mut response = render(&snapshot(""), ResponseMode::Pageshot);
        response.attach_screenshot_reference("/instant-screenshots/a.png".to_string());
        assert_eq!(
            response.screenshot_reference(),
            Some("/instant-screenshots/a.png")
        );

        let json: serde_json::Value = serde_json::from_str(&response.to_json().unwrap()).unwrap();
        assert_eq!(json["title"], "Example Domain");
        assert_eq!(json["url"], "https://example.com/");
        assert_eq!(json["fullPageScreenshotUrl"], "/instant-screenshots/a.png");
        assert!(json.get("content").is_none());
    }
}
