//! Best-effort readable article extraction
//!
//! Works on its own parse of the captured HTML, so nothing done here can touch
//! the live page. Every failure is an [`Ignored`] outcome: the caller simply
//! leaves the article out of the snapshot.

use crate::{Ignored, ParsedArticle};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;

/// Shortest main-content text, in characters, that counts as an article.
pub const MIN_ARTICLE_CHARS: usize = 140;

/// Paragraphs shorter than this do not vote for a container.
const MIN_PARAGRAPH_CHARS: usize = 25;

const SEMANTIC_CONTAINERS: &[&str] = &["article", "main", "[role=\"main\"]"];

const BOILERPLATE_TAGS: &[&str] = &["nav", "header", "footer", "aside", "form"];

const TITLE_META: &[&str] = &["meta[property=\"og:title\"]", "meta[name=\"twitter:title\"]"];

const PUBLISHED_META: &[&str] = &[
    "meta[property=\"article:published_time\"]",
    "meta[itemprop=\"datePublished\"]",
    "meta[name=\"pubdate\"]",
    "meta[name=\"date\"]",
];

pub fn extract_article(html: &str) -> Result<ParsedArticle, Ignored> {
    if html.trim().is_empty() {
        return Err(Ignored::NotReadable);
    }

    let document = Html::parse_document(html);
    let root = find_content_root(&document)?.ok_or(Ignored::NotReadable)?;

    let text_content = collapse_whitespace(root.text());
    if text_content.chars().count() < MIN_ARTICLE_CHARS {
        return Err(Ignored::NotReadable);
    }

    Ok(ParsedArticle {
        title: article_title(&document)?,
        content: Some(root.inner_html()),
        text_content: Some(text_content),
        published_time: published_time(&document)?,
    })
}

fn selector(css: &str) -> Result<Selector, Ignored> {
    Selector::parse(css).map_err(|e| Ignored::ExtractionFailed(format!("{css}: {e}")))
}

fn collapse_whitespace<'a>(text: impl Iterator<Item = &'a str>) -> String {
    text.collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn in_boilerplate(element: &ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| BOILERPLATE_TAGS.contains(&ancestor.value().name()))
}

fn find_content_root(document: &Html) -> Result<Option<ElementRef<'_>>, Ignored> {
    for css in SEMANTIC_CONTAINERS {
        let container = document
            .select(&selector(css)?)
            .map(|element| {
                let len = collapse_whitespace(element.text()).chars().count();
                (element, len)
            })
            .filter(|(_, len)| *len >= MIN_ARTICLE_CHARS)
            .max_by_key(|(_, len)| *len);

        if let Some((element, _)) = container {
            return Ok(Some(element));
        }
    }

    // Readability-style vote: each paragraph credits its parent fully and its
    // grandparent by half.
    let mut scores = HashMap::new();
    for paragraph in document.select(&selector("p")?) {
        if in_boilerplate(&paragraph) {
            continue;
        }
        let len = collapse_whitespace(paragraph.text()).chars().count();
        if len < MIN_PARAGRAPH_CHARS {
            continue;
        }

        let mut ancestors = paragraph.ancestors().filter_map(ElementRef::wrap);
        if let Some(parent) = ancestors.next() {
            *scores.entry((*parent).id()).or_insert(0usize) += len;
        }
        if let Some(grandparent) = ancestors.next() {
            *scores.entry((*grandparent).id()).or_insert(0usize) += len / 2;
        }
    }

    let best = scores
        .into_iter()
        .max_by_key(|(_, score)| *score)
        .and_then(|(id, _)| document.tree.get(id))
        .and_then(ElementRef::wrap);

    Ok(best)
}

fn first_meta_content(document: &Html, candidates: &[&str]) -> Result<Option<String>, Ignored> {
    for css in candidates {
        let value = document
            .select(&selector(css)?)
            .filter_map(|meta| meta.value().attr("content"))
            .map(str::trim)
            .find(|content| !content.is_empty());
        if let Some(value) = value {
            return Ok(Some(value.to_string()));
        }
    }
    Ok(None)
}

fn first_text(document: &Html, css: &str) -> Result<Option<String>, Ignored> {
    Ok(document
        .select(&selector(css)?)
        .map(|element| collapse_whitespace(element.text()))
        .find(|text| !text.is_empty()))
}

fn article_title(document: &Html) -> Result<Option<String>, Ignored> {
    if let Some(title) = first_meta_content(document, TITLE_META)? {
        return Ok(Some(title));
    }
    if let Some(title) = first_text(document, "title")? {
        return Ok(Some(title));
    }
    first_text(document, "h1")
}

fn published_time(document: &Html) -> Result<Option<String>, Ignored> {
    if let Some(published) = first_meta_content(document, PUBLISHED_META)? {
        return Ok(Some(published));
    }
    Ok(document
        .select(&selector("time[datetime]")?)
        .filter_map(|time| time.value().attr("datetime"))
        .map(str::trim)
        .find(|datetime| !datetime.is_empty())
        .map(str::to_string))
}
