//! HTML parser for listing and detail pages
//!
//! This module handles parsing HTML content to extract:
//! - Candidate item URLs from listing pages (configured link selector)
//! - Title, structured fields, body text and image URLs from detail pages

use crate::config::DetailConfig;
use crate::url::resolve_candidate;
use crate::HarvestError;
use scraper::{ElementRef, Html, Selector};
use std::collections::{BTreeMap, HashSet};
use url::Url;

/// Extracted information from a detail page
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDetail {
    pub title: Option<String>,

    /// Field name to text, for each configured selector that matched
    pub fields: BTreeMap<String, String>,

    /// Text of the body element(s), one text node per line
    pub body_text: String,

    /// Absolute URLs of images inside the body
    pub image_urls: Vec<String>,
}

fn parse_selector(selector: &str, url: &Url) -> Result<Selector, HarvestError> {
    Selector::parse(selector).map_err(|e| HarvestError::Parse {
        url: url.to_string(),
        message: format!("invalid selector {:?}: {:?}", selector, e),
    })
}

/// Collapses an element's text into a single trimmed line
fn inline_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extracts canonical candidate URLs from a listing page
///
/// Links are matched with `link_selector` (the selected elements must carry
/// an `href`). Duplicates are dropped and page order is kept.
///
/// # Example
///
/// ```no_run
/// use sumi_harvest::crawler::extract_candidates;
/// use url::Url;
///
/// let html = r#"<ul><li><a class="job" href="/job/1">One</a></li></ul>"#;
/// let base = Url::parse("https://example.com/jobs?page=1").unwrap();
/// let urls = extract_candidates(html, &base, "a.job").unwrap();
/// assert_eq!(urls, vec!["https://example.com/job/1".to_string()]);
/// ```
pub fn extract_candidates(
    html: &str,
    base_url: &Url,
    link_selector: &str,
) -> Result<Vec<String>, HarvestError> {
    let selector = parse_selector(link_selector, base_url)?;
    let document = Html::parse_document(html);

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if let Some(url) = resolve_candidate(href, base_url) {
            if seen.insert(url.clone()) {
                candidates.push(url);
            }
        }
    }

    Ok(candidates)
}

/// Parses a detail page
///
/// Fails with [`HarvestError::Parse`] when the body selector matches
/// nothing; such pages are skipped rather than stored empty.
pub fn parse_detail(
    html: &str,
    base_url: &Url,
    config: &DetailConfig,
) -> Result<ParsedDetail, HarvestError> {
    let document = Html::parse_document(html);

    let body_selector = parse_selector(&config.body_selector, base_url)?;
    let bodies: Vec<ElementRef<'_>> = document.select(&body_selector).collect();
    if bodies.is_empty() {
        return Err(HarvestError::Parse {
            url: base_url.to_string(),
            message: format!("no element matches {}", config.body_selector),
        });
    }

    let title_selector = parse_selector(&config.title_selector, base_url)?;
    let title = document
        .select(&title_selector)
        .map(inline_text)
        .find(|text| !text.is_empty())
        .or_else(|| {
            let fallback = Selector::parse("title").ok()?;
            document
                .select(&fallback)
                .map(inline_text)
                .find(|text| !text.is_empty())
        });

    let mut fields = BTreeMap::new();
    for (name, selector) in &config.fields {
        let selector = parse_selector(selector, base_url)?;
        if let Some(value) = document
            .select(&selector)
            .map(inline_text)
            .find(|text| !text.is_empty())
        {
            fields.insert(name.clone(), value);
        }
    }

    let body_text = bodies
        .iter()
        .flat_map(|body| body.text())
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    let image_selector = parse_selector(&config.image_selector, base_url)?;
    let mut image_urls = Vec::new();
    for body in &bodies {
        for image in body.select(&image_selector) {
            let Some(src) = image.value().attr("src") else {
                continue;
            };
            let src = src.trim();
            if src.is_empty() || src.starts_with("data:") {
                continue;
            }
            if let Ok(absolute) = base_url.join(src) {
                let absolute = absolute.to_string();
                if !image_urls.contains(&absolute) {
                    image_urls.push(absolute);
                }
            }
        }
    }

    Ok(ParsedDetail {
        title,
        fields,
        body_text,
        image_urls,
    })
}
