//! URL handling module for Sumi-Harvest
//!
//! Every candidate URL is reduced to a canonical form before it is checked
//! against or written to the store, so the same item reached through
//! different links is only harvested once.

mod normalize;

use url::Url;

// Re-export main functions
pub use normalize::normalize_url;

/// Resolves an href found on `base` into a canonical absolute URL
///
/// Returns None for hrefs that never point at an item page (empty,
/// fragment-only, `javascript:`, `mailto:`, `tel:`, `data:`) and for anything
/// that fails to normalize.
pub fn resolve_candidate(href: &str, base: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    let absolute = base.join(href).ok()?;
    normalize_url(absolute.as_str()).ok().map(String::from)
}
