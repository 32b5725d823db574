use crate::url::normalize::normalize_parsed;
use std::collections::HashSet;
use url::Url;

/// Placeholder href emitted by some client-side frameworks before hydration
const UNDEFINED_HREF: &str = "/undefined";

/// Resolves and filters raw hrefs into a deduplicated set of absolute URLs
///
/// # Exclusion Rules
///
/// - empty hrefs
/// - fragment-only links (`#section`)
/// - `javascript:` and `mailto:` links
/// - the `/undefined` placeholder
/// - anything that does not resolve to a valid absolute http(s) URL
///   (logged at warn level and dropped)
///
/// Relative references are resolved against `base`. Results are normalized,
/// so two hrefs that differ only by fragment collapse into one URL.
///
/// # Examples
///
/// ```
/// use driftnet::url::sanitize_links;
/// use url::Url;
///
/// let base = Url::parse("http://example.com").unwrap();
/// let links = sanitize_links(&base, ["/ok", "#top", "mailto:a@b.com"]);
/// assert_eq!(links.len(), 1);
/// assert_eq!(links[0].as_str(), "http://example.com/ok");
/// ```
pub fn sanitize_links<I, S>(base: &Url, hrefs: I) -> Vec<Url>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for href in hrefs {
        let Some(url) = resolve_href(base, href.as_ref()) else {
            continue;
        };

        if seen.insert(url.as_str().to_string()) {
            links.push(url);
        }
    }

    links
}

/// Resolves a single href, returning None if it should be dropped
fn resolve_href(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') || href == UNDEFINED_HREF {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if lowered.starts_with("javascript:") || lowered.starts_with("mailto:") {
        return None;
    }

    let joined = match base.join(href) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!("Skipped invalid link {} (base {}): {}", href, base, e);
            return None;
        }
    };

    match normalize_parsed(joined) {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::warn!("Skipped invalid link {}: {}", href, e);
            None
        }
    }
}
