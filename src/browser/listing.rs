//! HTML directory index parsing

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static HREF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<a\s[^>]*?href\s*=\s*["']?([^"'\s>]+)"#).expect("static regex")
});

/// Extract every anchor `href` from an HTML page, in document order.
pub fn extract_hrefs(html: &str) -> Vec<&str> {
    HREF.captures_iter(html)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect()
}

/// Whether an href points at an entry inside the listed directory
fn is_relative_entry(href: &str) -> bool {
    !(href.starts_with('/')
        || href.starts_with('?')
        || href.starts_with('#')
        || href.starts_with("../")
        || href.contains("://"))
}

/// Files in an index page whose names end with `.{extension}`, joined onto `location`.
///
/// Parent links, sort links and absolute URLs are ignored; repeated
/// links to the same file are reported once.
pub fn extract_files(location: &str, html: &str, extension: &str) -> Vec<String> {
    let suffix = format!(".{extension}");
    let base = location.trim_end_matches('/');
    let mut seen = HashSet::new();

    extract_hrefs(html)
        .into_iter()
        .filter(|href| is_relative_entry(href))
        .filter(|href| href.ends_with(&suffix))
        .filter(|href| seen.insert(*href))
        .map(|href| format!("{base}/{href}"))
        .collect()
}
