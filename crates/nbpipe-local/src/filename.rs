//! Output filenames for delivered text.

use crate::rewrite::strip_notebook_ext;
use chrono::{DateTime, Utc};

pub const OUTPUT_SUFFIX: &str = "-for-llm.txt";

/// Filename for a whole-document download, stamped with the current time when needed.
pub fn derive_filename(page_url: &str, page_title: Option<&str>) -> String {
    derive_filename_at(page_url, page_title, Utc::now())
}

/// Prefer the notebook file name in the URL, then a slug of the page title, then a
/// timestamped fallback.
pub fn derive_filename_at(page_url: &str, page_title: Option<&str>, now: DateTime<Utc>) -> String {
    if let Some(stem) = notebook_stem(page_url) {
        return format!("{stem}{OUTPUT_SUFFIX}");
    }
    if let Some(slug) = page_title.map(slugify).filter(|s| !s.is_empty()) {
        return format!("{slug}{OUTPUT_SUFFIX}");
    }
    format!("notebook-content-for-llm-{}.txt", now.timestamp_millis())
}

/// `notebook-<model>-part<i>-of-<n>-<timestamp>.txt`
pub fn chunk_filename(model: &str, part: usize, total: usize, now: DateTime<Utc>) -> String {
    let model = match slugify(model) {
        s if s.is_empty() => "model".to_string(),
        s => s,
    };
    format!(
        "notebook-{model}-part{part}-of-{total}-{}.txt",
        now.format("%Y-%m-%dT%H-%M-%S-%3fZ")
    )
}

fn notebook_stem(page_url: &str) -> Option<String> {
    page_url
        .split('/')
        .map(|seg| seg.split(['?', '#']).next().unwrap_or(seg))
        .find_map(strip_notebook_ext)
        .filter(|stem| !stem.trim().is_empty())
        .map(|stem| stem.to_string())
}

/// Keep word chars, whitespace and hyphens; collapse whitespace runs to `-`; lowercase.
pub fn slugify(s: &str) -> String {
    let kept: String = s
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect();
    kept.split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}
