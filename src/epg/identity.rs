//! Stable channel identifiers

use crate::config::ChannelSpec;
use regex::Regex;
use std::sync::LazyLock;

static RE_CHANNEL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"channel_id=(\d+)").expect("valid regex"));
static RE_NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));

/// Compute the id a channel is published under.
///
/// Priority: explicit `id`, then a numeric `channel_id=` parameter in the
/// feed URL, then a slug of the name.
pub fn resolve(spec: &ChannelSpec) -> String {
    if let Some(id) = spec.id.as_deref().filter(|id| !id.is_empty()) {
        return id.to_string();
    }
    if let Some(caps) = RE_CHANNEL_ID.captures(&spec.url) {
        return caps[1].to_string();
    }
    slugify(&spec.name)
}

/// Lowercase, collapse every run outside `[a-z0-9]` into one underscore, trim underscores
pub fn slugify(name: &str) -> String {
    let lower = name.to_lowercase();
    let slug = RE_NON_ALNUM.replace_all(&lower, "_");
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        // Names made only of punctuation or non-latin script still need an id
        return fallback_id(name);
    }
    slug.to_string()
}

fn fallback_id(name: &str) -> String {
    let hex: String = name
        .trim()
        .chars()
        .take(16)
        .map(|c| format!("{:x}", c as u32))
        .collect();
    if hex.is_empty() {
        "channel".to_string()
    } else {
        format!("ch_{}", hex)
    }
}
