//! crates/storybook_core/src/slug.rs
//!
//! Derives the directory/file name of a story from its title.

use regex::Regex;
use std::sync::OnceLock;

/// Maximum length of a slug, in characters.
pub const SLUG_LIMIT: usize = 50;

fn disallowed() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-zA-Z0-9\s_]").expect("valid slug regex"))
}

fn separators() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[_\s]+").expect("valid separator regex"))
}

/// Lowercase, punctuation-stripped, hyphen-joined form of `title`, capped at
/// [`SLUG_LIMIT`] characters with no leading or trailing hyphen.
pub fn slugify(title: &str) -> String {
    let cleaned = disallowed().replace_all(title, "");
    let joined = separators().replace_all(cleaned.trim(), "-");
    let truncated: String = joined.to_lowercase().chars().take(SLUG_LIMIT).collect();
    truncated.trim_matches('-').to_string()
}
