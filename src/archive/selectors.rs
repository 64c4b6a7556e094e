//! Static CSS selectors and patterns for the archive's result markup.

use std::sync::LazyLock;

use regex::Regex;
use scraper::Selector;

/// Compiles a static selector.
///
/// # Panics
///
/// Panics if `css` is invalid. Only used for compile-time-known selectors.
#[must_use]
pub fn compile_static_selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid static selector '{css}': {e}"))
}

/// Compiles a static regex.
///
/// # Panics
///
/// Panics if `pattern` is invalid. Only used for compile-time-known patterns.
#[must_use]
pub fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

/// Result title links carry this marker class.
pub static MARKED_RESULT_LINK: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("a[href*='/md5/'].js-vim-focus"));

/// Any link into a book detail page.
pub static RESULT_LINK: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("a[href*='/md5/']"));

pub static DIV: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("div"));
pub static IMG: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("img"));
pub static ANCHOR: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("a"));

/// Anchor wrapping the cover thumbnail.
pub static COVER_LINK: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("a.custom-a.block"));

/// Placeholder block rendered instead of a missing cover image.
pub static FALLBACK_COVER: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("div.js-aarecord-list-fallback-cover"));

pub static FALLBACK_TITLE: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("div.font-bold.text-violet-900"));

pub static FALLBACK_AUTHOR: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("div.font-bold.text-amber-900"));

/// Captures the hash segment of a detail link, absolute or relative.
pub static HASH_IN_HREF: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"/md5/([^/?#]+)"));
