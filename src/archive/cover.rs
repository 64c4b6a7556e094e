//! Cover extraction as an ordered rule list.
//!
//! Result cards come in several shapes; each rule knows one of them and the
//! first rule that produces a cover wins.

use scraper::ElementRef;
use url::Url;

use super::record::{Cover, FallbackCover};
use super::selectors::{ANCHOR, COVER_LINK, FALLBACK_AUTHOR, FALLBACK_COVER, FALLBACK_TITLE, IMG};

/// A single cover heuristic, applied to a result card.
pub type CoverRule = fn(ElementRef<'_>, &Url) -> Option<Cover>;

/// Rules in priority order, named for tracing and tests.
pub const COVER_RULES: &[(&str, CoverRule)] = &[
    ("cover_link_image", cover_link_image),
    ("fallback_block", fallback_block),
    ("card_image", card_image),
    ("image_anchor", image_anchor),
    ("parent_image", parent_image),
];

/// Runs [`COVER_RULES`] against `card`, stopping at the first match.
#[must_use]
pub fn extract_cover(card: ElementRef<'_>, page_url: &Url) -> Option<Cover> {
    COVER_RULES.iter().find_map(|(name, rule)| {
        let cover = rule(card, page_url);
        if cover.is_some() {
            tracing::trace!(rule = name, "cover rule matched");
        }
        cover
    })
}

/// Image inside the dedicated cover link.
pub fn cover_link_image(card: ElementRef<'_>, page_url: &Url) -> Option<Cover> {
    let link = card.select(&COVER_LINK).next()?;
    first_image(link, page_url)
}

/// Synthetic placeholder block inside the cover link, with background style,
/// title, and author.
pub fn fallback_block(card: ElementRef<'_>, _page_url: &Url) -> Option<Cover> {
    let link = card.select(&COVER_LINK).next()?;
    let block = link.select(&FALLBACK_COVER).next()?;
    let fallback = FallbackCover {
        background: non_empty(block.value().attr("style").unwrap_or_default()),
        title: block.select(&FALLBACK_TITLE).next().and_then(text_of),
        author: block.select(&FALLBACK_AUTHOR).next().and_then(text_of),
    };
    if fallback == FallbackCover::default() {
        return None;
    }
    Some(Cover::Fallback(fallback))
}

/// Any image anywhere in the card.
pub fn card_image(card: ElementRef<'_>, page_url: &Url) -> Option<Cover> {
    first_image(card, page_url)
}

/// Image inside any anchor whose markup contains an `<img>` tag.
pub fn image_anchor(card: ElementRef<'_>, page_url: &Url) -> Option<Cover> {
    card.select(&ANCHOR)
        .filter(|anchor| anchor.inner_html().contains("<img"))
        .find_map(|anchor| first_image(anchor, page_url))
}

/// Image in the card's parent element.
pub fn parent_image(card: ElementRef<'_>, page_url: &Url) -> Option<Cover> {
    let parent = card.parent().and_then(ElementRef::wrap)?;
    first_image(parent, page_url)
}

fn first_image(scope: ElementRef<'_>, page_url: &Url) -> Option<Cover> {
    scope
        .select(&IMG)
        .filter_map(|img| img.value().attr("src"))
        .map(str::trim)
        .find(|src| !src.is_empty())
        .and_then(|src| page_url.join(src).ok())
        .map(|url| Cover::Image {
            url: url.to_string(),
        })
}

fn text_of(element: ElementRef<'_>) -> Option<String> {
    non_empty(&element.text().collect::<String>())
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}
