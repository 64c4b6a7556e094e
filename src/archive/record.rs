//! Search result records.

use serde::{Deserialize, Serialize};

use crate::filename::PLACEHOLDER_TITLE;
use crate::store::BookMetadata;

/// One book found on a search results page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Content hash taken from the detail link.
    pub hash: String,
    /// Absolute detail-page URL.
    pub url: String,
    pub title: Option<String>,
    pub authors: Option<String>,
    pub publisher: Option<String>,
    pub language: Option<String>,
    pub format: Option<String>,
    pub size: Option<String>,
    pub cover: Option<Cover>,
}

impl SearchResult {
    /// Absolute cover image URL, when a real image was found.
    #[must_use]
    pub fn cover_url(&self) -> Option<&str> {
        match &self.cover {
            Some(Cover::Image { url }) => Some(url),
            _ => None,
        }
    }

    /// Encoded synthetic cover, when only the fallback block was found.
    #[must_use]
    pub fn cover_data(&self) -> Option<String> {
        match &self.cover {
            Some(Cover::Fallback(fallback)) => Some(fallback.encode()),
            _ => None,
        }
    }
}

/// Cover art for a result: a real image, or the page's synthetic placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Cover {
    Image { url: String },
    Fallback(FallbackCover),
}

/// Text-only placeholder the archive renders when it has no cover image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackCover {
    /// Inline style of the placeholder block (carries the background colour).
    pub background: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
}

impl FallbackCover {
    /// Serialises to `fallback:bg=<..>;title=<..>;author=<..>` with each
    /// value percent-encoded so `;` and `=` inside values stay unambiguous.
    #[must_use]
    pub fn encode(&self) -> String {
        let enc = |value: &Option<String>| {
            urlencoding::encode(value.as_deref().unwrap_or_default()).into_owned()
        };
        format!(
            "fallback:bg={};title={};author={}",
            enc(&self.background),
            enc(&self.title),
            enc(&self.author)
        )
    }
}

impl From<&SearchResult> for BookMetadata {
    fn from(result: &SearchResult) -> Self {
        Self {
            title: result
                .title
                .clone()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| PLACEHOLDER_TITLE.to_string()),
            authors: result.authors.clone(),
            publisher: result.publisher.clone(),
            language: result.language.clone(),
            format: result.format.clone(),
            size: result.size.clone(),
            cover_url: result.cover_url().map(str::to_string),
            cover_data: result.cover_data(),
        }
    }
}
