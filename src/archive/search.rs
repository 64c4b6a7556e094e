//! Search page traversal.
//!
//! Every link into a detail page (`/md5/<hash>`) is a candidate result. Links
//! with the title marker class are visited first so that, when a card links
//! to the same book several times, the title link is the one kept.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use scraper::{ElementRef, Html};
use tracing::{debug, instrument};
use url::Url;

use super::cover::extract_cover;
use super::meta::{clean_format, clean_meta_text, extract_meta_information, is_meta_candidate};
use super::selectors::{DIV, HASH_IN_HREF, MARKED_RESULT_LINK, RESULT_LINK};
use super::{ArchiveClient, ArchiveError, SearchResult};

/// Marker the archive prefixes author names with.
const AUTHOR_ICON: &str = "👤";

/// Element name of result card containers.
const CARD_TAG: &str = "div";
/// Class carried by result card containers.
const CARD_CLASS: &str = "flex";

/// Append-only result list deduplicated by link `href`.
///
/// Safe to share between threads; every claim and append takes the lock.
#[derive(Debug, Default)]
pub struct ResultCollector {
    inner: Mutex<CollectorState>,
}

#[derive(Debug, Default)]
struct CollectorState {
    seen: HashSet<String>,
    results: Vec<SearchResult>,
}

impl ResultCollector {
    /// Records `href` as visited. Returns false if it was already claimed.
    pub fn claim(&self, href: &str) -> bool {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        state.seen.insert(href.to_string())
    }

    pub fn push(&self, result: SearchResult) {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        state.results.push(result);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        let state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        state.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consumes the collector, returning results in discovery order.
    #[must_use]
    pub fn into_results(self) -> Vec<SearchResult> {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .results
    }
}

/// Parses a search results page into records.
///
/// `page_url` is the URL the page was served from; relative links and image
/// sources are resolved against it. Links outside a result card are ignored.
#[must_use]
pub fn parse_search_results(html: &str, page_url: &Url) -> Vec<SearchResult> {
    let document = Html::parse_document(html);
    let collector = ResultCollector::default();

    for pass in [&*MARKED_RESULT_LINK, &*RESULT_LINK] {
        for anchor in document.select(pass) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            if !collector.claim(href) {
                continue;
            }
            if let Some(result) = extract_result(anchor, href, page_url) {
                collector.push(result);
            }
        }
    }

    collector.into_results()
}

fn extract_result(anchor: ElementRef<'_>, href: &str, page_url: &Url) -> Option<SearchResult> {
    let card = find_card(anchor)?;
    let hash = hash_from_href(href)?;
    let url = page_url.join(href).ok()?.to_string();

    let meta = extract_meta_line(card)
        .map(|line| extract_meta_information(&line))
        .unwrap_or_default();
    let format = meta
        .format
        .map(|f| clean_format(&f))
        .filter(|f| !f.is_empty());

    Some(SearchResult {
        hash,
        url,
        title: non_empty(&anchor.text().collect::<String>()),
        authors: extract_authors(anchor),
        publisher: None,
        language: meta.language,
        format,
        size: meta.size,
        cover: extract_cover(card, page_url),
    })
}

/// Nearest enclosing result card.
fn find_card(anchor: ElementRef<'_>) -> Option<ElementRef<'_>> {
    anchor.ancestors().filter_map(ElementRef::wrap).find(|el| {
        el.value().name() == CARD_TAG && el.value().classes().any(|class| class == CARD_CLASS)
    })
}

/// Content hash from a detail link, relative or absolute.
#[must_use]
pub fn hash_from_href(href: &str) -> Option<String> {
    HASH_IN_HREF
        .captures(href)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|hash| !hash.is_empty())
}

/// Authors come from the element right after the title link, when it is a link.
fn extract_authors(anchor: ElementRef<'_>) -> Option<String> {
    let next = anchor.next_siblings().find_map(ElementRef::wrap)?;
    if next.value().name() != "a" {
        return None;
    }
    non_empty(&next.text().collect::<String>().replace(AUTHOR_ICON, ""))
}

/// Last `div` in the card whose text looks like a meta line, cleaned.
fn extract_meta_line(card: ElementRef<'_>) -> Option<String> {
    card.select(&DIV)
        .filter_map(|div| {
            let text = div.text().collect::<String>();
            let text = text.trim();
            if is_meta_candidate(text) {
                clean_meta_text(text)
            } else {
                None
            }
        })
        .last()
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

impl ArchiveClient {
    /// Runs a search and returns every result on the first page.
    ///
    /// Zero results is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Network`]/[`ArchiveError::Timeout`] on transport
    /// failure and [`ArchiveError::HttpStatus`] on a non-success response.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ArchiveError> {
        let url = self.search_url(query)?;
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ArchiveError::network(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ArchiveError::http_status(url.as_str(), status.as_u16()));
        }

        let page_url = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(|e| ArchiveError::network(url.as_str(), e))?;

        let results = parse_search_results(&body, &page_url);
        debug!(count = results.len(), "search page parsed");
        Ok(results)
    }

    /// Looks up a single book by hash.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::NotFound`] if no result carries `hash`, or any
    /// error from [`ArchiveClient::search`].
    #[instrument(skip(self))]
    pub async fn book_metadata(&self, hash: &str) -> Result<SearchResult, ArchiveError> {
        self.search(hash)
            .await?
            .into_iter()
            .find(|result| result.hash == hash)
            .ok_or_else(|| ArchiveError::NotFound {
                hash: hash.to_string(),
            })
    }
}
