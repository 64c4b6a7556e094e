//! Shared fixtures for integration tests.

#![allow(dead_code)]

pub mod socket_guard;

use bookfetch_core::{ArchiveClient, ArchiveSettings};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Hash of the first result on [`SEARCH_PAGE`].
pub const FIRST_HASH: &str = "d41d8cd98f00b204e9800998ecf8427e";
/// Hash of the second result on [`SEARCH_PAGE`].
pub const SECOND_HASH: &str = "9e107d9d372bb6826bd81d3542a419d6";

/// Archive search page with two result cards, shaped like the live site.
pub const SEARCH_PAGE: &str = r#"<!DOCTYPE html>
<html><body>
<main>
  <div class="h-[125] flex flex-col justify-center">
    <div class="flex pt-3 pb-3 border-b last:border-b-0 border-gray-100">
      <a href="/md5/d41d8cd98f00b204e9800998ecf8427e" class="custom-a block mr-2 sm:mr-4 hover:opacity-80">
        <img class="relative inline-block" src="https://covers.example/golang.jpg" alt="">
      </a>
      <div class="relative top-[-1] pl-4 grow overflow-hidden">
        <div class="text-gray-500 font-bold text-xs">English [en] · EPUB · 3.4MB · 2015 · 📘 Book (non-fiction)</div>
        <a href="/md5/d41d8cd98f00b204e9800998ecf8427e" class="js-vim-focus custom-a line-clamp-[3] text-lg font-bold">The Go Programming Language</a>
        <a href="/search?q=%22Alan+Donovan%22" class="custom-a line-clamp-[2] text-sm">👤 Alan A. A. Donovan, Brian W. Kernighan</a>
      </div>
    </div>
    <div class="flex pt-3 pb-3 border-b last:border-b-0 border-gray-100">
      <a href="/md5/9e107d9d372bb6826bd81d3542a419d6" class="custom-a block mr-2 sm:mr-4 hover:opacity-80">
        <div class="js-aarecord-list-fallback-cover" style="background-color: #6b7">
          <div class="font-bold text-violet-900">Concurrency in Go</div>
          <div class="font-bold text-amber-900">Katherine Cox-Buday</div>
        </div>
      </a>
      <div class="relative top-[-1] pl-4 grow overflow-hidden">
        <div class="text-gray-500 font-bold text-xs">[en] · PDF · 11.2MB · 2017 Save (function(){ window.track(); })()</div>
        <a href="/md5/9e107d9d372bb6826bd81d3542a419d6" class="js-vim-focus custom-a line-clamp-[3] text-lg font-bold">Concurrency in Go</a>
      </div>
    </div>
  </div>
</main>
</body></html>"#;

/// Client pointed at `server` with default timeouts.
pub fn client_for(server: &MockServer) -> ArchiveClient {
    ArchiveClient::new(&ArchiveSettings::with_base_url(server.uri()))
        .expect("archive client should build")
}

/// Serves [`SEARCH_PAGE`] for every search query.
pub async fn mount_search_page(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(SEARCH_PAGE.as_bytes().to_vec(), "text/html; charset=utf-8"),
        )
        .mount(server)
        .await;
}

/// Answers the resolver for `hash` with `body` as JSON.
pub async fn mount_resolver(server: &MockServer, hash: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/dyn/api/fast_download.json"))
        .and(query_param("md5", hash))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Serves `bytes` at `file_path` on `server`.
pub async fn mount_file(server: &MockServer, file_path: &str, bytes: &[u8]) {
    Mock::given(method("GET"))
        .and(path(file_path))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes.to_vec()))
        .mount(server)
        .await;
}
