use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use tokio::sync::Semaphore;
use unicode_segmentation::UnicodeSegmentation;

use crate::config::ContentConfig;
use crate::error::{BrainError, Result};
use crate::web::cache::{fetch_key, search_key, ContentCache};

/// Most URLs a single batch fetch will touch.
pub const MAX_URLS: usize = 50;
/// Most queries a single batch search will run.
pub const MAX_QUERIES: usize = 3;

const MAX_CONNECTIONS: usize = 20;

/// pure.md client: page fetches and web searches rendered as markdown.
///
/// One pooled HTTP client is shared by every call. Batch calls fan out
/// concurrently, capped by `max_parallel`, and never fail as a whole: an
/// item that errors maps to an empty string.
#[derive(Clone)]
pub struct ContentClient {
    http: Client,
    base_url: String,
    max_chars_per_result: usize,
    limiter: Arc<Semaphore>,
    cache: ContentCache,
}

impl ContentClient {
    pub fn new(config: &ContentConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(ref api_key) = config.api_key {
            headers.insert(
                "x-puremd-api-token",
                HeaderValue::from_str(api_key)
                    .map_err(|e| BrainError::Config(format!("Invalid PUREMD_API_KEY: {e}")))?,
            );
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(MAX_CONNECTIONS)
            .default_headers(headers)
            .build()
            .map_err(|e| BrainError::Content(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_chars_per_result: config.max_chars_per_result,
            limiter: Arc::new(Semaphore::new(config.max_parallel.max(1))),
            cache: ContentCache::new(
                config.cache_size,
                Duration::from_secs(config.cache_ttl_secs),
            ),
        })
    }

    /// Fetch one page. Blank input and non-200 answers give an empty string.
    pub async fn fetch_url(&self, url: &str) -> Result<String> {
        let url = url.trim();
        if url.is_empty() {
            return Ok(String::new());
        }

        let key = fetch_key(url);
        if let Some(cached) = self.cache.get(&key) {
            tracing::debug!(url = %url, "Content cache hit");
            return Ok(cached);
        }

        let response = self
            .http
            .get(format!("{}/{}", self.base_url, url))
            .send()
            .await
            .map_err(request_error)?;

        if response.status() != reqwest::StatusCode::OK {
            tracing::debug!(url = %url, status = %response.status(), "Fetch returned non-200");
            return Ok(String::new());
        }

        let text = response.text().await?;
        self.cache.put(key, text.clone());
        Ok(text)
    }

    /// Run one web search. HTTP error statuses surface as errors.
    pub async fn search(&self, query: &str) -> Result<String> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(String::new());
        }

        let key = search_key(query);
        if let Some(cached) = self.cache.get(&key) {
            tracing::debug!(query = %query, "Content cache hit");
            return Ok(cached);
        }

        let response = self
            .http
            .get(format!("{}/search", self.base_url))
            .query(&[("q", query)])
            .send()
            .await
            .map_err(request_error)?
            .error_for_status()?;

        let text = response.text().await?;
        self.cache.put(key, text.clone());
        Ok(text)
    }

    /// Fetch several pages concurrently. Duplicates are dropped (first
    /// occurrence wins) and at most [`MAX_URLS`] are fetched.
    pub async fn fetch_urls(&self, urls: &[String]) -> HashMap<String, String> {
        let started = Instant::now();
        let urls = dedup_capped(urls, MAX_URLS);

        let results = join_all(urls.iter().map(|url| async move {
            let text = match self.limiter.acquire().await {
                Ok(_permit) => self.fetch_url(url).await.unwrap_or_else(|e| {
                    tracing::debug!(url = %url, error = %e, "Fetch failed");
                    String::new()
                }),
                Err(_) => String::new(),
            };
            (url.clone(), self.truncate(&text))
        }))
        .await;

        tracing::info!(
            count = urls.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fetched URLs"
        );
        results.into_iter().collect()
    }

    /// Run several searches concurrently, at most [`MAX_QUERIES`].
    pub async fn search_multi(&self, queries: &[String]) -> HashMap<String, String> {
        let started = Instant::now();
        let queries = dedup_capped(queries, MAX_QUERIES);

        let results = join_all(queries.iter().map(|query| async move {
            let text = match self.limiter.acquire().await {
                Ok(_permit) => self.search(query).await.unwrap_or_else(|e| {
                    tracing::debug!(query = %query, error = %e, "Search failed");
                    String::new()
                }),
                Err(_) => String::new(),
            };
            (query.clone(), self.truncate(&text))
        }))
        .await;

        tracing::info!(
            count = queries.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Searched queries"
        );
        results.into_iter().collect()
    }

    /// Cut to the per-result budget on a grapheme boundary.
    pub fn truncate(&self, text: &str) -> String {
        truncate_graphemes(text, self.max_chars_per_result)
    }
}

fn request_error(error: reqwest::Error) -> BrainError {
    if error.is_timeout() {
        BrainError::Timeout(format!("Content request timed out: {error}"))
    } else {
        BrainError::Http(error)
    }
}

fn dedup_capped(items: &[String], cap: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .iter()
        .filter(|item| seen.insert(item.as_str()))
        .take(cap)
        .cloned()
        .collect()
}

pub fn truncate_graphemes(text: &str, max: usize) -> String {
    match text.grapheme_indices(true).nth(max) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}
