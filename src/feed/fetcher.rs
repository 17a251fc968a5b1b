use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use reqwest::header::{CACHE_CONTROL, USER_AGENT};
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use thiserror::Error;

use crate::feed::FeedSource;
use crate::storage::{Store, StoreError};
use crate::util::panic_message;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Default concurrent fetch limit.
pub const DEFAULT_MAX_WORKERS: usize = 5;

/// Default `User-Agent` sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("feedcast/", env!("CARGO_PKG_VERSION"));

/// Errors that can occur while downloading and storing one URL.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured per-fetch ceiling
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// Downloaded content could not be written to storage
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
    /// The worker fetching this feed panicked
    #[error("Fetch panicked: {0}")]
    Panicked(String),
}

/// Downloads the raw body of a URL.
#[async_trait]
pub trait FeedClient: Send + Sync {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// [`FeedClient`] over `reqwest` with the fixed header set and a hard
/// timeout per request.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    user_agent: String,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(user_agent: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()?;
        Ok(Self::with_client(client, user_agent, timeout))
    }

    /// Wrap an existing client (allows custom configuration).
    pub fn with_client(
        client: reqwest::Client,
        user_agent: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            user_agent: user_agent.into(),
            timeout,
        }
    }
}

#[async_trait]
impl FeedClient for HttpClient {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let request = self
            .client
            .get(url)
            .header(USER_AGENT, self.user_agent.as_str())
            .header(CACHE_CONTROL, "max-age=0");

        // The ceiling covers the whole exchange, body included.
        tokio::time::timeout(self.timeout, async {
            let response = request.send().await?;
            if !response.status().is_success() {
                return Err(FetchError::HttpStatus(response.status().as_u16()));
            }
            read_limited_bytes(response, MAX_FEED_SIZE).await
        })
        .await
        .map_err(|_| FetchError::Timeout)?
    }
}

/// Result of fetching one feed.
#[derive(Debug)]
pub struct FetchResult {
    pub name: String,
    /// When the batch this feed belonged to started
    pub started_at: DateTime<Utc>,
    /// Number of URLs stored, or the error that stopped the feed
    pub result: Result<usize, FetchError>,
}

/// Fetch every feed of `batch`, at most `max_workers` at a time.
///
/// URLs of one feed are fetched in order and the first failure abandons the
/// rest of that feed. Failures never affect other feeds, and a panicking
/// worker only fails its own feed. Results are returned
/// in completion order; applying them to the registry is left to the caller
/// so workers never touch shared state.
pub async fn fetch_batch(
    client: &dyn FeedClient,
    store: &dyn Store,
    batch: Vec<FeedSource>,
    max_workers: usize,
    started_at: DateTime<Utc>,
) -> Vec<FetchResult> {
    if batch.is_empty() {
        return Vec::new();
    }

    let names: Vec<&str> = batch.iter().map(|f| f.name.as_str()).collect();
    tracing::info!(feeds = %names.join(", "), "Fetching feeds");

    stream::iter(batch)
        .map(|feed| async move {
            let result = AssertUnwindSafe(fetch_source(client, store, &feed))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(FetchError::Panicked(panic_message(panic))));
            if let Err(e) = &result {
                tracing::warn!(feed = %feed.name, error = %e, "Feed fetch failed");
            }
            FetchResult {
                name: feed.name,
                started_at,
                result,
            }
        })
        .buffer_unordered(max_workers.max(1))
        .collect()
        .await
}

/// Download each URL of `feed` into its storage location, overwriting what
/// was there.
pub async fn fetch_source(
    client: &dyn FeedClient,
    store: &dyn Store,
    feed: &FeedSource,
) -> Result<usize, FetchError> {
    let mut stored = 0;
    for (url, location) in feed.urls.iter().zip(&feed.locations) {
        let bytes = client.get(url).await?;
        tracing::debug!(feed = %feed.name, url = %url, bytes = bytes.len(), "Fetched");
        store.write(location, &bytes).await?;
        stored += 1;
    }
    Ok(stored)
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Template;
    use crate::storage::MemoryStore;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item><guid>1</guid><title>Test</title></item>
</channel></rss>"#;

    fn feed(name: &str, urls: &[String]) -> FeedSource {
        FeedSource::new(
            name,
            urls.to_vec(),
            vec!["#test".to_string()],
            Template::default(),
            Duration::from_secs(300),
        )
    }

    fn http() -> HttpClient {
        HttpClient::new(DEFAULT_USER_AGENT, Duration::from_secs(5)).unwrap()
    }

    /// Scripted client that tracks how many requests are in flight.
    #[derive(Default)]
    struct ScriptedClient {
        responses: HashMap<String, Result<Vec<u8>, u16>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl FeedClient for ScriptedClient {
        async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.calls.lock().unwrap().push(url.to_string());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            match self.responses.get(url) {
                Some(Ok(body)) => Ok(body.clone()),
                Some(Err(status)) => Err(FetchError::HttpStatus(*status)),
                None => Ok(VALID_RSS.as_bytes().to_vec()),
            }
        }
    }

    #[tokio::test]
    async fn test_fetch_sends_fixed_headers_and_stores_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .and(header("cache-control", "max-age=0"))
            .and(header("user-agent", DEFAULT_USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .expect(1)
            .mount(&mock_server)
            .await;

        let store = MemoryStore::new();
        let f = feed("news", &[format!("{}/feed", mock_server.uri())]);

        let stored = fetch_source(&http(), &store, &f).await.unwrap();
        assert_eq!(stored, 1);
        assert_eq!(
            store.read("news.0.feed").await.unwrap().as_deref(),
            Some(VALID_RSS.as_bytes())
        );
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let result = http().get(&format!("{}/feed", mock_server.uri())).await;
        match result {
            Err(FetchError::HttpStatus(404)) => {}
            other => panic!("Expected HttpStatus(404), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let client = HttpClient::new(DEFAULT_USER_AGENT, Duration::from_millis(200)).unwrap();
        let result = client.get(&format!("{}/feed", mock_server.uri())).await;
        assert!(matches!(result, Err(FetchError::Timeout)));
    }

    #[tokio::test]
    async fn test_first_failure_abandons_remaining_urls() {
        let mut client = ScriptedClient::default();
        client
            .responses
            .insert("https://a/1".to_string(), Err(500));

        let store = MemoryStore::new();
        let f = feed(
            "multi",
            &[
                "https://a/0".to_string(),
                "https://a/1".to_string(),
                "https://a/2".to_string(),
            ],
        );

        let result = fetch_source(&client, &store, &f).await;
        assert!(matches!(result, Err(FetchError::HttpStatus(500))));
        assert_eq!(
            *client.calls.lock().unwrap(),
            vec!["https://a/0".to_string(), "https://a/1".to_string()]
        );
        assert_eq!(store.keys(), vec!["multi.0.feed".to_string()]);
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let mut client = ScriptedClient::default();
        client.responses.insert("https://bad/".to_string(), Err(503));

        let store = MemoryStore::new();
        let batch = vec![
            feed("bad", &["https://bad/".to_string()]),
            feed("good", &["https://good/".to_string()]),
        ];

        let results = fetch_batch(&client, &store, batch, 5, Utc::now()).await;
        assert_eq!(results.len(), 2);
        for r in &results {
            match r.name.as_str() {
                "bad" => assert!(r.result.is_err()),
                "good" => assert_eq!(r.result.as_ref().unwrap(), &1),
                other => panic!("unexpected feed {other}"),
            }
        }
        assert_eq!(store.keys(), vec!["good.0.feed".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrency_bounded_by_workers() {
        let client = ScriptedClient::default();
        let store = MemoryStore::new();
        let batch: Vec<_> = (0..12)
            .map(|i| feed(&format!("f{i}"), &[format!("https://host/{i}")]))
            .collect();

        let results = fetch_batch(&client, &store, batch, 3, Utc::now()).await;

        assert_eq!(results.len(), 12);
        assert!(client.peak.load(Ordering::SeqCst) <= 3);
        assert!(client.peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_calls() {
        let client = ScriptedClient::default();
        let store = MemoryStore::new();

        let results = fetch_batch(&client, &store, Vec::new(), 5, Utc::now()).await;
        assert!(results.is_empty());
        assert!(client.calls.lock().unwrap().is_empty());
    }

    /// Panics on one URL, serves everything else.
    struct PanickingClient {
        inner: ScriptedClient,
        poisoned: &'static str,
    }

    #[async_trait]
    impl FeedClient for PanickingClient {
        async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            if url == self.poisoned {
                panic!("worker blew up on {url}");
            }
            self.inner.get(url).await
        }
    }

    #[tokio::test]
    async fn test_batch_contains_worker_panic() {
        let client = PanickingClient {
            inner: ScriptedClient::default(),
            poisoned: "https://boom/",
        };
        let store = MemoryStore::new();
        let batch = vec![
            feed("boom", &["https://boom/".to_string()]),
            feed("fine", &["https://fine/".to_string()]),
        ];

        let results = fetch_batch(&client, &store, batch, 2, Utc::now()).await;

        assert_eq!(results.len(), 2);
        for r in &results {
            match r.name.as_str() {
                "boom" => match &r.result {
                    Err(FetchError::Panicked(message)) => {
                        assert!(message.contains("https://boom/"))
                    }
                    other => panic!("expected a contained panic, got {other:?}"),
                },
                "fine" => assert_eq!(r.result.as_ref().unwrap(), &1),
                other => panic!("unexpected feed {other}"),
            }
        }
        assert_eq!(store.keys(), vec!["fine.0.feed".to_string()]);
    }
}
