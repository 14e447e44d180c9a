use futures::StreamExt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

const ACCEPT_FEEDS: &str =
    "application/rss+xml, application/xml;q=0.9, text/xml;q=0.8, */*;q=0.5";

/// Network-layer failures for a single feed fetch.
///
/// Every variant carries the URL so failures can be logged without extra context.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, DNS, TLS or body-stream failure
    #[error("Request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// HTTP response with non-2xx status code
    #[error("{url} returned HTTP status {status}")]
    HttpStatus { url: String, status: u16 },
    /// The fetch did not finish before its deadline
    #[error("Request to {url} timed out after {after:?}")]
    Timeout { url: String, after: Duration },
    /// Response body exceeded the configured size limit
    #[error("Response from {url} exceeds {limit} bytes")]
    ResponseTooLarge { url: String, limit: usize },
    /// Received fewer bytes than Content-Length announced
    #[error("Incomplete response from {url}: expected {expected} bytes, received {received}")]
    IncompleteResponse {
        url: String,
        expected: u64,
        received: usize,
    },
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Client errors (4xx other than 429) and oversized bodies are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network { .. }
            | FetchError::Timeout { .. }
            | FetchError::IncompleteResponse { .. } => true,
            FetchError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            FetchError::ResponseTooLarge { .. } => false,
        }
    }
}

/// Anything that can retrieve the raw body of a feed URL.
pub trait FeedSource: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send;
}

/// [`FeedSource`] backed by a shared `reqwest` client.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_body_bytes: usize,
}

impl HttpFetcher {
    /// Build a fetcher whose client gives up after `timeout`.
    ///
    /// The scheduler applies its own deadline around each fetch as well; the
    /// client timeout only guards callers that use the fetcher directly.
    pub fn new(
        timeout: Duration,
        max_body_bytes: usize,
        user_agent: &str,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self::with_client(client, timeout, max_body_bytes))
    }

    /// Wrap a preconfigured client (proxies, extra headers). `timeout` is only
    /// used to label timeout errors; the client's own timeout governs requests.
    pub fn with_client(client: reqwest::Client, timeout: Duration, max_body_bytes: usize) -> Self {
        Self {
            client,
            timeout,
            max_body_bytes,
        }
    }

    fn network_error(&self, url: &str, source: reqwest::Error) -> FetchError {
        if source.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                after: self.timeout,
            }
        } else {
            FetchError::Network {
                url: url.to_string(),
                source,
            }
        }
    }
}

impl FeedSource for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, ACCEPT_FEEDS)
            .send()
            .await
            .map_err(|e| self.network_error(url, e))?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let bytes = read_limited_bytes(response, self.max_body_bytes)
            .await
            .map_err(|e| match e {
                BodyError::Network(source) => self.network_error(url, source),
                BodyError::TooLarge => FetchError::ResponseTooLarge {
                    url: url.to_string(),
                    limit: self.max_body_bytes,
                },
                BodyError::Incomplete { expected, received } => FetchError::IncompleteResponse {
                    url: url.to_string(),
                    expected,
                    received,
                },
            })?;

        tracing::debug!(url = %url, bytes = bytes.len(), "Fetched feed body");
        Ok(bytes)
    }
}

enum BodyError {
    Network(reqwest::Error),
    TooLarge,
    Incomplete { expected: u64, received: usize },
}

async fn read_limited_bytes(response: reqwest::Response, limit: usize) -> Result<Vec<u8>, BodyError> {
    let expected_length = response.content_length();

    // Fast path: reject on the declared length before streaming anything
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(BodyError::TooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(BodyError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(BodyError::TooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(BodyError::Incomplete {
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
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item><guid>1</guid><title>Test</title></item>
</channel></rss>"#;

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(Duration::from_secs(5), 1024 * 1024, "rssagg-test").unwrap()
    }

    #[tokio::test]
    async fn test_fetch_success_returns_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .and(header("user-agent", "rssagg-test"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("Content-Type", "application/rss+xml"),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let url = format!("{}/feed", mock_server.uri());
        let body = fetcher().fetch(&url).await.unwrap();
        assert_eq!(body, VALID_RSS.as_bytes());
    }

    #[tokio::test]
    async fn test_fetch_404_is_http_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let url = format!("{}/feed", mock_server.uri());
        match fetcher().fetch(&url).await.unwrap_err() {
            FetchError::HttpStatus { status: 404, url: u } => assert_eq!(u, url),
            e => panic!("Expected HttpStatus(404), got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_fetch_500_is_single_attempt() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&mock_server)
            .await;

        let url = format!("{}/feed", mock_server.uri());
        let err = fetcher().fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus { status: 500, .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_fetch_body_over_limit() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(2048)))
            .mount(&mock_server)
            .await;

        let small = HttpFetcher::new(Duration::from_secs(5), 1024, "rssagg-test").unwrap();
        let url = format!("{}/feed", mock_server.uri());
        let err = small.fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::ResponseTooLarge { limit: 1024, .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_is_network_error() {
        // Port 1 is reserved and nothing listens there
        let err = fetcher().fetch("http://127.0.0.1:1/feed").await.unwrap_err();
        assert!(matches!(err, FetchError::Network { .. }));
        assert!(err.to_string().contains("127.0.0.1:1"));
    }

    #[tokio::test]
    async fn test_client_timeout_maps_to_timeout() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let impatient =
            HttpFetcher::new(Duration::from_millis(100), 1024 * 1024, "rssagg-test").unwrap();
        let url = format!("{}/feed", mock_server.uri());
        let err = impatient.fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_with_client_uses_custom_client() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("x-feed-token", "secret"))
            .and(header("accept", ACCEPT_FEEDS))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("x-feed-token", reqwest::header::HeaderValue::from_static("secret"));
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .unwrap();
        let fetcher = HttpFetcher::with_client(client, Duration::from_secs(5), 1024 * 1024);

        let url = format!("{}/feed", mock_server.uri());
        let body = fetcher.fetch(&url).await.unwrap();
        assert_eq!(body, VALID_RSS.as_bytes());
    }

    #[test]
    fn test_transient_classification() {
        let status = |status| FetchError::HttpStatus {
            url: "u".into(),
            status,
        };
        assert!(status(429).is_transient());
        assert!(status(503).is_transient());
        assert!(!status(404).is_transient());
        assert!(!status(410).is_transient());
    }
}
