//! Web search provider seam and the Brave Web Search implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use orgscout_shared::{Result, ScoutError};

/// Default timeout in seconds for one search request.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Results requested per query. The planner trims further after filtering.
const DEFAULT_RESULT_COUNT: usize = 10;

/// User-Agent string for search requests.
const USER_AGENT: &str = concat!("orgscout/", env!("CARGO_PKG_VERSION"));

/// A web search backend: query in, ranked URLs out.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run one search. Fails on an empty query or a non-success response.
    async fn search(&self, query: &str) -> Result<Vec<String>>;
}

// ---------------------------------------------------------------------------
// Brave
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    url: String,
}

/// Brave Web Search API client.
pub struct BraveSearch {
    client: Client,
    endpoint: String,
    api_key: String,
    count: usize,
}

impl BraveSearch {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ScoutError::Search(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            count: DEFAULT_RESULT_COUNT,
        })
    }

    /// Number of results requested per query.
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count.max(1);
        self
    }
}

#[async_trait]
impl SearchProvider for BraveSearch {
    #[instrument(skip(self))]
    async fn search(&self, query: &str) -> Result<Vec<String>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ScoutError::Search("cannot search with empty query".into()));
        }

        let count = self.count.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("count", count.as_str())])
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .send()
            .await
            .map_err(|e| ScoutError::Search(format!("{query}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScoutError::Search(format!("{query}: HTTP {status}")));
        }

        let body: BraveResponse = response
            .json()
            .await
            .map_err(|e| ScoutError::Search(format!("{query}: malformed response: {e}")))?;

        let urls: Vec<String> = body
            .web
            .map(|web| web.results.into_iter().map(|r| r.url).collect())
            .unwrap_or_default();

        debug!(results = urls.len(), "search complete");
        Ok(urls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn brave(server: &MockServer) -> BraveSearch {
        BraveSearch::new(format!("{}/res/v1/web/search", server.uri()), "test-key").unwrap()
    }

    #[tokio::test]
    async fn returns_urls_in_rank_order() {
        let server = MockServer::start().await;

        let body = serde_json::json!({
            "web": { "results": [
                { "url": "https://acme.edu/faculty", "title": "Faculty" },
                { "url": "https://usnews.com/acme-profs", "title": "Profs" }
            ]}
        });

        Mock::given(method("GET"))
            .and(path("/res/v1/web/search"))
            .and(query_param("q", "Acme U professors"))
            .and(header("X-Subscription-Token", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let urls = brave(&server).await.search("Acme U professors").await.unwrap();
        assert_eq!(
            urls,
            vec!["https://acme.edu/faculty", "https://usnews.com/acme-profs"]
        );
    }

    #[tokio::test]
    async fn missing_web_section_is_empty() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let urls = brave(&server).await.search("Acme U events").await.unwrap();
        assert!(urls.is_empty());
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let server = MockServer::start().await;
        let err = brave(&server).await.search("   ").await.unwrap_err();
        assert!(matches!(err, ScoutError::Search(_)));
    }

    #[tokio::test]
    async fn non_success_status_fails() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = brave(&server).await.search("Acme U admissions").await.unwrap_err();
        assert!(err.to_string().contains("429"));
    }
}
