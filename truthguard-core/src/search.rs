//! Evidence retrieval against a trusted-source news index.
//!
//! Provides an `EvidenceRetriever` trait with implementations for:
//! - **NewsApiClient**: `/v2/everything` restricted to the trusted-domain allow-list
//! - **DisabledSearch**: used when no search credential is configured
//!
//! Retrieval never fails outward. Transport faults become
//! [`EvidenceDigest::SearchFailed`], an empty result set becomes
//! [`EvidenceDigest::NoCorroboration`], and the two are never conflated.

use crate::config::SearchConfig;
use crate::models::{EvidenceDigest, EvidenceSource};
use crate::rate_limit::RateGate;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::borrow::Cow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

/// Environment variable holding the search service credential.
pub const NEWS_API_KEY_ENV: &str = "NEWS_API_KEY";

#[async_trait]
pub trait EvidenceRetriever: Send + Sync {
    async fn retrieve_evidence(&self, claim_title: &str) -> EvidenceDigest;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Invalid response: {0}")]
    Malformed(String),

    #[error("Missing API key")]
    MissingApiKey,
}

impl SearchError {
    /// Transport faults, throttling and upstream 5xx are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            SearchError::Http(_) => true,
            SearchError::Api { code, .. } => *code == 429 || *code >= 500,
            SearchError::Malformed(_) | SearchError::MissingApiKey => false,
        }
    }
}

/// Strip punctuation and keep the first `max_tokens` words.
pub fn build_search_query(title: &str, max_tokens: usize) -> String {
    static PUNCTUATION: OnceLock<Option<Regex>> = OnceLock::new();
    let cleaned = match PUNCTUATION.get_or_init(|| Regex::new(r"[^\w\s]").ok()) {
        Some(re) => re.replace_all(title, ""),
        None => Cow::Borrowed(title),
    };

    cleaned
        .split_whitespace()
        .take(max_tokens)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build the configured retriever. A missing `NEWS_API_KEY` degrades to
/// [`DisabledSearch`] instead of failing startup.
///
/// `gate` is the search service's shared gate; the client acquires it before
/// every retry.
pub fn create_retriever(
    config: &SearchConfig,
    gate: Arc<RateGate>,
) -> Result<Box<dyn EvidenceRetriever>, SearchError> {
    let api_key = std::env::var(NEWS_API_KEY_ENV).unwrap_or_default();
    if api_key.trim().is_empty() {
        tracing::warn!("{} not set, evidence search disabled", NEWS_API_KEY_ENV);
        return Ok(Box::new(DisabledSearch));
    }
    Ok(Box::new(NewsApiClient::new(config.clone(), api_key)?.with_rate_gate(gate)))
}

// ============================================================================
// NewsAPI structs (private)
// ============================================================================

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    #[serde(default)]
    articles: Option<Vec<Article>>,
}

#[derive(Debug, Deserialize)]
struct Article {
    #[serde(default)]
    source: Option<ArticleSource>,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArticleSource {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsApiErrorBody {
    #[serde(default)]
    message: Option<String>,
}

// ============================================================================
// NewsApiClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct NewsApiClient {
    client: Client,
    config: SearchConfig,
    api_key: String,
    retry_gate: Arc<RateGate>,
}

impl NewsApiClient {
    pub fn new(config: SearchConfig, api_key: String) -> Result<Self, SearchError> {
        if api_key.is_empty() {
            return Err(SearchError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config,
            api_key,
            retry_gate: Arc::new(RateGate::unlimited()),
        })
    }

    /// Share the search service's gate. The first attempt of a search is
    /// gated by the caller; every retry acquires the gate here.
    pub fn with_rate_gate(mut self, gate: Arc<RateGate>) -> Self {
        self.retry_gate = gate;
        self
    }

    /// Run one search with bounded retries on transient faults.
    pub async fn search(&self, query: &str) -> Result<Vec<EvidenceSource>, SearchError> {
        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(5))
            .map(jitter)
            .take(self.config.max_retries);

        let attempts = AtomicUsize::new(0);
        let attempts = &attempts;
        RetryIf::spawn(
            retry_strategy,
            move || async move {
                if attempts.fetch_add(1, Ordering::Relaxed) > 0 {
                    self.retry_gate.acquire().await;
                }
                self.search_once(query).await
            },
            SearchError::is_transient,
        )
        .await
    }

    async fn search_once(&self, query: &str) -> Result<Vec<EvidenceSource>, SearchError> {
        let url = format!("{}/v2/everything", self.config.base_url.trim_end_matches('/'));
        let domains = self.config.trusted_domains.join(",");
        let page_size = self.config.page_size.clamp(1, 3).to_string();

        let response = self
            .client
            .get(&url)
            .header("X-Api-Key", &self.api_key)
            .query(&[
                ("q", query),
                ("domains", domains.as_str()),
                ("pageSize", page_size.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<NewsApiErrorBody>(&body)
                .ok()
                .and_then(|e| e.message)
                .unwrap_or(body);
            tracing::warn!(code = status.as_u16(), message = %message, "Search API error");
            return Err(SearchError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let parsed: NewsApiResponse =
            serde_json::from_str(&body).map_err(|e| SearchError::Malformed(e.to_string()))?;

        Ok(parsed
            .articles
            .unwrap_or_default()
            .into_iter()
            .filter_map(|a| {
                let title = a.title.filter(|t| !t.trim().is_empty())?;
                let source_name = a
                    .source
                    .and_then(|s| s.name)
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| "Unknown".to_string());
                Some(EvidenceSource { source_name, title })
            })
            .collect())
    }
}

#[async_trait]
impl EvidenceRetriever for NewsApiClient {
    async fn retrieve_evidence(&self, claim_title: &str) -> EvidenceDigest {
        let query = build_search_query(claim_title, self.config.query_tokens);
        if query.is_empty() {
            tracing::debug!(claim = %claim_title, "Claim has no searchable words");
            return EvidenceDigest::NoCorroboration;
        }

        match self.search(&query).await {
            Ok(sources) => {
                tracing::debug!(query = %query, hits = sources.len(), "Evidence search complete");
                EvidenceDigest::from_sources(sources)
            }
            Err(e) => {
                tracing::warn!(query = %query, error = %e, "Evidence search failed");
                EvidenceDigest::SearchFailed
            }
        }
    }

    fn name(&self) -> &str {
        "newsapi"
    }
}

// ============================================================================
// DisabledSearch
// ============================================================================

/// Stand-in when no search credential is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSearch;

#[async_trait]
impl EvidenceRetriever for DisabledSearch {
    async fn retrieve_evidence(&self, _claim_title: &str) -> EvidenceDigest {
        EvidenceDigest::SearchDisabled
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    fn test_config(base_url: String) -> SearchConfig {
        SearchConfig {
            base_url,
            trusted_domains: vec!["reuters.com".to_string(), "bbc.com".to_string()],
            timeout_secs: 5,
            max_retries: 2,
            retry_delay_ms: 10,
            ..SearchConfig::default()
        }
    }

    fn articles(items: &[(&str, &str)]) -> serde_json::Value {
        let articles: Vec<_> = items
            .iter()
            .map(|(name, title)| serde_json::json!({ "source": { "id": null, "name": name }, "title": title }))
            .collect();
        serde_json::json!({ "status": "ok", "totalResults": articles.len(), "articles": articles })
    }

    #[test]
    fn test_query_strips_punctuation_and_caps_tokens() {
        let q = build_search_query(
            "BREAKING: Govt. bans all imports, says minister — effective from tomorrow!!",
            7,
        );
        assert_eq!(q, "BREAKING Govt bans all imports says minister");
    }

    #[test]
    fn test_query_keeps_non_latin_words() {
        let q = build_search_query("काठमाडौंमा भारी वर्षा!", 7);
        assert_eq!(q, "काठमाडौंमा भारी वर्षा");
    }

    #[test]
    fn test_query_of_only_punctuation_is_empty() {
        assert_eq!(build_search_query("?!... --", 7), "");
    }

    #[tokio::test]
    async fn test_results_become_ordered_sources() {
        let mock_server = MockServer::start().await;
        let client = NewsApiClient::new(test_config(mock_server.uri()), "news-key".to_string()).unwrap();

        Mock::given(method("GET"))
            .and(path("/v2/everything"))
            .and(header("x-api-key", "news-key"))
            .and(query_param("q", "Nepal budget passes parliament"))
            .and(query_param("domains", "reuters.com,bbc.com"))
            .and(query_param("pageSize", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(articles(&[
                ("Reuters", "Nepal parliament passes budget"),
                ("BBC News", "Budget vote in Kathmandu"),
            ])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let digest = client.retrieve_evidence("Nepal budget passes parliament!").await;
        assert_eq!(
            digest,
            EvidenceDigest::Sources(vec![
                EvidenceSource {
                    source_name: "Reuters".to_string(),
                    title: "Nepal parliament passes budget".to_string()
                },
                EvidenceSource {
                    source_name: "BBC News".to_string(),
                    title: "Budget vote in Kathmandu".to_string()
                },
            ])
        );
    }

    #[tokio::test]
    async fn test_zero_results_is_no_corroboration() {
        let mock_server = MockServer::start().await;
        let client = NewsApiClient::new(test_config(mock_server.uri()), "k".to_string()).unwrap();

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(articles(&[])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let digest = client.retrieve_evidence("Aliens land in Pokhara").await;
        assert_eq!(digest, EvidenceDigest::NoCorroboration);
    }

    #[tokio::test]
    async fn test_missing_articles_field_is_no_corroboration() {
        let mock_server = MockServer::start().await;
        let client = NewsApiClient::new(test_config(mock_server.uri()), "k".to_string()).unwrap();

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "status": "ok" })))
            .mount(&mock_server)
            .await;

        assert_eq!(
            client.retrieve_evidence("Some claim").await,
            EvidenceDigest::NoCorroboration
        );
    }

    #[tokio::test]
    async fn test_server_error_is_search_failed_after_retries() {
        let mock_server = MockServer::start().await;
        let client = NewsApiClient::new(test_config(mock_server.uri()), "k".to_string()).unwrap();

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "status": "error", "code": "unexpectedError", "message": "boom"
            })))
            .expect(3)
            .mount(&mock_server)
            .await;

        let digest = client.retrieve_evidence("Some claim").await;
        assert_eq!(digest, EvidenceDigest::SearchFailed);
    }

    #[tokio::test]
    async fn test_rejected_key_is_not_retried() {
        let mock_server = MockServer::start().await;
        let client = NewsApiClient::new(test_config(mock_server.uri()), "bad".to_string()).unwrap();

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "status": "error", "code": "apiKeyInvalid", "message": "Your API key is invalid"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        match client.search("claim").await {
            Err(SearchError::Api { code, message }) => {
                assert_eq!(code, 401);
                assert_eq!(message, "Your API key is invalid");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_retries_on_429_then_succeeds() {
        let mock_server = MockServer::start().await;
        let client = NewsApiClient::new(test_config(mock_server.uri()), "k".to_string()).unwrap();

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "status": "error", "code": "rateLimited", "message": "slow down"
            })))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(articles(&[("Reuters", "Story")])))
            .mount(&mock_server)
            .await;

        let digest = client.retrieve_evidence("Some claim").await;
        assert!(digest.is_corroborated(), "Expected sources after retry, got {:?}", digest);
    }

    #[tokio::test]
    async fn test_unreachable_service_is_search_failed() {
        let config = SearchConfig {
            max_retries: 0,
            ..test_config("http://127.0.0.1:1".to_string())
        };
        let client = NewsApiClient::new(config, "k".to_string()).unwrap();
        assert_eq!(
            client.retrieve_evidence("Some claim").await,
            EvidenceDigest::SearchFailed
        );
    }

    #[tokio::test]
    async fn test_punctuation_only_claim_skips_request() {
        let mock_server = MockServer::start().await;
        let client = NewsApiClient::new(test_config(mock_server.uri()), "k".to_string()).unwrap();

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(articles(&[])))
            .expect(0)
            .mount(&mock_server)
            .await;

        assert_eq!(
            client.retrieve_evidence("!!!").await,
            EvidenceDigest::NoCorroboration
        );
    }

    /// Always 503; records when each request arrived.
    struct StampedOutage {
        arrivals: Arc<std::sync::Mutex<Vec<std::time::Instant>>>,
    }

    impl Respond for StampedOutage {
        fn respond(&self, _request: &Request) -> ResponseTemplate {
            self.arrivals.lock().unwrap().push(std::time::Instant::now());
            ResponseTemplate::new(503)
        }
    }

    #[tokio::test]
    async fn test_retries_wait_for_shared_gate() {
        let mock_server = MockServer::start().await;
        let arrivals = Arc::new(std::sync::Mutex::new(Vec::new()));
        let interval = Duration::from_millis(150);
        let gate = Arc::new(RateGate::new(interval));
        let client = NewsApiClient::new(test_config(mock_server.uri()), "k".to_string())
            .unwrap()
            .with_rate_gate(gate.clone());

        Mock::given(method("GET"))
            .respond_with(StampedOutage {
                arrivals: arrivals.clone(),
            })
            .expect(3)
            .mount(&mock_server)
            .await;

        // The orchestrator holds the gate for the first attempt.
        gate.acquire().await;
        let digest = client.retrieve_evidence("Some claim").await;
        assert_eq!(digest, EvidenceDigest::SearchFailed);

        let arrivals = arrivals.lock().unwrap();
        assert_eq!(arrivals.len(), 3);
        // Allow for connection setup on the first request only.
        let slack = Duration::from_millis(10);
        for pair in arrivals.windows(2) {
            let gap = pair[1].duration_since(pair[0]);
            assert!(gap + slack >= interval, "retry sent {:?} after previous request", gap);
        }
    }

    #[test]
    fn test_missing_api_key_rejected() {
        let result = NewsApiClient::new(SearchConfig::default(), String::new());
        assert!(matches!(result, Err(SearchError::MissingApiKey)));
    }

    #[tokio::test]
    async fn test_disabled_search_reports_disabled() {
        let digest = DisabledSearch.retrieve_evidence("anything").await;
        assert_eq!(digest, EvidenceDigest::SearchDisabled);
        assert_eq!(DisabledSearch.name(), "disabled");
    }
}
