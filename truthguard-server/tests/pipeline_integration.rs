//! End-to-end pipeline runs with the production clients pointed at
//! `wiremock` stand-ins for the feed, search and classification services.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::json;
use truthguard_core::config::{ClassifierConfig, FeedConfig, SearchConfig};
use truthguard_core::models::evidence::NO_MATCHING_SOURCES;
use truthguard_core::{
    GroqClient, NewsApiClient, RateGate, RedditFeedClient, Verdict, VerdictClassifier,
};
use truthguard_server::subsystems::pipeline::{Pipeline, PipelineError, PipelineSettings};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn listing(posts: &[(&str, bool)]) -> serde_json::Value {
    let children: Vec<_> = posts
        .iter()
        .enumerate()
        .map(|(i, (title, stickied))| {
            json!({
                "kind": "t3",
                "data": {
                    "title": title,
                    "selftext": "",
                    "permalink": format!("/r/newsnepal289/comments/{}/post/", i),
                    "stickied": stickied
                }
            })
        })
        .collect();
    json!({ "kind": "Listing", "data": { "children": children } })
}

fn completion(content: serde_json::Value) -> serde_json::Value {
    json!({
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content.to_string() },
            "finish_reason": "stop"
        }]
    })
}

/// Replies with a fixed status and records when each request arrived.
struct Stamped {
    status: u16,
    arrivals: Arc<Mutex<Vec<Instant>>>,
}

impl Respond for Stamped {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.arrivals.lock().unwrap().push(Instant::now());
        ResponseTemplate::new(self.status)
    }
}

fn assert_spaced(arrivals: &[Instant], interval: Duration) {
    // Connection setup can delay a request by a few ms relative to its grant.
    let slack = Duration::from_millis(10);
    for pair in arrivals.windows(2) {
        let gap = pair[1].duration_since(pair[0]);
        assert!(gap + slack >= interval, "request sent {:?} after previous one", gap);
    }
}

struct Upstreams {
    feed: MockServer,
    search: MockServer,
    llm: MockServer,
}

impl Upstreams {
    async fn start() -> Self {
        Self {
            feed: MockServer::start().await,
            search: MockServer::start().await,
            llm: MockServer::start().await,
        }
    }

    fn pipeline(&self, min_interval: Duration) -> Pipeline {
        self.pipeline_with_retries(min_interval, 0)
    }

    /// Clients and orchestrator share one gate per service, as in
    /// `Pipeline::from_config`.
    fn pipeline_with_retries(&self, min_interval: Duration, max_retries: usize) -> Pipeline {
        let search_gate = Arc::new(RateGate::new(min_interval));
        let classify_gate = Arc::new(RateGate::new(min_interval));

        let feed = RedditFeedClient::new(&FeedConfig {
            base_url: self.feed.uri(),
            ..FeedConfig::default()
        })
        .unwrap();

        let search = NewsApiClient::new(
            SearchConfig {
                base_url: self.search.uri(),
                max_retries,
                retry_delay_ms: 10,
                ..SearchConfig::default()
            },
            "news-key".to_string(),
        )
        .unwrap()
        .with_rate_gate(search_gate.clone());

        let llm = GroqClient::new(
            ClassifierConfig {
                base_url: self.llm.uri(),
                max_retries,
                retry_delay_ms: 10,
                ..ClassifierConfig::default()
            },
            "groq-key".to_string(),
        )
        .unwrap()
        .with_rate_gate(classify_gate.clone());

        Pipeline::with_gates(
            Arc::new(feed),
            Arc::new(search),
            VerdictClassifier::new(Arc::new(llm)),
            PipelineSettings {
                limit: 15,
                concurrency: 1,
                min_interval,
                run_timeout: Some(Duration::from_secs(30)),
            },
            search_gate,
            classify_gate,
        )
    }
}

#[tokio::test]
async fn test_three_uncorroborated_claims_yield_three_records() {
    let up = Upstreams::start().await;

    Mock::given(method("GET"))
        .and(path("/r/newsnepal289/hot.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(&[
            ("Read the rules", true),
            ("Army takes over TV station", false),
            ("Petrol free for one week", false),
            ("Moon visible at noon tomorrow", false),
        ])))
        .mount(&up.feed)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2/everything"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok", "totalResults": 0, "articles": []
        })))
        .expect(3)
        .mount(&up.search)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains(format!("CONTEXT: \\\"{}\\\"", NO_MATCHING_SOURCES)))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(json!({
            "is_news": true, "verdict": "Fake", "truth_score": 10, "propaganda_score": 60,
            "explanation": "No trusted outlet carried this.", "category": "social"
        }))))
        .expect(3)
        .mount(&up.llm)
        .await;

    let records = up.pipeline(Duration::ZERO).run("newsnepal289").await.unwrap();

    let claims: Vec<_> = records.iter().map(|r| r.claim.as_str()).collect();
    assert_eq!(
        claims,
        vec![
            "Army takes over TV station",
            "Petrol free for one week",
            "Moon visible at noon tomorrow"
        ]
    );
    assert!(records.iter().all(|r| r.verdict == Verdict::Fake));
    assert_eq!(
        records[0].source_link,
        "https://reddit.com/r/newsnepal289/comments/1/post/"
    );
}

#[tokio::test]
async fn test_pinned_only_feed_fails_before_any_search() {
    let up = Upstreams::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(&[("Announcement", true)])))
        .mount(&up.feed)
        .await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&up.search)
        .await;

    let result = up.pipeline(Duration::ZERO).run("newsnepal289").await;
    assert!(matches!(result, Err(PipelineError::FeedUnavailable(_))), "{:?}", result);
}

#[tokio::test]
async fn test_search_outage_and_llm_outage_degrade_per_claim() {
    let up = Upstreams::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(&[
            ("Claim one", false),
            ("Claim two", false),
        ])))
        .mount(&up.feed)
        .await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&up.search)
        .await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": { "message": "internal error" }
        })))
        .expect(2)
        .mount(&up.llm)
        .await;

    let records = up.pipeline(Duration::ZERO).run("newsnepal289").await.unwrap();

    assert_eq!(records.len(), 2);
    for r in &records {
        assert_eq!(r.verdict, Verdict::Error);
        assert_eq!(r.truth_score, 0);
        assert_eq!(r.propaganda_score, 0);
    }
}

#[tokio::test]
async fn test_default_spacing_is_a_floor_between_claims() {
    let up = Upstreams::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(&[
            ("Claim one", false),
            ("Claim two", false),
            ("Claim three", false),
        ])))
        .mount(&up.feed)
        .await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok", "articles": [{ "source": { "name": "Reuters" }, "title": "Story" }]
        })))
        .mount(&up.search)
        .await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(json!({
            "verdict": "Real", "truth_score": 90, "propaganda_score": 5, "explanation": "Reported by Reuters."
        }))))
        .mount(&up.llm)
        .await;

    let start = std::time::Instant::now();
    let records = up
        .pipeline(Duration::from_millis(400))
        .run("newsnepal289")
        .await
        .unwrap();

    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.verdict == Verdict::Real));
    assert!(
        start.elapsed() >= Duration::from_millis(800),
        "three claims at 400ms spacing took {:?}",
        start.elapsed()
    );
}

#[tokio::test]
async fn test_retries_share_the_per_service_interval() {
    let up = Upstreams::start().await;
    let search_arrivals = Arc::new(Mutex::new(Vec::new()));
    let llm_arrivals = Arc::new(Mutex::new(Vec::new()));

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(&[
            ("Claim one", false),
            ("Claim two", false),
        ])))
        .mount(&up.feed)
        .await;

    Mock::given(method("GET"))
        .respond_with(Stamped {
            status: 503,
            arrivals: search_arrivals.clone(),
        })
        .mount(&up.search)
        .await;

    Mock::given(method("POST"))
        .respond_with(Stamped {
            status: 429,
            arrivals: llm_arrivals.clone(),
        })
        .mount(&up.llm)
        .await;

    let interval = Duration::from_millis(120);
    let records = up
        .pipeline_with_retries(interval, 2)
        .run("newsnepal289")
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.verdict == Verdict::Error));

    let search_arrivals = search_arrivals.lock().unwrap();
    let llm_arrivals = llm_arrivals.lock().unwrap();
    assert_eq!(search_arrivals.len(), 6, "two claims, three attempts each");
    assert_eq!(llm_arrivals.len(), 6);
    assert_spaced(&search_arrivals, interval);
    assert_spaced(&llm_arrivals, interval);
}
