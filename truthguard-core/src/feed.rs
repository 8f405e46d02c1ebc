//! Feed ingestion. Pulls the current batch of candidate claims from a
//! community listing and normalizes them into [`ClaimRecord`]s.
//!
//! Pinned (stickied) posts, posts without a title and posts without a
//! permalink are dropped. An empty batch after filtering is an error: there
//! is nothing for the pipeline to verify.

use crate::config::FeedConfig;
use crate::models::ClaimRecord;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Canonical host used to build claim source links.
const PERMALINK_HOST: &str = "https://reddit.com";

#[async_trait]
pub trait ClaimFeed: Send + Sync {
    /// Fetch up to `limit` entries from `source` and return the survivors.
    async fn fetch_claims(&self, source: &str, limit: usize) -> Result<Vec<ClaimRecord>, FeedError>;

    fn name(&self) -> &str;
}

/// Every variant means the feed is unavailable to the pipeline.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("feed request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed returned HTTP {status}")]
    Upstream { status: u16 },

    #[error("feed returned an unreadable listing: {0}")]
    Malformed(String),

    #[error("no claims left in r/{community} after filtering pinned posts")]
    Empty { community: String },
}

// Listing payload (private)

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    permalink: String,
    #[serde(default)]
    stickied: bool,
}

/// Reads `/r/{community}/hot.json` with a browser-like user agent.
#[derive(Debug, Clone)]
pub struct RedditFeedClient {
    client: Client,
    base_url: String,
}

impl RedditFeedClient {
    pub fn new(config: &FeedConfig) -> Result<Self, FeedError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ClaimFeed for RedditFeedClient {
    async fn fetch_claims(&self, source: &str, limit: usize) -> Result<Vec<ClaimRecord>, FeedError> {
        let url = format!("{}/r/{}/hot.json", self.base_url, source);
        tracing::info!(source = %source, limit, "Fetching feed");

        let response = self
            .client
            .get(&url)
            .query(&[("limit", limit)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(source = %source, status = status.as_u16(), "Feed request rejected");
            return Err(FeedError::Upstream {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let listing: Listing =
            serde_json::from_str(&body).map_err(|e| FeedError::Malformed(e.to_string()))?;

        let fetched = listing.data.children.len();
        let claims = normalize_posts(listing.data.children.into_iter().map(|c| c.data));
        tracing::info!(source = %source, fetched, kept = claims.len(), "Feed normalized");

        if claims.is_empty() {
            return Err(FeedError::Empty {
                community: source.to_string(),
            });
        }
        Ok(claims)
    }

    fn name(&self) -> &str {
        "reddit"
    }
}

fn normalize_posts(posts: impl Iterator<Item = Post>) -> Vec<ClaimRecord> {
    posts
        .filter(|p| !p.stickied)
        .filter(|p| !p.title.trim().is_empty() && !p.permalink.is_empty())
        .map(|p| {
            let body = p.selftext.trim();
            ClaimRecord {
                title: p.title.trim().to_string(),
                body: (!body.is_empty()).then(|| body.to_string()),
                source_url: format!("{}{}", PERMALINK_HOST, p.permalink),
            }
        })
        .collect()
}
