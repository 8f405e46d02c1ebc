pub mod classifier;
pub mod config;
pub mod error;
pub mod feed;
pub mod models;
pub mod rate_limit;
pub mod search;

pub use crate::classifier::{
    create_classifier, ChatMessage, ClassifierError, CompletionBackend, GroqClient,
    VerdictClassifier,
};
pub use crate::config::TruthGuardConfig;
pub use crate::error::TruthGuardError;
pub use crate::feed::{ClaimFeed, FeedError, RedditFeedClient};
pub use crate::models::{Category, ClaimRecord, EvidenceDigest, EvidenceSource, Verdict, VerdictRecord};
pub use crate::rate_limit::RateGate;
pub use crate::search::{create_retriever, DisabledSearch, EvidenceRetriever, NewsApiClient, SearchError};
