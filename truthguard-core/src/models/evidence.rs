//! Evidence gathered for a single claim.
//!
//! The rendered forms are what the classifier sees in its `CONTEXT` line, so
//! each outcome must stay textually distinct.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Search succeeded and no trusted outlet carried the story.
pub const NO_MATCHING_SOURCES: &str = "NO_MATCHING_SOURCES";
/// The search service could not be reached or returned an error.
pub const SEARCH_FAILED: &str = "Verification search failed.";
/// No search credential is configured.
pub const SEARCH_DISABLED: &str = "No API Key available.";
/// Manual checks skip retrieval entirely.
pub const NOT_SEARCHED: &str = "No evidence search was performed.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSource {
    pub source_name: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvidenceDigest {
    /// Never empty; build through [`EvidenceDigest::from_sources`].
    Sources(Vec<EvidenceSource>),
    NoCorroboration,
    SearchFailed,
    SearchDisabled,
    NotSearched,
}

impl EvidenceDigest {
    pub fn from_sources(sources: Vec<EvidenceSource>) -> Self {
        if sources.is_empty() {
            EvidenceDigest::NoCorroboration
        } else {
            EvidenceDigest::Sources(sources)
        }
    }

    pub fn is_corroborated(&self) -> bool {
        matches!(self, EvidenceDigest::Sources(_))
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EvidenceDigest::Sources(_) => "sources",
            EvidenceDigest::NoCorroboration => "no_corroboration",
            EvidenceDigest::SearchFailed => "search_failed",
            EvidenceDigest::SearchDisabled => "search_disabled",
            EvidenceDigest::NotSearched => "not_searched",
        }
    }

    /// Prompt-ready text: `[Source] Title | [Source] Title` or a sentinel.
    pub fn render(&self) -> String {
        match self {
            EvidenceDigest::Sources(sources) => sources
                .iter()
                .map(|s| format!("[{}] {}", s.source_name, s.title))
                .collect::<Vec<_>>()
                .join(" | "),
            EvidenceDigest::NoCorroboration => NO_MATCHING_SOURCES.to_string(),
            EvidenceDigest::SearchFailed => SEARCH_FAILED.to_string(),
            EvidenceDigest::SearchDisabled => SEARCH_DISABLED.to_string(),
            EvidenceDigest::NotSearched => NOT_SEARCHED.to_string(),
        }
    }
}

impl fmt::Display for EvidenceDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
