use serde::{Deserialize, Serialize};

/// One feed entry that survived filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub title: String,
    pub body: Option<String>,
    pub source_url: String,
}
