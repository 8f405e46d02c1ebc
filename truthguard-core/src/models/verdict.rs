use serde::{Deserialize, Serialize};

/// Explanation carried by every degraded record.
pub const SERVICE_UNAVAILABLE_EXPLANATION: &str = "AI service unavailable";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    Real,
    Fake,
    Misleading,
    Satire,
    Unverified,
    /// Reserved for degraded records; never accepted from the model.
    Error,
}

impl Verdict {
    /// Case-insensitive parse of a model-supplied verdict.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "real" => Some(Verdict::Real),
            "fake" => Some(Verdict::Fake),
            "misleading" => Some(Verdict::Misleading),
            "satire" => Some(Verdict::Satire),
            "unverified" => Some(Verdict::Unverified),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Politics,
    Economy,
    Social,
    #[default]
    Other,
}

impl Category {
    /// Unknown or missing categories fall back to `Other`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "politics" => Category::Politics,
            "economy" => Category::Economy,
            "social" => Category::Social,
            _ => Category::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictRecord {
    pub claim: String,
    pub is_news: bool,
    pub verdict: Verdict,
    pub truth_score: u8,
    pub propaganda_score: u8,
    pub explanation: String,
    pub category: Category,
    pub source_link: String,
}

impl VerdictRecord {
    /// Record emitted when classification fails for any reason.
    pub fn degraded(claim: impl Into<String>, source_link: impl Into<String>) -> Self {
        Self {
            claim: claim.into(),
            is_news: false,
            verdict: Verdict::Error,
            truth_score: 0,
            propaganda_score: 0,
            explanation: SERVICE_UNAVAILABLE_EXPLANATION.to_string(),
            category: Category::Other,
            source_link: source_link.into(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.verdict == Verdict::Error
    }
}

/// Round and clamp a raw score into `0..=100`. Non-finite input scores 0.
pub fn clamp_score(raw: f64) -> u8 {
    if !raw.is_finite() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}
