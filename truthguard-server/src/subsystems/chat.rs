//! Manual single-claim check: the classifier without a retrieval stage.

use truthguard_core::{ClaimRecord, EvidenceDigest, Verdict, VerdictClassifier, VerdictRecord};

/// Classify free text as a claim. Fail-soft like the pipeline.
pub async fn check_claim(classifier: &VerdictClassifier, text: &str) -> VerdictRecord {
    let claim = ClaimRecord {
        title: text.trim().to_string(),
        body: None,
        source_url: String::new(),
    };
    classifier.classify(&claim, &EvidenceDigest::NotSearched).await
}

/// One-line reply built from the structured verdict.
pub fn render_reply(record: &VerdictRecord) -> String {
    match record.verdict {
        Verdict::Error => format!("Could not verify this claim: {}.", record.explanation),
        verdict => format!(
            "Verdict: {:?} (truth {}/100, propaganda {}/100). {}",
            verdict, record.truth_score, record.propaganda_score, record.explanation
        ),
    }
}
