pub mod claim;
pub mod evidence;
pub mod verdict;

pub use claim::ClaimRecord;
pub use evidence::{EvidenceDigest, EvidenceSource};
pub use verdict::{clamp_score, Category, Verdict, VerdictRecord};
