//! Grounding validation of generated artifacts.
//!
//! The validator cross-checks the citations an artifact declares against
//! the grounding set actually supplied to generation. It never reads
//! document text, so it is cheap, deterministic, and re-checkable.
//! Rejection is a normal outcome — always surfaced to the caller, never
//! auto-corrected, and never aborting a batch.

use serde::{Deserialize, Serialize};

use crate::models::GroundingSet;

/// A generated test case. Field names follow the JSON contract of the
/// generation collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(rename = "Test_ID")]
    pub test_id: String,
    #[serde(rename = "Feature")]
    pub feature: String,
    #[serde(rename = "Test_Scenario")]
    pub scenario: String,
    #[serde(rename = "Steps", default)]
    pub steps: Vec<String>,
    #[serde(rename = "Expected_Result")]
    pub expected_result: String,
    /// Declared citation list — the documents this case claims to be
    /// grounded in.
    #[serde(rename = "Grounded_In", default)]
    pub grounded_in: Vec<String>,
}

/// Outcome of validating one artifact against a grounding set.
/// Validity is a derived, re-checkable property, not an attribute of the
/// artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Accepted,
    Rejected(String),
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationOutcome::Accepted)
    }
}

impl std::fmt::Display for ValidationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationOutcome::Accepted => f.write_str("accepted"),
            ValidationOutcome::Rejected(reason) => write!(f, "rejected ({})", reason),
        }
    }
}

/// Validate an artifact's declared citations against the grounding set.
///
/// Rules, applied in order:
/// 1. every declared citation must name a document in the set — the first
///    one outside it rejects the artifact;
/// 2. zero citations with a non-empty set is a rejection;
/// 3. otherwise the artifact is accepted.
///
/// Exact, case-sensitive document-identifier matching.
pub fn validate(artifact: &TestCase, grounding: &GroundingSet) -> ValidationOutcome {
    for citation in &artifact.grounded_in {
        if !grounding.contains(citation) {
            return ValidationOutcome::Rejected(format!("ungrounded citation: {}", citation));
        }
    }

    if artifact.grounded_in.is_empty() && !grounding.is_empty() {
        return ValidationOutcome::Rejected("missing grounding".to_string());
    }

    ValidationOutcome::Accepted
}
