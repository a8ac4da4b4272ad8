//! Refusal detection.
//!
//! Given a [`NormalizedResponse`] with no transport-level error, decide
//! whether it represents a genuine answer or a refusal-style non-answer
//! that warrants falling back to the next provider.
//!
//! The default implementation is a conservative, data-driven heuristic:
//! case-insensitive substring matching against a configurable signature
//! list. False negatives (missed refusals) are expected and acceptable.
//! Deployments needing semantic classification can implement
//! [`RefusalClassifier`] and hand the router a different object.

use crate::provider::NormalizedResponse;

/// The classifier's judgement on one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The response is a usable answer.
    Accepted,
    /// The response is a refusal; the router should try the next provider.
    Refused,
}

/// Content-level judgement over normalized responses.
///
/// Implementations must be pure: the same response and configuration always
/// yield the same verdict, and classification has no side effects.
pub trait RefusalClassifier: Send + Sync {
    /// Classify a transport-successful response.
    fn classify(&self, response: &NormalizedResponse) -> Verdict;
}

/// Signature-list refusal classifier.
///
/// A response is refused when its text contains any configured signature,
/// compared case-insensitively. Signatures are plain substrings (a prefix
/// is just a substring anchored by convention), loaded from configuration
/// so the set can grow without code changes.
#[derive(Debug, Clone)]
pub struct SignatureClassifier {
    /// Lowercased refusal signatures.
    signatures: Vec<String>,
}

impl SignatureClassifier {
    /// Build a classifier from a signature list.
    ///
    /// Signatures are lowercased once here so per-response classification
    /// only lowercases the response text.
    pub fn new<I, S>(signatures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            signatures: signatures
                .into_iter()
                .map(|s| s.into().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Number of active signatures.
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    /// True when no signatures are configured (everything is accepted).
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

impl RefusalClassifier for SignatureClassifier {
    fn classify(&self, response: &NormalizedResponse) -> Verdict {
        let text = response.text.to_lowercase();
        if self.signatures.iter().any(|sig| text.contains(sig)) {
            Verdict::Refused
        } else {
            Verdict::Accepted
        }
    }
}
