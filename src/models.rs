use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque handle to a generated image: a URL or a `data:` URI, never the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRef(String);

impl ArtifactRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the image is inlined as a base64 `data:` URI.
    pub fn is_inline(&self) -> bool {
        self.0.starts_with("data:")
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_inline() {
            write!(f, "<inline image, {} bytes encoded>", self.0.len())
        } else {
            f.write_str(&self.0)
        }
    }
}

/// Result of one image generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub artifact: ArtifactRef,
    /// Prompt as rewritten by the image provider, when it reports one.
    pub revised_prompt: Option<String>,
    /// Provider-reported seed or creation stamp, for reproduction notes.
    pub seed: Option<i64>,
}

/// How well an image matches its description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Similarity in `[0, 1]`.
    pub similarity_score: f32,
    pub meets_threshold: bool,
    /// Improvements or missing elements flagged by the scorer.
    pub suggestions: Vec<String>,
    /// Key visual elements extracted from the description.
    pub key_elements: Option<String>,
    /// The short text that was actually compared against the image.
    pub summarized_prompt: Option<String>,
}

impl ValidationResult {
    /// Non-finite scores count as no similarity.
    pub fn new(similarity_score: f32, threshold: f32) -> Self {
        let similarity_score = if similarity_score.is_finite() {
            similarity_score.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            similarity_score,
            meets_threshold: similarity_score >= threshold,
            suggestions: Vec::new(),
            key_elements: None,
            summarized_prompt: None,
        }
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }
}

/// Record of one iteration of the render loop.
///
/// An attempt whose generation call failed has neither artifact nor score; an
/// attempt whose scoring call failed has an artifact but no score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationAttempt {
    pub attempt_index: usize,
    pub prompt: String,
    pub image: Option<GeneratedImage>,
    pub validation: Option<ValidationResult>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl GenerationAttempt {
    pub fn scored(
        attempt_index: usize,
        prompt: String,
        image: GeneratedImage,
        validation: ValidationResult,
    ) -> Self {
        Self {
            attempt_index,
            prompt,
            image: Some(image),
            validation: Some(validation),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn generation_failed(attempt_index: usize, prompt: String, error: impl Into<String>) -> Self {
        Self {
            attempt_index,
            prompt,
            image: None,
            validation: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn scoring_failed(
        attempt_index: usize,
        prompt: String,
        image: GeneratedImage,
        error: impl Into<String>,
    ) -> Self {
        Self {
            attempt_index,
            prompt,
            image: Some(image),
            validation: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn artifact(&self) -> Option<&ArtifactRef> {
        self.image.as_ref().map(|i| &i.artifact)
    }

    pub fn score(&self) -> Option<f32> {
        self.validation.as_ref().map(|v| v.similarity_score)
    }
}

/// States of the render loop. The three `Terminated*` states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopState {
    Generating,
    Scoring,
    Deciding,
    Repairing,
    TerminatedSuccess,
    TerminatedBestEffort,
    TerminatedNoResult,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoopState::TerminatedSuccess
                | LoopState::TerminatedBestEffort
                | LoopState::TerminatedNoResult
        )
    }
}

/// Why an attempt was accepted before the budget ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Acceptance {
    /// Score cleared the accept threshold.
    Ideal,
    /// Score cleared the minimum threshold on a retry.
    GoodEnough,
}

/// What the render loop hands back to its caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RenderResult {
    Accepted {
        attempt_index: usize,
        artifact: ArtifactRef,
        score: f32,
        acceptance: Acceptance,
    },
    /// Budget exhausted; the highest-scoring attempt is returned.
    BestEffort {
        attempt_index: usize,
        artifact: ArtifactRef,
        score: f32,
    },
    /// No attempt produced a scoreable image.
    NoResult,
}

impl RenderResult {
    pub fn artifact(&self) -> Option<&ArtifactRef> {
        match self {
            RenderResult::Accepted { artifact, .. } | RenderResult::BestEffort { artifact, .. } => {
                Some(artifact)
            }
            RenderResult::NoResult => None,
        }
    }

    pub fn score(&self) -> Option<f32> {
        match self {
            RenderResult::Accepted { score, .. } | RenderResult::BestEffort { score, .. } => {
                Some(*score)
            }
            RenderResult::NoResult => None,
        }
    }

    pub fn terminal_state(&self) -> LoopState {
        match self {
            RenderResult::Accepted { .. } => LoopState::TerminatedSuccess,
            RenderResult::BestEffort { .. } => LoopState::TerminatedBestEffort,
            RenderResult::NoResult => LoopState::TerminatedNoResult,
        }
    }
}

/// Outcome of the render loop including the attempt trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderOutcome {
    pub result: RenderResult,
    pub attempts: Vec<GenerationAttempt>,
    /// Scene text produced by the one-time prompt repair, if it ran.
    pub repaired_prompt: Option<String>,
    pub cancelled: bool,
}

impl RenderOutcome {
    pub fn artifact(&self) -> Option<&ArtifactRef> {
        self.result.artifact()
    }

    pub fn final_state(&self) -> LoopState {
        self.result.terminal_state()
    }

    pub fn generation_calls(&self) -> usize {
        self.attempts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_clamps_score() {
        let v = ValidationResult::new(1.4, 0.7);
        assert_eq!(v.similarity_score, 1.0);
        assert!(v.meets_threshold);

        let v = ValidationResult::new(-0.2, 0.7);
        assert_eq!(v.similarity_score, 0.0);
        assert!(!v.meets_threshold);
    }

    #[test]
    fn test_validation_zeroes_non_finite_score() {
        for raw in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let v = ValidationResult::new(raw, 0.7);
            assert_eq!(v.similarity_score, 0.0);
            assert!(!v.meets_threshold);
        }
    }

    #[test]
    fn test_inline_artifact_display_hides_payload() {
        let inline = ArtifactRef::new("data:image/png;base64,AAAA");
        assert!(inline.is_inline());
        assert!(!inline.to_string().contains("AAAA"));

        let url = ArtifactRef::new("https://example.com/cut.png");
        assert_eq!(url.to_string(), "https://example.com/cut.png");
    }

    #[test]
    fn test_terminal_states() {
        assert_eq!(
            RenderResult::NoResult.terminal_state(),
            LoopState::TerminatedNoResult
        );
        assert!(LoopState::TerminatedBestEffort.is_terminal());
        assert!(!LoopState::Repairing.is_terminal());
    }
}
