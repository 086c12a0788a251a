//! Image/text alignment scoring.
//!
//! [`ClipScorer`] mirrors how a person would check a panel: pull the key
//! visual elements out of the scene text, squeeze them into a caption short
//! enough for CLIP's text encoder, measure similarity, and when the image
//! falls short ask a language model what is missing.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::{
    error::{Result, ToonError},
    generator::{generate_trimmed, TextGenerator},
    http::read_json,
    models::{ArtifactRef, ValidationResult},
    prompt::{clip_fallback_summary, CLIP_TEXT_LIMIT},
};

/// Default acceptance threshold used when a scorer is built without one.
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.7;

const FALLBACK_SUGGESTION: &str = "Make the key visual elements of the scene more concrete.";

/// Scores an image against the description it was generated from.
#[async_trait]
pub trait ImageScorer: Send + Sync {
    async fn score(&self, artifact: &ArtifactRef, description: &str) -> Result<ValidationResult>;
}

/// Raw vision-language similarity between an image and a short text.
#[async_trait]
pub trait SimilarityModel: Send + Sync {
    /// Similarity in `[0, 1]`.
    async fn similarity(&self, artifact: &ArtifactRef, text: &str) -> Result<f32>;
}

#[derive(Serialize, Debug)]
struct SimilarityRequest<'a> {
    image_url: &'a str,
    text: &'a str,
}

#[derive(Deserialize, Debug)]
struct SimilarityResponse {
    #[serde(default, alias = "score")]
    similarity: Option<f32>,
}

/// [`SimilarityModel`] served by a CLIP endpoint that accepts
/// `{"image_url", "text"}` and answers `{"similarity"}` (or `{"score"}`).
#[derive(Clone)]
pub struct HttpClipModel {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpClipModel {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

#[async_trait]
impl SimilarityModel for HttpClipModel {
    async fn similarity(&self, artifact: &ArtifactRef, text: &str) -> Result<f32> {
        let mut request = self.http.post(&self.endpoint).json(&SimilarityRequest {
            image_url: artifact.as_str(),
            text,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let parsed: SimilarityResponse = read_json("CLIP", request.send().await?).await?;
        let score = parsed
            .similarity
            .filter(|s| s.is_finite())
            .ok_or_else(|| ToonError::EmptyResponse("CLIP similarity endpoint".to_string()))?;
        Ok(score.clamp(0.0, 1.0))
    }
}

/// [`ImageScorer`] combining a [`SimilarityModel`] with language-model support calls.
#[derive(Clone)]
pub struct ClipScorer {
    model: Arc<dyn SimilarityModel>,
    text: Arc<dyn TextGenerator>,
    threshold: f32,
}

impl ClipScorer {
    pub fn new(model: Arc<dyn SimilarityModel>, text: Arc<dyn TextGenerator>) -> Self {
        Self {
            model,
            text,
            threshold: DEFAULT_SCORE_THRESHOLD,
        }
    }

    /// Score at or above which `meets_threshold` is set and no suggestions are requested.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// The three or four most important visual elements of a scene.
    ///
    /// Falls back to the scene text itself.
    pub async fn extract_key_elements(&self, text: &str) -> String {
        let prompt = format!(
            "Extract only the most important visual elements of the following scene.\n\
             Rank them by importance and keep the top 3-4:\n\
             1. The characters' main actions and interactions\n\
             2. The characters' emotions and expressions\n\
             3. Key background elements\n\
             4. The overall atmosphere\n\n\
             Scene:\n{text}"
        );

        match generate_trimmed(self.text.as_ref(), None, &prompt, 0.3).await {
            Ok(elements) => elements,
            Err(err) => {
                warn!(error = %err, "Key element extraction failed; using scene text");
                text.to_string()
            }
        }
    }

    /// Compress key elements into one sentence CLIP can encode.
    pub async fn summarize_for_clip(&self, key_elements: &str) -> String {
        let prompt = format!(
            "Turn the following visual elements into one simple sentence of at most \
             {CLIP_TEXT_LIMIT} characters that CLIP can understand.\n\
             - Drop conjunctions and unnecessary modifiers\n\
             - State actions, emotions and situation clearly\n\
             - Keep concrete visual details\n\
             - Put the most important elements first\n\n\
             Key elements:\n{key_elements}"
        );

        let summary = match generate_trimmed(self.text.as_ref(), None, &prompt, 0.3).await {
            Ok(summary) => summary,
            Err(err) => {
                warn!(error = %err, "CLIP summary failed; truncating locally");
                return clip_fallback_summary(key_elements);
            }
        };

        if summary.chars().count() <= CLIP_TEXT_LIMIT {
            return summary;
        }

        let trim_prompt = format!(
            "Shorten the following description to at most {CLIP_TEXT_LIMIT} characters, \
             keeping the most important actions and emotions:\n\n{summary}"
        );
        match generate_trimmed(self.text.as_ref(), None, &trim_prompt, 0.3).await {
            Ok(shorter) if shorter.chars().count() <= CLIP_TEXT_LIMIT => shorter,
            Ok(shorter) => clip_fallback_summary(&shorter),
            Err(err) => {
                warn!(error = %err, "CLIP summary shortening failed; truncating locally");
                clip_fallback_summary(&summary)
            }
        }
    }

    async fn suggest_improvements(&self, similarity: f32, key_elements: &str, summary: &str) -> Vec<String> {
        let prompt = format!(
            "The similarity between the image and its prompt is {similarity:.2}.\n\
             Suggest how to improve the image generation based on these elements.\n\n\
             Key elements:\n{key_elements}\n\n\
             Current summary:\n{summary}\n\n\
             Give 1-2 concrete improvements per element, one per line."
        );

        match generate_trimmed(self.text.as_ref(), None, &prompt, 0.7).await {
            Ok(text) => parse_suggestions(&text),
            Err(err) => {
                warn!(error = %err, "Suggestion request failed");
                vec![FALLBACK_SUGGESTION.to_string()]
            }
        }
    }
}

/// Split a model reply into one suggestion per non-empty line, without list markers.
pub fn parse_suggestions(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| c == '-' || c == '*' || c == '•')
                .trim()
        })
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl ImageScorer for ClipScorer {
    #[instrument(skip_all, fields(artifact = %artifact))]
    async fn score(&self, artifact: &ArtifactRef, description: &str) -> Result<ValidationResult> {
        let key_elements = self.extract_key_elements(description).await;
        let summary = self.summarize_for_clip(&key_elements).await;
        debug!(summary = %summary, "Scoring against CLIP summary");

        let similarity = self.model.similarity(artifact, &summary).await?;
        info!(similarity, threshold = self.threshold, "Image scored");

        let mut result = ValidationResult::new(similarity, self.threshold);
        if !result.meets_threshold {
            result.suggestions = self
                .suggest_improvements(result.similarity_score, &key_elements, &summary)
                .await;
        }
        result.key_elements = Some(key_elements);
        result.summarized_prompt = Some(summary);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gemini_rust::GenerationConfig;
    use std::sync::Mutex;

    struct ScriptedText {
        replies: Mutex<Vec<Result<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedText {
        fn new(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedText {
        async fn generate_text(
            &self,
            _system: Option<&str>,
            prompt: &str,
            _config: GenerationConfig,
        ) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                return Err(ToonError::EmptyResponse("script".into()));
            }
            replies.remove(0)
        }
    }

    struct FixedSimilarity(f32);

    #[async_trait]
    impl SimilarityModel for FixedSimilarity {
        async fn similarity(&self, _artifact: &ArtifactRef, _text: &str) -> Result<f32> {
            Ok(self.0)
        }
    }

    struct DownSimilarity;

    #[async_trait]
    impl SimilarityModel for DownSimilarity {
        async fn similarity(&self, _artifact: &ArtifactRef, _text: &str) -> Result<f32> {
            Err(ToonError::api("CLIP", 503, "overloaded"))
        }
    }

    fn artifact() -> ArtifactRef {
        ArtifactRef::new("https://img.example/1.png")
    }

    #[tokio::test]
    async fn test_high_score_skips_suggestions() {
        let text = Arc::new(ScriptedText::new(vec![
            Ok("girl, snowflake, smile".into()),
            Ok("A smiling girl holds a snowflake".into()),
        ]));
        let scorer = ClipScorer::new(Arc::new(FixedSimilarity(0.82)), text.clone());

        let result = scorer.score(&artifact(), "A girl holds a snowflake").await.unwrap();

        assert!(result.meets_threshold);
        assert!(result.suggestions.is_empty());
        assert_eq!(
            result.summarized_prompt.as_deref(),
            Some("A smiling girl holds a snowflake")
        );
        assert_eq!(text.prompts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_low_score_collects_suggestions() {
        let text = Arc::new(ScriptedText::new(vec![
            Ok("girl, snowflake".into()),
            Ok("A girl holds a snowflake".into()),
            Ok("- Show the snowflake clearly\n\n- Add falling snow\n".into()),
        ]));
        let scorer = ClipScorer::new(Arc::new(FixedSimilarity(0.4)), text);

        let result = scorer.score(&artifact(), "A girl holds a snowflake").await.unwrap();

        assert!(!result.meets_threshold);
        assert_eq!(
            result.suggestions,
            vec!["Show the snowflake clearly", "Add falling snow"]
        );
    }

    #[tokio::test]
    async fn test_language_model_outage_uses_fallbacks() {
        let text = Arc::new(ScriptedText::new(vec![]));
        let scorer = ClipScorer::new(Arc::new(FixedSimilarity(0.2)), text);
        let description = "A boy runs across a frozen lake, chasing his red scarf in the wind, while his dog barks.";

        let result = scorer.score(&artifact(), description).await.unwrap();

        assert_eq!(result.key_elements.as_deref(), Some(description));
        assert!(result.summarized_prompt.unwrap().chars().count() <= CLIP_TEXT_LIMIT);
        assert_eq!(result.suggestions, vec![FALLBACK_SUGGESTION.to_string()]);
    }

    #[tokio::test]
    async fn test_long_summary_is_shortened() {
        let long = "x".repeat(120);
        let text = Arc::new(ScriptedText::new(vec![
            Ok("elements".into()),
            Ok(long),
            Ok("short caption".into()),
        ]));
        let scorer = ClipScorer::new(Arc::new(FixedSimilarity(0.9)), text);

        let result = scorer.score(&artifact(), "scene").await.unwrap();
        assert_eq!(result.summarized_prompt.as_deref(), Some("short caption"));
    }

    #[tokio::test]
    async fn test_similarity_failure_propagates() {
        let text = Arc::new(ScriptedText::new(vec![Ok("a".into()), Ok("b".into())]));
        let scorer = ClipScorer::new(Arc::new(DownSimilarity), text);

        let err = scorer.score(&artifact(), "scene").await.unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn test_similarity_response_aliases() {
        let a: SimilarityResponse = serde_json::from_str(r#"{"similarity": 0.5}"#).unwrap();
        let b: SimilarityResponse = serde_json::from_str(r#"{"score": 0.25}"#).unwrap();
        assert_eq!(a.similarity, Some(0.5));
        assert_eq!(b.similarity, Some(0.25));
    }
}
