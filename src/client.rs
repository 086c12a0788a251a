use std::sync::Arc;
use std::time::Duration;

use gemini_rust::{Gemini, Model};
use tracing::{info, instrument};

use crate::{
    error::{Result, ToonError},
    files::ArtifactStore,
    generator::{GeminiGenerator, TextGenerator},
    http::build_client,
    image::{ImageGenerator, OpenAiImageGenerator, DEFAULT_IMAGE_MODEL},
    models::RenderOutcome,
    render::{RenderConfig, RenderLoop},
    repair::{LlmPromptRepairer, PromptRepairer},
    scenes::ScenePlanner,
    scoring::{ClipScorer, HttpClipModel, ImageScorer, SimilarityModel},
    storyboard::{StoryRequest, Storyboard, StoryboardPipeline},
    style::SceneConfig,
    workflow::{CancelFlag, ExecutionContext},
};

pub const GEMINI_API_KEY_VAR: &str = "GEMINI_API_KEY";
pub const OPENAI_API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const CLIP_ENDPOINT_VAR: &str = "CLIP_ENDPOINT";
pub const CLIP_API_KEY_VAR: &str = "CLIP_API_KEY";

/// Builder for [`ToonClient`].
///
/// Hosted collaborators are wired from API keys; any of them can be replaced
/// with a custom implementation through the `with_*` overrides.
pub struct ToonClientBuilder {
    gemini_key: Option<String>,
    openai_key: Option<String>,
    clip_endpoint: Option<String>,
    clip_api_key: Option<String>,
    text_model: Model,
    image_model: String,
    render_config: RenderConfig,
    text_generator: Option<Arc<dyn TextGenerator>>,
    image_generator: Option<Arc<dyn ImageGenerator>>,
    similarity_model: Option<Arc<dyn SimilarityModel>>,
    scorer: Option<Arc<dyn ImageScorer>>,
    repairer: Option<Arc<dyn PromptRepairer>>,
}

impl Default for ToonClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ToonClientBuilder {
    pub fn new() -> Self {
        Self {
            gemini_key: None,
            openai_key: None,
            clip_endpoint: None,
            clip_api_key: None,
            text_model: Model::Gemini25Flash,
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            render_config: RenderConfig::default(),
            text_generator: None,
            image_generator: None,
            similarity_model: None,
            scorer: None,
            repairer: None,
        }
    }

    /// Read `GEMINI_API_KEY`, `OPENAI_API_KEY`, `CLIP_ENDPOINT` and `CLIP_API_KEY`.
    ///
    /// Unset variables are simply skipped; `build` reports what is still missing.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        let mut builder = Self::new();
        builder.gemini_key = var(GEMINI_API_KEY_VAR);
        builder.openai_key = var(OPENAI_API_KEY_VAR);
        builder.clip_endpoint = var(CLIP_ENDPOINT_VAR);
        builder.clip_api_key = var(CLIP_API_KEY_VAR);
        builder
    }

    pub fn with_gemini_key(mut self, key: impl Into<String>) -> Self {
        self.gemini_key = Some(key.into());
        self
    }

    pub fn with_openai_key(mut self, key: impl Into<String>) -> Self {
        self.openai_key = Some(key.into());
        self
    }

    /// CLIP similarity endpoint; see [`HttpClipModel`] for the wire format.
    pub fn with_clip_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.clip_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_clip_api_key(mut self, key: impl Into<String>) -> Self {
        self.clip_api_key = Some(key.into());
        self
    }

    /// Set the Gemini model used for planning, scoring support and repair.
    pub fn with_text_model(mut self, model: Model) -> Self {
        self.text_model = model;
        self
    }

    pub fn with_image_model(mut self, model: impl Into<String>) -> Self {
        self.image_model = model.into();
        self
    }

    /// Apply a complete render configuration.
    pub fn with_render_config(mut self, config: RenderConfig) -> Self {
        self.render_config = config;
        self
    }

    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.render_config.max_attempts = attempts;
        self
    }

    /// Set the accept and minimum-acceptable thresholds.
    pub fn with_thresholds(mut self, accept: f32, minimum: f32) -> Self {
        self.render_config.accept_threshold = accept;
        self.render_config.min_acceptable_threshold = minimum;
        self
    }

    /// Upper bound on every collaborator call, including HTTP requests.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.render_config.call_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.render_config.backoff_base = base;
        self.render_config.backoff_max = max;
        self
    }

    pub fn with_text_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.text_generator = Some(generator);
        self
    }

    pub fn with_image_generator(mut self, generator: Arc<dyn ImageGenerator>) -> Self {
        self.image_generator = Some(generator);
        self
    }

    /// Use a custom similarity model inside the default [`ClipScorer`].
    pub fn with_similarity_model(mut self, model: Arc<dyn SimilarityModel>) -> Self {
        self.similarity_model = Some(model);
        self
    }

    /// Replace the whole scorer.
    pub fn with_scorer(mut self, scorer: Arc<dyn ImageScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn with_repairer(mut self, repairer: Arc<dyn PromptRepairer>) -> Self {
        self.repairer = Some(repairer);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<ToonClient> {
        self.render_config.validate()?;
        let http = build_client(self.render_config.call_timeout)?;

        let text: Arc<dyn TextGenerator> = match (self.text_generator, self.gemini_key) {
            (Some(generator), _) => generator,
            (None, Some(key)) => {
                let gemini = Arc::new(Gemini::with_model(&key, self.text_model.clone())?);
                Arc::new(GeminiGenerator::new(gemini))
            }
            (None, None) => {
                return Err(missing("text generator", GEMINI_API_KEY_VAR));
            }
        };

        let images: Arc<dyn ImageGenerator> = match (self.image_generator, self.openai_key) {
            (Some(generator), _) => generator,
            (None, Some(key)) => Arc::new(
                OpenAiImageGenerator::new(http.clone(), key).with_model(self.image_model),
            ),
            (None, None) => return Err(missing("image generator", OPENAI_API_KEY_VAR)),
        };

        let scorer: Arc<dyn ImageScorer> = match self.scorer {
            Some(scorer) => scorer,
            None => {
                let model: Arc<dyn SimilarityModel> =
                    match (self.similarity_model, self.clip_endpoint) {
                        (Some(model), _) => model,
                        (None, Some(endpoint)) => {
                            let mut clip = HttpClipModel::new(http.clone(), endpoint);
                            if let Some(key) = self.clip_api_key {
                                clip = clip.with_api_key(key);
                            }
                            Arc::new(clip)
                        }
                        (None, None) => return Err(missing("similarity model", CLIP_ENDPOINT_VAR)),
                    };
                Arc::new(
                    ClipScorer::new(model, text.clone())
                        .with_threshold(self.render_config.accept_threshold),
                )
            }
        };

        let repairer: Arc<dyn PromptRepairer> = match self.repairer {
            Some(repairer) => repairer,
            None => Arc::new(LlmPromptRepairer::new(text.clone())),
        };

        let render_loop =
            RenderLoop::new(images, scorer, repairer).with_config(self.render_config);
        let planner = ScenePlanner::new(text);

        info!(
            max_attempts = render_loop.config().max_attempts,
            accept = render_loop.config().accept_threshold,
            "Toon client ready"
        );
        Ok(ToonClient {
            storyboards: StoryboardPipeline::new(planner.clone(), render_loop.clone()),
            render_loop,
            planner,
            artifacts: ArtifactStore::new(http),
        })
    }
}

fn missing(what: &str, var: &str) -> ToonError {
    ToonError::Config(format!(
        "no {what} configured: set {var} or provide a custom implementation"
    ))
}

/// Entry point for rendering single scenes and whole storyboards.
#[derive(Clone)]
pub struct ToonClient {
    render_loop: RenderLoop,
    planner: ScenePlanner,
    storyboards: StoryboardPipeline,
    artifacts: ArtifactStore,
}

impl ToonClient {
    pub fn builder() -> ToonClientBuilder {
        ToonClientBuilder::new()
    }

    /// Render one scene description with the generate, score and repair loop.
    ///
    /// # Example
    /// ```rust,no_run
    /// # use toonsmith::prelude::*;
    /// # async fn example() -> std::result::Result<(), Box<dyn std::error::Error>> {
    /// let client = ToonClientBuilder::from_env().build()?;
    /// let ctx = ExecutionContext::new();
    /// let outcome = client
    ///     .render("A girl holds a glowing snowflake", &SceneConfig::new(), &ctx)
    ///     .await?;
    /// if let Some(artifact) = outcome.artifact() {
    ///     println!("{artifact}");
    /// }
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn render(
        &self,
        description: &str,
        config: &SceneConfig,
        ctx: &ExecutionContext,
    ) -> Result<RenderOutcome> {
        self.render_loop.run(description, config, ctx, None).await
    }

    /// Like [`render`](Self::render), stopping before the next attempt once `cancel` is set.
    pub async fn render_with_cancel(
        &self,
        description: &str,
        config: &SceneConfig,
        ctx: &ExecutionContext,
        cancel: &CancelFlag,
    ) -> Result<RenderOutcome> {
        self.render_loop
            .run(description, config, ctx, Some(cancel))
            .await
    }

    /// Plan scenes from the request text and render each cut in order.
    pub async fn storyboard(
        &self,
        request: &StoryRequest,
        ctx: &ExecutionContext,
    ) -> Result<Storyboard> {
        self.storyboards.run(request, ctx, None).await
    }

    pub async fn storyboard_with_cancel(
        &self,
        request: &StoryRequest,
        ctx: &ExecutionContext,
        cancel: &CancelFlag,
    ) -> Result<Storyboard> {
        self.storyboards.run(request, ctx, Some(cancel)).await
    }

    pub fn planner(&self) -> &ScenePlanner {
        &self.planner
    }

    pub fn artifact_store(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn render_config(&self) -> &RenderConfig {
        self.render_loop.config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_reports_missing_collaborators() {
        let err = ToonClientBuilder::new().build().err().unwrap();
        assert!(matches!(err, ToonError::Config(ref m) if m.contains(GEMINI_API_KEY_VAR)));

        let err = ToonClientBuilder::new()
            .with_gemini_key("g")
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ToonError::Config(ref m) if m.contains(OPENAI_API_KEY_VAR)));

        let err = ToonClientBuilder::new()
            .with_gemini_key("g")
            .with_openai_key("o")
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ToonError::Config(ref m) if m.contains(CLIP_ENDPOINT_VAR)));
    }

    #[test]
    fn test_build_with_keys_and_settings() {
        let client = ToonClientBuilder::new()
            .with_gemini_key("g")
            .with_openai_key("o")
            .with_clip_endpoint("http://localhost:8000/similarity")
            .with_max_attempts(5)
            .with_thresholds(0.8, 0.5)
            .build()
            .unwrap();
        assert_eq!(client.render_config().max_attempts, 5);
        assert_eq!(client.render_config().accept_threshold, 0.8);
        assert_eq!(client.render_config().min_acceptable_threshold, 0.5);
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let err = ToonClientBuilder::new()
            .with_gemini_key("g")
            .with_openai_key("o")
            .with_clip_endpoint("http://localhost")
            .with_thresholds(0.5, 0.9)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ToonError::Config(_)));
    }
}
