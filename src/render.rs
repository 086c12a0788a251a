use std::future::Future;
use std::sync::Arc;

use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, instrument, warn};

use crate::{
    error::{Result, ToonError},
    image::{ImageGenerator, ImageRequest},
    models::{Acceptance, GenerationAttempt, LoopState, RenderOutcome, RenderResult},
    prompt::render_prompt,
    repair::PromptRepairer,
    scoring::ImageScorer,
    style::SceneConfig,
    workflow::{CancelFlag, ExecutionContext, RenderEvent},
};

/// Configuration for the render loop.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderConfig {
    /// Maximum number of generation calls (default: 3)
    pub max_attempts: usize,
    /// Score that ends the loop immediately (default: 0.7)
    pub accept_threshold: f32,
    /// Score accepted on any attempt after the first (default: 0.6)
    pub min_acceptable_threshold: f32,
    /// Upper bound on each collaborator call (default: 60s)
    pub call_timeout: Duration,
    /// First pause after a failed call; doubles per consecutive failure (default: 200ms)
    pub backoff_base: Duration,
    /// Longest pause between attempts (default: 10s)
    pub backoff_max: Duration,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            accept_threshold: 0.7,
            min_acceptable_threshold: 0.6,
            call_timeout: Duration::from_secs(60),
            backoff_base: Duration::from_millis(200),
            backoff_max: Duration::from_secs(10),
        }
    }
}

impl RenderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ToonError::Config("max_attempts must be at least 1".into()));
        }
        let in_unit = |v: f32| (0.0..=1.0).contains(&v);
        if !in_unit(self.accept_threshold) || !in_unit(self.min_acceptable_threshold) {
            return Err(ToonError::Config(format!(
                "thresholds must lie in [0, 1] (accept {}, minimum {})",
                self.accept_threshold, self.min_acceptable_threshold
            )));
        }
        if self.min_acceptable_threshold > self.accept_threshold {
            return Err(ToonError::Config(format!(
                "minimum threshold {} exceeds accept threshold {}",
                self.min_acceptable_threshold, self.accept_threshold
            )));
        }
        if self.call_timeout.is_zero() {
            return Err(ToonError::Config("call_timeout must be non-zero".into()));
        }
        Ok(())
    }

    /// Pause before the next attempt after `consecutive_failures` failed calls in a row.
    pub fn backoff_delay(&self, consecutive_failures: u32, provider_hint: Option<u64>) -> Duration {
        let exp = self
            .backoff_base
            .saturating_mul(2_u32.saturating_pow(consecutive_failures.saturating_sub(1)));
        let hinted = provider_hint
            .map(Duration::from_secs)
            .map_or(exp, |hint| hint.max(exp));
        hinted.min(self.backoff_max)
    }

    /// Pause after a failed call. Errors that will fail the same way again get none.
    pub fn pause_after(&self, consecutive_failures: u32, err: &ToonError) -> Duration {
        if !err.is_retryable() {
            return Duration::ZERO;
        }
        self.backoff_delay(consecutive_failures, err.retry_delay())
    }
}

/// What the decision policy wants after a scored attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept(Acceptance),
    /// First attempt fell below the minimum: rewrite the prompt, then retry.
    Repair,
    Retry,
}

impl RenderConfig {
    /// Apply the acceptance policy to the score of attempt `attempt_index`.
    pub fn decide(&self, attempt_index: usize, score: f32) -> Decision {
        if score >= self.accept_threshold {
            Decision::Accept(Acceptance::Ideal)
        } else if score >= self.min_acceptable_threshold && attempt_index >= 1 {
            Decision::Accept(Acceptance::GoodEnough)
        } else if attempt_index == 0 && score < self.min_acceptable_threshold {
            Decision::Repair
        } else {
            Decision::Retry
        }
    }
}

/// Runs the bounded generate, score and repair loop for one description.
#[derive(Clone)]
pub struct RenderLoop {
    images: Arc<dyn ImageGenerator>,
    scorer: Arc<dyn ImageScorer>,
    repairer: Arc<dyn PromptRepairer>,
    config: RenderConfig,
}

impl RenderLoop {
    pub fn new(
        images: Arc<dyn ImageGenerator>,
        scorer: Arc<dyn ImageScorer>,
        repairer: Arc<dyn PromptRepairer>,
    ) -> Self {
        Self {
            images,
            scorer,
            repairer,
            config: RenderConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RenderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.config.max_attempts = max_attempts;
        self
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Render `description` into the best-matching image within the attempt budget.
    ///
    /// Collaborator failures never surface as errors; they are recorded as
    /// attempts and the loop moves on. Only invalid input or configuration
    /// returns `Err`, and it does so before any external call.
    #[instrument(skip_all, fields(max_attempts = self.config.max_attempts))]
    pub async fn run(
        &self,
        description: &str,
        scene: &SceneConfig,
        ctx: &ExecutionContext,
        cancel: Option<&CancelFlag>,
    ) -> Result<RenderOutcome> {
        let description = description.trim();
        if description.is_empty() {
            return Err(ToonError::InvalidInput("description must not be empty".into()));
        }
        self.config.validate()?;

        let max_attempts = self.config.max_attempts;
        let mut attempts: Vec<GenerationAttempt> = Vec::with_capacity(max_attempts);
        let mut scene_text = description.to_string();
        let mut repaired_prompt: Option<String> = None;
        let mut consecutive_failures = 0_u32;
        let mut cancelled = false;

        for attempt_index in 0..max_attempts {
            if cancel.is_some_and(CancelFlag::is_cancelled) {
                info!(attempt = attempt_index, "Render cancelled before attempt");
                cancelled = true;
                break;
            }
            let is_last = attempt_index + 1 == max_attempts;

            self.transition(ctx, attempt_index, LoopState::Generating);
            let prompt = render_prompt(&scene_text, scene);
            let request = ImageRequest {
                prompt: prompt.clone(),
                aspect_ratio: scene.aspect_ratio,
                negative_prompt: scene.negative_prompt.clone(),
            };

            let image = match self
                .bounded("image generation", self.images.generate(&request))
                .await
            {
                Ok(image) => image,
                Err(err) => {
                    warn!(
                        attempt = attempt_index,
                        transport = err.is_transport(),
                        "Image generation failed: {}",
                        err
                    );
                    let attempt =
                        GenerationAttempt::generation_failed(attempt_index, prompt, err.to_string());
                    ctx.record_attempt(&attempt);
                    attempts.push(attempt);
                    consecutive_failures += 1;
                    if !is_last {
                        self.pause(consecutive_failures, &err).await;
                    }
                    continue;
                }
            };

            self.transition(ctx, attempt_index, LoopState::Scoring);
            let validation = match self
                .bounded("image scoring", self.scorer.score(&image.artifact, description))
                .await
            {
                Ok(validation) => validation,
                Err(err) => {
                    warn!(
                        attempt = attempt_index,
                        transport = err.is_transport(),
                        "Scoring failed: {}",
                        err
                    );
                    let attempt = GenerationAttempt::scoring_failed(
                        attempt_index,
                        prompt,
                        image,
                        err.to_string(),
                    );
                    ctx.record_attempt(&attempt);
                    attempts.push(attempt);
                    consecutive_failures += 1;
                    if !is_last {
                        self.pause(consecutive_failures, &err).await;
                    }
                    continue;
                }
            };
            consecutive_failures = 0;

            let score = validation.similarity_score;
            let artifact = image.artifact.clone();
            let suggestions = validation.suggestions.clone();
            let attempt = GenerationAttempt::scored(attempt_index, prompt, image, validation);
            ctx.record_attempt(&attempt);
            attempts.push(attempt);

            self.transition(ctx, attempt_index, LoopState::Deciding);
            match self.config.decide(attempt_index, score) {
                Decision::Accept(acceptance) => {
                    info!(attempt = attempt_index, score, ?acceptance, "Image accepted");
                    let result = RenderResult::Accepted {
                        attempt_index,
                        artifact,
                        score,
                        acceptance,
                    };
                    return Ok(self.finish(ctx, result, attempts, repaired_prompt, false));
                }
                Decision::Repair if !is_last && repaired_prompt.is_none() => {
                    self.transition(ctx, attempt_index, LoopState::Repairing);
                    match self
                        .bounded(
                            "prompt repair",
                            self.repairer.repair(&scene_text, &suggestions, scene),
                        )
                        .await
                    {
                        Ok(revised) => {
                            debug!(revised = %revised, "Using repaired scene text");
                            ctx.record_repair(attempt_index);
                            scene_text = revised.clone();
                            repaired_prompt = Some(revised);
                        }
                        Err(err) => {
                            warn!(error = %err, "Prompt repair failed; keeping the original prompt");
                        }
                    }
                }
                Decision::Repair | Decision::Retry => {
                    debug!(attempt = attempt_index, score, "Score below acceptance; retrying");
                }
            }
        }

        let result = match best_attempt(&attempts) {
            Some((attempt_index, artifact, score)) => RenderResult::BestEffort {
                attempt_index,
                artifact,
                score,
            },
            None => RenderResult::NoResult,
        };
        match &result {
            RenderResult::BestEffort {
                attempt_index,
                score,
                ..
            } => info!(
                attempt = attempt_index,
                score, "Budget exhausted; returning best attempt"
            ),
            _ => warn!(attempts = attempts.len(), "No attempt produced a scoreable image"),
        }
        Ok(self.finish(ctx, result, attempts, repaired_prompt, cancelled))
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match timeout(self.config.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ToonError::timeout(operation, self.config.call_timeout)),
        }
    }

    async fn pause(&self, consecutive_failures: u32, err: &ToonError) {
        let delay = self.config.pause_after(consecutive_failures, err);
        if !delay.is_zero() {
            debug!(delay_ms = delay.as_millis() as u64, "Backing off before next attempt");
            sleep(delay).await;
        }
    }

    fn transition(&self, ctx: &ExecutionContext, attempt_index: usize, state: LoopState) {
        debug!(attempt = attempt_index, ?state, "Render state");
        ctx.emit(RenderEvent::StateChanged {
            attempt_index,
            state,
        });
    }

    fn finish(
        &self,
        ctx: &ExecutionContext,
        result: RenderResult,
        attempts: Vec<GenerationAttempt>,
        repaired_prompt: Option<String>,
        cancelled: bool,
    ) -> RenderOutcome {
        let last_index = attempts.last().map_or(0, |a| a.attempt_index);
        self.transition(ctx, last_index, result.terminal_state());
        let outcome = RenderOutcome {
            result,
            attempts,
            repaired_prompt,
            cancelled,
        };
        ctx.record_outcome(&outcome);
        outcome
    }
}

/// Highest finite-scoring attempt with an artifact; ties go to the earliest.
fn best_attempt(
    attempts: &[GenerationAttempt],
) -> Option<(usize, crate::models::ArtifactRef, f32)> {
    attempts
        .iter()
        .filter_map(|a| Some((a.attempt_index, a.artifact()?, a.score()?)))
        .filter(|(_, _, score)| score.is_finite())
        .fold(None, |best: Option<(usize, &crate::models::ArtifactRef, f32)>, candidate| match best {
            Some(b) if b.2.total_cmp(&candidate.2).is_ge() => Some(b),
            _ => Some(candidate),
        })
        .map(|(index, artifact, score)| (index, artifact.clone(), score))
}
