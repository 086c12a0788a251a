#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gemini_rust::GenerationConfig;
use toonsmith::prelude::*;

/// Render config with no pauses between failed attempts.
pub fn fast_config(max_attempts: usize) -> RenderConfig {
    RenderConfig {
        max_attempts,
        backoff_base: Duration::ZERO,
        ..Default::default()
    }
}

/// Image generator that succeeds or fails according to a script.
/// Calls past the end of the script succeed.
#[derive(Default)]
pub struct ScriptedImages {
    script: Mutex<VecDeque<bool>>,
    pub prompts: Mutex<Vec<String>>,
    pub inline: bool,
    pub delay: Option<Duration>,
}

impl ScriptedImages {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_script(script: &[bool]) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.iter().copied().collect()),
            ..Default::default()
        })
    }

    pub fn inline() -> Arc<Self> {
        Arc::new(Self {
            inline: true,
            ..Default::default()
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Default::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl ImageGenerator for ScriptedImages {
    async fn generate(&self, request: &ImageRequest) -> Result<GeneratedImage> {
        let call = {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(request.prompt.clone());
            prompts.len() - 1
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let succeed = self.script.lock().unwrap().pop_front().unwrap_or(true);
        if !succeed {
            return Err(ToonError::api("images", 503, "overloaded"));
        }
        let artifact = if self.inline {
            ArtifactRef::new("data:image/png;base64,aGVsbG8=")
        } else {
            ArtifactRef::new(format!("https://img.test/{call}.png"))
        };
        Ok(GeneratedImage {
            artifact,
            revised_prompt: None,
            seed: Some(call as i64),
        })
    }
}

/// Scorer returning scripted scores; `None` is a scoring failure.
/// Calls past the end of the script score 0.0.
#[derive(Default)]
pub struct ScriptedScorer {
    script: Mutex<VecDeque<Option<f32>>>,
    pub seen: Mutex<Vec<(ArtifactRef, String)>>,
    /// Raised on the first scoring call, as a user stopping mid-run would.
    pub cancel_on_score: Option<CancelFlag>,
}

impl ScriptedScorer {
    pub fn new(script: &[Option<f32>]) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.iter().copied().collect()),
            ..Default::default()
        })
    }

    pub fn cancelling(scores: &[f32], cancel: &CancelFlag) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(scores.iter().map(|s| Some(*s)).collect()),
            cancel_on_score: Some(cancel.clone()),
            ..Default::default()
        })
    }

    pub fn scores(scores: &[f32]) -> Arc<Self> {
        Self::new(&scores.iter().map(|s| Some(*s)).collect::<Vec<_>>())
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl ImageScorer for ScriptedScorer {
    async fn score(&self, artifact: &ArtifactRef, description: &str) -> Result<ValidationResult> {
        self.seen
            .lock()
            .unwrap()
            .push((artifact.clone(), description.to_string()));
        if let Some(cancel) = &self.cancel_on_score {
            cancel.cancel();
        }
        match self.script.lock().unwrap().pop_front().unwrap_or(Some(0.0)) {
            Some(score) => Ok(ValidationResult::new(score, 0.7)
                .with_suggestions(vec!["add falling snow".to_string()])),
            None => Err(ToonError::timeout("similarity", Duration::from_secs(60))),
        }
    }
}

/// Repairer that appends the missing elements, or always fails.
#[derive(Default)]
pub struct RecordingRepairer {
    pub fail: bool,
    pub calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl RecordingRepairer {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Default::default()
        })
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl PromptRepairer for RecordingRepairer {
    async fn repair(
        &self,
        prompt: &str,
        missing_elements: &[String],
        _config: &SceneConfig,
    ) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((prompt.to_string(), missing_elements.to_vec()));
        if self.fail {
            return Err(ToonError::EmptyResponse("repairer".into()));
        }
        Ok(format!("{prompt}, {}", missing_elements.join(", ")))
    }
}

/// Text generator driven by a closure over (system, prompt).
pub struct FnText<F>(pub F);

#[async_trait]
impl<F> TextGenerator for FnText<F>
where
    F: Fn(Option<&str>, &str) -> Result<String> + Send + Sync,
{
    async fn generate_text(
        &self,
        system: Option<&str>,
        prompt: &str,
        _config: GenerationConfig,
    ) -> Result<String> {
        (self.0)(system, prompt)
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
