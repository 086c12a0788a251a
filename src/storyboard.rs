//! Multi-cut storyboards: plan scenes from text, then run the render loop once per cut.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    error::{Result, ToonError},
    models::{ArtifactRef, RenderOutcome},
    prompt::{EXPLAINER_NEGATIVE_PROMPT, NARRATIVE_NEGATIVE_PROMPT},
    render::RenderLoop,
    scenes::{ScenePlanner, MAX_NARRATIVE_SCENES},
    style::{SceneConfig, VisualizationType},
    workflow::{CancelFlag, ExecutionContext, RenderEvent},
};

/// How the source text is turned into cuts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryMode {
    /// A story told as consecutive webtoon scenes.
    Narrative,
    /// Educational content drawn as minimalist diagrams, one caption per cut.
    Explainer(VisualizationType),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoryRequest {
    pub text: String,
    /// Number of cuts to render, 1 to 4.
    pub cut_count: usize,
    pub scene_config: SceneConfig,
    pub mode: StoryMode,
}

impl StoryRequest {
    pub fn narrative(text: impl Into<String>, cut_count: usize) -> Self {
        Self {
            text: text.into(),
            cut_count,
            scene_config: SceneConfig::default(),
            mode: StoryMode::Narrative,
        }
    }

    pub fn explainer(
        text: impl Into<String>,
        visualization: VisualizationType,
        cut_count: usize,
    ) -> Self {
        Self {
            text: text.into(),
            cut_count,
            scene_config: SceneConfig::explainer(visualization),
            mode: StoryMode::Explainer(visualization),
        }
    }

    pub fn with_scene_config(mut self, scene_config: SceneConfig) -> Self {
        self.scene_config = scene_config;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(ToonError::InvalidInput("story text must not be empty".into()));
        }
        if !(1..=MAX_NARRATIVE_SCENES).contains(&self.cut_count) {
            return Err(ToonError::InvalidInput(format!(
                "cut_count must be between 1 and {MAX_NARRATIVE_SCENES}, got {}",
                self.cut_count
            )));
        }
        Ok(())
    }

    /// Scene config with the explainer template forced on for explainer requests.
    ///
    /// A narrative negative preset is swapped for the explainer one; a custom
    /// negative prompt is kept.
    fn effective_scene_config(&self) -> SceneConfig {
        let mut config = self.scene_config.clone();
        if let StoryMode::Explainer(visualization) = self.mode {
            config.visualization = Some(visualization);
            if config.negative_prompt.as_deref() == Some(NARRATIVE_NEGATIVE_PROMPT) {
                config.negative_prompt = Some(EXPLAINER_NEGATIVE_PROMPT.to_string());
            }
        }
        config
    }
}

/// One rendered panel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cut {
    pub index: usize,
    pub scene: String,
    pub caption: Option<String>,
    pub outcome: RenderOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Storyboard {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub mode: StoryMode,
    pub cuts: Vec<Cut>,
}

impl Storyboard {
    /// Artifacts of cuts that produced an image, with their cut index.
    pub fn artifacts(&self) -> impl Iterator<Item = (usize, &ArtifactRef)> {
        self.cuts
            .iter()
            .filter_map(|cut| cut.outcome.artifact().map(|a| (cut.index, a)))
    }

    pub fn completed_cuts(&self) -> usize {
        self.artifacts().count()
    }
}

/// Plans scenes for a [`StoryRequest`] and renders them one after another.
#[derive(Clone)]
pub struct StoryboardPipeline {
    planner: ScenePlanner,
    render: RenderLoop,
}

impl StoryboardPipeline {
    pub fn new(planner: ScenePlanner, render: RenderLoop) -> Self {
        Self { planner, render }
    }

    #[instrument(skip_all, fields(cut_count = request.cut_count, mode = ?request.mode))]
    pub async fn run(
        &self,
        request: &StoryRequest,
        ctx: &ExecutionContext,
        cancel: Option<&CancelFlag>,
    ) -> Result<Storyboard> {
        request.validate()?;
        let scene_config = request.effective_scene_config();

        let scenes = match request.mode {
            StoryMode::Narrative => {
                self.planner
                    .narrative_scenes(&request.text, &scene_config, request.cut_count)
                    .await?
            }
            StoryMode::Explainer(_) => {
                self.planner
                    .explainer_scenes(&request.text, request.cut_count)
                    .await?
            }
        };
        ctx.emit(RenderEvent::ScenesPlanned {
            count: scenes.len(),
        });
        info!(scenes = scenes.len(), "Scenes planned");

        let mut cuts = Vec::with_capacity(scenes.len());
        for (index, scene) in scenes.into_iter().take(request.cut_count).enumerate() {
            if cancel.is_some_and(CancelFlag::is_cancelled) {
                info!(cut = index, "Storyboard cancelled");
                break;
            }

            let outcome = self.render.run(&scene, &scene_config, ctx, cancel).await?;
            ctx.emit(RenderEvent::CutFinished {
                cut_index: index,
                state: outcome.final_state(),
                score: outcome.result.score(),
            });
            if outcome.artifact().is_none() {
                error!(cut = index, "Cut finished without an image");
            }

            let caption = match request.mode {
                StoryMode::Explainer(_) => Some(self.planner.caption(&scene).await),
                StoryMode::Narrative => None,
            };

            cuts.push(Cut {
                index,
                scene,
                caption,
                outcome,
            });
        }

        let storyboard = Storyboard {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            mode: request.mode,
            cuts,
        };
        info!(
            id = %storyboard.id,
            completed = storyboard.completed_cuts(),
            total = storyboard.cuts.len(),
            "Storyboard finished"
        );
        Ok(storyboard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_validation() {
        assert!(StoryRequest::narrative("A day at sea", 4).validate().is_ok());
        assert!(StoryRequest::narrative("A day at sea", 0).validate().is_err());
        assert!(StoryRequest::narrative("A day at sea", 5).validate().is_err());
        assert!(StoryRequest::narrative("   ", 2).validate().is_err());
    }

    #[test]
    fn test_explainer_request_forces_visualization() {
        let request = StoryRequest::explainer("Photosynthesis", VisualizationType::Process, 2)
            .with_scene_config(SceneConfig::new());
        let config = request.effective_scene_config();
        assert_eq!(config.visualization, Some(VisualizationType::Process));
        assert_eq!(
            config.negative_prompt.as_deref(),
            Some(EXPLAINER_NEGATIVE_PROMPT)
        );

        let custom = StoryRequest::explainer("Photosynthesis", VisualizationType::Explain, 1)
            .with_scene_config(
                SceneConfig::new().with_negative_prompt(Some("no arrows".to_string())),
            );
        assert_eq!(
            custom.effective_scene_config().negative_prompt.as_deref(),
            Some("no arrows")
        );

        let narrative = StoryRequest::narrative("A story", 1);
        assert_eq!(narrative.effective_scene_config().visualization, None);
    }
}
