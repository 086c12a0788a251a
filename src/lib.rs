//! Turn stories and articles into webtoon cuts.
//!
//! Each cut is produced by a bounded generation-validation loop: an image
//! model renders the scene, a CLIP-style scorer measures how well the image
//! matches the description, and a language model rewrites the prompt once if
//! the first render misses badly. The loop always terminates with an accepted
//! image, the best image it saw, or no result.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use toonsmith::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     // Reads GEMINI_API_KEY, OPENAI_API_KEY and CLIP_ENDPOINT.
//!     let client = ToonClientBuilder::from_env().build()?;
//!     let ctx = ExecutionContext::new();
//!
//!     let config = SceneConfig::new().with_mood(Mood::Warm);
//!     let outcome = client
//!         .render("A girl holds a glowing snowflake on a quiet street", &config, &ctx)
//!         .await?;
//!
//!     println!("{:?} -> {:?}", outcome.final_state(), outcome.artifact());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod files;
pub mod generator;
pub mod http;
pub mod image;
pub mod models;
pub mod prompt;
pub mod render;
pub mod repair;
pub mod scenes;
pub mod scoring;
pub mod storyboard;
pub mod style;
pub mod workflow;

pub use client::{ToonClient, ToonClientBuilder};
pub use error::{Result, ResultExt, ToonError};
pub use files::{ArtifactStore, SavedArtifact};
pub use generator::{GeminiGenerator, TextGenerator};
pub use image::{ImageGenerator, ImageRequest, OpenAiImageGenerator, ResponseFormat};
pub use models::{
    Acceptance, ArtifactRef, GeneratedImage, GenerationAttempt, LoopState, RenderOutcome,
    RenderResult, ValidationResult,
};
pub use render::{Decision, RenderConfig, RenderLoop};
pub use repair::{LlmPromptRepairer, PromptRepairer};
pub use scenes::{ScenePlan, ScenePlanner};
pub use scoring::{ClipScorer, HttpClipModel, ImageScorer, SimilarityModel};
pub use storyboard::{Cut, StoryMode, StoryRequest, Storyboard, StoryboardPipeline};
pub use style::{AspectRatio, Composition, Mood, SceneConfig, Style, VisualizationType};
pub use workflow::{CancelFlag, ExecutionContext, RenderEvent, RenderMetrics, TraceEntry};

/// Prelude module for convenient imports.
///
/// ```rust
/// use toonsmith::prelude::*;
/// ```
pub mod prelude {
    pub use crate::client::{ToonClient, ToonClientBuilder};
    pub use crate::error::{Result, ResultExt, ToonError};
    pub use crate::files::{ArtifactStore, SavedArtifact};
    pub use crate::generator::TextGenerator;
    pub use crate::image::{ImageGenerator, ImageRequest};
    pub use crate::models::{
        Acceptance, ArtifactRef, GeneratedImage, LoopState, RenderOutcome, RenderResult,
        ValidationResult,
    };
    pub use crate::render::{RenderConfig, RenderLoop};
    pub use crate::repair::PromptRepairer;
    pub use crate::scoring::{ImageScorer, SimilarityModel};
    pub use crate::storyboard::{StoryMode, StoryRequest, Storyboard};
    pub use crate::style::{AspectRatio, Composition, Mood, SceneConfig, Style, VisualizationType};
    pub use crate::workflow::{CancelFlag, ExecutionContext, RenderEvent};

    // Re-export commonly used external types
    pub use gemini_rust::Model;
}
