//! Build a storyboard offline with stand-in collaborators.
//!
//! ```sh
//! cargo run --example mock_storyboard
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use gemini_rust::GenerationConfig;
use toonsmith::prelude::*;

struct CannedText;

#[async_trait]
impl TextGenerator for CannedText {
    async fn generate_text(
        &self,
        _system: Option<&str>,
        prompt: &str,
        _config: GenerationConfig,
    ) -> Result<String> {
        if prompt.contains("consecutive webtoon scenes") {
            return Ok(r#"{"scenes": [
                "Mina waits at a snowy bus stop, breath fogging",
                "A single snowflake lands on her red glove",
                "She laughs as the bus lights glow through the snow"
            ]}"#
            .to_string());
        }
        Ok(format!("{prompt} (more vivid)"))
    }
}

/// Hands out placeholder URLs.
#[derive(Default)]
struct PlaceholderImages {
    calls: AtomicUsize,
}

#[async_trait]
impl ImageGenerator for PlaceholderImages {
    async fn generate(&self, request: &ImageRequest) -> Result<GeneratedImage> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(GeneratedImage {
            artifact: ArtifactRef::new(format!(
                "https://placehold.co/{}?text=cut{n}",
                request.aspect_ratio.image_size()
            )),
            revised_prompt: None,
            seed: Some(n as i64),
        })
    }
}

/// Scores improve with every call, so the loop exercises repair and acceptance.
#[derive(Default)]
struct RisingScorer {
    calls: AtomicUsize,
}

#[async_trait]
impl ImageScorer for RisingScorer {
    async fn score(&self, _artifact: &ArtifactRef, _description: &str) -> Result<ValidationResult> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let score = [0.35, 0.62, 0.78][n % 3];
        Ok(ValidationResult::new(score, 0.7)
            .with_suggestions(vec!["show the falling snow more clearly".into()]))
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let client = ToonClientBuilder::new()
        .with_text_generator(Arc::new(CannedText))
        .with_image_generator(Arc::new(PlaceholderImages::default()))
        .with_scorer(Arc::new(RisingScorer::default()))
        .build()?;

    let ctx = ExecutionContext::new();
    let request = StoryRequest::narrative("Mina sees the first snow of winter", 3)
        .with_scene_config(SceneConfig::new().with_mood(Mood::Joyful));
    let storyboard = client.storyboard(&request, &ctx).await?;

    println!("Storyboard {} ({} cuts)", storyboard.id, storyboard.cuts.len());
    for cut in &storyboard.cuts {
        println!(
            "  cut {}: {:?} score {:?} -> {}",
            cut.index + 1,
            cut.outcome.final_state(),
            cut.outcome.result.score(),
            cut.outcome
                .artifact()
                .map(ToString::to_string)
                .unwrap_or_else(|| "no image".into())
        );
    }

    println!("{}", serde_json::to_string_pretty(&ctx.snapshot())?);
    Ok(())
}
