//! Render one scene against the hosted services.
//!
//! Requires `GEMINI_API_KEY`, `OPENAI_API_KEY` and `CLIP_ENDPOINT`.
//!
//! ```sh
//! RUST_LOG=toonsmith=debug cargo run --example render_scene -- "A girl holds a snowflake"
//! ```

use toonsmith::prelude::*;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let description = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "A girl holds a glowing snowflake on a quiet winter street".into());

    let client = ToonClientBuilder::from_env().build()?;
    let ctx = ExecutionContext::new();
    let config = SceneConfig::new()
        .with_style(Style::Webtoon)
        .with_composition(Composition::CharacterAndBackground)
        .with_mood(Mood::Warm)
        .with_character("a ten-year-old girl in a red scarf");

    let outcome = client.render(&description, &config, &ctx).await?;

    println!("Final state: {:?}", outcome.final_state());
    for attempt in &outcome.attempts {
        println!(
            "  attempt {}: score {:?} error {:?}",
            attempt.attempt_index,
            attempt.score(),
            attempt.error
        );
    }
    if let Some(repaired) = &outcome.repaired_prompt {
        println!("Repaired scene: {repaired}");
    }

    match outcome.artifact() {
        Some(artifact) => {
            let saved = client
                .artifact_store()
                .download(artifact, "output", "scene")
                .await?;
            println!("Saved {} (sha256 {})", saved.path.display(), saved.sha256);
        }
        None => println!("No image was produced."),
    }

    println!("Metrics: {:#?}", ctx.snapshot());
    Ok(())
}
