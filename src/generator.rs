//! Abstract text generation interface.
//!
//! Scene planning, captioning, scorer support and prompt repair all talk to a
//! language model through [`TextGenerator`], so any of them can run against a
//! different backend or a test double.

use std::sync::Arc;

use async_trait::async_trait;
use gemini_rust::{Content, Gemini, GenerationConfig, Message, Role};

use crate::error::{Result, ToonError};

/// Abstract interface for text generation.
///
/// # Example
///
/// ```rust,ignore
/// use toonsmith::generator::TextGenerator;
///
/// async fn caption(generator: &dyn TextGenerator, scene: &str) -> Result<String> {
///     generator.generate_text(
///         Some("Describe the picture in one sentence."),
///         scene,
///         GenerationConfig::default(),
///     ).await
/// }
/// ```
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate text based on a prompt and optional system instruction.
    async fn generate_text(
        &self,
        system: Option<&str>,
        prompt: &str,
        config: GenerationConfig,
    ) -> Result<String>;
}

#[async_trait]
impl TextGenerator for Arc<Gemini> {
    async fn generate_text(
        &self,
        system: Option<&str>,
        prompt: &str,
        config: GenerationConfig,
    ) -> Result<String> {
        let mut builder = self.generate_content();

        if let Some(sys) = system {
            builder = builder.with_system_instruction(sys);
        }

        builder = builder.with_generation_config(config);
        builder = builder.with_message(Message {
            role: Role::User,
            content: Content::text(prompt).with_role(Role::User),
        });

        let response = builder.execute().await?;
        Ok(response.text())
    }
}

/// A wrapper around `Arc<Gemini>` that implements `TextGenerator`.
#[derive(Clone)]
pub struct GeminiGenerator {
    client: Arc<Gemini>,
}

impl GeminiGenerator {
    pub fn new(client: Arc<Gemini>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate_text(
        &self,
        system: Option<&str>,
        prompt: &str,
        config: GenerationConfig,
    ) -> Result<String> {
        self.client.generate_text(system, prompt, config).await
    }
}

/// Plain-text generation config at the given temperature.
pub fn text_config(temperature: f32) -> GenerationConfig {
    GenerationConfig {
        temperature: Some(temperature),
        ..Default::default()
    }
}

/// Generate text and trim it, treating a blank reply as a failure.
pub async fn generate_trimmed(
    generator: &dyn TextGenerator,
    system: Option<&str>,
    prompt: &str,
    temperature: f32,
) -> Result<String> {
    let text = generator
        .generate_text(system, prompt, text_config(temperature))
        .await?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ToonError::EmptyResponse("text generator".to_string()));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct MockGenerator {
        response: String,
    }

    #[async_trait]
    impl TextGenerator for MockGenerator {
        async fn generate_text(
            &self,
            _system: Option<&str>,
            _prompt: &str,
            _config: GenerationConfig,
        ) -> Result<String> {
            Ok(self.response.clone())
        }
    }

    #[tokio::test]
    async fn test_generator_as_trait_object() {
        let generator: Arc<dyn TextGenerator> = Arc::new(MockGenerator {
            response: "Test response".to_string(),
        });

        let result = generator
            .generate_text(Some("System"), "Prompt", GenerationConfig::default())
            .await
            .unwrap();

        assert_eq!(result, "Test response");
    }

    #[tokio::test]
    async fn test_generate_trimmed_strips_whitespace() {
        let generator = MockGenerator {
            response: "\n  a quiet snowy street \n".to_string(),
        };
        let text = generate_trimmed(&generator, None, "scene", 0.3)
            .await
            .unwrap();
        assert_eq!(text, "a quiet snowy street");
    }

    #[tokio::test]
    async fn test_generate_trimmed_rejects_blank() {
        let generator = MockGenerator {
            response: "   ".to_string(),
        };
        let err = generate_trimmed(&generator, None, "scene", 0.3)
            .await
            .unwrap_err();
        assert!(matches!(err, ToonError::EmptyResponse(_)));
        assert!(err.is_transport());
    }
}
