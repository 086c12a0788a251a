//! One-shot prompt repair after a poorly matching first render.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::{
    error::Result,
    generator::{generate_trimmed, TextGenerator},
    style::SceneConfig,
};

const REPAIR_TEMPERATURE: f32 = 0.7;

/// Rewrites a scene prompt so the next render covers what the scorer found missing.
#[async_trait]
pub trait PromptRepairer: Send + Sync {
    async fn repair(
        &self,
        prompt: &str,
        missing_elements: &[String],
        config: &SceneConfig,
    ) -> Result<String>;
}

/// [`PromptRepairer`] that asks a language model to rewrite the scene.
#[derive(Clone)]
pub struct LlmPromptRepairer {
    text: Arc<dyn TextGenerator>,
}

impl LlmPromptRepairer {
    pub fn new(text: Arc<dyn TextGenerator>) -> Self {
        Self { text }
    }

    fn build_prompt(prompt: &str, missing_elements: &[String], config: &SceneConfig) -> String {
        let missing = if missing_elements.is_empty() {
            "(none reported)".to_string()
        } else {
            missing_elements
                .iter()
                .map(|m| format!("- {m}"))
                .collect::<Vec<_>>()
                .join("\n")
        };

        format!(
            "Improve the following scene description:\n\
             1. Keep its key visual elements and make them more specific\n\
             2. Work in the missing elements listed below\n\
             3. Reflect a {style} style and a {mood} mood naturally\n\
             4. Express the characters' emotions and actions vividly\n\
             5. Use background and lighting to strengthen the atmosphere\n\n\
             Missing elements:\n{missing}\n\n\
             Original description:\n{prompt}\n\n\
             Return only the improved description.",
            style = config.style,
            mood = config.mood,
        )
    }
}

#[async_trait]
impl PromptRepairer for LlmPromptRepairer {
    #[instrument(skip_all, fields(missing = missing_elements.len()))]
    async fn repair(
        &self,
        prompt: &str,
        missing_elements: &[String],
        config: &SceneConfig,
    ) -> Result<String> {
        let request = Self::build_prompt(prompt, missing_elements, config);
        let revised = generate_trimmed(self.text.as_ref(), None, &request, REPAIR_TEMPERATURE).await?;
        debug!(revised = %revised, "Prompt repaired");
        Ok(revised)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToonError;
    use crate::style::{Mood, Style};
    use gemini_rust::GenerationConfig;
    use std::sync::Mutex;

    struct EchoGenerator {
        seen: Mutex<Option<String>>,
        reply: Option<String>,
    }

    #[async_trait]
    impl TextGenerator for EchoGenerator {
        async fn generate_text(
            &self,
            _system: Option<&str>,
            prompt: &str,
            _config: GenerationConfig,
        ) -> Result<String> {
            *self.seen.lock().unwrap() = Some(prompt.to_string());
            self.reply
                .clone()
                .ok_or_else(|| ToonError::EmptyResponse("echo".into()))
        }
    }

    #[tokio::test]
    async fn test_repair_mentions_missing_elements_and_style() {
        let text = Arc::new(EchoGenerator {
            seen: Mutex::new(None),
            reply: Some("  A girl in falling snow lifts a glowing snowflake.  ".into()),
        });
        let repairer = LlmPromptRepairer::new(text.clone());
        let config = SceneConfig::new().with_style(Style::Cartoon).with_mood(Mood::Warm);

        let revised = repairer
            .repair(
                "A girl holds a snowflake",
                &["falling snow".to_string()],
                &config,
            )
            .await
            .unwrap();

        assert_eq!(revised, "A girl in falling snow lifts a glowing snowflake.");
        let seen = text.seen.lock().unwrap().clone().unwrap();
        assert!(seen.contains("- falling snow"));
        assert!(seen.contains("cartoon style"));
        assert!(seen.contains("warm mood"));
    }

    #[tokio::test]
    async fn test_repair_failure_is_reported() {
        let text = Arc::new(EchoGenerator {
            seen: Mutex::new(None),
            reply: None,
        });
        let repairer = LlmPromptRepairer::new(text);
        let result = repairer.repair("scene", &[], &SceneConfig::new()).await;
        assert!(result.is_err());
    }
}
