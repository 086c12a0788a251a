//! Scene planning: split a story or article into renderable scenes, and caption them.

use std::sync::Arc;

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument, warn};

use crate::{
    error::{Result, ToonError},
    generator::{generate_trimmed, text_config, TextGenerator},
    prompt::truncate_chars,
    style::SceneConfig,
};

/// Upper bound on cuts in one narrative storyboard.
pub const MAX_NARRATIVE_SCENES: usize = 4;
pub const CAPTION_LIMIT: usize = 100;
pub const CAPTION_FALLBACK_LIMIT: usize = 50;

/// Structured reply requested from the language model.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ScenePlan {
    /// Consecutive scenes, each a self-contained visual description.
    pub scenes: Vec<String>,
}

/// Turns long text into scenes and scenes into captions.
#[derive(Clone)]
pub struct ScenePlanner {
    text: Arc<dyn TextGenerator>,
}

impl ScenePlanner {
    pub fn new(text: Arc<dyn TextGenerator>) -> Self {
        Self { text }
    }

    /// Convert a story into at most `max` (and never more than four) webtoon scenes.
    ///
    /// A JSON reply matching [`ScenePlan`] is preferred; any other reply is
    /// split into one scene per non-empty line.
    #[instrument(skip_all, fields(max = max))]
    pub async fn narrative_scenes(
        &self,
        text: &str,
        config: &SceneConfig,
        max: usize,
    ) -> Result<Vec<String>> {
        let text = non_empty(text)?;
        let limit = max.clamp(1, MAX_NARRATIVE_SCENES);
        let character = config
            .character_description
            .as_deref()
            .unwrap_or("not specified");

        let prompt = format!(
            "Turn the following into consecutive webtoon scenes.\n\n\
             Story: {text}\n\
             Main character: {character}\n\
             Mood: {mood}\n\
             Style: {style}\n\n\
             Every scene must include:\n\
             1. The character's clear action and expression\n\
             2. A concrete background\n\
             3. The atmosphere or emotion of the moment\n\
             4. Elements that can be drawn\n\
             Write at most {limit} scenes, each specific enough to draw in webtoon style.",
            mood = config.mood,
            style = config.style,
        );

        let mut generation = text_config(0.7);
        generation.response_schema = Some(scene_plan_schema());
        generation.response_mime_type = Some("application/json".to_string());

        let reply = self.text.generate_text(None, &prompt, generation).await?;
        let mut scenes = parse_scene_reply(&reply);
        if scenes.is_empty() {
            return Err(ToonError::EmptyResponse("scene planner".into()));
        }
        scenes.truncate(limit);
        debug!(count = scenes.len(), "Planned narrative scenes");
        Ok(scenes)
    }

    /// Split explanatory content into `count` visualizable scenes.
    ///
    /// Falls back to the whole text as a single scene when the model call fails.
    #[instrument(skip_all, fields(count = count))]
    pub async fn explainer_scenes(&self, text: &str, count: usize) -> Result<Vec<String>> {
        let text = non_empty(text)?;
        let count = count.max(1);
        let prompt = format!(
            "Split the following content into {count} key scenes.\n\
             Each scene must be something that can be shown visually.\n\n\
             Criteria:\n\
             1. Prefer important concepts and core ideas\n\
             2. Prefer parts that are easy to draw\n\
             3. Keep the logical flow of the content\n\
             4. Reduce complex content to simple relationships\n\
             5. Turn abstract ideas into concrete metaphors\n\n\
             Content:\n{text}\n\n\
             Describe each scene in one or two sentences focused on visual elements, \
             and separate scenes with a blank line."
        );

        match generate_trimmed(self.text.as_ref(), None, &prompt, 0.5).await {
            Ok(reply) => {
                let mut scenes = split_paragraphs(&reply);
                if scenes.is_empty() {
                    return Ok(vec![text.to_string()]);
                }
                scenes.truncate(count);
                Ok(scenes)
            }
            Err(err) => {
                error!(error = %err, "Scene splitting failed; using the whole text");
                Ok(vec![text.to_string()])
            }
        }
    }

    /// One objective sentence describing `scene`, at most 100 characters.
    pub async fn caption(&self, scene: &str) -> String {
        let system = "Describe the following visualization briefly:\n\
                      1. One sentence\n\
                      2. Objective description\n\
                      3. Key elements only\n\
                      4. At most 50 characters";
        match generate_trimmed(self.text.as_ref(), Some(system), scene, 0.7).await {
            Ok(caption) => truncate_chars(&caption, CAPTION_LIMIT),
            Err(err) => {
                warn!(error = %err, "Caption generation failed");
                truncate_chars(scene.trim(), CAPTION_FALLBACK_LIMIT)
            }
        }
    }
}

fn non_empty(text: &str) -> Result<&str> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ToonError::InvalidInput("text must not be empty".into()));
    }
    Ok(text)
}

/// Gemini rejects the `$schema` and `title` keywords at the root.
fn scene_plan_schema() -> serde_json::Value {
    let mut schema = serde_json::to_value(schema_for!(ScenePlan)).unwrap_or_default();
    if let Some(map) = schema.as_object_mut() {
        map.remove("$schema");
        map.remove("title");
    }
    schema
}

/// Parse a planner reply: JSON first (optionally fenced), then plain lines.
pub fn parse_scene_reply(reply: &str) -> Vec<String> {
    let cleaned = strip_code_fence(reply);
    if let Ok(plan) = serde_json::from_str::<ScenePlan>(cleaned) {
        return plan
            .scenes
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Ok(list) = serde_json::from_str::<Vec<String>>(cleaned) {
        return list
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    reply
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("```"))
        .map(str::to_string)
        .collect()
}

fn split_paragraphs(reply: &str) -> Vec<String> {
    reply
        .split("\n\n")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gemini_rust::GenerationConfig;
    use std::sync::Mutex;

    struct Scripted {
        reply: Option<String>,
        last_config: Mutex<Option<GenerationConfig>>,
    }

    impl Scripted {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(reply.to_string()),
                last_config: Mutex::new(None),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                last_config: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for Scripted {
        async fn generate_text(
            &self,
            _system: Option<&str>,
            _prompt: &str,
            config: GenerationConfig,
        ) -> Result<String> {
            *self.last_config.lock().unwrap() = Some(config);
            self.reply
                .clone()
                .ok_or_else(|| ToonError::api("gemini", 503, "unavailable"))
        }
    }

    #[test]
    fn test_parse_scene_reply_json_and_lines() {
        let json = r#"{"scenes": ["A girl wakes up", "  ", "She sees snow"]}"#;
        assert_eq!(parse_scene_reply(json), vec!["A girl wakes up", "She sees snow"]);

        let fenced = "```json\n{\"scenes\": [\"One\", \"Two\"]}\n```";
        assert_eq!(parse_scene_reply(fenced), vec!["One", "Two"]);

        let lines = "Scene 1: a bus stop\n\nScene 2: rain starts\n";
        assert_eq!(
            parse_scene_reply(lines),
            vec!["Scene 1: a bus stop", "Scene 2: rain starts"]
        );
    }

    #[test]
    fn test_schema_has_scenes_property() {
        let schema = scene_plan_schema();
        assert!(schema.get("$schema").is_none());
        assert!(schema["properties"]["scenes"].is_object());
    }

    #[tokio::test]
    async fn test_narrative_scenes_caps_at_four_and_requests_json() {
        let text = Scripted::ok(r#"{"scenes": ["a", "b", "c", "d", "e", "f"]}"#);
        let planner = ScenePlanner::new(text.clone());
        let scenes = planner
            .narrative_scenes("A long day", &SceneConfig::new(), 10)
            .await
            .unwrap();
        assert_eq!(scenes.len(), 4);

        let config = text.last_config.lock().unwrap().clone().unwrap();
        assert_eq!(config.response_mime_type.as_deref(), Some("application/json"));
        assert!(config.response_schema.is_some());

        let two = planner
            .narrative_scenes("A long day", &SceneConfig::new(), 2)
            .await
            .unwrap();
        assert_eq!(two, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_empty_text_is_rejected() {
        let planner = ScenePlanner::new(Scripted::ok("x"));
        let err = planner
            .narrative_scenes("  ", &SceneConfig::new(), 4)
            .await
            .unwrap_err();
        assert!(matches!(err, ToonError::InvalidInput(_)));
        assert!(planner.explainer_scenes("", 3).await.is_err());
    }

    #[tokio::test]
    async fn test_explainer_scenes_split_and_fallback() {
        let planner = ScenePlanner::new(Scripted::ok("Sun heats water.\n\nVapor rises.\n\nClouds form."));
        let scenes = planner.explainer_scenes("The water cycle", 2).await.unwrap();
        assert_eq!(scenes, vec!["Sun heats water.", "Vapor rises."]);

        let planner = ScenePlanner::new(Scripted::failing());
        let scenes = planner.explainer_scenes("The water cycle", 3).await.unwrap();
        assert_eq!(scenes, vec!["The water cycle"]);
    }

    #[tokio::test]
    async fn test_caption_limits_and_fallback() {
        let long = "가".repeat(150);
        let planner = ScenePlanner::new(Scripted::ok(&long));
        assert_eq!(planner.caption("scene").await.chars().count(), 100);

        let planner = ScenePlanner::new(Scripted::failing());
        let scene = "나".repeat(80);
        assert_eq!(planner.caption(&scene).await, "나".repeat(50));
    }
}
