//! Rendering prompt assembly.

use crate::style::{SceneConfig, VisualizationType};

/// Negative prompt used for narrative cuts.
pub const NARRATIVE_NEGATIVE_PROMPT: &str = "abstract image, blurry image, low quality, \
unrealistic proportions, distorted face, extra limbs, text inside the image, speech bubbles, \
more than four people, national flags, cropped image, excessive filters, ungrammatical structure, \
duplicated features, bad anatomy, bad hands, overly complex background";

/// Negative prompt used for explainer cuts.
pub const EXPLAINER_NEGATIVE_PROMPT: &str = "detail, texture, pattern, gradient, shadow, 3d, \
realistic, decoration, background, icon, symbol, text, label, number, curved line, complex shape, \
multiple color, noise, dot, grid, frame, border, effect, design element";

/// Longest scene excerpt placed into an explainer prompt.
pub const EXPLAINER_CONTENT_LIMIT: usize = 200;

/// CLIP's text encoder accepts at most 77 tokens; summaries are kept within 77 characters.
pub const CLIP_TEXT_LIMIT: usize = 77;

/// Compose the positive rendering prompt for a scene.
pub fn render_prompt(scene: &str, config: &SceneConfig) -> String {
    match config.visualization {
        Some(visualization) => explainer_prompt(scene, visualization),
        None => narrative_prompt(scene, config),
    }
}

/// Scene text followed by style, composition and mood guidance.
pub fn narrative_prompt(scene: &str, config: &SceneConfig) -> String {
    let mut lines = vec![
        scene.trim().to_string(),
        format!("{},", config.style.guide()),
        format!("{},", config.composition.guide()),
        format!("{},", config.mood.guide()),
    ];
    if let Some(character) = &config.character_description {
        lines.push(format!("character description: {character}"));
    }
    lines.join("\n")
}

pub fn explainer_prompt(scene: &str, visualization: VisualizationType) -> String {
    let content = truncate_chars(scene.trim(), EXPLAINER_CONTENT_LIMIT);
    let guide = visualization.guide();

    format!(
        "Create a minimal-style illustration:\n\n\
         Main concept: {content}\n\n\
         Style requirements:\n\
         - minimalistic drawing\n\
         - Use only essential visual elements to explain the concept\n\
         - Focus on the information, not characters or backgrounds\n\
         - Simple, clean, vector-style graphics\n\
         - Minimal design with clear meaning\n\
         - Bold lines and simple shapes\n\
         - Core colors only (2-3 colors maximum)\n\
         - {prompt}\n\
         - Layout: {layout}\n\
         - Elements: {elements}\n\
         - Rendering: {style}\n\n\
         Must include:\n\
         - Clear visual representation of the concept\n\
         - Simple metaphors or symbols\n\
         - Essential objects only\n\
         - Key points highlighted visually\n\n\
         Must avoid:\n\
         - Characters or people\n\
         - Decorative elements\n\
         - Complex backgrounds\n\
         - Text labels\n\
         - Multiple scenes\n\
         - Any unnecessary details",
        prompt = guide.prompt,
        layout = guide.layout,
        elements = guide.elements,
        style = guide.style,
    )
}

/// Append the negative prompt the way image APIs without a dedicated field expect it.
pub fn with_negative(prompt: &str, negative: Option<&str>) -> String {
    match negative.map(str::trim).filter(|n| !n.is_empty()) {
        Some(negative) => format!("{prompt}\nNegative prompt: {negative}"),
        None => prompt.to_string(),
    }
}

/// Truncate to at most `max_chars` characters without splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Shorten text for CLIP without a language model.
///
/// Keeps the first 77 characters, cut back to the last '.' or ',' when that
/// punctuation sits past character 30.
pub fn clip_fallback_summary(text: &str) -> String {
    let truncated = truncate_chars(text.trim(), CLIP_TEXT_LIMIT);
    let cut = truncated
        .char_indices()
        .filter(|(_, c)| *c == '.' || *c == ',')
        .map(|(i, _)| i)
        .last();

    match cut {
        Some(idx) if truncated[..idx].chars().count() > 30 => truncated[..=idx].to_string(),
        _ => truncated,
    }
}
