//! Typed scene configuration.
//!
//! Every style, composition, mood and visualization choice is an enum whose
//! prompt guidance comes from an exhaustive `match`, so adding a variant is a
//! compile error until its guidance is written.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ToonError;
use crate::prompt::NARRATIVE_NEGATIVE_PROMPT;

macro_rules! labelled_enum {
    ($name:ident, $what:literal, { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $name {
            /// All variants in presentation order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The user-facing label.
            pub fn label(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }

        impl FromStr for $name {
            type Err = ToonError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let needle = s.trim();
                $name::ALL
                    .iter()
                    .find(|v| v.label().eq_ignore_ascii_case(needle))
                    .copied()
                    .ok_or_else(|| ToonError::InvalidInput(format!("unknown {}: '{}'", $what, s)))
            }
        }
    };
}

/// Drawing style of the rendered cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    Minimalist,
    Pictogram,
    Cartoon,
    #[default]
    Webtoon,
    Artistic,
}

labelled_enum!(Style, "style", {
    Minimalist => "minimalist",
    Pictogram => "pictogram",
    Cartoon => "cartoon",
    Webtoon => "webtoon",
    Artistic => "artistic",
});

impl Style {
    pub fn guide(&self) -> &'static str {
        match self {
            Style::Minimalist => {
                "minimal details, simple lines, clean composition, essential elements only"
            }
            Style::Pictogram => "symbolic representation, simplified shapes, icon-like style",
            Style::Cartoon => "animated style, exaggerated features, bold colors",
            Style::Webtoon => "webtoon style, manhwa art style, clean lines, vibrant colors",
            Style::Artistic => "painterly style, artistic interpretation, creative composition",
        }
    }
}

/// Camera framing of the cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Composition {
    CharacterAndBackground,
    CloseUp,
    Dialogue,
    Landscape,
    #[default]
    Standard,
}

labelled_enum!(Composition, "composition", {
    CharacterAndBackground => "character_and_background",
    CloseUp => "close_up",
    Dialogue => "dialogue",
    Landscape => "landscape",
    Standard => "standard",
});

impl Composition {
    pub fn guide(&self) -> &'static str {
        match self {
            Composition::CharacterAndBackground => {
                "balanced composition of character and background, eye-level shot"
            }
            Composition::CloseUp => "close-up shot, focused on character's expression",
            Composition::Dialogue => "two-shot composition, characters facing each other",
            Composition::Landscape => "wide shot, emphasis on background scenery",
            Composition::Standard => "standard view, balanced composition",
        }
    }
}

/// Emotional tone of the cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    #[default]
    Everyday,
    Tense,
    Serious,
    Warm,
    Joyful,
}

labelled_enum!(Mood, "mood", {
    Everyday => "everyday",
    Tense => "tense",
    Serious => "serious",
    Warm => "warm",
    Joyful => "joyful",
});

impl Mood {
    pub fn guide(&self) -> &'static str {
        match self {
            Mood::Everyday => "natural lighting, soft colors",
            Mood::Tense => "dramatic lighting, high contrast, intense atmosphere",
            Mood::Serious => "subdued lighting, serious atmosphere, formal composition",
            Mood::Warm => "warm colors, soft lighting, comfortable atmosphere",
            Mood::Joyful => "bright lighting, warm colors, dynamic composition",
        }
    }
}

/// Output frame shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "16:9")]
    Wide,
    #[serde(rename = "9:16")]
    Tall,
}

labelled_enum!(AspectRatio, "aspect ratio", {
    Square => "1:1",
    Wide => "16:9",
    Tall => "9:16",
});

impl AspectRatio {
    /// Image size understood by the image generation API.
    pub fn image_size(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1024x1024",
            AspectRatio::Wide => "1792x1024",
            AspectRatio::Tall => "1024x1792",
        }
    }
}

/// How an explainer cut presents its concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualizationType {
    Explain,
    Compare,
    Process,
    Principle,
}

labelled_enum!(VisualizationType, "visualization type", {
    Explain => "explain",
    Compare => "compare",
    Process => "process",
    Principle => "principle",
});

/// Prompt fragments for one [`VisualizationType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisualizationGuide {
    pub prompt: &'static str,
    pub layout: &'static str,
    pub elements: &'static str,
    pub style: &'static str,
}

impl VisualizationType {
    pub fn guide(&self) -> VisualizationGuide {
        match self {
            VisualizationType::Explain => VisualizationGuide {
                prompt: "simple minimalistic shapes, thin and sharp lines, clean composition, no text",
                layout: "minimalistic single-concept layout",
                elements: "sole object, no unnecessary shading or details",
                style: "educational minimalistic style with thin lines",
            },
            VisualizationType::Compare => VisualizationGuide {
                prompt: "two-column comparison, thin outlines, minimalistic shapes, clean layout, no unnecessary details",
                layout: "side-by-side layout, focus on clear differences",
                elements: "precise shapes, no shading, no text",
                style: "minimalistic cartoon style with fine lines",
            },
            VisualizationType::Process => VisualizationGuide {
                prompt: "step-by-step flow, clean lines, thin minimalistic shapes, cartoon-like simplicity without exaggeration",
                layout: "horizontal or vertical progression with arrows",
                elements: "single-colored shapes, no gradients, no text",
                style: "thin line cartoon minimalistic style",
            },
            VisualizationType::Principle => VisualizationGuide {
                prompt: "cause-and-effect diagram with minimalistic shapes, thin lines, plain white background, no text",
                layout: "input-output or cause-effect structure",
                elements: "clear, distinct shapes, no complex details",
                style: "scientific minimalistic style with cartoon simplicity",
            },
        }
    }
}

/// Caller-supplied rendering choices for one scene. Read-only to the render loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    pub style: Style,
    pub composition: Composition,
    pub mood: Mood,
    pub character_description: Option<String>,
    pub aspect_ratio: AspectRatio,
    /// Constraints passed to the image generator. `None` sends no negative prompt.
    pub negative_prompt: Option<String>,
    /// When set, prompts use the explainer template instead of the narrative one.
    pub visualization: Option<VisualizationType>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            style: Style::default(),
            composition: Composition::default(),
            mood: Mood::default(),
            character_description: None,
            aspect_ratio: AspectRatio::default(),
            negative_prompt: Some(NARRATIVE_NEGATIVE_PROMPT.to_string()),
            visualization: None,
        }
    }
}

impl SceneConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for an explainer cut: minimalist rendering with the explainer negative preset.
    pub fn explainer(visualization: VisualizationType) -> Self {
        Self {
            style: Style::Minimalist,
            negative_prompt: Some(crate::prompt::EXPLAINER_NEGATIVE_PROMPT.to_string()),
            visualization: Some(visualization),
            ..Self::default()
        }
    }

    pub fn with_style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    pub fn with_composition(mut self, composition: Composition) -> Self {
        self.composition = composition;
        self
    }

    pub fn with_mood(mut self, mood: Mood) -> Self {
        self.mood = mood;
        self
    }

    /// Set the main character description. Blank text clears it.
    pub fn with_character(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.character_description =
            (!description.trim().is_empty()).then(|| description.trim().to_string());
        self
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: AspectRatio) -> Self {
        self.aspect_ratio = aspect_ratio;
        self
    }

    pub fn with_negative_prompt(mut self, negative: Option<String>) -> Self {
        self.negative_prompt = negative;
        self
    }
}
