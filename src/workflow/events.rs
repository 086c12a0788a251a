//! Structured events recorded while rendering.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::LoopState;

/// Something that happened during a render or storyboard run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RenderEvent {
    /// The render loop moved to a new state.
    StateChanged {
        attempt_index: usize,
        state: LoopState,
    },
    /// An attempt finished and was added to the history.
    AttemptRecorded {
        attempt_index: usize,
        score: Option<f32>,
        error: Option<String>,
    },
    /// The one-time prompt repair replaced the scene text.
    PromptRepaired { attempt_index: usize },
    /// Scene planning produced the listed number of scenes.
    ScenesPlanned { count: usize },
    /// A storyboard cut reached a terminal state.
    CutFinished {
        cut_index: usize,
        state: LoopState,
        score: Option<f32>,
    },
}

/// A timestamped [`RenderEvent`].
#[derive(Debug, Clone, Serialize)]
pub struct TraceEntry {
    pub timestamp: DateTime<Utc>,
    pub event: RenderEvent,
}

impl TraceEntry {
    pub fn new(event: RenderEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}
