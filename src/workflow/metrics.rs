//! Metrics and context for render execution.
//!
//! The [`ExecutionContext`] is the explicit replacement for UI session state:
//! callers create one per job, pass it into every render call, and read the
//! metrics and trace back out afterwards.

use std::sync::{Arc, Mutex};

use serde::Serialize;

use super::events::{RenderEvent, TraceEntry};
use crate::models::{GenerationAttempt, RenderOutcome};

/// Aggregated counters for one or more render runs.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RenderMetrics {
    /// Calls made to the image generator.
    pub generation_calls: usize,
    /// Calls made to the scorer.
    pub scoring_calls: usize,
    /// Collaborator calls that failed or timed out.
    pub transport_failures: usize,
    /// Prompt repairs performed.
    pub repairs: usize,
    /// Render runs that reached a terminal state.
    pub renders_completed: usize,
    /// Collected failure messages.
    pub failures: Vec<String>,
}

impl RenderMetrics {
    /// Fold one attempt into the counters.
    pub fn record_attempt(&mut self, attempt: &GenerationAttempt) {
        self.generation_calls += 1;
        if attempt.image.is_some() {
            self.scoring_calls += 1;
        }
        if let Some(error) = &attempt.error {
            self.transport_failures += 1;
            self.failures
                .push(format!("attempt {}: {}", attempt.attempt_index, error));
        }
    }

    pub fn record_repair(&mut self) {
        self.repairs += 1;
    }

    pub fn record_failure(&mut self, error: String) {
        self.failures.push(error);
    }

    pub fn record_render(&mut self) {
        self.renders_completed += 1;
    }
}

/// Context passed to every render call.
///
/// Cloneable and thread-safe; clones share the same metrics and trace.
///
/// ```rust,ignore
/// let ctx = ExecutionContext::new();
/// let outcome = client.render("A girl holds a snowflake", &config, &ctx).await?;
/// for entry in ctx.trace_snapshot() {
///     println!("{:?}", entry.event);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub metrics: Arc<Mutex<RenderMetrics>>,
    pub traces: Arc<Mutex<Vec<TraceEntry>>>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(Mutex::new(RenderMetrics::default())),
            traces: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Record an attempt in both metrics and trace.
    pub fn record_attempt(&self, attempt: &GenerationAttempt) {
        self.metrics.lock().unwrap().record_attempt(attempt);
        self.emit(RenderEvent::AttemptRecorded {
            attempt_index: attempt.attempt_index,
            score: attempt.score(),
            error: attempt.error.clone(),
        });
    }

    pub fn record_repair(&self, attempt_index: usize) {
        self.metrics.lock().unwrap().record_repair();
        self.emit(RenderEvent::PromptRepaired { attempt_index });
    }

    /// Count a finished render run.
    pub fn record_outcome(&self, outcome: &RenderOutcome) {
        self.metrics.lock().unwrap().record_render();
        if outcome.artifact().is_none() {
            self.record_failure("render finished without a result");
        }
    }

    pub fn record_failure(&self, error: impl Into<String>) {
        self.metrics.lock().unwrap().record_failure(error.into());
    }

    pub fn snapshot(&self) -> RenderMetrics {
        self.metrics.lock().unwrap().clone()
    }

    /// Append an event to the trace log. Events are timestamped when emitted.
    pub fn emit(&self, event: RenderEvent) {
        self.traces.lock().unwrap().push(TraceEntry::new(event));
    }

    pub fn trace_snapshot(&self) -> Vec<TraceEntry> {
        self.traces.lock().unwrap().clone()
    }

    /// States visited by the render loop, in order.
    pub fn state_history(&self) -> Vec<crate::models::LoopState> {
        self.traces
            .lock()
            .unwrap()
            .iter()
            .filter_map(|entry| match &entry.event {
                RenderEvent::StateChanged { state, .. } => Some(*state),
                _ => None,
            })
            .collect()
    }

    pub fn clear_traces(&self) {
        self.traces.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArtifactRef, GeneratedImage, LoopState, ValidationResult};

    fn image() -> GeneratedImage {
        GeneratedImage {
            artifact: ArtifactRef::new("https://img.example/a.png"),
            revised_prompt: None,
            seed: None,
        }
    }

    #[test]
    fn test_attempt_counters() {
        let ctx = ExecutionContext::new();
        ctx.record_attempt(&GenerationAttempt::generation_failed(0, "p".into(), "timeout"));
        ctx.record_attempt(&GenerationAttempt::scoring_failed(1, "p".into(), image(), "503"));
        ctx.record_attempt(&GenerationAttempt::scored(
            2,
            "p".into(),
            image(),
            ValidationResult::new(0.8, 0.7),
        ));

        let m = ctx.snapshot();
        assert_eq!(m.generation_calls, 3);
        assert_eq!(m.scoring_calls, 2);
        assert_eq!(m.transport_failures, 2);
        assert_eq!(m.failures.len(), 2);
        assert_eq!(ctx.trace_snapshot().len(), 3);
    }

    #[test]
    fn test_clones_share_state() {
        let ctx = ExecutionContext::new();
        let other = ctx.clone();
        other.emit(RenderEvent::StateChanged {
            attempt_index: 0,
            state: LoopState::Generating,
        });
        assert_eq!(ctx.state_history(), vec![LoopState::Generating]);
        ctx.clear_traces();
        assert!(other.trace_snapshot().is_empty());
    }
}
