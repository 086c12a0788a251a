//! Execution context, metrics and trace events shared by render and storyboard runs.

mod events;
mod metrics;

pub use events::{RenderEvent, TraceEntry};
pub use metrics::{ExecutionContext, RenderMetrics};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag.
///
/// The render loop checks it between attempts, never in the middle of a call.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
