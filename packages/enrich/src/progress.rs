//! Progress reporting for yearly runs and attribute stages.
//!
//! The pipeline reports through [`ProgressCallback`] so the library never
//! depends on a terminal. Binaries plug in `indicatif` bars; tests and
//! library callers that don't care pass [`null_progress()`].

use std::sync::Arc;

/// Receives progress from long-running pipeline operations.
///
/// Implementations must be `Send + Sync` so one handle can be shared
/// through an `Arc` between the orchestrator and its stages.
pub trait ProgressCallback: Send + Sync {
    /// Sets the total number of units (years, stages, datasets).
    fn set_total(&self, total: u64);

    /// Sets the absolute position.
    fn set_position(&self, pos: u64);

    /// Advances by `delta` units.
    fn inc(&self, delta: u64);

    /// Replaces the message shown next to the indicator.
    fn set_message(&self, msg: String);

    /// Completes with a final message.
    fn finish(&self, msg: String);

    /// Completes and removes the indicator.
    fn finish_and_clear(&self);
}

/// [`ProgressCallback`] that ignores every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn set_position(&self, _pos: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
    fn finish_and_clear(&self) {}
}

/// Shared [`NullProgress`] handle.
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
