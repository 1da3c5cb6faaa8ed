use std::sync::atomic::{AtomicUsize, Ordering};

/// Process-wide default for the bounded queue's look-ahead batch width, used
/// whenever a [`BoundedConfig`] is not given an explicit override.
static DEFAULT_MAX_LOOK_AHEAD_STEP: AtomicUsize = AtomicUsize::new(4096);

/// Returns the current process-wide default look-ahead step.
#[inline]
pub fn default_max_look_ahead_step() -> usize {
    DEFAULT_MAX_LOOK_AHEAD_STEP.load(Ordering::Relaxed)
}

/// Overrides the process-wide default look-ahead step for queues constructed
/// after this call. Existing queues are unaffected.
#[inline]
pub fn set_default_max_look_ahead_step(step: usize) {
    DEFAULT_MAX_LOOK_AHEAD_STEP.store(step.max(2), Ordering::Relaxed);
}

/// Configuration for [`crate::bounded::BoundedMpmcQueue`].
#[derive(Debug, Clone, Copy)]
pub struct BoundedConfig {
    /// Requested capacity before power-of-two normalization.
    pub requested_capacity: usize,
    /// Upper bound on the bulk drain/fill look-ahead window width.
    pub max_look_ahead_step: usize,
}

impl BoundedConfig {
    /// Creates a configuration using the process-wide default look-ahead step.
    #[inline]
    pub fn new(requested_capacity: usize) -> Self {
        Self {
            requested_capacity,
            max_look_ahead_step: default_max_look_ahead_step(),
        }
    }

    /// Overrides the look-ahead step for this configuration only.
    #[inline]
    #[must_use]
    pub fn with_max_look_ahead_step(mut self, step: usize) -> Self {
        self.max_look_ahead_step = step.max(2);
        self
    }
}

impl Default for BoundedConfig {
    fn default() -> Self {
        Self::new(1024)
    }
}
