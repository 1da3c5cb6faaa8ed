use thiserror::Error;

/// Error types for queue construction and configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Requested capacity is too small to hold a usable ring (minimum 2).
    #[error("invalid capacity {requested} (minimum 2)")]
    InvalidCapacity {
        /// The capacity the caller asked for.
        requested: usize,
    },
    /// Requested operation has no supported realization on this queue.
    #[error("operation not supported")]
    Unsupported,
}
