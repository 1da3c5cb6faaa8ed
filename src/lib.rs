//! Lock-free message-passing queues.
//!
//! This crate ships two independent queue implementations:
//!
//! - [`bounded::BoundedMpmcQueue`]: a fixed-capacity, multi-producer/
//!   multi-consumer ring buffer built on per-slot sequence tags (Vyukov's
//!   bounded MPMC algorithm).
//! - [`linked::UnboundedBaseLinkedQueue`]: an unbounded, multi-producer/
//!   single-consumer linked queue with an atomic tail swing.
//!
//! Both implement the shared [`mpq::MessagePassingQueue`] trait, which
//! separates strict operations (classical FIFO full/empty guarantees) from
//! relaxed ones (may spuriously report empty/full under contention but never
//! consult the opposite cursor). Bulk iteration beyond a single capped
//! `drain`/`fill` call lives in [`helpers`], layered on top rather than baked
//! into the core.

pub mod backoff;
pub mod bounded;
pub mod config;
pub mod error;
pub mod helpers;
pub mod linked;
pub mod mpq;

mod invariants;

pub use bounded::BoundedMpmcQueue;
pub use config::{default_max_look_ahead_step, set_default_max_look_ahead_step, BoundedConfig};
pub use error::QueueError;
pub use linked::UnboundedBaseLinkedQueue;
pub use mpq::MessagePassingQueue;
