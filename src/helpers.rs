//! Convenience bulk-iteration helpers layered on top of the capped
//! `drain`/`fill` primitives.
//!
//! These are deliberately kept outside [`crate::mpq::MessagePassingQueue`]:
//! the lock-free core only ever claims a bounded number of slots per call.
//! Looping until a queue is exhausted, or until some external condition
//! flips, is ordinary application glue, not part of the algorithm.

use crate::backoff::Backoff;
use crate::bounded::BoundedMpmcQueue;
use crate::linked::UnboundedBaseLinkedQueue;

/// Governs how a bulk helper waits between unsuccessful attempts.
pub trait WaitStrategy {
    /// Called once per unsuccessful attempt; implementations typically spin
    /// or yield.
    fn idle(&mut self);
}

/// A [`WaitStrategy`] built on the crate's adaptive [`Backoff`].
#[derive(Debug, Default)]
pub struct BackoffWait(Backoff);

impl WaitStrategy for BackoffWait {
    fn idle(&mut self) {
        self.0.snooze();
    }
}

/// Governs when an unbounded bulk helper should stop looping.
pub trait ExitCondition {
    /// Returns `false` once the helper should stop, even if more elements
    /// could still be drained/filled.
    fn keep_running(&mut self) -> bool;
}

/// An [`ExitCondition`] that never stops early.
#[derive(Debug, Default)]
pub struct RunForever;

impl ExitCondition for RunForever {
    fn keep_running(&mut self) -> bool {
        true
    }
}

/// Drains the queue down to empty, one capped `drain_batched` call at a
/// time, and returns as soon as a call comes back empty. Unlike
/// [`drain_while`], this never waits for more elements to arrive — it is the
/// uncapped counterpart to [`BoundedMpmcQueue::drain_batched`].
pub fn drain_all<T, C>(queue: &BoundedMpmcQueue<T>, mut consumer: C) -> usize
where
    C: FnMut(T),
{
    let mut total = 0;
    loop {
        let n = queue.drain_batched(&mut consumer, queue.capacity_usize());
        total += n;
        if n == 0 {
            return total;
        }
    }
}

/// Fills the queue to capacity, one capped `fill` call at a time, and
/// returns as soon as a call comes back short. Unlike [`fill_while`], this
/// never waits for room to free up — it is the uncapped counterpart to
/// [`BoundedMpmcQueue::fill`].
pub fn fill_all<T, S>(queue: &BoundedMpmcQueue<T>, mut supplier: S) -> usize
where
    S: FnMut() -> T,
{
    let mut total = 0;
    loop {
        let n = queue.fill(&mut supplier, queue.capacity_usize());
        total += n;
        if n < queue.capacity_usize() {
            return total;
        }
    }
}

/// Drains every element currently available (and any that arrive while
/// draining), spin-waiting between empty attempts, until `exit` says to
/// stop.
pub fn drain_while<T, C, W, E>(
    queue: &BoundedMpmcQueue<T>,
    mut consumer: C,
    mut wait: W,
    mut exit: E,
) -> usize
where
    C: FnMut(T),
    W: WaitStrategy,
    E: ExitCondition,
{
    let mut total = 0;
    while exit.keep_running() {
        let n = queue.drain_batched(&mut consumer, usize::MAX.min(queue.capacity_usize()));
        if n == 0 {
            wait.idle();
        } else {
            total += n;
        }
    }
    total
}

/// Fills the queue as fast as `supplier` can produce values, spin-waiting
/// between full attempts, until `exit` says to stop.
pub fn fill_while<T, S, W, E>(
    queue: &BoundedMpmcQueue<T>,
    mut supplier: S,
    mut wait: W,
    mut exit: E,
) -> usize
where
    S: FnMut() -> T,
    W: WaitStrategy,
    E: ExitCondition,
{
    let mut total = 0;
    while exit.keep_running() {
        let n = queue.fill(&mut supplier, queue.capacity_usize());
        if n == 0 {
            wait.idle();
        } else {
            total += n;
        }
    }
    total
}

/// Drains every element the linked queue can currently reach, stopping only
/// when `exit` says to.
pub fn drain_all_linked<T, C, W, E>(
    queue: &UnboundedBaseLinkedQueue<T>,
    mut consumer: C,
    mut wait: W,
    mut exit: E,
) -> usize
where
    C: FnMut(T),
    W: WaitStrategy,
    E: ExitCondition,
{
    let mut total = 0;
    while exit.keep_running() {
        match queue.relaxed_poll() {
            Some(v) => {
                consumer(v);
                total += 1;
            }
            None => wait.idle(),
        }
    }
    total
}
