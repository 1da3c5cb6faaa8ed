//! Fixed-capacity multi-producer/multi-consumer queue (Vyukov's bounded MPMC ring).

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

use crate::backoff::Backoff;
use crate::config::BoundedConfig;
use crate::error::QueueError;
use crate::invariants::{
    debug_assert_bounded_span, debug_assert_cursor_order, debug_assert_slot_sequence,
};
use crate::mpq::MessagePassingQueue;

struct Slot<T> {
    sequence: AtomicU64,
    value: UnsafeCell<MaybeUninit<T>>,
}

// SAFETY: access to `value` is always gated by a successful CAS on the owning
// cursor, which hands exclusive access of that slot to exactly one thread
// until the paired release-store on `sequence` is performed.
unsafe impl<T: Send> Sync for Slot<T> {}

/// A fixed-capacity, lock-free, multi-producer/multi-consumer queue.
///
/// Capacity is normalized up to the next power of two. Bulk [`Self::fill`] and
/// [`Self::drain`] opportunistically claim a window of several slots with a
/// single CAS (the "look-ahead" optimization) before falling back to one slot
/// at a time.
pub struct BoundedMpmcQueue<T> {
    buffer: Box<[Slot<T>]>,
    mask: u64,
    look_ahead_step: u64,
    producer_index: CachePadded<AtomicU64>,
    consumer_index: CachePadded<AtomicU64>,
}

// SAFETY: `BoundedMpmcQueue` hands out no interior references; every access
// to a slot's value is mediated by the sequence-tag protocol above.
unsafe impl<T: Send> Sync for BoundedMpmcQueue<T> {}
unsafe impl<T: Send> Send for BoundedMpmcQueue<T> {}

impl<T> BoundedMpmcQueue<T> {
    /// Creates a queue with at least `requested_capacity` slots (rounded up to
    /// the next power of two), using the process-wide default look-ahead
    /// step.
    pub fn new(requested_capacity: usize) -> Result<Self, QueueError> {
        Self::with_config(BoundedConfig::new(requested_capacity))
    }

    /// Creates a queue from an explicit [`BoundedConfig`].
    pub fn with_config(config: BoundedConfig) -> Result<Self, QueueError> {
        if config.requested_capacity < 2 {
            return Err(QueueError::InvalidCapacity {
                requested: config.requested_capacity,
            });
        }
        let capacity = config.requested_capacity.next_power_of_two();
        let mask = (capacity - 1) as u64;
        let look_ahead_step = (capacity as u64 / 4)
            .max(2)
            .min(config.max_look_ahead_step as u64);

        let buffer = (0..capacity)
            .map(|i| Slot {
                sequence: AtomicU64::new(i as u64),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            buffer,
            mask,
            look_ahead_step,
            producer_index: CachePadded::new(AtomicU64::new(0)),
            consumer_index: CachePadded::new(AtomicU64::new(0)),
        })
    }

    #[inline]
    fn slot(&self, index: u64) -> &Slot<T> {
        &self.buffer[(index & self.mask) as usize]
    }

    fn try_offer_at(&self, p_index: u64) -> OfferAttempt {
        let slot = self.slot(p_index);
        let seq = slot.sequence.load(Ordering::Acquire);
        debug_assert_slot_sequence!(seq, p_index);
        if seq == p_index {
            OfferAttempt::Free
        } else if seq < p_index {
            OfferAttempt::Full
        } else {
            OfferAttempt::Retry
        }
    }

    fn try_poll_at(&self, c_index: u64) -> PollAttempt {
        let slot = self.slot(c_index);
        let seq = slot.sequence.load(Ordering::Acquire);
        let expected = c_index.wrapping_add(1);
        debug_assert_slot_sequence!(seq, c_index);
        if seq == expected {
            PollAttempt::Ready
        } else if seq < expected {
            PollAttempt::Empty
        } else {
            PollAttempt::Retry
        }
    }

    /// Attempts a single offer of `e`. Returns `Ok(())` once published, or
    /// `Err(e)` handing the value back to the caller if the queue was
    /// (strictly or, if `relaxed`, spuriously) observed full.
    fn offer_strict_or_relaxed(&self, e: T, relaxed: bool) -> Result<(), T> {
        let mut p_index = self.producer_index.load(Ordering::Relaxed);
        loop {
            match self.try_offer_at(p_index) {
                OfferAttempt::Free => {
                    match self.producer_index.compare_exchange_weak(
                        p_index,
                        p_index.wrapping_add(1),
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    ) {
                        Ok(_) => {
                            let slot = self.slot(p_index);
                            unsafe { (*slot.value.get()).write(e) };
                            slot.sequence.store(p_index.wrapping_add(1), Ordering::Release);
                            return Ok(());
                        }
                        Err(actual) => p_index = actual,
                    }
                }
                OfferAttempt::Full => {
                    if relaxed {
                        return Err(e);
                    }
                    let c_index = self.consumer_index.load(Ordering::Acquire);
                    debug_assert_cursor_order!(c_index, p_index);
                    debug_assert_bounded_span!(p_index, c_index, self.mask + 1);
                    if p_index.wrapping_sub(self.mask + 1) >= c_index {
                        return Err(e);
                    }
                    p_index = self.producer_index.load(Ordering::Relaxed);
                }
                OfferAttempt::Retry => {
                    p_index = self.producer_index.load(Ordering::Relaxed);
                }
            }
        }
    }

    fn poll_strict_or_relaxed(&self, relaxed: bool) -> Option<T> {
        let mut c_index = self.consumer_index.load(Ordering::Relaxed);
        loop {
            match self.try_poll_at(c_index) {
                PollAttempt::Ready => {
                    match self.consumer_index.compare_exchange_weak(
                        c_index,
                        c_index.wrapping_add(1),
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    ) {
                        Ok(_) => {
                            let slot = self.slot(c_index);
                            let value = unsafe { (*slot.value.get()).assume_init_read() };
                            slot.sequence
                                .store(c_index.wrapping_add(self.mask + 1), Ordering::Release);
                            return Some(value);
                        }
                        Err(actual) => c_index = actual,
                    }
                }
                PollAttempt::Empty => {
                    if relaxed {
                        return None;
                    }
                    let p_index = self.producer_index.load(Ordering::Acquire);
                    if c_index >= p_index {
                        return None;
                    }
                    c_index = self.consumer_index.load(Ordering::Relaxed);
                }
                PollAttempt::Retry => {
                    c_index = self.consumer_index.load(Ordering::Relaxed);
                }
            }
        }
    }

    fn peek_strict_or_relaxed(&self, relaxed: bool) -> Option<T>
    where
        T: Clone,
    {
        loop {
            let c_index = self.consumer_index.load(Ordering::Acquire);
            match self.try_poll_at(c_index) {
                PollAttempt::Ready => {
                    let slot = self.slot(c_index);
                    let value = unsafe { (*slot.value.get()).assume_init_ref().clone() };
                    if self.consumer_index.load(Ordering::Acquire) == c_index {
                        return Some(value);
                    }
                    // A concurrent poll claimed this slot mid-read; retry.
                }
                PollAttempt::Empty => {
                    if relaxed {
                        return None;
                    }
                    let p_index = self.producer_index.load(Ordering::Acquire);
                    if c_index >= p_index {
                        return None;
                    }
                }
                PollAttempt::Retry => {}
            }
        }
    }

    /// Attempts to fill up to `limit` slots from `supplier`, using the
    /// look-ahead optimization to claim several slots per CAS when possible.
    /// Returns the number of elements written.
    pub fn fill<S: FnMut() -> T>(&self, mut supplier: S, limit: usize) -> usize {
        let mut filled = 0;
        while filled < limit {
            let remaining = limit - filled;
            let step = self.look_ahead_step.min(remaining as u64);
            if step > 1 && self.try_fill_batch(&mut supplier, step) {
                filled += step as usize;
                continue;
            }
            if self.offer_strict_or_relaxed(supplier(), false).is_ok() {
                filled += 1;
            } else {
                break;
            }
        }
        filled
    }

    fn try_fill_batch<S: FnMut() -> T>(&self, supplier: &mut S, step: u64) -> bool {
        let p_index = self.producer_index.load(Ordering::Relaxed);
        let look_ahead_index = p_index.wrapping_add(step - 1);
        let look_ahead_slot = self.slot(look_ahead_index);
        if look_ahead_slot.sequence.load(Ordering::Acquire) != look_ahead_index {
            return false;
        }
        if self
            .producer_index
            .compare_exchange(
                p_index,
                p_index.wrapping_add(step),
                Ordering::AcqRel,
                Ordering::Relaxed,
            )
            .is_err()
        {
            return false;
        }
        for i in 0..step {
            let index = p_index.wrapping_add(i);
            let slot = self.slot(index);
            while slot.sequence.load(Ordering::Acquire) != index {
                std::hint::spin_loop();
            }
            unsafe { (*slot.value.get()).write(supplier()) };
            slot.sequence.store(index.wrapping_add(1), Ordering::Release);
        }
        true
    }

    /// Removes up to `limit` elements and passes each to `consumer`, using the
    /// look-ahead optimization. Returns the number of elements drained.
    ///
    /// This is the inherent, capacity-aware counterpart of
    /// [`MessagePassingQueue::drain`].
    pub fn drain_batched<C: FnMut(T)>(&self, mut consumer: C, limit: usize) -> usize {
        let mut drained = 0;
        while drained < limit {
            let remaining = limit - drained;
            let step = self.look_ahead_step.min(remaining as u64);
            if step > 1 && self.try_drain_batch(&mut consumer, step) {
                drained += step as usize;
                continue;
            }
            match self.poll_strict_or_relaxed(false) {
                Some(v) => {
                    consumer(v);
                    drained += 1;
                }
                None => break,
            }
        }
        drained
    }

    fn try_drain_batch<C: FnMut(T)>(&self, consumer: &mut C, step: u64) -> bool {
        let c_index = self.consumer_index.load(Ordering::Relaxed);
        let look_ahead_index = c_index.wrapping_add(step - 1);
        let look_ahead_slot = self.slot(look_ahead_index);
        if look_ahead_slot.sequence.load(Ordering::Acquire) != look_ahead_index.wrapping_add(1) {
            return false;
        }
        if self
            .consumer_index
            .compare_exchange(
                c_index,
                c_index.wrapping_add(step),
                Ordering::AcqRel,
                Ordering::Relaxed,
            )
            .is_err()
        {
            return false;
        }
        for i in 0..step {
            let index = c_index.wrapping_add(i);
            let slot = self.slot(index);
            let expected = index.wrapping_add(1);
            while slot.sequence.load(Ordering::Acquire) != expected {
                std::hint::spin_loop();
            }
            let value = unsafe { (*slot.value.get()).assume_init_read() };
            slot.sequence
                .store(index.wrapping_add(self.mask + 1), Ordering::Release);
            consumer(value);
        }
        true
    }

    /// Normalized capacity (always a power of two, >= 2).
    #[inline]
    #[must_use]
    pub fn capacity_usize(&self) -> usize {
        (self.mask + 1) as usize
    }

    /// Offers `e`, waiting out transient fullness with an adaptive backoff
    /// instead of returning immediately. Spins forever if no consumer ever
    /// drains the queue.
    pub fn offer_with_backoff(&self, mut e: T) {
        let mut backoff = Backoff::new();
        loop {
            match self.offer_strict_or_relaxed(e, false) {
                Ok(()) => return,
                Err(v) => {
                    e = v;
                    backoff.snooze();
                }
            }
        }
    }

    /// Polls, waiting out transient emptiness with an adaptive backoff
    /// instead of returning `None` immediately. Spins forever if no producer
    /// ever offers another element.
    pub fn poll_with_backoff(&self) -> T {
        let mut backoff = Backoff::new();
        loop {
            if let Some(v) = self.poll_strict_or_relaxed(false) {
                return v;
            }
            backoff.snooze();
        }
    }
}

impl<T> Drop for BoundedMpmcQueue<T> {
    fn drop(&mut self) {
        let c_index = *self.consumer_index.get_mut();
        let p_index = *self.producer_index.get_mut();
        let mut i = c_index;
        while i < p_index {
            let slot = self.slot(i);
            unsafe { (*slot.value.get()).assume_init_drop() };
            i = i.wrapping_add(1);
        }
    }
}

enum OfferAttempt {
    Free,
    Full,
    Retry,
}

enum PollAttempt {
    Ready,
    Empty,
    Retry,
}

impl<T> MessagePassingQueue<T> for BoundedMpmcQueue<T> {
    fn offer(&self, e: T) -> bool {
        self.offer_strict_or_relaxed(e, false).is_ok()
    }

    fn poll(&self) -> Option<T> {
        self.poll_strict_or_relaxed(false)
    }

    fn peek(&self) -> Option<T>
    where
        T: Clone,
    {
        self.peek_strict_or_relaxed(false)
    }

    fn relaxed_offer(&self, e: T) -> bool {
        self.offer_strict_or_relaxed(e, true).is_ok()
    }

    fn relaxed_poll(&self) -> Option<T> {
        self.poll_strict_or_relaxed(true)
    }

    fn relaxed_peek(&self) -> Option<T>
    where
        T: Clone,
    {
        self.peek_strict_or_relaxed(true)
    }

    fn drain<C: FnMut(T)>(&self, consumer: C, limit: usize) -> usize {
        self.drain_batched(consumer, limit)
    }

    fn size(&self) -> usize {
        let p_index = self.producer_index.load(Ordering::Acquire);
        let c_index = self.consumer_index.load(Ordering::Acquire);
        p_index.wrapping_sub(c_index) as usize
    }

    fn is_empty(&self) -> bool {
        self.consumer_index.load(Ordering::Acquire) == self.producer_index.load(Ordering::Acquire)
    }

    fn capacity(&self) -> Option<usize> {
        Some(self.capacity_usize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn rejects_tiny_capacity() {
        assert!(matches!(
            BoundedMpmcQueue::<u64>::new(1),
            Err(QueueError::InvalidCapacity { requested: 1 })
        ));
    }

    #[test]
    fn normalizes_capacity_to_power_of_two() {
        let q = BoundedMpmcQueue::<u64>::new(10).unwrap();
        assert_eq!(q.capacity(), Some(16));
    }

    #[test]
    fn offer_with_backoff_waits_for_room() {
        let q = Arc::new(BoundedMpmcQueue::<u64>::new(2).unwrap());
        q.offer(1);
        q.offer(2);

        let producer_q = Arc::clone(&q);
        let producer = thread::spawn(move || producer_q.offer_with_backoff(3));

        // Drain one slot so the backing offer can eventually succeed.
        std::thread::yield_now();
        assert_eq!(q.poll(), Some(1));
        producer.join().unwrap();

        let mut remaining = vec![q.poll().unwrap()];
        remaining.push(q.poll().unwrap());
        remaining.sort_unstable();
        assert_eq!(remaining, vec![2, 3]);
    }

    #[test]
    fn poll_with_backoff_waits_for_element() {
        let q = Arc::new(BoundedMpmcQueue::<u64>::new(4).unwrap());
        let consumer_q = Arc::clone(&q);
        let consumer = thread::spawn(move || consumer_q.poll_with_backoff());

        std::thread::yield_now();
        q.offer(42);
        assert_eq!(consumer.join().unwrap(), 42);
    }

    #[test]
    fn offer_poll_round_trip() {
        let q = BoundedMpmcQueue::<u64>::new(4).unwrap();
        assert!(q.offer(1));
        assert!(q.offer(2));
        assert_eq!(q.poll(), Some(1));
        assert_eq!(q.poll(), Some(2));
        assert_eq!(q.poll(), None);
    }

    #[test]
    fn offer_fails_when_full() {
        let q = BoundedMpmcQueue::<u64>::new(2).unwrap();
        assert!(q.offer(1));
        assert!(q.offer(2));
        assert!(!q.offer(3));
        assert!(!q.relaxed_offer(3));
    }

    #[test]
    fn peek_does_not_remove() {
        let q = BoundedMpmcQueue::<u64>::new(4).unwrap();
        q.offer(7);
        assert_eq!(q.peek(), Some(7));
        assert_eq!(q.peek(), Some(7));
        assert_eq!(q.poll(), Some(7));
    }

    #[test]
    fn fill_and_drain_look_ahead() {
        let q = BoundedMpmcQueue::<u64>::new(64).unwrap();
        let mut next = 0u64;
        let filled = q.fill(
            || {
                next += 1;
                next
            },
            50,
        );
        assert_eq!(filled, 50);
        let mut seen = Vec::new();
        let drained = q.drain_batched(|v| seen.push(v), 50);
        assert_eq!(drained, 50);
        assert_eq!(seen, (1..=50).collect::<Vec<_>>());
    }

    #[test]
    fn look_ahead_boundary_step_one_and_full_capacity() {
        let q = BoundedMpmcQueue::<u64>::with_config(
            BoundedConfig::new(8).with_max_look_ahead_step(1),
        )
        .unwrap();
        assert_eq!(q.fill(|| 1, 8), 8);
        let mut count = 0;
        assert_eq!(q.drain_batched(|_| count += 1, 8), 8);
        assert_eq!(count, 8);

        let q2 = BoundedMpmcQueue::<u64>::with_config(
            BoundedConfig::new(8).with_max_look_ahead_step(8),
        )
        .unwrap();
        assert_eq!(q2.fill(|| 1, 8), 8);
        let mut count2 = 0;
        assert_eq!(q2.drain_batched(|_| count2 += 1, 8), 8);
        assert_eq!(count2, 8);
    }

    #[test]
    fn mpmc_stress_preserves_all_elements() {
        let q = Arc::new(BoundedMpmcQueue::<u64>::new(128).unwrap());
        let produced = Arc::new(AtomicUsize::new(0));
        let total = 4000u64;
        let producers = 4;
        let consumers = 4;

        let mut handles = Vec::new();
        for p in 0..producers {
            let q = Arc::clone(&q);
            handles.push(thread::spawn(move || {
                let per = total / producers as u64;
                for i in 0..per {
                    let v = p as u64 * per + i;
                    while !q.offer(v) {
                        std::hint::spin_loop();
                    }
                }
            }));
        }

        let received = Arc::new(std::sync::Mutex::new(Vec::new()));
        for _ in 0..consumers {
            let q = Arc::clone(&q);
            let produced = Arc::clone(&produced);
            let received = Arc::clone(&received);
            handles.push(thread::spawn(move || {
                loop {
                    match q.poll() {
                        Some(v) => {
                            received.lock().unwrap().push(v);
                            produced.fetch_add(1, Ordering::SeqCst);
                        }
                        None => {
                            if produced.load(Ordering::SeqCst) as u64 >= total {
                                break;
                            }
                            std::hint::spin_loop();
                        }
                    }
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        let mut got = received.lock().unwrap().clone();
        got.sort_unstable();
        assert_eq!(got, (0..total).collect::<Vec<_>>());
    }
}
