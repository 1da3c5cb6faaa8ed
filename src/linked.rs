//! Unbounded multi-producer/single-consumer linked queue.
//!
//! `poll`/`peek`/`size`/`is_empty`/`drain` assume a single consumer thread;
//! calling them concurrently from more than one thread is undefined behavior
//! for correctness purposes (though it will not corrupt memory, since `offer`
//! remains safe to call from any number of producer threads).

use std::cell::UnsafeCell;
use std::sync::atomic::Ordering;

use crossbeam_epoch::{self as epoch, Atomic, Owned, Shared};
use crossbeam_utils::CachePadded;

use crate::backoff::Backoff;
use crate::invariants::{debug_assert_not_already_taken, debug_assert_tombstoned};
use crate::mpq::MessagePassingQueue;

struct Node<T> {
    item: UnsafeCell<Option<T>>,
    next: Atomic<Node<T>>,
}

impl<T> Node<T> {
    fn dummy() -> Self {
        Self {
            item: UnsafeCell::new(None),
            next: Atomic::null(),
        }
    }

    fn with_value(value: T) -> Self {
        Self {
            item: UnsafeCell::new(Some(value)),
            next: Atomic::null(),
        }
    }
}

/// Multi-producer/single-consumer unbounded linked queue.
///
/// This is the base realization described by the message-passing queue
/// family: a concrete, directly usable MPSC queue rather than an abstract
/// base awaiting a subclass's `offer`. `offer` here swings the tail pointer
/// with a CAS and then publishes the link, which is the one general-purpose
/// way to implement "the concrete producer side" without a class hierarchy.
pub struct UnboundedBaseLinkedQueue<T> {
    tail: CachePadded<Atomic<Node<T>>>,
    head: CachePadded<Atomic<Node<T>>>,
}

unsafe impl<T: Send> Send for UnboundedBaseLinkedQueue<T> {}
unsafe impl<T: Send> Sync for UnboundedBaseLinkedQueue<T> {}

impl<T> Default for UnboundedBaseLinkedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of locating the next node to act on, shared by poll/peek.
enum NextNode<'g, T> {
    /// The queue was observed empty.
    Empty,
    /// A node is available; its item has not yet been examined.
    Found(Shared<'g, Node<T>>, Shared<'g, Node<T>>),
}

impl<T> UnboundedBaseLinkedQueue<T> {
    /// Creates an empty queue, seeded with a single dummy node.
    #[must_use]
    pub fn new() -> Self {
        let dummy = Owned::new(Node::dummy());
        let guard = epoch::pin();
        let dummy_shared = dummy.into_shared(&guard);
        Self {
            tail: CachePadded::new(Atomic::from(dummy_shared)),
            head: CachePadded::new(Atomic::from(dummy_shared)),
        }
    }

    /// Finds the current head node and its successor, spin-waiting for the
    /// `next` link to appear if a producer has swung the tail but not yet
    /// published it (only when `spin` is set).
    fn locate<'g>(&self, spin: bool, guard: &'g epoch::Guard) -> NextNode<'g, T> {
        let head_shared = self.head.load(Ordering::Acquire, guard);
        let head_ref = unsafe { head_shared.deref() };
        let mut next_shared = head_ref.next.load(Ordering::Acquire, guard);

        if next_shared.is_null() {
            if !spin {
                return NextNode::Empty;
            }
            let tail_shared = self.tail.load(Ordering::Acquire, guard);
            if tail_shared == head_shared {
                return NextNode::Empty;
            }
            let mut backoff = Backoff::new();
            loop {
                next_shared = head_ref.next.load(Ordering::Acquire, guard);
                if !next_shared.is_null() {
                    break;
                }
                backoff.snooze();
            }
        }
        NextNode::Found(head_shared, next_shared)
    }

    /// Inserts `e` at the tail. Always succeeds (the queue has no capacity
    /// bound); returns `true` for interface symmetry with
    /// [`crate::bounded::BoundedMpmcQueue`].
    pub fn offer(&self, e: T) -> bool {
        let guard = epoch::pin();
        let new_node = Owned::new(Node::with_value(e)).into_shared(&guard);
        loop {
            let tail_shared = self.tail.load(Ordering::Acquire, &guard);
            if self
                .tail
                .compare_exchange(
                    tail_shared,
                    new_node,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                    &guard,
                )
                .is_ok()
            {
                let tail_ref = unsafe { tail_shared.deref() };
                tail_ref.next.store(new_node, Ordering::Release);
                return true;
            }
        }
    }

    fn poll_inner(&self, spin: bool) -> Option<T> {
        let guard = epoch::pin();
        loop {
            let (head_shared, next_shared) = match self.locate(spin, &guard) {
                NextNode::Empty => return None,
                NextNode::Found(h, n) => (h, n),
            };
            let next_ref = unsafe { next_shared.deref() };
            let value = unsafe { (*next_ref.item.get()).take() };
            debug_assert_not_already_taken!(value.is_some());

            if self
                .head
                .compare_exchange(
                    head_shared,
                    next_shared,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                    &guard,
                )
                .is_err()
            {
                // Single-consumer contract violated by caller; put it back and retry.
                unsafe { *next_ref.item.get() = value };
                continue;
            }

            let head_ref = unsafe { head_shared.deref() };
            head_ref.next.store(head_shared, Ordering::Release);
            debug_assert_tombstoned!(
                head_ref.next.load(Ordering::Relaxed, &guard).as_raw(),
                head_shared.as_raw()
            );
            unsafe { guard.defer_destroy(head_shared) };
            return value;
        }
    }

    /// Removes and returns the head element, spin-waiting (bounded by
    /// [`Backoff`]) if a producer has swung the tail but not yet linked it.
    pub fn poll(&self) -> Option<T> {
        self.poll_inner(true)
    }

    /// Like [`Self::poll`] but never spin-waits: returns `None` immediately
    /// if the tail swing has not yet been linked.
    pub fn relaxed_poll(&self) -> Option<T> {
        self.poll_inner(false)
    }

    /// Offers `e`. Provided for interface symmetry with
    /// [`crate::bounded::BoundedMpmcQueue::offer_with_backoff`]; this queue
    /// has no capacity bound, so offering never waits.
    pub fn offer_with_backoff(&self, e: T) {
        self.offer(e);
    }

    /// Removes and returns the head element, retrying with an adaptive
    /// backoff while the queue is genuinely empty instead of returning
    /// `None` immediately. Spins forever if no producer ever offers another
    /// element.
    pub fn poll_with_backoff(&self) -> T {
        let mut backoff = Backoff::new();
        loop {
            if let Some(v) = self.poll() {
                return v;
            }
            backoff.snooze();
        }
    }

    fn peek_inner(&self, spin: bool) -> Option<T>
    where
        T: Clone,
    {
        let guard = epoch::pin();
        let (_head_shared, next_shared) = match self.locate(spin, &guard) {
            NextNode::Empty => return None,
            NextNode::Found(h, n) => (h, n),
        };
        let next_ref = unsafe { next_shared.deref() };
        unsafe { &*next_ref.item.get() }.clone()
    }

    /// Returns a clone of the head element without removing it.
    pub fn peek(&self) -> Option<T>
    where
        T: Clone,
    {
        self.peek_inner(true)
    }

    /// Like [`Self::peek`] but never spin-waits.
    pub fn relaxed_peek(&self) -> Option<T>
    where
        T: Clone,
    {
        self.peek_inner(false)
    }

    /// Removes up to `limit` elements, passing each to `consumer`. Returns
    /// the number actually removed.
    pub fn drain<C: FnMut(T)>(&self, mut consumer: C, limit: usize) -> usize {
        let mut drained = 0;
        while drained < limit {
            match self.poll() {
                Some(v) => {
                    consumer(v);
                    drained += 1;
                }
                None => break,
            }
        }
        drained
    }

    /// Best-effort, non-linearizable element count: walks from head to the
    /// tail sampled at the start of the walk, stopping early at a tombstone
    /// left by a concurrent consumer.
    #[must_use]
    pub fn size(&self) -> usize {
        let guard = epoch::pin();
        let head_shared = self.head.load(Ordering::Acquire, &guard);
        let tail_shared = self.tail.load(Ordering::Acquire, &guard);

        let mut count = 0usize;
        let mut current = unsafe { head_shared.deref() }
            .next
            .load(Ordering::Acquire, &guard);
        while !current.is_null() {
            count += 1;
            if current == tail_shared || count == usize::MAX {
                break;
            }
            let node = unsafe { current.deref() };
            let next = node.next.load(Ordering::Acquire, &guard);
            if next == current {
                // Tombstone: a concurrent consumer retired this node mid-walk.
                break;
            }
            current = next;
        }
        count
    }

    /// `true` if head and tail pointed to the same node at the moment of the
    /// call.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let guard = epoch::pin();
        self.head.load(Ordering::Acquire, &guard) == self.tail.load(Ordering::Acquire, &guard)
    }

    /// Always `None`: this queue has no fullness contract.
    #[must_use]
    pub fn capacity(&self) -> Option<usize> {
        None
    }
}

impl<T> Drop for UnboundedBaseLinkedQueue<T> {
    fn drop(&mut self) {
        unsafe {
            let guard = epoch::unprotected();
            let mut current = self.head.load(Ordering::Relaxed, guard);
            while !current.is_null() {
                let owned = current.into_owned();
                let next = owned.next.load(Ordering::Relaxed, guard);
                let is_tombstone = next == current;
                drop(owned);
                if is_tombstone || next.is_null() {
                    break;
                }
                current = next;
            }
        }
    }
}

impl<T> MessagePassingQueue<T> for UnboundedBaseLinkedQueue<T> {
    fn offer(&self, e: T) -> bool {
        UnboundedBaseLinkedQueue::offer(self, e)
    }

    fn poll(&self) -> Option<T> {
        UnboundedBaseLinkedQueue::poll(self)
    }

    fn peek(&self) -> Option<T>
    where
        T: Clone,
    {
        UnboundedBaseLinkedQueue::peek(self)
    }

    fn relaxed_offer(&self, e: T) -> bool {
        UnboundedBaseLinkedQueue::offer(self, e)
    }

    fn relaxed_poll(&self) -> Option<T> {
        UnboundedBaseLinkedQueue::relaxed_poll(self)
    }

    fn relaxed_peek(&self) -> Option<T>
    where
        T: Clone,
    {
        UnboundedBaseLinkedQueue::relaxed_peek(self)
    }

    fn drain<C: FnMut(T)>(&self, consumer: C, limit: usize) -> usize {
        UnboundedBaseLinkedQueue::drain(self, consumer, limit)
    }

    fn size(&self) -> usize {
        UnboundedBaseLinkedQueue::size(self)
    }

    fn is_empty(&self) -> bool {
        UnboundedBaseLinkedQueue::is_empty(self)
    }

    fn capacity(&self) -> Option<usize> {
        UnboundedBaseLinkedQueue::capacity(self)
    }
}
