/// Common operations shared by [`crate::bounded::BoundedMpmcQueue`] and
/// [`crate::linked::UnboundedBaseLinkedQueue`].
///
/// Strict operations (`offer`, `poll`, `peek`) give the classical FIFO
/// guarantee: they report full/empty only when the queue genuinely is.
/// Relaxed counterparts may spuriously report empty/full under contention
/// in exchange for never consulting the opposite cursor.
pub trait MessagePassingQueue<T> {
    /// Inserts `e`. Returns `false` if the queue is (strictly) full.
    fn offer(&self, e: T) -> bool;

    /// Removes and returns the next element, or `None` if (strictly) empty.
    fn poll(&self) -> Option<T>;

    /// Returns a clone of the next element without removing it, or `None` if
    /// (strictly) empty.
    fn peek(&self) -> Option<T>
    where
        T: Clone;

    /// Like [`offer`](Self::offer) but may return `false` under contention
    /// even when a slot is about to free up.
    fn relaxed_offer(&self, e: T) -> bool;

    /// Like [`poll`](Self::poll) but may return `None` under contention even
    /// when an element is about to be published.
    fn relaxed_poll(&self) -> Option<T>;

    /// Like [`peek`](Self::peek) but may return `None` under contention even
    /// when an element is about to be published.
    fn relaxed_peek(&self) -> Option<T>
    where
        T: Clone;

    /// Removes up to `limit` elements, passing each to `consumer`. Returns the
    /// number actually removed.
    fn drain<C: FnMut(T)>(&self, consumer: C, limit: usize) -> usize;

    /// Best-effort observed size. Exact for the bounded queue; a
    /// non-linearizable traversal estimate for the linked queue.
    fn size(&self) -> usize;

    /// `true` if the queue was observed empty at the moment of the call.
    fn is_empty(&self) -> bool;

    /// `Some(capacity)` for a fixed-capacity queue, `None` when unbounded.
    fn capacity(&self) -> Option<usize>;
}
