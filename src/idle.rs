use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam_queue::ArrayQueue;
use event_listener::Event;

/// The result of a non-blocking push attempt.
#[allow(missing_debug_implementations)]
pub(crate) enum PushOutcome<T> {
    Accepted,
    /// The queue was at capacity; the item is handed back to the caller.
    Full(T),
    /// The queue has been closed (typically by a resize or `close`);
    /// the item is handed back to the caller.
    Closed(T),
}

/// The result of a (possibly blocking) pop attempt.
#[allow(missing_debug_implementations)]
pub(crate) enum PopOutcome<T> {
    Item(T),
    TimedOut,
    /// The queue was closed while we were waiting, or already closed
    /// when we asked. This is the "closed sentinel" of the source
    /// contract: every waiter sees it exactly once per close.
    Closed,
}

/// The outcome of a pop, together with whether it actually had to wait
/// (as opposed to finding a connection already sitting in the queue).
/// Borrow accounting (`wait_count`/`wait_duration`) is driven by this.
#[allow(missing_debug_implementations)]
pub(crate) struct PopResult<T> {
    pub(crate) outcome: PopOutcome<T>,
    pub(crate) blocked: bool,
}

/// A bounded, multi-producer multi-consumer queue of idle connections.
///
/// Built from a lock-free ring buffer plus an event for wakeups, the
/// same combination the teacher's pack uses for an identical "bounded
/// blocking queue with release notification" problem (see
/// `sqlx-core::pool::idle`). Resizing the pool does not mutate a queue
/// in place: the façade builds a fresh one at the new capacity and
/// closes this one, which is simpler to reason about than resizing a
/// ring buffer live.
#[allow(missing_debug_implementations)]
pub(crate) struct IdleQueue<T> {
    queue: ArrayQueue<T>,
    len: AtomicUsize,
    capacity: usize,
    event: Event,
    closed: AtomicBool,
}

impl<T> IdleQueue<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        IdleQueue {
            queue: ArrayQueue::new(capacity.max(1)),
            len: AtomicUsize::new(0),
            capacity,
            event: Event::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Non-blocking pop. `None` covers both "empty" and "closed".
    pub(crate) fn try_pop(&self) -> Option<T> {
        let item = self.queue.pop()?;
        self.len.fetch_sub(1, Ordering::AcqRel);
        Some(item)
    }

    /// Non-blocking push.
    pub(crate) fn try_push(&self, item: T) -> PushOutcome<T> {
        if self.is_closed() {
            return PushOutcome::Closed(item);
        }
        match self.queue.push(item) {
            Ok(()) => {
                self.len.fetch_add(1, Ordering::AcqRel);
                self.event.notify(1usize);
                PushOutcome::Accepted
            }
            Err(item) => PushOutcome::Full(item),
        }
    }

    /// Pops with an optional timeout. `None` waits indefinitely,
    /// matching the source contract for `max_wait_time == 0`.
    pub(crate) async fn pop_timeout(&self, timeout: Option<Duration>) -> PopResult<T> {
        if let Some(item) = self.try_pop() {
            return PopResult {
                outcome: PopOutcome::Item(item),
                blocked: false,
            };
        }

        if self.is_closed() {
            return PopResult {
                outcome: PopOutcome::Closed,
                blocked: false,
            };
        }

        let wait = async {
            loop {
                let listener = self.event.listen();

                if let Some(item) = self.try_pop() {
                    return PopOutcome::Item(item);
                }
                if self.is_closed() {
                    return PopOutcome::Closed;
                }

                listener.await;

                if let Some(item) = self.try_pop() {
                    return PopOutcome::Item(item);
                }
                if self.is_closed() {
                    return PopOutcome::Closed;
                }
            }
        };

        let outcome = match timeout {
            None => wait.await,
            Some(duration) => match tokio::time::timeout(duration, wait).await {
                Ok(outcome) => outcome,
                Err(_) => PopOutcome::TimedOut,
            },
        };

        PopResult {
            outcome,
            blocked: true,
        }
    }

    /// Drains every item currently present, without blocking. Used by
    /// the validator to take a private working list for its sweep. If
    /// the queue is already closed, returns empty: there is nothing
    /// left to sweep and nothing should be pushed back.
    pub(crate) fn drain(&self) -> Vec<T> {
        if self.is_closed() {
            return Vec::new();
        }
        let mut items = Vec::with_capacity(self.len());
        while let Some(item) = self.try_pop() {
            items.push(item);
        }
        items
    }

    /// Marks the queue closed and wakes every waiter with the closed
    /// sentinel, returning whatever was still sitting in the queue so
    /// the caller can dispose of it.
    pub(crate) fn close(&self) -> Vec<T> {
        self.closed.store(true, Ordering::Release);
        let mut items = Vec::with_capacity(self.len());
        while let Some(item) = self.try_pop() {
            items.push(item);
        }
        self.event.notify(usize::MAX);
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn push_pop_roundtrip() {
        let q: IdleQueue<u32> = IdleQueue::new(2);
        assert!(matches!(q.try_push(1), PushOutcome::Accepted));
        assert!(matches!(q.try_push(2), PushOutcome::Accepted));
        assert!(matches!(q.try_push(3), PushOutcome::Full(3)));
        assert_eq!(q.len(), 2);
        assert_eq!(q.try_pop(), Some(1));
        assert_eq!(q.try_pop(), Some(2));
        assert_eq!(q.try_pop(), None);
    }

    #[tokio::test]
    async fn pop_timeout_times_out_when_empty() {
        let q: IdleQueue<u32> = IdleQueue::new(1);
        let result = q.pop_timeout(Some(Duration::from_millis(20))).await;
        assert!(result.blocked);
        assert!(matches!(result.outcome, PopOutcome::TimedOut));
    }

    #[tokio::test]
    async fn pop_timeout_wakes_on_push() {
        let q = Arc::new(IdleQueue::<u32>::new(1));
        let q2 = q.clone();
        let waiter = tokio::spawn(async move { q2.pop_timeout(Some(Duration::from_secs(5))).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matches!(q.try_push(42), PushOutcome::Accepted));

        let result = waiter.await.unwrap();
        assert!(result.blocked);
        assert!(matches!(result.outcome, PopOutcome::Item(42)));
    }

    #[tokio::test]
    async fn close_wakes_waiters_with_closed_sentinel() {
        let q = Arc::new(IdleQueue::<u32>::new(1));
        let q2 = q.clone();
        let waiter = tokio::spawn(async move { q2.pop_timeout(None).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        let remaining = q.close();
        assert!(remaining.is_empty());

        let result = waiter.await.unwrap();
        assert!(matches!(result.outcome, PopOutcome::Closed));
    }
}
