use std::sync::atomic::{AtomicBool, Ordering};

use event_listener::Event;

/// A single-writer mutual exclusion primitive guarding connector calls.
///
/// Unlike a plain mutex, `CreationGate` distinguishes *acquiring* the
/// right to create a connection from merely *observing* that someone
/// else is creating one. A borrower that loses the race to create just
/// wants to know when the gate is free again so it can re-evaluate pool
/// state; it must not itself queue up to acquire, or it would end up
/// serialized behind every other waiter instead of racing the idle
/// queue on equal footing.
#[allow(missing_debug_implementations)]
pub(crate) struct CreationGate {
    held: AtomicBool,
    released: Event,
}

impl CreationGate {
    pub(crate) fn new() -> Self {
        CreationGate {
            held: AtomicBool::new(false),
            released: Event::new(),
        }
    }

    /// Attempts to become the sole holder of the gate. Returns `false`
    /// without blocking if someone else already holds it.
    pub(crate) fn try_acquire(&self) -> bool {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Releases the gate and wakes every task waiting on
    /// [`wait_until_released`](Self::wait_until_released).
    pub(crate) fn release(&self) {
        self.held.store(false, Ordering::Release);
        self.released.notify(usize::MAX);
    }

    /// Suspends until the gate is not held, without acquiring it.
    ///
    /// If the gate is already free, returns immediately.
    pub(crate) async fn wait_until_released(&self) {
        loop {
            if !self.held.load(Ordering::Acquire) {
                return;
            }

            // Register interest before the re-check so a release that
            // lands between the load above and `listen()` is not missed.
            let listener = self.released.listen();

            if !self.held.load(Ordering::Acquire) {
                return;
            }

            listener.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_returns_immediately_when_free() {
        let gate = CreationGate::new();
        tokio::time::timeout(Duration::from_millis(50), gate.wait_until_released())
            .await
            .expect("should not block");
    }

    #[tokio::test]
    async fn second_acquire_fails_until_release() {
        let gate = Arc::new(CreationGate::new());
        assert!(gate.try_acquire());
        assert!(!gate.try_acquire());

        let waiter_gate = gate.clone();
        let waiter = tokio::spawn(async move {
            waiter_gate.wait_until_released().await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.release();

        tokio::time::timeout(Duration::from_millis(200), waiter)
            .await
            .expect("waiter should wake after release")
            .unwrap();
    }
}
