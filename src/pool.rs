use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use crate::config::PoolConfig;
use crate::error::{PoolError, ReturnStatus};
use crate::gate::CreationGate;
use crate::idle::{IdleQueue, PopOutcome, PushOutcome};
use crate::manage::{Connector, ManagedConnection};
use crate::registry::Registry;
use crate::stats::{Counters, Stats};

// Re-exported through `crate::registry` only as `pub(crate)`; brought
// into scope here under its own name to avoid repeating the path.
use crate::registry::ConnId;

const STATE_NEW: u8 = 0;
const STATE_ACTIVE: u8 = 1;
const STATE_CLOSED: u8 = 2;

#[allow(missing_debug_implementations)]
struct Managed<C> {
    id: ConnId,
    created_at: Instant,
    conn: C,
}

fn destroy<C: ManagedConnection>(conn: C) {
    tokio::spawn(async move {
        conn.close().await;
    });
}

#[allow(missing_debug_implementations)]
struct Shared<C: Connector> {
    connector: C,
    config: RwLock<PoolConfig>,
    registry: Registry,
    idle: RwLock<Arc<IdleQueue<Managed<C::Connection>>>>,
    gate: CreationGate,
    counters: Counters,
    state: AtomicU8,
    validator: StdMutex<Option<JoinHandle<()>>>,
}

/// A generic, async connection pool.
///
/// Cheaply cloneable; every clone shares the same underlying state, the
/// way the teacher's `Pool<M>` is a thin handle around an `Arc`.
pub struct Pool<C: Connector> {
    inner: Arc<Shared<C>>,
}

impl<C: Connector> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Pool {
            inner: self.inner.clone(),
        }
    }
}

impl<C: Connector> fmt::Debug for Pool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("total_count", &self.total_count())
            .field("idle_count", &self.idle_count())
            .finish()
    }
}

impl<C: Connector> Pool<C> {
    /// Builds a new, uninitialized pool. Call [`init`](Self::init) before
    /// borrowing from it.
    pub fn new(connector: C, config: PoolConfig) -> Self {
        let idle = IdleQueue::new(config.max_active as usize);
        Pool {
            inner: Arc::new(Shared {
                connector,
                config: RwLock::new(config),
                registry: Registry::new(),
                idle: RwLock::new(Arc::new(idle)),
                gate: CreationGate::new(),
                counters: Counters::new(),
                state: AtomicU8::new(STATE_NEW),
                validator: StdMutex::new(None),
            }),
        }
    }

    fn current_idle(&self) -> Arc<IdleQueue<Managed<C::Connection>>> {
        self.inner.idle.read().unwrap().clone()
    }

    fn current_config(&self) -> PoolConfig {
        *self.inner.config.read().unwrap()
    }

    /// Brings the pool up: warms `min_active` connections (if any) and
    /// starts the validator (if `validation_interval > 0`). A no-op if
    /// the pool is already active or has been closed.
    pub async fn init(&self) -> Result<(), PoolError<C::Error>> {
        if self
            .inner
            .state
            .compare_exchange(STATE_NEW, STATE_ACTIVE, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        let cfg = self.current_config();

        if cfg.min_active() > 0 {
            self.fill_pool(&cfg).await;
        }

        if !cfg.validation_interval().is_zero() {
            self.spawn_validator(cfg.validation_interval());
        }

        Ok(())
    }

    /// Idempotently shuts the pool down. Stops the validator, detaches
    /// every connection from the registry, then closes the idle queue
    /// and destroys whatever was left in it from a spawned task — the
    /// caller does not wait on that teardown.
    pub async fn close(&self) {
        if self.inner.state.swap(STATE_CLOSED, Ordering::AcqRel) != STATE_ACTIVE {
            return;
        }

        if let Some(handle) = self.inner.validator.lock().unwrap().take() {
            handle.abort();
        }

        self.inner.registry.clear();

        let idle = self.current_idle();
        tokio::spawn(async move {
            let remaining = idle.close();
            for managed in remaining {
                managed.conn.close().await;
            }
        });
    }

    fn is_active(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == STATE_ACTIVE
    }

    /// Attempts to become the sole creator, connect, and register the
    /// result. Returns `Ok(None)` if the gate was already held by
    /// someone else (the caller should wait and re-evaluate, not treat
    /// this as failure).
    async fn try_create_connection(
        &self,
    ) -> Result<Option<Managed<C::Connection>>, C::Error> {
        if !self.inner.gate.try_acquire() {
            return Ok(None);
        }

        let result = self.inner.connector.connect().await;
        let outcome = match result {
            Ok(conn) => {
                let id = self.inner.registry.mint_id();
                let created_at = Instant::now();
                self.inner.registry.insert(id, created_at);
                Ok(Some(Managed {
                    id,
                    created_at,
                    conn,
                }))
            }
            Err(e) => Err(e),
        };

        self.inner.gate.release();
        outcome
    }

    /// Creates a connection, retrying the gate handoff (not the
    /// decision to create one) until it succeeds or the connector
    /// fails. Used for the single substitution attempt on a dead or
    /// lifetime-expired idle connection.
    async fn create_connection_blocking(&self) -> Result<Managed<C::Connection>, PoolError<C::Error>> {
        loop {
            self.inner.gate.wait_until_released().await;
            match self.try_create_connection().await {
                Ok(Some(managed)) => return Ok(managed),
                Ok(None) => continue,
                Err(e) => return Err(PoolError::Connector(e)),
            }
        }
    }

    fn wrap(&self, managed: Managed<C::Connection>) -> PooledConnection<'_, C> {
        PooledConnection {
            pool: self,
            managed: Some(managed),
        }
    }

    /// Borrows a connection, creating one if the pool has room and the
    /// idle queue is empty, otherwise waiting on the idle queue up to
    /// `max_wait_time`. See the module-level contract for the full
    /// state machine.
    pub async fn borrow(&self) -> Result<PooledConnection<'_, C>, PoolError<C::Error>> {
        loop {
            if !self.is_active() {
                return Err(PoolError::PoolClosed);
            }

            // Observe, don't acquire: if someone else is mid-connect we
            // simply wait for them to finish before re-reading state.
            self.inner.gate.wait_until_released().await;

            let cfg = self.current_config();
            let idle = self.current_idle();
            let total = self.inner.registry.count();

            if idle.is_empty() && total < cfg.max_active() as usize {
                match self.try_create_connection().await {
                    Ok(Some(managed)) => return Ok(self.wrap(managed)),
                    Ok(None) => continue,
                    Err(e) => return Err(PoolError::Connector(e)),
                }
            }

            let wait_timeout = if cfg.max_wait_time().is_zero() {
                None
            } else {
                Some(cfg.max_wait_time())
            };

            let started = Instant::now();
            let result = idle.pop_timeout(wait_timeout).await;
            if result.blocked {
                self.inner.counters.record_wait(started.elapsed());
            }

            match result.outcome {
                PopOutcome::Item(managed) => {
                    if cfg.test_on_borrow() && !managed.conn.is_alive() {
                        self.inner.registry.remove(managed.id);
                        destroy(managed.conn);
                        let replacement = self.create_connection_blocking().await?;
                        return Ok(self.wrap(replacement));
                    }

                    if !cfg.max_life_time().is_zero()
                        && managed.created_at + cfg.max_life_time() <= Instant::now()
                    {
                        self.inner.registry.remove(managed.id);
                        destroy(managed.conn);
                        let replacement = self.create_connection_blocking().await?;
                        return Ok(self.wrap(replacement));
                    }

                    let mut managed = managed;
                    if cfg.reset_connections() {
                        if let Err(err) = managed.conn.reset().await {
                            self.inner.registry.remove(managed.id);
                            destroy(managed.conn);
                            return Err(PoolError::Reset(err));
                        }
                    }

                    return Ok(self.wrap(managed));
                }
                PopOutcome::TimedOut => return Err(PoolError::BorrowTimeout),
                // Either a resize replaced the idle queue out from under
                // us, or `close` ran concurrently. Looping re-checks
                // `is_active` above, which distinguishes the two.
                PopOutcome::Closed => continue,
            }
        }
    }

    /// Alias for [`borrow`](Self::borrow), named after the source
    /// contract's vocabulary for this operation.
    pub async fn pop(&self) -> Result<PooledConnection<'_, C>, PoolError<C::Error>> {
        self.borrow().await
    }

    /// Returns a connection to the pool, always succeeding with a
    /// status describing what happened to it. Prefer
    /// [`PooledConnection::release`] unless you've taken the connection
    /// out of its guard.
    async fn return_connection(&self, managed: Managed<C::Connection>) -> ReturnStatus {
        if !self.is_active() {
            self.inner.registry.remove(managed.id);
            destroy(managed.conn);
            return ReturnStatus::PoolNotInitialized;
        }

        if !self.inner.registry.contains(managed.id) {
            destroy(managed.conn);
            return ReturnStatus::NotPartOfPool;
        }

        let cfg = self.current_config();

        if cfg.test_on_return() && !managed.conn.is_alive() {
            self.inner.registry.remove(managed.id);
            destroy(managed.conn);
            return ReturnStatus::DeadConnection;
        }

        if !cfg.max_life_time().is_zero() && managed.created_at + cfg.max_life_time() <= Instant::now()
        {
            self.inner.registry.remove(managed.id);
            destroy(managed.conn);
            self.inner.counters.record_life_closed();
            return ReturnStatus::MaxLifeTime;
        }

        let idle = self.current_idle();
        match idle.try_push(managed) {
            PushOutcome::Accepted => ReturnStatus::Ok,
            PushOutcome::Full(managed) => {
                self.inner.registry.remove(managed.id);
                destroy(managed.conn);
                ReturnStatus::LimitReached
            }
            PushOutcome::Closed(managed) => {
                self.inner.registry.remove(managed.id);
                destroy(managed.conn);
                ReturnStatus::PoolClosed
            }
        }
    }

    /// Runs one fill-pool pass: creates connections (serialized through
    /// the creation gate) until `min_active` is met, the pool is no
    /// longer active, the gate is already held by someone else, or the
    /// connector fails. Never retries a connector failure itself — the
    /// next validator tick will.
    async fn fill_pool(&self, cfg: &PoolConfig) {
        loop {
            if !self.is_active() {
                return;
            }
            if self.inner.registry.count() >= cfg.min_active() as usize {
                return;
            }

            match self.try_create_connection().await {
                Ok(Some(managed)) => {
                    let idle = self.current_idle();
                    match idle.try_push(managed) {
                        PushOutcome::Accepted => continue,
                        PushOutcome::Full(m) | PushOutcome::Closed(m) => {
                            self.inner.registry.remove(m.id);
                            destroy(m.conn);
                            return;
                        }
                    }
                }
                Ok(None) => return,
                Err(e) => {
                    tracing::debug!(error = %e, "fill-pool: connector failed, deferring to next validator tick");
                    return;
                }
            }
        }
    }

    fn spawn_validator(&self, interval: Duration) {
        let pool = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(
                tokio::time::Instant::now() + interval,
                interval,
            );
            loop {
                ticker.tick().await;
                pool.run_validator_sweep().await;
            }
        });
        *self.inner.validator.lock().unwrap() = Some(handle);
    }

    /// One hygiene sweep: drains the idle queue, drops dead connections,
    /// evicts idle- or life-expired survivors (idle checked before
    /// life, per the fixed ordering contract), pushes the rest back,
    /// then tops the pool back up to `min_active`.
    async fn run_validator_sweep(&self) {
        let cfg = self.current_config();
        let idle = self.current_idle();
        let drained = idle.drain();

        let now = Instant::now();
        let mut survivors = Vec::with_capacity(drained.len());
        for managed in drained {
            if !managed.conn.is_alive() {
                self.inner.registry.remove(managed.id);
                destroy(managed.conn);
                continue;
            }
            survivors.push(managed);
        }

        let mut count = self.inner.registry.count();
        let mut queue_closed_mid_pass = false;

        for managed in survivors {
            if queue_closed_mid_pass {
                self.inner.registry.remove(managed.id);
                destroy(managed.conn);
                continue;
            }

            let idle_expired = !cfg.max_idle_time().is_zero()
                && count > cfg.min_active() as usize
                && managed.conn.last_used_at() + cfg.max_idle_time() <= now;

            if idle_expired {
                self.inner.registry.remove(managed.id);
                destroy(managed.conn);
                count = count.saturating_sub(1);
                self.inner.counters.record_idle_closed();
                continue;
            }

            let life_expired =
                !cfg.max_life_time().is_zero() && managed.created_at + cfg.max_life_time() <= now;

            if life_expired {
                self.inner.registry.remove(managed.id);
                destroy(managed.conn);
                count = count.saturating_sub(1);
                self.inner.counters.record_life_closed();
                continue;
            }

            match idle.try_push(managed) {
                PushOutcome::Accepted => {}
                PushOutcome::Full(m) | PushOutcome::Closed(m) => {
                    self.inner.registry.remove(m.id);
                    destroy(m.conn);
                    queue_closed_mid_pass = true;
                }
            }
        }

        self.fill_pool(&cfg).await;
    }

    /// Replaces the idle queue with a fresh one at the new capacity,
    /// migrating whatever idle connections fit and destroying any
    /// overflow. Any borrower blocked on the old queue wakes with the
    /// closed sentinel and restarts `borrow`, landing on the new queue.
    ///
    /// Live borrows are never revoked: if this shrinks the pool, the
    /// excess converges back to `max_active` as each borrow returns
    /// (caught as `LIMIT-REACHED`).
    pub async fn set_max_active(&self, max_active: u32) -> Result<(), PoolError<C::Error>> {
        {
            let mut cfg = self.inner.config.write().unwrap();
            let before = cfg.max_active();
            cfg.set_max_active(max_active)?;
            if cfg.max_active() == before {
                return Ok(());
            }
        }

        if !self.is_active() {
            return Ok(());
        }

        let new_idle = Arc::new(IdleQueue::new(max_active as usize));
        let old_idle = {
            let mut guard = self.inner.idle.write().unwrap();
            std::mem::replace(&mut *guard, new_idle.clone())
        };

        for managed in old_idle.drain() {
            if let PushOutcome::Full(managed) | PushOutcome::Closed(managed) =
                new_idle.try_push(managed)
            {
                self.inner.registry.remove(managed.id);
                destroy(managed.conn);
            }
        }

        for managed in old_idle.close() {
            if let PushOutcome::Full(managed) | PushOutcome::Closed(managed) =
                new_idle.try_push(managed)
            {
                self.inner.registry.remove(managed.id);
                destroy(managed.conn);
            }
        }

        Ok(())
    }

    pub fn max_active(&self) -> u32 {
        self.current_config().max_active()
    }

    pub async fn set_min_active(&self, min_active: u32) -> Result<(), PoolError<C::Error>> {
        self.inner.config.write().unwrap().set_min_active(min_active)
    }

    pub fn min_active(&self) -> u32 {
        self.current_config().min_active()
    }

    pub fn set_max_wait_time(&self, secs: f64) -> Result<(), PoolError<C::Error>> {
        self.inner
            .config
            .write()
            .unwrap()
            .set_max_wait_time(secs)
    }

    pub fn max_wait_time(&self) -> Duration {
        self.current_config().max_wait_time()
    }

    pub fn set_validation_interval(&self, secs: f64) -> Result<(), PoolError<C::Error>> {
        self.inner
            .config
            .write()
            .unwrap()
            .set_validation_interval(secs)
    }

    pub fn validation_interval(&self) -> Duration {
        self.current_config().validation_interval()
    }

    pub fn set_max_idle_time(&self, secs: f64) -> Result<(), PoolError<C::Error>> {
        self.inner.config.write().unwrap().set_max_idle_time(secs)
    }

    pub fn max_idle_time(&self) -> Duration {
        self.current_config().max_idle_time()
    }

    pub fn set_max_life_time(&self, secs: f64) -> Result<(), PoolError<C::Error>> {
        self.inner.config.write().unwrap().set_max_life_time(secs)
    }

    pub fn max_life_time(&self) -> Duration {
        self.current_config().max_life_time()
    }

    pub fn set_test_on_borrow(&self, value: bool) {
        self.inner.config.write().unwrap().set_test_on_borrow(value);
    }

    pub fn test_on_borrow(&self) -> bool {
        self.current_config().test_on_borrow()
    }

    pub fn set_test_on_return(&self, value: bool) {
        self.inner.config.write().unwrap().set_test_on_return(value);
    }

    pub fn test_on_return(&self) -> bool {
        self.current_config().test_on_return()
    }

    pub fn set_reset_connections(&self, value: bool) {
        self.inner
            .config
            .write()
            .unwrap()
            .set_reset_connections(value);
    }

    pub fn reset_connections(&self) -> bool {
        self.current_config().reset_connections()
    }

    /// Total connections currently owned by the pool (idle + borrowed).
    pub fn total_count(&self) -> usize {
        self.inner.registry.count()
    }

    /// Connections currently sitting in the idle queue.
    pub fn idle_count(&self) -> usize {
        self.current_idle().len()
    }

    /// A snapshot of pool health and traffic counters.
    pub fn stats(&self) -> Stats {
        let total = self.total_count();
        let idle = self.idle_count();
        Stats {
            max_active: self.max_active(),
            total_count: total,
            idle,
            in_use: total.saturating_sub(idle),
            wait_count: self.inner.counters.wait_count(),
            wait_duration: self.inner.counters.wait_duration(),
            idle_closed: self.inner.counters.idle_closed(),
            life_closed: self.inner.counters.life_closed(),
        }
    }
}

/// A smart pointer wrapping a borrowed connection.
///
/// Call [`release`](Self::release) to return it explicitly and observe
/// the resulting [`ReturnStatus`]. If the guard is simply dropped (the
/// common case, including on an early return or panic unwind), it is
/// returned to the pool from a detached task with the same rules —
/// callers that don't care about the status get ordinary RAII cleanup
/// for free.
pub struct PooledConnection<'a, C: Connector> {
    pool: &'a Pool<C>,
    managed: Option<Managed<C::Connection>>,
}

impl<'a, C: Connector> PooledConnection<'a, C> {
    /// Returns the connection to the pool, yielding the resulting
    /// status (see the return-status table in the module contract).
    pub async fn release(mut self) -> ReturnStatus {
        let managed = self.managed.take().expect("connection already released");
        self.pool.return_connection(managed).await
    }
}

impl<'a, C: Connector> Deref for PooledConnection<'a, C> {
    type Target = C::Connection;

    fn deref(&self) -> &C::Connection {
        &self.managed.as_ref().expect("connection already released").conn
    }
}

impl<'a, C: Connector> DerefMut for PooledConnection<'a, C> {
    fn deref_mut(&mut self) -> &mut C::Connection {
        &mut self.managed.as_mut().expect("connection already released").conn
    }
}

impl<'a, C: Connector> fmt::Debug for PooledConnection<'a, C>
where
    C::Connection: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("conn", &self.managed.as_ref().map(|m| &m.conn))
            .finish()
    }
}

impl<'a, C: Connector> Drop for PooledConnection<'a, C> {
    fn drop(&mut self) {
        if let Some(managed) = self.managed.take() {
            let pool = self.pool.clone();
            tokio::spawn(async move {
                pool.return_connection(managed).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;
    use std::sync::atomic::AtomicBool as StdAtomicBool;

    #[derive(Debug)]
    struct Never;

    impl fmt::Display for Never {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "never fails")
        }
    }

    impl std::error::Error for Never {}

    #[derive(Debug)]
    struct StubConnection {
        alive: bool,
        last_used_at: Instant,
    }

    #[async_trait::async_trait]
    impl ManagedConnection for StubConnection {
        fn is_alive(&self) -> bool {
            self.alive
        }

        async fn close(self) {}

        fn last_used_at(&self) -> Instant {
            self.last_used_at
        }
    }

    #[derive(Debug)]
    struct StubConnector {
        should_fail: StdAtomicBool,
    }

    #[async_trait::async_trait]
    impl Connector for StubConnector {
        type Connection = StubConnection;
        type Error = Never;

        async fn connect(&self) -> Result<StubConnection, Never> {
            let _ = self.should_fail.load(Ordering::Relaxed);
            Ok(StubConnection {
                alive: true,
                last_used_at: Instant::now(),
            })
        }
    }

    fn stub_pool() -> Pool<StubConnector> {
        Pool::new(
            StubConnector {
                should_fail: StdAtomicBool::new(false),
            },
            PoolConfig::default(),
        )
    }

    #[tokio::test]
    async fn returning_a_foreign_connection_is_rejected() {
        let pool = stub_pool();
        pool.init().await.unwrap();

        let foreign_id = pool.inner.registry.mint_id();
        let managed = Managed {
            id: foreign_id,
            created_at: Instant::now(),
            conn: StubConnection {
                alive: true,
                last_used_at: Instant::now(),
            },
        };

        let status = pool.return_connection(managed).await;
        assert_eq!(status, ReturnStatus::NotPartOfPool);
    }

    #[tokio::test]
    async fn returning_after_close_destroys_and_reports_not_initialized() {
        let pool = stub_pool();
        pool.init().await.unwrap();
        let conn = pool.borrow().await.unwrap();
        let managed = conn.managed.as_ref().unwrap();
        let id = managed.id;
        let created_at = managed.created_at;
        std::mem::forget(conn);

        pool.close().await;

        let managed = Managed {
            id,
            created_at,
            conn: StubConnection {
                alive: true,
                last_used_at: Instant::now(),
            },
        };
        let status = pool.return_connection(managed).await;
        assert_eq!(status, ReturnStatus::PoolNotInitialized);
    }

    #[tokio::test]
    async fn init_twice_is_a_noop() {
        let pool = stub_pool();
        pool.init().await.unwrap();
        pool.init().await.unwrap();
        assert_eq!(pool.total_count(), 0);
    }

    #[tokio::test]
    async fn close_before_init_is_terminal() {
        let pool = stub_pool();
        pool.close().await;
        pool.init().await.unwrap();
        assert_eq!(
            pool.inner.state.load(Ordering::Acquire),
            STATE_CLOSED,
            "init after close must not resurrect the pool"
        );
    }

    #[tokio::test]
    async fn return_reports_dead_connection_when_test_on_return_enabled() {
        let pool = stub_pool();
        pool.init().await.unwrap();
        let conn = pool.borrow().await.unwrap();
        let managed = conn.managed.as_ref().unwrap();
        let id = managed.id;
        let created_at = managed.created_at;
        std::mem::forget(conn);

        let managed = Managed {
            id,
            created_at,
            conn: StubConnection {
                alive: false,
                last_used_at: Instant::now(),
            },
        };
        let status = pool.return_connection(managed).await;
        assert_eq!(status, ReturnStatus::DeadConnection);
    }

    #[tokio::test]
    async fn return_reports_limit_reached_when_idle_queue_full() {
        let pool = Pool::new(
            StubConnector {
                should_fail: StdAtomicBool::new(false),
            },
            PoolConfig::builder()
                .max_active(1)
                .min_active(0)
                .build(),
        );
        pool.init().await.unwrap();

        let idle = pool.current_idle();
        let filler_id = pool.inner.registry.mint_id();
        pool.inner.registry.insert(filler_id, Instant::now());
        let filler = Managed {
            id: filler_id,
            created_at: Instant::now(),
            conn: StubConnection {
                alive: true,
                last_used_at: Instant::now(),
            },
        };
        assert!(matches!(idle.try_push(filler), PushOutcome::Accepted));

        let extra_id = pool.inner.registry.mint_id();
        pool.inner.registry.insert(extra_id, Instant::now());
        let extra = Managed {
            id: extra_id,
            created_at: Instant::now(),
            conn: StubConnection {
                alive: true,
                last_used_at: Instant::now(),
            },
        };
        let status = pool.return_connection(extra).await;
        assert_eq!(status, ReturnStatus::LimitReached);
    }
}
