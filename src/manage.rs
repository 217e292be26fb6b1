use std::error::Error as StdError;
use std::time::Instant;

use async_trait::async_trait;

/// A connection owned and recycled by a [`Pool`](crate::Pool).
///
/// Implementors are opaque from the pool's point of view: it never
/// inspects the connection beyond this trait. `is_alive` must be a pure,
/// non-suspending check (e.g. a flag the connection flips on a fatal I/O
/// error); anything that needs to talk to the backend belongs in a
/// validator sweep elsewhere, not here.
#[async_trait]
pub trait ManagedConnection: Send + 'static {
    /// Returns whether the connection still believes itself usable.
    ///
    /// Must not suspend and must not talk to the backend; it's consulted
    /// on the borrow and return hot paths.
    fn is_alive(&self) -> bool;

    /// Tears the connection down. Idempotent; errors are swallowed by the
    /// pool, which always calls this from a detached task.
    async fn close(self);

    /// The instant the connection was last handed back after use.
    ///
    /// Callers are expected to refresh this (directly on their concrete
    /// connection type) when they finish a unit of work; the validator
    /// reads it to decide idle eviction.
    fn last_used_at(&self) -> Instant;

    /// Best-effort reset invoked on borrow when `reset_connections` is
    /// enabled. The default implementation is a no-op.
    async fn reset(&mut self) -> Result<(), Box<dyn StdError + Send + Sync + 'static>> {
        Ok(())
    }
}

/// Produces new connections for a [`Pool`](crate::Pool).
///
/// `connect` may suspend and may fail; the pool serializes calls to it
/// through the creation gate so that at most one is ever in flight.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The connection type this connector produces.
    type Connection: ManagedConnection;
    /// The error type returned when connecting fails.
    type Error: StdError + Send + Sync + 'static;

    /// Attempts to create a new connection.
    async fn connect(&self) -> Result<Self::Connection, Self::Error>;
}
