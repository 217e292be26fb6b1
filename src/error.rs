use std::error::Error as StdError;
use std::fmt;

/// Errors produced by [`Pool::borrow`](crate::Pool::borrow) and the
/// configuration setters.
#[derive(Debug, thiserror::Error)]
pub enum PoolError<E: StdError + 'static> {
    /// The pool has not been initialized, or has been closed.
    #[error("connection pool is closed")]
    PoolClosed,
    /// The wait for an idle connection exceeded `max_wait_time`.
    #[error("timed out waiting for a connection")]
    BorrowTimeout,
    /// The connector failed while creating a new connection.
    #[error("connector error: {0}")]
    Connector(#[source] E),
    /// A setter rejected its argument (negative, or zero where forbidden).
    #[error("invalid pool configuration: {0}")]
    InvalidConfiguration(&'static str),
    /// `reset()` failed on the connection about to be handed out.
    #[error("failed to reset connection: {0}")]
    Reset(#[source] Box<dyn StdError + Send + Sync + 'static>),
}

/// The outcome of returning a connection to the pool.
///
/// Unlike `borrow`, `return` never fails the caller: it always concludes
/// in one of these states, and the connection is destroyed in every
/// state but [`Ok`](ReturnStatus::Ok).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnStatus {
    /// Accepted back into the idle queue.
    Ok,
    /// The pool was never initialized or has since been closed.
    PoolNotInitialized,
    /// The connection did not come from this pool's registry.
    NotPartOfPool,
    /// The idle queue was full, most likely after a resize-down.
    LimitReached,
    /// `test_on_return` is enabled and the connection reported itself dead.
    DeadConnection,
    /// The connection exceeded `max_life_time`.
    MaxLifeTime,
    /// The idle queue was closed mid-return (a resize or close raced us).
    PoolClosed,
}

impl fmt::Display for ReturnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReturnStatus::Ok => "ok",
            ReturnStatus::PoolNotInitialized => "pool-not-initialized",
            ReturnStatus::NotPartOfPool => "not-part-of-pool",
            ReturnStatus::LimitReached => "limit-reached",
            ReturnStatus::DeadConnection => "dead-connection",
            ReturnStatus::MaxLifeTime => "max-life-time",
            ReturnStatus::PoolClosed => "pool-closed",
        };
        f.write_str(s)
    }
}
