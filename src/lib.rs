//! A generic connection pool for async, tokio-based runtimes.
//!
//! The pool is agnostic to what a "connection" actually is: implement
//! [`ManagedConnection`] for your client type and [`Connector`] for
//! whatever knows how to build one, and `tidalpool` takes care of
//! bounding concurrency, keeping a warm minimum alive, enforcing borrow
//! timeouts, and periodically evicting dead, idle, or aged-out
//! connections.
//!
//! # Example
//!
//! Using an imaginary "foodb" client.
//!
//! ```ignore
//! use tidalpool::{Pool, PoolConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let pool = Pool::new(FooConnector::new("localhost:1234"), PoolConfig::default());
//!     pool.init().await.unwrap();
//!
//!     let conn = pool.borrow().await.unwrap();
//!     // use the connection; it returns to the pool when dropped, or
//!     // call `conn.release().await` to observe the return status.
//! }
//! ```
#![deny(missing_debug_implementations)]

mod config;
mod error;
mod gate;
mod idle;
mod manage;
mod pool;
mod registry;
mod stats;

pub use config::{PoolConfig, PoolConfigBuilder};
pub use error::{PoolError, ReturnStatus};
pub use manage::{Connector, ManagedConnection};
pub use pool::{Pool, PooledConnection};
pub use stats::Stats;
