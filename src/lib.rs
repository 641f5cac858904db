//! # socket-pool
//!
//! A bounded pool of reusable connections to a single remote endpoint,
//! built on tokio. Repeated request-response exchanges skip the per-use
//! dial/handshake cost: each of the pool's fixed slots is dialed lazily on
//! first lease and the same connection is handed out again on later leases
//! of that slot.
//!
//! ## Features
//!
//! - Fixed capacity, lazy dialing, no re-dial per use
//! - Fail-fast leasing: `get` never blocks waiting for a free slot
//! - Pluggable dial strategy: plain TCP or TLS via [`ConnectionFactory`]
//! - RAII lease guards; release and double-release mistakes are
//!   unrepresentable
//! - Aggregated shutdown errors on close
//!
//! ## Example
//!
//! ```no_run
//! use socket_pool::{ConnectionPool, TcpConnectionFactory};
//! use tokio::io::{AsyncReadExt, AsyncWriteExt};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let factory = TcpConnectionFactory::new("127.0.0.1:9000");
//!     let pool = ConnectionPool::new(8, factory)?;
//!
//!     let mut conn = pool.get().await?;
//!     conn.write_all(b"hello").await?;
//!     let mut buf = [0u8; 5];
//!     conn.read_exact(&mut buf).await?;
//!     drop(conn); // lease released, connection stays pooled
//!
//!     pool.close().await?;
//!     Ok(())
//! }
//! ```

pub mod echo;
pub mod error;
pub mod factory;
pub mod pooling;

#[cfg(feature = "tls")]
pub mod tls;

// Re-export main types
pub use echo::EchoServer;
pub use error::{CloseFailure, PoolError, Result};
pub use factory::{ConnectionFactory, TcpConnectionFactory, DEFAULT_CONNECT_TIMEOUT};
pub use pooling::{ConnectionPool, PooledConn};

#[cfg(feature = "tls")]
pub use factory::TlsConnectionFactory;

#[cfg(feature = "tls")]
pub use tls::TlsConfig;
