//! Connection creation strategies
//!
//! A [`ConnectionFactory`] encapsulates how a single connection to the remote
//! endpoint is produced: a plain TCP dial, or a TCP dial followed by a TLS
//! handshake. Factories are stateless with respect to the pool; every call
//! performs a fresh dial, and caching/reuse is the pool's job.

use crate::error::{PoolError, Result};
use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;

#[cfg(feature = "tls")]
use crate::tls::TlsConfig;
#[cfg(feature = "tls")]
use tokio_rustls::rustls::pki_types::ServerName;
#[cfg(feature = "tls")]
use tokio_rustls::TlsConnector;

/// Default time allowed for a dial (and handshake, for TLS) to complete
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Capability for producing new connections on demand
///
/// Implementations perform one network dial per call, with no retry and no
/// caching. Errors are propagated unchanged to the caller that triggered
/// the dial.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// The duplex byte stream this factory produces
    type Connection: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Produce a new connection to the configured remote endpoint
    async fn connect(&self) -> Result<Self::Connection>;
}

/// Factory for plain TCP connections
#[derive(Debug, Clone)]
pub struct TcpConnectionFactory {
    addr: String,
    connect_timeout: Duration,
}

impl TcpConnectionFactory {
    /// Create a factory dialing the given remote address
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set the connect timeout
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// The remote address this factory dials
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl ConnectionFactory for TcpConnectionFactory {
    type Connection = TcpStream;

    async fn connect(&self) -> Result<TcpStream> {
        let stream = timeout(self.connect_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| {
                PoolError::Dial(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {} timed out", self.addr),
                ))
            })??;
        tracing::debug!(addr = %self.addr, "dialed TCP connection");
        Ok(stream)
    }
}

/// Factory for TLS connections
///
/// Dials the remote address over TCP, then performs a rustls handshake
/// using the connector from the supplied [`TlsConfig`]. The server name is
/// what the peer's certificate is verified against and may differ from the
/// dialed address (e.g. dialing an IP while verifying a hostname).
#[cfg(feature = "tls")]
#[derive(Clone)]
pub struct TlsConnectionFactory {
    addr: String,
    server_name: String,
    connector: TlsConnector,
    connect_timeout: Duration,
}

#[cfg(feature = "tls")]
impl TlsConnectionFactory {
    /// Create a factory dialing the given address and verifying the given
    /// server name with the client configuration in `config`
    ///
    /// # Errors
    ///
    /// Returns an error if `config` has no client-side TLS configuration.
    pub fn new(
        addr: impl Into<String>,
        server_name: impl Into<String>,
        config: &TlsConfig,
    ) -> Result<Self> {
        let connector = config
            .connector()
            .ok_or_else(|| PoolError::tls("no client TLS configuration"))?;

        Ok(Self {
            addr: addr.into(),
            server_name: server_name.into(),
            connector,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
    }

    /// Set the connect timeout (covers both the dial and the handshake)
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// The remote address this factory dials
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[cfg(feature = "tls")]
#[async_trait]
impl ConnectionFactory for TlsConnectionFactory {
    type Connection = tokio_rustls::client::TlsStream<TcpStream>;

    async fn connect(&self) -> Result<Self::Connection> {
        let server_name = ServerName::try_from(self.server_name.clone())
            .map_err(|e| PoolError::tls(format!("invalid server name: {}", e)))?;

        let stream = timeout(self.connect_timeout, async {
            let tcp = TcpStream::connect(&self.addr).await?;
            self.connector.connect(server_name, tcp).await
        })
        .await
        .map_err(|_| {
            PoolError::Dial(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("TLS connect to {} timed out", self.addr),
            ))
        })??;

        tracing::debug!(addr = %self.addr, server_name = %self.server_name, "completed TLS handshake");
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_factory_config() {
        let factory = TcpConnectionFactory::new("127.0.0.1:9000")
            .with_connect_timeout(Duration::from_secs(2));
        assert_eq!(factory.addr(), "127.0.0.1:9000");
        assert_eq!(factory.connect_timeout, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_tcp_factory_dial_failure() {
        // Port 1 on localhost is essentially never listening
        let factory = TcpConnectionFactory::new("127.0.0.1:1");
        let result = factory.connect().await;
        assert!(matches!(result, Err(PoolError::Dial(_))));
    }

    #[cfg(feature = "tls")]
    #[test]
    fn test_tls_factory_requires_client_config() {
        let config = TlsConfig::new();
        let result = TlsConnectionFactory::new("127.0.0.1:9000", "localhost", &config);
        assert!(matches!(result, Err(PoolError::Tls(_))));
    }
}
