//! Byte-mirroring test peer
//!
//! A minimal remote endpoint for exercising the pool: every accepted
//! connection has its bytes copied straight back until the peer closes.
//! Used by the integration tests and benchmarks; not part of the pooling
//! core.

use crate::error::Result;
use std::net::SocketAddr;
use tokio::io::{self, AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[cfg(feature = "tls")]
use crate::error::PoolError;
#[cfg(feature = "tls")]
use crate::tls::TlsConfig;

/// Handle to a running echo listener
///
/// Accepting stops when the handle is dropped.
pub struct EchoServer {
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl EchoServer {
    /// Start a plain TCP echo listener on the given address
    ///
    /// Bind to port 0 to let the OS pick a free port; the chosen address
    /// is available through [`addr`](EchoServer::addr).
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        tracing::debug!(%peer, "echo peer accepted connection");
                        tokio::spawn(mirror(stream));
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "echo peer stopped accepting");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            local_addr,
            accept_task,
        })
    }

    /// Start a TLS echo listener using the server side of `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound or `config` has no
    /// server-side TLS configuration.
    #[cfg(feature = "tls")]
    pub async fn start_tls(addr: &str, config: &TlsConfig) -> Result<Self> {
        let acceptor = config
            .acceptor()
            .ok_or_else(|| PoolError::tls("no server TLS configuration"))?;

        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        tracing::debug!(%peer, "TLS echo peer accepted connection");
                        let acceptor = acceptor.clone();
                        tokio::spawn(async move {
                            match acceptor.accept(stream).await {
                                Ok(tls_stream) => mirror(tls_stream).await,
                                Err(e) => {
                                    tracing::debug!(error = %e, "TLS echo handshake failed");
                                }
                            }
                        });
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "TLS echo peer stopped accepting");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            local_addr,
            accept_task,
        })
    }

    /// The address the listener is bound to
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for EchoServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

/// Copy everything read from the stream back into it
async fn mirror<S: AsyncRead + AsyncWrite + Unpin>(stream: S) {
    let (mut reader, mut writer) = io::split(stream);
    let _ = io::copy(&mut reader, &mut writer).await;
}
