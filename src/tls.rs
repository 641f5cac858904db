//! TLS support for secure pooled connections

#[cfg(feature = "tls")]
pub mod config;

#[cfg(feature = "tls")]
pub use config::TlsConfig;

#[cfg(feature = "tls")]
pub use tokio_rustls::TlsAcceptor;

#[cfg(feature = "tls")]
pub use tokio_rustls::TlsConnector;
