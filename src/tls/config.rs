//! TLS configuration for the secure connection factory and test peers

use crate::error::{PoolError, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::{self, ClientConfig, ServerConfig};
use tokio_rustls::{TlsAcceptor, TlsConnector};

/// Certificate material and verification policy for TLS endpoints
///
/// The client side feeds [`TlsConnectionFactory`](crate::TlsConnectionFactory);
/// the server side exists for the TLS echo peer used by tests and benches.
#[derive(Clone)]
pub struct TlsConfig {
    server_config: Option<Arc<ServerConfig>>,
    client_config: Option<Arc<ClientConfig>>,
}

impl TlsConfig {
    /// Create an empty TLS configuration
    ///
    /// Installs the ring crypto provider if none is installed yet, as
    /// required by rustls 0.23+. Safe to call repeatedly.
    #[must_use]
    pub fn new() -> Self {
        let _ = rustls::crypto::ring::default_provider().install_default();

        Self {
            server_config: None,
            client_config: None,
        }
    }

    /// Load the server certificate chain and private key from PEM files
    ///
    /// # Errors
    ///
    /// Returns an error if the files cannot be read, parsed, or do not
    /// form a valid certificate/key pair.
    pub fn with_server_cert_file(
        mut self,
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
    ) -> Result<Self> {
        let certs = Self::load_certs(cert_path.as_ref())?;
        let key = Self::load_private_key(key_path.as_ref())?;

        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| PoolError::tls(format!("invalid server certificate: {}", e)))?;

        self.server_config = Some(Arc::new(config));
        Ok(self)
    }

    /// Load the server certificate chain and private key from PEM data
    ///
    /// # Errors
    ///
    /// Returns an error if the certificate or key is invalid.
    pub fn with_server_cert_pem(mut self, cert_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        let certs = Self::parse_certs(cert_pem)?;
        let key = Self::parse_private_key(key_pem)?;

        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| PoolError::tls(format!("invalid server certificate: {}", e)))?;

        self.server_config = Some(Arc::new(config));
        Ok(self)
    }

    /// Trust the root CA certificates in the given PEM file for
    /// client-side verification
    ///
    /// # Errors
    ///
    /// Returns an error if the CA file cannot be read or is invalid.
    pub fn with_client_ca_file(mut self, ca_path: impl AsRef<Path>) -> Result<Self> {
        let ca_certs = Self::load_certs(ca_path.as_ref())?;
        self.client_config = Some(Arc::new(Self::client_config_with_roots(ca_certs)?));
        Ok(self)
    }

    /// Trust the root CA certificates in the given PEM data for
    /// client-side verification
    ///
    /// # Errors
    ///
    /// Returns an error if the CA certificate is invalid.
    pub fn with_client_ca_pem(mut self, ca_pem: &[u8]) -> Result<Self> {
        let ca_certs = Self::parse_certs(ca_pem)?;
        self.client_config = Some(Arc::new(Self::client_config_with_roots(ca_certs)?));
        Ok(self)
    }

    /// Trust the operating system's root certificates for client-side
    /// verification
    ///
    /// # Errors
    ///
    /// Returns an error if the system roots cannot be loaded.
    pub fn with_client_system_roots(mut self) -> Result<Self> {
        let native_certs = rustls_native_certs::load_native_certs();

        if !native_certs.errors.is_empty() {
            tracing::warn!(
                errors = native_certs.errors.len(),
                "some system certificates could not be loaded"
            );
        }

        self.client_config = Some(Arc::new(Self::client_config_with_roots(
            native_certs.certs,
        )?));
        Ok(self)
    }

    /// Accept any server certificate on the client side
    ///
    /// # Security Warning
    ///
    /// Disables certificate verification entirely. Only available in test
    /// builds or behind the `insecure` feature, for test and bench
    /// harnesses talking to throwaway peers.
    #[cfg(any(test, feature = "insecure"))]
    #[must_use]
    pub fn with_client_insecure(mut self) -> Self {
        let config = ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier))
            .with_no_client_auth();

        self.client_config = Some(Arc::new(config));
        self
    }

    /// TLS acceptor for the server side, if configured
    #[must_use]
    pub fn acceptor(&self) -> Option<TlsAcceptor> {
        self.server_config
            .as_ref()
            .map(|config| TlsAcceptor::from(Arc::clone(config)))
    }

    /// TLS connector for the client side, if configured
    #[must_use]
    pub fn connector(&self) -> Option<TlsConnector> {
        self.client_config
            .as_ref()
            .map(|config| TlsConnector::from(Arc::clone(config)))
    }

    /// Check if server TLS is configured
    #[must_use]
    pub fn has_server_config(&self) -> bool {
        self.server_config.is_some()
    }

    /// Check if client TLS is configured
    #[must_use]
    pub fn has_client_config(&self) -> bool {
        self.client_config.is_some()
    }

    // Helper functions

    fn client_config_with_roots(certs: Vec<CertificateDer<'static>>) -> Result<ClientConfig> {
        let mut root_store = rustls::RootCertStore::empty();
        for cert in certs {
            root_store
                .add(cert)
                .map_err(|e| PoolError::tls(format!("invalid CA certificate: {}", e)))?;
        }

        Ok(ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth())
    }

    fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
        let file = File::open(path).map_err(|e| {
            PoolError::tls(format!(
                "failed to open certificate file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::parse_certs_reader(&mut BufReader::new(file))
    }

    fn parse_certs(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
        Self::parse_certs_reader(&mut BufReader::new(pem))
    }

    fn parse_certs_reader(reader: &mut dyn std::io::BufRead) -> Result<Vec<CertificateDer<'static>>> {
        let certs = rustls_pemfile::certs(reader)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| PoolError::tls(format!("failed to parse certificates: {}", e)))?;

        if certs.is_empty() {
            return Err(PoolError::tls("no certificates found in PEM data"));
        }

        Ok(certs)
    }

    fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
        let file = File::open(path).map_err(|e| {
            PoolError::tls(format!(
                "failed to open key file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::parse_key_reader(&mut BufReader::new(file))
    }

    fn parse_private_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>> {
        Self::parse_key_reader(&mut BufReader::new(pem))
    }

    fn parse_key_reader(reader: &mut dyn std::io::BufRead) -> Result<PrivateKeyDer<'static>> {
        rustls_pemfile::private_key(reader)
            .map_err(|e| PoolError::tls(format!("failed to parse private key: {}", e)))?
            .ok_or_else(|| PoolError::tls("no private key found in PEM data"))
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Certificate verifier that accepts any certificate
///
/// Only compiled for test builds or the `insecure` feature.
#[cfg(any(test, feature = "insecure"))]
#[derive(Debug)]
struct NoVerifier;

#[cfg(any(test, feature = "insecure"))]
impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config() {
        let config = TlsConfig::new();
        assert!(!config.has_server_config());
        assert!(!config.has_client_config());
        assert!(config.acceptor().is_none());
        assert!(config.connector().is_none());
    }

    #[test]
    fn test_insecure_client_config() {
        let config = TlsConfig::new().with_client_insecure();
        assert!(config.has_client_config());
        assert!(config.connector().is_some());
    }

    #[test]
    fn test_garbage_pem_rejected() {
        let result = TlsConfig::new().with_client_ca_pem(b"not a certificate");
        assert!(matches!(result, Err(PoolError::Tls(_))));
    }
}
