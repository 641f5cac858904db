//! Integration tests for the socket pool against live echo peers

use socket_pool::{ConnectionPool, EchoServer, PoolError, TcpConnectionFactory};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[cfg(feature = "tls")]
use socket_pool::{TlsConfig, TlsConnectionFactory};

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 256) as u8).collect()
}

#[tokio::test]
async fn test_tcp_echo_round_trip() {
    let server = EchoServer::start("127.0.0.1:0").await.expect("echo listener");
    let factory = TcpConnectionFactory::new(server.addr().to_string());
    let pool = ConnectionPool::new(4, factory).expect("pool");

    let data = payload(1024);
    let mut conn = pool.get().await.expect("lease");
    conn.write_all(&data).await.expect("write");

    let mut echoed = vec![0u8; data.len()];
    conn.read_exact(&mut echoed).await.expect("read");
    assert_eq!(data, echoed);

    drop(conn);
    pool.close().await.expect("close");
}

#[tokio::test]
async fn test_leases_survive_release_cycles() {
    let server = EchoServer::start("127.0.0.1:0").await.expect("echo listener");
    let factory = TcpConnectionFactory::new(server.addr().to_string());
    let pool = ConnectionPool::new(2, factory).expect("pool");

    // The same slot's connection is reused across repeated lease cycles;
    // each round trip works without a fresh dial.
    for round in 0..10 {
        let msg = format!("round {}", round).into_bytes();
        let mut conn = pool.get().await.expect("lease");
        assert_eq!(conn.slot(), 0);

        conn.write_all(&msg).await.expect("write");
        let mut echoed = vec![0u8; msg.len()];
        conn.read_exact(&mut echoed).await.expect("read");
        assert_eq!(msg, echoed);
    }

    assert_eq!(pool.active(), 0);
    pool.close().await.expect("close");
}

#[tokio::test]
async fn test_exhaustion_and_release_over_real_connections() {
    let server = EchoServer::start("127.0.0.1:0").await.expect("echo listener");
    let factory = TcpConnectionFactory::new(server.addr().to_string());
    let pool = ConnectionPool::new(2, factory).expect("pool");

    let a = pool.get().await.expect("lease a");
    let b = pool.get().await.expect("lease b");
    assert_eq!(pool.active(), 2);

    assert!(matches!(pool.get().await, Err(PoolError::Exhausted(2))));
    assert_eq!(pool.active(), 2);

    let slot_a = a.slot();
    drop(a);
    assert_eq!(pool.active(), 1);

    // The freed slot comes back while b stays leased
    let again = pool.get().await.expect("lease again");
    assert_eq!(again.slot(), slot_a);
    assert_ne!(again.slot(), b.slot());

    drop(again);
    drop(b);
    pool.close().await.expect("close");
}

#[tokio::test]
async fn test_concurrent_round_trips() {
    let server = EchoServer::start("127.0.0.1:0").await.expect("echo listener");
    let factory = TcpConnectionFactory::new(server.addr().to_string());
    let pool = Arc::new(ConnectionPool::new(8, factory).expect("pool"));

    let mut handles = Vec::new();
    for id in 0..8 {
        let pool = Arc::clone(&pool);
        handles.push(tokio::spawn(async move {
            let msg = format!("hello from task {}", id).into_bytes();
            let mut conn = pool.get().await.expect("lease");
            conn.write_all(&msg).await.expect("write");

            let mut echoed = vec![0u8; msg.len()];
            conn.read_exact(&mut echoed).await.expect("read");
            assert_eq!(msg, echoed);
        }));
    }

    for handle in handles {
        handle.await.expect("task");
    }

    assert_eq!(pool.active(), 0);
    pool.close().await.expect("close");
}

#[cfg(feature = "tls")]
mod tls {
    use super::*;

    /// Self-signed CA plus a "localhost" server certificate issued by it,
    /// all in PEM
    struct TestPki {
        ca_pem: String,
        cert_pem: String,
        key_pem: String,
    }

    fn generate_pki() -> TestPki {
        let ca_key = rcgen::KeyPair::generate().expect("ca key");
        let mut ca_params =
            rcgen::CertificateParams::new(Vec::new()).expect("ca params");
        ca_params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        let ca_cert = ca_params.self_signed(&ca_key).expect("ca cert");

        let server_key = rcgen::KeyPair::generate().expect("server key");
        let server_params =
            rcgen::CertificateParams::new(vec!["localhost".to_string()]).expect("server params");
        let server_cert = server_params
            .signed_by(&server_key, &ca_cert, &ca_key)
            .expect("server cert");

        TestPki {
            ca_pem: ca_cert.pem(),
            cert_pem: server_cert.pem(),
            key_pem: server_key.serialize_pem(),
        }
    }

    #[tokio::test]
    async fn test_tls_echo_round_trip() {
        let pki = generate_pki();

        let server_config = TlsConfig::new()
            .with_server_cert_pem(pki.cert_pem.as_bytes(), pki.key_pem.as_bytes())
            .expect("server TLS config");
        let server = EchoServer::start_tls("127.0.0.1:0", &server_config)
            .await
            .expect("TLS echo listener");

        let client_config = TlsConfig::new()
            .with_client_ca_pem(pki.ca_pem.as_bytes())
            .expect("client TLS config");
        let factory =
            TlsConnectionFactory::new(server.addr().to_string(), "localhost", &client_config)
                .expect("factory");
        let pool = ConnectionPool::new(4, factory).expect("pool");

        let data = payload(4096);
        let mut conn = pool.get().await.expect("lease");
        conn.write_all(&data).await.expect("write");

        let mut echoed = vec![0u8; data.len()];
        conn.read_exact(&mut echoed).await.expect("read");
        assert_eq!(data, echoed);

        drop(conn);
        pool.close().await.expect("close");
    }

    #[tokio::test]
    async fn test_tls_handshake_failure_surfaces_as_dial_error() {
        let pki = generate_pki();

        // Plain TCP peer: the TLS handshake cannot complete
        let server = EchoServer::start("127.0.0.1:0").await.expect("echo listener");

        let client_config = TlsConfig::new()
            .with_client_ca_pem(pki.ca_pem.as_bytes())
            .expect("client TLS config");
        let factory =
            TlsConnectionFactory::new(server.addr().to_string(), "localhost", &client_config)
                .expect("factory");
        let pool = ConnectionPool::new(2, factory).expect("pool");

        let result = pool.get().await;
        assert!(matches!(result, Err(PoolError::Dial(_))));
        // The failed slot is not leaked
        assert_eq!(pool.active(), 0);
    }
}
