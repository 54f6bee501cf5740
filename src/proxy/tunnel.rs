//! Tunnel handler (C6): terminates a CONNECT into a client-facing TLS
//! session using a minted leaf cert, then hands off to the shared
//! decision engine. States S0-S2 of spec.md §4.6; S3 onward live in
//! [`super::engine`].

use std::sync::Arc;

use rustls::ServerConfig;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, warn};

use crate::certcache::CertCache;
use crate::error::ConnectionError;
use crate::httpmsg::parser;

use super::engine::{self, EngineConfig};

/// Drive S0-T for one CONNECT connection. `first_line` is the already
/// parsed-off first line (the dispatcher peeked it to route here);
/// `leftover` is whatever else arrived in the same initial read and
/// must be treated as already consumed (the client shouldn't send
/// anything past the CONNECT line before seeing the 200, but we don't
/// assume that).
pub async fn handle(
    mut stream: TcpStream,
    first_line: &str,
    cert_cache: &CertCache,
    cfg: &EngineConfig,
) -> Result<(), ConnectionError> {
    let hostname = parser::extract_hostname(first_line).ok_or(ConnectionError::MalformedConnect)?;
    debug!(hostname, "CONNECT received");

    let cached = match cert_cache.get_or_mint(&hostname).await {
        Ok(c) => c,
        Err(e) => {
            warn!(hostname, error = %e, "cert mint failed");
            let _ = stream.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
            return Err(ConnectionError::Mint(e));
        }
    };

    stream
        .write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
        .await?;

    let server_config = build_server_config(&cached.cert_pem, &cached.key_pem)
        .map_err(|e| ConnectionError::TlsHandshake(e.to_string()))?;
    let acceptor = TlsAcceptor::from(Arc::new(server_config));

    let mut tls_stream = match acceptor.accept(stream).await {
        Ok(s) => s,
        Err(e) => {
            debug!(hostname, error = %e, "tls handshake failed");
            return Err(ConnectionError::TlsHandshake(e.to_string()));
        }
    };

    let result = engine::run_exchange(&mut tls_stream, &hostname, "https", cfg, None).await;
    let _ = tls_stream.shutdown().await;
    result
}

fn build_server_config(cert_pem: &str, key_pem: &str) -> anyhow::Result<ServerConfig> {
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_pem.as_bytes())
        .collect::<Result<Vec<_>, _>>()?;
    let key = rustls_pemfile::private_key(&mut key_pem.as_bytes())?
        .ok_or_else(|| anyhow::anyhow!("no private key found in minted leaf pem"))?;
    let key: PrivateKeyDer<'static> = key;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    Ok(config)
}
