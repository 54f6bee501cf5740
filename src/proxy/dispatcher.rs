//! Connection dispatcher (C8): binds the proxy listening socket,
//! accepts connections, sniffs the first line of each to route it to
//! the tunnel handler (CONNECT) or the plain-HTTP handler (everything
//! else), and tears everything down cleanly on shutdown.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::certcache::CertCache;
use crate::httpmsg::parser;
use crate::store::DecisionStore;

use super::engine::EngineConfig;
use super::{plain, tunnel};

pub struct Dispatcher {
    listener: TcpListener,
    cert_cache: Arc<CertCache>,
    engine_cfg: EngineConfig,
}

impl Dispatcher {
    pub async fn bind(
        bind_addr: &str,
        cert_cache: Arc<CertCache>,
        store: Arc<dyn DecisionStore>,
        client: reqwest::Client,
        poll_interval: std::time::Duration,
        decision_timeout: std::time::Duration,
        read_buffer_size: usize,
        max_response_body_bytes: usize,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(bind_addr).await?;
        Ok(Self {
            listener,
            cert_cache,
            engine_cfg: EngineConfig {
                store,
                client,
                poll_interval,
                decision_timeout,
                read_buffer_size,
                max_response_body_bytes,
            },
        })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Spawns one independent worker per connection;
    /// stops accepting and returns once `shutdown` is cancelled,
    /// letting in-flight workers finish at their next I/O boundary
    /// (spec.md §4.8, §5).
    pub async fn run(self, shutdown: CancellationToken) {
        let mut connection_id: u64 = 0;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("dispatcher stopping: shutdown requested");
                    break;
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    connection_id += 1;
                    let id = connection_id;
                    let cert_cache = self.cert_cache.clone();
                    let cfg = self.engine_cfg.clone();
                    let span = info_span!("connection", id, %peer);
                    tokio::spawn(
                        async move {
                            if let Err(e) = handle_connection(stream, &cert_cache, &cfg).await {
                                warn!(error = %e, "connection worker exited with error");
                            }
                        }
                        .instrument(span),
                    );
                }
            }
        }
    }
}

async fn handle_connection(
    mut stream: tokio::net::TcpStream,
    cert_cache: &CertCache,
    cfg: &EngineConfig,
) -> Result<(), crate::error::ConnectionError> {
    use tokio::io::AsyncReadExt;

    let mut buf = vec![0u8; cfg.read_buffer_size];
    let n = stream.read(&mut buf).await?;
    buf.truncate(n);
    if buf.is_empty() {
        return Ok(());
    }

    let first_line = String::from_utf8_lossy(&buf)
        .split(['\r', '\n'])
        .next()
        .unwrap_or("")
        .to_string();

    if parser::is_connect(&first_line) {
        tunnel::handle(stream, &first_line, cert_cache, cfg).await
    } else {
        plain::handle(stream, buf, cfg).await
    }
}
