//! mitm-proxy library crate.
//!
//! `main.rs` is a thin wrapper around [`run`]; splitting the binary this
//! way (mirroring the lib/bin split used by this ecosystem's own crates,
//! e.g. `rama-utils`) lets `tests/` exercise the proxy engine, decision
//! store, and policy/parser modules directly instead of only through a
//! spawned subprocess.

use std::sync::Arc;

pub mod api;
pub mod ca;
pub mod certcache;
pub mod config;
pub mod error;
pub mod httpmsg;
pub mod proxy;
pub mod store;
pub mod trace;

use ca::CertificateAuthority;
use certcache::CertCache;
use config::Args;
use error::ErrorWithExitCode;
use proxy::dispatcher::Dispatcher;
use store::memory_store::MemoryStore;
use store::redis_store::RedisStore;
use store::DecisionStore;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Run the proxy and its control-plane API until `ctrl_c` or `shutdown`
/// fires, whichever comes first. `main.rs` drives this with a
/// `ctrl_c`-backed token; tests drive it with one they cancel directly.
pub async fn run(args: Args, shutdown: CancellationToken) -> Result<(), anyhow::Error> {
    // the MITM use case is the one legitimate reason to run without
    // upstream certificate verification; ring is the process-default
    // crypto provider for both the client-facing and upstream-facing
    // TLS stacks.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let (ca_cert_path, ca_key_path) = ca::default_ca_paths(&args.ca_cert, &args.ca_key);
    let authority = CertificateAuthority::load_or_generate(&ca_cert_path, &ca_key_path)
        .map_err(|e| ErrorWithExitCode::new(1, anyhow::anyhow!(e)))?;
    let cert_cache = Arc::new(
        CertCache::new(&args.cert_cache_dir, Arc::new(authority))
            .map_err(|e| ErrorWithExitCode::new(1, anyhow::anyhow!(e)))?,
    );

    let store: Arc<dyn DecisionStore> = if args.memory_store {
        info!("using in-memory decision store");
        Arc::new(MemoryStore::new())
    } else {
        info!(redis_url = %args.redis_url, "connecting to redis decision store");
        Arc::new(
            RedisStore::connect(&args.redis_url)
                .await
                .map_err(|e| ErrorWithExitCode::new(1, anyhow::anyhow!(e)))?,
        )
    };

    let client = proxy::upstream::build_client(args.upstream_timeout(), args.verify_upstream_tls)
        .map_err(|e| ErrorWithExitCode::new(1, anyhow::anyhow!(e)))?;

    let dispatcher = Dispatcher::bind(
        &args.proxy_bind,
        cert_cache.clone(),
        store.clone(),
        client,
        args.poll_interval(),
        args.decision_timeout(),
        args.read_buffer_size,
        args.max_response_body_bytes,
    )
    .await
    .map_err(|e| ErrorWithExitCode::new(1, anyhow::anyhow!(e)))?;

    let proxy_addr = dispatcher
        .local_addr()
        .map_err(|e| ErrorWithExitCode::new(1, anyhow::anyhow!(e)))?;

    let api_state = api::ApiState { store: store.clone() };
    let api_router = api::router(api_state);
    let api_listener = tokio::net::TcpListener::bind(&args.api_bind)
        .await
        .map_err(|e| ErrorWithExitCode::new(1, anyhow::anyhow!(e)))?;
    let api_addr = api_listener
        .local_addr()
        .map_err(|e| ErrorWithExitCode::new(1, anyhow::anyhow!(e)))?;

    info!(%proxy_addr, %api_addr, "mitm-proxy ready");

    let dispatcher_shutdown = shutdown.clone();
    let dispatcher_task = tokio::spawn(dispatcher.run(dispatcher_shutdown));

    let api_shutdown = shutdown.clone();
    let api_task = tokio::spawn(async move {
        axum::serve(api_listener, api_router)
            .with_graceful_shutdown(async move { api_shutdown.cancelled().await })
            .await
    });

    shutdown.cancelled().await;
    info!("shutdown requested");

    let _ = dispatcher_task.await;
    let _ = api_task.await;

    cert_cache.purge().ok();
    store.flush_all().await.ok();

    info!("shutdown complete");
    Ok(())
}
