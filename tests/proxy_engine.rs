//! End-to-end exercises of the shared decision-loop engine (spec.md
//! §4.6/§7), driven directly against [`mitm_proxy::proxy::engine`] over
//! an in-memory duplex stream plus a minimal local HTTP stub upstream.
//! This covers the six scenarios spec.md calls out: intercept-allow,
//! intercept-block, intercept-timeout, filter-domain-block,
//! filter-keyword-block, and intercept-body-edit.

use std::sync::Arc;
use std::time::Duration;

use mitm_proxy::proxy::engine::{run_exchange, EngineConfig};
use mitm_proxy::proxy::upstream;
use mitm_proxy::store::memory_store::MemoryStore;
use mitm_proxy::store::{DecisionStore, ProxyMode, RecordEdit, Status};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Binds a one-shot HTTP/1.1 stub upstream that replies with a fixed
/// body, and hands back the bytes it actually received (so a test can
/// assert an edited request body made it all the way through).
async fn spawn_stub_upstream(response_body: &'static str) -> (String, tokio::sync::oneshot::Receiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub upstream");
    let addr = listener.local_addr().expect("local_addr");
    let (tx, rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept stub connection");
        let mut received = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            match tokio::time::timeout(Duration::from_millis(300), stream.read(&mut chunk)).await {
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(n)) => received.extend_from_slice(&chunk[..n]),
                Ok(Err(_)) => break,
            }
        }
        let _ = tx.send(received);
        let resp = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{}",
            response_body.len(),
            response_body
        );
        let _ = stream.write_all(resp.as_bytes()).await;
        let _ = stream.shutdown().await;
    });

    (format!("127.0.0.1:{}", addr.port()), rx)
}

async fn test_engine_config(store: Arc<dyn DecisionStore>) -> EngineConfig {
    let client = upstream::build_client(Duration::from_secs(5), false).expect("build client");
    EngineConfig {
        store,
        client,
        poll_interval: Duration::from_millis(20),
        decision_timeout: Duration::from_millis(500),
        read_buffer_size: 4096,
        max_response_body_bytes: 1024 * 1024,
    }
}

/// Poll the store until exactly one request is pending, returning its id.
async fn wait_for_pending_request(store: &Arc<dyn DecisionStore>) -> String {
    for _ in 0..100 {
        let pending = store.list_pending_requests().await.expect("list pending");
        if let Some(first) = pending.into_iter().next() {
            return first.id;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no request became pending in time");
}

async fn read_all_available(stream: &mut tokio::io::DuplexStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match tokio::time::timeout(Duration::from_millis(300), stream.read(&mut chunk)).await {
            Ok(Ok(0)) | Err(_) => break,
            Ok(Ok(n)) => buf.extend_from_slice(&chunk[..n]),
            Ok(Err(_)) => break,
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

#[tokio::test]
async fn intercept_mode_allow_forwards_to_upstream() {
    let (hostname, upstream_rx) = spawn_stub_upstream("hello from upstream").await;
    let store: Arc<dyn DecisionStore> = Arc::new(MemoryStore::new());
    let cfg = test_engine_config(store.clone()).await;

    let (mut client_side, mut proxy_side) = tokio::io::duplex(8192);
    let exchange = tokio::spawn(async move {
        run_exchange(&mut proxy_side, &hostname, "http", &cfg, None).await
    });

    client_side
        .write_all(b"GET / HTTP/1.1\r\nHost: example.test\r\n\r\n")
        .await
        .unwrap();

    let id = wait_for_pending_request(&store).await;
    store.update_request_status(&id, Status::Allowed).await.unwrap();

    // the response record shares the request's id (spec.md §4.3), so
    // poll for it to appear under that same id and allow it too.
    wait_for_pending_response(&store, &id).await;
    store.update_response_status(&id, Status::Allowed).await.unwrap();

    let result = exchange.await.unwrap();
    assert!(result.is_ok(), "exchange failed: {:?}", result);

    let upstream_bytes = upstream_rx.await.unwrap();
    assert!(String::from_utf8_lossy(&upstream_bytes).starts_with("GET / HTTP/1.1"));

    let response = read_all_available(&mut client_side).await;
    assert!(response.starts_with("HTTP/1.1 200"), "response was: {response}");
    assert!(response.ends_with("hello from upstream"));
}

/// Poll the store until a response record exists under `id` (it shares
/// the originating request's id per spec.md §4.3).
async fn wait_for_pending_response(store: &Arc<dyn DecisionStore>, id: &str) {
    for _ in 0..100 {
        if store.get_response(id).await.unwrap().is_some() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no response became pending in time");
}

#[tokio::test]
async fn intercept_mode_block_returns_403_without_contacting_upstream() {
    let (hostname, upstream_rx) = spawn_stub_upstream("should never be fetched").await;
    let store: Arc<dyn DecisionStore> = Arc::new(MemoryStore::new());
    let cfg = test_engine_config(store.clone()).await;

    let (mut client_side, mut proxy_side) = tokio::io::duplex(8192);
    let exchange = tokio::spawn(async move {
        run_exchange(&mut proxy_side, &hostname, "http", &cfg, None).await
    });

    client_side
        .write_all(b"GET /secret HTTP/1.1\r\nHost: example.test\r\n\r\n")
        .await
        .unwrap();

    let id = wait_for_pending_request(&store).await;
    store.update_request_status(&id, Status::Blocked).await.unwrap();

    let result = exchange.await.unwrap();
    assert!(result.is_ok());

    let response = read_all_available(&mut client_side).await;
    assert!(response.starts_with("HTTP/1.1 403"), "response was: {response}");

    // the upstream must never have been contacted: its receiver is
    // dropped without ever accepting a connection once this test ends,
    // so just assert it hasn't fired within a short grace window.
    let outcome = tokio::time::timeout(Duration::from_millis(100), upstream_rx).await;
    assert!(outcome.is_err(), "upstream was contacted despite the block");
}

#[tokio::test]
async fn intercept_mode_decision_timeout_returns_408() {
    let (hostname, _upstream_rx) = spawn_stub_upstream("unused").await;
    let store: Arc<dyn DecisionStore> = Arc::new(MemoryStore::new());
    let mut cfg = test_engine_config(store.clone()).await;
    cfg.decision_timeout = Duration::from_millis(60);
    cfg.poll_interval = Duration::from_millis(10);

    let (mut client_side, mut proxy_side) = tokio::io::duplex(8192);
    let exchange = tokio::spawn(async move {
        run_exchange(&mut proxy_side, &hostname, "http", &cfg, None).await
    });

    client_side
        .write_all(b"GET / HTTP/1.1\r\nHost: example.test\r\n\r\n")
        .await
        .unwrap();

    // deliberately never resolve the pending request.
    let result = exchange.await.unwrap();
    assert!(result.is_ok());

    let response = read_all_available(&mut client_side).await;
    assert!(response.starts_with("HTTP/1.1 408"), "response was: {response}");
}

#[tokio::test]
async fn filter_mode_blocked_domain_denies_without_store_round_trip() {
    let (hostname, upstream_rx) = spawn_stub_upstream("should never be fetched").await;
    let store: Arc<dyn DecisionStore> = Arc::new(MemoryStore::new());
    store.set_mode(ProxyMode::Filter).await.unwrap();
    store.add_blocked_domain(&hostname).await.unwrap();
    let cfg = test_engine_config(store.clone()).await;

    let (mut client_side, mut proxy_side) = tokio::io::duplex(8192);
    let exchange = tokio::spawn(async move {
        run_exchange(&mut proxy_side, &hostname, "http", &cfg, None).await
    });

    client_side
        .write_all(b"GET / HTTP/1.1\r\nHost: example.test\r\n\r\n")
        .await
        .unwrap();

    let result = exchange.await.unwrap();
    assert!(result.is_ok());

    let response = read_all_available(&mut client_side).await;
    assert!(response.starts_with("HTTP/1.1 403"), "response was: {response}");
    assert!(response.contains("blocked domain"));

    let outcome = tokio::time::timeout(Duration::from_millis(100), upstream_rx).await;
    assert!(outcome.is_err(), "upstream was contacted despite the domain block");
}

#[tokio::test]
async fn filter_mode_blocked_keyword_in_response_body_denies() {
    let (hostname, _upstream_rx) = spawn_stub_upstream("this body mentions dragon explicitly").await;
    let store: Arc<dyn DecisionStore> = Arc::new(MemoryStore::new());
    store.set_mode(ProxyMode::Filter).await.unwrap();
    store.add_blocked_keyword("dragon").await.unwrap();
    let cfg = test_engine_config(store.clone()).await;

    let (mut client_side, mut proxy_side) = tokio::io::duplex(8192);
    let exchange = tokio::spawn(async move {
        run_exchange(&mut proxy_side, &hostname, "http", &cfg, None).await
    });

    client_side
        .write_all(b"GET / HTTP/1.1\r\nHost: example.test\r\n\r\n")
        .await
        .unwrap();

    let result = exchange.await.unwrap();
    assert!(result.is_ok());

    let response = read_all_available(&mut client_side).await;
    assert!(response.starts_with("HTTP/1.1 403"), "response was: {response}");
    assert!(response.contains("blocked keyword"));
    assert!(response.contains("dragon"));
}

#[tokio::test]
async fn intercept_mode_request_body_edit_reaches_upstream() {
    let (hostname, upstream_rx) = spawn_stub_upstream("ok").await;
    let store: Arc<dyn DecisionStore> = Arc::new(MemoryStore::new());
    let cfg = test_engine_config(store.clone()).await;

    let (mut client_side, mut proxy_side) = tokio::io::duplex(8192);
    let exchange = tokio::spawn(async move {
        run_exchange(&mut proxy_side, &hostname, "http", &cfg, None).await
    });

    let body = b"original=1";
    let request = format!(
        "POST /submit HTTP/1.1\r\nHost: example.test\r\nContent-Length: {}\r\n\r\noriginal=1",
        body.len()
    );
    client_side.write_all(request.as_bytes()).await.unwrap();

    let id = wait_for_pending_request(&store).await;
    store
        .update_request_data(
            &id,
            RecordEdit {
                headers: None,
                body: Some(hex::encode(b"edited=2")),
            },
        )
        .await
        .unwrap();
    store.update_request_status(&id, Status::Allowed).await.unwrap();

    wait_for_pending_response(&store, &id).await;
    store.update_response_status(&id, Status::Allowed).await.unwrap();

    let result = exchange.await.unwrap();
    assert!(result.is_ok());

    let upstream_bytes = upstream_rx.await.unwrap();
    let upstream_text = String::from_utf8_lossy(&upstream_bytes);
    assert!(upstream_text.ends_with("edited=2"), "upstream saw: {upstream_text}");

    let response = read_all_available(&mut client_side).await;
    assert!(response.starts_with("HTTP/1.1 200"), "response was: {response}");
}
