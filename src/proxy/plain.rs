//! Plain-HTTP handler (C7): same decision loop as the tunnel handler
//! minus TLS termination (spec.md §4.7). Hostname comes from the
//! `Host` header, falling back to the absolute-form request URI.

use tokio::net::TcpStream;

use crate::error::ConnectionError;
use crate::httpmsg::parser;

use super::engine::{self, EngineConfig};

/// `initial` is the bytes the dispatcher already read while sniffing
/// for CONNECT vs plain HTTP - they contain this connection's first
/// (and, per spec.md's single-read design, only) request, so they are
/// threaded straight into the engine instead of being re-read.
pub async fn handle(mut stream: TcpStream, initial: Vec<u8>, cfg: &EngineConfig) -> Result<(), ConnectionError> {
    let (head_bytes, _) = parser::split_head_body(&initial);
    let head_str = String::from_utf8_lossy(head_bytes);
    let head = parser::parse_head(&head_str);

    let hostname = engine::host_header(&head.headers)
        .map(|h| h.split(':').next().unwrap_or(h).to_string())
        .or_else(|| parser::hostname_from_absolute_uri(&head.path));

    let Some(hostname) = hostname else {
        // no Host header and no absolute-URI fallback: close cleanly
        // without crashing (spec.md §8 boundary behavior).
        return Ok(());
    };

    engine::run_exchange(&mut stream, &hostname, "http", cfg, Some(initial)).await
}
