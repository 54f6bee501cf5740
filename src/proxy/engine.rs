//! The shared decision-loop engine driving states S3 through T of
//! spec.md §4.6, reused verbatim by both the tunnel handler (C6, over
//! a TLS stream) and the plain-HTTP handler (C7, over a raw TCP
//! stream). Only S0-S2 (CONNECT parsing, cert mint, TLS handshake)
//! differ between the two, and live in their own modules.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ConnectionError;
use crate::httpmsg::parser::{self, header_value};
use crate::httpmsg::policy::{self, Decision, DenyReason};
use crate::store::{DecisionStore, ProxyMode, RequestRecord, ResponseRecord, Status};

use super::upstream::{self, UpstreamResponse};

/// Everything the engine needs that is shared across every connection
/// (cloned cheaply: an `Arc<dyn DecisionStore>` and a `reqwest::Client`
/// both clone as handle copies).
#[derive(Clone)]
pub struct EngineConfig {
    pub store: Arc<dyn DecisionStore>,
    pub client: reqwest::Client,
    pub poll_interval: Duration,
    pub decision_timeout: Duration,
    pub read_buffer_size: usize,
    pub max_response_body_bytes: usize,
}

/// Read one request head (and whatever body bytes arrived with it) off
/// `stream`, drive the policy/decision loop, forward upstream, drive
/// the response-side loop, and write the final response. Used for both
/// the TLS-terminated (C6) and plain (C7) paths; `scheme` picks the
/// upstream URL scheme.
///
/// `initial` is bytes already read off the socket by the caller (C7's
/// sniffing read); `None` means nothing has been read yet (C6, which
/// reads fresh from the just-established TLS session).
pub async fn run_exchange<S>(
    stream: &mut S,
    hostname: &str,
    scheme: &str,
    cfg: &EngineConfig,
    initial: Option<Vec<u8>>,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let buf = match initial {
        Some(b) if !b.is_empty() => b,
        _ => read_once(stream, cfg.read_buffer_size).await?,
    };
    if buf.is_empty() {
        return Ok(());
    }

    let (head_bytes, body) = parser::split_head_body(&buf);
    let head_str = String::from_utf8_lossy(head_bytes);
    let head = parser::parse_head(&head_str);

    let mode = cfg.store.get_mode().await?;
    let blocked_domains = cfg.store.blocked_domains().await?;
    let decision = policy::classify_request(mode, hostname, &blocked_domains);

    // a response record shares its request's id (spec.md §4.3: "a
    // response:<id> hash exists only after its request:<id> hash; both
    // share the same id"), so mint it once up front even though it's
    // only persisted when a request record actually is.
    let id = Uuid::new_v4().to_string();

    let (headers, body) = match decision {
        Decision::Deny(reason) => {
            write_denial(stream, &reason).await?;
            return Ok(());
        }
        Decision::Forward => {
            let mut headers = head.headers.clone();
            policy::strip_accept_encoding(&mut headers);
            (headers, body.to_vec())
        }
        Decision::Intercept => {
            let record = RequestRecord {
                id: id.clone(),
                hostname: hostname.to_string(),
                method: head.method.clone(),
                path: head.path.clone(),
                version: head.version.clone(),
                headers: head.headers.clone(),
                body: hex::encode(body),
                timestamp: Utc::now().to_rfc3339(),
                status: Status::Pending,
            };
            cfg.store.save_request(record).await?;

            match await_status(cfg, PollTarget::Request(&id)).await? {
                Outcome::Blocked => {
                    write_fixed(stream, 403, "Forbidden", "Blocked by proxy").await?;
                    return Ok(());
                }
                Outcome::Timeout => {
                    write_fixed(stream, 408, "Request Timeout", "").await?;
                    return Ok(());
                }
                Outcome::Allowed => {
                    let record = cfg
                        .store
                        .get_request(&id)
                        .await?
                        .ok_or(ConnectionError::DecisionTimeout)?;
                    let mut headers = record.headers;
                    policy::strip_accept_encoding(&mut headers);
                    let body = hex::decode(&record.body).unwrap_or_default();
                    (headers, body)
                }
            }
        }
    };

    let upstream_resp = match upstream::forward(
        &cfg.client,
        scheme,
        hostname,
        &head.method,
        &head.path,
        &headers,
        body,
        cfg.max_response_body_bytes,
    )
    .await
    {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, hostname, "upstream request failed");
            write_fixed(stream, 502, "Bad Gateway", "Upstream connection failed").await?;
            return Ok(());
        }
    };

    let final_resp = match mode {
        ProxyMode::Filter => {
            let blocked_keywords = cfg.store.blocked_keywords().await?;
            let decoded = String::from_utf8_lossy(&upstream_resp.body);
            match policy::scan_response_body(&decoded, &blocked_keywords) {
                Some(kw) => {
                    write_denial(stream, &DenyReason::Keyword(kw.to_string())).await?;
                    return Ok(());
                }
                None => upstream_resp,
            }
        }
        ProxyMode::Intercept => {
            let record = ResponseRecord {
                status_code: upstream_resp.status,
                headers: upstream_resp.headers.clone(),
                body: hex::encode(&upstream_resp.body),
                status: Status::Pending,
            };
            cfg.store.save_response(&id, record).await?;

            match await_status(cfg, PollTarget::Response(&id)).await? {
                Outcome::Blocked => {
                    write_fixed(stream, 403, "Forbidden", "Blocked by proxy").await?;
                    return Ok(());
                }
                Outcome::Timeout => {
                    write_fixed(stream, 504, "Gateway Timeout", "").await?;
                    return Ok(());
                }
                Outcome::Allowed => {
                    let record = cfg
                        .store
                        .get_response(&id)
                        .await?
                        .ok_or(ConnectionError::DecisionTimeout)?;
                    UpstreamResponse {
                        status: record.status_code,
                        reason: None,
                        headers: record.headers,
                        body: hex::decode(&record.body).unwrap_or_default(),
                    }
                }
            }
        }
    };

    write_response(stream, &final_resp).await?;
    info!(hostname, status = final_resp.status, "exchange complete");
    Ok(())
}

async fn read_once<S: AsyncRead + Unpin>(stream: &mut S, cap: usize) -> Result<Vec<u8>, ConnectionError> {
    let mut buf = vec![0u8; cap];
    let n = stream.read(&mut buf).await?;
    buf.truncate(n);
    Ok(buf)
}

enum PollTarget<'a> {
    Request(&'a str),
    Response(&'a str),
}

enum Outcome {
    Allowed,
    Blocked,
    Timeout,
}

/// Poll the store every `poll_interval` until the status leaves
/// `pending` or `decision_timeout` elapses (spec.md §4.6 S5b_WAIT/S8b_WAIT).
async fn await_status(cfg: &EngineConfig, target: PollTarget<'_>) -> Result<Outcome, ConnectionError> {
    let deadline = Instant::now() + cfg.decision_timeout;
    loop {
        let status = match &target {
            PollTarget::Request(id) => cfg.store.get_request_status(id).await?,
            PollTarget::Response(id) => cfg.store.get_response_status(id).await?,
        };
        match status {
            Status::Allowed => return Ok(Outcome::Allowed),
            Status::Blocked => return Ok(Outcome::Blocked),
            Status::Pending => {}
        }
        if Instant::now() >= deadline {
            return Ok(Outcome::Timeout);
        }
        tokio::time::sleep(cfg.poll_interval).await;
    }
}

async fn write_denial<S: AsyncWrite + Unpin>(stream: &mut S, reason: &DenyReason) -> Result<(), ConnectionError> {
    let body = policy::denial_page(reason);
    let response = format!(
        "HTTP/1.1 403 Forbidden\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    Ok(())
}

async fn write_fixed<S: AsyncWrite + Unpin>(
    stream: &mut S,
    code: u16,
    reason: &str,
    body: &str,
) -> Result<(), ConnectionError> {
    let response = format!(
        "HTTP/1.1 {code} {reason}\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    Ok(())
}

/// Write the final response per spec.md §4.6 S9: status line with the
/// real reason phrase, every header except `Transfer-Encoding`/
/// `Content-Encoding`, `Content-Length` rewritten to the exact body
/// length, then the body.
async fn write_response<S: AsyncWrite + Unpin>(stream: &mut S, resp: &UpstreamResponse) -> Result<(), ConnectionError> {
    let reason = resp.reason.as_deref().unwrap_or("OK");
    let mut out = format!("HTTP/1.1 {} {}\r\n", resp.status, reason);
    for (name, value) in &resp.headers {
        if name.eq_ignore_ascii_case("transfer-encoding")
            || name.eq_ignore_ascii_case("content-encoding")
            || name.eq_ignore_ascii_case("content-length")
        {
            continue;
        }
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str(&format!("Content-Length: {}\r\n\r\n", resp.body.len()));

    stream.write_all(out.as_bytes()).await?;
    stream.write_all(&resp.body).await?;
    Ok(())
}

/// `true` iff `headers` already carries an explicit `Host`, used by
/// the plain-HTTP path to decide whether the absolute-URI fallback is
/// needed (spec.md §4.7).
pub fn host_header(headers: &[(String, String)]) -> Option<&str> {
    header_value(headers, "host")
}
