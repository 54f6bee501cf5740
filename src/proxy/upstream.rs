//! Shared upstream request/response logic used by both the tunnel
//! (C6) and plain-HTTP (C7) handlers.
//!
//! One `reqwest::Client` is built once and shared across every
//! connection: no redirects, no upstream certificate verification (a
//! MITM proxy terminates trust at the leaf it minted, not at whatever
//! the origin presents), and a per-request timeout.

use std::time::Duration;

use reqwest::redirect::Policy;

/// The response the upstream hop produced, ready to be stored or
/// written back to the client.
pub struct UpstreamResponse {
    pub status: u16,
    pub reason: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

pub fn build_client(timeout: Duration, verify_tls: bool) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(Policy::none())
        .danger_accept_invalid_certs(!verify_tls)
        .timeout(timeout)
        .build()
}

/// Issue `method path` to `https://hostname<path>` or `http://hostname<path>`,
/// with the given headers and body (spec.md §4.6 S6).
pub async fn forward(
    client: &reqwest::Client,
    scheme: &str,
    hostname: &str,
    method: &str,
    path: &str,
    headers: &[(String, String)],
    body: Vec<u8>,
    max_body_bytes: usize,
) -> anyhow::Result<UpstreamResponse> {
    let url = format!("{scheme}://{hostname}{path}");
    let http_method = reqwest::Method::from_bytes(method.as_bytes())
        .unwrap_or(reqwest::Method::GET);

    let mut builder = client.request(http_method, &url);
    for (name, value) in headers {
        builder = builder.header(name, value);
    }
    if !body.is_empty() {
        builder = builder.body(body);
    }

    let resp = builder.send().await?;
    let status = resp.status().as_u16();
    let reason = resp.status().canonical_reason().map(|s| s.to_string());
    let headers = resp
        .headers()
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
        .collect();
    let body = resp.bytes().await?;
    if body.len() > max_body_bytes {
        anyhow::bail!(
            "upstream response body of {} bytes exceeds the {} byte limit",
            body.len(),
            max_body_bytes
        );
    }

    Ok(UpstreamResponse {
        status,
        reason,
        headers,
        body: body.to_vec(),
    })
}
