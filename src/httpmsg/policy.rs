//! Policy engine (C5).
//!
//! Classifies a request given the current mode and blocklists, and
//! separately scans a response body for blocked keywords in filter
//! mode. Grounded in `examples/original_source/proxy_api.py`'s
//! `blocked_domains`/`blocked_keywords` set semantics, reworked into an
//! explicit decision enum instead of the original's scattered
//! early-return booleans.

use super::parser::header_value;
use crate::store::ProxyMode;

/// The outcome of classifying a request (or, for `Deny`, a response).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Mode is `intercept`: the worker must suspend for an explicit
    /// control-plane decision.
    Intercept,
    /// Mode is `filter` and no rule fired: forward automatically.
    Forward,
    /// A filter-mode rule fired; `reason` names it for the 403 page.
    Deny(DenyReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    Domain(String),
    Keyword(String),
}

/// Classify a request under filter/intercept mode (spec.md §4.5 steps 1-2).
/// `blocked_domains` holds exact hostnames.
pub fn classify_request(mode: ProxyMode, hostname: &str, blocked_domains: &[String]) -> Decision {
    match mode {
        ProxyMode::Intercept => Decision::Intercept,
        ProxyMode::Filter => {
            if blocked_domains.iter().any(|d| d == hostname) {
                Decision::Deny(DenyReason::Domain(hostname.to_string()))
            } else {
                Decision::Forward
            }
        }
    }
}

/// Scan a decoded response body for a blocked keyword (spec.md §4.5
/// step 2, S8a). Returns the first keyword found, if any.
pub fn scan_response_body<'a>(body: &str, blocked_keywords: &'a [String]) -> Option<&'a str> {
    blocked_keywords.iter().find(|kw| body.contains(kw.as_str())).map(|s| s.as_str())
}

/// Build the canned `403 Forbidden` HTML body naming the rule that
/// fired (spec.md §4.5).
pub fn denial_page(reason: &DenyReason) -> String {
    let (rule, detail) = match reason {
        DenyReason::Domain(host) => ("blocked domain", host.as_str()),
        DenyReason::Keyword(kw) => ("blocked keyword", kw),
    };
    format!(
        "<html><head><title>403 Forbidden</title></head>\
         <body><h1>403 Forbidden</h1><p>Blocked by proxy: {rule} &quot;{detail}&quot;.</p></body></html>"
    )
}

/// `true` iff any header named `Accept-Encoding` (case-insensitive) is
/// present. Used by callers deciding whether stripping is a no-op.
pub fn has_accept_encoding(headers: &[(String, String)]) -> bool {
    header_value(headers, "accept-encoding").is_some()
}

/// Remove every `Accept-Encoding` header (case-insensitive), per
/// spec.md §4.6 S5b "allowed" transition: the proxy cannot decode
/// every upstream encoding (e.g. brotli), so it refuses to offer them.
pub fn strip_accept_encoding(headers: &mut Vec<(String, String)>) {
    headers.retain(|(name, _)| !name.eq_ignore_ascii_case("accept-encoding"));
}
