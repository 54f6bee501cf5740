//! HTTP message head parser (C4).
//!
//! Deliberately lenient: a malformed first line fills in defaults
//! rather than failing, per spec.md §4.4 and §9's "parser leniency"
//! guidance. This mirrors `examples/original_source/proxyserver.py`'s
//! own `str.split()`-based parsing, which never raises on a short or
//! empty line.

/// A parsed request (or CONNECT) head: first line plus headers. Body
/// bytes are handled separately by the caller (this only splits the
/// head off of a raw buffer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
    pub version: String,
    /// Insertion order preserved; duplicate names keep the last write,
    /// per spec.md §4.4.
    pub headers: Vec<(String, String)>,
}

const DEFAULT_METHOD: &str = "UNKNOWN";
const DEFAULT_PATH: &str = "/";
const DEFAULT_VERSION: &str = "HTTP/1.1";

/// Split `buf` into head bytes and body bytes at the first `\r\n\r\n`
/// (falling back to `\n\n` for clients that send bare LFs). If no
/// separator is found, the whole buffer is treated as head with an
/// empty body.
pub fn split_head_body(buf: &[u8]) -> (&[u8], &[u8]) {
    if let Some(pos) = find_subslice(buf, b"\r\n\r\n") {
        return (&buf[..pos], &buf[pos + 4..]);
    }
    if let Some(pos) = find_subslice(buf, b"\n\n") {
        return (&buf[..pos], &buf[pos + 2..]);
    }
    (buf, &[])
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Parse a head (first line + headers) decoded as UTF-8 with
/// replacement, per spec.md §4.6 S3.
pub fn parse_head(head: &str) -> RequestHead {
    let mut lines = head.split("\r\n").flat_map(|l| l.split('\n'));
    let first_line = lines.next().unwrap_or("");
    let (method, path, version) = parse_first_line(first_line);

    let mut headers: Vec<(String, String)> = Vec::new();
    for line in lines {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim().to_string();
        let value = value.trim().to_string();
        if let Some(existing) = headers.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(&name)) {
            existing.1 = value;
        } else {
            headers.push((name, value));
        }
    }

    RequestHead {
        method,
        path,
        version,
        headers,
    }
}

fn parse_first_line(line: &str) -> (String, String, String) {
    let mut parts = line.split_whitespace();
    let method = parts.next().unwrap_or(DEFAULT_METHOD).to_string();
    let path = parts.next().unwrap_or(DEFAULT_PATH).to_string();
    let version = parts.next().unwrap_or(DEFAULT_VERSION).to_string();
    (method, path, version)
}

/// `true` iff `first_line`'s method token is `CONNECT`.
pub fn is_connect(first_line: &str) -> bool {
    first_line
        .split_whitespace()
        .next()
        .is_some_and(|m| m.eq_ignore_ascii_case("CONNECT"))
}

/// Extract the hostname from a CONNECT line's `host:port` target,
/// dropping the port. Returns `None` if there is no second token.
/// A target with no `:port` still yields a hostname (spec.md §8).
pub fn extract_hostname(first_line: &str) -> Option<String> {
    let target = first_line.split_whitespace().nth(1)?;
    match target.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) && !port.is_empty() => {
            Some(host.to_string())
        }
        _ => Some(target.to_string()),
    }
}

/// Look up a header by case-insensitive name, returning the first
/// match (headers are already last-write-wins by the time they reach
/// here).
pub fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Extract a hostname from an absolute-form request URI
/// (`http://host[:port]/path`), used by the plain-HTTP handler when no
/// `Host` header is present (spec.md §4.7).
pub fn hostname_from_absolute_uri(uri: &str) -> Option<String> {
    let without_scheme = uri.split_once("://").map(|(_, rest)| rest).unwrap_or(uri);
    let authority = without_scheme.split(['/', '?', '#']).next()?;
    if authority.is_empty() {
        return None;
    }
    match authority.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) && !port.is_empty() => {
            Some(host.to_string())
        }
        _ => Some(authority.to_string()),
    }
}
