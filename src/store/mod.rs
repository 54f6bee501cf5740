//! Decision store (C3).
//!
//! The shared substrate through which a proxy worker and the control
//! plane exchange pending request/response records and their status.
//! [`DecisionStore`] is the trait every backend implements; callers
//! hold it behind an `Arc<dyn DecisionStore>` so the proxy engine is
//! agnostic to whether records live in Redis or in process memory.
//!
//! Modeled on the `CacheBackend` trait split seen in this ecosystem's
//! own cache-backed services (a small async trait, one concrete impl
//! per backend, a memory impl used for tests), and on the key shape of
//! `examples/original_source/redis_storage.py`.

pub mod memory_store;
pub mod redis_store;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Where a request or response record currently sits in its
/// `pending -> {allowed, blocked}` DAG. `modified` is intentionally
/// absent: per spec.md §9's open-question resolution it collapses into
/// `allowed` carrying optional edits rather than remaining a distinct
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Allowed,
    Blocked,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Allowed => "allowed",
            Status::Blocked => "blocked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Status::Pending),
            "allowed" => Some(Status::Allowed),
            "blocked" => Some(Status::Blocked),
            _ => None,
        }
    }
}

/// A summary of a pending request, as surfaced by `GET /api/requests`.
#[derive(Debug, Clone, Serialize)]
pub struct RequestSummary {
    pub id: String,
    pub hostname: String,
    pub method: String,
    pub path: String,
    pub timestamp: String,
}

/// The full request record stored under `request:<id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: String,
    pub hostname: String,
    pub method: String,
    pub path: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
    /// hex-encoded, per `examples/original_source/redis_storage.py`'s
    /// binary-safe convention.
    pub body: String,
    pub timestamp: String,
    pub status: Status,
}

/// The full response record stored under `response:<id>`, keyed by the
/// originating request's id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub status: Status,
}

/// Partial update to a request's editable fields, used by
/// `update_request_data` (control-plane edits applied on allow).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordEdit {
    pub headers: Option<Vec<(String, String)>>,
    pub body: Option<String>,
}

/// Proxy operation mode (spec.md §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    Intercept,
    Filter,
}

impl ProxyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyMode::Intercept => "intercept",
            ProxyMode::Filter => "filter",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "intercept" => Some(ProxyMode::Intercept),
            "filter" => Some(ProxyMode::Filter),
            _ => None,
        }
    }
}

/// Health of the backing store, as surfaced by `GET /api/health`.
#[derive(Debug, Clone, Serialize)]
pub struct StoreHealth {
    pub status: String,
    pub detail: Option<String>,
}

/// The backing key-value substrate described in spec.md §4.3: atomic
/// hash set/get, list push/range/remove, set add/remove/members, and
/// per-key TTL. One request/response pair shares an id; the proxy
/// worker is the sole writer of the initial record and poller of
/// status, the control plane is the sole writer of terminal status.
#[async_trait]
pub trait DecisionStore: Send + Sync {
    async fn save_request(&self, record: RequestRecord) -> Result<(), StoreError>;
    async fn get_request(&self, id: &str) -> Result<Option<RequestRecord>, StoreError>;
    async fn update_request_status(&self, id: &str, status: Status) -> Result<(), StoreError>;
    async fn get_request_status(&self, id: &str) -> Result<Status, StoreError>;
    async fn update_request_data(&self, id: &str, edit: RecordEdit) -> Result<(), StoreError>;
    async fn delete_request(&self, id: &str) -> Result<(), StoreError>;
    async fn list_pending_requests(&self) -> Result<Vec<RequestSummary>, StoreError>;

    async fn save_response(&self, id: &str, record: ResponseRecord) -> Result<(), StoreError>;
    async fn get_response(&self, id: &str) -> Result<Option<ResponseRecord>, StoreError>;
    async fn update_response_status(&self, id: &str, status: Status) -> Result<(), StoreError>;
    async fn get_response_status(&self, id: &str) -> Result<Status, StoreError>;
    async fn update_response_data(&self, id: &str, edit: RecordEdit) -> Result<(), StoreError>;

    async fn get_mode(&self) -> Result<ProxyMode, StoreError>;
    async fn set_mode(&self, mode: ProxyMode) -> Result<(), StoreError>;
    async fn blocked_domains(&self) -> Result<Vec<String>, StoreError>;
    async fn add_blocked_domain(&self, domain: &str) -> Result<(), StoreError>;
    async fn remove_blocked_domain(&self, domain: &str) -> Result<(), StoreError>;
    async fn blocked_keywords(&self) -> Result<Vec<String>, StoreError>;
    async fn add_blocked_keyword(&self, keyword: &str) -> Result<(), StoreError>;
    async fn remove_blocked_keyword(&self, keyword: &str) -> Result<(), StoreError>;

    /// Wipe every record and policy setting. Called on graceful
    /// shutdown per spec.md §4.8.
    async fn flush_all(&self) -> Result<(), StoreError>;
    async fn health(&self) -> StoreHealth;
}

/// Record TTL, refreshed on every status write (spec.md §3).
pub const RECORD_TTL_SECS: u64 = 3600;
