//! Redis-backed [`DecisionStore`] (C3's reference backend).
//!
//! Mirrors the key shape of `examples/original_source/redis_storage.py`
//! exactly: `request:<id>` and `response:<id>` hashes, a
//! `pending_requests` list (newest-first via `LPUSH`), and
//! `proxy_config:*` keys for policy. Headers are JSON-encoded into a
//! single hash field the way the Python original does, since a Redis
//! hash field is a flat string and headers are an ordered list of
//! pairs (to preserve duplicates/casing per spec.md §3).

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{
    DecisionStore, ProxyMode, RecordEdit, RequestRecord, RequestSummary, ResponseRecord, Status,
    StoreHealth, RECORD_TTL_SECS,
};
use crate::error::StoreError;

const PENDING_LIST_KEY: &str = "pending_requests";
const MODE_KEY: &str = "proxy_config:mode";
const DOMAINS_KEY: &str = "proxy_config:blocked_domains";
const KEYWORDS_KEY: &str = "proxy_config:blocked_keywords";

pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client =
            redis::Client::open(redis_url).map_err(|e| StoreError::Unreachable(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        Ok(Self { conn })
    }

    fn request_key(id: &str) -> String {
        format!("request:{id}")
    }

    fn response_key(id: &str) -> String {
        format!("response:{id}")
    }

    fn op(e: redis::RedisError) -> StoreError {
        StoreError::Operation(e.to_string())
    }
}

#[async_trait]
impl DecisionStore for RedisStore {
    async fn save_request(&self, record: RequestRecord) -> Result<(), StoreError> {
        let key = Self::request_key(&record.id);
        let headers_json = serde_json::to_string(&record.headers).map_err(|e| StoreError::Operation(e.to_string()))?;
        let mut conn = self.conn.clone();
        let fields: Vec<(&str, String)> = vec![
            ("id", record.id.clone()),
            ("hostname", record.hostname),
            ("method", record.method),
            ("path", record.path),
            ("version", record.version),
            ("headers", headers_json),
            ("body", record.body),
            ("timestamp", record.timestamp),
            ("status", Status::Pending.as_str().to_string()),
        ];
        let _: () = conn.hset_multiple(&key, &fields).await.map_err(Self::op)?;
        let _: () = conn.lpush(PENDING_LIST_KEY, &record.id).await.map_err(Self::op)?;
        let _: () = conn.expire(&key, RECORD_TTL_SECS as i64).await.map_err(Self::op)?;
        Ok(())
    }

    async fn get_request(&self, id: &str) -> Result<Option<RequestRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let map: std::collections::HashMap<String, String> =
            conn.hgetall(Self::request_key(id)).await.map_err(Self::op)?;
        if map.is_empty() {
            return Ok(None);
        }
        let headers = map
            .get("headers")
            .and_then(|h| serde_json::from_str(h).ok())
            .unwrap_or_default();
        let status = map
            .get("status")
            .and_then(|s| Status::parse(s))
            .unwrap_or(Status::Pending);
        Ok(Some(RequestRecord {
            id: map.get("id").cloned().unwrap_or_else(|| id.to_string()),
            hostname: map.get("hostname").cloned().unwrap_or_default(),
            method: map.get("method").cloned().unwrap_or_default(),
            path: map.get("path").cloned().unwrap_or_default(),
            version: map.get("version").cloned().unwrap_or_default(),
            headers,
            body: map.get("body").cloned().unwrap_or_default(),
            timestamp: map.get("timestamp").cloned().unwrap_or_default(),
            status,
        }))
    }

    async fn update_request_status(&self, id: &str, status: Status) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let key = Self::request_key(id);
        let _: () = conn.hset(&key, "status", status.as_str()).await.map_err(Self::op)?;
        let _: () = conn.expire(&key, RECORD_TTL_SECS as i64).await.map_err(Self::op)?;
        Ok(())
    }

    async fn get_request_status(&self, id: &str) -> Result<Status, StoreError> {
        let mut conn = self.conn.clone();
        let status: Option<String> = conn.hget(Self::request_key(id), "status").await.map_err(Self::op)?;
        Ok(status.and_then(|s| Status::parse(&s)).unwrap_or(Status::Pending))
    }

    async fn update_request_data(&self, id: &str, edit: RecordEdit) -> Result<(), StoreError> {
        apply_edit(&self.conn, &Self::request_key(id), edit).await
    }

    async fn delete_request(&self, id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(Self::request_key(id)).await.map_err(Self::op)?;
        let _: () = conn.lrem(PENDING_LIST_KEY, 0, id).await.map_err(Self::op)?;
        Ok(())
    }

    async fn list_pending_requests(&self) -> Result<Vec<RequestSummary>, StoreError> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.lrange(PENDING_LIST_KEY, 0, -1).await.map_err(Self::op)?;
        let mut summaries = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.get_request(&id).await? {
                summaries.push(RequestSummary {
                    id: record.id,
                    hostname: record.hostname,
                    method: record.method,
                    path: record.path,
                    timestamp: record.timestamp,
                });
            }
        }
        Ok(summaries)
    }

    async fn save_response(&self, id: &str, record: ResponseRecord) -> Result<(), StoreError> {
        let key = Self::response_key(id);
        let headers_json = serde_json::to_string(&record.headers).map_err(|e| StoreError::Operation(e.to_string()))?;
        let mut conn = self.conn.clone();
        let fields = [
            ("status_code", record.status_code.to_string()),
            ("headers", headers_json),
            ("body", record.body),
            ("status", Status::Pending.as_str().to_string()),
        ];
        let _: () = conn.hset_multiple(&key, &fields).await.map_err(Self::op)?;
        let _: () = conn.expire(&key, RECORD_TTL_SECS as i64).await.map_err(Self::op)?;
        Ok(())
    }

    async fn get_response(&self, id: &str) -> Result<Option<ResponseRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let map: std::collections::HashMap<String, String> =
            conn.hgetall(Self::response_key(id)).await.map_err(Self::op)?;
        if map.is_empty() {
            return Ok(None);
        }
        let headers = map
            .get("headers")
            .and_then(|h| serde_json::from_str(h).ok())
            .unwrap_or_default();
        let status = map.get("status").and_then(|s| Status::parse(s)).unwrap_or(Status::Pending);
        let status_code = map.get("status_code").and_then(|s| s.parse().ok()).unwrap_or(502);
        Ok(Some(ResponseRecord {
            status_code,
            headers,
            body: map.get("body").cloned().unwrap_or_default(),
            status,
        }))
    }

    async fn update_response_status(&self, id: &str, status: Status) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let key = Self::response_key(id);
        let _: () = conn.hset(&key, "status", status.as_str()).await.map_err(Self::op)?;
        Ok(())
    }

    async fn get_response_status(&self, id: &str) -> Result<Status, StoreError> {
        let mut conn = self.conn.clone();
        let status: Option<String> = conn.hget(Self::response_key(id), "status").await.map_err(Self::op)?;
        Ok(status.and_then(|s| Status::parse(&s)).unwrap_or(Status::Pending))
    }

    async fn update_response_data(&self, id: &str, edit: RecordEdit) -> Result<(), StoreError> {
        apply_edit(&self.conn, &Self::response_key(id), edit).await
    }

    async fn get_mode(&self) -> Result<ProxyMode, StoreError> {
        let mut conn = self.conn.clone();
        let mode: Option<String> = conn.get(MODE_KEY).await.map_err(Self::op)?;
        Ok(mode.and_then(|m| ProxyMode::parse(&m)).unwrap_or(ProxyMode::Intercept))
    }

    async fn set_mode(&self, mode: ProxyMode) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(MODE_KEY, mode.as_str()).await.map_err(Self::op)?;
        Ok(())
    }

    async fn blocked_domains(&self) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.smembers(DOMAINS_KEY).await.map_err(Self::op)
    }

    async fn add_blocked_domain(&self, domain: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.sadd(DOMAINS_KEY, domain).await.map_err(Self::op)?;
        Ok(())
    }

    async fn remove_blocked_domain(&self, domain: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.srem(DOMAINS_KEY, domain).await.map_err(Self::op)?;
        Ok(())
    }

    async fn blocked_keywords(&self) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.smembers(KEYWORDS_KEY).await.map_err(Self::op)
    }

    async fn add_blocked_keyword(&self, keyword: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.sadd(KEYWORDS_KEY, keyword).await.map_err(Self::op)?;
        Ok(())
    }

    async fn remove_blocked_keyword(&self, keyword: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.srem(KEYWORDS_KEY, keyword).await.map_err(Self::op)?;
        Ok(())
    }

    async fn flush_all(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        redis::cmd("FLUSHDB")
            .query_async::<()>(&mut conn)
            .await
            .map_err(Self::op)
    }

    async fn health(&self) -> StoreHealth {
        let mut conn = self.conn.clone();
        match redis::cmd("PING").query_async::<String>(&mut conn).await {
            Ok(_) => StoreHealth {
                status: "connected".to_string(),
                detail: None,
            },
            Err(e) => StoreHealth {
                status: "disconnected".to_string(),
                detail: Some(e.to_string()),
            },
        }
    }
}

async fn apply_edit(conn: &ConnectionManager, key: &str, edit: RecordEdit) -> Result<(), StoreError> {
    let mut conn = conn.clone();
    let mut fields = Vec::new();
    if let Some(headers) = edit.headers {
        let json = serde_json::to_string(&headers).map_err(|e| StoreError::Operation(e.to_string()))?;
        fields.push(("headers".to_string(), json));
    }
    if let Some(body) = edit.body {
        fields.push(("body".to_string(), body));
    }
    if !fields.is_empty() {
        let _: () = conn
            .hset_multiple(key, &fields)
            .await
            .map_err(|e: redis::RedisError| StoreError::Operation(e.to_string()))?;
    }
    Ok(())
}
