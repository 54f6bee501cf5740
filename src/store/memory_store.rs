//! Process-local [`DecisionStore`] backend.
//!
//! Used when the proxy is started with `--memory-store` and by unit/
//! integration tests that want a decision store without a running
//! Redis instance. Same semantics as [`super::redis_store::RedisStore`]
//! minus persistence and TTL expiry (TTL is tracked but never swept -
//! good enough for a process that restarts clean on every run).

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{
    DecisionStore, ProxyMode, RecordEdit, RequestRecord, RequestSummary, ResponseRecord, Status,
    StoreHealth,
};
use crate::error::StoreError;

struct PolicyConfig {
    mode: ProxyMode,
    blocked_domains: HashSet<String>,
    blocked_keywords: HashSet<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            mode: ProxyMode::Intercept,
            blocked_domains: HashSet::new(),
            blocked_keywords: HashSet::new(),
        }
    }
}

pub struct MemoryStore {
    requests: DashMap<String, RequestRecord>,
    /// newest-first, mirrors `pending_requests` (a Redis list via `lpush`).
    pending_order: Mutex<Vec<String>>,
    responses: DashMap<String, ResponseRecord>,
    policy: Mutex<PolicyConfig>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            requests: DashMap::new(),
            pending_order: Mutex::new(Vec::new()),
            responses: DashMap::new(),
            policy: Mutex::new(PolicyConfig::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DecisionStore for MemoryStore {
    async fn save_request(&self, record: RequestRecord) -> Result<(), StoreError> {
        self.pending_order.lock().unwrap().insert(0, record.id.clone());
        self.requests.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get_request(&self, id: &str) -> Result<Option<RequestRecord>, StoreError> {
        Ok(self.requests.get(id).map(|r| r.clone()))
    }

    async fn update_request_status(&self, id: &str, status: Status) -> Result<(), StoreError> {
        let mut entry = self
            .requests
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        entry.status = status;
        Ok(())
    }

    async fn get_request_status(&self, id: &str) -> Result<Status, StoreError> {
        Ok(self
            .requests
            .get(id)
            .map(|r| r.status)
            .unwrap_or(Status::Pending))
    }

    async fn update_request_data(&self, id: &str, edit: RecordEdit) -> Result<(), StoreError> {
        let mut entry = self
            .requests
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if let Some(headers) = edit.headers {
            entry.headers = headers;
        }
        if let Some(body) = edit.body {
            entry.body = body;
        }
        Ok(())
    }

    async fn delete_request(&self, id: &str) -> Result<(), StoreError> {
        self.requests.remove(id);
        self.pending_order.lock().unwrap().retain(|x| x != id);
        Ok(())
    }

    async fn list_pending_requests(&self) -> Result<Vec<RequestSummary>, StoreError> {
        let order = self.pending_order.lock().unwrap().clone();
        Ok(order
            .into_iter()
            .filter_map(|id| {
                self.requests.get(&id).map(|r| RequestSummary {
                    id: r.id.clone(),
                    hostname: r.hostname.clone(),
                    method: r.method.clone(),
                    path: r.path.clone(),
                    timestamp: r.timestamp.clone(),
                })
            })
            .collect())
    }

    async fn save_response(&self, id: &str, record: ResponseRecord) -> Result<(), StoreError> {
        self.responses.insert(id.to_string(), record);
        Ok(())
    }

    async fn get_response(&self, id: &str) -> Result<Option<ResponseRecord>, StoreError> {
        Ok(self.responses.get(id).map(|r| r.clone()))
    }

    async fn update_response_status(&self, id: &str, status: Status) -> Result<(), StoreError> {
        let mut entry = self
            .responses
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        entry.status = status;
        Ok(())
    }

    async fn get_response_status(&self, id: &str) -> Result<Status, StoreError> {
        Ok(self
            .responses
            .get(id)
            .map(|r| r.status)
            .unwrap_or(Status::Pending))
    }

    async fn update_response_data(&self, id: &str, edit: RecordEdit) -> Result<(), StoreError> {
        let mut entry = self
            .responses
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if let Some(headers) = edit.headers {
            entry.headers = headers;
        }
        if let Some(body) = edit.body {
            entry.body = body;
        }
        Ok(())
    }

    async fn get_mode(&self) -> Result<ProxyMode, StoreError> {
        Ok(self.policy.lock().unwrap().mode)
    }

    async fn set_mode(&self, mode: ProxyMode) -> Result<(), StoreError> {
        self.policy.lock().unwrap().mode = mode;
        Ok(())
    }

    async fn blocked_domains(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.policy.lock().unwrap().blocked_domains.iter().cloned().collect())
    }

    async fn add_blocked_domain(&self, domain: &str) -> Result<(), StoreError> {
        self.policy.lock().unwrap().blocked_domains.insert(domain.to_string());
        Ok(())
    }

    async fn remove_blocked_domain(&self, domain: &str) -> Result<(), StoreError> {
        self.policy.lock().unwrap().blocked_domains.remove(domain);
        Ok(())
    }

    async fn blocked_keywords(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.policy.lock().unwrap().blocked_keywords.iter().cloned().collect())
    }

    async fn add_blocked_keyword(&self, keyword: &str) -> Result<(), StoreError> {
        self.policy.lock().unwrap().blocked_keywords.insert(keyword.to_string());
        Ok(())
    }

    async fn remove_blocked_keyword(&self, keyword: &str) -> Result<(), StoreError> {
        self.policy.lock().unwrap().blocked_keywords.remove(keyword);
        Ok(())
    }

    async fn flush_all(&self) -> Result<(), StoreError> {
        self.requests.clear();
        self.pending_order.lock().unwrap().clear();
        self.responses.clear();
        *self.policy.lock().unwrap() = PolicyConfig::default();
        Ok(())
    }

    async fn health(&self) -> StoreHealth {
        StoreHealth {
            status: "connected".to_string(),
            detail: Some("in-memory store".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request(id: &str) -> RequestRecord {
        RequestRecord {
            id: id.to_string(),
            hostname: "example.test".to_string(),
            method: "GET".to_string(),
            path: "/hello".to_string(),
            version: "HTTP/1.1".to_string(),
            headers: vec![("Host".to_string(), "example.test".to_string())],
            body: String::new(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            status: Status::Pending,
        }
    }

    #[tokio::test]
    async fn save_then_list_is_newest_first() {
        let store = MemoryStore::new();
        store.save_request(sample_request("a")).await.unwrap();
        store.save_request(sample_request("b")).await.unwrap();
        let pending = store.list_pending_requests().await.unwrap();
        assert_eq!(pending[0].id, "b");
        assert_eq!(pending[1].id, "a");
    }

    #[tokio::test]
    async fn status_round_trips() {
        let store = MemoryStore::new();
        store.save_request(sample_request("a")).await.unwrap();
        assert_eq!(store.get_request_status("a").await.unwrap(), Status::Pending);
        store.update_request_status("a", Status::Allowed).await.unwrap();
        assert_eq!(store.get_request_status("a").await.unwrap(), Status::Allowed);
    }

    #[tokio::test]
    async fn delete_removes_from_pending_list() {
        let store = MemoryStore::new();
        store.save_request(sample_request("a")).await.unwrap();
        store.delete_request("a").await.unwrap();
        assert!(store.list_pending_requests().await.unwrap().is_empty());
        assert!(store.get_request("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_request_data_is_partial() {
        let store = MemoryStore::new();
        store.save_request(sample_request("a")).await.unwrap();
        store
            .update_request_data(
                "a",
                RecordEdit {
                    headers: None,
                    body: Some("replaced".to_string()),
                },
            )
            .await
            .unwrap();
        let record = store.get_request("a").await.unwrap().unwrap();
        assert_eq!(record.body, "replaced");
        assert_eq!(record.headers.len(), 1);
    }

    #[tokio::test]
    async fn set_mode_then_get_mode_round_trips() {
        let store = MemoryStore::new();
        assert_eq!(store.get_mode().await.unwrap(), ProxyMode::Intercept);
        store.set_mode(ProxyMode::Filter).await.unwrap();
        assert_eq!(store.get_mode().await.unwrap(), ProxyMode::Filter);
    }

    #[tokio::test]
    async fn blocked_domains_add_and_remove() {
        let store = MemoryStore::new();
        store.add_blocked_domain("ads.test").await.unwrap();
        assert_eq!(store.blocked_domains().await.unwrap(), vec!["ads.test".to_string()]);
        store.remove_blocked_domain("ads.test").await.unwrap();
        assert!(store.blocked_domains().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn flush_all_clears_everything() {
        let store = MemoryStore::new();
        store.save_request(sample_request("a")).await.unwrap();
        store.set_mode(ProxyMode::Filter).await.unwrap();
        store.add_blocked_domain("ads.test").await.unwrap();
        store.flush_all().await.unwrap();
        assert!(store.list_pending_requests().await.unwrap().is_empty());
        assert_eq!(store.get_mode().await.unwrap(), ProxyMode::Intercept);
        assert!(store.blocked_domains().await.unwrap().is_empty());
    }
}
