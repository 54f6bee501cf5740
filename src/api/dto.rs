//! Request/response bodies for the control-plane REST surface (C9).

use serde::{Deserialize, Serialize};

use crate::store::{RequestRecord, RequestSummary, ResponseRecord};

#[derive(Debug, Deserialize, Default)]
pub struct EditBody {
    pub headers: Option<Vec<(String, String)>>,
    pub body: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RequestsListResponse {
    pub requests: Vec<RequestSummary>,
}

#[derive(Debug, Serialize)]
pub struct RequestDetailResponse {
    #[serde(flatten)]
    pub record: RequestRecord,
}

#[derive(Debug, Serialize)]
pub struct ResponseDetailResponse {
    #[serde(flatten)]
    pub record: ResponseRecord,
}

#[derive(Debug, Deserialize)]
pub struct ModeBody {
    pub mode: String,
}

#[derive(Debug, Serialize)]
pub struct ModeResponse {
    pub mode: String,
}

#[derive(Debug, Deserialize)]
pub struct DomainBody {
    pub domain: String,
}

#[derive(Debug, Serialize)]
pub struct DomainsResponse {
    pub domains: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct KeywordBody {
    pub keyword: String,
}

#[derive(Debug, Serialize)]
pub struct KeywordsResponse {
    pub keywords: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_pending: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}
