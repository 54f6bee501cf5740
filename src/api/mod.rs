//! Control-plane REST surface (C9): the operator-facing API used to
//! list pending requests/responses, post allow/block decisions, and
//! edit policy config. One `axum::Router` over the shared decision
//! store, grounded in this ecosystem's own `axum`-based webhook
//! adapters (e.g. the agentgateway pillar guardrail adapter) for the
//! `Router`/`State`/`Json` extractor idiom.

pub mod dto;

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};

use crate::store::{DecisionStore, ProxyMode, RecordEdit, Status};
use dto::*;

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn DecisionStore>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/requests", get(list_requests))
        .route("/api/requests/{id}", get(get_request).delete(delete_request))
        .route("/api/requests/{id}/allow", post(allow_request))
        .route("/api/requests/{id}/block", post(block_request))
        .route("/api/responses/{id}", get(get_response))
        .route("/api/responses/{id}/allow", post(allow_response))
        .route("/api/responses/{id}/block", post(block_response))
        .route("/api/config/mode", get(get_mode).post(set_mode))
        .route("/api/config/domains", get(list_domains).post(add_domain))
        .route("/api/config/domains/{domain}", delete(remove_domain))
        .route("/api/config/keywords", get(list_keywords).post(add_keyword))
        .route("/api/config/keywords/{keyword}", delete(remove_keyword))
        .route("/api/health", get(health))
        .route("/api/stats", get(stats))
        .with_state(state)
}

fn store_err(e: crate::error::StoreError) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody { error: e.to_string() }),
    )
        .into_response()
}

async fn list_requests(State(state): State<ApiState>) -> Response {
    match state.store.list_pending_requests().await {
        Ok(requests) => Json(RequestsListResponse { requests }).into_response(),
        Err(e) => store_err(e),
    }
}

async fn get_request(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.store.get_request(&id).await {
        Ok(Some(record)) => Json(RequestDetailResponse { record }).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => store_err(e),
    }
}

async fn delete_request(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.store.delete_request(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => store_err(e),
    }
}

async fn allow_request(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    body: Option<Json<EditBody>>,
) -> Response {
    let edit = body.map(|Json(b)| RecordEdit {
        headers: b.headers,
        body: b.body.map(|body| hex::encode(body.as_bytes())),
    });
    if let Some(edit) = edit {
        if let Err(e) = state.store.update_request_data(&id, edit).await {
            return store_err(e);
        }
    }
    match state.store.update_request_status(&id, Status::Allowed).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => store_err(e),
    }
}

async fn block_request(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    if let Err(e) = state.store.update_request_status(&id, Status::Blocked).await {
        return store_err(e);
    }
    match state.store.delete_request(&id).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => store_err(e),
    }
}

async fn get_response(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.store.get_response(&id).await {
        Ok(Some(record)) => Json(ResponseDetailResponse { record }).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => store_err(e),
    }
}

async fn allow_response(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    body: Option<Json<EditBody>>,
) -> Response {
    let edit = body.map(|Json(b)| RecordEdit {
        headers: b.headers,
        body: b.body.map(|body| hex::encode(body.as_bytes())),
    });
    if let Some(edit) = edit {
        if let Err(e) = state.store.update_response_data(&id, edit).await {
            return store_err(e);
        }
    }
    match state.store.update_response_status(&id, Status::Allowed).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => store_err(e),
    }
}

async fn block_response(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.store.update_response_status(&id, Status::Blocked).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => store_err(e),
    }
}

async fn get_mode(State(state): State<ApiState>) -> Response {
    match state.store.get_mode().await {
        Ok(mode) => Json(ModeResponse {
            mode: mode.as_str().to_string(),
        })
        .into_response(),
        Err(e) => store_err(e),
    }
}

async fn set_mode(State(state): State<ApiState>, Json(body): Json<ModeBody>) -> Response {
    let Some(mode) = ProxyMode::parse(&body.mode) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: format!("invalid mode: {}", body.mode),
            }),
        )
            .into_response();
    };
    match state.store.set_mode(mode).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => store_err(e),
    }
}

async fn list_domains(State(state): State<ApiState>) -> Response {
    match state.store.blocked_domains().await {
        Ok(domains) => Json(DomainsResponse { domains }).into_response(),
        Err(e) => store_err(e),
    }
}

async fn add_domain(State(state): State<ApiState>, Json(body): Json<DomainBody>) -> Response {
    match state.store.add_blocked_domain(&body.domain).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => store_err(e),
    }
}

async fn remove_domain(State(state): State<ApiState>, Path(domain): Path<String>) -> Response {
    match state.store.remove_blocked_domain(&domain).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => store_err(e),
    }
}

async fn list_keywords(State(state): State<ApiState>) -> Response {
    match state.store.blocked_keywords().await {
        Ok(keywords) => Json(KeywordsResponse { keywords }).into_response(),
        Err(e) => store_err(e),
    }
}

async fn add_keyword(State(state): State<ApiState>, Json(body): Json<KeywordBody>) -> Response {
    match state.store.add_blocked_keyword(&body.keyword).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => store_err(e),
    }
}

async fn remove_keyword(State(state): State<ApiState>, Path(keyword): Path<String>) -> Response {
    match state.store.remove_blocked_keyword(&keyword).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => store_err(e),
    }
}

async fn health(State(state): State<ApiState>) -> Response {
    let health = state.store.health().await;
    let code = if health.status == "connected" {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (code, Json(health)).into_response()
}

async fn stats(State(state): State<ApiState>) -> Response {
    match state.store.list_pending_requests().await {
        Ok(requests) => Json(StatsResponse {
            total_pending: requests.len(),
        })
        .into_response(),
        Err(e) => store_err(e),
    }
}
