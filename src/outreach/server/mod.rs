// SPDX-License-Identifier: MIT

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

use crate::adk::error::{EngineError, ErrorKind, OutreachError, StorageError};
use crate::outreach::crm::{Lead, LeadStore, Outbox, SentEmail};
use crate::outreach::research::normalize_identifier;
use crate::outreach::workflow::{Engine, FinalResult, WorkflowEvent};

const DEFAULT_LIMIT: u32 = 100;

/// Shared handles for the request handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub leads: Arc<dyn LeadStore>,
    pub outbox: Arc<dyn Outbox>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/research", post(research))
        .route("/api/research/stream", post(research_stream))
        .route("/api/leads", get(list_leads))
        .route("/api/leads/{id}", get(get_lead).delete(delete_lead))
        .route("/api/leads/{id}/emails", get(lead_emails))
        .route("/api/emails", get(list_emails))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(tracing::Level::INFO))
                .on_response(DefaultOnResponse::new().level(tracing::Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: AppState, port: u16) -> Result<(), OutreachError> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr).await?;
    serve_on(listener, state).await
}

/// Serve on an already bound listener
pub async fn serve_on(listener: TcpListener, state: AppState) -> Result<(), OutreachError> {
    log::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Error responses
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Storage(StorageError),
    Engine(EngineError),
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        AppError::Storage(e)
    }
}

impl From<EngineError> for AppError {
    fn from(e: EngineError) -> Self {
        AppError::Engine(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, json!({ "error": message }))
            }
            AppError::Storage(e) if e.is_not_found() => {
                (StatusCode::NOT_FOUND, json!({ "error": e.to_string() }))
            }
            AppError::Storage(e) => {
                log::error!("Storage error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": e.to_string(), "kind": ErrorKind::StorageFailure }),
                )
            }
            AppError::Engine(e) if e.kind == ErrorKind::InvalidInput => (
                StatusCode::BAD_REQUEST,
                json!({ "error": e.to_string(), "step": e.step, "kind": e.kind }),
            ),
            AppError::Engine(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": e.to_string(), "step": e.step, "kind": e.kind }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Deserialize)]
struct ResearchRequest {
    company_domain: String,
}

impl ResearchRequest {
    fn identifier(&self) -> Result<String, AppError> {
        normalize_identifier(&self.company_domain)
            .ok_or_else(|| AppError::BadRequest("company_domain must not be empty".to_string()))
    }
}

#[derive(Deserialize)]
struct Pagination {
    skip: Option<u32>,
    limit: Option<u32>,
}

impl Pagination {
    fn bounds(&self) -> (u32, u32) {
        (self.skip.unwrap_or(0), self.limit.unwrap_or(DEFAULT_LIMIT))
    }
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn research(
    State(state): State<AppState>,
    Json(payload): Json<ResearchRequest>,
) -> Result<Json<FinalResult>, AppError> {
    let identifier = payload.identifier()?;
    let result = state.engine.run(&identifier).await?;
    Ok(Json(result))
}

/// Aborts the run when the client goes away
struct AbortOnDrop(tokio::task::AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn research_stream(
    State(state): State<AppState>,
    Json(payload): Json<ResearchRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let identifier = payload.identifier()?;
    let (tx, rx) = mpsc::channel(16);

    let engine = state.engine.clone();
    let handle = tokio::spawn(async move {
        log::info!("Starting streaming run for {}", identifier);
        if let Err(e) = engine.run_stream(&identifier, tx).await {
            log::error!("Streaming run for {} failed: {}", identifier, e);
        }
    });
    let guard = AbortOnDrop(handle.abort_handle());

    let stream = ReceiverStream::new(rx).map(move |event: WorkflowEvent| {
        let _ = &guard;
        let sse = Event::default()
            .event(event.name())
            .json_data(&event)
            .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()));
        Ok(sse)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn list_leads(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<Lead>>, AppError> {
    let (skip, limit) = page.bounds();
    Ok(Json(state.leads.list(skip, limit).await?))
}

async fn get_lead(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Lead>, AppError> {
    Ok(Json(state.leads.get(id).await?))
}

async fn delete_lead(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    state.leads.delete(id).await?;
    log::info!("Deleted lead {}", id);
    Ok(Json(json!({ "message": "Lead deleted successfully" })))
}

async fn lead_emails(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<SentEmail>>, AppError> {
    state.leads.get(id).await?;
    Ok(Json(state.outbox.list_for_lead(id).await?))
}

async fn list_emails(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<SentEmail>>, AppError> {
    let (skip, limit) = page.bounds();
    Ok(Json(state.outbox.list(skip, limit).await?))
}
