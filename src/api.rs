//! HTTP API（feature = "web"）
//!
//! 所有路由只是 QaService 的薄封装；任何 QaError 都以 500 + `{"error": "..."}` 返回。
//! 文件通过 `/v1/upload`（multipart）上传导入；`/v1/ingest` 的 path 只能指向 retrieval.docs_dir 之内。

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::agent::{AskRequest, QaResponse, QaService, DEFAULT_SESSION};
use crate::core::{ContextChunk, QaError};
use crate::ingest::IngestReport;
use crate::memory::ConversationTurn;

pub struct ApiError(QaError);

impl From<QaError> for ApiError {
    fn from(e: QaError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    #[serde(default)]
    pub session_id: Option<String>,
}

impl SessionQuery {
    fn id(&self) -> &str {
        self.session_id
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_SESSION)
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub turns: Vec<ConversationTurn>,
}

#[derive(Debug, Deserialize)]
pub struct RetrieveQuery {
    pub q: String,
    #[serde(default)]
    pub k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct RetrieveResponse {
    pub query: String,
    pub results: Vec<ContextChunk>,
}

/// 导入：给 path 时导入文档目录内的文件或子目录；否则需要 doc_id + text
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub doc_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

async fn ask(
    State(service): State<Arc<QaService>>,
    Json(req): Json<AskRequest>,
) -> ApiResult<QaResponse> {
    Ok(Json(service.ask_request(&req).await?))
}

async fn history(
    State(service): State<Arc<QaService>>,
    Query(q): Query<SessionQuery>,
) -> ApiResult<HistoryResponse> {
    let turns = service.history(q.id()).await?;
    Ok(Json(HistoryResponse {
        session_id: q.id().to_string(),
        turns,
    }))
}

async fn clear_memory(
    State(service): State<Arc<QaService>>,
    Json(q): Json<SessionQuery>,
) -> ApiResult<serde_json::Value> {
    service.clear(q.id()).await?;
    Ok(Json(json!({ "status": "cleared", "session_id": q.id() })))
}

async fn debug_retrieve(
    State(service): State<Arc<QaService>>,
    Query(q): Query<RetrieveQuery>,
) -> ApiResult<RetrieveResponse> {
    let results = service.retrieve_debug(&q.q, q.k).await?;
    Ok(Json(RetrieveResponse {
        query: q.q,
        results,
    }))
}

fn report_json(report: &IngestReport) -> serde_json::Value {
    let results: Vec<serde_json::Value> = report
        .files
        .iter()
        .map(|f| match &f.error {
            None => json!({
                "filename": f.path.display().to_string(),
                "doc_id": f.doc_id,
                "chunks_ingested": f.chunks,
                "status": "success",
            }),
            Some(e) => json!({
                "filename": f.path.display().to_string(),
                "doc_id": f.doc_id,
                "status": "error",
                "message": e,
            }),
        })
        .collect();
    json!({
        "status": "completed",
        "results": results,
        "summary": {
            "total_files": report.files.len(),
            "successful": report.succeeded(),
            "failed": report.failed(),
            "total_chunks_ingested": report.total_chunks,
        },
    })
}

async fn ingest(
    State(service): State<Arc<QaService>>,
    Json(req): Json<IngestRequest>,
) -> ApiResult<serde_json::Value> {
    match (req.path, req.doc_id, req.text) {
        (Some(path), _, _) => {
            let report = service.ingest_docs_path(&path).await?;
            Ok(Json(report_json(&report)))
        }
        (None, Some(doc_id), Some(text)) => {
            let chunks = service.ingest_text(&doc_id, &text).await?;
            Ok(Json(json!({ "status": "completed", "doc_id": doc_id, "chunks_ingested": chunks })))
        }
        _ => Err(QaError::Ingestion("expected `path` or `doc_id` + `text`".to_string()).into()),
    }
}

/// multipart 上传：每个带文件名的字段是一个文档
async fn upload(
    State(service): State<Arc<QaService>>,
    mut multipart: Multipart,
) -> ApiResult<serde_json::Value> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| QaError::Ingestion(format!("invalid multipart body: {}", e)))?
    {
        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| QaError::Ingestion(format!("failed to read {}: {}", name, e)))?;
        files.push((name, bytes.to_vec()));
    }
    if files.is_empty() {
        return Err(QaError::Ingestion("no files in upload".to_string()).into());
    }
    let report = service.ingest_uploads(files).await;
    Ok(Json(report_json(&report)))
}

async fn clear_index(State(service): State<Arc<QaService>>) -> Json<serde_json::Value> {
    let deleted = service.clear_index().await;
    Json(json!({ "status": "success", "deleted_chunks": deleted }))
}

async fn health(State(service): State<Arc<QaService>>) -> Json<serde_json::Value> {
    let (chunks, documents) = service.index_stats().await;
    Json(json!({ "status": "ok", "chunks": chunks, "documents": documents }))
}

pub fn router(service: Arc<QaService>) -> Router {
    Router::new()
        .route("/v1/ask", post(ask))
        .route("/v1/history", get(history))
        .route("/v1/clear_memory", post(clear_memory))
        .route("/v1/debug/retrieve", get(debug_retrieve))
        .route("/v1/ingest", post(ingest))
        .route("/v1/upload", post(upload))
        .route("/v1/clear_index", post(clear_index))
        .route("/health", get(health))
        .with_state(service)
}
