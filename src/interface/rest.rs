//! REST backend for the book collection.
//!
//! HTTP (axum) <-> infra::BookStore
//!
//! | Method | Path | Status |
//! |---|---|---|
//! | GET | /api/books/ | 200 |
//! | POST | /api/books/create/ | 201 / 400 |
//! | PUT | /api/books/{id}/ | 200 / 400 / 404 |
//! | DELETE | /api/books/{id}/ | 204 / 404 |

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::domain::error::DomainError;
use crate::domain::model::book::{Book, BookPayload, FieldErrors};
use crate::domain::model::id::BookId;
use crate::infra::book_store::{BookStore, StoreError};

// =============================================================================
// Public entry points
// =============================================================================

/// 設定に従ってストアを開き、REST APIを起動する。Ctrl-Cで停止。
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let store = match &config.data_file {
        Some(path) => BookStore::open(path)?,
        None => BookStore::in_memory(),
    };
    let listener = TcpListener::bind(config.bind).await?;
    let addr = listener.local_addr()?;
    info!(%addr, persistent = store.path().is_some(), "book api listening");

    axum::serve(listener, router(Arc::new(store)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("book api stopped");
    Ok(())
}

/// bind済みのlistenerで待ち受ける。テストではポート0で使う。
pub async fn serve(listener: TcpListener, store: Arc<BookStore>) -> std::io::Result<()> {
    axum::serve(listener, router(store)).await
}

pub fn router(store: Arc<BookStore>) -> Router {
    Router::new()
        .route("/api/books/", get(list_books))
        .route("/api/books/create/", post(create_book))
        .route("/api/books/:id/", put(replace_book).delete(delete_book))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error("not found")]
    NotFound,
    #[error("invalid book: {0}")]
    Invalid(FieldErrors),
    #[error("JSON parse error - {0}")]
    Malformed(String),
    #[error("store error: {0}")]
    Internal(StoreError),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Domain(DomainError::BookNotFound(_)) => ApiError::NotFound,
            other => ApiError::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND.into_response(),
            ApiError::Invalid(errors) => (StatusCode::BAD_REQUEST, Json(errors)).into_response(),
            ApiError::Malformed(reason) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "detail": format!("JSON parse error - {reason}") })),
            )
                .into_response(),
            ApiError::Internal(e) => {
                error!(error = %e, "book store failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "detail": "internal error" })),
                )
                    .into_response()
            }
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn list_books(State(store): State<Arc<BookStore>>) -> Json<Vec<Book>> {
    Json(store.list())
}

async fn create_book(
    State(store): State<Arc<BookStore>>,
    body: Bytes,
) -> Result<(StatusCode, Json<Book>), ApiError> {
    let payload = parse_payload(&body)?;
    let book = store.create(payload)?;
    info!(book_id = %book.id(), "book created");
    Ok((StatusCode::CREATED, Json(book)))
}

async fn replace_book(
    State(store): State<Arc<BookStore>>,
    Path(raw_id): Path<String>,
    body: Bytes,
) -> Result<Json<Book>, ApiError> {
    let id = parse_id(&raw_id)?;
    // 存在確認が先。未知IDなら本文の検証より404を優先する
    store.get(id).map_err(|_| ApiError::NotFound)?;
    let payload = parse_payload(&body)?;
    let book = store.replace(id, payload)?;
    info!(book_id = %id, "book replaced");
    Ok(Json(book))
}

async fn delete_book(
    State(store): State<Arc<BookStore>>,
    Path(raw_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&raw_id)?;
    store.delete(id)?;
    info!(book_id = %id, "book deleted");
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Helpers
// =============================================================================

/// パスの `{id}` は整数のみ。それ以外はルート不一致として404。
fn parse_id(raw: &str) -> Result<BookId, ApiError> {
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
        return Err(ApiError::NotFound);
    }
    raw.parse::<BookId>().map_err(|_| ApiError::NotFound)
}

/// 空ボディは `{}` 扱い（必須エラーになる）。
fn parse_payload(body: &[u8]) -> Result<BookPayload, ApiError> {
    let value: Value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Default::default())
    } else {
        serde_json::from_slice(body).map_err(|e| ApiError::Malformed(e.to_string()))?
    };
    BookPayload::from_json(&value).map_err(ApiError::Invalid)
}

// =============================================================================
// Tests
// =============================================================================
