use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Query, Request, State, multipart::MultipartError},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;

use nutrimport_core::db::Database;
use nutrimport_core::error::ImportError;
use nutrimport_core::ingest::read_rows_from_bytes;
use nutrimport_core::models::{Food, ImportOptions, ImportReport};
use nutrimport_core::pipeline::run_import;

const UPLOAD_LIMIT: usize = 10 * 1024 * 1024; // 10 MB
// Room for the multipart boundaries and the small text fields.
const BODY_LIMIT: usize = UPLOAD_LIMIT + 64 * 1024;

#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Database>>,
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct ListQuery {
    search: Option<String>,
}

#[derive(Serialize)]
struct ImportResponse {
    success: bool,
    message: String,
    #[serde(flatten)]
    report: ImportReport,
}

impl From<ImportReport> for ImportResponse {
    fn from(report: ImportReport) -> Self {
        Self {
            success: true,
            message: report.message(),
            report,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    details: String,
}

// --- Error handling ---

enum ApiError {
    BadRequest(String),
    PayloadTooLarge(String),
    Import(ImportError),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, details) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Invalid upload", msg),
            Self::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, "File too large", msg),
            Self::Import(err @ ImportError::FileTooLarge { .. }) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "File too large", err.to_string())
            }
            Self::Import(err) => (StatusCode::BAD_REQUEST, "Invalid upload", err.to_string()),
            Self::Internal(err) => {
                // Message chain only ("context: cause"), never a backtrace.
                let details = format!("{err:#}");
                tracing::error!(error = %details, "food import failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Import failed", details)
            }
        };
        let body = ErrorResponse {
            success: false,
            error: error.to_string(),
            details,
        };
        (status, Json(body)).into_response()
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        Self::Import(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge(err.body_text())
        } else {
            Self::BadRequest(err.body_text())
        }
    }
}

// --- Middleware ---

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// Rejections produced outside the handlers (body limit, malformed multipart
// framing) come back as plain text; give them the same JSON shape.
async fn json_rejections(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    let status = response.status();
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    if !status.is_client_error() || is_json {
        return response;
    }

    let details = match axum::body::to_bytes(response.into_body(), 64 * 1024).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => status.canonical_reason().unwrap_or_default().to_string(),
    };
    let error = if status == StatusCode::PAYLOAD_TOO_LARGE {
        "File too large"
    } else {
        "Invalid request"
    };
    let body = ErrorResponse {
        success: false,
        error: error.to_string(),
        details,
    };
    (status, Json(body)).into_response()
}

// --- Handlers ---

struct Upload {
    file_name: String,
    bytes: Vec<u8>,
}

async fn import_foods(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ImportResponse>, ApiError> {
    let mut upload: Option<Upload> = None;
    // Uploads carry no source tag unless the client sends one.
    let mut options = ImportOptions {
        default_brand: String::new(),
        ..ImportOptions::default()
    };

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                if upload.is_some() {
                    return Err(ApiError::BadRequest(
                        "Only one file may be uploaded per request".to_string(),
                    ));
                }
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                upload = Some(Upload {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
            "created_by" => {
                let value = field.text().await?;
                let value = value.trim();
                if !value.is_empty() {
                    options.created_by = Some(value.to_string());
                }
            }
            "brand" => {
                options.default_brand = field.text().await?.trim().to_string();
            }
            _ => {}
        }
    }

    let upload = upload.ok_or(ImportError::MissingFile)?;
    if upload.bytes.len() > UPLOAD_LIMIT {
        return Err(ImportError::FileTooLarge {
            size: upload.bytes.len(),
            limit: UPLOAD_LIMIT,
        }
        .into());
    }

    tracing::info!(
        file = %upload.file_name,
        bytes = upload.bytes.len(),
        "received food upload"
    );

    // Parsing a workbook and writing batches are both blocking.
    let db = Arc::clone(&state.db);
    let report = tokio::task::spawn_blocking(move || -> Result<ImportReport, ApiError> {
        let rows = read_rows_from_bytes(&upload.bytes, &upload.file_name)?;
        let mut db = db.lock().unwrap_or_else(PoisonError::into_inner);
        let report = run_import(&mut *db, &rows, &options, |progress| {
            tracing::debug!(
                batch = progress.batch,
                processed = progress.processed,
                total = progress.total,
                "upload import progress"
            );
        })?;
        Ok(report)
    })
    .await
    .context("import task panicked")??;

    Ok(Json(report.into()))
}

async fn list_foods(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<Food>>, ApiError> {
    let search = params
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let db = state.db.lock().unwrap_or_else(PoisonError::into_inner);
    let foods = db.list_foods(search).context("database error")?;
    Ok(Json(foods))
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/foods", get(list_foods))
        .route("/api/foods/import", post(import_foods))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(json_rejections))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(db: Database, port: u16, bind: &str) -> anyhow::Result<()> {
    let state = AppState {
        db: Arc::new(Mutex::new(db)),
    };

    let app = build_router(state);

    if bind != "127.0.0.1" && bind != "localhost" {
        tracing::warn!(
            bind,
            "listening beyond localhost; any device on your network can upload foods"
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("Failed to bind {bind}:{port}"))?;
    tracing::info!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
