use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::catalog::ReferenceCatalog;
use crate::settings;

use super::models::{ErrorResponse, ProcessRequest, ProcessResponse};
use super::process::process_request;
use super::state::ServerState;

pub async fn run_server(settings: settings::Settings, addr: String) -> Result<()> {
    let catalog = match settings.catalog_path.as_deref() {
        Some(path) => ReferenceCatalog::load_path(Path::new(path))
            .with_context(|| format!("failed to load catalog for server: {}", path))?,
        None => ReferenceCatalog::default(),
    };
    let state = Arc::new(ServerState::new(settings, catalog)?);
    let app = Router::new()
        .route("/health", get(health))
        .route("/process", post(process))
        .with_state(state)
        .layer(axum::middleware::from_fn(cors_middleware));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind server address: {}", addr))?;
    info!(addr = %addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type"),
    );
}

async fn process(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<ProcessRequest>,
) -> Result<Json<ProcessResponse>, (StatusCode, Json<ErrorResponse>)> {
    match process_request(state.as_ref(), payload).await {
        Ok(response) => Ok(Json(response)),
        Err(err) => Err((err.status, Json(ErrorResponse { error: err.message }))),
    }
}
