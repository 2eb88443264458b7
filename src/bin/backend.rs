//! HTTP backend for the subtitle acquisition service.
//!
//! Exposes two POST endpoints: `/download-subtitles/` runs the full
//! acquisition pipeline (validate id, cache, concurrent yt-dlp + metadata
//! lookup, VTT conversion) and `/fetch-webpage/` returns the visible text
//! of an arbitrary page. Both respond with the `{"detail": {...}}` envelope
//! on success and on error.

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::Deserialize;
use serde_json::{Value, json};
use subfetch::{
    config::{RuntimeConfig, load_runtime_config},
    downloader::SubtitleDownloader,
    error::SubfetchError,
    metadata::MetadataClient,
    pipeline::{ResponseDocument, SubtitlePipeline, SubtitleRequest},
    security,
    webpage::PageFetcher,
};
use tokio::{signal, task};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone)]
struct AppState {
    pipeline: Arc<SubtitlePipeline>,
    pages: Arc<PageFetcher>,
}

/// Error envelope returned to HTTP clients. The payload always echoes the
/// identifiers from the original request so callers can correlate failures.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    detail: Value,
}

impl ApiError {
    fn from_pipeline(err: SubfetchError, request: &SubtitleRequest) -> Self {
        let status = match err {
            SubfetchError::InvalidVideoId(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            detail: json!({
                "status": "error",
                "message": err.to_string(),
                "data": {
                    "video_id": request.video_id,
                    "video_url": request.video_url,
                }
            }),
        }
    }

    fn for_page(message: impl Into<String>, url: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: json!({
                "status": "error",
                "message": message.into(),
                "data": { "url": url }
            }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "detail": self.detail });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    security::ensure_not_root("subfetch backend")?;

    let config = load_runtime_config().context("loading runtime configuration")?;
    let state = build_state(&config);

    let app = Router::new()
        .route("/download-subtitles/", post(download_subtitles))
        .route("/fetch-webpage/", post(fetch_webpage))
        .with_state(state);

    let addr = SocketAddr::new(
        config
            .host
            .parse()
            .with_context(|| format!("parsing host {}", config.host))?,
        config.port,
    );
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    info!("subtitle API listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    Ok(())
}

fn build_state(config: &RuntimeConfig) -> AppState {
    let downloader = SubtitleDownloader::new(
        config.ytdlp_path.clone(),
        config.cookies_file.clone(),
    );
    let metadata = Arc::new(MetadataClient::new(config.api_key.clone()));
    let pipeline = SubtitlePipeline::new(downloader, metadata, config.downloads_dir.clone());

    AppState {
        pipeline: Arc::new(pipeline),
        pages: Arc::new(PageFetcher::new()),
    }
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        tracing::error!("failed to install Ctrl+C handler: {err}");
    }
}

async fn download_subtitles(
    State(state): State<AppState>,
    Json(request): Json<SubtitleRequest>,
) -> ApiResult<Json<ResponseDocument>> {
    info!("received request for video id {}", request.video_id);

    match state.pipeline.acquire(&request).await {
        Ok(document) => Ok(Json(document)),
        Err(err) => {
            tracing::error!("request for {} failed: {err}", request.video_id);
            Err(ApiError::from_pipeline(err, &request))
        }
    }
}

#[derive(Debug, Deserialize)]
struct PageRequest {
    url: String,
}

async fn fetch_webpage(
    State(state): State<AppState>,
    Json(request): Json<PageRequest>,
) -> ApiResult<Json<Value>> {
    info!("received request to fetch URL {}", request.url);

    let fetcher = state.pages.clone();
    let url = request.url.clone();
    let content = task::spawn_blocking(move || fetcher.fetch(&url))
        .await
        .map_err(|err| ApiError::for_page(format!("task join error: {err}"), &request.url))?
        .map_err(|err| {
            ApiError::for_page(format!("Error fetching webpage: {err}"), &request.url)
        })?;

    Ok(Json(json!({
        "detail": {
            "status": "success",
            "message": "Webpage content fetched successfully",
            "data": {
                "content": content,
                "url": request.url,
            }
        }
    })))
}
