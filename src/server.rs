//! Read-only HTTP view of the render loop: axum router and handlers.
//!
//! The server runs on the tokio runtime while the render loop runs on a
//! plain `std::thread`. They share a single `Arc<Mutex<DisplayStatus>>`
//! which the loop writes after every tick. Nothing here can drive the
//! device; the loop stays the only writer to the serial port.
//!
//! ## Rust concepts
//! - axum extractors: `State`, `Query`
//! - `impl IntoResponse` for custom bodies and headers
//! - `tower-http` middleware for CORS and request tracing

use crate::frame::{MAX_SCALE, to_image};
use crate::render::{DisplayStatus, LoopState, lock_status};
use crate::telemetry::BatteryState;
use crate::{HEIGHT, WIDTH, animator::Mode};
use axum::Router;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

// ── App State ────────────────────────────────────────────────────────

/// Shared application state, passed to every handler via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Snapshot written by the render loop after every tick
    pub status: Arc<Mutex<DisplayStatus>>,
}

// ── OpenAPI Documentation ────────────────────────────────────────────

#[derive(OpenApi)]
#[openapi(
    paths(get_status, get_frame, get_frame_png),
    components(schemas(DisplayStatus, LoopState, BatteryState, Mode, FrameResponse)),
    tags(
        (name = "system", description = "Render loop status"),
        (name = "frame", description = "Last rendered frame"),
    ),
    info(
        title = "Battery Matrix API",
        version = env!("CARGO_PKG_VERSION"),
        description = "Read-only view of the battery indicator on the LED matrix"
    )
)]
pub struct ApiDoc;

// ── Request/Response types ───────────────────────────────────────────

/// Brightness grid as sent to the device, one array per column.
#[derive(Serialize, utoipa::ToSchema)]
pub struct FrameResponse {
    #[schema(example = 9)]
    width: usize,
    #[schema(example = 34)]
    height: usize,
    /// `columns[col][row]`, row 0 at the top, values 0-255
    columns: Vec<Vec<u8>>,
}

#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PngQuery {
    /// Pixels per LED, 1-64
    #[serde(default = "default_scale")]
    #[param(example = 10)]
    scale: u32,
}

fn default_scale() -> u32 {
    10
}

// ── Router ───────────────────────────────────────────────────────────

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(
            SwaggerUi::new("/docs")
                .url("/api-docs/openapi.json", ApiDoc::openapi())
                .config(
                    utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
                        .validator_url("none"),
                ),
        )
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/frame", get(get_frame))
        .route("/api/v1/frame.png", get(get_frame_png))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Handlers ─────────────────────────────────────────────────────────

/// GET /api/v1/status — battery, pulse and loop counters from the last tick
#[utoipa::path(
    get,
    path = "/api/v1/status",
    tag = "system",
    responses(
        (status = 200, description = "Current render loop status", body = DisplayStatus)
    )
)]
async fn get_status(State(state): State<AppState>) -> Json<DisplayStatus> {
    let status = lock_status(&state.status).clone();
    Json(status)
}

/// GET /api/v1/frame — the last frame as brightness values
#[utoipa::path(
    get,
    path = "/api/v1/frame",
    tag = "frame",
    responses(
        (status = 200, description = "Last rendered frame", body = FrameResponse)
    )
)]
async fn get_frame(State(state): State<AppState>) -> Json<FrameResponse> {
    let frame = lock_status(&state.status).frame.clone();
    Json(FrameResponse {
        width: WIDTH,
        height: HEIGHT,
        columns: frame.columns().map(|c| c.to_vec()).collect(),
    })
}

/// GET /api/v1/frame.png — the last frame as a grayscale PNG
#[utoipa::path(
    get,
    path = "/api/v1/frame.png",
    tag = "frame",
    params(PngQuery),
    responses(
        (status = 200, description = "PNG preview", body = Vec<u8>, content_type = "image/png"),
        (status = 400, description = "Scale out of range"),
        (status = 500, description = "Encoding failed")
    )
)]
async fn get_frame_png(
    State(state): State<AppState>,
    Query(query): Query<PngQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let frame = lock_status(&state.status).frame.clone();
    let Some(image) = to_image(&frame, query.scale) else {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("scale must be between 1 and {MAX_SCALE}"),
        ));
    };

    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| {
            tracing::error!("Failed to encode frame preview: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}
