//! HTTP API server: axum router and request handlers.
//!
//! The server runs on the tokio async runtime while the animation runs on a
//! plain `std::thread`. They share three things, none of which can stall a
//! frame: the cue gate (a short lock, never held while rendering), the ring
//! settings (atomics) and the status snapshot (written only between cycles).
//!
//! `POST /api/v1/config` takes the clock's JSON config document, the same
//! one the clock receives as a retained message at boot.
//!
//! ## Rust concepts
//! - `async fn` and `.await` for non-blocking I/O
//! - axum extractors: `State`, `Json`, `String` bodies
//! - `Arc` for sharing state across async tasks

use crate::RingLayout;
use crate::animation::{AnimationState, AnimationStatus};
use crate::cue::CueGate;
use crate::settings::{ConfigReport, RingLevels, RingSettings};
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

// ── App State ────────────────────────────────────────────────────────

/// Shared application state, passed to every handler via axum's `State` extractor.
///
/// Rust concept: CLONE for Arc
/// axum clones the state for each request handler, so everything inside
/// must be cheaply cloneable. `Arc` makes that possible for shared data.
#[derive(Clone)]
pub struct AppState {
    /// Wakes the animation for a new cycle
    pub gate: Arc<CueGate>,
    /// Live saturation/brightness, read by the animation every frame
    pub settings: Arc<RingSettings>,
    /// Animation status (animation thread writes, handlers read)
    pub status: Arc<Mutex<AnimationStatus>>,
    /// Ring dimensions and timing
    pub layout: RingLayout,
}

// ── OpenAPI Documentation ────────────────────────────────────────────

#[derive(OpenApi)]
#[openapi(
    paths(get_status, post_config, post_cue),
    components(schemas(
        RingStatus,
        AnimationStatus,
        AnimationState,
        RingLevels,
        ConfigResponse,
        AppliedValue,
        CueResponse,
    )),
    tags(
        (name = "ring", description = "Seconds ring control endpoints"),
        (name = "system", description = "System status endpoints"),
    ),
    info(
        title = "Seconds Ring API",
        version = env!("CARGO_PKG_VERSION"),
        description = "HTTP API for the LED seconds ring of a network clock"
    )
)]
pub struct ApiDoc;

// ── Response types ───────────────────────────────────────────────────

/// Everything `GET /api/v1/status` reports.
#[derive(Serialize, utoipa::ToSchema)]
pub struct RingStatus {
    /// Animation state as of the last cycle boundary
    pub animation: AnimationStatus,
    /// Current saturation and brightness
    pub levels: RingLevels,
    /// Number of LEDs on the ring
    pub ring_size: u16,
    /// Fade steps per LED
    pub steps_per_pixel: u16,
    /// Time between frames, in milliseconds
    pub frame_period_ms: u64,
    /// True while a cue is waiting for the animation
    pub cue_pending: bool,
    /// Server version
    pub version: String,
}

#[derive(Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct AppliedValue {
    /// Config key, e.g. `ledRingBrightness`
    #[schema(example = "ledRingBrightness")]
    pub field: String,
    /// The value now in effect
    #[schema(example = 10)]
    pub value: u8,
}

/// Field-by-field outcome of a config message.
#[derive(Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct ConfigResponse {
    /// Fields that were changed
    pub applied: Vec<AppliedValue>,
    /// Why each refused field was refused; those fields kept their old value
    pub rejected: Vec<String>,
    /// Ring fields absent from the message (left unchanged)
    pub missing: Vec<String>,
    /// Settings after the message was applied
    pub levels: RingLevels,
}

impl ConfigResponse {
    fn new(report: ConfigReport, levels: RingLevels) -> Self {
        Self {
            applied: report
                .applied
                .iter()
                .map(|a| AppliedValue {
                    field: a.field.to_string(),
                    value: a.value,
                })
                .collect(),
            rejected: report.rejected.iter().map(|r| r.to_string()).collect(),
            missing: report.missing.iter().map(|m| m.to_string()).collect(),
            levels,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct CueResponse {
    /// False if a cue was already pending and this one merged into it
    pub queued: bool,
}

// ── Router ───────────────────────────────────────────────────────────

/// Build the axum router with all API endpoints.
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
        .route("/api/v1/config", post(post_config))
        .route("/api/v1/cue", post(post_cue))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Handlers ─────────────────────────────────────────────────────────

/// GET /api/v1/status — return the ring's current state
#[utoipa::path(
    get,
    path = "/api/v1/status",
    tag = "system",
    responses(
        (status = 200, description = "Current ring status", body = RingStatus)
    )
)]
async fn get_status(State(state): State<AppState>) -> Json<RingStatus> {
    let animation = state
        .status
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .clone();

    Json(RingStatus {
        animation,
        levels: state.settings.levels(),
        ring_size: state.layout.ring_size,
        steps_per_pixel: state.layout.steps_per_pixel,
        frame_period_ms: state.layout.frame_period().as_millis() as u64,
        cue_pending: state.gate.is_pending(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /api/v1/config — apply a JSON config message
///
/// Recognised keys are `ledRingBrightness` and `ledRingSaturation` (0-254,
/// number or numeric string). Other keys are ignored.
#[utoipa::path(
    post,
    path = "/api/v1/config",
    tag = "ring",
    request_body(
        content = String,
        content_type = "application/json",
        description = "Clock config document, e.g. {\"ledRingBrightness\": 10}"
    ),
    responses(
        (status = 200, description = "Message applied; see body for per-field results", body = ConfigResponse),
        (status = 400, description = "Body is not a JSON config object")
    )
)]
async fn post_config(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<ConfigResponse>, (StatusCode, String)> {
    let report = state
        .settings
        .apply_control_message(&body)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    if report.has_rejections() {
        tracing::warn!(
            "config message had {} rejected field(s), kept their previous values",
            report.rejected.len()
        );
    }

    Ok(Json(ConfigResponse::new(report, state.settings.levels())))
}

/// POST /api/v1/cue — start a cycle as if a minute just began
#[utoipa::path(
    post,
    path = "/api/v1/cue",
    tag = "ring",
    responses(
        (status = 202, description = "Cue posted", body = CueResponse),
        (status = 503, description = "Animation is shutting down")
    )
)]
async fn post_cue(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<CueResponse>), (StatusCode, String)> {
    if state.gate.is_closed() {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "Animation is shutting down".to_string(),
        ));
    }

    let queued = state.gate.signal();
    Ok((StatusCode::ACCEPTED, Json(CueResponse { queued })))
}
