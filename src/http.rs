use std::sync::Arc;

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::admin::Admin;
use crate::broadcaster::Broadcaster;
use crate::library::TrackData;
use crate::playlist::TimeTag;

/// The minimal HTTP surface: stream endpoint and status; everything
/// else (routing, web UI, JWT auth, uploads, SPA fallback) stays out of
/// scope here and lives behind its own named-interface collaborator.
#[derive(Clone)]
pub struct AppState {
    pub admin: Arc<Admin>,
    pub broadcaster: Arc<Broadcaster>,
    pub station_name: String,
    pub bitrate_kbps: u32,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/stream", get(stream_handler))
        .route("/status", get(status_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn stream_handler(State(state): State<AppState>) -> Response {
    let Some(subscription) = state.broadcaster.subscribe() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "station is at capacity").into_response();
    };

    let chunks = futures::stream::unfold(subscription, |mut sub| async move {
        sub.recv().await.map(|chunk| (Ok::<_, std::io::Error>(chunk), sub))
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "audio/mpeg")
        .header("icy-name", state.station_name.as_str())
        .header("X-Station-Name", state.station_name.as_str())
        .header("icy-br", state.bitrate_kbps.to_string())
        .body(axum::body::Body::from_stream(chunks))
        .expect("static headers are always valid")
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    current_track: Option<TrackData>,
    active_tag: TimeTag,
    subscriber_count: usize,
}

async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let status = state.admin.get_status().await;
    Json(StatusResponse {
        current_track: status.current_track.map(|c| c.track),
        active_tag: status.active_tag,
        subscriber_count: status.subscriber_count,
    })
}
