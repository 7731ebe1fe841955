use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

use crate::garden::{ControlError, SensorUpdate, SharedGarden};
use crate::state::OperatingMode;

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn router(garden: SharedGarden) -> Router {
    Router::new()
        .route("/api/status", get(api_status))
        .route("/api/mode", post(api_set_mode))
        .route("/api/mode/toggle", post(api_toggle_mode))
        .route("/api/pump/toggle", post(api_toggle_pump))
        .route("/api/cover/toggle", post(api_toggle_cover))
        .route("/api/tank/refill", post(api_refill))
        .route("/api/sim/water-usage", post(api_sim_water_usage))
        .route("/api/sim/rain", post(api_sim_rain))
        .route("/api/sim/soil-drying", post(api_sim_soil_drying))
        .route("/api/sim/sensors", post(api_sim_sensors))
        .route("/api/sim/water-level", post(api_sim_water_level))
        .with_state(garden)
}

#[derive(Deserialize)]
struct ModeBody {
    mode: OperatingMode,
}

#[derive(Deserialize)]
struct WaterLevelBody {
    percentage: i64,
}

async fn api_status(State(garden): State<SharedGarden>) -> impl IntoResponse {
    let g = garden.read().await;
    Json(g.status())
}

async fn api_set_mode(
    State(garden): State<SharedGarden>,
    body: Result<Json<ModeBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return bad_body(e),
    };
    let mut g = garden.write().await;
    let changed = g.set_mode(body.mode);
    Json(json!({ "mode": g.mode(), "changed": changed })).into_response()
}

async fn api_toggle_mode(State(garden): State<SharedGarden>) -> impl IntoResponse {
    let mut g = garden.write().await;
    Json(json!({ "mode": g.toggle_mode(), "changed": true }))
}

async fn api_toggle_pump(State(garden): State<SharedGarden>) -> Response {
    let mut g = garden.write().await;
    match g.toggle_pump() {
        Ok(target) => Json(json!({ "commanded": target })).into_response(),
        Err(e) => refused(e),
    }
}

async fn api_toggle_cover(State(garden): State<SharedGarden>) -> Response {
    let mut g = garden.write().await;
    match g.toggle_cover() {
        Ok(target) => Json(json!({ "commanded": target })).into_response(),
        Err(e) => refused(e),
    }
}

async fn api_refill(State(garden): State<SharedGarden>) -> impl IntoResponse {
    let mut g = garden.write().await;
    g.refill_tank();
    Json(json!({ "water_alert": g.alert_state() }))
}

async fn api_sim_water_usage(State(garden): State<SharedGarden>) -> impl IntoResponse {
    let mut g = garden.write().await;
    Json(json!({ "percentage": g.simulate_water_usage() }))
}

async fn api_sim_rain(State(garden): State<SharedGarden>) -> impl IntoResponse {
    let mut g = garden.write().await;
    Json(json!({ "is_raining": g.simulate_rain() }))
}

async fn api_sim_soil_drying(State(garden): State<SharedGarden>) -> impl IntoResponse {
    let mut g = garden.write().await;
    Json(json!({ "soil_humidity": g.simulate_soil_drying() }))
}

async fn api_sim_sensors(
    State(garden): State<SharedGarden>,
    update: Result<Json<SensorUpdate>, JsonRejection>,
) -> Response {
    let Json(update) = match update {
        Ok(u) => u,
        Err(e) => return bad_body(e),
    };
    garden.write().await.update_sensor_data(update);
    StatusCode::NO_CONTENT.into_response()
}

async fn api_sim_water_level(
    State(garden): State<SharedGarden>,
    body: Result<Json<WaterLevelBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return bad_body(e),
    };
    let percentage = body.percentage.clamp(0, 100) as u8;
    garden.write().await.update_water_level(percentage);
    StatusCode::NO_CONTENT.into_response()
}

fn refused(err: ControlError) -> Response {
    (StatusCode::CONFLICT, Json(json!({ "error": err.to_string() }))).into_response()
}

/// Body rejections keep axum's status but answer with the same JSON error
/// shape as refusals.
fn bad_body(rejection: JsonRejection) -> Response {
    (rejection.status(), Json(json!({ "error": rejection.body_text() }))).into_response()
}

// ---------------------------------------------------------------------------
// Server entry-point
// ---------------------------------------------------------------------------

pub async fn serve(garden: SharedGarden, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind web port {port}"))?;

    info!("http api listening on http://{addr}");

    axum::serve(listener, router(garden))
        .await
        .context("web server error")
}

// ===========================================================================
// Tests
// ===========================================================================
