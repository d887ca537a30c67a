//! ==============================================================================
//! api.rs - http surface of the sensor hub
//! ==============================================================================
//!
//! purpose:
//!     thin axum glue: decode json, call the hub, encode the answer. payloads
//!     are validated here exactly once; `HubError` turns into the status code.
//!
//! routes:
//!     POST   /api/sensors/ingest             store a reading (204)
//!     GET    /api/sensors/list               full snapshot
//!     GET    /api/sensors/stats              subscription + store health
//!     GET    /api/sensors/analysis           growing-condition verdicts
//!     GET    /api/sensors/stream             server-sent events
//!     POST   /api/sensors/update             absolute values
//!     POST   /api/sensors/adjust             relative changes
//!     POST   /api/sensors/preset             canned condition
//!     POST   /api/sensors/init               seed demo sensors
//!     POST   /api/sensors/fluctuate          one fluctuation pass
//!     GET    /api/sensors/:sensor_id         one reading
//!     DELETE /api/sensors/:sensor_id         remove a sensor
//!     POST   /api/sensors/:sensor_id/reset   default values
//!
//! ==============================================================================

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive},
        Json, Sse,
    },
    routing::{get, post},
    Router,
};
use chrono::Utc;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::analysis::SensorAnalysis;
use crate::config::ServerConfig;
use crate::domain::{MetricDeltas, MetricValues, Reading, ReadingPayload};
use crate::error::HubError;
use crate::hub::{Preset, SensorHub};
use crate::store::{StoreStats, SubscriptionStats};
use crate::stream::{views, SensorView, StreamGateway};

// ==============================================================================
// shared state
// ==============================================================================

#[derive(Clone)]
pub struct ApiState {
    pub hub: SensorHub,
    pub gateway: StreamGateway,
}

impl ApiState {
    pub fn new(hub: SensorHub, gateway: StreamGateway) -> Self {
        Self { hub, gateway }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/sensors/ingest", post(ingest_handler))
        .route("/api/sensors/list", get(list_handler))
        .route("/api/sensors/stats", get(stats_handler))
        .route("/api/sensors/analysis", get(analysis_handler))
        .route("/api/sensors/stream", get(stream_handler))
        .route("/api/sensors/update", post(update_handler))
        .route("/api/sensors/adjust", post(adjust_handler))
        .route("/api/sensors/preset", post(preset_handler))
        .route("/api/sensors/init", post(init_handler))
        .route("/api/sensors/fluctuate", post(fluctuate_handler))
        .route(
            "/api/sensors/:sensor_id",
            get(sensor_handler).delete(delete_handler),
        )
        .route("/api/sensors/:sensor_id/reset", post(reset_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// serve until ctrl-c
pub async fn serve(config: &ServerConfig, state: ApiState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.address()).await?;
    tracing::info!(address = %config.address(), "api listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;
    Ok(())
}

/// malformed json is a validation failure (400), not axum's default 422
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, HubError> {
    payload
        .map(|Json(inner)| inner)
        .map_err(|rejection| HubError::Validation(rejection.body_text()))
}

fn required_id(sensor_id: Option<String>) -> Result<String, HubError> {
    sensor_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| HubError::Validation("sensor_id is required".into()))
}

// ==============================================================================
// queries
// ==============================================================================

#[derive(Serialize)]
pub struct ListResponse {
    pub sensors: Vec<SensorView>,
    pub count: usize,
    pub timestamp: chrono::DateTime<Utc>,
}

async fn list_handler(State(state): State<ApiState>) -> Json<ListResponse> {
    let snapshot = state.hub.snapshot();
    Json(ListResponse {
        sensors: views(snapshot.sensors),
        count: snapshot.count,
        timestamp: snapshot.timestamp,
    })
}

async fn sensor_handler(
    State(state): State<ApiState>,
    Path(sensor_id): Path<String>,
) -> Result<Json<SensorView>, HubError> {
    let reading = state.hub.reading(&sensor_id)?;
    Ok(Json(SensorView::from(reading)))
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub subscriptions: SubscriptionStats,
    pub store: StoreStats,
    pub active_streams: usize,
}

async fn stats_handler(State(state): State<ApiState>) -> Json<StatsResponse> {
    let store = state.hub.store();
    Json(StatsResponse {
        subscriptions: store.subscription_stats(),
        store: store.store_stats(),
        active_streams: state.gateway.active_clients(),
    })
}

#[derive(Deserialize)]
pub struct AnalysisQuery {
    pub plant_type: Option<String>,
}

#[derive(Serialize)]
pub struct AnalysisResponse {
    pub sensors: Vec<SensorAnalysis>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plant_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    pub timestamp: chrono::DateTime<Utc>,
}

async fn analysis_handler(
    State(state): State<ApiState>,
    Query(query): Query<AnalysisQuery>,
) -> Json<AnalysisResponse> {
    let sensors = state.hub.analyze();
    let plant_type = query.plant_type.filter(|p| !p.trim().is_empty());
    let recommendation = plant_type.as_ref().map(|plant| {
        format!(
            "Please adjust environmental conditions based on {} specific requirements.",
            plant
        )
    });
    Json(AnalysisResponse {
        count: sensors.len(),
        sensors,
        plant_type,
        recommendation,
        timestamp: Utc::now(),
    })
}

async fn stream_handler(
    State(state): State<ApiState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let messages = state
        .gateway
        .connect()
        .map(|message| Event::default().json_data(message));
    Sse::new(messages).keep_alive(KeepAlive::default())
}

// ==============================================================================
// writes
// ==============================================================================

async fn ingest_handler(
    State(state): State<ApiState>,
    payload: Result<Json<ReadingPayload>, JsonRejection>,
) -> Result<StatusCode, HubError> {
    let reading = Reading::try_from(body(payload)?)?;
    state.hub.ingest(reading)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct UpdateRequest {
    pub sensor_id: Option<String>,
    pub updates: Option<MetricValues>,
}

async fn update_handler(
    State(state): State<ApiState>,
    payload: Result<Json<UpdateRequest>, JsonRejection>,
) -> Result<Json<Value>, HubError> {
    let request = body(payload)?;
    let sensor_id = required_id(request.sensor_id)?;
    let updates = request.updates.unwrap_or_default();

    let reading = state.hub.set_values(&sensor_id, updates)?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Successfully updated sensor {}", sensor_id),
        "sensor_id": sensor_id,
        "updates": updates,
        "reading": reading,
        "timestamp": Utc::now(),
    })))
}

#[derive(Deserialize)]
pub struct AdjustRequest {
    pub sensor_id: Option<String>,
    #[serde(flatten)]
    pub deltas: MetricDeltas,
}

async fn adjust_handler(
    State(state): State<ApiState>,
    payload: Result<Json<AdjustRequest>, JsonRejection>,
) -> Result<Json<Value>, HubError> {
    let request = body(payload)?;
    let sensor_id = required_id(request.sensor_id)?;

    let reading = state.hub.adjust_values(&sensor_id, request.deltas)?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Successfully adjusted sensor {}", sensor_id),
        "sensor_id": sensor_id,
        "reading": reading,
        "timestamp": Utc::now(),
    })))
}

#[derive(Deserialize)]
pub struct PresetRequest {
    pub condition: Preset,
    pub sensor_ids: Option<Vec<String>>,
}

async fn preset_handler(
    State(state): State<ApiState>,
    payload: Result<Json<PresetRequest>, JsonRejection>,
) -> Result<Json<Value>, HubError> {
    let request = body(payload)?;
    let outcome = state.hub.apply_preset(request.condition, request.sensor_ids);
    Ok(Json(json!({
        "success": true,
        "condition": request.condition,
        "applied": outcome.applied,
        "missing": outcome.missing,
        "timestamp": Utc::now(),
    })))
}

async fn reset_handler(
    State(state): State<ApiState>,
    Path(sensor_id): Path<String>,
) -> Result<Json<Reading>, HubError> {
    Ok(Json(state.hub.reset(&sensor_id)?))
}

async fn delete_handler(
    State(state): State<ApiState>,
    Path(sensor_id): Path<String>,
) -> Result<Json<Value>, HubError> {
    state.hub.delete(&sensor_id)?;
    Ok(Json(json!({ "success": true, "sensor_id": sensor_id })))
}

async fn init_handler(State(state): State<ApiState>) -> Json<Value> {
    let count = state.hub.init_demo_sensors();
    Json(json!({
        "success": true,
        "message": "Sensors initialized successfully",
        "count": count,
        "timestamp": Utc::now(),
    }))
}

async fn fluctuate_handler(State(state): State<ApiState>) -> Json<Value> {
    let sensors = state.hub.fluctuate();
    Json(json!({
        "success": true,
        "message": "Sensor fluctuations applied",
        "sensors": sensors,
        "timestamp": Utc::now(),
    }))
}
