use actix_web::{web, HttpResponse};
use std::sync::Arc;
use tracing::debug;

use crate::AppState;
use stratx::error::{validate_gap, validate_total_laps, AppError};
use stratx::models::{
    AnomalyResponse, LapTimeRequest, OvertakeQuery, PitWindowQuery, TelemetrySnapshot,
    TyreLifeQuery,
};

fn require_driver(driver_id: &str) -> Result<(), AppError> {
    if driver_id.trim().is_empty() {
        return Err(AppError::ValidationError(
            "driver_id must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Predict the next lap time
pub async fn predict_lap_time(
    state: web::Data<Arc<AppState>>,
    req: web::Json<LapTimeRequest>,
) -> Result<HttpResponse, AppError> {
    require_driver(&req.driver_id)?;

    let prediction =
        state
            .engine
            .predict_next_lap(&req.driver_id, &req.recent_laps, req.context.as_ref());
    debug!(
        "Lap time for {}: {:.3}s ({:?})",
        prediction.driver_id, prediction.value, prediction.source
    );

    Ok(HttpResponse::Ok().json(prediction))
}

/// Predict remaining tyre life
pub async fn predict_tyre_life(
    state: web::Data<Arc<AppState>>,
    query: web::Query<TyreLifeQuery>,
) -> Result<HttpResponse, AppError> {
    require_driver(&query.driver_id)?;

    let prediction =
        state
            .engine
            .predict_tyre_life(&query.driver_id, &query.compound, query.laps_on_tyre);
    Ok(HttpResponse::Ok().json(prediction))
}

/// Recommend a pit stop window
pub async fn predict_strategy_window(
    state: web::Data<Arc<AppState>>,
    query: web::Query<PitWindowQuery>,
) -> Result<HttpResponse, AppError> {
    require_driver(&query.driver_id)?;
    validate_total_laps(query.current_lap, query.total_laps)?;

    let window =
        state
            .engine
            .predict_pit_window(&query.driver_id, query.current_lap, query.total_laps);
    Ok(HttpResponse::Ok().json(window))
}

/// Predict the chance of overtaking the car ahead
pub async fn predict_overtake(
    state: web::Data<Arc<AppState>>,
    query: web::Query<OvertakeQuery>,
) -> Result<HttpResponse, AppError> {
    validate_gap(query.gap)?;

    let prediction =
        state
            .engine
            .predict_overtake(query.gap, &query.driver_compound, &query.target_compound);
    Ok(HttpResponse::Ok().json(prediction))
}

/// Flag anomalies in a telemetry snapshot
pub async fn detect_anomalies(
    state: web::Data<Arc<AppState>>,
    telemetry: web::Json<TelemetrySnapshot>,
) -> Result<HttpResponse, AppError> {
    let anomalies = state.engine.detect_anomalies(&telemetry);
    Ok(HttpResponse::Ok().json(AnomalyResponse { anomalies }))
}
