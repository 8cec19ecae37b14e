use actix_web::{web, HttpResponse};
use std::sync::Arc;
use tracing::debug;

use crate::AppState;
use stratx::error::{validate_driver_code, validate_round, AppError};

/// All cached race results, ascending by round
pub async fn list_results(state: web::Data<Arc<AppState>>) -> Result<HttpResponse, AppError> {
    let records = state.cache.get_all().await;
    debug!("Serving {} cached rounds", records.len());
    Ok(HttpResponse::Ok().json(records))
}

/// Race result for one round
pub async fn get_result(
    state: web::Data<Arc<AppState>>,
    path: web::Path<u32>,
) -> Result<HttpResponse, AppError> {
    let round = path.into_inner();
    validate_round(round, state.cache.total_rounds())?;

    let record = state.cache.get(round).await?;
    Ok(HttpResponse::Ok().json(record))
}

/// Lap and stint drill-down for one driver
pub async fn driver_performance(
    state: web::Data<Arc<AppState>>,
    path: web::Path<(u32, String)>,
) -> Result<HttpResponse, AppError> {
    let (round, code) = path.into_inner();
    validate_round(round, state.cache.total_rounds())?;
    validate_driver_code(&code)?;

    let performance = state.cache.get_driver_detail(round, code.trim()).await?;
    Ok(HttpResponse::Ok().json(performance))
}

/// Next-lap prediction replayed from a cached race
pub async fn replay_next_lap(
    state: web::Data<Arc<AppState>>,
    path: web::Path<(u32, String)>,
) -> Result<HttpResponse, AppError> {
    let (round, code) = path.into_inner();
    validate_round(round, state.cache.total_rounds())?;
    validate_driver_code(&code)?;

    let (laps, context) = state.cache.replay_inputs(round, code.trim()).await?;
    let driver_id = code.trim().to_ascii_uppercase();
    let prediction = state
        .engine
        .predict_next_lap(&driver_id, &laps, Some(&context));
    Ok(HttpResponse::Ok().json(prediction))
}
