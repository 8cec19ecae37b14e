use actix_web::{web, HttpResponse, Responder};
use std::sync::Arc;

use crate::AppState;
use stratx::models::HealthResponse;

/// Health check endpoint
pub async fn health_check(state: web::Data<Arc<AppState>>) -> impl Responder {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_loaded: state.engine.model_loaded(),
        cache_state: state.cache.state().as_str().to_string(),
        cache_mode: state.cache.mode().as_str().to_string(),
        cached_rounds: state.cache.cached_rounds(),
    };

    HttpResponse::Ok().json(response)
}
