use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod handlers;

use handlers::{health, predict, results};
use stratx::openf1::OpenF1Client;
use stratx::{AppConfig, LapTimeModel, PredictionEngine, SessionResultCache};

/// Application state shared across handlers
pub struct AppState {
    pub engine: PredictionEngine,
    pub cache: SessionResultCache<OpenF1Client>,
}

impl AppState {
    fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let engine = PredictionEngine::new(LapTimeModel::load(&config.model_dir));
        let client = OpenF1Client::new(config.client_config())
            .context("Failed to create OpenF1 client")?;
        let cache = SessionResultCache::new(
            client,
            config.season,
            config.total_rounds,
            config.cache_mode,
        );
        Ok(Self { engine, cache })
    }
}

/// Register every route
fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health::health_check))
        .service(
            web::scope("/api/predictions")
                .route("/lap_time", web::post().to(predict::predict_lap_time))
                .route("/tyre_life", web::get().to(predict::predict_tyre_life))
                .route(
                    "/strategy_window",
                    web::get().to(predict::predict_strategy_window),
                )
                .route("/overtake", web::get().to(predict::predict_overtake)),
        )
        .route(
            "/api/telemetry/anomalies",
            web::post().to(predict::detect_anomalies),
        )
        .service(
            web::scope("/api/results")
                .route("", web::get().to(results::list_results))
                .route("/{round}", web::get().to(results::get_result))
                .route(
                    "/{round}/drivers/{code}/performance",
                    web::get().to(results::driver_performance),
                )
                .route(
                    "/{round}/drivers/{code}/next_lap",
                    web::get().to(results::replay_next_lap),
                ),
        );
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env();
    let addr = config.bind_addr();
    info!(
        "Serving season {} ({} rounds, {} cache)",
        config.season,
        config.total_rounds,
        config.cache_mode.as_str()
    );

    let app_state = Arc::new(AppState::from_config(&config)?);

    info!("Starting StratX API server at http://{}", addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(middleware::Logger::default())
            .configure(configure)
    })
    .bind(&addr)
    .with_context(|| format!("Failed to bind {}", addr))?
    .run()
    .await
    .context("Server error")
}
