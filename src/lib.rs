//! StratX - Race strategy prediction engine
//!
//! This library provides:
//! - Next-lap time prediction from an ONNX regression model, with a
//!   heuristic fallback whenever the model cannot answer
//! - Heuristic tyre life, pit window, overtake and telemetry anomaly estimates
//! - An in-memory cache of historical race sessions, warmed up front or
//!   loaded round by round
//! - An OpenF1 client feeding that cache
//!
//! # Example
//!
//! ```no_run
//! use stratx::engine::PredictionEngine;
//! use stratx::predictor::LapTimeModel;
//!
//! // Falls back to heuristics if the artifact is missing
//! let engine = PredictionEngine::new(LapTimeModel::load("models"));
//!
//! let tyre = engine.predict_tyre_life("VER", "MEDIUM", 18);
//! println!("{}% left ({:?})", tyre.value, tyre.status);
//!
//! let window = engine.predict_pit_window("VER", 18, 53);
//! println!("Box between laps {} and {}", window.open_lap, window.close_lap);
//! ```

pub mod cache;
pub mod config;
pub mod core;
pub mod data;
pub mod engine;
pub mod error;
pub mod models;
pub mod predictor;

#[cfg(feature = "client")]
pub mod openf1;

// Re-export commonly used types
pub use cache::{CacheState, LoadMode, SessionResultCache};
pub use config::AppConfig;
pub use data::{FeatureRecord, RawSession, SessionSource};
pub use engine::{PredictionEngine, ValidationReport};
pub use error::{AppError, LookupError};
pub use models::{
    Compound, DriverPerformance, LapRecord, NextLapPrediction, PitWindow, PredictionContext,
    RaceSessionRecord, TyreLifePrediction,
};
pub use predictor::{Inference, LapTimeModel};
