//! Core strategy formulas

pub mod heuristics;

// Re-export commonly used functions
pub use heuristics::{
    detect_anomalies, next_lap_estimate, overtake_probability, pit_window, round_to,
    tyre_life_remaining,
};
