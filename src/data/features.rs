//! Feature Engineering
//!
//! Builds the fixed feature record the lap-time model was trained on:
//! Driver, Team, Circuit, Compound (categorical) and TyreLife, LapNumber,
//! TrackTemp (numeric). Missing context fields fall back to defaults, so
//! encoding never fails.

use serde::{Deserialize, Serialize};

use crate::models::PredictionContext;

pub const DEFAULT_TEAM: &str = "Unknown";
pub const DEFAULT_CIRCUIT: &str = "Unknown";
pub const DEFAULT_COMPOUND: &str = "SOFT";
pub const DEFAULT_TYRE_LIFE: f64 = 1.0;
pub const DEFAULT_LAP_NUMBER: f64 = 1.0;
pub const DEFAULT_TRACK_TEMP: f64 = 30.0;

/// Categorical columns, in training order
pub const CATEGORICAL_FEATURES: [&str; 4] = ["Driver", "Team", "Circuit", "Compound"];
/// Numeric columns, in training order
pub const NUMERIC_FEATURES: [&str; 3] = ["TyreLife", "LapNumber", "TrackTemp"];

/// Single-row model input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FeatureRecord {
    pub driver: String,
    pub team: String,
    pub circuit: String,
    pub compound: String,
    pub tyre_life: f64,
    pub lap_number: f64,
    pub track_temp: f64,
}

impl FeatureRecord {
    /// Build a record from a driver and prediction context, applying defaults
    pub fn from_context(driver_id: &str, context: &PredictionContext) -> Self {
        Self {
            driver: driver_id.to_string(),
            team: non_empty(context.team.as_deref()).unwrap_or(DEFAULT_TEAM).to_string(),
            circuit: non_empty(context.circuit.as_deref())
                .unwrap_or(DEFAULT_CIRCUIT)
                .to_string(),
            compound: non_empty(context.compound.as_deref())
                .map(|c| c.trim().to_ascii_uppercase())
                .unwrap_or_else(|| DEFAULT_COMPOUND.to_string()),
            tyre_life: finite_or(context.tyre_life, DEFAULT_TYRE_LIFE),
            lap_number: finite_or(context.lap_number, DEFAULT_LAP_NUMBER),
            track_temp: finite_or(context.track_temp, DEFAULT_TRACK_TEMP),
        }
    }

    /// Categorical value by column name
    pub fn categorical(&self, name: &str) -> Option<&str> {
        match name {
            "Driver" => Some(&self.driver),
            "Team" => Some(&self.team),
            "Circuit" => Some(&self.circuit),
            "Compound" => Some(&self.compound),
            _ => None,
        }
    }

    /// Numeric value by column name
    pub fn numeric(&self, name: &str) -> Option<f64> {
        match name {
            "TyreLife" => Some(self.tyre_life),
            "LapNumber" => Some(self.lap_number),
            "TrackTemp" => Some(self.track_temp),
            _ => None,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn finite_or(value: Option<f64>, default: f64) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(default)
}
