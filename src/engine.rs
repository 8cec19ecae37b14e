//! Prediction engine
//!
//! Decides per call whether the lap-time model or the heuristic library
//! answers, and shapes every estimate into its response type. Only the
//! next-lap estimate has a trained model; every other estimate is heuristic.

use rand::Rng;
use serde::Serialize;
use tracing::debug;

use crate::core::heuristics;
use crate::core::round_to;
use crate::data::features::FeatureRecord;
use crate::data::session::RawSession;
use crate::models::{
    Anomaly, LapRecord, NextLapPrediction, OvertakePrediction, PitWindow, PredictionContext,
    PredictionSource, TelemetrySnapshot, TyreLifePrediction, TyreStatus,
};
use crate::predictor::{Inference, LapTimeModel};

/// Remaining tyre life below which the status turns critical
pub const CRITICAL_TYRE_LIFE: f64 = 20.0;

/// Orchestrates the lap-time model and the heuristic library
pub struct PredictionEngine {
    model: LapTimeModel,
}

impl PredictionEngine {
    pub fn new(model: LapTimeModel) -> Self {
        Self { model }
    }

    /// Engine that always answers from heuristics
    pub fn heuristic_only() -> Self {
        Self::new(LapTimeModel::unloaded())
    }

    pub fn model_loaded(&self) -> bool {
        self.model.is_loaded()
    }

    /// Predict the driver's next lap time
    pub fn predict_next_lap(
        &self,
        driver_id: &str,
        recent_laps: &[LapRecord],
        context: Option<&PredictionContext>,
    ) -> NextLapPrediction {
        self.predict_next_lap_with_rng(driver_id, recent_laps, context, &mut rand::rng())
    }

    /// Predict the next lap time with an explicit source for the heuristic jitter
    pub fn predict_next_lap_with_rng<R: Rng>(
        &self,
        driver_id: &str,
        recent_laps: &[LapRecord],
        context: Option<&PredictionContext>,
        rng: &mut R,
    ) -> NextLapPrediction {
        let model_value = match context {
            Some(ctx) if self.model.is_loaded() => {
                match self.model.infer(&FeatureRecord::from_context(driver_id, ctx)) {
                    Inference::Value(value) => Some(value),
                    Inference::Fallback(signal) => {
                        debug!("Falling back to heuristic for {}: {:?}", driver_id, signal);
                        None
                    }
                }
            }
            _ => None,
        };

        let (value, source) = match model_value {
            Some(value) => (value, PredictionSource::Model),
            None => (
                heuristics::next_lap_estimate(recent_laps, rng),
                PredictionSource::Heuristic,
            ),
        };

        NextLapPrediction {
            driver_id: driver_id.to_string(),
            value,
            unit: "seconds".to_string(),
            source,
        }
    }

    /// Remaining tyre life for the current stint
    pub fn predict_tyre_life(
        &self,
        driver_id: &str,
        compound: &str,
        laps_on_tyre: u32,
    ) -> TyreLifePrediction {
        let value = heuristics::tyre_life_remaining(compound, laps_on_tyre);
        TyreLifePrediction {
            driver_id: driver_id.to_string(),
            compound: compound.trim().to_ascii_uppercase(),
            laps_on_tyre,
            value,
            status: if value < CRITICAL_TYRE_LIFE {
                TyreStatus::Critical
            } else {
                TyreStatus::Ok
            },
        }
    }

    /// Pit stop window recommendation
    pub fn predict_pit_window(&self, driver_id: &str, current_lap: u32, total_laps: u32) -> PitWindow {
        let window = heuristics::pit_window(current_lap, total_laps);
        debug!(
            "Pit window for {} at lap {}/{}: {:?}",
            driver_id, current_lap, total_laps, window
        );
        window
    }

    /// Overtake probability against the car ahead
    pub fn predict_overtake(
        &self,
        gap: f64,
        driver_compound: &str,
        target_compound: &str,
    ) -> OvertakePrediction {
        OvertakePrediction {
            probability: heuristics::overtake_probability(gap, driver_compound, target_compound),
        }
    }

    /// Telemetry anomaly flags
    pub fn detect_anomalies(&self, telemetry: &TelemetrySnapshot) -> Vec<Anomaly> {
        heuristics::detect_anomalies(telemetry)
    }

    /// Score the lap-time predictions against a completed session
    ///
    /// Each timed lap of the top `top_n` classified drivers is predicted with
    /// a context built from the session itself and compared to the actual
    /// lap time.
    pub fn evaluate_session(&self, session: &RawSession, top_n: usize) -> ValidationReport {
        let mut rng = rand::rng();
        let mut drivers = Vec::new();
        let mut error_sum = 0.0;

        for result in session.results.iter().filter(|r| r.position.is_some()).take(top_n) {
            let code = result.driver_code.as_str();
            let laps = session.laps_for(code);
            let mut errors = Vec::new();
            let mut model_laps = 0;

            for (i, lap) in laps.iter().enumerate() {
                let actual = match lap.lap_duration {
                    Some(d) if d.is_finite() && d > 0.0 => d,
                    _ => continue,
                };
                let context = session.prediction_context(code, Some(*lap));
                let history: Vec<LapRecord> = laps[..i].iter().map(|l| (*l).clone()).collect();
                let prediction =
                    self.predict_next_lap_with_rng(code, &history, Some(&context), &mut rng);
                if prediction.source == PredictionSource::Model {
                    model_laps += 1;
                }
                errors.push((prediction.value - actual).abs());
            }

            error_sum += errors.iter().sum::<f64>();
            drivers.push(DriverValidation {
                driver: code.to_string(),
                laps: errors.len(),
                model_laps,
                mean_absolute_error: mean(&errors).map(|m| round_to(m, 3)),
            });
        }

        let total_laps: usize = drivers.iter().map(|d| d.laps).sum();
        let mean_absolute_error = if total_laps > 0 {
            Some(round_to(error_sum / total_laps as f64, 3))
        } else {
            None
        };

        ValidationReport {
            round: session.round,
            race_name: session.event.name.clone(),
            model_loaded: self.model.is_loaded(),
            drivers,
            laps: total_laps,
            mean_absolute_error,
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Per-driver lap-time prediction error
#[derive(Debug, Clone, Serialize)]
pub struct DriverValidation {
    pub driver: String,
    pub laps: usize,
    pub model_laps: usize,
    pub mean_absolute_error: Option<f64>,
}

/// Lap-time prediction error over one historical session
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub round: u32,
    pub race_name: String,
    pub model_loaded: bool,
    pub drivers: Vec<DriverValidation>,
    pub laps: usize,
    pub mean_absolute_error: Option<f64>,
}
