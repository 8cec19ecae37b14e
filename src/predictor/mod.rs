//! Lap-time model adapter
//!
//! Owns the deserialized regression artifact (preprocessor + regressor) and
//! exposes a single inference call. The adapter is either `Unloaded` or
//! `Loaded`, decided once at construction; no failure ever escapes it, every
//! problem becomes an [`Inference::Fallback`].

mod encoder;
#[cfg(feature = "onnx")]
mod onnx;

pub use encoder::{CategoricalColumn, FeatureEncoder, NumericColumn};
#[cfg(feature = "onnx")]
pub use onnx::OnnxRegressor;

use std::path::Path;
use tracing::{debug, info, warn};

use crate::core::round_to;
use crate::data::features::FeatureRecord;
use crate::error::ModelError;

/// Preprocessor sidecar file inside the model directory
pub const PREPROCESSOR_FILE: &str = "lap_time_preprocessor.json";
/// Regressor graph file inside the model directory
pub const MODEL_FILE: &str = "lap_time_model.onnx";

/// Fitted regressor taking one encoded feature row
pub trait Regressor: Send + Sync {
    fn predict(&self, row: &[f32]) -> Result<f32, ModelError>;
}

/// Why the model path did not produce a value
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackSignal {
    /// No artifact was loaded
    ModelUnavailable,
    /// Encoding or inference failed for this call
    InferenceFailed(String),
}

/// Result of a single model inference
#[derive(Debug, Clone, PartialEq)]
pub enum Inference {
    Value(f64),
    Fallback(FallbackSignal),
}

struct LoadedModel {
    encoder: FeatureEncoder,
    regressor: Box<dyn Regressor>,
}

impl LoadedModel {
    fn predict(&self, features: &FeatureRecord) -> Result<f64, ModelError> {
        let row = self.encoder.encode(features)?;
        let value = self.regressor.predict(&row)?;
        if !value.is_finite() {
            return Err(ModelError::NonFinite(value));
        }
        Ok(value as f64)
    }
}

enum ModelState {
    Unloaded,
    Loaded(LoadedModel),
}

/// Lap-time regression model with heuristic fallback signalling
pub struct LapTimeModel {
    state: ModelState,
}

impl LapTimeModel {
    /// Load the artifact from `model_dir`, staying unloaded on any error
    pub fn load<P: AsRef<Path>>(model_dir: P) -> Self {
        let model_dir = model_dir.as_ref();
        info!("Loading lap-time model from {:?}", model_dir);

        match Self::try_load(model_dir) {
            Ok(loaded) => {
                info!(
                    "Lap-time model loaded ({} encoded features)",
                    loaded.encoder.width()
                );
                Self {
                    state: ModelState::Loaded(loaded),
                }
            }
            Err(e) => {
                warn!("Lap-time model unavailable: {}. Using heuristics.", e);
                Self::unloaded()
            }
        }
    }

    fn try_load(model_dir: &Path) -> Result<LoadedModel, ModelError> {
        let encoder = FeatureEncoder::from_json_file(model_dir.join(PREPROCESSOR_FILE))?;
        let regressor = open_regressor(&model_dir.join(MODEL_FILE))?;
        Ok(LoadedModel { encoder, regressor })
    }

    /// Adapter with no artifact
    pub fn unloaded() -> Self {
        Self {
            state: ModelState::Unloaded,
        }
    }

    /// Adapter over an already constructed preprocessor and regressor
    pub fn from_parts(encoder: FeatureEncoder, regressor: Box<dyn Regressor>) -> Self {
        Self {
            state: ModelState::Loaded(LoadedModel { encoder, regressor }),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, ModelState::Loaded(_))
    }

    /// Run the model on one feature record
    pub fn infer(&self, features: &FeatureRecord) -> Inference {
        let model = match &self.state {
            ModelState::Unloaded => return Inference::Fallback(FallbackSignal::ModelUnavailable),
            ModelState::Loaded(model) => model,
        };

        match model.predict(features) {
            Ok(value) => {
                debug!("Model predicted {:.3}s for {}", value, features.driver);
                Inference::Value(round_to(value, 3))
            }
            Err(e) => {
                warn!("Lap-time inference failed for {}: {}", features.driver, e);
                Inference::Fallback(FallbackSignal::InferenceFailed(e.to_string()))
            }
        }
    }
}

#[cfg(feature = "onnx")]
fn open_regressor(path: &Path) -> Result<Box<dyn Regressor>, ModelError> {
    Ok(Box::new(OnnxRegressor::load(path)?))
}

#[cfg(not(feature = "onnx"))]
fn open_regressor(path: &Path) -> Result<Box<dyn Regressor>, ModelError> {
    if !path.exists() {
        return Err(ModelError::NotFound(path.to_path_buf()));
    }
    Err(ModelError::BackendDisabled)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::PredictionContext;
    use std::fs;

    /// Linear regressor over the encoded row
    pub(crate) struct LinearRegressor {
        pub bias: f32,
        pub weights: Vec<f32>,
    }

    impl Regressor for LinearRegressor {
        fn predict(&self, row: &[f32]) -> Result<f32, ModelError> {
            if row.len() != self.weights.len() {
                return Err(ModelError::Width {
                    expected: self.weights.len(),
                    actual: row.len(),
                });
            }
            Ok(self.bias + row.iter().zip(&self.weights).map(|(x, w)| x * w).sum::<f32>())
        }
    }

    struct NanRegressor;

    impl Regressor for NanRegressor {
        fn predict(&self, _row: &[f32]) -> Result<f32, ModelError> {
            Ok(f32::NAN)
        }
    }

    pub(crate) fn sample_encoder() -> FeatureEncoder {
        FeatureEncoder::from_json_str(encoder::tests::SAMPLE_PREPROCESSOR).unwrap()
    }

    pub(crate) fn sample_model(bias: f32) -> LapTimeModel {
        let encoder = sample_encoder();
        let width = encoder.width();
        LapTimeModel::from_parts(
            encoder,
            Box::new(LinearRegressor {
                bias,
                weights: vec![0.0; width],
            }),
        )
    }

    fn features() -> FeatureRecord {
        FeatureRecord::from_context("VER", &PredictionContext::default())
    }

    #[test]
    fn test_unloaded_always_falls_back() {
        let model = LapTimeModel::unloaded();
        assert!(!model.is_loaded());
        for driver in ["VER", "", "???"] {
            let record = FeatureRecord::from_context(driver, &PredictionContext::default());
            assert_eq!(
                model.infer(&record),
                Inference::Fallback(FallbackSignal::ModelUnavailable)
            );
        }
    }

    #[test]
    fn test_loaded_rounds_to_millis() {
        let model = sample_model(91.23456);
        assert!(model.is_loaded());
        assert_eq!(model.infer(&features()), Inference::Value(91.235));
    }

    #[test]
    fn test_width_mismatch_falls_back() {
        let model = LapTimeModel::from_parts(
            sample_encoder(),
            Box::new(LinearRegressor {
                bias: 90.0,
                weights: vec![0.0; 4],
            }),
        );
        assert!(matches!(
            model.infer(&features()),
            Inference::Fallback(FallbackSignal::InferenceFailed(_))
        ));
    }

    #[test]
    fn test_non_finite_output_falls_back() {
        let model = LapTimeModel::from_parts(sample_encoder(), Box::new(NanRegressor));
        assert!(matches!(
            model.infer(&features()),
            Inference::Fallback(FallbackSignal::InferenceFailed(_))
        ));
    }

    #[test]
    fn test_load_missing_directory_stays_unloaded() {
        let dir = tempfile::tempdir().unwrap();
        let model = LapTimeModel::load(dir.path().join("missing"));
        assert!(!model.is_loaded());
    }

    #[test]
    fn test_load_corrupt_artifact_stays_unloaded() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(PREPROCESSOR_FILE), "{ not json").unwrap();
        fs::write(dir.path().join(MODEL_FILE), b"garbage").unwrap();
        let model = LapTimeModel::load(dir.path());
        assert!(!model.is_loaded());
        assert_eq!(
            model.infer(&features()),
            Inference::Fallback(FallbackSignal::ModelUnavailable)
        );
    }

    #[test]
    fn test_load_valid_preprocessor_with_corrupt_graph_stays_unloaded() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(PREPROCESSOR_FILE),
            encoder::tests::SAMPLE_PREPROCESSOR,
        )
        .unwrap();
        fs::write(dir.path().join(MODEL_FILE), b"not an onnx graph").unwrap();
        assert!(!LapTimeModel::load(dir.path()).is_loaded());
    }
}
