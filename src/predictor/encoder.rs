//! Preprocessing stage of the lap-time model artifact
//!
//! Mirrors the training pipeline's column transformer: numeric columns are
//! standard-scaled, then each categorical column is one-hot encoded against
//! its training vocabulary. Values outside the vocabulary encode as an
//! all-zero block instead of failing.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::data::features::{FeatureRecord, CATEGORICAL_FEATURES, NUMERIC_FEATURES};
use crate::error::ModelError;

/// Standard scaler parameters for one numeric column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericColumn {
    pub name: String,
    pub mean: f64,
    pub scale: f64,
}

/// One-hot vocabulary for one categorical column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalColumn {
    pub name: String,
    pub categories: Vec<String>,
}

/// Fitted preprocessor, deserialized from the artifact's JSON sidecar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEncoder {
    pub numeric: Vec<NumericColumn>,
    pub categorical: Vec<CategoricalColumn>,
}

impl FeatureEncoder {
    /// Load and check a preprocessor file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ModelError::NotFound(path.to_path_buf()));
        }
        let text = fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ModelError> {
        let encoder: FeatureEncoder = serde_json::from_str(text)?;
        encoder.check_schema()?;
        Ok(encoder)
    }

    /// Reject columns the feature record cannot supply
    fn check_schema(&self) -> Result<(), ModelError> {
        if self.numeric.is_empty() && self.categorical.is_empty() {
            return Err(ModelError::Schema("preprocessor has no columns".to_string()));
        }
        for col in &self.numeric {
            if !NUMERIC_FEATURES.contains(&col.name.as_str()) {
                return Err(ModelError::Schema(format!("unknown numeric column {}", col.name)));
            }
            if !col.mean.is_finite() || !col.scale.is_finite() {
                return Err(ModelError::Schema(format!(
                    "non-finite scaler parameters for {}",
                    col.name
                )));
            }
        }
        for col in &self.categorical {
            if !CATEGORICAL_FEATURES.contains(&col.name.as_str()) {
                return Err(ModelError::Schema(format!(
                    "unknown categorical column {}",
                    col.name
                )));
            }
        }
        Ok(())
    }

    /// Length of the encoded row
    pub fn width(&self) -> usize {
        self.numeric.len() + self.categorical.iter().map(|c| c.categories.len()).sum::<usize>()
    }

    /// Encode one feature record into a dense row
    pub fn encode(&self, record: &FeatureRecord) -> Result<Vec<f32>, ModelError> {
        let mut row = Vec::with_capacity(self.width());

        for col in &self.numeric {
            let value = record
                .numeric(&col.name)
                .ok_or_else(|| ModelError::Schema(format!("missing numeric {}", col.name)))?;
            // Zero-variance columns keep unit scale
            let scale = if col.scale == 0.0 { 1.0 } else { col.scale };
            row.push(((value - col.mean) / scale) as f32);
        }

        for col in &self.categorical {
            let value = record
                .categorical(&col.name)
                .ok_or_else(|| ModelError::Schema(format!("missing categorical {}", col.name)))?;
            row.extend(
                col.categories
                    .iter()
                    .map(|category| if category == value { 1.0f32 } else { 0.0 }),
            );
        }

        Ok(row)
    }
}
