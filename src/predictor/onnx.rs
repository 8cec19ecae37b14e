use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use parking_lot::Mutex;
use std::path::Path;
use tracing::info;

use super::Regressor;
use crate::error::ModelError;

/// Name of the dense input the exported regressor expects
const INPUT_NAME: &str = "input";

/// ONNX Runtime regressor taking one encoded row of shape `[1, width]`
pub struct OnnxRegressor {
    session: Mutex<Session>,
}

fn backend<E: std::fmt::Display>(err: E) -> ModelError {
    ModelError::Backend(err.to_string())
}

impl OnnxRegressor {
    /// Load the regressor graph from an ONNX file
    pub fn load<P: AsRef<Path>>(model_path: P) -> Result<Self, ModelError> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            return Err(ModelError::NotFound(model_path.to_path_buf()));
        }
        info!("Loading model: {:?}", model_path);

        let session = Session::builder()
            .map_err(backend)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(backend)?
            .commit_from_file(model_path)
            .map_err(backend)?;

        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl Regressor for OnnxRegressor {
    fn predict(&self, row: &[f32]) -> Result<f32, ModelError> {
        let input_tensor = Tensor::from_array(([1usize, row.len()], row.to_vec())).map_err(backend)?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![INPUT_NAME => input_tensor])
            .map_err(backend)?;

        let (_, output_data) = outputs[0].try_extract_tensor::<f32>().map_err(backend)?;
        let value = output_data.first().copied();
        value.ok_or_else(|| ModelError::Backend("model returned an empty tensor".to_string()))
    }
}
