//! Session data and feature engineering modules

pub mod features;
pub mod session;

// Re-export commonly used types
pub use features::{FeatureRecord, CATEGORICAL_FEATURES, NUMERIC_FEATURES};
pub use session::{summarize_stints, EventInfo, RawSession, SessionSource, WeatherSample};
