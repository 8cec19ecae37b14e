use serde::{Deserialize, Serialize};
use std::fmt;

/// Tyre compound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Compound {
    Soft,
    Medium,
    Hard,
    Intermediate,
    Wet,
}

impl Compound {
    pub const ALL: [Compound; 5] = [
        Compound::Soft,
        Compound::Medium,
        Compound::Hard,
        Compound::Intermediate,
        Compound::Wet,
    ];

    /// Parse a compound name, ignoring case and surrounding whitespace
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "SOFT" => Some(Compound::Soft),
            "MEDIUM" => Some(Compound::Medium),
            "HARD" => Some(Compound::Hard),
            "INTERMEDIATE" => Some(Compound::Intermediate),
            "WET" => Some(Compound::Wet),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Compound::Soft => "SOFT",
            Compound::Medium => "MEDIUM",
            Compound::Hard => "HARD",
            Compound::Intermediate => "INTERMEDIATE",
            Compound::Wet => "WET",
        }
    }

    /// Expected usable laps before the tyre is spent
    pub fn lap_limit(&self) -> u32 {
        match self {
            Compound::Soft => 20,
            Compound::Medium => 35,
            Compound::Hard => 50,
            Compound::Intermediate => 30,
            Compound::Wet => 25,
        }
    }

    /// Position on the dry softness scale (SOFT < MEDIUM < HARD)
    pub fn dry_rank(&self) -> Option<u8> {
        match self {
            Compound::Soft => Some(0),
            Compound::Medium => Some(1),
            Compound::Hard => Some(2),
            Compound::Intermediate | Compound::Wet => None,
        }
    }
}

impl fmt::Display for Compound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single timed lap for one driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LapRecord {
    pub driver_id: String,
    pub lap_number: u32,
    #[serde(default)]
    pub lap_duration: Option<f64>,
    #[serde(default, deserialize_with = "lenient_compound")]
    pub compound: Option<Compound>,
    #[serde(default)]
    pub tyre_life: u32,
    /// Upstream stint number, when the source reports stints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stint: Option<u32>,
}

/// Unrecognized compound names read as absent
fn lenient_compound<'de, D>(deserializer: D) -> Result<Option<Compound>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let name: Option<String> = Option::deserialize(deserializer)?;
    Ok(name.as_deref().and_then(Compound::parse))
}

/// Optional per-request context enabling the lap-time model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionContext {
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub circuit: Option<String>,
    #[serde(default)]
    pub compound: Option<String>,
    #[serde(default)]
    pub tyre_life: Option<f64>,
    #[serde(default)]
    pub lap_number: Option<f64>,
    #[serde(default)]
    pub track_temp: Option<f64>,
}

/// One classified (or retired) driver in a race
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverResult {
    pub position: Option<u32>,
    #[serde(rename = "driver")]
    pub driver_code: String,
    pub driver_number: u32,
    pub team: String,
    pub time: String,
    pub points: u32,
    pub status: String,
    pub grid_position: Option<u32>,
}

/// Decoded race result for one round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceSessionRecord {
    pub round: u32,
    pub race_name: String,
    pub country: String,
    pub location: String,
    pub circuit: String,
    pub date: String,
    pub results: Vec<DriverResult>,
    pub total_laps: Option<u32>,
}

/// Which path produced a lap-time estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionSource {
    Model,
    Heuristic,
}

/// Next-lap time prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextLapPrediction {
    pub driver_id: String,
    pub value: f64,
    pub unit: String,
    pub source: PredictionSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TyreStatus {
    Critical,
    Ok,
}

/// Remaining tyre life prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TyreLifePrediction {
    pub driver_id: String,
    pub compound: String,
    pub laps_on_tyre: u32,
    pub value: f64,
    pub status: TyreStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    High,
    Low,
}

/// Suggested pit stop window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitWindow {
    pub open_lap: i64,
    pub optimal_lap: i64,
    pub close_lap: i64,
    pub confidence: Confidence,
}

/// Overtake probability over the next few laps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OvertakePrediction {
    pub probability: f64,
}

/// Instantaneous car telemetry; missing channels read as zero
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    #[serde(default)]
    pub rpm: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub throttle: Option<f64>,
}

/// Telemetry anomaly flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anomaly {
    RpmSpeedMismatch,
    StalledOnThrottle,
}

impl Anomaly {
    pub fn label(&self) -> &'static str {
        match self {
            Anomaly::RpmSpeedMismatch => "High RPM / Low Speed Mismatch",
            Anomaly::StalledOnThrottle => "Stalled on Throttle",
        }
    }
}

impl Serialize for Anomaly {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Stint summary: contiguous laps on one set of tyres
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stint {
    pub stint_number: u32,
    pub compound: Option<Compound>,
    pub start_lap: u32,
    pub end_lap: u32,
    pub lap_count: u32,
}

/// Per-driver race performance drill-down
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverPerformance {
    pub driver: String,
    pub round: u32,
    pub fastest_lap: Option<f64>,
    pub average_lap: Option<f64>,
    pub total_laps: u32,
    pub stints: Vec<Stint>,
    pub finish_position: Option<u32>,
}

/// Next-lap prediction request
#[derive(Debug, Clone, Deserialize)]
pub struct LapTimeRequest {
    pub driver_id: String,
    #[serde(default)]
    pub recent_laps: Vec<LapRecord>,
    #[serde(default)]
    pub context: Option<PredictionContext>,
}

/// Tyre life query parameters
#[derive(Debug, Clone, Deserialize)]
pub struct TyreLifeQuery {
    pub driver_id: String,
    pub compound: String,
    pub laps_on_tyre: u32,
}

/// Pit window query parameters
#[derive(Debug, Clone, Deserialize)]
pub struct PitWindowQuery {
    pub driver_id: String,
    pub current_lap: u32,
    pub total_laps: u32,
}

/// Overtake query parameters
#[derive(Debug, Clone, Deserialize)]
pub struct OvertakeQuery {
    pub gap: f64,
    pub driver_compound: String,
    pub target_compound: String,
}

/// Telemetry anomaly response
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyResponse {
    pub anomalies: Vec<Anomaly>,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model_loaded: bool,
    pub cache_state: String,
    pub cache_mode: String,
    pub cached_rounds: Vec<u32>,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
