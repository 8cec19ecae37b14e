//! Closed-form race strategy heuristics
//!
//! Every function here is total: any numeric input yields a defined,
//! rounded value.
//!
//! Tyre wear follows a super-linear curve:
//!     wear      = (laps_on_tyre / limit)^1.5 * 100
//!     remaining = max(0, 100 - wear)
//!
//! Where:
//!     limit = expected usable laps for the compound (30 when unknown)

use rand::Rng;

use crate::models::{Anomaly, Compound, Confidence, LapRecord, PitWindow, TelemetrySnapshot};

/// Baseline lap time when no lap durations are known
pub const DEFAULT_LAP_TIME: f64 = 90.0;
/// Half-width of the random perturbation added to the lap-time estimate
pub const LAP_TIME_JITTER: f64 = 0.2;
/// Number of trailing laps averaged for the lap-time estimate
pub const RECENT_LAP_WINDOW: usize = 3;
/// Lap limit applied to compounds without a known limit
pub const DEFAULT_LAP_LIMIT: u32 = 30;
/// Exponent of the tyre wear curve
pub const TYRE_WEAR_EXPONENT: f64 = 1.5;
/// Distance from the ideal pit lap beyond which confidence drops
pub const PIT_CONFIDENCE_SPAN: i64 = 10;
/// Laps either side of the ideal pit lap
pub const PIT_WINDOW_HALF_WIDTH: i64 = 2;
/// Probability bonus for being on the softer compound
pub const SOFTER_TYRE_BONUS: f64 = 0.15;
/// Overtake probability ceiling
pub const MAX_OVERTAKE_PROBABILITY: f64 = 0.99;

/// Round to a fixed number of decimal places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Estimate the next lap time from the trailing laps
///
/// Averages the known durations among the last three lap records and adds a
/// uniform perturbation in [-0.2, 0.2] seconds. Returns exactly 90.0 when
/// none of those laps carries a duration.
pub fn next_lap_estimate<R: Rng>(laps: &[LapRecord], rng: &mut R) -> f64 {
    let start = laps.len().saturating_sub(RECENT_LAP_WINDOW);
    let recent: Vec<f64> = laps[start..]
        .iter()
        .filter_map(|lap| lap.lap_duration)
        .filter(|d| d.is_finite() && *d > 0.0)
        .collect();

    if recent.is_empty() {
        return DEFAULT_LAP_TIME;
    }

    let avg = recent.iter().sum::<f64>() / recent.len() as f64;
    let jitter = rng.random_range(-LAP_TIME_JITTER..=LAP_TIME_JITTER);
    round_to(avg + jitter, 3)
}

/// Lap limit for a compound name
pub fn lap_limit(compound: &str) -> u32 {
    Compound::parse(compound)
        .map(|c| c.lap_limit())
        .unwrap_or(DEFAULT_LAP_LIMIT)
}

/// Remaining tyre life percentage (0-100)
///
/// # Examples
/// ```
/// use stratx::core::heuristics::tyre_life_remaining;
/// assert_eq!(tyre_life_remaining("SOFT", 0), 100.0);
/// assert_eq!(tyre_life_remaining("SOFT", 20), 0.0);
/// ```
pub fn tyre_life_remaining(compound: &str, laps_on_tyre: u32) -> f64 {
    let limit = lap_limit(compound) as f64;
    let wear = (laps_on_tyre as f64 / limit).powf(TYRE_WEAR_EXPONENT) * 100.0;
    round_to(100.0 - wear, 1).max(0.0)
}

/// Pit window centred on half race distance
pub fn pit_window(current_lap: u32, total_laps: u32) -> PitWindow {
    let ideal = (total_laps / 2) as i64;

    let confidence = if (current_lap as i64 - ideal).abs() > PIT_CONFIDENCE_SPAN {
        Confidence::Low
    } else {
        Confidence::High
    };

    PitWindow {
        open_lap: ideal - PIT_WINDOW_HALF_WIDTH,
        optimal_lap: ideal,
        close_lap: ideal + PIT_WINDOW_HALF_WIDTH,
        confidence,
    }
}

/// Base probability from the gap to the car ahead
fn gap_probability(gap: f64) -> f64 {
    if gap < 0.5 {
        0.85
    } else if gap < 1.0 {
        0.60
    } else if gap < 1.5 {
        0.30
    } else {
        0.05
    }
}

/// Probability of completing an overtake within the next few laps
///
/// An unrecognised compound on either side only disables the softer-tyre
/// bonus.
pub fn overtake_probability(gap: f64, driver_compound: &str, target_compound: &str) -> f64 {
    let mut prob = gap_probability(gap);

    let driver_rank = Compound::parse(driver_compound).and_then(|c| c.dry_rank());
    let target_rank = Compound::parse(target_compound).and_then(|c| c.dry_rank());
    if let (Some(d), Some(t)) = (driver_rank, target_rank) {
        if d < t {
            prob += SOFTER_TYRE_BONUS;
        }
    }

    round_to(prob, 2).min(MAX_OVERTAKE_PROBABILITY)
}

/// Flag mechanical or data anomalies in a telemetry snapshot
pub fn detect_anomalies(telemetry: &TelemetrySnapshot) -> Vec<Anomaly> {
    let rpm = telemetry.rpm.unwrap_or(0.0);
    let speed = telemetry.speed.unwrap_or(0.0);
    let throttle = telemetry.throttle.unwrap_or(0.0);

    let mut anomalies = Vec::new();
    if rpm > 13000.0 && speed < 50.0 {
        anomalies.push(Anomaly::RpmSpeedMismatch);
    }
    if throttle > 90.0 && speed == 0.0 {
        anomalies.push(Anomaly::StalledOnThrottle);
    }
    anomalies
}
