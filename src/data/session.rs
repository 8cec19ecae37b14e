//! Raw race session handle and the source contract used to fetch it
//!
//! A [`RawSession`] is everything the upstream client decoded for one race:
//! event metadata, classification, every lap of every driver, and the
//! weather series. The session cache keeps one per round for drill-down
//! queries and derives the summary [`RaceSessionRecord`] from it.

use serde::{Deserialize, Serialize};
use std::future::Future;

use crate::core::round_to;
use crate::models::{
    Compound, DriverPerformance, DriverResult, LapRecord, PredictionContext, RaceSessionRecord,
    Stint,
};

/// Race event metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventInfo {
    pub name: String,
    pub official_name: String,
    pub country: String,
    pub location: String,
    pub date: String,
}

/// One weather reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSample {
    pub track_temp: Option<f64>,
    pub air_temp: Option<f64>,
}

/// Fully decoded race session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSession {
    pub season: u16,
    pub round: u32,
    pub event: EventInfo,
    pub results: Vec<DriverResult>,
    pub laps: Vec<LapRecord>,
    pub weather: Vec<WeatherSample>,
    pub total_laps: Option<u32>,
}

/// Upstream provider of race sessions
///
/// Implementations make a single attempt per call; retrying is never the
/// source's job.
pub trait SessionSource: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn fetch_session(
        &self,
        season: u16,
        round: u32,
    ) -> impl Future<Output = Result<RawSession, Self::Error>> + Send;
}

impl RawSession {
    /// Check the session carries a usable classification
    pub fn validate(&self) -> Result<(), String> {
        if self.results.is_empty() {
            return Err("session has no results".to_string());
        }
        if let Some(row) = self.results.iter().find(|r| r.driver_code.trim().is_empty()) {
            return Err(format!(
                "result row for car {} has no driver code",
                row.driver_number
            ));
        }
        Ok(())
    }

    /// Summary record served to result queries
    pub fn to_record(&self) -> RaceSessionRecord {
        RaceSessionRecord {
            round: self.round,
            race_name: self.event.name.clone(),
            country: self.event.country.clone(),
            location: self.event.location.clone(),
            circuit: self.event.official_name.clone(),
            date: self.event.date.clone(),
            results: self.results.clone(),
            total_laps: self.total_laps,
        }
    }

    /// Laps for one driver, ordered by lap number
    pub fn laps_for(&self, driver_code: &str) -> Vec<&LapRecord> {
        let mut laps: Vec<&LapRecord> = self
            .laps
            .iter()
            .filter(|lap| lap.driver_id.eq_ignore_ascii_case(driver_code))
            .collect();
        laps.sort_by_key(|lap| lap.lap_number);
        laps
    }

    /// Result row for one driver
    pub fn result_for(&self, driver_code: &str) -> Option<&DriverResult> {
        self.results
            .iter()
            .find(|r| r.driver_code.eq_ignore_ascii_case(driver_code))
    }

    /// Mean track temperature over the session
    pub fn mean_track_temp(&self) -> Option<f64> {
        let temps: Vec<f64> = self
            .weather
            .iter()
            .filter_map(|w| w.track_temp)
            .filter(|t| t.is_finite())
            .collect();
        if temps.is_empty() {
            None
        } else {
            Some(temps.iter().sum::<f64>() / temps.len() as f64)
        }
    }

    /// Model context for a driver at a given lap
    pub fn prediction_context(&self, driver_code: &str, lap: Option<&LapRecord>) -> PredictionContext {
        PredictionContext {
            team: self.result_for(driver_code).map(|r| r.team.clone()),
            circuit: Some(self.event.name.clone()).filter(|c| !c.is_empty()),
            compound: lap.and_then(|l| l.compound).map(|c| c.as_str().to_string()),
            tyre_life: lap.map(|l| l.tyre_life as f64),
            lap_number: lap.map(|l| l.lap_number as f64),
            track_temp: self.mean_track_temp(),
        }
    }

    /// Lap and stint drill-down for one driver
    ///
    /// Returns `None` when the driver has no laps in this session.
    pub fn driver_performance(&self, driver_code: &str) -> Option<DriverPerformance> {
        let laps = self.laps_for(driver_code);
        if laps.is_empty() {
            return None;
        }

        let durations: Vec<f64> = laps
            .iter()
            .filter_map(|l| l.lap_duration)
            .filter(|d| d.is_finite() && *d > 0.0)
            .collect();
        let fastest_lap = durations.iter().copied().fold(None, |best: Option<f64>, d| {
            Some(best.map_or(d, |b| b.min(d)))
        });
        let average_lap = if durations.is_empty() {
            None
        } else {
            Some(round_to(
                durations.iter().sum::<f64>() / durations.len() as f64,
                3,
            ))
        };

        Some(DriverPerformance {
            driver: laps[0].driver_id.clone(),
            round: self.round,
            fastest_lap,
            average_lap,
            total_laps: laps.len() as u32,
            stints: summarize_stints(&laps),
            finish_position: self.result_for(driver_code).and_then(|r| r.position),
        })
    }
}

/// Group ordered laps into stints
///
/// Laps tagged with an upstream stint number are grouped by that number, and
/// untagged laps among them belong to no stint. Without any tags, a new stint
/// begins when the compound changes or the tyre-life counter drops.
pub fn summarize_stints(laps: &[&LapRecord]) -> Vec<Stint> {
    if laps.iter().any(|lap| lap.stint.is_some()) {
        return numbered_stints(laps);
    }

    let mut stints: Vec<Stint> = Vec::new();
    let mut last: Option<(Option<Compound>, u32)> = None;

    for lap in laps {
        let starts_new = match last {
            None => true,
            Some((compound, tyre_life)) => compound != lap.compound || lap.tyre_life < tyre_life,
        };

        if starts_new {
            let number = stints.len() as u32 + 1;
            stints.push(open_stint(number, lap));
        } else if let Some(current) = stints.last_mut() {
            extend_stint(current, lap);
        }

        last = Some((lap.compound, lap.tyre_life));
    }

    stints
}

fn numbered_stints(laps: &[&LapRecord]) -> Vec<Stint> {
    let mut stints: Vec<Stint> = Vec::new();

    for lap in laps {
        let Some(number) = lap.stint else {
            continue;
        };
        match stints.last_mut() {
            Some(current) if current.stint_number == number => extend_stint(current, lap),
            _ => stints.push(open_stint(number, lap)),
        }
    }

    stints
}

fn open_stint(stint_number: u32, lap: &LapRecord) -> Stint {
    Stint {
        stint_number,
        compound: lap.compound,
        start_lap: lap.lap_number,
        end_lap: lap.lap_number,
        lap_count: 1,
    }
}

fn extend_stint(stint: &mut Stint, lap: &LapRecord) {
    stint.end_lap = lap.lap_number;
    stint.lap_count += 1;
}
