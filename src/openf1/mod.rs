//! OpenF1 session source
//!
//! Fetches race sessions from the public OpenF1 REST API and decodes them
//! into [`RawSession`]s. Round `N` of a season is the `N`-th `Race` session of
//! that year ordered by start time.
//!
//! # Example
//!
//! ```no_run
//! use stratx::openf1::{ClientConfig, OpenF1Client};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = OpenF1Client::new(ClientConfig::default())?;
//!
//!     let session = client.fetch_race(2025, 1).await?;
//!     println!("{}: {} classified", session.event.name, session.results.len());
//!
//!     Ok(())
//! }
//! ```

mod client;

pub use client::{ClientConfig, ClientError, OpenF1Client};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::data::session::{EventInfo, RawSession, WeatherSample};
use crate::models::{Compound, DriverResult, LapRecord};

/// Row of `/sessions`
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSession {
    pub session_key: u64,
    pub meeting_key: u64,
    #[serde(default)]
    pub session_name: String,
    pub date_start: String,
    #[serde(default)]
    pub country_name: String,
    #[serde(default)]
    pub circuit_short_name: String,
}

impl ApiSession {
    /// Calendar date of the session start
    pub fn date(&self) -> String {
        event_date(&self.date_start)
    }

    /// Whether the session had started at `now`; unparseable starts count as not started
    pub fn started_by(&self, now: DateTime<Utc>) -> bool {
        DateTime::parse_from_rfc3339(&self.date_start).is_ok_and(|start| start <= now)
    }
}

/// Row of `/meetings`
#[derive(Debug, Clone, Deserialize)]
pub struct ApiMeeting {
    pub meeting_key: u64,
    #[serde(default)]
    pub meeting_name: String,
    #[serde(default)]
    pub meeting_official_name: String,
    #[serde(default)]
    pub country_name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub date_start: String,
}

/// Row of `/drivers`
#[derive(Debug, Clone, Deserialize)]
pub struct ApiDriver {
    pub driver_number: u32,
    #[serde(default)]
    pub name_acronym: Option<String>,
    #[serde(default)]
    pub team_name: Option<String>,
}

/// Row of `/session_result`
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSessionResult {
    pub driver_number: u32,
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default)]
    pub number_of_laps: Option<u32>,
    #[serde(default)]
    pub points: Option<f64>,
    #[serde(default)]
    pub dnf: bool,
    #[serde(default)]
    pub dns: bool,
    #[serde(default)]
    pub dsq: bool,
    /// Seconds for races; an array per segment for qualifying
    #[serde(default)]
    pub duration: Value,
    /// Seconds behind the winner, or a string such as `+1 LAP`
    #[serde(default)]
    pub gap_to_leader: Value,
}

/// Row of `/laps`
#[derive(Debug, Clone, Deserialize)]
pub struct ApiLap {
    pub driver_number: u32,
    pub lap_number: u32,
    #[serde(default)]
    pub lap_duration: Option<f64>,
}

/// Row of `/stints`
#[derive(Debug, Clone, Deserialize)]
pub struct ApiStint {
    pub driver_number: u32,
    #[serde(default)]
    pub stint_number: u32,
    #[serde(default)]
    pub compound: Option<String>,
    pub lap_start: Option<u32>,
    pub lap_end: Option<u32>,
    #[serde(default)]
    pub tyre_age_at_start: Option<u32>,
}

/// Row of `/weather`
#[derive(Debug, Clone, Deserialize)]
pub struct ApiWeather {
    #[serde(default)]
    pub track_temperature: Option<f64>,
    #[serde(default)]
    pub air_temperature: Option<f64>,
}

/// Everything fetched for one race session
#[derive(Debug, Clone, Default)]
pub struct SessionPayload {
    pub meeting: Option<ApiMeeting>,
    pub results: Vec<ApiSessionResult>,
    pub drivers: Vec<ApiDriver>,
    pub laps: Vec<ApiLap>,
    pub stints: Vec<ApiStint>,
    pub weather: Vec<ApiWeather>,
}

/// Seconds from a number, or from the last entry of a per-segment array
fn seconds(value: &Value) -> Option<f64> {
    let secs = match value {
        Value::Number(n) => n.as_f64(),
        Value::Array(items) => items.iter().rev().find_map(|v| v.as_f64()),
        _ => None,
    };
    secs.filter(|s| s.is_finite())
}

/// Format a race duration as `H:MM:SS.mmm`
pub fn format_race_time(total_seconds: f64) -> String {
    let millis = (total_seconds * 1000.0).round().max(0.0) as u64;
    let hours = millis / 3_600_000;
    let minutes = (millis / 60_000) % 60;
    let secs = (millis / 1000) % 60;
    format!("{}:{:02}:{:02}.{:03}", hours, minutes, secs, millis % 1000)
}

/// Format the gap to the winner
pub fn format_gap(gap: &Value) -> Option<String> {
    match gap {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        other => seconds(other).map(|s| format!("+{:.3}s", s)),
    }
}

/// Classification status of one result row
pub fn result_status(row: &ApiSessionResult) -> &'static str {
    if row.dsq {
        "DSQ"
    } else if row.dns {
        "DNS"
    } else if row.dnf {
        "DNF"
    } else if matches!(&row.gap_to_leader, Value::String(s) if s.to_ascii_uppercase().contains("LAP"))
    {
        "Lapped"
    } else {
        "Finished"
    }
}

/// Tyre set a lap was driven on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LapTyre {
    /// Upstream stint number; `None` when no stint covers the lap
    pub stint: Option<u32>,
    pub compound: Option<Compound>,
    pub age: u32,
}

/// Stint, compound and tyre age for a lap, from the driver's stints
pub fn tyre_on_lap(stints: &[ApiStint], driver_number: u32, lap_number: u32) -> LapTyre {
    let stint = stints.iter().find(|s| {
        s.driver_number == driver_number
            && s.lap_start.is_some_and(|start| start <= lap_number)
            && s.lap_end.map_or(true, |end| lap_number <= end)
    });

    match stint {
        Some(s) => {
            let start = s.lap_start.unwrap_or(lap_number);
            LapTyre {
                stint: Some(s.stint_number),
                compound: s.compound.as_deref().and_then(Compound::parse),
                age: s.tyre_age_at_start.unwrap_or(0) + (lap_number - start) + 1,
            }
        }
        None => LapTyre::default(),
    }
}

/// Calendar date of an RFC 3339 timestamp
fn event_date(date_start: &str) -> String {
    DateTime::parse_from_rfc3339(date_start)
        .map(|dt| dt.date_naive().to_string())
        .unwrap_or_else(|_| date_start.chars().take(10).collect())
}

/// Decode one fetched race into a raw session
pub fn build_session(season: u16, round: u32, payload: SessionPayload) -> RawSession {
    let driver = |number: u32| payload.drivers.iter().find(|d| d.driver_number == number);
    let code_of = |number: u32| {
        driver(number)
            .and_then(|d| d.name_acronym.clone())
            .unwrap_or_else(|| number.to_string())
    };

    let mut rows: Vec<&ApiSessionResult> = payload.results.iter().collect();
    rows.sort_by_key(|r| (r.position.is_none(), r.position));

    let results: Vec<DriverResult> = rows
        .iter()
        .map(|row| {
            let status = result_status(row);
            let time = match status {
                "DNF" | "DNS" | "DSQ" => status.to_string(),
                _ if row.position == Some(1) => seconds(&row.duration)
                    .map(format_race_time)
                    .unwrap_or_else(|| status.to_string()),
                _ => format_gap(&row.gap_to_leader).unwrap_or_else(|| status.to_string()),
            };

            DriverResult {
                position: row.position,
                driver_code: code_of(row.driver_number),
                driver_number: row.driver_number,
                team: driver(row.driver_number)
                    .and_then(|d| d.team_name.clone())
                    .unwrap_or_default(),
                time,
                points: row.points.map(|p| p.max(0.0).round() as u32).unwrap_or(0),
                status: status.to_string(),
                grid_position: None,
            }
        })
        .collect();

    let mut laps: Vec<LapRecord> = payload
        .laps
        .iter()
        .map(|lap| {
            let tyre = tyre_on_lap(&payload.stints, lap.driver_number, lap.lap_number);
            LapRecord {
                driver_id: code_of(lap.driver_number),
                lap_number: lap.lap_number,
                lap_duration: lap.lap_duration.filter(|d| d.is_finite() && *d > 0.0),
                compound: tyre.compound,
                tyre_life: tyre.age,
                stint: tyre.stint,
            }
        })
        .collect();
    laps.sort_by(|a, b| a.driver_id.cmp(&b.driver_id).then(a.lap_number.cmp(&b.lap_number)));

    let total_laps = payload
        .results
        .iter()
        .find(|r| r.position == Some(1))
        .and_then(|r| r.number_of_laps)
        .or_else(|| laps.iter().map(|l| l.lap_number).max());

    let event = payload
        .meeting
        .as_ref()
        .map(|m| EventInfo {
            name: m.meeting_name.clone(),
            official_name: m.meeting_official_name.clone(),
            country: m.country_name.clone(),
            location: m.location.clone(),
            date: event_date(&m.date_start),
        })
        .unwrap_or_default();

    let weather = payload
        .weather
        .iter()
        .map(|w| WeatherSample {
            track_temp: w.track_temperature,
            air_temp: w.air_temperature,
        })
        .collect();

    RawSession {
        season,
        round,
        event,
        results,
        laps,
        weather,
        total_laps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> SessionPayload {
        SessionPayload {
            meeting: Some(
                serde_json::from_value(json!({
                    "meeting_key": 1254,
                    "meeting_name": "Italian Grand Prix",
                    "meeting_official_name": "FORMULA 1 PIRELLI GRAN PREMIO D'ITALIA 2025",
                    "country_name": "Italy",
                    "location": "Monza",
                    "date_start": "2025-09-05T11:30:00+00:00"
                }))
                .unwrap(),
            ),
            results: serde_json::from_value(json!([
                {"driver_number": 4, "position": 2, "number_of_laps": 53, "points": 18.0,
                 "dnf": false, "dns": false, "dsq": false, "duration": 4784.56, "gap_to_leader": 19.207},
                {"driver_number": 1, "position": 1, "number_of_laps": 53, "points": 25.0,
                 "dnf": false, "dns": false, "dsq": false, "duration": 4765.353, "gap_to_leader": 0},
                {"driver_number": 43, "position": 19, "number_of_laps": 52, "points": 0,
                 "dnf": false, "dns": false, "dsq": false, "duration": null, "gap_to_leader": "+1 LAP"},
                {"driver_number": 14, "position": null, "number_of_laps": 0, "points": null,
                 "dnf": false, "dns": true, "dsq": false, "duration": null, "gap_to_leader": null}
            ]))
            .unwrap(),
            drivers: serde_json::from_value(json!([
                {"driver_number": 1, "name_acronym": "VER", "team_name": "Red Bull Racing"},
                {"driver_number": 4, "name_acronym": "NOR", "team_name": "McLaren"},
                {"driver_number": 43, "name_acronym": "COL", "team_name": "Alpine"}
            ]))
            .unwrap(),
            laps: serde_json::from_value(json!([
                {"driver_number": 1, "lap_number": 2, "lap_duration": 85.1},
                {"driver_number": 1, "lap_number": 1, "lap_duration": null},
                {"driver_number": 1, "lap_number": 30, "lap_duration": 84.2},
                {"driver_number": 4, "lap_number": 1, "lap_duration": 88.0}
            ]))
            .unwrap(),
            stints: serde_json::from_value(json!([
                {"driver_number": 1, "stint_number": 1, "compound": "MEDIUM", "lap_start": 1, "lap_end": 28, "tyre_age_at_start": 0},
                {"driver_number": 1, "stint_number": 2, "compound": "HARD", "lap_start": 29, "lap_end": 53, "tyre_age_at_start": 3},
                {"driver_number": 4, "stint_number": 1, "compound": "mystery", "lap_start": 1, "lap_end": null, "tyre_age_at_start": null}
            ]))
            .unwrap(),
            weather: serde_json::from_value(json!([
                {"track_temperature": 41.0, "air_temperature": 27.2},
                {"track_temperature": null, "air_temperature": 27.0}
            ]))
            .unwrap(),
        }
    }

    #[test]
    fn test_format_race_time() {
        assert_eq!(format_race_time(4765.353), "1:19:25.353");
        assert_eq!(format_race_time(59.9996), "0:01:00.000");
    }

    #[test]
    fn test_format_gap() {
        assert_eq!(format_gap(&json!(19.207)).as_deref(), Some("+19.207s"));
        assert_eq!(format_gap(&json!("+1 LAP")).as_deref(), Some("+1 LAP"));
        assert_eq!(format_gap(&json!(null)), None);
        assert_eq!(format_gap(&json!([null, 1.5])).as_deref(), Some("+1.500s"));
    }

    #[test]
    fn test_tyre_age_counts_from_stint_start() {
        let stints = payload().stints;
        let tyre = |driver, lap| {
            let t = tyre_on_lap(&stints, driver, lap);
            (t.stint, t.compound, t.age)
        };
        assert_eq!(tyre(1, 1), (Some(1), Some(Compound::Medium), 1));
        assert_eq!(tyre(1, 30), (Some(2), Some(Compound::Hard), 5));
        // Open-ended stint with an unknown compound
        assert_eq!(tyre(4, 40), (Some(1), None, 40));
        assert_eq!(tyre(99, 1), (None, None, 0));
    }

    #[test]
    fn test_session_row_dates() {
        let session: ApiSession = serde_json::from_value(json!({
            "session_key": 9912,
            "meeting_key": 1254,
            "session_name": "Race",
            "date_start": "2025-09-07T13:00:00+00:00",
            "country_name": "Italy",
            "circuit_short_name": "Monza"
        }))
        .unwrap();
        assert_eq!(session.date(), "2025-09-07");
        assert_eq!(session.circuit_short_name, "Monza");

        let before = DateTime::parse_from_rfc3339("2025-09-07T12:59:00Z").unwrap().with_timezone(&Utc);
        let after = DateTime::parse_from_rfc3339("2025-09-07T13:00:00Z").unwrap().with_timezone(&Utc);
        assert!(!session.started_by(before));
        assert!(session.started_by(after));

        let undated = ApiSession {
            date_start: "TBC".to_string(),
            ..session
        };
        assert!(!undated.started_by(after));
    }

    #[test]
    fn test_build_session_results() {
        let session = build_session(2025, 16, payload());
        assert_eq!(session.round, 16);
        assert_eq!(session.event.name, "Italian Grand Prix");
        assert_eq!(session.event.date, "2025-09-05");
        assert_eq!(session.total_laps, Some(53));

        let codes: Vec<&str> = session.results.iter().map(|r| r.driver_code.as_str()).collect();
        assert_eq!(codes, vec!["VER", "NOR", "COL", "14"]);

        let winner = &session.results[0];
        assert_eq!(winner.time, "1:19:25.353");
        assert_eq!(winner.points, 25);
        assert_eq!(winner.team, "Red Bull Racing");
        assert_eq!(session.results[1].time, "+19.207s");
        assert_eq!(session.results[2].status, "Lapped");
        assert_eq!(session.results[2].time, "+1 LAP");
        assert_eq!(session.results[3].status, "DNS");
        assert_eq!(session.results[3].time, "DNS");
        assert!(session.validate().is_ok());
    }

    #[test]
    fn test_build_session_laps() {
        let session = build_session(2025, 16, payload());
        let ver = session.laps_for("VER");
        assert_eq!(ver.len(), 3);
        assert_eq!(ver[0].lap_number, 1);
        assert_eq!(ver[0].lap_duration, None);
        assert_eq!(ver[2].compound, Some(Compound::Hard));
        assert_eq!(ver[2].stint, Some(2));
        assert_eq!(session.mean_track_temp(), Some(41.0));
    }

    #[test]
    fn test_build_session_without_results_fails_validation() {
        let mut data = payload();
        data.results.clear();
        let session = build_session(2025, 3, data);
        assert!(session.validate().is_err());
        assert_eq!(session.total_laps, Some(30));
    }
}
