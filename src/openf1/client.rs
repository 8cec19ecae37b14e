//! HTTP client with rate limiting for api.openf1.org

use super::{build_session, ApiDriver, ApiLap, ApiMeeting, ApiSession, ApiSessionResult, ApiStint, ApiWeather, SessionPayload};
use chrono::DateTime;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::data::session::{RawSession, SessionSource};

/// Public OpenF1 endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.openf1.org/v1";

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("no race for round {round} of {season}")]
    RoundNotScheduled { season: u16, round: u32 },

    #[error("failed to build HTTP client: {0}")]
    Build(String),
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Minimum delay between requests in milliseconds
    pub delay_ms: u64,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            delay_ms: 350,
            timeout_secs: 30,
            user_agent: concat!("stratx/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// OpenF1 client with rate limiting
///
/// Every request is a single attempt; failures go straight back to the
/// caller.
pub struct OpenF1Client {
    client: reqwest::Client,
    config: ClientConfig,
    last_request: Mutex<Option<Instant>>,
    // Non-empty race schedules per season, ordered by start time
    schedule: Mutex<HashMap<u16, Vec<ApiSession>>>,
}

impl OpenF1Client {
    /// Create a new client with the given configuration
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;

        Ok(Self {
            client,
            config,
            last_request: Mutex::new(None),
            schedule: Mutex::new(HashMap::new()),
        })
    }

    /// Wait for rate limit
    async fn wait_for_rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        let delay = Duration::from_millis(self.config.delay_ms);

        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < delay {
                tokio::time::sleep(delay - elapsed).await;
            }
        }

        *last = Some(Instant::now());
    }

    fn build_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    /// GET one endpoint and decode its JSON array
    async fn fetch<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, ClientError> {
        self.wait_for_rate_limit().await;

        let url = self.build_url(endpoint);
        tracing::debug!("GET {} {:?}", url, query);

        let response = self.client.get(&url).query(query).send().await?;
        let status = response.status();
        // OpenF1 answers 404 for queries with no matching rows
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(ClientError::Status {
                url,
                status: status.as_u16(),
            });
        }

        Ok(response.json::<Vec<T>>().await?)
    }

    async fn fetch_session_rows<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        session_key: u64,
    ) -> Result<Vec<T>, ClientError> {
        self.fetch(endpoint, &[("session_key", session_key.to_string())])
            .await
    }

    /// Race sessions of a season, ordered by start time
    pub async fn race_sessions(&self, season: u16) -> Result<Vec<ApiSession>, ClientError> {
        match self.memoized_schedule(season).await {
            Some(sessions) => Ok(sessions),
            None => self.refresh_schedule(season).await,
        }
    }

    async fn memoized_schedule(&self, season: u16) -> Option<Vec<ApiSession>> {
        self.schedule
            .lock()
            .await
            .get(&season)
            .filter(|sessions| !sessions.is_empty())
            .cloned()
    }

    /// Query the season's races and memoize them unless the list is empty
    async fn refresh_schedule(&self, season: u16) -> Result<Vec<ApiSession>, ClientError> {
        let mut sessions: Vec<ApiSession> = self
            .fetch(
                "sessions",
                &[
                    ("year", season.to_string()),
                    ("session_name", "Race".to_string()),
                ],
            )
            .await?;
        sessions.retain(|s| s.session_name == "Race");
        sessions.sort_by_key(|s| DateTime::parse_from_rfc3339(&s.date_start).ok());
        tracing::info!("Found {} race sessions for {}", sessions.len(), season);

        if !sessions.is_empty() {
            self.schedule.lock().await.insert(season, sessions.clone());
        }
        Ok(sessions)
    }

    /// Race session of one round
    ///
    /// A round past the end of the memoized schedule queries upstream again,
    /// since races are added as the season goes on.
    async fn race_session(&self, season: u16, round: u32) -> Result<ApiSession, ClientError> {
        let not_scheduled = || ClientError::RoundNotScheduled { season, round };
        let index = round.checked_sub(1).ok_or_else(not_scheduled)? as usize;

        let memoized = self.memoized_schedule(season).await;
        if let Some(session) = memoized.and_then(|sessions| sessions.get(index).cloned()) {
            return Ok(session);
        }
        self.refresh_schedule(season)
            .await?
            .get(index)
            .cloned()
            .ok_or_else(not_scheduled)
    }

    /// Fetch and decode one race
    pub async fn fetch_race(&self, season: u16, round: u32) -> Result<RawSession, ClientError> {
        let session = self.race_session(season, round).await?;
        let key = session.session_key;
        tracing::info!("Fetching {} round {} (session {})", season, round, key);

        let meeting: Vec<ApiMeeting> = self
            .fetch("meetings", &[("meeting_key", session.meeting_key.to_string())])
            .await?;
        let results: Vec<ApiSessionResult> = self.fetch_session_rows("session_result", key).await?;
        let drivers: Vec<ApiDriver> = self.fetch_session_rows("drivers", key).await?;
        let laps: Vec<ApiLap> = self.fetch_session_rows("laps", key).await?;
        let stints: Vec<ApiStint> = self.fetch_session_rows("stints", key).await?;
        let weather: Vec<ApiWeather> = self.fetch_session_rows("weather", key).await?;

        let payload = SessionPayload {
            meeting: meeting.into_iter().next(),
            results,
            drivers,
            laps,
            stints,
            weather,
        };
        Ok(build_session(season, round, payload))
    }
}

impl SessionSource for OpenF1Client {
    type Error = ClientError;

    fn fetch_session(
        &self,
        season: u16,
        round: u32,
    ) -> impl Future<Output = Result<RawSession, ClientError>> + Send {
        self.fetch_race(season, round)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "https://api.openf1.org/v1");
        assert_eq!(config.delay_ms, 350);
        assert_eq!(config.timeout_secs, 30);
        assert!(config.user_agent.starts_with("stratx/"));
    }

    #[test]
    fn test_build_url_trims_trailing_slash() {
        let client = OpenF1Client::new(ClientConfig {
            base_url: "http://localhost:9000/v1/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(client.build_url("laps"), "http://localhost:9000/v1/laps");
    }

    #[tokio::test]
    async fn test_rate_limit_spaces_requests() {
        let client = OpenF1Client::new(ClientConfig {
            delay_ms: 40,
            ..Default::default()
        })
        .unwrap();

        let start = Instant::now();
        client.wait_for_rate_limit().await;
        client.wait_for_rate_limit().await;
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    fn offline_client() -> OpenF1Client {
        OpenF1Client::new(ClientConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            delay_ms: 0,
            timeout_secs: 2,
            ..Default::default()
        })
        .unwrap()
    }

    fn race(session_key: u64, date_start: &str) -> ApiSession {
        ApiSession {
            session_key,
            meeting_key: session_key - 1,
            session_name: "Race".to_string(),
            date_start: date_start.to_string(),
            country_name: String::new(),
            circuit_short_name: String::new(),
        }
    }

    #[tokio::test]
    async fn test_round_inside_schedule_uses_memo() {
        let client = offline_client();
        client.schedule.lock().await.insert(
            2025,
            vec![
                race(9001, "2025-03-16T04:00:00+00:00"),
                race(9002, "2025-03-23T07:00:00+00:00"),
            ],
        );

        let session = client.race_session(2025, 2).await.unwrap();
        assert_eq!(session.session_key, 9002);
        assert!(matches!(
            client.race_session(2025, 0).await,
            Err(ClientError::RoundNotScheduled { round: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_round_past_schedule_queries_upstream_again() {
        let client = offline_client();
        client
            .schedule
            .lock()
            .await
            .insert(2025, vec![race(9001, "2025-03-16T04:00:00+00:00")]);

        // Not answered from the memo: the refresh hits the closed port
        assert!(matches!(
            client.race_session(2025, 3).await,
            Err(ClientError::RequestFailed(_))
        ));
        assert_eq!(client.race_sessions(2025).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_schedule_is_not_memoized() {
        let client = offline_client();
        client.schedule.lock().await.insert(2024, Vec::new());
        assert!(client.memoized_schedule(2024).await.is_none());
        assert!(matches!(
            client.race_sessions(2024).await,
            Err(ClientError::RequestFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_single_attempt_error() {
        let client = OpenF1Client::new(ClientConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            delay_ms: 0,
            timeout_secs: 2,
            ..Default::default()
        })
        .unwrap();

        let result = client.fetch_race(2025, 1).await;
        assert!(matches!(result, Err(ClientError::RequestFailed(_))));
    }
}
