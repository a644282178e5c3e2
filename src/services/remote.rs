use crate::models::{Candidate, LikeOutcome, ParseError, Profile};
use crate::services::geocoder::Geocoder;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

/// Address of the matching service
pub const DEFAULT_BASE_URL: &str = "https://api.gotinder.com";

/// Minimum spacing between two outbound calls
pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(1);

const AUTH_HEADER: &str = "X-Auth-Token";

/// Errors that can occur when talking to the matching service
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned {status}")]
    Status { endpoint: String, status: StatusCode },

    #[error("invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },
}

impl RemoteError {
    pub fn endpoint(&self) -> &str {
        match self {
            RemoteError::Request { endpoint, .. }
            | RemoteError::Status { endpoint, .. }
            | RemoteError::InvalidResponse { endpoint, .. } => endpoint,
        }
    }

    /// HTTP status behind the failure, when the service answered at all
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RemoteError::Request { source, .. } => source.status(),
            RemoteError::Status { status, .. } => Some(*status),
            RemoteError::InvalidResponse { .. } => None,
        }
    }

    fn invalid(endpoint: &str, reason: impl ToString) -> Self {
        RemoteError::InvalidResponse {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Serializes outbound calls and spaces them by a fixed delay
///
/// One gate is shared by every caller of a client. A caller holds the gate
/// while it sleeps the delay, so request start times are always at least
/// `delay` apart no matter how many tasks issue calls.
#[derive(Debug)]
pub struct RateGate {
    delay: Duration,
    turn: Mutex<()>,
}

impl RateGate {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            turn: Mutex::new(()),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Wait for this caller's turn to issue a request
    pub async fn wait(&self) {
        let _turn = self.turn.lock().await;
        tokio::time::sleep(self.delay).await;
    }
}

impl Default for RateGate {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_LIMIT_DELAY)
    }
}

/// The remote operations the decision loop relies on
#[async_trait]
pub trait MatchService: Send + Sync {
    /// Current discovery feed, in the order the service ranked it
    async fn nearby_candidates(&self) -> Result<Vec<Candidate>, RemoteError>;

    async fn like(&self, candidate_id: &str) -> Result<LikeOutcome, RemoteError>;

    /// Pass on a candidate; `true` once the service acknowledged it
    async fn dislike(&self, candidate_id: &str) -> Result<bool, RemoteError>;
}

/// Matching service API client
///
/// Every call waits on the shared [`RateGate`] first and carries the
/// session token. Payloads are mapped to domain objects here.
pub struct RemoteClient {
    base_url: String,
    token: String,
    client: Client,
    gate: Arc<RateGate>,
    geocoder: Arc<dyn Geocoder>,
}

impl RemoteClient {
    pub fn new(
        base_url: String,
        token: String,
        gate: Arc<RateGate>,
        geocoder: Arc<dyn Geocoder>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url,
            token,
            client,
            gate,
            geocoder,
        })
    }

    pub fn rate_gate(&self) -> &Arc<RateGate> {
        &self.gate
    }

    /// Profile of the authenticated user
    pub async fn get_self_profile(&self) -> Result<Profile, RemoteError> {
        let endpoint = format!("/v2/profile?include={}", urlencoding::encode("account,user"));
        let body = self.get_json(&endpoint).await?;

        let data = body
            .get("data")
            .ok_or_else(|| RemoteError::invalid(&endpoint, "missing data object"))?;

        let profile = Profile::from_value(data).map_err(|e| RemoteError::invalid(&endpoint, e))?;
        let location = self.resolve_location(profile.candidate()).await;

        Ok(profile.with_location(location))
    }

    /// Most recent matches, at most `limit` of them
    pub async fn get_recent_matches(&self, limit: u32) -> Result<Vec<Candidate>, RemoteError> {
        let endpoint = format!("/v2/matches?count={}", limit);
        let body = self.get_json(&endpoint).await?;

        let matches = body
            .pointer("/data/matches")
            .and_then(Value::as_array)
            .ok_or_else(|| RemoteError::invalid(&endpoint, "missing data.matches array"))?;

        Ok(self.parse_people(&endpoint, matches, "person").await)
    }

    pub async fn get_nearby_candidates(&self) -> Result<Vec<Candidate>, RemoteError> {
        let endpoint = "/v2/recs/core";
        let body = self.get_json(endpoint).await?;

        let results = body
            .pointer("/data/results")
            .and_then(Value::as_array)
            .ok_or_else(|| RemoteError::invalid(endpoint, "missing data.results array"))?;

        Ok(self.parse_people(endpoint, results, "user").await)
    }

    pub async fn like(&self, candidate_id: &str) -> Result<LikeOutcome, RemoteError> {
        let endpoint = format!("/like/{}", urlencoding::encode(candidate_id));
        let body = self.get_json(&endpoint).await?;

        LikeOutcome::from_value(&body).map_err(|e| RemoteError::invalid(&endpoint, e))
    }

    pub async fn dislike(&self, candidate_id: &str) -> Result<bool, RemoteError> {
        let endpoint = format!("/pass/{}", urlencoding::encode(candidate_id));
        self.get_json(&endpoint).await?;
        Ok(true)
    }

    async fn get_json(&self, endpoint: &str) -> Result<Value, RemoteError> {
        self.gate.wait().await;

        let url = format!("{}{}", self.base_url.trim_end_matches('/'), endpoint);
        tracing::debug!("Calling {}", endpoint);

        let response = self
            .client
            .get(&url)
            .header(AUTH_HEADER, &self.token)
            .send()
            .await
            .map_err(|source| RemoteError::Request {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status {
                endpoint: endpoint.to_string(),
                status,
            });
        }

        response
            .json()
            .await
            .map_err(|e| RemoteError::invalid(endpoint, e))
    }

    /// Build candidates from a result list, dropping entries without identity
    async fn parse_people(&self, endpoint: &str, entries: &[Value], key: &'static str) -> Vec<Candidate> {
        let mut people = Vec::with_capacity(entries.len());

        for entry in entries {
            let parsed = entry
                .get(key)
                .ok_or(ParseError::MissingField(key))
                .and_then(Candidate::from_value);

            match parsed {
                Ok(candidate) => {
                    let location = self.resolve_location(&candidate).await;
                    people.push(candidate.with_location(location));
                }
                Err(e) => tracing::warn!("Dropping malformed entry from {}: {}", endpoint, e),
            }
        }

        people
    }

    async fn resolve_location(&self, candidate: &Candidate) -> Option<String> {
        match candidate.position() {
            Some(position) => self.geocoder.reverse(position).await,
            None => None,
        }
    }
}

#[async_trait]
impl MatchService for RemoteClient {
    async fn nearby_candidates(&self) -> Result<Vec<Candidate>, RemoteError> {
        self.get_nearby_candidates().await
    }

    async fn like(&self, candidate_id: &str) -> Result<LikeOutcome, RemoteError> {
        RemoteClient::like(self, candidate_id).await
    }

    async fn dislike(&self, candidate_id: &str) -> Result<bool, RemoteError> {
        RemoteClient::dislike(self, candidate_id).await
    }
}
