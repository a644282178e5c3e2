use crate::models::Coordinates;
use async_trait::async_trait;
use reqwest::Client;
use crate::services::remote::RateGate;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

/// Reverse geocoding collaborator
///
/// Implementations never fail: any lookup problem resolves to `None`.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn reverse(&self, position: Coordinates) -> Option<String>;
}

/// Geocoder that never resolves anything
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledGeocoder;

#[async_trait]
impl Geocoder for DisabledGeocoder {
    async fn reverse(&self, _position: Coordinates) -> Option<String> {
        None
    }
}

/// Public Nominatim allows one request per second
pub const DEFAULT_GEOCODER_INTERVAL: Duration = Duration::from_secs(1);

/// Cached lookups are keyed by coordinates rounded to this many decimals (~110 m)
const CACHE_PRECISION: f64 = 1_000.0;

type CacheKey = (i64, i64);

fn cache_key(position: Coordinates) -> CacheKey {
    (
        (position.lat * CACHE_PRECISION).round() as i64,
        (position.lon * CACHE_PRECISION).round() as i64,
    )
}

/// Nominatim-compatible reverse geocoder
///
/// Lookups share their own `RateGate` and answered positions are cached, so a
/// feed of nearby people costs at most one request per distinct area.
pub struct NominatimGeocoder {
    base_url: String,
    client: Client,
    gate: RateGate,
    cache: Mutex<HashMap<CacheKey, Option<String>>>,
}

impl NominatimGeocoder {
    pub fn new(base_url: String, user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            base_url,
            client,
            gate: RateGate::new(DEFAULT_GEOCODER_INTERVAL),
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.gate = RateGate::new(interval);
        self
    }

    async fn lookup(&self, position: Coordinates) -> Result<Option<String>, reqwest::Error> {
        let url = format!("{}/reverse", self.base_url.trim_end_matches('/'));

        self.gate.wait().await;

        let json: Value = self
            .client
            .get(&url)
            .query(&[
                ("format", "jsonv2".to_string()),
                ("lat", position.lat.to_string()),
                ("lon", position.lon.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(json
            .get("display_name")
            .and_then(Value::as_str)
            .map(str::to_string))
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn reverse(&self, position: Coordinates) -> Option<String> {
        let key = cache_key(position);
        if let Some(place) = self.cache.lock().await.get(&key) {
            return place.clone();
        }

        match self.lookup(position).await {
            Ok(place) => {
                self.cache.lock().await.insert(key, place.clone());
                place
            }
            // failures stay uncached so a later feed can retry
            Err(e) => {
                tracing::debug!("Reverse geocoding {}, {} failed: {}", position.lat, position.lon, e);
                None
            }
        }
    }
}
