use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Remote distances are reported in miles
pub const MILES_TO_KM: f64 = 1.60934;

/// Placeholder used when a payload carries no usable name
pub const UNKNOWN_NAME: &str = "Unknown";

const BIRTH_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

/// Errors raised while turning a remote payload into a domain object
///
/// Only structural problems surface here. Individual fields that are
/// missing or malformed fall back to their defaults instead.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("payload has no string `_id`")]
    MissingId,

    #[error("payload is missing `{0}`")]
    MissingField(&'static str),
}

/// Deserialize a field, turning any type mismatch into `None`
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Deserialize a sequence, dropping the elements that don't fit `T`
fn lenient_seq<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    let items = match value {
        Value::Array(items) => items,
        _ => return Ok(Vec::new()),
    };

    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

/// Candidate gender as reported by the remote service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Unknown,
}

impl Gender {
    /// Decode the remote integer code; anything but 0 or 1 is unknown
    pub fn from_code(code: Option<i64>) -> Self {
        match code {
            Some(0) => Gender::Male,
            Some(1) => Gender::Female,
            _ => Gender::Unknown,
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

/// A (title, company) employment entry; either side may be absent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub title: Option<String>,
    pub company: Option<String>,
}

/// Geographic position in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Default, Deserialize)]
struct RawNamed {
    #[serde(default, deserialize_with = "lenient")]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPhoto {
    #[serde(default, deserialize_with = "lenient")]
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawJob {
    #[serde(default, deserialize_with = "lenient")]
    title: Option<RawNamed>,
    #[serde(default, deserialize_with = "lenient")]
    company: Option<RawNamed>,
}

/// Person payload as it arrives from the remote service
///
/// Every field is optional and tolerant of type mismatches so that a
/// partially broken payload still produces a candidate.
#[derive(Debug, Default, Deserialize)]
struct RawPerson {
    #[serde(rename = "_id", default, deserialize_with = "lenient")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    bio: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    distance_mi: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    birth_date: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    gender: Option<i64>,
    #[serde(default, deserialize_with = "lenient_seq")]
    photos: Vec<RawPhoto>,
    #[serde(default, deserialize_with = "lenient_seq")]
    jobs: Vec<RawJob>,
    #[serde(default, deserialize_with = "lenient_seq")]
    schools: Vec<RawNamed>,
    #[serde(default, deserialize_with = "lenient")]
    pos: Option<Coordinates>,
}

/// A discoverable remote profile eligible for a like/pass decision
///
/// Built once from a remote payload and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    id: String,
    name: String,
    bio: String,
    distance_km: f64,
    birth_date: Option<DateTime<Utc>>,
    gender: Gender,
    images: Vec<String>,
    jobs: Vec<Job>,
    schools: Vec<String>,
    position: Option<Coordinates>,
    location: Option<String>,
}

impl Candidate {
    /// Build a candidate from a person payload
    ///
    /// Fails only when the payload is not an object or has no `_id`.
    /// Location is left unresolved; see [`Candidate::with_location`].
    pub fn from_value(value: &Value) -> Result<Self, ParseError> {
        if !value.is_object() {
            return Err(ParseError::NotAnObject);
        }

        let raw = RawPerson::deserialize(value).unwrap_or_default();
        let id = raw.id.ok_or(ParseError::MissingId)?;

        let birth_date = raw.birth_date.as_deref().and_then(parse_birth_date);

        let jobs = raw
            .jobs
            .into_iter()
            .map(|job| Job {
                title: job.title.and_then(|t| t.name),
                company: job.company.and_then(|c| c.name),
            })
            .collect();

        Ok(Self {
            id,
            name: raw.name.unwrap_or_else(|| UNKNOWN_NAME.to_string()),
            bio: raw.bio.unwrap_or_default(),
            distance_km: raw.distance_mi.unwrap_or(0.0) * MILES_TO_KM,
            birth_date,
            gender: Gender::from_code(raw.gender),
            images: raw.photos.into_iter().filter_map(|p| p.url).collect(),
            jobs,
            schools: raw.schools.into_iter().filter_map(|s| s.name).collect(),
            position: raw.pos,
            location: None,
        })
    }

    /// Attach the place name resolved from [`Candidate::position`]
    pub fn with_location(mut self, location: Option<String>) -> Self {
        self.location = location;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bio(&self) -> &str {
        &self.bio
    }

    pub fn distance_km(&self) -> f64 {
        self.distance_km
    }

    pub fn birth_date(&self) -> Option<DateTime<Utc>> {
        self.birth_date
    }

    pub fn gender(&self) -> Gender {
        self.gender
    }

    pub fn images(&self) -> &[String] {
        &self.images
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn schools(&self) -> &[String] {
        &self.schools
    }

    pub fn position(&self) -> Option<Coordinates> {
        self.position
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// Age in whole years at `now`, if the birth date is known
    pub fn age_at(&self, now: DateTime<Utc>) -> Option<u32> {
        let born = self.birth_date?;
        let mut years = now.year() - born.year();
        if (now.month(), now.day()) < (born.month(), born.day()) {
            years -= 1;
        }
        u32::try_from(years).ok()
    }

    pub fn age(&self) -> Option<u32> {
        self.age_at(Utc::now())
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.birth_date {
            Some(date) => write!(f, "{} - {} ({})", self.id, self.name, date.format("%d.%m.%Y")),
            None => write!(f, "{} - {} (Unknown)", self.id, self.name),
        }
    }
}

fn parse_birth_date(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, BIRTH_DATE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
