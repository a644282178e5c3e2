use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationErrors};

/// Errors raised while loading configuration; all of them are fatal
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(#[from] ValidationErrors),
}

/// Application configuration
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Settings {
    #[serde(default)]
    #[validate(nested)]
    pub api: ApiSettings,
    #[serde(default)]
    pub run: RunSettings,
    #[serde(default)]
    #[validate(nested)]
    pub decision: DecisionSettings,
    #[serde(default)]
    pub vision: VisionSettings,
    #[serde(default)]
    pub geocoder: GeocoderSettings,
    #[serde(default)]
    pub archive: ArchiveSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ApiSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "an auth token is required (TINDER_API_TOKEN)"))]
    pub token: String,
    #[serde(default = "default_rate_limit_delay_ms")]
    pub rate_limit_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_matches_limit")]
    pub matches_limit: u32,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: String::new(),
            rate_limit_delay_ms: default_rate_limit_delay_ms(),
            timeout_secs: default_timeout_secs(),
            matches_limit: default_matches_limit(),
        }
    }
}

impl ApiSettings {
    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_base_url() -> String { crate::services::DEFAULT_BASE_URL.to_string() }
fn default_rate_limit_delay_ms() -> u64 { 1000 }
fn default_timeout_secs() -> u64 { 30 }
fn default_matches_limit() -> u32 { 10 }

#[derive(Debug, Clone, Deserialize)]
pub struct RunSettings {
    /// Wall-clock budget of one run; 2.8 hours by default
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,
    #[serde(default = "default_feed_retry_secs")]
    pub feed_retry_secs: u64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            duration_secs: default_duration_secs(),
            feed_retry_secs: default_feed_retry_secs(),
        }
    }
}

impl RunSettings {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn feed_retry(&self) -> Duration {
        Duration::from_secs(self.feed_retry_secs)
    }
}

fn default_duration_secs() -> u64 { 10_080 }
fn default_feed_retry_secs() -> u64 { 5 }

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DecisionSettings {
    #[serde(default = "default_like_threshold")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub like_threshold: f64,
    #[serde(default = "default_institution_bonus")]
    #[validate(range(min = 1.0))]
    pub institution_bonus: f64,
    #[serde(default = "default_preferred_institutions")]
    pub preferred_institutions: Vec<String>,
}

impl Default for DecisionSettings {
    fn default() -> Self {
        Self {
            like_threshold: default_like_threshold(),
            institution_bonus: default_institution_bonus(),
            preferred_institutions: default_preferred_institutions(),
        }
    }
}

fn default_like_threshold() -> f64 { 0.8 }
fn default_institution_bonus() -> f64 { 1.2 }

fn default_preferred_institutions() -> Vec<String> {
    [
        "Universität Zürich",
        "University of Zurich",
        "UZH",
        "HWZ Hochschule für Wirtschaft Zürich",
        "ETH Zürich",
        "ETH Zurich",
        "ETH",
        "ETHZ",
        "Hochschule Luzern",
        "HSLU",
        "ZHAW",
        "Zürcher Hochschule für Angewandte Wissenschaften",
        "Universität Bern",
        "Uni Bern",
        "PHLU",
        "PH Luzern",
        "Fachhochschule Luzern",
        "Eidgenössische Technische Hochschule Zürich",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct VisionSettings {
    #[serde(default = "default_classifier_url")]
    pub classifier_url: String,
    /// Without a detector endpoint the whole frame is classified
    #[serde(default)]
    pub detector_url: Option<String>,
    #[serde(default = "default_positive_label")]
    pub positive_label: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for VisionSettings {
    fn default() -> Self {
        Self {
            classifier_url: default_classifier_url(),
            detector_url: None,
            positive_label: default_positive_label(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl VisionSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_classifier_url() -> String { "http://127.0.0.1:8501/classify".to_string() }
fn default_positive_label() -> String { crate::core::scoring::DEFAULT_POSITIVE_LABEL.to_string() }

#[derive(Debug, Clone, Deserialize)]
pub struct GeocoderSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_geocoder_url")]
    pub url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_geocoder_interval_ms")]
    pub min_interval_ms: u64,
}

impl Default for GeocoderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_geocoder_url(),
            user_agent: default_user_agent(),
            min_interval_ms: default_geocoder_interval_ms(),
        }
    }
}

impl GeocoderSettings {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

fn default_true() -> bool { true }
fn default_geocoder_url() -> String { "https://nominatim.openstreetmap.org".to_string() }
fn default_user_agent() -> String { "swipe-pilot".to_string() }
fn default_geocoder_interval_ms() -> u64 { 1000 }

#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_archive_folder")]
    pub folder: PathBuf,
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,
    #[serde(default)]
    pub jitter_max_ms: u64,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            folder: default_archive_folder(),
            ledger_path: default_ledger_path(),
            jitter_max_ms: 0,
        }
    }
}

impl ArchiveSettings {
    pub fn jitter_max(&self) -> Duration {
        Duration::from_millis(self.jitter_max_ms)
    }
}

fn default_archive_folder() -> PathBuf { PathBuf::from("./images/unclassified") }
fn default_ledger_path() -> PathBuf { PathBuf::from("./images/unclassified/profiles.txt") }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingSettings {
    /// Directive string for `tracing_subscriber::EnvFilter`
    pub fn filter_directives(&self) -> &str {
        &self.level
    }

    pub fn is_pretty(&self) -> bool {
        self.format.eq_ignore_ascii_case("pretty")
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "compact".to_string() }

fn environment() -> Environment {
    Environment::with_prefix("SWIPE")
        .prefix_separator("__")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("decision.preferred_institutions")
        .try_parsing(true)
}

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with SWIPE__)
    /// 5. TINDER_API_TOKEN, LOG_LEVEL and LOG_FORMAT
    pub fn load() -> Result<Self, SettingsError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., SWIPE__DECISION__LIKE_THRESHOLD -> decision.like_threshold
            .add_source(environment())
            .build()?;

        Self::finish(substitute_env_vars(settings)?)
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(environment())
            .build()?;

        Self::finish(substitute_env_vars(settings)?)
    }

    fn finish(config: Config) -> Result<Self, SettingsError> {
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }
}

/// Well-known variables and the settings keys they override
const ENV_OVERRIDES: [(&str, &str); 3] = [
    ("TINDER_API_TOKEN", "api.token"),
    ("LOG_LEVEL", "logging.level"),
    ("LOG_FORMAT", "logging.format"),
];

/// Apply well-known environment variables on top of the layered config
fn substitute_env_vars(settings: Config) -> Result<Config, ConfigError> {
    apply_overrides(settings, |name| std::env::var(name).ok())
}

fn apply_overrides<F>(settings: Config, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut builder = Config::builder().add_source(settings);

    for (variable, key) in ENV_OVERRIDES {
        if let Some(value) = lookup(variable) {
            builder = builder.set_override(key, value)?;
        }
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_decision() {
        let decision = DecisionSettings::default();
        assert_eq!(decision.like_threshold, 0.8);
        assert_eq!(decision.institution_bonus, 1.2);
        assert!(decision.preferred_institutions.iter().any(|i| i == "ETH Zürich"));
        assert_eq!(decision.preferred_institutions.len(), 18);
    }

    #[test]
    fn test_default_run_and_logging() {
        let run = RunSettings::default();
        assert_eq!(run.duration(), Duration::from_secs(10_080));
        assert_eq!(run.feed_retry(), Duration::from_secs(5));

        let logging = LoggingSettings::default();
        assert_eq!(logging.level, "info");
        assert_eq!(logging.format, "compact");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[api]
token = "file-token"
rate_limit_delay_ms = 250

[decision]
like_threshold = 0.7
preferred_institutions = ["UZH"]
"#
        )
        .unwrap();

        let settings = Settings::load_from(file.path()).unwrap();

        // TINDER_API_TOKEN may be set in the environment running the tests
        assert!(!settings.api.token.is_empty());
        assert_eq!(settings.api.rate_limit_delay(), Duration::from_millis(250));
        assert_eq!(settings.api.base_url, "https://api.gotinder.com");
        assert_eq!(settings.decision.like_threshold, 0.7);
        assert_eq!(settings.decision.preferred_institutions, vec!["UZH"]);
        assert_eq!(settings.decision.institution_bonus, 1.2);
        assert!(!settings.archive.enabled);
    }

    #[test]
    fn test_logging_section_and_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[api]
token = "file-token"

[logging]
level = "swipe_pilot=debug"
format = "pretty"
"#
        )
        .unwrap();

        let layered = Config::builder()
            .add_source(File::from(file.path()))
            .build()
            .unwrap();

        let from_file = Settings::finish(apply_overrides(layered.clone(), |_| None).unwrap()).unwrap();
        assert_eq!(from_file.logging.filter_directives(), "swipe_pilot=debug");
        assert!(from_file.logging.is_pretty());

        let overridden = apply_overrides(layered, |name| match name {
            "LOG_LEVEL" => Some("warn".to_string()),
            "LOG_FORMAT" => Some("compact".to_string()),
            "TINDER_API_TOKEN" => Some("env-token".to_string()),
            _ => None,
        })
        .unwrap();
        let settings = Settings::finish(overridden).unwrap();
        assert_eq!(settings.logging.filter_directives(), "warn");
        assert!(!settings.logging.is_pretty());
        assert_eq!(settings.api.token, "env-token");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[api]
token = "file-token"

[decision]
institution_bonus = 0.5
"#
        )
        .unwrap();

        assert!(matches!(Settings::load_from(file.path()), Err(SettingsError::Invalid(_))));
    }
}
