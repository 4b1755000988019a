use crate::error::{Error, Result};
use serde::Deserialize;
use std::env;

/// Configuration for one MFA deployment.
///
/// Reference values follow the production vehicle-access rollout: 30 s for
/// the proximity scan-to-match window, 5 s for the tag sub-session exchange,
/// 2 s polling with a 3-iteration debounce.
#[derive(Debug, Clone, Deserialize)]
pub struct MfaConfig {
    #[serde(default = "default_proximity_timeout_secs")]
    pub proximity_timeout_secs: u64,

    #[serde(default = "default_tag_timeout_secs")]
    pub tag_timeout_secs: u64,

    #[serde(default = "default_tag_subsession_timeout_secs")]
    pub tag_subsession_timeout_secs: u64,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_poll_debounce_iterations")]
    pub poll_debounce_iterations: u32,

    #[serde(default = "default_min_tag_uid_bytes")]
    pub min_tag_uid_bytes: usize,

    #[serde(default = "default_verifier_base_url")]
    pub verifier_base_url: String,
}

fn default_proximity_timeout_secs() -> u64 {
    30
}

fn default_tag_timeout_secs() -> u64 {
    60
}

fn default_tag_subsession_timeout_secs() -> u64 {
    5
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_poll_debounce_iterations() -> u32 {
    3
}

fn default_min_tag_uid_bytes() -> usize {
    4
}

fn default_verifier_base_url() -> String {
    "http://localhost:8080".to_string()
}

impl Default for MfaConfig {
    fn default() -> Self {
        Self {
            proximity_timeout_secs: default_proximity_timeout_secs(),
            tag_timeout_secs: default_tag_timeout_secs(),
            tag_subsession_timeout_secs: default_tag_subsession_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            poll_debounce_iterations: default_poll_debounce_iterations(),
            min_tag_uid_bytes: default_min_tag_uid_bytes(),
            verifier_base_url: default_verifier_base_url(),
        }
    }
}

impl MfaConfig {
    /// Load configuration from the environment, falling back to defaults.
    /// A present but unparsable variable is an error, never a silent default.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = parse_env("MFA_PROXIMITY_TIMEOUT_SECS")? {
            config.proximity_timeout_secs = value;
        }
        if let Some(value) = parse_env("MFA_TAG_TIMEOUT_SECS")? {
            config.tag_timeout_secs = value;
        }
        if let Some(value) = parse_env("MFA_TAG_SUBSESSION_TIMEOUT_SECS")? {
            config.tag_subsession_timeout_secs = value;
        }
        if let Some(value) = parse_env("MFA_POLL_INTERVAL_SECS")? {
            config.poll_interval_secs = value;
        }
        if let Some(value) = parse_env("MFA_POLL_DEBOUNCE_ITERATIONS")? {
            config.poll_debounce_iterations = value;
        }
        if let Some(value) = parse_env("MFA_MIN_TAG_UID_BYTES")? {
            config.min_tag_uid_bytes = value;
        }
        if let Ok(url) = env::var("MFA_VERIFIER_BASE_URL") {
            config.verifier_base_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.proximity_timeout_secs == 0 || self.tag_timeout_secs == 0 {
            return Err(Error::Validation(
                "factor timeouts must be non-zero".to_string(),
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(Error::Validation(
                "poll_interval_secs must be non-zero".to_string(),
            ));
        }
        if self.min_tag_uid_bytes == 0 {
            return Err(Error::Validation(
                "min_tag_uid_bytes must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("invalid value for {}: {}", key, value))),
        Err(_) => Ok(None),
    }
}
