use crate::modules::error::ConfigError;
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::time::Duration;

// Value shipped in deployment templates before the real endpoint is filled in
pub const PLACEHOLDER_ENDPOINT: &str = "YOUR_GOOGLE_APPS_SCRIPT_WEB_APP_URL_HERE";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub submission: SubmissionConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndpointConfig {
    pub url: Option<String>,
}

impl EndpointConfig {
    // The endpoint URL, or None if it is unset, blank or still the placeholder
    pub fn configured_url(&self) -> Option<&str> {
        match self.url.as_deref().map(str::trim) {
            None | Some("") | Some(PLACEHOLDER_ENDPOINT) => None,
            Some(url) => Some(url),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionConfig {
    // Deadline for the direct JSON request
    #[serde(default = "default_direct_timeout")]
    pub direct_timeout_secs: u64,
    // How long to wait for the fallback frame to load
    #[serde(default = "default_fallback_timeout")]
    pub fallback_timeout_secs: u64,
}

impl SubmissionConfig {
    pub fn direct_timeout(&self) -> Duration {
        Duration::from_secs(self.direct_timeout_secs)
    }

    pub fn fallback_timeout(&self) -> Duration {
        Duration::from_secs(self.fallback_timeout_secs)
    }
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            direct_timeout_secs: default_direct_timeout(),
            fallback_timeout_secs: default_fallback_timeout(),
        }
    }
}

fn default_direct_timeout() -> u64 {
    30
}

fn default_fallback_timeout() -> u64 {
    10
}

pub fn parse_config(contents: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(contents)
}

pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let mut file = File::open(path)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;

    let config = parse_config(&contents)?;
    Ok(config)
}
