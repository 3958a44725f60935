use crate::gitlab::DEFAULT_GITLAB_URL;
use crate::slack::DEFAULT_SLACK_API_URL;
use std::fmt;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_MAX_REQUEST_AGE_SECS: u64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Settings read once at startup and handed to each component.
#[derive(Clone)]
pub struct Config {
    pub signing_secret: String,
    pub bot_token: String,
    pub gitlab_project_id: String,
    pub gitlab_trigger_token: String,
    pub gitlab_url: String,
    pub slack_api_url: String,
    /// Zero disables the replay check.
    pub max_request_age_secs: u64,
    pub port: u16,
    pub dry_run: bool,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("signing_secret", &"[REDACTED]")
            .field("bot_token", &"[REDACTED]")
            .field("gitlab_project_id", &self.gitlab_project_id)
            .field("gitlab_trigger_token", &"[REDACTED]")
            .field("gitlab_url", &self.gitlab_url)
            .field("slack_api_url", &self.slack_api_url)
            .field("max_request_age_secs", &self.max_request_age_secs)
            .field("port", &self.port)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let optional = |name: &'static str, default: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Ok(Self {
            signing_secret: required("SLACK_SIGNING_SECRET")?,
            bot_token: required("SLACK_BOT_TOKEN")?,
            gitlab_project_id: required("GITLAB_PROJECT_ID")?,
            gitlab_trigger_token: required("GITLAB_TRIGGER_TOKEN")?,
            gitlab_url: optional("GITLAB_URL", DEFAULT_GITLAB_URL),
            slack_api_url: optional("SLACK_API_URL", DEFAULT_SLACK_API_URL),
            max_request_age_secs: parse_var(
                "SLACK_REQUEST_MAX_AGE_SECS",
                optional("SLACK_REQUEST_MAX_AGE_SECS", &DEFAULT_MAX_REQUEST_AGE_SECS.to_string()),
            )?,
            port: parse_var("PORT", optional("PORT", &DEFAULT_PORT.to_string()))?,
            dry_run: parse_var("DRY_RUN", optional("DRY_RUN", "false"))?,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::Invalid { name, value })
}
