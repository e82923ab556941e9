use std::env;
use std::time::Duration;
use tracing::warn;

const DEFAULT_JOIN_TIMEOUT_SECS: u64 = 30;
const DEFAULT_TOKEN_REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub video_api_base_url: String,
    pub join_timeout: Duration,
    pub token_request_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            video_api_base_url: env::var("VIDEO_API_BASE_URL")
                .unwrap_or_else(|_| {
                    warn!("VIDEO_API_BASE_URL not set, using empty value");
                    String::new()
                }),
            join_timeout: Duration::from_secs(
                Self::seconds_from_env("VIDEO_JOIN_TIMEOUT_SECS", DEFAULT_JOIN_TIMEOUT_SECS),
            ),
            token_request_timeout: Duration::from_secs(Self::seconds_from_env(
                "VIDEO_TOKEN_REQUEST_TIMEOUT_SECS",
                DEFAULT_TOKEN_REQUEST_TIMEOUT_SECS,
            )),
        };

        if !config.is_video_configured() {
            warn!("Video sessions not configured - missing environment variables");
        }

        config
    }

    /// Configuration pointing at an explicit backend, with default timeouts.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            video_api_base_url: base_url.into(),
            join_timeout: Duration::from_secs(DEFAULT_JOIN_TIMEOUT_SECS),
            token_request_timeout: Duration::from_secs(DEFAULT_TOKEN_REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn is_video_configured(&self) -> bool {
        !self.video_api_base_url.is_empty()
    }

    fn seconds_from_env(key: &str, default: u64) -> u64 {
        match env::var(key) {
            Ok(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    warn!("{} has invalid value '{}', using default {}s", key, raw, default);
                    default
                }
            },
            Err(_) => default,
        }
    }
}
