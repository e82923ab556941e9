// libs/video-session-cell/src/services/token.rs
use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::{debug, error, info, instrument};

use shared_config::AppConfig;

use crate::models::{SessionCredential, VideoSessionError};

/// Fetches the signed join credential for a consultation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionTokenResolver: Send + Sync {
    async fn resolve_session(
        &self,
        consultation_id: &str,
        auth_token: &str,
    ) -> Result<SessionCredential, VideoSessionError>;
}

/// Resolver backed by `GET /consultations/{id}/video-token`.
/// No retries: a failure is reported once and the panel offers a retry.
pub struct HttpSessionTokenResolver {
    client: Client,
    base_url: String,
}

impl HttpSessionTokenResolver {
    pub fn new(config: &AppConfig) -> Result<Self, VideoSessionError> {
        if !config.is_video_configured() {
            return Err(VideoSessionError::NotConfigured);
        }

        let client = Client::builder()
            .timeout(config.token_request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.video_api_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn token_url(&self, consultation_id: &str) -> Result<Url, VideoSessionError> {
        if consultation_id.trim().is_empty() {
            return Err(VideoSessionError::TokenFetch {
                message: "Consultation id is empty".to_string(),
            });
        }

        let mut url = Url::parse(&self.base_url).map_err(|e| VideoSessionError::TokenFetch {
            message: format!("Invalid video API base URL '{}': {}", self.base_url, e),
        })?;

        url.path_segments_mut()
            .map_err(|_| VideoSessionError::TokenFetch {
                message: format!("Video API base URL cannot carry a path: {}", self.base_url),
            })?
            .pop_if_empty()
            .extend(["consultations", consultation_id, "video-token"]);

        Ok(url)
    }
}

#[async_trait]
impl SessionTokenResolver for HttpSessionTokenResolver {
    #[instrument(skip(self, auth_token))]
    async fn resolve_session(
        &self,
        consultation_id: &str,
        auth_token: &str,
    ) -> Result<SessionCredential, VideoSessionError> {
        let url = self.token_url(consultation_id)?;
        debug!("Requesting video credential from: {}", url);

        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Bearer {}", auth_token))
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            error!("Video credential request failed: {} - {}", status, response_text);
            return Err(VideoSessionError::TokenFetch {
                message: format!("HTTP {}: {}", status, response_text),
            });
        }

        let credential: SessionCredential = serde_json::from_str(&response_text).map_err(|e| {
            VideoSessionError::TokenFetch {
                message: format!("Failed to parse video credential: {}", e),
            }
        })?;

        info!(
            "Resolved video credential for consultation {} (provider: {}, room: {})",
            consultation_id, credential.provider, credential.room_id
        );
        Ok(credential)
    }
}
