// libs/video-session-cell/src/services/dispatch.rs
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use shared_config::AppConfig;

use crate::models::{
    DriverPhase, JoinOutcome, JoinParams, LocalParticipant, MountPoints, ProviderTag,
    SessionCredential, VideoSessionError,
};
use crate::services::agora::{AgoraDriver, AgoraSdk};
use crate::services::driver::{DriverOptions, SessionDriver};
use crate::services::media::{MountPointResolver, PanelSinks};
use crate::services::token::SessionTokenResolver;
use crate::services::zego::{ZegoDriver, ZegoSdk};

/// SDK entry points available to this host. A provider without a registered
/// SDK is treated as unsupported.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    agora: Option<Arc<dyn AgoraSdk>>,
    zego: Option<Arc<dyn ZegoSdk>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agora(mut self, sdk: Arc<dyn AgoraSdk>) -> Self {
        self.agora = Some(sdk);
        self
    }

    pub fn with_zego(mut self, sdk: Arc<dyn ZegoSdk>) -> Self {
        self.zego = Some(sdk);
        self
    }

    pub fn supports(&self, provider: &ProviderTag) -> bool {
        match provider {
            ProviderTag::Agora => self.agora.is_some(),
            ProviderTag::Zego => self.zego.is_some(),
            ProviderTag::Unsupported(_) => false,
        }
    }
}

/// What a mounted video panel is currently showing.
#[derive(Clone)]
pub enum PanelState {
    /// Credential fetch failed; the user may retry by remounting.
    TokenFailed { message: String },
    /// Provider tag not handled by this host. Not user-recoverable.
    Unsupported { provider: String },
    Active(Arc<dyn SessionDriver>),
}

/// One mounted video panel: at most one driver, plus its join task.
pub struct VideoPanel {
    consultation_id: String,
    state: PanelState,
    join_task: Option<JoinHandle<JoinOutcome>>,
}

impl VideoPanel {
    pub fn consultation_id(&self) -> &str {
        &self.consultation_id
    }

    pub fn state(&self) -> &PanelState {
        &self.state
    }

    pub fn driver(&self) -> Option<Arc<dyn SessionDriver>> {
        match &self.state {
            PanelState::Active(driver) => Some(Arc::clone(driver)),
            _ => None,
        }
    }

    /// Requests teardown of the active driver. An in-flight join keeps running
    /// until its next suspension point, where it releases what it acquired.
    pub async fn unmount(&self) {
        if let Some(driver) = self.driver() {
            driver.leave().await;
        }
    }

    /// Waits for the join task to finish. Returns `None` when no driver was mounted.
    pub async fn settled(&mut self) -> Option<JoinOutcome> {
        let task = self.join_task.take()?;
        match task.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!("Join task for consultation {} panicked: {}", self.consultation_id, e);
                None
            }
        }
    }
}

/// Dropping a mounted panel tears its driver down in the background.
/// An in-flight join keeps running and releases what it acquired.
impl Drop for VideoPanel {
    fn drop(&mut self) {
        let Some(driver) = self.driver() else {
            return;
        };
        if driver.snapshot().phase == DriverPhase::TornDown {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!("Video panel for consultation {} dropped, tearing down", self.consultation_id);
                runtime.spawn(async move { driver.leave().await });
            }
            Err(_) => warn!(
                "Video panel for consultation {} dropped outside a runtime, driver left mounted",
                self.consultation_id
            ),
        }
    }
}

/// Picks and mounts the driver named by the resolved credential.
pub struct SessionDispatcher {
    resolver: Arc<dyn SessionTokenResolver>,
    providers: ProviderRegistry,
    mounts: Arc<dyn MountPointResolver>,
    options: DriverOptions,
}

impl SessionDispatcher {
    pub fn new(
        resolver: Arc<dyn SessionTokenResolver>,
        providers: ProviderRegistry,
        mounts: Arc<dyn MountPointResolver>,
        config: &AppConfig,
    ) -> Self {
        Self {
            resolver,
            providers,
            mounts,
            options: DriverOptions::from_config(config),
        }
    }

    pub fn with_options(mut self, options: DriverOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds exactly one driver for the credential, or fails closed.
    pub fn select_driver(
        &self,
        credential: &SessionCredential,
        participant: &LocalParticipant,
        mount_points: MountPoints,
    ) -> Result<Arc<dyn SessionDriver>, VideoSessionError> {
        let sinks = PanelSinks::new(Arc::clone(&self.mounts), mount_points.clone());
        let params = JoinParams::new(credential, participant, mount_points);

        match (&credential.provider, &self.providers.agora, &self.providers.zego) {
            (ProviderTag::Agora, Some(sdk), _) => Ok(Arc::new(AgoraDriver::new(
                Arc::clone(sdk),
                params,
                sinks,
                self.options.clone(),
            ))),
            (ProviderTag::Zego, _, Some(sdk)) => Ok(Arc::new(ZegoDriver::new(
                Arc::clone(sdk),
                params,
                sinks,
                self.options.clone(),
            ))),
            (provider, _, _) => Err(VideoSessionError::UnsupportedProvider {
                provider: provider.to_string(),
            }),
        }
    }

    /// Resolves the credential, mounts the matching driver and starts its join.
    #[instrument(skip(self, auth_token, participant, mount_points))]
    pub async fn mount(
        &self,
        consultation_id: &str,
        auth_token: &str,
        participant: &LocalParticipant,
        mount_points: MountPoints,
    ) -> VideoPanel {
        let credential = match self.resolver.resolve_session(consultation_id, auth_token).await {
            Ok(credential) => credential,
            Err(e) => {
                warn!("Video credential unavailable for consultation {}: {}", consultation_id, e);
                return VideoPanel {
                    consultation_id: consultation_id.to_string(),
                    state: PanelState::TokenFailed { message: e.to_string() },
                    join_task: None,
                };
            }
        };

        match self.select_driver(&credential, participant, mount_points) {
            Ok(driver) => {
                info!(
                    "Mounting {} driver for consultation {}",
                    driver.provider(),
                    consultation_id
                );
                let joining = Arc::clone(&driver);
                let join_task = tokio::spawn(async move { joining.join().await });
                VideoPanel {
                    consultation_id: consultation_id.to_string(),
                    state: PanelState::Active(driver),
                    join_task: Some(join_task),
                }
            }
            Err(e) => {
                error!("Refusing to mount video panel for consultation {}: {}", consultation_id, e);
                VideoPanel {
                    consultation_id: consultation_id.to_string(),
                    state: PanelState::Unsupported {
                        provider: credential.provider.to_string(),
                    },
                    join_task: None,
                }
            }
        }
    }
}
