// libs/video-session-cell/src/services/control.rs
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::models::{DriverPhase, DriverSnapshot, JoinOutcome, ProviderTag};
use crate::services::dispatch::{PanelState, VideoPanel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatusTone {
    #[serde(rename = "connecting")]
    Connecting,
    #[serde(rename = "live")]
    Live,
    #[serde(rename = "warning")]
    Warning,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "ended")]
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChip {
    pub reason: String,
    pub tone: StatusTone,
}

impl StatusChip {
    fn new(reason: impl Into<String>, tone: StatusTone) -> Self {
        Self {
            reason: reason.into(),
            tone,
        }
    }

    /// Text rendered on the chip, e.g. `status: permission denied`.
    pub fn text(&self) -> String {
        format!("status: {}", self.reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteView {
    Waiting { message: String },
    Live,
}

/// Inset position as fractions of the panel size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PreviewPosition {
    pub x: f32,
    pub y: f32,
}

impl Default for PreviewPosition {
    fn default() -> Self {
        Self { x: 1.0, y: 1.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalPreview {
    pub visible: bool,
    pub video_off: bool,
    pub position: PreviewPosition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlBar {
    pub enabled: bool,
    pub microphone_muted: bool,
    pub camera_off: bool,
    pub fullscreen: bool,
    pub can_retry: bool,
}

/// Everything the rendering layer needs to draw the call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallView {
    pub status: StatusChip,
    pub remote: RemoteView,
    pub local_preview: LocalPreview,
    pub controls: ControlBar,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CallIntent {
    ToggleMicrophone,
    ToggleCamera,
    ToggleFullscreen,
    EndCall,
    MovePreview { x: f32, y: f32 },
}

/// Diagnostic bundle produced by the report-issue control.
#[derive(Debug, Clone, Serialize)]
pub struct IssueReport {
    pub consultation_id: String,
    pub provider: Option<String>,
    pub phase: Option<DriverPhase>,
    pub last_error: Option<String>,
    pub description: String,
    pub reported_at: DateTime<Utc>,
}

/// Presentation layer over a mounted panel. It mirrors driver state and
/// relays intents; the driver remains the only owner of call state.
pub struct ControlSurface {
    panel: VideoPanel,
    updates: Option<watch::Receiver<DriverSnapshot>>,
    fullscreen: bool,
    preview: PreviewPosition,
}

impl ControlSurface {
    pub fn new(panel: VideoPanel) -> Self {
        let updates = panel.driver().map(|driver| driver.subscribe());
        Self {
            panel,
            updates,
            fullscreen: false,
            preview: PreviewPosition::default(),
        }
    }

    pub fn panel(&self) -> &VideoPanel {
        &self.panel
    }

    /// Waits until the active driver publishes a new snapshot.
    /// Returns `false` when there is no driver or it has gone away.
    pub async fn changed(&mut self) -> bool {
        match self.updates.as_mut() {
            Some(updates) => updates.changed().await.is_ok(),
            None => false,
        }
    }

    pub async fn handle(&mut self, intent: CallIntent) {
        debug!("Call intent for consultation {}: {:?}", self.panel.consultation_id(), intent);
        match intent {
            CallIntent::ToggleFullscreen => self.fullscreen = !self.fullscreen,
            CallIntent::MovePreview { x, y } => {
                self.preview = PreviewPosition {
                    x: clamp_fraction(x),
                    y: clamp_fraction(y),
                };
            }
            CallIntent::ToggleMicrophone => {
                if let Some(driver) = self.panel.driver() {
                    driver.toggle_microphone().await;
                }
            }
            CallIntent::ToggleCamera => {
                if let Some(driver) = self.panel.driver() {
                    driver.toggle_camera().await;
                }
            }
            CallIntent::EndCall => {
                self.fullscreen = false;
                self.panel.unmount().await;
            }
        }
    }

    pub fn report_issue(&self, description: impl Into<String>) -> IssueReport {
        let (provider, snapshot) = match self.panel.state() {
            PanelState::Active(driver) => (Some(driver.provider()), Some(driver.snapshot())),
            PanelState::Unsupported { provider } => {
                (Some(ProviderTag::Unsupported(provider.clone())), None)
            }
            PanelState::TokenFailed { .. } => (None, None),
        };
        let report = IssueReport {
            consultation_id: self.panel.consultation_id().to_string(),
            provider: provider.map(|p| p.to_string()),
            phase: snapshot.as_ref().map(|s| s.phase),
            last_error: snapshot
                .and_then(|s| s.state.last_error)
                .or_else(|| self.view().error),
            description: description.into(),
            reported_at: Utc::now(),
        };
        info!(
            "Issue reported for consultation {} (phase: {:?})",
            report.consultation_id, report.phase
        );
        report
    }

    pub fn view(&self) -> CallView {
        let controls = ControlBar {
            enabled: false,
            microphone_muted: false,
            camera_off: false,
            fullscreen: self.fullscreen,
            can_retry: false,
        };
        let hidden_preview = LocalPreview {
            visible: false,
            video_off: false,
            position: self.preview,
        };

        match self.panel.state() {
            PanelState::TokenFailed { message } => CallView {
                status: StatusChip::new("could not load credentials", StatusTone::Error),
                remote: RemoteView::Waiting {
                    message: "We could not prepare your video call. Please retry.".to_string(),
                },
                local_preview: hidden_preview,
                controls: ControlBar {
                    can_retry: true,
                    ..controls
                },
                error: Some(message.clone()),
            },
            PanelState::Unsupported { provider } => CallView {
                status: StatusChip::new("unsupported provider", StatusTone::Error),
                remote: RemoteView::Waiting {
                    message: format!(
                        "This consultation uses a video provider ({}) that is not supported here.",
                        provider
                    ),
                },
                local_preview: hidden_preview,
                controls,
                error: Some(format!("Unsupported video provider: {}", provider)),
            },
            PanelState::Active(driver) => self.active_view(&driver.snapshot(), controls),
        }
    }

    fn active_view(&self, snapshot: &DriverSnapshot, controls: ControlBar) -> CallView {
        let state = &snapshot.state;
        let local_preview = LocalPreview {
            visible: matches!(snapshot.phase, DriverPhase::Publishing | DriverPhase::Connected),
            video_off: state.is_video_off,
            position: self.preview,
        };
        let controls = ControlBar {
            enabled: !snapshot.phase.is_terminal(),
            microphone_muted: state.is_muted,
            camera_off: state.is_video_off,
            can_retry: snapshot.phase.is_terminal(),
            ..controls
        };

        let (status, remote) = match snapshot.phase {
            DriverPhase::Failed => {
                let reason = state
                    .failure
                    .map(|kind| kind.status_label())
                    .unwrap_or("error");
                let message = state
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "The video call failed.".to_string());
                (
                    StatusChip::new(reason, StatusTone::Error),
                    RemoteView::Waiting { message },
                )
            }
            DriverPhase::TornDown => (
                StatusChip::new("call ended", StatusTone::Ended),
                RemoteView::Waiting {
                    message: "The call has ended.".to_string(),
                },
            ),
            DriverPhase::Connected if snapshot.reconnecting => (
                StatusChip::new("reconnecting", StatusTone::Warning),
                RemoteView::Waiting {
                    message: "Connection lost, reconnecting.".to_string(),
                },
            ),
            DriverPhase::Connected if snapshot.remote_present => {
                (StatusChip::new("connected", StatusTone::Live), RemoteView::Live)
            }
            DriverPhase::Connected => (
                StatusChip::new("connected", StatusTone::Live),
                RemoteView::Waiting {
                    message: "Waiting for the other participant to join.".to_string(),
                },
            ),
            phase => (
                StatusChip::new(phase.label(), StatusTone::Connecting),
                RemoteView::Waiting {
                    message: "Connecting to your consultation.".to_string(),
                },
            ),
        };

        CallView {
            status,
            remote,
            local_preview,
            controls,
            error: state.last_error.clone(),
        }
    }

    /// Tears the call down and waits for any in-flight join to release its resources.
    pub async fn unmount(mut self) -> Option<JoinOutcome> {
        self.panel.unmount().await;
        self.panel.settled().await
    }
}

fn clamp_fraction(value: f32) -> f32 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}
