// libs/video-session-cell/src/models.rs
use serde::{Deserialize, Serialize};
use std::fmt;

// ==============================================================================
// SESSION CREDENTIAL MODELS
// ==============================================================================

/// Real-time provider selected by the token endpoint for a consultation.
/// Unknown values are preserved so dispatch can fail closed with the raw tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProviderTag {
    Agora,
    Zego,
    Unsupported(String),
}

impl From<String> for ProviderTag {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "agora" => ProviderTag::Agora,
            "zego" | "zegocloud" => ProviderTag::Zego,
            _ => ProviderTag::Unsupported(raw),
        }
    }
}

impl From<ProviderTag> for String {
    fn from(tag: ProviderTag) -> Self {
        match tag {
            ProviderTag::Agora => "agora".to_string(),
            ProviderTag::Zego => "zego".to_string(),
            ProviderTag::Unsupported(raw) => raw,
        }
    }
}

impl fmt::Display for ProviderTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderTag::Agora => write!(f, "agora"),
            ProviderTag::Zego => write!(f, "zego"),
            ProviderTag::Unsupported(raw) => write!(f, "{}", raw),
        }
    }
}

/// Provider application identifier. The endpoint returns either a number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AppId {
    Numeric(u64),
    Text(String),
}

impl AppId {
    pub fn as_numeric(&self) -> Option<u64> {
        match self {
            AppId::Numeric(id) => Some(*id),
            AppId::Text(text) => text.trim().parse().ok(),
        }
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppId::Numeric(id) => write!(f, "{}", id),
            AppId::Text(text) => write!(f, "{}", text),
        }
    }
}

/// Signed join credential for one consultation attempt.
/// Shape of `GET /consultations/{id}/video-token`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCredential {
    pub provider: ProviderTag,
    #[serde(rename = "appId")]
    pub app_id: AppId,
    pub token: String,
    #[serde(rename = "roomId")]
    pub room_id: String,
}

/// Rendering targets owned by the host UI. The driver only references them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountPoints {
    pub local: String,
    pub remote: String,
}

impl Default for MountPoints {
    fn default() -> Self {
        Self {
            local: "local-video".to_string(),
            remote: "remote-video".to_string(),
        }
    }
}

/// Local participant details supplied by the host when mounting a panel.
#[derive(Debug, Clone, Default)]
pub struct LocalParticipant {
    pub user_id: String,
    pub display_name: String,
    pub preferred_microphone: Option<String>,
    pub preferred_camera: Option<String>,
}

/// Normalized join parameters handed to a driver by dispatch.
#[derive(Debug, Clone)]
pub struct JoinParams {
    pub app_id: AppId,
    pub token: String,
    pub room_id: String,
    pub user_id: String,
    pub display_name: String,
    pub mount_points: MountPoints,
    pub preferred_microphone: Option<String>,
    pub preferred_camera: Option<String>,
}

impl JoinParams {
    pub fn new(credential: &SessionCredential, participant: &LocalParticipant, mount_points: MountPoints) -> Self {
        Self {
            app_id: credential.app_id.clone(),
            token: credential.token.clone(),
            room_id: credential.room_id.clone(),
            user_id: participant.user_id.clone(),
            display_name: participant.display_name.clone(),
            mount_points,
            preferred_microphone: participant.preferred_microphone.clone(),
            preferred_camera: participant.preferred_camera.clone(),
        }
    }
}

// ==============================================================================
// DRIVER STATE MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DriverPhase {
    #[serde(rename = "idle")]
    Idle,
    #[serde(rename = "initializing")]
    Initializing,
    #[serde(rename = "joining")]
    Joining,
    #[serde(rename = "media_acquiring")]
    MediaAcquiring,
    #[serde(rename = "publishing")]
    Publishing,
    #[serde(rename = "connected")]
    Connected,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "torn_down")]
    TornDown,
}

impl DriverPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DriverPhase::Failed | DriverPhase::TornDown)
    }

    pub fn label(&self) -> &'static str {
        match self {
            DriverPhase::Idle => "idle",
            DriverPhase::Initializing => "initializing",
            DriverPhase::Joining => "joining",
            DriverPhase::MediaAcquiring => "requesting camera and microphone",
            DriverPhase::Publishing => "publishing",
            DriverPhase::Connected => "connected",
            DriverPhase::Failed => "failed",
            DriverPhase::TornDown => "ended",
        }
    }
}

/// Classified reason a join attempt or live session failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    #[serde(rename = "permission_denied")]
    PermissionDenied,
    #[serde(rename = "device_busy")]
    DeviceBusy,
    #[serde(rename = "network_timeout")]
    NetworkTimeout,
    #[serde(rename = "unknown")]
    Unknown,
}

impl FailureKind {
    pub fn user_message(&self) -> &'static str {
        match self {
            FailureKind::PermissionDenied => {
                "Camera or microphone access was blocked. Allow access in your browser or system settings and rejoin the call."
            }
            FailureKind::DeviceBusy => {
                "Your camera or microphone is being used by another application. Close other apps or tabs using it and rejoin."
            }
            FailureKind::NetworkTimeout => {
                "Could not reach the video service. Check your internet connection or firewall and rejoin."
            }
            FailureKind::Unknown => "The video call could not be started. Please try again.",
        }
    }

    pub fn status_label(&self) -> &'static str {
        match self {
            FailureKind::PermissionDenied => "permission denied",
            FailureKind::DeviceBusy => "device busy",
            FailureKind::NetworkTimeout => "network timeout",
            FailureKind::Unknown => "error",
        }
    }
}

/// Per-driver connection state mirrored by the control surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectionState {
    pub is_connected: bool,
    pub last_error: Option<String>,
    pub failure: Option<FailureKind>,
    pub is_muted: bool,
    pub is_video_off: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverSnapshot {
    pub phase: DriverPhase,
    pub state: ConnectionState,
    pub remote_present: bool,
    pub reconnecting: bool,
}

impl Default for DriverSnapshot {
    fn default() -> Self {
        Self {
            phase: DriverPhase::Idle,
            state: ConnectionState::default(),
            remote_present: false,
            reconnecting: false,
        }
    }
}

/// Result of a single `join` call on a driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Connected,
    /// A join was already started on this driver instance.
    DuplicateIgnored,
    /// The driver was torn down while the join was suspended; whatever that
    /// step produced has been released.
    StaleDropped,
    Failed(FailureKind),
}

// ==============================================================================
// PROVIDER SDK MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    #[serde(rename = "audio")]
    Audio,
    #[serde(rename = "video")]
    Video,
}

/// Opaque reference to renderable media handed to a media sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaHandle {
    pub stream_id: String,
    pub participant: String,
}

/// Transport-level connection state reported by either SDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderConnectionState {
    Connecting,
    Connected,
    Reconnecting,
    Disconnected { reason: String },
}

/// Error raised by a provider SDK call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ProviderError {
    pub code: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

// ==============================================================================
// ERROR HANDLING
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum VideoSessionError {
    #[error("Could not fetch video credentials: {message}")]
    TokenFetch { message: String },

    #[error("Unsupported video provider: {provider}")]
    UnsupportedProvider { provider: String },

    #[error("Camera or microphone permission denied")]
    PermissionDenied,

    #[error("Camera or microphone is busy")]
    DeviceBusy,

    #[error("Video service timed out")]
    NetworkTimeout,

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Video sessions not configured")]
    NotConfigured,

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl VideoSessionError {
    /// Whether remounting the panel may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            VideoSessionError::UnsupportedProvider { .. } | VideoSessionError::NotConfigured
        )
    }
}

impl From<FailureKind> for VideoSessionError {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::PermissionDenied => VideoSessionError::PermissionDenied,
            FailureKind::DeviceBusy => VideoSessionError::DeviceBusy,
            FailureKind::NetworkTimeout => VideoSessionError::NetworkTimeout,
            FailureKind::Unknown => VideoSessionError::Internal {
                message: kind.user_message().to_string(),
            },
        }
    }
}

impl From<anyhow::Error> for VideoSessionError {
    fn from(err: anyhow::Error) -> Self {
        VideoSessionError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for VideoSessionError {
    fn from(err: reqwest::Error) -> Self {
        VideoSessionError::TokenFetch {
            message: err.to_string(),
        }
    }
}
