// libs/video-session-cell/src/lib.rs
//! # Video Session Cell
//!
//! Client-side video consultation layer. Negotiates a real-time audio/video
//! session with one of two interchangeable providers and exposes a single
//! connection, mute and camera contract to the UI.
//!
//! ## Features
//!
//! - **Credential resolution**: fetches the signed join credential for a consultation
//! - **Two provider drivers**: Agora-style channel SDK and ZegoCloud-style room SDK
//! - **Lifecycle safety**: every async step is guarded by a generation ticket so a
//!   panel unmounted mid-join never leaks tracks or room memberships
//! - **Error classification**: permission denied, device busy, network timeout
//! - **Unified controls**: one view model and intent set for both providers
//!
//! ## Architecture
//!
//! ```text
//! +-----------------------------------------------------+
//! |                 Video Session Cell                  |
//! +-----------------------------------------------------+
//! |  models.rs       |  Credentials, state & errors     |
//! |  services/       |                                  |
//! |    token.rs      |  Session token resolver          |
//! |    dispatch.rs   |  Provider selection & mounting   |
//! |    driver.rs     |  Shared driver contract          |
//! |    agora.rs      |  Provider driver A               |
//! |    zego.rs       |  Provider driver B               |
//! |    lifecycle.rs  |  Generation & re-entrancy guard  |
//! |    classify.rs   |  SDK error classification        |
//! |    media.rs      |  Mount point sinks               |
//! |    control.rs    |  Unified control surface         |
//! +-----------------------------------------------------+
//! ```
//!
//! ## Control flow
//!
//! 1. The UI asks for a panel for a consultation.
//! 2. [`SessionDispatcher::mount`] resolves the credential and mounts exactly one
//!    driver for its provider tag, or fails closed on an unknown tag.
//! 3. The driver loads its SDK, joins the room, acquires local media, attaches the
//!    local preview and publishes.
//! 4. [`ControlSurface`] mirrors the driver's state and relays mute, camera and
//!    end-call intents back into it.
//! 5. On unmount the driver releases devices and leaves the room exactly once.
//!
//! ## Configuration
//!
//! - `VIDEO_API_BASE_URL` - backend serving `/consultations/{id}/video-token`
//! - `VIDEO_JOIN_TIMEOUT_SECS` - client-side bound on the room join (default 30)
//! - `VIDEO_TOKEN_REQUEST_TIMEOUT_SECS` - credential request timeout (default 10)

pub mod models;
pub mod services;

pub use models::{
    AppId, ConnectionState, DriverPhase, DriverSnapshot, FailureKind, JoinOutcome, JoinParams,
    LocalParticipant, MountPoints, ProviderTag, SessionCredential, VideoSessionError,
};

pub use services::{
    AgoraDriver, ControlSurface, HttpSessionTokenResolver, ProviderRegistry, SessionDispatcher,
    SessionDriver, SessionTokenResolver, VideoPanel, ZegoDriver,
};
