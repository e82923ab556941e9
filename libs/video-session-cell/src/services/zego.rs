// libs/video-session-cell/src/services/zego.rs
//
// Session driver for the ZegoCloud-style room SDK: an engine logs into a room,
// publishes one local stream carrying audio and video, and plays remote
// streams announced through room stream updates.
//

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    AppId, DriverPhase, DriverSnapshot, JoinOutcome, JoinParams, MediaHandle, MediaKind,
    ProviderConnectionState, ProviderError, ProviderTag,
};
use crate::services::classify::classify;
use crate::services::driver::{with_join_timeout, DriverOptions, SessionDriver, StatePublisher};
use crate::services::lifecycle::{JoinTicket, Lifecycle};
use crate::services::media::PanelSinks;

// ==============================================================================
// SDK SURFACE
// ==============================================================================

#[async_trait]
pub trait ZegoSdk: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn ZegoModule>, ProviderError>;
}

#[async_trait]
pub trait ZegoModule: Send + Sync {
    async fn create_engine(&self, app_id: u64) -> Result<Arc<dyn ZegoEngine>, ProviderError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZegoUser {
    pub user_id: String,
    pub user_name: String,
}

/// Capture constraints for the local stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamConstraints {
    pub microphone_id: Option<String>,
    pub camera_id: Option<String>,
}

#[async_trait]
pub trait ZegoEngine: Send + Sync {
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<ZegoEvent>>;

    async fn login_room(&self, room_id: &str, token: &str, user: &ZegoUser) -> Result<(), ProviderError>;

    async fn create_stream(&self, constraints: &StreamConstraints) -> Result<Arc<dyn ZegoLocalStream>, ProviderError>;

    async fn start_publishing_stream(
        &self,
        stream_id: &str,
        stream: &Arc<dyn ZegoLocalStream>,
    ) -> Result<(), ProviderError>;

    fn stop_publishing_stream(&self, stream_id: &str);

    /// Stops capture on both devices of the stream.
    fn destroy_stream(&self, stream: &Arc<dyn ZegoLocalStream>);

    async fn start_playing_stream(&self, stream_id: &str) -> Result<Arc<dyn ZegoRemoteStream>, ProviderError>;

    fn stop_playing_stream(&self, stream_id: &str);

    async fn logout_room(&self, room_id: &str) -> Result<(), ProviderError>;

    fn destroy_engine(&self);
}

#[async_trait]
pub trait ZegoLocalStream: Send + Sync {
    fn media(&self) -> MediaHandle;

    async fn mute_audio(&self, muted: bool) -> Result<(), ProviderError>;

    async fn mute_video(&self, muted: bool) -> Result<(), ProviderError>;
}

pub trait ZegoRemoteStream: Send + Sync {
    fn media(&self) -> MediaHandle;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZegoStreamInfo {
    pub stream_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamUpdate {
    Add,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZegoEvent {
    RoomStreamUpdate {
        update: StreamUpdate,
        streams: Vec<ZegoStreamInfo>,
    },
    RoomStateChanged(ProviderConnectionState),
}

/// The engine only accepts numeric app ids; text ids must parse as one.
pub fn engine_app_id(app_id: &AppId) -> Result<u64, ProviderError> {
    app_id.as_numeric().ok_or_else(|| {
        ProviderError::new("INVALID_APP_ID", format!("app id '{}' must be numeric", app_id))
    })
}

// ==============================================================================
// DRIVER
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoomPresence {
    Outside,
    LoggingIn,
    LoggedIn,
}

struct PlayingStream {
    stream_id: String,
    // Held so the SDK keeps the stream alive while it renders.
    _stream: Arc<dyn ZegoRemoteStream>,
}

struct ZegoHandle {
    engine: Option<Arc<dyn ZegoEngine>>,
    presence: RoomPresence,
    local: Option<Arc<dyn ZegoLocalStream>>,
    publishing: bool,
    remote: Option<PlayingStream>,
    events: Option<JoinHandle<()>>,
}

impl ZegoHandle {
    fn empty() -> Self {
        Self {
            engine: None,
            presence: RoomPresence::Outside,
            local: None,
            publishing: false,
            remote: None,
            events: None,
        }
    }

    /// The engine stays with the join continuation while login is in flight;
    /// the local stream is handed back to it in that case too.
    fn take_releasable(&mut self) -> ZegoResources {
        if self.presence == RoomPresence::LoggingIn {
            return ZegoResources {
                engine: None,
                logged_in: false,
                local: None,
                publishing: false,
                remote: None,
                events: self.events.take(),
            };
        }

        let logged_in = self.presence == RoomPresence::LoggedIn;
        self.presence = RoomPresence::Outside;
        let publishing = std::mem::take(&mut self.publishing);

        ZegoResources {
            engine: self.engine.take(),
            logged_in,
            local: self.local.take(),
            publishing,
            remote: self.remote.take(),
            events: self.events.take(),
        }
    }
}

struct ZegoResources {
    engine: Option<Arc<dyn ZegoEngine>>,
    logged_in: bool,
    local: Option<Arc<dyn ZegoLocalStream>>,
    publishing: bool,
    remote: Option<PlayingStream>,
    events: Option<JoinHandle<()>>,
}

impl ZegoResources {
    async fn release(self, driver_id: Uuid, room_id: &str, publish_stream_id: &str) {
        if let Some(events) = self.events {
            events.abort();
        }
        let Some(engine) = self.engine else {
            return;
        };

        if self.publishing {
            engine.stop_publishing_stream(publish_stream_id);
        }
        if let Some(local) = &self.local {
            engine.destroy_stream(local);
        }
        if let Some(remote) = &self.remote {
            engine.stop_playing_stream(&remote.stream_id);
        }
        if self.logged_in {
            if let Err(e) = engine.logout_room(room_id).await {
                warn!("Zego driver {} failed to log out of room {}: {}", driver_id, room_id, e);
            }
        }
        engine.destroy_engine();
    }
}

struct ZegoInner {
    id: Uuid,
    sdk: Arc<dyn ZegoSdk>,
    params: JoinParams,
    options: DriverOptions,
    sinks: PanelSinks,
    publish_stream_id: String,
    lifecycle: Arc<Lifecycle>,
    state: StatePublisher,
    handle: Mutex<ZegoHandle>,
    toggle_lock: Mutex<()>,
}

/// Provider driver for the ZegoCloud-style SDK.
pub struct ZegoDriver {
    inner: Arc<ZegoInner>,
}

impl ZegoDriver {
    pub fn new(sdk: Arc<dyn ZegoSdk>, params: JoinParams, sinks: PanelSinks, options: DriverOptions) -> Self {
        let publish_stream_id = format!("{}_{}_main", params.room_id, params.user_id);
        Self {
            inner: Arc::new(ZegoInner {
                id: Uuid::new_v4(),
                sdk,
                params,
                options,
                sinks,
                publish_stream_id,
                lifecycle: Lifecycle::new(),
                state: StatePublisher::new(),
                handle: Mutex::new(ZegoHandle::empty()),
                toggle_lock: Mutex::new(()),
            }),
        }
    }
}

impl ZegoInner {
    async fn run_join(self: &Arc<Self>, ticket: JoinTicket) -> JoinOutcome {
        info!("Zego driver {} logging into room {}", self.id, self.params.room_id);
        self.state.set_phase(DriverPhase::Initializing);

        let app_id = match engine_app_id(&self.params.app_id) {
            Ok(app_id) => app_id,
            Err(e) => return self.fail(&ticket, &e).await,
        };

        let module = match self.sdk.load().await {
            Ok(module) => module,
            Err(e) => return self.fail(&ticket, &e).await,
        };
        if !ticket.is_current() {
            return self.stale("module load");
        }

        let engine = match module.create_engine(app_id).await {
            Ok(engine) => engine,
            Err(e) => return self.fail(&ticket, &e).await,
        };
        {
            let mut handle = self.handle.lock().await;
            if !ticket.is_current() {
                drop(handle);
                engine.destroy_engine();
                return self.stale("engine creation");
            }
            handle.engine = Some(Arc::clone(&engine));
            handle.presence = RoomPresence::LoggingIn;
        }
        self.state.set_phase(DriverPhase::Joining);

        let user = ZegoUser {
            user_id: self.params.user_id.clone(),
            user_name: self.params.display_name.clone(),
        };
        let logged_in = with_join_timeout(
            self.options.join_timeout,
            engine.login_room(&self.params.room_id, &self.params.token, &user),
        )
        .await;

        {
            let mut handle = self.handle.lock().await;
            if !ticket.is_current() {
                let owned = handle.engine.take();
                handle.presence = RoomPresence::Outside;
                drop(handle);
                if let Some(engine) = owned {
                    if logged_in.is_ok() {
                        if let Err(e) = engine.logout_room(&self.params.room_id).await {
                            warn!("Zego driver {} failed to log out of superseded room: {}", self.id, e);
                        }
                    }
                    engine.destroy_engine();
                }
                return self.stale("room login");
            }
            if let Err(e) = logged_in {
                handle.presence = RoomPresence::Outside;
                drop(handle);
                return self.fail(&ticket, &e).await;
            }
            handle.presence = RoomPresence::LoggedIn;
            if let Some(events) = engine.take_events() {
                handle.events = Some(tokio::spawn(Arc::clone(self).run_events(ticket.clone(), events)));
            }
        }
        self.state.set_phase(DriverPhase::MediaAcquiring);

        let constraints = StreamConstraints {
            microphone_id: self.params.preferred_microphone.clone(),
            camera_id: self.params.preferred_camera.clone(),
        };
        let local = match engine.create_stream(&constraints).await {
            Ok(local) => local,
            Err(e) => return self.fail(&ticket, &e).await,
        };
        {
            let mut handle = self.handle.lock().await;
            if !ticket.is_current() {
                drop(handle);
                engine.destroy_stream(&local);
                return self.stale("media acquisition");
            }
            handle.local = Some(Arc::clone(&local));
            self.sinks.show_local(&local.media());
        }
        self.state.set_phase(DriverPhase::Publishing);

        if let Err(e) = engine.start_publishing_stream(&self.publish_stream_id, &local).await {
            return self.fail(&ticket, &e).await;
        }
        {
            let mut handle = self.handle.lock().await;
            if !ticket.is_current() {
                // The room was already left, which ends the publish with it.
                return self.stale("publish");
            }
            handle.publishing = true;
        }

        self.state.connected();
        info!("Zego driver {} connected to room {}", self.id, self.params.room_id);
        JoinOutcome::Connected
    }

    fn stale(&self, step: &str) -> JoinOutcome {
        debug!("Zego driver {} dropped stale {} completion", self.id, step);
        JoinOutcome::StaleDropped
    }

    async fn fail(&self, ticket: &JoinTicket, error: &ProviderError) -> JoinOutcome {
        if !ticket.is_current() {
            return self.stale("failure");
        }
        let kind = classify(error);
        warn!("Zego driver {} failed ({:?}): {}", self.id, kind, error);

        self.lifecycle.invalidate();
        let resources = self.handle.lock().await.take_releasable();
        resources
            .release(self.id, &self.params.room_id, &self.publish_stream_id)
            .await;
        self.sinks.clear_all();
        self.state.failed(kind);
        JoinOutcome::Failed(kind)
    }

    async fn run_events(self: Arc<Self>, ticket: JoinTicket, mut events: mpsc::UnboundedReceiver<ZegoEvent>) {
        while let Some(event) = events.recv().await {
            if !ticket.is_current() {
                break;
            }
            debug!("Zego driver {} event: {:?}", self.id, event);
            match event {
                ZegoEvent::RoomStreamUpdate { update: StreamUpdate::Add, streams } => {
                    // Only the newest remote stream is shown in a one-to-one consultation.
                    if let Some(info) = streams.into_iter().rev().find(|s| s.user_id != self.params.user_id) {
                        self.play_remote(&ticket, info).await;
                    }
                }
                ZegoEvent::RoomStreamUpdate { update: StreamUpdate::Delete, streams } => {
                    self.stop_remote(&streams).await;
                }
                ZegoEvent::RoomStateChanged(ProviderConnectionState::Disconnected { reason }) => {
                    let inner = Arc::clone(&self);
                    let ticket = ticket.clone();
                    tokio::spawn(async move {
                        let error = ProviderError::new("DISCONNECTED", reason);
                        inner.fail(&ticket, &error).await;
                    });
                    break;
                }
                ZegoEvent::RoomStateChanged(state) => {
                    let reconnecting = state == ProviderConnectionState::Reconnecting;
                    self.state.update(|snapshot| snapshot.reconnecting = reconnecting);
                }
            }
        }
    }

    async fn play_remote(&self, ticket: &JoinTicket, info: ZegoStreamInfo) {
        let engine = match self.handle.lock().await.engine.clone() {
            Some(engine) => engine,
            None => return,
        };
        let stream = match engine.start_playing_stream(&info.stream_id).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Zego driver {} could not play stream {}: {}", self.id, info.stream_id, e);
                return;
            }
        };

        let mut handle = self.handle.lock().await;
        if !ticket.is_current() {
            engine.stop_playing_stream(&info.stream_id);
            return;
        }
        if let Some(previous) = handle.remote.take() {
            if previous.stream_id != info.stream_id {
                engine.stop_playing_stream(&previous.stream_id);
            }
        }
        self.sinks.show_remote(&stream.media());
        handle.remote = Some(PlayingStream {
            stream_id: info.stream_id,
            _stream: stream,
        });
        self.state.update(|snapshot| snapshot.remote_present = true);
    }

    async fn stop_remote(&self, streams: &[ZegoStreamInfo]) {
        let mut handle = self.handle.lock().await;
        let playing = handle
            .remote
            .as_ref()
            .is_some_and(|remote| streams.iter().any(|s| s.stream_id == remote.stream_id));
        if !playing {
            return;
        }
        if let (Some(remote), Some(engine)) = (handle.remote.take(), handle.engine.as_ref()) {
            engine.stop_playing_stream(&remote.stream_id);
        }
        self.sinks.clear_remote();
        self.state.update(|snapshot| snapshot.remote_present = false);
    }

    async fn toggle_stream(&self, kind: MediaKind) {
        let _serial = self.toggle_lock.lock().await;
        let Some(local) = self.handle.lock().await.local.clone() else {
            debug!("Zego driver {}: no local stream yet, toggle ignored", self.id);
            return;
        };

        let snapshot = self.state.snapshot();
        let result = match kind {
            MediaKind::Audio => local.mute_audio(!snapshot.state.is_muted).await,
            MediaKind::Video => local.mute_video(!snapshot.state.is_video_off).await,
        };
        match result {
            Ok(()) => self.state.update(|snapshot| match kind {
                MediaKind::Audio => snapshot.state.is_muted = !snapshot.state.is_muted,
                MediaKind::Video => snapshot.state.is_video_off = !snapshot.state.is_video_off,
            }),
            Err(e) => warn!("Zego driver {} failed to toggle {:?}: {}", self.id, kind, e),
        }
    }
}

#[async_trait]
impl SessionDriver for ZegoDriver {
    fn provider(&self) -> ProviderTag {
        ProviderTag::Zego
    }

    #[instrument(skip(self), fields(driver = %self.inner.id))]
    async fn join(&self) -> JoinOutcome {
        match self.inner.lifecycle.begin_join() {
            Some(ticket) => self.inner.run_join(ticket).await,
            None if self.inner.lifecycle.join_started() => {
                debug!("Zego driver {}: join already in progress, ignoring", self.inner.id);
                JoinOutcome::DuplicateIgnored
            }
            None => JoinOutcome::StaleDropped,
        }
    }

    async fn toggle_microphone(&self) {
        self.inner.toggle_stream(MediaKind::Audio).await;
    }

    async fn toggle_camera(&self) {
        self.inner.toggle_stream(MediaKind::Video).await;
    }

    #[instrument(skip(self), fields(driver = %self.inner.id))]
    async fn leave(&self) {
        if !self.inner.lifecycle.tear_down() {
            debug!("Zego driver {} already torn down", self.inner.id);
            return;
        }

        let resources = self.inner.handle.lock().await.take_releasable();
        resources
            .release(self.inner.id, &self.inner.params.room_id, &self.inner.publish_stream_id)
            .await;
        self.inner.sinks.clear_all();
        self.inner.state.torn_down();
        info!("Zego driver {} torn down", self.inner.id);
    }

    fn snapshot(&self) -> DriverSnapshot {
        self.inner.state.snapshot()
    }

    fn subscribe(&self) -> watch::Receiver<DriverSnapshot> {
        self.inner.state.subscribe()
    }
}
