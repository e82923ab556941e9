// libs/video-session-cell/src/services/agora.rs
//
// Session driver for the Agora-style channel SDK: a client joins a channel,
// publishes separate microphone and camera tracks and subscribes to remote
// users as they publish.
//

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    DriverPhase, DriverSnapshot, JoinOutcome, JoinParams, MediaHandle, MediaKind,
    ProviderConnectionState, ProviderError, ProviderTag,
};
use crate::services::classify::classify;
use crate::services::driver::{with_join_timeout, DriverOptions, SessionDriver, StatePublisher};
use crate::services::lifecycle::{JoinTicket, Lifecycle};
use crate::services::media::PanelSinks;

// ==============================================================================
// SDK SURFACE
// ==============================================================================

/// Lazily loads the SDK module.
#[async_trait]
pub trait AgoraSdk: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn AgoraModule>, ProviderError>;
}

#[async_trait]
pub trait AgoraModule: Send + Sync {
    async fn create_client(&self) -> Result<Arc<dyn AgoraClient>, ProviderError>;

    /// Returns `(microphone, camera)`.
    async fn create_microphone_and_camera_tracks(
        &self,
        microphone_id: Option<&str>,
        camera_id: Option<&str>,
    ) -> Result<(Arc<dyn AgoraLocalTrack>, Arc<dyn AgoraLocalTrack>), ProviderError>;
}

#[async_trait]
pub trait AgoraClient: Send + Sync {
    /// Event stream of this client. Yields `Some` once.
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<AgoraEvent>>;

    async fn join(&self, app_id: &str, channel: &str, token: &str, uid: &str) -> Result<(), ProviderError>;

    async fn publish(&self, tracks: &[Arc<dyn AgoraLocalTrack>]) -> Result<(), ProviderError>;

    async fn subscribe(&self, uid: &str, kind: MediaKind) -> Result<Arc<dyn AgoraRemoteTrack>, ProviderError>;

    async fn leave(&self) -> Result<(), ProviderError>;

    fn remove_all_listeners(&self);
}

#[async_trait]
pub trait AgoraLocalTrack: Send + Sync {
    fn kind(&self) -> MediaKind;

    fn media(&self) -> MediaHandle;

    async fn set_enabled(&self, enabled: bool) -> Result<(), ProviderError>;

    /// Stops capture and releases the device.
    fn close(&self);
}

pub trait AgoraRemoteTrack: Send + Sync {
    fn kind(&self) -> MediaKind;

    fn media(&self) -> MediaHandle;

    fn play(&self);

    fn stop(&self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgoraEvent {
    UserPublished { uid: String, kind: MediaKind },
    UserUnpublished { uid: String, kind: MediaKind },
    UserLeft { uid: String },
    ConnectionStateChange(ProviderConnectionState),
}

// ==============================================================================
// DRIVER
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Presence {
    Outside,
    Joining,
    Joined,
}

#[derive(Default)]
struct RemoteUser {
    uid: String,
    audio: Option<Arc<dyn AgoraRemoteTrack>>,
    video: Option<Arc<dyn AgoraRemoteTrack>>,
}

impl RemoteUser {
    fn stop(&self) {
        if let Some(audio) = &self.audio {
            audio.stop();
        }
        if let Some(video) = &self.video {
            video.stop();
        }
    }
}

/// Everything the driver exclusively owns. Whoever takes a resource out of
/// this handle is responsible for releasing it.
struct AgoraHandle {
    client: Option<Arc<dyn AgoraClient>>,
    presence: Presence,
    microphone: Option<Arc<dyn AgoraLocalTrack>>,
    camera: Option<Arc<dyn AgoraLocalTrack>>,
    remote: Option<RemoteUser>,
    events: Option<JoinHandle<()>>,
}

impl AgoraHandle {
    fn empty() -> Self {
        Self {
            client: None,
            presence: Presence::Outside,
            microphone: None,
            camera: None,
            remote: None,
            events: None,
        }
    }

    /// Takes everything that is safe to release now. A client whose join call
    /// is still in flight stays with the join continuation.
    fn take_releasable(&mut self) -> AgoraResources {
        let client = if self.presence == Presence::Joining {
            None
        } else {
            self.client.take()
        };
        let joined = client.is_some() && self.presence == Presence::Joined;
        if client.is_some() {
            self.presence = Presence::Outside;
        }

        AgoraResources {
            client,
            joined,
            tracks: [self.microphone.take(), self.camera.take()].into_iter().flatten().collect(),
            remote: self.remote.take(),
            events: self.events.take(),
        }
    }
}

struct AgoraResources {
    client: Option<Arc<dyn AgoraClient>>,
    joined: bool,
    tracks: Vec<Arc<dyn AgoraLocalTrack>>,
    remote: Option<RemoteUser>,
    events: Option<JoinHandle<()>>,
}

impl AgoraResources {
    /// Local tracks are closed before the network leave so devices are freed
    /// even when the leave call fails.
    async fn release(self, driver_id: Uuid) {
        if let Some(events) = self.events {
            events.abort();
        }
        for track in &self.tracks {
            track.close();
        }
        if let Some(remote) = &self.remote {
            remote.stop();
        }
        if let Some(client) = self.client {
            client.remove_all_listeners();
            if self.joined {
                if let Err(e) = client.leave().await {
                    warn!("Agora driver {} failed to leave channel: {}", driver_id, e);
                }
            }
        }
    }
}

struct AgoraInner {
    id: Uuid,
    sdk: Arc<dyn AgoraSdk>,
    params: JoinParams,
    options: DriverOptions,
    sinks: PanelSinks,
    lifecycle: Arc<Lifecycle>,
    state: StatePublisher,
    handle: Mutex<AgoraHandle>,
    toggle_lock: Mutex<()>,
}

/// Provider driver for the Agora-style SDK.
pub struct AgoraDriver {
    inner: Arc<AgoraInner>,
}

impl AgoraDriver {
    pub fn new(sdk: Arc<dyn AgoraSdk>, params: JoinParams, sinks: PanelSinks, options: DriverOptions) -> Self {
        Self {
            inner: Arc::new(AgoraInner {
                id: Uuid::new_v4(),
                sdk,
                params,
                options,
                sinks,
                lifecycle: Lifecycle::new(),
                state: StatePublisher::new(),
                handle: Mutex::new(AgoraHandle::empty()),
                toggle_lock: Mutex::new(()),
            }),
        }
    }
}

impl AgoraInner {
    async fn run_join(self: &Arc<Self>, ticket: JoinTicket) -> JoinOutcome {
        info!("Agora driver {} joining channel {}", self.id, self.params.room_id);
        self.state.set_phase(DriverPhase::Initializing);

        let module = match self.sdk.load().await {
            Ok(module) => module,
            Err(e) => return self.fail(&ticket, &e).await,
        };
        if !ticket.is_current() {
            return self.stale("module load");
        }

        let client = match module.create_client().await {
            Ok(client) => client,
            Err(e) => return self.fail(&ticket, &e).await,
        };
        {
            let mut handle = self.handle.lock().await;
            if !ticket.is_current() {
                drop(handle);
                client.remove_all_listeners();
                return self.stale("client creation");
            }
            handle.client = Some(Arc::clone(&client));
            handle.presence = Presence::Joining;
        }
        self.state.set_phase(DriverPhase::Joining);

        let app_id = self.params.app_id.to_string();
        let joined = with_join_timeout(
            self.options.join_timeout,
            client.join(&app_id, &self.params.room_id, &self.params.token, &self.params.user_id),
        )
        .await;

        {
            let mut handle = self.handle.lock().await;
            if !ticket.is_current() {
                // leave() left the in-flight client to us.
                let owned = handle.client.take();
                handle.presence = Presence::Outside;
                drop(handle);
                if let Some(client) = owned {
                    client.remove_all_listeners();
                    if joined.is_ok() {
                        if let Err(e) = client.leave().await {
                            warn!("Agora driver {} failed to leave superseded channel: {}", self.id, e);
                        }
                    }
                }
                return self.stale("channel join");
            }
            if let Err(e) = joined {
                handle.presence = Presence::Outside;
                drop(handle);
                return self.fail(&ticket, &e).await;
            }
            handle.presence = Presence::Joined;
            if let Some(events) = client.take_events() {
                handle.events = Some(tokio::spawn(Arc::clone(self).run_events(ticket.clone(), events)));
            }
        }
        self.state.set_phase(DriverPhase::MediaAcquiring);

        let tracks = module
            .create_microphone_and_camera_tracks(
                self.params.preferred_microphone.as_deref(),
                self.params.preferred_camera.as_deref(),
            )
            .await;
        let (microphone, camera) = match tracks {
            Ok(tracks) => tracks,
            Err(e) => return self.fail(&ticket, &e).await,
        };
        {
            let mut handle = self.handle.lock().await;
            if !ticket.is_current() {
                drop(handle);
                microphone.close();
                camera.close();
                return self.stale("media acquisition");
            }
            handle.microphone = Some(Arc::clone(&microphone));
            handle.camera = Some(Arc::clone(&camera));
            self.sinks.show_local(&camera.media());
        }
        self.state.set_phase(DriverPhase::Publishing);

        if let Err(e) = client.publish(&[microphone, camera]).await {
            return self.fail(&ticket, &e).await;
        }
        if !ticket.is_current() {
            return self.stale("publish");
        }

        self.state.connected();
        info!("Agora driver {} connected to channel {}", self.id, self.params.room_id);
        JoinOutcome::Connected
    }

    fn stale(&self, step: &str) -> JoinOutcome {
        debug!("Agora driver {} dropped stale {} completion", self.id, step);
        JoinOutcome::StaleDropped
    }

    /// Releases everything and records the classified failure.
    async fn fail(&self, ticket: &JoinTicket, error: &ProviderError) -> JoinOutcome {
        if !ticket.is_current() {
            return self.stale("failure");
        }
        let kind = classify(error);
        warn!("Agora driver {} failed ({:?}): {}", self.id, kind, error);

        self.lifecycle.invalidate();
        let resources = self.handle.lock().await.take_releasable();
        resources.release(self.id).await;
        self.sinks.clear_all();
        self.state.failed(kind);
        JoinOutcome::Failed(kind)
    }

    async fn run_events(self: Arc<Self>, ticket: JoinTicket, mut events: mpsc::UnboundedReceiver<AgoraEvent>) {
        while let Some(event) = events.recv().await {
            if !ticket.is_current() {
                break;
            }
            debug!("Agora driver {} event: {:?}", self.id, event);
            match event {
                AgoraEvent::UserPublished { uid, kind } => self.on_user_published(&ticket, uid, kind).await,
                AgoraEvent::UserUnpublished { uid, kind } => self.on_user_unpublished(&uid, kind).await,
                AgoraEvent::UserLeft { uid } => self.on_user_left(&uid).await,
                AgoraEvent::ConnectionStateChange(state) => {
                    if let ProviderConnectionState::Disconnected { reason } = state {
                        let inner = Arc::clone(&self);
                        let ticket = ticket.clone();
                        tokio::spawn(async move {
                            let error = ProviderError::new("DISCONNECTED", reason);
                            inner.fail(&ticket, &error).await;
                        });
                        break;
                    }
                    let reconnecting = state == ProviderConnectionState::Reconnecting;
                    self.state.update(|snapshot| snapshot.reconnecting = reconnecting);
                }
            }
        }
    }

    async fn on_user_published(&self, ticket: &JoinTicket, uid: String, kind: MediaKind) {
        let client = match self.handle.lock().await.client.clone() {
            Some(client) => client,
            None => return,
        };
        let track = match client.subscribe(&uid, kind).await {
            Ok(track) => track,
            Err(e) => {
                warn!("Agora driver {} could not subscribe to {} {:?}: {}", self.id, uid, kind, e);
                return;
            }
        };

        let mut handle = self.handle.lock().await;
        if !ticket.is_current() {
            track.stop();
            return;
        }

        // One remote participant per consultation: a new publisher replaces the old one.
        let mut remote = match handle.remote.take() {
            Some(existing) if existing.uid == uid => existing,
            Some(previous) => {
                previous.stop();
                self.sinks.clear_remote();
                self.state.update(|snapshot| snapshot.remote_present = false);
                RemoteUser {
                    uid: uid.clone(),
                    ..Default::default()
                }
            }
            None => RemoteUser {
                uid: uid.clone(),
                ..Default::default()
            },
        };

        match kind {
            MediaKind::Video => {
                if let Some(old) = remote.video.replace(Arc::clone(&track)) {
                    old.stop();
                }
                self.sinks.show_remote(&track.media());
                self.state.update(|snapshot| snapshot.remote_present = true);
            }
            MediaKind::Audio => {
                if let Some(old) = remote.audio.replace(Arc::clone(&track)) {
                    old.stop();
                }
                track.play();
            }
        }
        handle.remote = Some(remote);
    }

    async fn on_user_unpublished(&self, uid: &str, kind: MediaKind) {
        let mut handle = self.handle.lock().await;
        let Some(remote) = handle.remote.as_mut().filter(|remote| remote.uid == uid) else {
            return;
        };
        match kind {
            MediaKind::Video => {
                if let Some(video) = remote.video.take() {
                    video.stop();
                }
                self.sinks.clear_remote();
                self.state.update(|snapshot| snapshot.remote_present = false);
            }
            MediaKind::Audio => {
                if let Some(audio) = remote.audio.take() {
                    audio.stop();
                }
            }
        }
    }

    async fn on_user_left(&self, uid: &str) {
        let mut handle = self.handle.lock().await;
        if handle.remote.as_ref().is_some_and(|remote| remote.uid == uid) {
            if let Some(remote) = handle.remote.take() {
                remote.stop();
            }
            self.sinks.clear_remote();
            self.state.update(|snapshot| snapshot.remote_present = false);
            info!("Agora driver {}: remote user {} left", self.id, uid);
        }
    }

    async fn toggle_track(&self, kind: MediaKind) {
        let _serial = self.toggle_lock.lock().await;
        let track = {
            let handle = self.handle.lock().await;
            match kind {
                MediaKind::Audio => handle.microphone.clone(),
                MediaKind::Video => handle.camera.clone(),
            }
        };
        let Some(track) = track else {
            debug!("Agora driver {}: no {:?} track yet, toggle ignored", self.id, kind);
            return;
        };

        let snapshot = self.state.snapshot();
        let currently_off = match kind {
            MediaKind::Audio => snapshot.state.is_muted,
            MediaKind::Video => snapshot.state.is_video_off,
        };
        match track.set_enabled(currently_off).await {
            Ok(()) => self.state.update(|snapshot| match kind {
                MediaKind::Audio => snapshot.state.is_muted = !currently_off,
                MediaKind::Video => snapshot.state.is_video_off = !currently_off,
            }),
            Err(e) => warn!("Agora driver {} failed to toggle {:?}: {}", self.id, kind, e),
        }
    }
}

#[async_trait]
impl SessionDriver for AgoraDriver {
    fn provider(&self) -> ProviderTag {
        ProviderTag::Agora
    }

    #[instrument(skip(self), fields(driver = %self.inner.id))]
    async fn join(&self) -> JoinOutcome {
        match self.inner.lifecycle.begin_join() {
            Some(ticket) => self.inner.run_join(ticket).await,
            None if self.inner.lifecycle.join_started() => {
                debug!("Agora driver {}: join already in progress, ignoring", self.inner.id);
                JoinOutcome::DuplicateIgnored
            }
            None => JoinOutcome::StaleDropped,
        }
    }

    async fn toggle_microphone(&self) {
        self.inner.toggle_track(MediaKind::Audio).await;
    }

    async fn toggle_camera(&self) {
        self.inner.toggle_track(MediaKind::Video).await;
    }

    #[instrument(skip(self), fields(driver = %self.inner.id))]
    async fn leave(&self) {
        if !self.inner.lifecycle.tear_down() {
            debug!("Agora driver {} already torn down", self.inner.id);
            return;
        }

        let resources = self.inner.handle.lock().await.take_releasable();
        resources.release(self.inner.id).await;
        self.inner.sinks.clear_all();
        self.inner.state.torn_down();
        info!("Agora driver {} torn down", self.inner.id);
    }

    fn snapshot(&self) -> DriverSnapshot {
        self.inner.state.snapshot()
    }

    fn subscribe(&self) -> watch::Receiver<DriverSnapshot> {
        self.inner.state.subscribe()
    }
}
