// Test doubles for the provider SDKs, mount points and credential endpoint.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify, Semaphore};

use video_session_cell::models::{
    AppId, DriverSnapshot, JoinParams, LocalParticipant, MediaHandle, MediaKind, MountPoints,
    ProviderError, ProviderTag, SessionCredential, VideoSessionError,
};
use video_session_cell::services::agora::{
    AgoraClient, AgoraEvent, AgoraLocalTrack, AgoraModule, AgoraRemoteTrack, AgoraSdk,
};
use video_session_cell::services::media::{MediaSink, MountPointResolver, PanelSinks};
use video_session_cell::services::token::SessionTokenResolver;
use video_session_cell::services::zego::{
    StreamConstraints, ZegoEngine, ZegoEvent, ZegoLocalStream, ZegoModule, ZegoRemoteStream,
    ZegoSdk, ZegoUser,
};

// ==============================================================================
// GATES
// ==============================================================================

/// Holds an async SDK step open until the test releases it.
pub struct Gate {
    reached: Notify,
    release: Semaphore,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            reached: Notify::new(),
            release: Semaphore::new(0),
        })
    }

    async fn pass(&self) {
        self.reached.notify_one();
        if let Ok(permit) = self.release.acquire().await {
            permit.forget();
        }
    }

    pub async fn reached(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.reached.notified())
            .await
            .expect("gated step was never reached");
    }

    pub fn open(&self) {
        self.release.add_permits(1);
    }
}

async fn pass_gate(gate: &Option<Arc<Gate>>) {
    if let Some(gate) = gate {
        gate.pass().await;
    }
}

pub async fn wait_for_snapshot(
    mut updates: watch::Receiver<DriverSnapshot>,
    predicate: impl FnMut(&DriverSnapshot) -> bool,
) -> DriverSnapshot {
    tokio::time::timeout(Duration::from_secs(5), updates.wait_for(predicate))
        .await
        .expect("driver snapshot never matched")
        .expect("driver dropped")
        .clone()
}

// ==============================================================================
// MOUNT POINTS
// ==============================================================================

#[derive(Default)]
pub struct RecordingSink {
    current: Mutex<Option<MediaHandle>>,
    attaches: AtomicUsize,
}

impl RecordingSink {
    pub fn current(&self) -> Option<MediaHandle> {
        self.current.lock().unwrap().clone()
    }

    pub fn attach_count(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }
}

impl MediaSink for RecordingSink {
    fn attach(&self, media: &MediaHandle) {
        self.attaches.fetch_add(1, Ordering::SeqCst);
        *self.current.lock().unwrap() = Some(media.clone());
    }

    fn clear(&self) {
        *self.current.lock().unwrap() = None;
    }
}

pub struct FakeMounts {
    sinks: HashMap<String, Arc<RecordingSink>>,
}

impl FakeMounts {
    pub fn new() -> Arc<Self> {
        let mounts = MountPoints::default();
        let mut sinks = HashMap::new();
        sinks.insert(mounts.local, Arc::new(RecordingSink::default()));
        sinks.insert(mounts.remote, Arc::new(RecordingSink::default()));
        Arc::new(Self { sinks })
    }

    pub fn local(&self) -> Arc<RecordingSink> {
        Arc::clone(&self.sinks[&MountPoints::default().local])
    }

    pub fn remote(&self) -> Arc<RecordingSink> {
        Arc::clone(&self.sinks[&MountPoints::default().remote])
    }
}

impl MountPointResolver for FakeMounts {
    fn resolve(&self, mount_id: &str) -> Option<Arc<dyn MediaSink>> {
        self.sinks
            .get(mount_id)
            .map(|sink| Arc::clone(sink) as Arc<dyn MediaSink>)
    }
}

pub fn panel_sinks(mounts: &Arc<FakeMounts>) -> PanelSinks {
    PanelSinks::new(Arc::clone(mounts) as Arc<dyn MountPointResolver>, MountPoints::default())
}

// ==============================================================================
// CREDENTIALS
// ==============================================================================

pub fn credential(provider: &str, app_id: AppId) -> SessionCredential {
    SessionCredential {
        provider: ProviderTag::from(provider.to_string()),
        app_id,
        token: "t1".to_string(),
        room_id: "room-1".to_string(),
    }
}

pub fn participant() -> LocalParticipant {
    LocalParticipant {
        user_id: "patient-7".to_string(),
        display_name: "Pat Patient".to_string(),
        preferred_microphone: Some("mic-1".to_string()),
        preferred_camera: None,
    }
}

pub fn join_params(provider: &str, app_id: AppId) -> JoinParams {
    JoinParams::new(&credential(provider, app_id), &participant(), MountPoints::default())
}

pub struct FixedResolver {
    result: Mutex<Option<Result<SessionCredential, VideoSessionError>>>,
    pub calls: AtomicUsize,
}

impl FixedResolver {
    pub fn ok(credential: SessionCredential) -> Arc<Self> {
        Arc::new(Self {
            result: Mutex::new(Some(Ok(credential))),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SessionTokenResolver for FixedResolver {
    async fn resolve_session(
        &self,
        _consultation_id: &str,
        _auth_token: &str,
    ) -> Result<SessionCredential, VideoSessionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.result.lock().unwrap().as_ref() {
            Some(Ok(credential)) => Ok(credential.clone()),
            _ => Err(VideoSessionError::TokenFetch {
                message: "unavailable".to_string(),
            }),
        }
    }
}

// ==============================================================================
// AGORA-STYLE SDK
// ==============================================================================

pub struct FakeTrack {
    kind: MediaKind,
    id: String,
    pub closed: AtomicBool,
    pub enabled: AtomicBool,
}

impl FakeTrack {
    fn new(kind: MediaKind, id: String) -> Arc<Self> {
        Arc::new(Self {
            kind,
            id,
            closed: AtomicBool::new(false),
            enabled: AtomicBool::new(true),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgoraLocalTrack for FakeTrack {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn media(&self) -> MediaHandle {
        MediaHandle {
            stream_id: self.id.clone(),
            participant: "local".to_string(),
        }
    }

    async fn set_enabled(&self, enabled: bool) -> Result<(), ProviderError> {
        self.enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub struct FakeRemoteTrack {
    kind: MediaKind,
    uid: String,
    pub playing: AtomicBool,
}

impl AgoraRemoteTrack for FakeRemoteTrack {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn media(&self) -> MediaHandle {
        MediaHandle {
            stream_id: format!("{}-{:?}", self.uid, self.kind),
            participant: self.uid.clone(),
        }
    }

    fn play(&self) {
        self.playing.store(true, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.playing.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct AgoraBehavior {
    pub load_gate: Option<Arc<Gate>>,
    pub join_gate: Option<Arc<Gate>>,
    pub media_gate: Option<Arc<Gate>>,
    pub join_error: Option<ProviderError>,
    pub media_error: Option<ProviderError>,
    pub leave_error: Option<ProviderError>,
}

pub struct FakeAgoraClient {
    behavior: Arc<AgoraBehavior>,
    events_tx: mpsc::UnboundedSender<AgoraEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<AgoraEvent>>>,
    pub join_args: Mutex<Option<(String, String, String, String)>>,
    pub join_calls: AtomicUsize,
    pub publish_calls: AtomicUsize,
    pub leave_calls: AtomicUsize,
    pub listeners_removed: AtomicBool,
    pub remote_tracks: Mutex<Vec<Arc<FakeRemoteTrack>>>,
}

impl FakeAgoraClient {
    pub fn emit(&self, event: AgoraEvent) {
        let _ = self.events_tx.send(event);
    }

    pub fn leave_count(&self) -> usize {
        self.leave_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgoraClient for FakeAgoraClient {
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<AgoraEvent>> {
        self.events_rx.lock().unwrap().take()
    }

    async fn join(&self, app_id: &str, channel: &str, token: &str, uid: &str) -> Result<(), ProviderError> {
        self.join_calls.fetch_add(1, Ordering::SeqCst);
        *self.join_args.lock().unwrap() = Some((
            app_id.to_string(),
            channel.to_string(),
            token.to_string(),
            uid.to_string(),
        ));
        pass_gate(&self.behavior.join_gate).await;
        match &self.behavior.join_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn publish(&self, _tracks: &[Arc<dyn AgoraLocalTrack>]) -> Result<(), ProviderError> {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&self, uid: &str, kind: MediaKind) -> Result<Arc<dyn AgoraRemoteTrack>, ProviderError> {
        let track = Arc::new(FakeRemoteTrack {
            kind,
            uid: uid.to_string(),
            playing: AtomicBool::new(false),
        });
        self.remote_tracks.lock().unwrap().push(Arc::clone(&track));
        Ok(track)
    }

    async fn leave(&self) -> Result<(), ProviderError> {
        self.leave_calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior.leave_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn remove_all_listeners(&self) {
        self.listeners_removed.store(true, Ordering::SeqCst);
    }
}

pub struct FakeAgoraModule {
    behavior: Arc<AgoraBehavior>,
    pub clients: Mutex<Vec<Arc<FakeAgoraClient>>>,
    pub tracks: Mutex<Vec<Arc<FakeTrack>>>,
    pub device_requests: Mutex<Vec<(Option<String>, Option<String>)>>,
}

impl FakeAgoraModule {
    pub fn last_client(&self) -> Arc<FakeAgoraClient> {
        Arc::clone(self.clients.lock().unwrap().last().expect("no client created"))
    }

    pub fn all_tracks_closed(&self) -> bool {
        self.tracks.lock().unwrap().iter().all(|track| track.is_closed())
    }

    pub fn track(&self, kind: MediaKind) -> Arc<FakeTrack> {
        let tracks = self.tracks.lock().unwrap();
        Arc::clone(tracks.iter().rev().find(|t| t.kind == kind).expect("track not created"))
    }

    pub fn track_count(&self) -> usize {
        self.tracks.lock().unwrap().len()
    }
}

#[async_trait]
impl AgoraModule for FakeAgoraModule {
    async fn create_client(&self) -> Result<Arc<dyn AgoraClient>, ProviderError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let client = Arc::new(FakeAgoraClient {
            behavior: Arc::clone(&self.behavior),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            join_args: Mutex::new(None),
            join_calls: AtomicUsize::new(0),
            publish_calls: AtomicUsize::new(0),
            leave_calls: AtomicUsize::new(0),
            listeners_removed: AtomicBool::new(false),
            remote_tracks: Mutex::new(Vec::new()),
        });
        self.clients.lock().unwrap().push(Arc::clone(&client));
        Ok(client)
    }

    async fn create_microphone_and_camera_tracks(
        &self,
        microphone_id: Option<&str>,
        camera_id: Option<&str>,
    ) -> Result<(Arc<dyn AgoraLocalTrack>, Arc<dyn AgoraLocalTrack>), ProviderError> {
        self.device_requests
            .lock()
            .unwrap()
            .push((microphone_id.map(String::from), camera_id.map(String::from)));
        pass_gate(&self.behavior.media_gate).await;
        if let Some(e) = &self.behavior.media_error {
            return Err(e.clone());
        }

        let n = self.tracks.lock().unwrap().len();
        let microphone = FakeTrack::new(MediaKind::Audio, format!("mic-{}", n));
        let camera = FakeTrack::new(MediaKind::Video, format!("cam-{}", n));
        let mut tracks = self.tracks.lock().unwrap();
        tracks.push(Arc::clone(&microphone));
        tracks.push(Arc::clone(&camera));
        Ok((
            microphone as Arc<dyn AgoraLocalTrack>,
            camera as Arc<dyn AgoraLocalTrack>,
        ))
    }
}

pub struct FakeAgoraSdk {
    pub module: Arc<FakeAgoraModule>,
    pub load_calls: AtomicUsize,
}

impl FakeAgoraSdk {
    pub fn new(behavior: AgoraBehavior) -> Arc<Self> {
        Arc::new(Self {
            module: Arc::new(FakeAgoraModule {
                behavior: Arc::new(behavior),
                clients: Mutex::new(Vec::new()),
                tracks: Mutex::new(Vec::new()),
                device_requests: Mutex::new(Vec::new()),
            }),
            load_calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl AgoraSdk for FakeAgoraSdk {
    async fn load(&self) -> Result<Arc<dyn AgoraModule>, ProviderError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        pass_gate(&self.module.behavior.load_gate).await;
        Ok(Arc::clone(&self.module) as Arc<dyn AgoraModule>)
    }
}

// ==============================================================================
// ZEGO-STYLE SDK
// ==============================================================================

pub struct FakeLocalStream {
    id: String,
    pub destroyed: AtomicBool,
    pub audio_muted: AtomicBool,
    pub video_muted: AtomicBool,
}

impl FakeLocalStream {
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ZegoLocalStream for FakeLocalStream {
    fn media(&self) -> MediaHandle {
        MediaHandle {
            stream_id: self.id.clone(),
            participant: "local".to_string(),
        }
    }

    async fn mute_audio(&self, muted: bool) -> Result<(), ProviderError> {
        self.audio_muted.store(muted, Ordering::SeqCst);
        Ok(())
    }

    async fn mute_video(&self, muted: bool) -> Result<(), ProviderError> {
        self.video_muted.store(muted, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeRemoteStream {
    stream_id: String,
}

impl ZegoRemoteStream for FakeRemoteStream {
    fn media(&self) -> MediaHandle {
        MediaHandle {
            stream_id: self.stream_id.clone(),
            participant: "remote".to_string(),
        }
    }
}

#[derive(Default)]
pub struct ZegoBehavior {
    pub login_gate: Option<Arc<Gate>>,
    pub stream_gate: Option<Arc<Gate>>,
    pub login_error: Option<ProviderError>,
    pub stream_error: Option<ProviderError>,
    pub publish_error: Option<ProviderError>,
    pub logout_error: Option<ProviderError>,
}

pub struct FakeZegoEngine {
    behavior: Arc<ZegoBehavior>,
    pub app_id: u64,
    events_tx: mpsc::UnboundedSender<ZegoEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<ZegoEvent>>>,
    pub login_args: Mutex<Option<(String, String, ZegoUser)>>,
    pub streams: Mutex<Vec<Arc<FakeLocalStream>>>,
    pub constraints: Mutex<Vec<StreamConstraints>>,
    pub published: Mutex<Vec<String>>,
    pub stopped_publishing: Mutex<Vec<String>>,
    pub playing: Mutex<Vec<String>>,
    pub logout_calls: AtomicUsize,
    pub destroy_calls: AtomicUsize,
}

impl FakeZegoEngine {
    pub fn emit(&self, event: ZegoEvent) {
        let _ = self.events_tx.send(event);
    }

    pub fn logout_count(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    pub fn destroy_count(&self) -> usize {
        self.destroy_calls.load(Ordering::SeqCst)
    }

    pub fn all_streams_destroyed(&self) -> bool {
        self.streams.lock().unwrap().iter().all(|s| s.is_destroyed())
    }

    pub fn stream(&self) -> Arc<FakeLocalStream> {
        Arc::clone(self.streams.lock().unwrap().last().expect("no local stream"))
    }

    pub fn playing(&self) -> Vec<String> {
        self.playing.lock().unwrap().clone()
    }
}

#[async_trait]
impl ZegoEngine for FakeZegoEngine {
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<ZegoEvent>> {
        self.events_rx.lock().unwrap().take()
    }

    async fn login_room(&self, room_id: &str, token: &str, user: &ZegoUser) -> Result<(), ProviderError> {
        *self.login_args.lock().unwrap() = Some((room_id.to_string(), token.to_string(), user.clone()));
        pass_gate(&self.behavior.login_gate).await;
        match &self.behavior.login_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn create_stream(&self, constraints: &StreamConstraints) -> Result<Arc<dyn ZegoLocalStream>, ProviderError> {
        self.constraints.lock().unwrap().push(constraints.clone());
        pass_gate(&self.behavior.stream_gate).await;
        if let Some(e) = &self.behavior.stream_error {
            return Err(e.clone());
        }
        let mut streams = self.streams.lock().unwrap();
        let stream = Arc::new(FakeLocalStream {
            id: format!("local-{}", streams.len()),
            destroyed: AtomicBool::new(false),
            audio_muted: AtomicBool::new(false),
            video_muted: AtomicBool::new(false),
        });
        streams.push(Arc::clone(&stream));
        Ok(stream)
    }

    async fn start_publishing_stream(
        &self,
        stream_id: &str,
        _stream: &Arc<dyn ZegoLocalStream>,
    ) -> Result<(), ProviderError> {
        if let Some(e) = &self.behavior.publish_error {
            return Err(e.clone());
        }
        self.published.lock().unwrap().push(stream_id.to_string());
        Ok(())
    }

    fn stop_publishing_stream(&self, stream_id: &str) {
        self.stopped_publishing.lock().unwrap().push(stream_id.to_string());
    }

    fn destroy_stream(&self, stream: &Arc<dyn ZegoLocalStream>) {
        let id = stream.media().stream_id;
        for local in self.streams.lock().unwrap().iter() {
            if local.id == id {
                local.destroyed.store(true, Ordering::SeqCst);
            }
        }
    }

    async fn start_playing_stream(&self, stream_id: &str) -> Result<Arc<dyn ZegoRemoteStream>, ProviderError> {
        self.playing.lock().unwrap().push(stream_id.to_string());
        Ok(Arc::new(FakeRemoteStream {
            stream_id: stream_id.to_string(),
        }))
    }

    fn stop_playing_stream(&self, stream_id: &str) {
        self.playing.lock().unwrap().retain(|id| id != stream_id);
    }

    async fn logout_room(&self, _room_id: &str) -> Result<(), ProviderError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior.logout_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn destroy_engine(&self) {
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeZegoModule {
    behavior: Arc<ZegoBehavior>,
    pub engines: Mutex<Vec<Arc<FakeZegoEngine>>>,
}

impl FakeZegoModule {
    pub fn last_engine(&self) -> Arc<FakeZegoEngine> {
        Arc::clone(self.engines.lock().unwrap().last().expect("no engine created"))
    }

    pub fn engine_count(&self) -> usize {
        self.engines.lock().unwrap().len()
    }
}

#[async_trait]
impl ZegoModule for FakeZegoModule {
    async fn create_engine(&self, app_id: u64) -> Result<Arc<dyn ZegoEngine>, ProviderError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let engine = Arc::new(FakeZegoEngine {
            behavior: Arc::clone(&self.behavior),
            app_id,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            login_args: Mutex::new(None),
            streams: Mutex::new(Vec::new()),
            constraints: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
            stopped_publishing: Mutex::new(Vec::new()),
            playing: Mutex::new(Vec::new()),
            logout_calls: AtomicUsize::new(0),
            destroy_calls: AtomicUsize::new(0),
        });
        self.engines.lock().unwrap().push(Arc::clone(&engine));
        Ok(engine)
    }
}

pub struct FakeZegoSdk {
    pub module: Arc<FakeZegoModule>,
    pub load_calls: AtomicUsize,
}

impl FakeZegoSdk {
    pub fn new(behavior: ZegoBehavior) -> Arc<Self> {
        Arc::new(Self {
            module: Arc::new(FakeZegoModule {
                behavior: Arc::new(behavior),
                engines: Mutex::new(Vec::new()),
            }),
            load_calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ZegoSdk for FakeZegoSdk {
    async fn load(&self) -> Result<Arc<dyn ZegoModule>, ProviderError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.module) as Arc<dyn ZegoModule>)
    }
}
