// libs/video-session-cell/src/services/driver.rs
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;

use shared_config::AppConfig;

use crate::models::{
    ConnectionState, DriverPhase, DriverSnapshot, FailureKind, JoinOutcome, ProviderError,
    ProviderTag,
};

/// Operations every provider driver exposes to the control surface.
///
/// `toggle_*` and `leave` never fail: errors are logged or captured into the
/// driver's [`ConnectionState`].
#[async_trait]
pub trait SessionDriver: Send + Sync {
    fn provider(&self) -> ProviderTag;

    /// Runs the join sequence. Only the first call on an instance does work.
    async fn join(&self) -> JoinOutcome;

    async fn toggle_microphone(&self);

    async fn toggle_camera(&self);

    /// Idempotent teardown; safe before, during or after a join.
    async fn leave(&self);

    fn snapshot(&self) -> DriverSnapshot;

    fn subscribe(&self) -> watch::Receiver<DriverSnapshot>;
}

/// Knobs shared by both drivers.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub join_timeout: Duration,
}

impl DriverOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            join_timeout: config.join_timeout,
        }
    }
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            join_timeout: Duration::from_secs(30),
        }
    }
}

/// Bounds a room-join call with the client-side join timeout.
pub(crate) async fn with_join_timeout<F>(timeout: Duration, join: F) -> Result<(), ProviderError>
where
    F: std::future::Future<Output = Result<(), ProviderError>>,
{
    match tokio::time::timeout(timeout, join).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::new(
            "JOIN_TIMEOUT",
            format!("room join timed out after {}s", timeout.as_secs()),
        )),
    }
}

/// Single writer of a driver's observable state.
/// Once torn down, further updates are ignored.
pub(crate) struct StatePublisher {
    sender: watch::Sender<DriverSnapshot>,
}

impl StatePublisher {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(DriverSnapshot::default());
        Self { sender }
    }

    pub fn snapshot(&self) -> DriverSnapshot {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DriverSnapshot> {
        self.sender.subscribe()
    }

    /// Applies `modify` unless the driver already ended. `Failed` may only
    /// move on to `TornDown`.
    pub fn update(&self, modify: impl FnOnce(&mut DriverSnapshot)) {
        self.sender.send_if_modified(|snapshot| {
            if snapshot.phase == DriverPhase::TornDown {
                return false;
            }
            let before = snapshot.clone();
            modify(snapshot);
            if before.phase == DriverPhase::Failed && snapshot.phase != DriverPhase::TornDown {
                *snapshot = before;
                return false;
            }
            *snapshot != before
        });
    }

    pub fn set_phase(&self, phase: DriverPhase) {
        self.update(|snapshot| snapshot.phase = phase);
    }

    pub fn connected(&self) {
        self.update(|snapshot| {
            snapshot.phase = DriverPhase::Connected;
            snapshot.state.is_connected = true;
            snapshot.state.last_error = None;
            snapshot.state.failure = None;
        });
    }

    pub fn failed(&self, kind: FailureKind) {
        self.update(|snapshot| {
            snapshot.phase = DriverPhase::Failed;
            snapshot.state = ConnectionState {
                is_connected: false,
                last_error: Some(kind.user_message().to_string()),
                failure: Some(kind),
                ..snapshot.state.clone()
            };
            snapshot.remote_present = false;
            snapshot.reconnecting = false;
        });
    }

    pub fn torn_down(&self) {
        self.update(|snapshot| {
            snapshot.phase = DriverPhase::TornDown;
            snapshot.state.is_connected = false;
            snapshot.remote_present = false;
            snapshot.reconnecting = false;
        });
    }
}
