// libs/video-session-cell/src/services/media.rs
use std::sync::Arc;
use tracing::warn;

use crate::models::{MediaHandle, MountPoints};

/// Rendering target a driver writes media into.
/// Implemented by the host UI; the driver never owns the underlying element.
pub trait MediaSink: Send + Sync {
    /// Replaces whatever is currently rendered with `media`.
    fn attach(&self, media: &MediaHandle);
    fn clear(&self);
}

/// Resolves mount point identifiers to live sinks at call time.
pub trait MountPointResolver: Send + Sync {
    fn resolve(&self, mount_id: &str) -> Option<Arc<dyn MediaSink>>;
}

/// The two mount points of a video panel, resolved lazily on every write.
#[derive(Clone)]
pub struct PanelSinks {
    resolver: Arc<dyn MountPointResolver>,
    mount_points: MountPoints,
}

impl PanelSinks {
    pub fn new(resolver: Arc<dyn MountPointResolver>, mount_points: MountPoints) -> Self {
        Self {
            resolver,
            mount_points,
        }
    }

    pub fn show_local(&self, media: &MediaHandle) {
        self.write(&self.mount_points.local, |sink| sink.attach(media));
    }

    pub fn show_remote(&self, media: &MediaHandle) {
        self.write(&self.mount_points.remote, |sink| sink.attach(media));
    }

    pub fn clear_remote(&self) {
        self.write(&self.mount_points.remote, |sink| sink.clear());
    }

    /// Clears both mount points so no stale media stays visible.
    pub fn clear_all(&self) {
        self.write(&self.mount_points.local, |sink| sink.clear());
        self.clear_remote();
    }

    fn write(&self, mount_id: &str, op: impl FnOnce(&dyn MediaSink)) {
        match self.resolver.resolve(mount_id) {
            Some(sink) => op(sink.as_ref()),
            None => warn!("Mount point '{}' is not available, skipping media write", mount_id),
        }
    }
}
