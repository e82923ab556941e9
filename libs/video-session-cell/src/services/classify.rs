// libs/video-session-cell/src/services/classify.rs
use crate::models::{FailureKind, ProviderError};

const PERMISSION_MARKERS: &[&str] = &[
    "notallowed",
    "permissiondenied",
    "permission denied",
    "securityerror",
    "not allowed",
];

const DEVICE_BUSY_MARKERS: &[&str] = &[
    "notreadable",
    "trackstart",
    "could not start",
    "device in use",
    "devicebusy",
    "device busy",
    "already in use",
];

const NETWORK_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "network",
    "gateway",
    "signal",
    "wsabort",
    "websocket",
    "disconnected",
    "unreachable",
];

/// Maps a raw SDK error to the failure shown to the user.
/// Media errors are checked before transport errors so a denied device prompt
/// is never reported as a connectivity problem.
pub fn classify(error: &ProviderError) -> FailureKind {
    let haystack = normalize(&format!("{} {}", error.code, error.message));

    if contains_any(&haystack, PERMISSION_MARKERS) {
        FailureKind::PermissionDenied
    } else if contains_any(&haystack, DEVICE_BUSY_MARKERS) {
        FailureKind::DeviceBusy
    } else if contains_any(&haystack, NETWORK_MARKERS) {
        FailureKind::NetworkTimeout
    } else {
        FailureKind::Unknown
    }
}

fn normalize(raw: &str) -> String {
    raw.to_ascii_lowercase().replace(['_', '-'], "")
}

fn contains_any(haystack: &str, markers: &[&str]) -> bool {
    markers.iter().any(|marker| haystack.contains(marker))
}
