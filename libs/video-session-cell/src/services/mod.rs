// libs/video-session-cell/src/services/mod.rs

pub mod agora;
pub mod classify;
pub mod control;
pub mod dispatch;
pub mod driver;
pub mod lifecycle;
pub mod media;
pub mod token;
pub mod zego;

pub use agora::AgoraDriver;
pub use control::ControlSurface;
pub use dispatch::{ProviderRegistry, SessionDispatcher, VideoPanel};
pub use driver::{DriverOptions, SessionDriver};
pub use media::{MediaSink, MountPointResolver};
pub use token::{HttpSessionTokenResolver, SessionTokenResolver};
pub use zego::ZegoDriver;
