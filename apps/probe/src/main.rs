use async_trait::async_trait;
use clap::Parser;
use dotenv::dotenv;
use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shared_config::AppConfig;
use video_session_cell::models::ProviderError;
use video_session_cell::services::agora::{AgoraModule, AgoraSdk};
use video_session_cell::services::media::{MediaSink, MountPointResolver};
use video_session_cell::services::zego::{self, ZegoModule, ZegoSdk};
use video_session_cell::{
    HttpSessionTokenResolver, LocalParticipant, MountPoints, ProviderRegistry, ProviderTag,
    SessionCredential, SessionDispatcher, SessionTokenResolver,
};

/// Resolves the video credential for a consultation and reports which
/// provider driver a client would mount for it.
#[derive(Parser, Debug)]
#[clap(name = "video-session-probe")]
struct Opt {
    #[clap(long = "consultation-id")]
    consultation_id: String,

    /// Bearer token of the participant requesting the credential.
    #[clap(long = "auth-token")]
    auth_token: String,

    /// Overrides VIDEO_API_BASE_URL.
    #[clap(long = "base-url")]
    base_url: Option<String>,

    #[clap(long = "json")]
    json: bool,
}

#[derive(Debug, Serialize)]
struct ProbeReport {
    consultation_id: String,
    provider: String,
    room_id: String,
    app_id: String,
    driver: Option<&'static str>,
    ready: bool,
    reason: Option<String>,
}

/// SDK entry point registered for selection only. The probe never joins.
struct DetachedSdk;

#[async_trait]
impl AgoraSdk for DetachedSdk {
    async fn load(&self) -> Result<Arc<dyn AgoraModule>, ProviderError> {
        Err(ProviderError::new("SDK_UNAVAILABLE", "probe does not load provider SDKs"))
    }
}

#[async_trait]
impl ZegoSdk for DetachedSdk {
    async fn load(&self) -> Result<Arc<dyn ZegoModule>, ProviderError> {
        Err(ProviderError::new("SDK_UNAVAILABLE", "probe does not load provider SDKs"))
    }
}

struct NoMounts;

impl MountPointResolver for NoMounts {
    fn resolve(&self, _mount_id: &str) -> Option<Arc<dyn MediaSink>> {
        None
    }
}

fn registry() -> ProviderRegistry {
    ProviderRegistry::new()
        .with_agora(Arc::new(DetachedSdk))
        .with_zego(Arc::new(DetachedSdk))
}

fn driver_name(provider: &ProviderTag) -> &'static str {
    match provider {
        ProviderTag::Agora => "agora",
        ProviderTag::Zego => "zego",
        ProviderTag::Unsupported(_) => "none",
    }
}

/// Runs the credential through the same selection a mounted panel uses.
fn assess(
    dispatcher: &SessionDispatcher,
    consultation_id: &str,
    credential: &SessionCredential,
) -> ProbeReport {
    let (driver, reason) =
        match dispatcher.select_driver(credential, &LocalParticipant::default(), MountPoints::default()) {
            Ok(driver) => {
                let provider = driver.provider();
                let reason = match provider {
                    ProviderTag::Zego => zego::engine_app_id(&credential.app_id)
                        .err()
                        .map(|e| e.message),
                    _ => None,
                };
                (Some(driver_name(&provider)), reason)
            }
            Err(e) => (None, Some(e.to_string())),
        };

    ProbeReport {
        consultation_id: consultation_id.to_string(),
        provider: credential.provider.to_string(),
        room_id: credential.room_id.clone(),
        app_id: credential.app_id.to_string(),
        driver,
        ready: reason.is_none(),
        reason,
    }
}

async fn run(opt: &Opt) -> anyhow::Result<ProbeReport> {
    let mut config = AppConfig::from_env();
    if let Some(base_url) = &opt.base_url {
        config.video_api_base_url = base_url.clone();
    }

    let resolver = Arc::new(HttpSessionTokenResolver::new(&config)?);
    let credential = resolver
        .resolve_session(&opt.consultation_id, &opt.auth_token)
        .await?;

    let dispatcher = SessionDispatcher::new(resolver, registry(), Arc::new(NoMounts), &config);
    Ok(assess(&dispatcher, &opt.consultation_id, &credential))
}

#[tokio::main]
async fn main() -> ExitCode {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,video_session_cell=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let opt = Opt::parse();
    info!("Probing video session for consultation {}", opt.consultation_id);

    let report = match run(&opt).await {
        Ok(report) => report,
        Err(e) => {
            error!("Probe failed: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    if opt.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize probe report: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!("consultation: {}", report.consultation_id);
        println!("provider:     {}", report.provider);
        println!("room:         {}", report.room_id);
        println!("driver:       {}", report.driver.unwrap_or("none"));
        match &report.reason {
            Some(reason) => println!("status:       not ready ({})", reason),
            None => println!("status:       ready"),
        }
    }

    if report.ready {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
