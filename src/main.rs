mod app;
mod backend;
mod channel;
mod config;
mod event;
mod export;
mod files;
mod logging;
mod session;
mod theme;

use anyhow::{anyhow, Context};
use app::CodeloomApp;
use backend::BackendBridge;
use config::AppConfig;
use eframe::egui;
use session::identity::UuidSessionIds;
use session::Session;
use std::sync::mpsc;
use tracing::info;

fn main() -> anyhow::Result<()> {
    logging::init();
    let config = AppConfig::load().context("failed to load configuration")?;
    info!(backend = %config.backend_url, cluster = %config.pusher.cluster, "starting codeloom");

    let (tx, rx) = mpsc::channel();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("codeloom-runtime")
        .build()
        .context("failed to start async runtime")?;

    let bridge = BackendBridge::new(&config, runtime.handle().clone(), tx)
        .context("failed to create backend client")?;
    let session = Session::new(Box::new(UuidSessionIds));
    let app = CodeloomApp::new(rx, bridge, session);
    let _runtime = runtime;

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Codeloom")
            .with_inner_size([1440.0, 860.0])
            .with_min_inner_size([1024.0, 640.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Codeloom",
        native_options,
        Box::new(move |_creation_context| Ok(Box::new(app))),
    )
    .map_err(|err| anyhow!("failed to run window: {err}"))?;

    Ok(())
}
