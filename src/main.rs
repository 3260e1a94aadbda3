mod api;
mod app;
mod application;
mod config;
mod domain;
mod ui;
mod utils;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::ClientConfig;

fn main() -> iced::Result {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("video_fetch=info")),
        )
        .init();

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "invalid environment, using default backend address");
            ClientConfig::default()
        }
    };
    info!(
        http = %config.http_base,
        stream = %config.stream_base,
        download_dir = ?config.download_dir,
        "starting video fetch"
    );

    iced::application(
        move || app::DownloadApp::new(config.clone()),
        app::update,
        app::view,
    )
    .title("Video Fetch")
    .run()
}
