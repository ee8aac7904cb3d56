//! warpgen: ephemeral WARP identities as AmneziaWG configs
//!
//! Serves `GET /api/warp`. Each request registers a new device upstream
//! and answers with the rendered tunnel config.

mod handlers;
mod settings;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::handlers::{app, AppState};
use crate::settings::Settings;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warpgen_server=info,warpgen_registration=info,tower_http=debug".into()),
        )
        .init();

    let settings = Settings::load().context("loading settings")?;
    tracing::info!(
        "Upstream {} (device type {}, endpoint mode {:?})",
        settings.api.base_url,
        settings.provision.device_type.as_str(),
        settings.endpoint.mode
    );

    let provisioner = settings.provisioner().context("building provisioner")?;
    tracing::info!("Provisioning deadline {}s", provisioner.config().deadline_secs);
    let state = Arc::new(AppState { provisioner });

    let app = app(state);

    let listener = tokio::net::TcpListener::bind(&settings.bind_address)
        .await
        .with_context(|| format!("binding {}", settings.bind_address))?;
    tracing::info!("Server listening on http://{}", settings.bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
