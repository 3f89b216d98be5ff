use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use devbox_api::{create_app, AppState, Config};
use devbox_core::UserDirectory;
use devbox_proxmox::{ControlPlane, ProxmoxClient};
use devbox_router::RouteManager;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "devbox-api", version, about = "On-demand per-user workspaces on Proxmox")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "DEVBOX_CONFIG", default_value = "/etc/devbox/config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    let _log_guard = devbox_logging::init_subscriber(&config.logging);
    info!("Starting devbox-api service...");

    let users = UserDirectory::load(&config.users_file)
        .with_context(|| format!("Failed to load users from {}", config.users_file.display()))?;
    if users.is_empty() {
        warn!("User directory is empty, every login will be rejected");
    }

    if config.proxmox.insecure_tls {
        warn!("TLS certificate verification disabled for the Proxmox API");
    }
    let control_plane: Arc<dyn ControlPlane> =
        Arc::new(ProxmoxClient::new(config.proxmox.clone()).context("Failed to create Proxmox client")?);
    let routes = RouteManager::new(config.caddy.clone()).context("Failed to create Caddy client")?;

    let state = AppState::new(
        control_plane,
        config.workload.reconcile_settings(),
        routes,
        users,
        config.server.request_timeout(),
    );
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.bind_addr))?;
    info!("Listening on http://{}", config.server.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Received shutdown signal, stopping gracefully");
        })
        .await?;

    Ok(())
}
