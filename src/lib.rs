pub mod api;
pub mod cli;
pub mod config;
pub mod constants;
pub mod db;
pub mod entities;
pub mod models;
pub mod services;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
pub use config::Config;
use config::{DEFAULT_ADMIN_PASSWORD, GeneralConfig};
use services::Scheduler;
use state::SharedState;

pub async fn run(config: Config) -> anyhow::Result<()> {
    init_tracing(&config.general)?;

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server(config).await,

        Commands::CheckConfig => cli::cmd_check_config(&config),

        Commands::CreateAdmin { username, email } => {
            config.validate()?;
            cli::cmd_create_admin(config, &username, &email).await
        }
    }
}

fn init_tracing(general: &GeneralConfig) -> anyhow::Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&general.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if general.log_format.eq_ignore_ascii_case("json") {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    result.context("Failed to initialize tracing subscriber")
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    info!("filedock v{} starting...", env!("CARGO_PKG_VERSION"));

    let port = config.server.port;
    let scheduler_config = config.scheduler.clone();

    let shared = Arc::new(SharedState::new(config).await?);
    bootstrap_admin(&shared).await?;

    let scheduler = Arc::new(Scheduler::new(Arc::clone(&shared), scheduler_config));
    let scheduler_handle = {
        let sched = Arc::clone(&scheduler);
        tokio::spawn(async move {
            if let Err(e) = sched.start().await {
                error!("Scheduler error: {}", e);
            }
        })
    };

    let app = api::router(api::create_app_state(shared));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Web server running at http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    scheduler.stop().await;
    if let Err(e) = scheduler_handle.await {
        error!("Scheduler task ended abnormally: {}", e);
    }
    info!("Server stopped");

    Ok(())
}

/// Ensures the configured administrator exists.
async fn bootstrap_admin(shared: &SharedState) -> anyhow::Result<()> {
    let admin = &shared.config.admin;

    let created = shared
        .auth_service
        .ensure_admin(&admin.username, &admin.email, &admin.password)
        .await?;

    if created {
        info!(username = %admin.username, "Bootstrap administrator created");
    }

    if admin.password == DEFAULT_ADMIN_PASSWORD {
        warn!(
            username = %admin.username,
            "The administrator is configured with the default password. Set ADMIN_PASSWORD before exposing this server."
        );
    }

    Ok(())
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Error listening for shutdown: {}", e),
    }
}
