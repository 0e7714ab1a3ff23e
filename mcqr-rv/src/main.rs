//! mcqr-rv (Review) - Multiple-choice question review service
//!
//! Serves each annotator's review session over HTTP: navigate assigned
//! records, edit fields, delete records, and mirror every change to the
//! remote copy when one is configured.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use mcqr_common::config::{LoggingConfig, RootFolderResolver, TomlConfig};
use mcqr_common::registry::AnnotatorRegistry;
use mcqr_rv::{build_router, AppState};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for mcqr-rv
#[derive(Parser, Debug)]
#[command(name = "mcqr-rv")]
#[command(about = "Review service for labeled multiple-choice questions")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "MCQR_RV_PORT")]
    port: Option<u16>,

    /// Root folder holding datasets, images and the progress database
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Config file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logging settings live in the config file, so it is read first
    let config = TomlConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;
    init_tracing(&config.logging)?;

    info!(
        "Starting MCQR Review (mcqr-rv) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = RootFolderResolver::new(args.root_folder, &config).resolve();
    std::fs::create_dir_all(&root_folder).with_context(|| {
        format!("Failed to create root folder {}", root_folder.display())
    })?;
    info!("Root folder: {}", root_folder.display());

    let registry = match AnnotatorRegistry::from_config(&config, &root_folder).await {
        Ok(registry) => {
            info!("✓ {} annotators ready", registry.len());
            registry
        }
        Err(e) => {
            error!("Failed to prepare review sessions: {}", e);
            return Err(e.into());
        }
    };

    let app = build_router(AppState::new(registry));

    let port = args.port.unwrap_or(config.port);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("mcqr-rv listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// `RUST_LOG` wins; otherwise the configured level applies to the shared
/// library and request tracing stays at debug for the service itself
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "mcqr_rv=debug,mcqr_common={},tower_http=debug",
            logging.level
        )
        .into()
    });

    let file_layer = match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };
    let stderr_layer = logging
        .file
        .is_none()
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
