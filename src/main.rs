use crate::config::{Config, FileConfig};
use crate::storage::mounts::{MountAttributes, MountConfig};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use utils::cli::Args;
use utils::state::AppState;

mod api;
mod config;
mod error;
mod service;
mod storage;
mod utils;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = validate_config(&args).await;

    let state = Arc::new(AppState::new(config).await);
    let app = api::create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(format!(
        "{}:{}",
        state.config.host, state.config.port
    ))
    .await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.filesystem.close_watches().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutting down...");
}

async fn validate_config(args: &Args) -> Config {
    let mut validation_errors = Vec::new();

    let root_dir = Path::new(&args.root);
    match tokio::fs::metadata(root_dir).await {
        Ok(meta) => {
            if !meta.is_dir() {
                validation_errors.push(format!(
                    "VFS_ROOTDIR `{}` exists but is not a directory",
                    args.root,
                ));
            }
        }
        Err(_) => validation_errors.push(format!("VFS_ROOTDIR `{}` does not exist.", args.root)),
    }

    let file_config = match &args.config {
        Some(path) => match tokio::fs::read_to_string(path).await {
            Ok(raw) => match serde_json::from_str::<FileConfig>(&raw) {
                Ok(cfg) => Some(cfg),
                Err(e) => {
                    validation_errors.push(format!("VFS_CONFIG `{path}` is not valid: {e}"));
                    None
                }
            },
            Err(_) => {
                validation_errors.push(format!("VFS_CONFIG `{path}` could not be read"));
                None
            }
        },
        None => None,
    };

    let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
        eprintln!("WARNING: JWT_SECRET is not set. Use default value: `secret`");
        "secret".into()
    });
    let jwt_lifetime_secs = std::env::var("JWT_LIFETIME_SECONDS")
        .unwrap_or_else(|_| {
            eprintln!("WARNING: JWT_LIFETIME_SECONDS is not set. Use default value: 3600");
            "3600".into()
        })
        .parse::<i64>()
        .unwrap_or_else(|_| {
            validation_errors.push("JWT_LIFETIME_SECONDS is not a number".to_string());
            0
        });

    if !validation_errors.is_empty() {
        eprintln!("{}", validation_errors.join("\n"));
        std::process::exit(1);
    }

    let file_config = file_config.unwrap_or_else(default_file_config);

    Config {
        host: args.host.clone(),
        port: args.port,
        vfs_root: PathBuf::from(&args.root),
        watch: file_config.watch,
        jwt_secret,
        jwt_lifetime_secs,
        mounts: file_config.mountpoints,
        mime_overrides: file_config.mime,
    }
}

/// Without a configuration file every user gets a private `home:`
/// mountpoint under the VFS root.
fn default_file_config() -> FileConfig {
    FileConfig {
        mountpoints: vec![MountConfig {
            name: "home".to_string(),
            adapter: None,
            attributes: MountAttributes {
                root: Some("{vfs}/{username}".to_string()),
                ..Default::default()
            },
        }],
        watch: true,
        mime: Default::default(),
    }
}
