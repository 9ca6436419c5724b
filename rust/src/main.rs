//! Script vault CLI. `serve` runs the HTTP service; the other commands read
//! the snapshot file directly so operators can check what the vault holds.

use std::env;
use std::process;
use std::sync::Arc;

use script_vault::config::{load_config, ConfigError, VaultConfig};
use script_vault::http::{build_router, AppState};
use script_vault::storage::JsonFileStore;
use script_vault::vault::record::timestamp;
use script_vault::vault::{MarkerGate, ScriptId, Vault, VaultError};
use serde_json::json;
use thiserror::Error;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("vault error: {0}")]
    Vault(#[from] VaultError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("{0}")]
    Usage(String),
}

fn print_usage() {
    eprintln!("Commands:\n  serve                 run the HTTP service (default)\n  inspect <script-id>   show one stored script\n  count                 number of stored scripts\n  print-config          show the effective configuration");
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).compact().init();
}

fn open_vault(config: &VaultConfig) -> Vault {
    Vault::open(
        JsonFileStore::new(&config.database_path),
        MarkerGate::new(config.allowed_client_markers.iter().cloned()),
    )
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let config = match load_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("config load failed: {err}");
            process::exit(1);
        }
    };
    init_tracing(&config.log_level);

    let result = match args.get(1).map(String::as_str) {
        None | Some("serve") => serve(config),
        Some("inspect") => match args.get(2) {
            Some(id) if args.len() == 3 => inspect(&config, id),
            _ => Err(AppError::Usage("inspect takes exactly one script id".to_string())),
        },
        Some("count") => count(&config),
        Some("print-config") => print_config(&config),
        Some(other) => Err(AppError::Usage(format!("unknown command `{other}`"))),
    };

    if let Err(err) = result {
        if matches!(err, AppError::Usage(_)) {
            print_usage();
        }
        eprintln!("script-vault failed: {err}");
        process::exit(1);
    }
}

fn serve(config: VaultConfig) -> Result<(), AppError> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_server(config))
}

async fn run_server(config: VaultConfig) -> Result<(), AppError> {
    let addr = config.socket_addr()?;
    let vault = Arc::new(open_vault(&config));
    let state = AppState::new(vault.clone(), config.public_base_url.clone());
    let app = build_router(state, config.body_limit_bytes);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, database = %config.database_path.display(), "script vault listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    match Arc::try_unwrap(vault) {
        Ok(vault) => vault.close()?,
        Err(_) => warn!("vault still shared at shutdown"),
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", err);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => error!("failed to install SIGTERM handler: {}", err),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

fn inspect(config: &VaultConfig, id: &str) -> Result<(), AppError> {
    let vault = open_vault(config);
    let record = vault
        .get(&ScriptId::from(id))?
        .ok_or(VaultError::NotFound)?;
    let printable = json!({
        "id": record.id,
        "userId": record.owner_id,
        "createdAt": timestamp::format(&record.created_at),
        "script": record.content,
    });
    println!("{}", serde_json::to_string_pretty(&printable)?);
    Ok(())
}

fn count(config: &VaultConfig) -> Result<(), AppError> {
    println!("{}", open_vault(config).len()?);
    Ok(())
}

fn print_config(config: &VaultConfig) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
