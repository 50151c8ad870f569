mod activity_log;
mod api;
mod auth;
mod config;
mod context;
mod db;
mod providers;
mod storage;
mod store;
mod traits;

#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::auth::HttpTokenVerifier;
use crate::providers::OpenAiCompatibleProvider;
use crate::storage::HttpMediaStorage;
use crate::store::SqliteStore;
use crate::traits::MediaStorage;

fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config_path = PathBuf::from("config.toml");

    // Handle CLI arguments
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        match args[1].as_str() {
            "--version" | "-V" => {
                println!("crmd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" => {
                println!("crmd {}", env!("CARGO_PKG_VERSION"));
                println!("{}\n", env!("CARGO_PKG_DESCRIPTION"));
                println!("Usage: crmd [CONFIG_PATH]\n");
                println!("Options:");
                println!("  -h, --help       Print help");
                println!("  -V, --version    Print version");
                return Ok(());
            }
            path => {
                config_path = PathBuf::from(path);
            }
        }
    }

    let config = config::AppConfig::load(&config_path)?;

    // Run async
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(config))
}

async fn run(config: config::AppConfig) -> anyhow::Result<()> {
    let pool = db::open_pool(&config.state.db_path).await?;
    let store = Arc::new(SqliteStore::new(pool));

    let verifier = Arc::new(HttpTokenVerifier::new(&config.auth)?);

    let provider = OpenAiCompatibleProvider::new(
        &config.completion.base_url,
        &config.completion.api_key,
        config.completion.temperature,
        config.completion.max_tokens,
    )
    .map_err(|e| anyhow::anyhow!("Invalid completion config: {}", e))?;

    let media: Option<Arc<dyn MediaStorage>> = match &config.storage {
        Some(storage_config) => Some(Arc::new(HttpMediaStorage::new(storage_config)?)),
        None => None,
    };

    let state = AppState {
        store,
        verifier,
        provider: Arc::new(provider),
        media,
        model: config.completion.model.clone(),
    };

    let router = api::build_router(state);

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("crmd listening on {}", addr);

    axum::serve(listener, router).await?;
    Ok(())
}
