pub mod config;
pub mod content;
pub mod error;
pub mod layout;
pub mod render;
pub mod server;
pub mod session;
pub mod store;
pub mod sync;

#[cfg(test)]
mod testing;

use std::sync::{Arc, Once};

use anyhow::Context;

use config::{AppConfig, IdentityBackend, StoreBackend};
use server::AppState;
use session::{
    IdentityProvider, LocalIdentityProvider, RestIdentityProvider, SessionBootstrapper,
    UnavailableProvider,
};
use store::{DocumentStore, MemoryStore, SqliteStore};

/// Install the ring crypto provider for rustls. Safe to call repeatedly.
pub fn ensure_tls_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn DocumentStore>> {
    Ok(match config.store.backend {
        StoreBackend::Sqlite => {
            let path = config.database_path();
            let store = SqliteStore::open(&path)
                .with_context(|| format!("opening document store at {}", path.display()))?;
            Arc::new(store)
        }
        StoreBackend::Memory => {
            tracing::info!("Using in-memory document store; content is lost on exit");
            Arc::new(MemoryStore::new())
        }
    })
}

fn identity_provider(config: &AppConfig) -> error::Result<Arc<dyn IdentityProvider>> {
    Ok(match config.identity.provider {
        IdentityBackend::Local => Arc::new(LocalIdentityProvider::new()),
        IdentityBackend::Rest => Arc::new(RestIdentityProvider::new(&config.identity)?),
    })
}

/// Sign in once at startup. A misconfigured provider degrades to
/// local-only like any other sign-in failure.
async fn bootstrap_session(config: &AppConfig) -> SessionBootstrapper {
    let provider: Arc<dyn IdentityProvider> = match identity_provider(config) {
        Ok(provider) => provider,
        Err(e) => {
            tracing::warn!("Identity provider unavailable: {}", e);
            Arc::new(UnavailableProvider::new(e.to_string()))
        }
    };
    let session = SessionBootstrapper::new(provider);
    session.bootstrap(config.initial_token()).await;
    session
}

/// Open the store, bootstrap the session and serve until Ctrl-C.
pub async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let store = open_store(&config)?;
    let session = bootstrap_session(&config).await;
    let addr = config.listen_addr();

    let state = Arc::new(AppState::new(config, store, session).context("invalid content path")?);
    server::start_server(state.clone(), &addr).await?;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("Shutting down");
    state.shutdown();
    Ok(())
}

pub fn run() {
    let config_path = config::config_path();
    let mut config = AppConfig::load(&config_path);
    config.apply_env();

    // Initialize logging
    let default_filter = config
        .log_filter
        .clone()
        .unwrap_or_else(|| "moodboard=info,moodboard_lib=info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    tracing::info!("Starting Moodboard v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Config: {}", config_path.display());

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(serve(config)) {
        tracing::error!("Moodboard stopped: {:#}", e);
        std::process::exit(1);
    }
}
