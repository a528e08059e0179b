use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

use uptime_engine::config::{read_config_file, StorageConfig};
use uptime_engine::email::{EmailProvider, HttpEmailProvider, NoopEmailProvider};
use uptime_engine::manager::SchedulerManager;
use uptime_engine::persistence::PersistenceBackend;
use uptime_engine::persistence::memory::InMemoryBackend;
#[cfg(feature = "storage-sqlite")]
use uptime_engine::persistence::sqlite::SqliteBackend;

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("uptime_engine", LevelFilter::TRACE),
        ("monitor", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_writer(std::io::stderr)
                .compact(),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    if dotenv::dotenv().is_err() {
        trace!("no .env file found, continuing with process environment only");
    }

    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config_path = if args.file.is_empty() {
        uptime_engine::util::get_config_path()
    } else {
        args.file.clone()
    };
    let config = read_config_file(&config_path)?;

    if let Some(ref storage_config) = config.storage {
        if let Err(e) = storage_config.validate() {
            error!("invalid storage configuration: {}", e);
            return Err(anyhow::anyhow!("configuration validation failed: {}", e));
        }
    }

    let mut resolved_config = config.resolve()?;
    apply_env_overrides(&mut resolved_config);
    info!("resolved configuration: {resolved_config:#?}");

    run_engine(resolved_config).await
}

/// Lets deployment-time secrets (API auth token, email API key) come from
/// the process environment rather than being checked into the config file.
fn apply_env_overrides(resolved_config: &mut uptime_engine::config::ResolvedConfig) {
    #[cfg(feature = "api")]
    if let Some(ref mut api) = resolved_config.api {
        if let Some(token) = uptime_engine::util::get_api_auth_token() {
            api.auth_token = Some(token);
        }
        api.port = uptime_engine::util::get_api_port(api.port);
    }

    if let uptime_engine::config::EmailConfig::Http { ref mut api_key, .. } = resolved_config.email {
        if let Some(env_key) = uptime_engine::util::get_email_api_key() {
            *api_key = env_key;
        }
    }
}

async fn run_engine(resolved_config: uptime_engine::config::ResolvedConfig) -> anyhow::Result<()> {
    let persistence = initialize_persistence(&resolved_config.storage).await;
    let email_provider = initialize_email_provider(&resolved_config.email);

    let manager = Arc::new(SchedulerManager::new(resolved_config.clone(), persistence)?);
    manager.start(Some(email_provider)).await?;
    info!("scheduler manager started, monitoring active");

    #[cfg(feature = "api")]
    if let Some(api_config) = resolved_config.api {
        use uptime_engine::api::{spawn_api_server, ApiConfig};

        let bind_addr: std::net::SocketAddr = format!("{}:{}", api_config.bind, api_config.port)
            .parse()
            .expect("invalid API bind address");

        let api_config = ApiConfig {
            bind_addr,
            auth_token: api_config.auth_token,
            enable_cors: api_config.enable_cors,
        };

        match spawn_api_server(api_config, manager.clone()).await {
            Ok(addr) => info!("status API started on http://{}", addr),
            Err(e) => error!("failed to start status API: {}", e),
        }
    } else {
        info!("status API disabled (not configured)");
    }

    #[cfg(not(feature = "api"))]
    info!("status API disabled (feature not enabled)");

    info!("press Ctrl+C to shutdown gracefully");
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal, stopping engine..."),
        Err(err) => error!("unable to listen for shutdown signal: {err}"),
    }

    manager.shutdown().await;
    info!("engine stopped, exiting");

    Ok(())
}

async fn initialize_persistence(storage: &Option<StorageConfig>) -> Arc<dyn PersistenceBackend> {
    match storage {
        #[cfg(feature = "storage-sqlite")]
        Some(StorageConfig::Sqlite { path, .. }) => {
            info!("initializing SQLite backend at: {:?}", path);
            match SqliteBackend::new(path).await {
                Ok(backend) => {
                    info!("SQLite backend initialized successfully");
                    Arc::new(backend)
                }
                Err(e) => {
                    error!("failed to initialize SQLite backend: {}", e);
                    warn!("falling back to in-memory storage");
                    Arc::new(InMemoryBackend::new())
                }
            }
        }
        #[cfg(not(feature = "storage-sqlite"))]
        Some(StorageConfig::Sqlite { .. }) => {
            warn!("SQLite configured but storage-sqlite feature is disabled; using in-memory storage");
            Arc::new(InMemoryBackend::new())
        }
        Some(StorageConfig::None) | None => {
            info!("using in-memory storage (no persistence)");
            Arc::new(InMemoryBackend::new())
        }
    }
}

fn initialize_email_provider(email: &uptime_engine::config::EmailConfig) -> Arc<dyn EmailProvider> {
    match email {
        uptime_engine::config::EmailConfig::Noop => {
            info!("email provider disabled (noop)");
            Arc::new(NoopEmailProvider)
        }
        uptime_engine::config::EmailConfig::Http {
            api_url,
            api_key,
            sender_email,
            sender_name,
        } => {
            info!("email provider: HTTP ({})", api_url);
            Arc::new(HttpEmailProvider::new(
                api_url.clone(),
                api_key.clone(),
                sender_email.clone(),
                sender_name.clone(),
            ))
        }
    }
}
