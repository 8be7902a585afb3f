use clap::Parser;
use leadscout::config::ServerConfig;
use leadscout::db::schema::ensure_schema;
use leadscout::web::{AppState, create_axum_router};
use sea_orm::{ConnectOptions, Database};
use std::sync::Arc;
use tokio::time::{Duration, interval};
use tracing::{error, info};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,
}

fn init_logging(log_dir: &str) -> WorkerGuard {
    // Log to a file: JSON format, daily rotation
    let (file_writer, guard) = tracing_appender::non_blocking(rolling::daily(log_dir, "server.log"));
    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .json();

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    // Default to `info,sea_orm=warn` level if RUST_LOG is not set.
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    guard
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal.");
    }
    info!("Shutdown signal received.");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let server_config = match ServerConfig::load(args.config.as_deref()) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Failed to load server configuration: {e}");
            return Err(e.into());
        }
    };

    let _log_guard = init_logging(&server_config.log_dir);
    info!("Starting leadscout server, version: {}", VERSION);

    // --- Database Setup ---
    let mut opt = ConnectOptions::new(server_config.database_url.clone());
    opt.max_connections(10).sqlx_logging(false);
    let db_pool = Database::connect(opt).await?;
    ensure_schema(&db_pool).await?;
    info!("Database schema is ready.");

    let app_state = Arc::new(AppState::new(db_pool, server_config.clone())?);
    if server_config.default_gateway().is_some() {
        info!("Shared Evolution gateway configured.");
    }

    // --- Finished dispatch cleanup ---
    let cleanup_handle = tokio::spawn({
        let manager = app_state.dispatch_manager.clone();
        let period = server_config.dispatch_retention().max(Duration::from_secs(60));
        async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                manager.prune_finished().await;
            }
        }
    });

    // --- HTTP Server ---
    let app = create_axum_router(app_state);
    let listener = tokio::net::TcpListener::bind(&server_config.listen_addr).await?;
    info!(addr = %server_config.listen_addr, "HTTP server listening.");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cleanup_handle.abort();
    info!("Server stopped.");
    Ok(())
}
