use std::path::PathBuf;

use clap::Parser;
use tokio::sync::broadcast;
use weft_core::invalidate::InvalidatedPath;
use weft_store::Database;

#[derive(Parser, Debug)]
#[command(name = "weft", about = "Threaded-discussion data layer")]
struct Args {
    /// Path to the SQLite database file.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Port to listen on.
    #[arg(long, default_value_t = 9095)]
    port: u16,

    /// Default feed page size when the caller does not specify one.
    #[arg(long, default_value_t = 20)]
    page_size: u32,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    tracing::info!("Starting weft server");

    let db_path = args
        .db_path
        .unwrap_or_else(|| dirs_home().join(".weft").join("weft.db"));

    let db = Database::open(&db_path).expect("Failed to open database");
    tracing::info!(path = %db_path.display(), "Database opened");

    // Invalidation fan-out channel; the external web layer subscribes to
    // learn which cached paths went stale.
    let (invalidation_tx, mut invalidation_rx) = broadcast::channel::<InvalidatedPath>(1024);

    // Log invalidations when nothing else is subscribed.
    tokio::spawn(async move {
        while let Ok(event) = invalidation_rx.recv().await {
            tracing::debug!(path = %event.path, "path invalidated");
        }
    });

    let config = weft_server::ServerConfig {
        port: args.port,
        default_page_size: args.page_size,
    };
    let port = config.port;
    let _handle = weft_server::start(config, db, invalidation_tx)
        .await
        .expect("Failed to start server");

    tracing::info!(port = port, "weft server ready");

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for ctrl+c");

    tracing::info!("Shutting down");
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
