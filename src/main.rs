use anyhow::Context;
use clap::Parser;
use docqa::api::{self, AppState};
use docqa::config::AppConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Ask questions about uploaded PDF documents", long_about = None)]
struct Args {
    /// Address to bind the HTTP server to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(short, long, env = "PORT", default_value_t = 8000)]
    port: u16,

    /// Environment file loaded before reading configuration
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    let args = Args::parse();
    if let Err(e) = dotenv::from_path(&args.env_file) {
        eprintln!("No env file loaded from {}: {}", args.env_file.display(), e);
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env().context("Invalid configuration")?;
    run_api_server(&args, &config).await
}

async fn run_api_server(args: &Args, config: &AppConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("Failed to parse address {}:{}", args.host, args.port))?;

    tracing::info!(
        "Using chat model {} and embedding model {}",
        config.provider.chat_model,
        config.provider.embedding_model
    );
    let state = AppState::from_config(config)
        .await
        .context("Failed to initialize vector store")?;
    tracing::info!(
        "Vector store at {} holds {} chunks",
        config.vector_store_dir.display(),
        state.store().count().await?
    );

    let app = api::create_api(state);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    tracing::info!("Server successfully bound to {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
