//! codeloop HTTP server - runs the workflow on request and returns the final state.

mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use codeloop::engine;
use codeloop::io::config::{DEFAULT_CONFIG_PATH, load_config};

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "codeloop-server")]
#[command(about = "HTTP front door for the codeloop workflow")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "3001")]
    port: u16,

    /// Workflow configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Answer 504 when a run takes longer than this
    #[arg(long)]
    run_timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("codeloop_server=info".parse()?)
                .add_directive("codeloop=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let config = load_config(&args.config)?;
    let workflow = engine::connect(config).context("build workflow")?;
    info!(config = %args.config.display(), "starting codeloop-server");

    let state = AppState::new(workflow, args.run_timeout_secs.map(Duration::from_secs));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::app_router(state).layer(cors);

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    Ok(())
}
