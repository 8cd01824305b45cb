//! moss-llmd daemon entry point.

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use moss_llmd::config::{Cli, Config};
use moss_llmd::llama::stub::StubRuntime;
use moss_llmd::server::api::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "moss_llmd=debug,tower_http=debug"
    } else {
        "moss_llmd=info,tower_http=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("moss-llmd v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration; CLI flags win over the file.
    let mut config = Config::load(&cli.config)?;
    if let Some(models_dir) = cli.models_dir {
        config.model.models_dir = models_dir;
    }
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }
    let config = Arc::new(config);

    info!(
        models_dir = %config.model.models_dir.display(),
        context_size = config.model.context_size,
        temperature = config.chat.temperature,
        max_tokens = config.chat.max_tokens,
        "Configuration loaded"
    );

    // The simulated runtime stands in for the native llama.cpp binding;
    // a production build plugs its adapter in here.
    let runtime = Arc::new(StubRuntime::new());

    // Build application state and the HTTP router.
    let state = Arc::new(AppState::new(runtime, config.clone()));
    let app = build_router(state);

    // Start the server.
    let listen_addr = config.server.listen.clone();
    info!(addr = %listen_addr, "Starting server");

    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
