use anyhow::Context;
use clap::Parser;
use versus_relay::{router, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    let bind = config.bind;
    let data_dir = config.data_dir.clone();
    let state = AppState::new(config)
        .with_context(|| format!("cannot open data directory {}", data_dir.display()))?;

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("cannot bind {}", bind))?;
    tracing::info!(
        "Versus relay listening on {} (data in {})",
        listener.local_addr()?,
        data_dir.display()
    );

    axum::serve(listener, router(state)).await?;
    Ok(())
}
