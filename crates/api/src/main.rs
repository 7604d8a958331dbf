use anyhow::Context;

use placetrack_api::config::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    placetrack_observability::init();

    let config = ApiConfig::from_env().context("invalid configuration")?;

    let app = placetrack_api::app::build_app(&config)
        .await
        .context("failed to initialize storage")?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
