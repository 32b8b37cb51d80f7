use std::sync::Arc;

use anyhow::Context;

use keystone_infra::{ConfigLoader, InMemoryUserStore, PostgresUserStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let loader = ConfigLoader::new();
    let config = loader.load().context("failed to load configuration")?;

    keystone_observability::init(&config.logging.filter, config.logging.json);
    match loader.config_file() {
        Some(path) => tracing::info!(path = %path.display(), "loaded configuration file"),
        None => tracing::debug!("no configuration file; using defaults and environment"),
    }

    let app = match config.database.url.as_deref() {
        Some(url) => {
            let store = PostgresUserStore::connect(url, config.database.max_connections)
                .await
                .context("failed to connect to postgres")?;
            store.migrate().await.context("failed to prepare schema")?;
            tracing::info!("using postgres user store");
            keystone_api::app::build_app(config.auth.clone(), Arc::new(store))?
        }
        None => {
            tracing::warn!("database.url not set; users are kept in memory");
            keystone_api::app::build_app(config.auth.clone(), Arc::new(InMemoryUserStore::new()))?
        }
    };

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
