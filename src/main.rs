use std::sync::Arc;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber;

use cycle_insights::clock::{Clock, SystemClock};
use cycle_insights::config::AppConfig;
use cycle_insights::model_store::{FsModelStore, InMemoryModelStore, ModelStore};
use cycle_insights::repository::{InMemoryStore, PgStore};
use cycle_insights::{routes, CycleInsights};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = AppConfig::from_env()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let models: Arc<dyn ModelStore> = match &config.model_dir {
        Some(dir) => {
            tracing::info!("📦 Storing models in {}", dir.display());
            Arc::new(FsModelStore::new(dir))
        }
        None => Arc::new(InMemoryModelStore::new()),
    };

    let insights = match &config.database_url {
        Some(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(database_url)
                .await
                .context("connecting to DATABASE_URL")?;
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("running migrations")?;

            let store = Arc::new(PgStore::new(pool));
            CycleInsights::new(store.clone(), store, models, clock, config.insights)
        }
        None => {
            tracing::warn!("⚠️ DATABASE_URL not set, keeping data in memory");
            let store = Arc::new(InMemoryStore::new());
            CycleInsights::new(store.clone(), store, models, clock, config.insights)
        }
    };

    let app = routes::app(Arc::new(insights));

    tracing::info!("🧠 Server running at {}", config.bind_addr);

    axum::serve(
        tokio::net::TcpListener::bind(config.bind_addr).await?,
        app.into_make_service(),
    )
    .await?;

    Ok(())
}
