use anyhow::Context;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use learnfeed_recs::{
    config::Config,
    db::{create_pool, create_redis_client, Cache, PgStore},
    routes::{create_router, AppState},
    services::{
        pipeline::{build_generator, default_scorers},
        signals::HttpSimilarityProvider,
        CancellationToken, RecommendationQueryService, Stores,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    sqlx::migrate!().run(&pool).await?;
    let store = Arc::new(PgStore::new(pool));

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("generate") => {
            let date = match args.next() {
                Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                    .with_context(|| format!("Invalid date argument: {}", raw))?,
                None => Utc::now().date_naive(),
            };
            generate(&config, store, date).await
        }
        Some(other) => anyhow::bail!("Unknown command: {}", other),
        None => serve(&config, store).await,
    }
}

async fn serve(config: &Config, store: Arc<PgStore>) -> anyhow::Result<()> {
    let query = RecommendationQueryService::new(store.clone(), store);
    let app = create_router(AppState::new(query));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Runs one batch over every active user and feed type for `date`
async fn generate(config: &Config, store: Arc<PgStore>, date: NaiveDate) -> anyhow::Result<()> {
    let redis_client = create_redis_client(&config.redis_url)?;
    let (cache, cache_handle) = Cache::new(redis_client).await;

    let similarity = Arc::new(HttpSimilarityProvider::new(
        cache,
        config.similarity_api_url.clone(),
        config.similarity_api_key.clone(),
        config.similarity_cache_ttl,
    ));
    let scorers = default_scorers(config, store.clone(), similarity);
    let generator = build_generator(config, Stores::shared(store), scorers);

    let token = CancellationToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling remaining units");
            on_signal.cancel();
        }
    });

    let units = generator.units_for_date(date).await?;
    tracing::info!(date = %date, units = units.len(), "Starting recommendation batch");
    let report = generator.generate_batch(units, &token).await;

    cache_handle.shutdown().await;

    if report.failed > 0 {
        let total = report.succeeded + report.failed + report.cancelled;
        anyhow::bail!("{} of {} units failed", report.failed, total);
    }
    Ok(())
}
