use newsmind::{
    config::Config,
    repositories::{PgNewsRepository, postgres},
    retry::RetryPolicy,
    seed, telemetry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    telemetry::init(&config);

    let pool = postgres::connect(&config.database_url, RetryPolicy::once()).await?;

    // runs all pending migrations; no-op if up-to-date
    postgres::migrate(&pool).await?;

    let seeded = seed::seed_sources(&PgNewsRepository::new(pool)).await?;
    tracing::info!(seeded, "database ready");
    Ok(())
}
