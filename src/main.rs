use actix_web::{middleware::Logger, web, App, HttpServer};
use chrono::Duration;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use trending_news::{
    cache::SystemClock, configure, database::FavoriteStore, news::Aggregator,
    sources::HttpFetcher, AppState, Args,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let address = format!("{}:{}", args.ip, args.port);

    let favorites = FavoriteStore::open(&args.db_path).await.map_err(|e| {
        tracing::error!(error = %e, db_path = %args.db_path, "failed to open favorites database");
        std::io::Error::other("Database initialization failed")
    })?;

    let fetcher = HttpFetcher::new(
        std::time::Duration::from_secs(args.request_timeout),
        args.limit,
    )
    .map_err(|e| {
        tracing::error!(error = %e, "failed to build HTTP client");
        std::io::Error::other("HTTP client initialization failed")
    })?;

    let aggregator = Aggregator::new(
        Arc::new(fetcher),
        Arc::new(SystemClock),
        Duration::seconds(i64::from(args.cache_lifetime)),
    );

    let app_state = web::Data::new(AppState {
        config: args,
        aggregator,
        favorites,
    });

    tracing::info!(
        cache_lifetime = app_state.config.cache_lifetime,
        timezone = %app_state.config.timezone.name(),
        "server running at http://{address}"
    );
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(app_state.clone())
            .configure(configure)
    })
    .bind(&address)?
    .run()
    .await
}
