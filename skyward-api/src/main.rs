use anyhow::Context;
use skyward_api::{
    app, demo,
    state::{AppState, AuthConfig, Repositories},
};
use skyward_core::clock::{Clock, SystemClock};
use skyward_core::repository::FlowStore;
use skyward_store::{
    app_config::Config, DbClient, MemoryStore, PostgresBookingRepository, PostgresFlightRepository,
    PostgresUserRepository, RedisClient,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skyward_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Skyward API on port {}", config.server.port);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut rules = config.business_rules.clone();

    let repos = if config.database.url.is_empty() {
        tracing::warn!("No database configured, using the in-memory store");
        let store = Arc::new(MemoryStore::new(clock.clone()));
        demo::seed_flight(&store, clock.now() + chrono::Duration::days(7)).await;
        Repositories::in_memory(store)
    } else {
        let db = DbClient::new(&config.database.url, config.database.max_connections)
            .await
            .context("Failed to connect to Postgres")?;
        db.migrate().await.context("Failed to run migrations")?;
        rules = db
            .fetch_business_rules(rules)
            .await
            .context("Failed to load business rules")?;

        let flows: Arc<dyn FlowStore> = if config.redis.url.is_empty() {
            tracing::warn!("No Redis configured, flow tokens stay in process memory");
            Arc::new(MemoryStore::new(clock.clone()))
        } else {
            Arc::new(RedisClient::new(&config.redis.url, clock.clone()).context("Failed to create Redis client")?)
        };

        let users = Arc::new(PostgresUserRepository::new(db.pool.clone()));
        let bookings = Arc::new(PostgresBookingRepository::new(db.pool.clone()));
        Repositories {
            users: users.clone(),
            otps: users,
            flights: Arc::new(PostgresFlightRepository::new(db.pool.clone())),
            bookings,
            flows,
        }
    };

    let auth = AuthConfig {
        secret: config.auth.jwt_secret.clone(),
        expiration: config.auth.jwt_expiration_seconds,
        expose_otp: config.auth.expose_otp,
        password_hash_cost: config.auth.password_hash_cost,
    };
    if auth.expose_otp {
        tracing::warn!("OTP codes are echoed in API responses");
    }

    let app = app(AppState::new(repos, clock, &rules, auth));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
