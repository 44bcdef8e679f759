use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use transix_engine::{ReservationService, SimulatedPaymentGateway, SystemClock};
use transix_gateway::{app, AppState};
use transix_store::{Config, DbClient, PgPassengerDirectory, PgReservationStore, RedisClient};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "transix_gateway=debug,transix_engine=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().expect("Failed to load config");
    tracing::info!("Starting transix gateway on port {}", config.server.port);

    let db = DbClient::new(&config.database.url)
        .await
        .expect("Failed to connect to Postgres");
    let redis = Arc::new(
        RedisClient::new(&config.redis.url)
            .await
            .expect("Failed to connect to Redis"),
    );

    let store = Arc::new(PgReservationStore::new(db.pool.clone()));
    let passengers = Arc::new(PgPassengerDirectory::new(db.pool.clone()));
    let payments = Arc::new(SimulatedPaymentGateway::new(
        config.business_rules.payment_success_rate,
    ));

    let service = Arc::new(ReservationService::new(
        store,
        redis.clone(),
        redis.clone(),
        passengers,
        payments,
        Arc::new(SystemClock),
        config.business_rules.service_config(),
    ));

    tokio::spawn(transix_gateway::worker::start_sweep_worker(
        service.clone(),
        Duration::from_secs(config.business_rules.sweep_interval_seconds),
    ));

    let app_state = AppState {
        service,
        redis,
        rate_limit_per_minute: config.business_rules.rate_limit_per_minute,
    };
    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}
