use anyhow::Context;
use berth_api::{app, seeding, worker, AppState};
use berth_catalog::{FareCalculator, QuotaPolicy};
use berth_core::{Clock, EventSink, InventoryStore, SystemClock, TrainCatalog};
use berth_order::{BookingRules, ChartWindow, ReservationService};
use berth_store::{
    BroadcastEventSink, CompositeEventSink, Config, DbClient, MemoryInventoryStore,
    PgInventoryStore, PgTrainCatalog, RedisAvailabilityCache, SeedData, StaticTrainCatalog,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "berth_api=debug,berth_order=info,berth_store=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("failed to load config")?;
    tracing::info!("Starting Berth API on port {}", config.server.port);

    let seed = match &config.seed {
        Some(seed) => Some(SeedData::load(&seed.file)?),
        None => None,
    };
    let lock_timeout = Duration::from_millis(config.booking.lock_timeout_ms);

    let (store, catalog): (Arc<dyn InventoryStore>, Arc<dyn TrainCatalog>) = match &config.database {
        Some(db_config) => {
            let db = DbClient::new(db_config).await.context("failed to connect to Postgres")?;
            db.migrate().await.context("failed to run migrations")?;

            let catalog = PgTrainCatalog::new(db.pool.clone());
            for train in seed.iter().flat_map(|s| s.trains.iter()) {
                catalog.upsert(train).await?;
            }
            (
                Arc::new(PgInventoryStore::new(db.pool.clone(), lock_timeout)),
                Arc::new(catalog),
            )
        }
        None => {
            tracing::warn!("No database configured; bookings live in memory only");
            let trains = seed.as_ref().map(|s| s.trains.clone()).unwrap_or_default();
            (
                Arc::new(MemoryInventoryStore::new(lock_timeout)),
                Arc::new(StaticTrainCatalog::new(trains)),
            )
        }
    };

    let broadcast = BroadcastEventSink::new(256);
    let events = event_sink(&config, &broadcast)?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(config.booking.utc_offset_minutes));

    let rules = BookingRules {
        fares: FareCalculator::new(config.fares.clone(), config.pricing()).context("invalid fare table")?,
        quotas: QuotaPolicy::new(config.booking.max_passengers, config.booking.tatkal_max_passengers),
        refunds: config.refund_policy().context("invalid refund tiers")?,
        chart_window: ChartWindow {
            opens_minutes_before: config.booking.chart_opens_minutes_before,
            closes_minutes_before: config.booking.chart_closes_minutes_before,
        },
    };

    let mut service = ReservationService::new(store, catalog, events, clock.clone(), rules);
    if let Some(redis) = &config.redis {
        // Availability reads fall back to the store when Redis is down.
        match RedisAvailabilityCache::new(&redis.url, redis.ttl_seconds).await {
            Ok(cache) => service = service.with_cache(Arc::new(cache)),
            Err(e) => tracing::warn!("Redis unavailable, running without availability cache: {}", e),
        }
    }
    let service = Arc::new(service);

    if let (Some(seed), Some(seed_config)) = (&seed, &config.seed) {
        seeding::provision_runs(&service, seed, clock.now().date(), seed_config.days_ahead).await?;
    }

    tokio::spawn(worker::start_chart_worker(service.clone(), config.booking.chart_poll_seconds));

    let app = app(AppState { service, events: broadcast });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// SSE fan-out always; Kafka when built in and configured.
#[cfg(feature = "kafka")]
fn event_sink(config: &Config, broadcast: &BroadcastEventSink) -> anyhow::Result<Arc<dyn EventSink>> {
    let mut sinks: Vec<Arc<dyn EventSink>> = vec![Arc::new(broadcast.clone())];
    if let Some(kafka) = &config.kafka {
        let producer = berth_store::KafkaEventProducer::new(&kafka.brokers, &kafka.topic)
            .context("failed to create Kafka producer")?;
        sinks.push(Arc::new(producer));
    }
    Ok(Arc::new(CompositeEventSink::new(sinks)))
}

#[cfg(not(feature = "kafka"))]
fn event_sink(config: &Config, broadcast: &BroadcastEventSink) -> anyhow::Result<Arc<dyn EventSink>> {
    if config.kafka.is_some() {
        tracing::warn!("Kafka configured but the `kafka` feature is off; events stay local");
    }
    let sinks: Vec<Arc<dyn EventSink>> = vec![Arc::new(broadcast.clone())];
    Ok(Arc::new(CompositeEventSink::new(sinks)))
}
