pub mod app_config;
pub mod database;
pub mod events;
pub mod inventory_repo;
pub mod memory;
pub mod redis_repo;
pub mod seed;
pub mod train_repo;

pub use app_config::Config;
pub use database::DbClient;
pub use events::{BroadcastEventSink, CompositeEventSink};
#[cfg(feature = "kafka")]
pub use events::KafkaEventProducer;
pub use inventory_repo::PgInventoryStore;
pub use memory::{MemoryInventoryStore, StaticTrainCatalog};
pub use redis_repo::RedisAvailabilityCache;
pub use seed::{InventoryTemplate, SeedData, SeedError};
pub use train_repo::PgTrainCatalog;
