//! Kernel module - infrastructure traits, adapters and dependencies.

pub mod cluster;
pub mod deps;
pub mod postgres_store;
pub mod progress_store;
pub mod redis_store;
pub mod renderer;
pub mod tasks;
pub mod test_dependencies;
pub mod traits;

pub use cluster::KubeClusterClient;
pub use deps::OperatorDeps;
pub use postgres_store::PgMetadataStore;
pub use progress_store::connect_progress_store;
pub use redis_store::{RedisConnector, RedisProgressStore};
pub use renderer::{
    CrawlerParams, DefaultResourceRenderer, ProfileBrowserParams, RenderRequest,
};
pub use tasks::{TaskHandle, TaskOutcome, TaskPool};
pub use test_dependencies::TestDependencies;
pub use traits::*;
