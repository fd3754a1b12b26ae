//! Cache Layer - read-through caching over the store
//!
//! [`DataSource`] is the façade the CLI and importers talk to. Foods carry
//! their servings, nutrient values and linked ingredients; meals carry their
//! portions linked to foods. Each kind is held in an [`EntityCache`].

pub mod data_source;
pub mod entity_cache;
pub mod loader;

pub use data_source::DataSource;
pub use entity_cache::{CacheStats, EntityCache, Snapshot};
