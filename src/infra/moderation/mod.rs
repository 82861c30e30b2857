// Moderation store and collaborator implementations.

pub mod geo_client;
#[cfg(test)]
pub mod in_memory_store;
pub mod sqlite_store;

pub use geo_client::HttpGeoResolver;
#[cfg(test)]
pub use in_memory_store::InMemoryModerationStore;
pub use sqlite_store::SqliteModerationStore;
