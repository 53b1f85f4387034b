pub mod asset_registry;
pub mod defaults;
pub mod error;
pub mod hashing;
pub mod job;
pub mod models;
pub mod regenerate;
pub mod render;
pub mod template_store;
pub mod types;
pub mod workflow;
