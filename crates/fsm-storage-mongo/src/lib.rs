//! fsm-storage-mongo
//!
//! Implementación de documentos (driver oficial `mongodb`, cliente sync)
//! de `fsm_core::StateStore`.

pub mod config;
pub mod error;
pub mod models;
pub mod store;

pub use config::MongoConfig;
pub use error::MongoStoreError;
pub use store::MongoStateStore;
