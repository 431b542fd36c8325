//! fsm-storage-postgres
//!
//! Implementación relacional (Diesel/Postgres) de `fsm_core::StateStore`.
//!
//! Módulos:
//! - `pg`: `PgStateStore`, pool r2d2 y utilidades de conexión/reintento.
//! - `migrations`: runner embebido de migraciones Diesel.
//! - `config`: carga de configuración desde `.env`.
//! - `schema`: tablas Diesel declaradas para compilar queries.

pub mod config;
pub mod error;
pub mod migrations;
pub mod pg;
pub mod schema;

pub use config::init_dotenv;
pub use error::PersistenceError;
pub use pg::{build_dev_pool_from_env, build_pool, ConnectionProvider, PgPool, PgStateStore, PoolProvider};
