//! Errores de persistencia para el backend de documentos.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MongoStoreError {
    #[error("mongo driver error: {0}")]
    Driver(#[from] mongodb::error::Error),

    #[error("bson (de)serialization error: {0}")]
    Bson(String),

    #[error("run id is not a valid ObjectId hex string: {0}")]
    InvalidRunId(String),

    #[error("no status row for this tenant")]
    NoStatus,

    #[error("status pointer references a missing entry")]
    DanglingPointer,
}

impl From<bson::ser::Error> for MongoStoreError {
    fn from(e: bson::ser::Error) -> Self {
        Self::Bson(e.to_string())
    }
}

impl From<bson::de::Error> for MongoStoreError {
    fn from(e: bson::de::Error) -> Self {
        Self::Bson(e.to_string())
    }
}
