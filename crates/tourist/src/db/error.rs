use std::path::PathBuf;

use thiserror::Error;

use super::PinId;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open database at {path}: {source}")]
    Open { path: PathBuf, source: r2d2::Error },

    #[error("database migration failed: {0}")]
    Migration(rusqlite::Error),

    #[error("database schema version {found} is newer than supported version {expected}")]
    UnsupportedSchemaVersion { found: i32, expected: i32 },

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("database query failed: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("failed to spawn blocking task: {0}")]
    Spawn(#[from] tokio::task::JoinError),

    #[error("coordinate ({latitude}, {longitude}) is out of range")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    #[error("pin {0} does not exist")]
    UnknownPin(PinId),

    #[error("failed to save changes: {0}")]
    Persistence(#[source] Box<StoreError>),

    #[error("store is closed")]
    Closed,
}
