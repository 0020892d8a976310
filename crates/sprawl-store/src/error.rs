use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Database(#[from] rusqlite::Error),

    /// A panicking writer left a backend lock poisoned.
    #[error("store lock poisoned: {0}")]
    Poisoned(String),

    /// The blocking worker running a query panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),

    #[error("schema migration: {0}")]
    Migration(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
