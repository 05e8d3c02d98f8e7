//! Schema migration seam. Startup refuses to serve when this fails.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("migration {version} failed: {message}")]
    Apply { version: i64, message: String },
    #[error("migration source is invalid: {0}")]
    Source(String),
    #[error("migration bookkeeping failed: {0}")]
    Database(String),
}

/// Versions applied by one invocation. Empty when the schema was current.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub applied: Vec<i64>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

#[async_trait]
pub trait MigrationRunner: Send + Sync {
    /// Applies pending migrations in order. Running it again applies nothing.
    async fn run_migrations(&self) -> Result<MigrationReport, MigrationError>;
}
