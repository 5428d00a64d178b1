//! Error taxonomy shared by the fetch/enrich/brief pipelines.
//!
//! Workers recover locally from every variant here: nothing in this crate
//! propagates an error to a caller outside the pipeline that raised it.
//! Schedulers and recovery sweeps only ever log these; they never bubble up.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("fetch failed: {0}")]
    FetchFailure(String),

    #[error("enrichment failed: {0}")]
    EnrichmentFailure(String),

    #[error("insufficient credits for user {0}")]
    InsufficientCredits(String),

    #[error("rate limited by provider: {0}")]
    ProviderRateLimited(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    /// Truncate to the 1024-char cap the spec places on stored error messages.
    pub fn truncated_message(&self) -> String {
        let msg = self.to_string();
        if msg.len() > 1024 {
            msg.chars().take(1024).collect()
        } else {
            msg
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
