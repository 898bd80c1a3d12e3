use kobra_core::CoreError;
use thiserror::Error;

/// Errors surfaced to whoever drives the engine.
///
/// Per-request and per-user failures never reach this type: they end up in
/// outcomes and user reports.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The shared HTTP client could not be built.
    #[error("http client setup failed: {0}")]
    HttpClient(#[source] reqwest::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
