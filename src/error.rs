use thiserror::Error;

/// Failures that escape an exchange instead of degrading its stream.
///
/// Tool and gateway failures are absorbed into the stream as error-flagged
/// results or terminal notice chunks; only configuration and storage
/// problems surface here, because losing the session log silently would be
/// worse than a visible failure.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("model gateway is disabled by configuration")]
    GatewayDisabled,

    #[error(transparent)]
    Storage(#[from] session_store::SessionStoreError),

    #[error("failed to spawn exchange worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("exchange worker panicked")]
    WorkerPanicked,
}
