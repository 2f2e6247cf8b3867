//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure mode of startup and shutdown so
//! `main` can propagate with `?`.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: courier_core::ConfigError,
    },

    /// The persistence backend could not be opened.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: courier_store::StoreError,
    },

    /// The scheduler could not load its persisted state.
    #[error("scheduler error: {source}")]
    Scheduler {
        /// The underlying scheduler error.
        #[from]
        source: courier_core::SchedulerError,
    },

    /// The scheduler task stopped answering.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        #[from]
        source: courier_core::RunnerClosed,
    },

    /// A host section of the config file is malformed, or the outbox
    /// cannot be opened.
    #[error("host error: {message}")]
    Host {
        /// Description of the failure.
        message: String,
    },

    /// Waiting for the shutdown signal or the scheduler task failed.
    #[error("signal error: {message}")]
    Signal {
        /// Description of the failure.
        message: String,
    },
}
