//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Telemetry error: {0}")]
    Telemetry(#[from] tracing_subscriber::util::TryInitError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("Publisher error: {0}")]
    Publisher(#[from] events::PublisherError),

    #[error("History error: {0}")]
    History(#[from] history::HistoryError),

    #[error("Command error: {0}")]
    Command(#[from] command::CommandError),
}

pub type Result<T> = std::result::Result<T, AppError>;
