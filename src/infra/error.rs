use std::{net::SocketAddr, path::PathBuf};

use thiserror::Error;

/// Failures while bringing up the process: storage, listeners, logging.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("database url is not configured")]
    MissingDatabaseUrl,
    #[error("failed to connect to the database")]
    Connect(#[source] sqlx::Error),
    #[error("failed to apply migrations")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("upload directory `{}` is unusable", path.display())]
    UploadRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to bind {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
}

impl InfraError {
    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }

    pub fn bind(addr: SocketAddr) -> impl FnOnce(std::io::Error) -> Self {
        move |source| Self::Bind { addr, source }
    }
}
