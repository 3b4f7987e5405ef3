use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("Download failed with status {0}")]
    Status(reqwest::StatusCode),

    #[error("No managed download available for stable release {0}")]
    Unavailable(String),

    #[error("No release asset for this platform")]
    UnsupportedPlatform,

    #[error("Another download is in flight")]
    AlreadyRunning,

    #[error("Download task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Failed to replace executable with {path:?}: {source}")]
    Replace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl InstallError {
    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub(crate) fn http(context: &'static str, source: reqwest::Error) -> Self {
        Self::Http { context, source }
    }
}
