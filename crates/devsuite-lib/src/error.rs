//! Library error types.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Download(#[from] DownloadError),
    #[error(transparent)]
    Install(#[from] InstallError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

/// Problems with the requirement catalog. These are configuration errors and abort the run.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("catalog is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("catalog root must be an object keyed by requirement id")]
    NotAnObject,
    #[error("invalid catalog entry '{id}': {source}")]
    Entry {
        id: String,
        source: serde_json::Error,
    },
    #[error("catalog entry '{0}' has no download source")]
    MissingDownload(String),
}

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("'{from}' depends on '{to}' which has no installable unit")]
    UnknownDependency { from: String, to: String },
    #[error("'{from}' requires one of {alternatives:?} but none of them is available")]
    UnsatisfiedAlternatives {
        from: String,
        alternatives: Vec<String>,
    },
    #[error("dependency cycle detected at '{0}'")]
    Cycle(String),
    #[error("no installable unit named '{0}'")]
    UnknownUnit(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("HTTP error {status}: {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        source: reqwest::Error,
    },
    #[error("no data from {url} for {idle:?}")]
    Stalled { url: String, idle: std::time::Duration },
    #[error("SHA256 mismatch for {path:?}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("failed writing {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{failed} of {total} downloads failed")]
    Incomplete { failed: usize, total: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("'{unit}' cannot install because '{predecessor}' failed")]
    PredecessorFailed { unit: String, predecessor: String },
    #[error("installation of '{unit}' failed: {reason:#}")]
    Recipe { unit: String, reason: anyhow::Error },
    #[error("setup of '{unit}' failed: {reason:#}")]
    Setup { unit: String, reason: anyhow::Error },
    #[error("'{0}' is not configured: the detected installation is unusable and no install was selected")]
    NotConfigured(String),
    #[error("'{0}' has not been downloaded")]
    NotDownloaded(String),
}
