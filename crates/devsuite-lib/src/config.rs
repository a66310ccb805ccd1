//! Installer settings.
//! Defaults are static constants; a run can load overrides from a JSON file and the environment.

use crate::error::CatalogError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Connect timeout, and the longest a download may sit without receiving data
pub const REQUEST_TIMEOUT_SECS: u64 = 60;

// Progress reporting throttling, at most one sink update per interval
pub const PROGRESS_INTERVAL_MS: u64 = 500;

/// Set to `false` or `0` to accept self-signed certificates from internal mirrors.
pub const REJECT_UNAUTHORIZED_ENV: &str = "DSI_REJECT_UNAUTHORIZED";

pub const DEFAULT_USER_AGENT: &str = concat!("devsuite-installer/", env!("CARGO_PKG_VERSION"));

/// Settings for a single installer run.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstallerConfig {
    /// Parent folder of every component's `targetFolderName`
    pub install_root: PathBuf,

    /// Where fetched artifacts are written
    pub download_dir: PathBuf,

    /// Artifacts shipped alongside the installer
    pub bundle_dir: PathBuf,

    /// Sent with every download so mirrors see the same agent as the session
    pub user_agent: String,

    pub reject_unauthorized: bool,

    pub request_timeout_secs: u64,

    pub progress_interval_ms: u64,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        let base = std::env::temp_dir().join("devsuite");
        Self {
            install_root: base.join("install"),
            download_dir: base.join("downloads"),
            bundle_dir: base.join("bundle"),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            reject_unauthorized: true,
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            progress_interval_ms: PROGRESS_INTERVAL_MS,
        }
    }
}

impl InstallerConfig {
    pub fn new(install_root: PathBuf, download_dir: PathBuf, bundle_dir: PathBuf) -> Self {
        Self {
            install_root,
            download_dir,
            bundle_dir,
            ..Default::default()
        }
        .apply_env_overrides()
    }

    /// Load settings from a JSON file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let contents = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: InstallerConfig = serde_json::from_str(&contents)?;
        Ok(config.apply_env_overrides())
    }

    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(value) = std::env::var(REJECT_UNAUTHORIZED_ENV) {
            self.reject_unauthorized = parse_reject_unauthorized(&value);
            if !self.reject_unauthorized {
                log::warn!(
                    "{} is set, TLS certificates will not be verified",
                    REJECT_UNAUTHORIZED_ENV
                );
            }
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// Build the client shared by every download in the run.
    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .connect_timeout(self.request_timeout())
            .redirect(reqwest::redirect::Policy::limited(10))
            .danger_accept_invalid_certs(!self.reject_unauthorized)
            .build()
    }
}

fn parse_reject_unauthorized(value: &str) -> bool {
    !matches!(value.trim().to_ascii_lowercase().as_str(), "false" | "0" | "no")
}
