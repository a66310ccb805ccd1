use crate::utils::version::VersionIssue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Progress sink consumed by the engine and by product recipes.
/// Implementations forward updates to the UI.
pub trait ProgressReporter: Send + Sync {
    /// Set a short status message
    fn set_status(&self, text: &str);

    /// Set the current amount (bytes or steps)
    fn set_current(&self, current: u64);

    /// Set the amount `set_current` counts towards
    fn set_total_amount(&self, total: u64);

    /// Mark the tracked operation as complete
    fn set_complete(&self);

    /// Report a failure for the tracked operation
    fn set_failed(&self, message: &str) {
        self.set_status(message);
    }
}

/// A progress reporter that does nothing (silent).
/// Useful for background verification or tests.
pub struct SilentProgressReporter;

impl ProgressReporter for SilentProgressReporter {
    fn set_status(&self, _text: &str) {}
    fn set_current(&self, _current: u64) {}
    fn set_total_amount(&self, _total: u64) {}
    fn set_complete(&self) {}
}

/// Writes progress to the `log` facade. Used when no UI is attached.
pub struct LogProgressReporter {
    label: String,
}

impl LogProgressReporter {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl ProgressReporter for LogProgressReporter {
    fn set_status(&self, text: &str) {
        log::info!("[{}] {}", self.label, text);
    }

    fn set_current(&self, current: u64) {
        log::debug!("[{}] progress {}", self.label, current);
    }

    fn set_total_amount(&self, total: u64) {
        log::debug!("[{}] total {}", self.label, total);
    }

    fn set_complete(&self) {
        log::info!("[{}] complete", self.label);
    }

    fn set_failed(&self, message: &str) {
        log::error!("[{}] {}", self.label, message);
    }
}

pub const OPTION_INSTALL: &str = "install";
pub const OPTION_DETECTED: &str = "detected";

/// Which option of a unit the user (or the engine) picked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectedOption {
    Install,
    Detected,
    /// Product-specific detected variant, e.g. a second JDK found on the host
    Variant(String),
}

impl SelectedOption {
    pub fn parse(name: &str) -> Self {
        match name {
            OPTION_INSTALL => SelectedOption::Install,
            OPTION_DETECTED => SelectedOption::Detected,
            other => SelectedOption::Variant(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SelectedOption::Install => OPTION_INSTALL,
            SelectedOption::Detected => OPTION_DETECTED,
            SelectedOption::Variant(name) => name,
        }
    }
}

impl fmt::Display for SelectedOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Details of one selectable option of a unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionDetail {
    pub version: Option<String>,
    pub location: Option<PathBuf>,
    pub valid: bool,
    pub error: Option<VersionIssue>,
    pub warning: Option<VersionIssue>,
}

/// What a detection probe found on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub version: String,
    pub location: PathBuf,
}

/// Lifecycle of an installable unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UnitState {
    Unconfigured,
    Detecting,
    Skip,
    NeedsInstall,
    AwaitingDownload,
    Downloading,
    Downloaded,
    AwaitingInstall,
    Installing,
    Installed,
    SettingUp,
    Done,
    Failed,
}

impl UnitState {
    /// A successor in the install chain may start once its gate reaches one of these.
    pub fn releases_successor(&self) -> bool {
        matches!(
            self,
            UnitState::Installed | UnitState::SettingUp | UnitState::Done
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UnitState::Done | UnitState::Failed)
    }
}

/// Operating system types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsType {
    Windows,
    MacOS,
    Linux,
}

impl OsType {
    /// Detect the current OS
    pub fn current() -> Self {
        #[cfg(target_os = "windows")]
        return OsType::Windows;

        #[cfg(target_os = "macos")]
        return OsType::MacOS;

        #[cfg(target_os = "linux")]
        return OsType::Linux;

        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        compile_error!("Unsupported operating system");
    }

    /// Key used by the catalog's `platform` overrides
    pub fn platform_key(&self) -> &'static str {
        match self {
            OsType::Windows => "win32",
            OsType::MacOS => "darwin",
            OsType::Linux => "linux",
        }
    }

    pub fn executable_name(&self, base: &str) -> String {
        match self {
            OsType::Windows => format!("{}.exe", base),
            _ => base.to_string(),
        }
    }
}
