use crate::catalog::Requirement;
use crate::installer::registry::UnitRegistry;
use crate::installer::types::{Detection, OptionDetail, OsType, ProgressReporter, SelectedOption};
use crate::utils::version::VersionWindow;
use anyhow::Result;
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything a recipe may look at while installing or configuring its component.
pub struct InstallContext<'a> {
    pub requirement: &'a Requirement,
    /// `install_root/targetFolderName`
    pub target_dir: PathBuf,
    /// Local copies of the component's artifacts, in declared order
    pub artifacts: Vec<PathBuf>,
    pub selected: SelectedOption,
    pub detected: Option<OptionDetail>,
    /// Read-only view of the other units of the run
    pub peers: &'a UnitRegistry,
    pub os: OsType,
}

impl InstallContext<'_> {
    pub fn primary_artifact(&self) -> Option<&Path> {
        self.artifacts.first().map(PathBuf::as_path)
    }

    /// Where this component lives once the run is over: the detected location or the target folder.
    pub fn location(&self) -> PathBuf {
        match (&self.selected, &self.detected) {
            (SelectedOption::Install, _) => self.target_dir.clone(),
            (_, Some(detail)) => detail
                .location
                .clone()
                .unwrap_or_else(|| self.target_dir.clone()),
            (_, None) => self.target_dir.clone(),
        }
    }
}

/// Product-specific installation recipe.
/// Each component (JDK, VirtualBox, the IDE, ...) implements its own probing and installer invocation.
pub trait Recipe: Send + Sync {
    /// Look for an existing installation. `Ok(None)` means nothing was found.
    fn detect<'a>(&'a self, _requirement: &'a Requirement) -> BoxFuture<'a, Result<Option<Detection>>> {
        Box::pin(async { Ok(None) })
    }

    /// Versions of a detected installation the suite accepts.
    fn version_window(&self, requirement: &Requirement) -> VersionWindow {
        VersionWindow::new(
            requirement.minimum_version.as_deref(),
            requirement.maximum_version.as_deref(),
        )
    }

    /// Run the component's installer. Called once every dependency is ready.
    fn install_after_requirements<'a>(
        &'a self,
        ctx: &'a InstallContext<'a>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> BoxFuture<'a, Result<()>>;

    /// Post-install configuration. Runs for fresh installs and for detected installations.
    fn setup<'a>(
        &'a self,
        _ctx: &'a InstallContext<'a>,
        _reporter: Arc<dyn ProgressReporter>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}
