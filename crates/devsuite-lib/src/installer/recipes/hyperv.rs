use crate::catalog::Requirement;
use crate::installer::core::traits::{InstallContext, Recipe};
use crate::installer::types::{Detection, ProgressReporter};
use anyhow::Result;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Hyper-V is a Windows feature. It can be detected but never installed by the suite.
pub struct HyperVRecipe;

impl Recipe for HyperVRecipe {
    fn detect<'a>(&'a self, requirement: &'a Requirement) -> BoxFuture<'a, Result<Option<Detection>>> {
        Box::pin(async move {
            if !cfg!(windows) {
                return Ok(None);
            }
            let Some(output) = crate::utils::process::probe_output(
                "powershell",
                [
                    "-NoProfile",
                    "-NonInteractive",
                    "-Command",
                    "(Get-WindowsOptionalFeature -Online -FeatureName Microsoft-Hyper-V).State",
                ],
            )
            .await
            else {
                return Ok(None);
            };

            if !is_enabled(&output) {
                return Ok(None);
            }
            let system_root = std::env::var_os("SystemRoot").unwrap_or_else(|| "C:\\Windows".into());
            Ok(Some(Detection {
                version: requirement.version.clone(),
                location: std::path::PathBuf::from(system_root).join("System32"),
            }))
        })
    }

    fn install_after_requirements<'a>(
        &'a self,
        _ctx: &'a InstallContext<'a>,
        _reporter: Arc<dyn ProgressReporter>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async {
            anyhow::bail!("Hyper-V has to be enabled from Windows Features")
        })
    }
}

fn is_enabled(state: &str) -> bool {
    state.trim().eq_ignore_ascii_case("enabled")
}
