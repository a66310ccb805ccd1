use crate::catalog::Requirement;
use crate::installer::core::traits::{InstallContext, Recipe};
use crate::installer::recipes::archive::{extract_archive, ArchiveFormat};
use crate::installer::recipes::{first_version, make_executable};
use crate::installer::types::{Detection, OsType, ProgressReporter};
use crate::utils::process::probe_output;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use std::path::Path;
use std::sync::Arc;

/// Single command line tool (kubectl, oc, ...) placed in the target folder.
pub struct BinaryRecipe;

impl Recipe for BinaryRecipe {
    fn detect<'a>(&'a self, requirement: &'a Requirement) -> BoxFuture<'a, Result<Option<Detection>>> {
        Box::pin(async move {
            let name = OsType::current().executable_name(&requirement.id);
            let Ok(path) = which::which(&name) else {
                return Ok(None);
            };
            let Some(output) = probe_output(&path, ["version", "--client"]).await else {
                return Ok(None);
            };
            let version = first_version(&output)
                .with_context(|| format!("No version in output of {:?}", path))?;
            Ok(Some(Detection {
                version,
                location: path.parent().unwrap_or(&path).to_path_buf(),
            }))
        })
    }

    fn install_after_requirements<'a>(
        &'a self,
        ctx: &'a InstallContext<'a>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let executable = ctx.os.executable_name(&ctx.requirement.id);
            for artifact in &ctx.artifacts {
                reporter.set_status(&format!("Installing {}", executable));
                let placed = extract_archive(artifact, &ctx.target_dir).await?;
                if ArchiveFormat::of(artifact) == ArchiveFormat::Plain {
                    rename_to(&placed, &ctx.target_dir.join(&executable))?;
                }
            }

            let binary = ctx.target_dir.join(&executable);
            if !binary.exists() {
                anyhow::bail!("{:?} was not found after installation", binary);
            }
            make_executable(&binary)?;
            Ok(())
        })
    }
}

/// Downloaded files keep their versioned names; the tool is installed under its plain name.
fn rename_to(from: &Path, to: &Path) -> Result<()> {
    if from != to {
        std::fs::rename(from, to).with_context(|| format!("Failed to move {:?} to {:?}", from, to))?;
    }
    Ok(())
}
