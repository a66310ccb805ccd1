use crate::catalog::Requirement;
use crate::installer::core::traits::{InstallContext, Recipe};
use crate::installer::recipes::{first_version, make_executable};
use crate::installer::types::{Detection, OsType, ProgressReporter};
use crate::utils::process::{probe_output, run_installer};
use anyhow::Result;
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const TARGET_PLACEHOLDER: &str = "{target}";

/// VirtualBox hypervisor, driven through its vendor installer.
pub struct VirtualBoxRecipe;

impl Recipe for VirtualBoxRecipe {
    fn detect<'a>(&'a self, _requirement: &'a Requirement) -> BoxFuture<'a, Result<Option<Detection>>> {
        Box::pin(async {
            let Some(manage) = find_vboxmanage(OsType::current()) else {
                return Ok(None);
            };
            let Some(output) = probe_output(&manage, ["--version"]).await else {
                return Ok(None);
            };
            let Some(version) = first_version(&output) else {
                log::debug!("Unrecognised VBoxManage output: {}", output.trim());
                return Ok(None);
            };

            Ok(Some(Detection {
                version,
                location: manage
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| manage.clone()),
            }))
        })
    }

    fn install_after_requirements<'a>(
        &'a self,
        ctx: &'a InstallContext<'a>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let Some(installer) = ctx.primary_artifact() else {
                anyhow::bail!("No VirtualBox installer for '{}'", ctx.requirement.id);
            };
            let args = installer_args(ctx.requirement.install_args.as_deref(), &ctx.target_dir, ctx.os)?;

            reporter.set_status("Running VirtualBox installer");
            make_executable(installer)?;
            run_installer(installer, &args, installer.parent()).await
        })
    }
}

fn find_vboxmanage(os: OsType) -> Option<PathBuf> {
    if let Ok(path) = which::which("VBoxManage") {
        return Some(path);
    }
    // The Windows installer does not add itself to PATH
    if os == OsType::Windows {
        let program_files =
            std::env::var_os("ProgramFiles").unwrap_or_else(|| "C:\\Program Files".into());
        let candidate = PathBuf::from(program_files)
            .join("Oracle")
            .join("VirtualBox")
            .join("VBoxManage.exe");
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

/// Catalog `installArgs` split shell-style, or the silent defaults for the platform.
/// `{target}` is replaced by the component's target folder.
fn installer_args(template: Option<&str>, target: &Path, os: OsType) -> Result<Vec<String>> {
    let template = match template {
        Some(template) => template.to_string(),
        None => match os {
            OsType::Windows => "--silent --msiparams INSTALLDIR={target}".to_string(),
            OsType::MacOS | OsType::Linux => String::new(),
        },
    };

    let Some(args) = shlex::split(&template) else {
        anyhow::bail!("Malformed installer arguments: {}", template);
    };
    let target = target.display().to_string();
    Ok(args
        .into_iter()
        .map(|arg| arg.replace(TARGET_PLACEHOLDER, &target))
        .collect())
}
