use crate::installer::core::traits::{InstallContext, Recipe};
use crate::installer::recipes::archive::install_artifacts;
use crate::installer::recipes::jdk::find_java_executable;
use crate::installer::types::ProgressReporter;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const VM_FLAG: &str = "-vm";
const VMARGS_FLAG: &str = "-vmargs";

/// Eclipse-based IDE. Setup points the launcher `.ini` at the JDK of the run.
pub struct IdeRecipe;

impl Recipe for IdeRecipe {
    fn install_after_requirements<'a>(
        &'a self,
        ctx: &'a InstallContext<'a>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { install_artifacts(ctx, &*reporter).await })
    }

    fn setup<'a>(
        &'a self,
        ctx: &'a InstallContext<'a>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let Some(java) = dependency_java(ctx) else {
                log::warn!("[{}] no JDK in this run, launcher left unchanged", ctx.requirement.id);
                return Ok(());
            };
            let Some(ini) = find_launcher_ini(&ctx.location()) else {
                log::warn!("[{}] no launcher .ini under {:?}", ctx.requirement.id, ctx.location());
                return Ok(());
            };

            reporter.set_status("Configuring IDE");
            let contents = tokio::fs::read_to_string(&ini)
                .await
                .with_context(|| format!("Failed to read {:?}", ini))?;
            let updated = with_vm(&contents, &java);
            tokio::fs::write(&ini, updated)
                .await
                .with_context(|| format!("Failed to write {:?}", ini))?;
            log::info!("Configured {:?} to use {:?}", ini, java);
            Ok(())
        })
    }
}

/// The java executable of the first dependency that has one.
fn dependency_java(ctx: &InstallContext<'_>) -> Option<PathBuf> {
    ctx.requirement
        .depends_on
        .iter()
        .flat_map(|dependency| dependency.ids())
        .filter_map(|id| ctx.peers.location_of(id))
        .find_map(|location| find_java_executable(&location))
}

/// First `*.ini` at the root or one folder down.
fn find_launcher_ini(dir: &Path) -> Option<PathBuf> {
    let is_ini = |p: &Path| p.is_file() && p.extension().map(|e| e == "ini").unwrap_or(false);

    let mut subdirs = Vec::new();
    for entry in std::fs::read_dir(dir).ok()?.flatten() {
        let path = entry.path();
        if is_ini(path.as_path()) {
            return Some(path);
        }
        if path.is_dir() {
            subdirs.push(path);
        }
    }
    subdirs.sort();
    subdirs.into_iter().find_map(|sub| {
        std::fs::read_dir(sub)
            .ok()?
            .flatten()
            .map(|e| e.path())
            .find(|p| is_ini(p.as_path()))
    })
}

/// Replace or insert the `-vm <java>` pair. It has to come before `-vmargs`.
fn with_vm(contents: &str, java: &Path) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut skip_next = false;
    for line in contents.lines() {
        if skip_next {
            skip_next = false;
            continue;
        }
        if line.trim() == VM_FLAG {
            skip_next = true;
            continue;
        }
        lines.push(line.to_string());
    }

    let at = lines
        .iter()
        .position(|l| l.trim() == VMARGS_FLAG)
        .unwrap_or(lines.len());
    lines.insert(at, VM_FLAG.to_string());
    lines.insert(at + 1, java.display().to_string());

    let mut out = lines.join("\n");
    out.push('\n');
    out
}
