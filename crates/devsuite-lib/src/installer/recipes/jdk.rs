use crate::catalog::Requirement;
use crate::installer::core::traits::{InstallContext, Recipe};
use crate::installer::recipes::archive::install_artifacts;
use crate::installer::types::{Detection, ProgressReporter};
use crate::utils::process::{probe_output, run_installer};
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

static JAVA_VERSION: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r#"version\s+"([^"]+)""#).ok());

/// Java development kit. Detected through `java -version` on the PATH,
/// installed from an MSI on Windows and from an archive everywhere else.
pub struct JdkRecipe;

impl Recipe for JdkRecipe {
    fn detect<'a>(&'a self, _requirement: &'a Requirement) -> BoxFuture<'a, Result<Option<Detection>>> {
        Box::pin(async {
            let Ok(java) = which::which("java") else {
                return Ok(None);
            };
            let java = std::fs::canonicalize(&java).unwrap_or(java);
            let Some(output) = probe_output(&java, ["-version"]).await else {
                return Ok(None);
            };
            let version = parse_java_version(&output)
                .with_context(|| format!("Could not parse Java version from: {}", output))?;

            Ok(Some(Detection {
                version,
                location: java_home(&java),
            }))
        })
    }

    fn install_after_requirements<'a>(
        &'a self,
        ctx: &'a InstallContext<'a>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let Some(artifact) = ctx.primary_artifact() else {
                anyhow::bail!("No JDK artifact for '{}'", ctx.requirement.id);
            };

            if is_msi(artifact) {
                reporter.set_status("Running JDK installer");
                let install_dir = format!("INSTALLDIR={}", ctx.target_dir.display());
                run_installer(
                    Path::new("msiexec"),
                    [
                        OsStr::new("/i"),
                        artifact.as_os_str(),
                        OsStr::new("/qn"),
                        OsStr::new(&install_dir),
                    ],
                    None,
                )
                .await?;
            } else {
                install_artifacts(ctx, &*reporter).await?;
            }

            let java = find_java_executable(&ctx.target_dir)
                .context("Could not find java executable after installation")?;
            super::make_executable(&java)?;
            log::info!("JDK installed: {:?}", java);
            Ok(())
        })
    }
}

fn is_msi(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("msi"))
        .unwrap_or(false)
}

/// The quoted version of `java -version` output: `1.8.0_292`, `17.0.2`, `21-ea`.
pub fn parse_java_version(output: &str) -> Option<String> {
    let caps = JAVA_VERSION.as_ref()?.captures(output)?;
    Some(caps.get(1)?.as_str().to_string())
}

/// `<home>/bin/java` -> `<home>`
fn java_home(java: &Path) -> PathBuf {
    java.parent()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| java.to_path_buf())
}

/// Find the java executable in a JDK installation directory.
pub fn find_java_executable(dir: &Path) -> Option<PathBuf> {
    // bin/java directly, one folder down (archive root), or a macOS bundle
    let executable_name = if cfg!(windows) { "java.exe" } else { "java" };

    let direct = dir.join("bin").join(executable_name);
    if direct.exists() {
        return Some(direct);
    }

    let macos = dir.join("Contents/Home/bin").join(executable_name);
    if macos.exists() {
        return Some(macos);
    }

    let entries = std::fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        for candidate in [
            path.join("bin").join(executable_name),
            path.join("Contents/Home/bin").join(executable_name),
        ] {
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_java_version_output() {
        let legacy = "java version \"1.8.0_292\"\nJava(TM) SE Runtime Environment";
        assert_eq!(parse_java_version(legacy).as_deref(), Some("1.8.0_292"));

        let modern = "openjdk version \"17.0.2\" 2022-01-18\nOpenJDK Runtime Environment";
        assert_eq!(parse_java_version(modern).as_deref(), Some("17.0.2"));

        assert_eq!(parse_java_version("command not found"), None);
    }

    #[test]
    fn finds_nested_java() {
        let dir = tempfile::tempdir().unwrap();
        let exe = if cfg!(windows) { "java.exe" } else { "java" };
        let bin = dir.path().join("jdk-17.0.2").join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(bin.join(exe), b"").unwrap();

        assert_eq!(find_java_executable(dir.path()), Some(bin.join(exe)));
        assert_eq!(find_java_executable(&dir.path().join("missing")), None);
    }

    #[test]
    fn java_home_is_two_levels_up() {
        assert_eq!(
            java_home(Path::new("/usr/lib/jvm/java-17/bin/java")),
            PathBuf::from("/usr/lib/jvm/java-17")
        );
    }

    #[test]
    fn msi_detection_ignores_case() {
        assert!(is_msi(Path::new("C:/dl/jdk.MSI")));
        assert!(!is_msi(Path::new("/dl/jdk.zip")));
    }
}
