use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Extension trait for commands spawned by the installer.
pub trait SuiteCommandExt {
    /// Hides the console window on Windows. No-op on other platforms.
    fn suppress_console(&mut self) -> &mut Self;
}

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x08000000;

impl SuiteCommandExt for Command {
    fn suppress_console(&mut self) -> &mut Self {
        #[cfg(windows)]
        {
            self.creation_flags(CREATE_NO_WINDOW);
        }
        self
    }
}

/// Run a detection probe and return its combined stdout and stderr.
/// Any failure to run the probe means "not found" and yields `None`.
pub async fn probe_output<I, S>(program: impl AsRef<OsStr>, args: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let program = program.as_ref();
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .suppress_console()
        .output()
        .await;

    match output {
        Ok(output) if output.status.success() => {
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            // `java -version` reports on stderr
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            Some(text)
        }
        Ok(output) => {
            log::debug!("Probe {:?} exited with {}", program, output.status);
            None
        }
        Err(e) => {
            log::debug!("Probe {:?} could not run: {}", program, e);
            None
        }
    }
}

/// Run a native installer to completion. A non-zero exit status is an error.
pub async fn run_installer<I, S>(program: &Path, args: I, working_dir: Option<&Path>) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command.args(args).stdin(Stdio::null()).suppress_console();
    if let Some(dir) = working_dir {
        command.current_dir(dir);
    }

    log::info!("Running installer {:?}", program);
    let status = command
        .status()
        .await
        .with_context(|| format!("Failed to start installer {:?}", program))?;

    if !status.success() {
        anyhow::bail!("Installer {:?} exited with {}", program, status);
    }
    log::debug!("Installer {:?} finished", program);
    Ok(())
}
