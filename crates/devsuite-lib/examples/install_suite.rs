//! Install every component of a catalog.
//!
//! ```text
//! cargo run --example install_suite -- requirements.json [config.json]
//! ```

use devsuite_lib::installer::types::LogProgressReporter;
use devsuite_lib::{Catalog, InstallerConfig, Orchestrator};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let catalog_path = PathBuf::from(args.next().unwrap_or_else(|| "requirements.json".into()));
    let config = match args.next() {
        Some(path) => InstallerConfig::load(&PathBuf::from(path))?,
        None => InstallerConfig::default().apply_env_overrides(),
    };

    let catalog = Catalog::load(&catalog_path)?;
    let orchestrator = Orchestrator::new(catalog, config, Arc::new(LogProgressReporter::new("suite")))?;

    let mut events = orchestrator.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            log::info!("{}", event);
        }
    });

    orchestrator.detect_all().await?;
    for unit in orchestrator.install_chain() {
        log::info!(
            "{}: {} ({:?})",
            unit.id(),
            unit.selected_option(),
            unit.option(unit.selected_option().as_str())
        );
    }

    let mut report = orchestrator.run().await?;
    if !report.failed_downloads.is_empty() {
        log::warn!("Retrying {:?}", report.failed_downloads);
        let retry = orchestrator.retry_failed_downloads().await;
        if !retry.is_success() {
            anyhow::bail!("Downloads still failing: {:?}", retry.failed);
        }
        let installs = orchestrator.install().await;
        report.installed = installs.succeeded;
        report.failed_installs = installs.failed;
    }

    log::info!("Run finished: {:?}", report);
    if !report.failed_installs.is_empty() {
        anyhow::bail!("Installation failed for {:?}", report.failed_installs);
    }
    Ok(())
}
