//! Top-level driver of an install run.
//!
//! The orchestrator owns every unit of the run and moves the whole set through three phases
//! that never overlap: verify, download, install. Graph and chain are rebuilt through
//! [`Orchestrator::plan`] whenever detection or selection changes.

use crate::catalog::{Catalog, Credentials, Requirement};
use crate::config::InstallerConfig;
use crate::error::{GraphError, InstallError, Result};
use crate::installer::core::downloader::{BatchReport, LogObserver};
use crate::installer::core::events::{CompletionEvent, EventBus, Target};
use crate::installer::core::progress::AggregateProgress;
use crate::installer::core::traits::Recipe;
use crate::installer::graph::DependencyGraph;
use crate::installer::recipes::recipe_for;
use crate::installer::registry::UnitRegistry;
use crate::installer::scheduler::wire_install_chain;
use crate::installer::types::{ProgressReporter, SelectedOption};
use crate::installer::unit::InstallableUnit;
use futures::future::join_all;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Unit ids that succeeded and failed in one phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseOutcome {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
}

impl PhaseOutcome {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Summary of [`Orchestrator::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub downloaded: Vec<String>,
    pub failed_downloads: Vec<String>,
    pub installed: Vec<String>,
    pub failed_installs: Vec<String>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed_downloads.is_empty() && self.failed_installs.is_empty()
    }
}

#[derive(Default)]
struct Plan {
    graph: Option<DependencyGraph>,
    chain: Vec<Arc<InstallableUnit>>,
}

pub struct Orchestrator {
    catalog: Catalog,
    config: InstallerConfig,
    units: UnitRegistry,
    events: EventBus,
    reporter: Arc<dyn ProgressReporter>,
    plan: Mutex<Plan>,
}

impl Orchestrator {
    /// Create one unit per catalog entry using the built-in recipes, then plan the run.
    pub fn new(
        catalog: Catalog,
        config: InstallerConfig,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<Self> {
        Self::with_recipes(catalog, config, reporter, recipe_for)
    }

    /// Like [`Orchestrator::new`] with a custom recipe factory.
    pub fn with_recipes<F>(
        catalog: Catalog,
        config: InstallerConfig,
        reporter: Arc<dyn ProgressReporter>,
        recipes: F,
    ) -> Result<Self>
    where
        F: Fn(&Requirement) -> Box<dyn Recipe>,
    {
        let client = config.http_client()?;
        let events = EventBus::default();

        let units: UnitRegistry = catalog
            .iter()
            .map(|requirement| {
                InstallableUnit::new(
                    requirement.clone(),
                    recipes(requirement),
                    &config,
                    client.clone(),
                    events.clone(),
                )
            })
            .collect();
        log::info!("Created {} installable units", units.len());

        let orchestrator = Self {
            catalog,
            config,
            units,
            events,
            reporter,
            plan: Mutex::new(Plan::default()),
        };
        orchestrator.plan()?;
        Ok(orchestrator)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    pub fn units(&self) -> &UnitRegistry {
        &self.units
    }

    pub fn unit(&self, id: &str) -> Option<&Arc<InstallableUnit>> {
        self.units.get(id)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CompletionEvent> {
        self.events.subscribe()
    }

    fn lock_plan(&self) -> std::sync::MutexGuard<'_, Plan> {
        self.plan.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The graph of the latest plan.
    pub fn graph(&self) -> Option<DependencyGraph> {
        self.lock_plan().graph.clone()
    }

    /// Units in install order.
    pub fn install_chain(&self) -> Vec<Arc<InstallableUnit>> {
        self.lock_plan().chain.clone()
    }

    // ---------------------------------------------------------------------
    // Planning
    // ---------------------------------------------------------------------

    /// Rebuild the dependency graph from the current detection and selection state and rewire
    /// the install chain.
    pub fn plan(&self) -> std::result::Result<(), GraphError> {
        let graph = DependencyGraph::build(&self.units, &self.catalog)?;
        let chain = wire_install_chain(&self.units, &graph)?;
        let mut plan = self.lock_plan();
        plan.graph = Some(graph);
        plan.chain = chain;
        Ok(())
    }

    /// Probe the host for every detectable unit, then re-plan.
    pub async fn detect_all(&self) -> std::result::Result<(), GraphError> {
        self.reporter.set_status("Detecting installed components");
        join_all(self.units.iter().map(|unit| unit.detect_existing_install())).await;
        self.plan()
    }

    /// Select `id` for install and pull in what it depends on.
    pub fn select(&self, id: &str) -> std::result::Result<(), GraphError> {
        let unit = self.require_unit(id)?;
        unit.set_selected_option(SelectedOption::Install);
        self.plan()?;

        if let Some(graph) = self.graph() {
            for dependency in graph.dependencies_of(id) {
                self.add_reference(&dependency, &graph)?;
            }
        }
        self.plan()
    }

    /// Drop `id` from the run and release what only it needed.
    pub fn deselect(&self, id: &str) -> std::result::Result<(), GraphError> {
        let unit = self.require_unit(id)?;
        let graph = self.graph();
        unit.set_selected_option(SelectedOption::Detected);

        if let Some(graph) = graph {
            for dependency in graph.dependencies_of(id) {
                self.release_reference(&dependency, &graph)?;
            }
        }
        self.plan()
    }

    fn require_unit(&self, id: &str) -> std::result::Result<&Arc<InstallableUnit>, GraphError> {
        self.units
            .get(id)
            .ok_or_else(|| GraphError::UnknownUnit(id.to_string()))
    }

    fn add_reference(
        &self,
        id: &str,
        graph: &DependencyGraph,
    ) -> std::result::Result<(), GraphError> {
        let unit = self.require_unit(id)?;
        if unit.add_reference() == 1 {
            if !unit.has_valid_detection() {
                log::debug!("Auto-selecting '{}'", id);
                unit.set_selected_option(SelectedOption::Install);
            }
            for dependency in graph.dependencies_of(id) {
                self.add_reference(&dependency, graph)?;
            }
        }
        Ok(())
    }

    fn release_reference(
        &self,
        id: &str,
        graph: &DependencyGraph,
    ) -> std::result::Result<(), GraphError> {
        let unit = self.require_unit(id)?;
        if unit.references() == 0 {
            return Ok(());
        }
        if unit.remove_reference() == 0 {
            if !unit.has_valid_detection() && unit.will_install() {
                log::debug!("Auto-deselecting '{}'", id);
                unit.set_selected_option(SelectedOption::Detected);
            }
            for dependency in graph.dependencies_of(id) {
                self.release_reference(&dependency, graph)?;
            }
        }
        Ok(())
    }

    /// Store credentials for a unit whose download host requires authentication.
    pub fn set_credentials(
        &self,
        id: &str,
        credentials: Credentials,
    ) -> std::result::Result<(), GraphError> {
        self.require_unit(id)?.set_credentials(credentials);
        Ok(())
    }

    /// Fails with the first unit whose selection cannot be acted on.
    pub fn ensure_configured(&self) -> std::result::Result<(), InstallError> {
        match self.install_chain().iter().find(|u| !u.is_configured()) {
            Some(unit) => Err(InstallError::NotConfigured(unit.id().to_string())),
            None => Ok(()),
        }
    }

    // ---------------------------------------------------------------------
    // Phases
    // ---------------------------------------------------------------------

    /// Check files already on disk for every unit that will install.
    pub async fn verify(&self) {
        self.reporter.set_status("Verifying downloaded files");
        let candidates: Vec<_> = self
            .install_chain()
            .into_iter()
            .filter(|u| !u.is_skipped() && u.will_install())
            .collect();

        join_all(candidates.iter().map(|unit| unit.check_files())).await;
        self.events
            .publish(CompletionEvent::CheckComplete(Target::All));
    }

    /// Download every missing artifact. Units download concurrently, each one's files in order.
    pub async fn download(&self) -> PhaseOutcome {
        let candidates: Vec<_> = self
            .install_chain()
            .into_iter()
            .filter(|u| !u.is_skipped() && u.will_install() && !u.is_downloaded())
            .collect();

        let total: u64 = candidates
            .iter()
            .map(|u| u.requirement().total_size())
            .sum();
        log::info!(
            "Downloading {} component(s), {} bytes declared",
            candidates.len(),
            total
        );

        let aggregate =
            AggregateProgress::new(self.reporter.clone(), total, self.config.progress_interval());
        let results = join_all(candidates.iter().map(|unit| {
            let sink = aggregate.for_unit(unit.id());
            async move { (unit.id().to_string(), unit.download_installer(sink, &LogObserver).await) }
        }))
        .await;

        self.finish_download_phase(&aggregate, results)
    }

    /// Re-issue the downloads that failed, and only those.
    pub async fn retry_failed_downloads(&self) -> PhaseOutcome {
        let candidates: Vec<_> = self
            .install_chain()
            .into_iter()
            .filter(|u| u.has_failed_downloads())
            .collect();

        let total: u64 = candidates
            .iter()
            .flat_map(|u| u.failed_downloads())
            .map(|task| task.size)
            .sum();
        log::info!("Retrying failed downloads of {} component(s)", candidates.len());

        let aggregate =
            AggregateProgress::new(self.reporter.clone(), total, self.config.progress_interval());
        let results = join_all(candidates.iter().map(|unit| {
            let sink = aggregate.for_unit(unit.id());
            async move { (unit.id().to_string(), unit.restart_download(sink, &LogObserver).await) }
        }))
        .await;

        self.finish_download_phase(&aggregate, results)
    }

    fn finish_download_phase(
        &self,
        aggregate: &AggregateProgress,
        results: Vec<(String, BatchReport)>,
    ) -> PhaseOutcome {
        let mut outcome = PhaseOutcome::default();
        for (id, report) in results {
            if report.is_success() {
                outcome.succeeded.push(id);
            } else {
                log::warn!(
                    "'{}': {} of {} download(s) failed",
                    id,
                    report.failed.len(),
                    report.total()
                );
                outcome.failed.push(id);
            }
        }

        if outcome.is_success() {
            aggregate.finish();
        } else {
            self.reporter.set_failed(&format!(
                "Downloads failed for: {}",
                outcome.failed.join(", ")
            ));
        }
        self.events
            .publish(CompletionEvent::DownloadingComplete(Target::All));
        outcome
    }

    /// Trigger `install` on every unit at once. The chain serializes the native installers.
    pub async fn install(&self) -> PhaseOutcome {
        let chain = self.install_chain();
        self.reporter.set_status("Installing");

        let results = join_all(chain.iter().map(|unit| {
            let reporter = self.reporter.clone();
            async move { (unit.id().to_string(), unit.install(reporter, &self.units).await) }
        }))
        .await;

        let mut outcome = PhaseOutcome::default();
        for (id, result) in results {
            match result {
                Ok(()) => outcome.succeeded.push(id),
                Err(e) => {
                    log::error!("Install of '{}' failed: {}", id, e);
                    outcome.failed.push(id);
                }
            }
        }

        if outcome.is_success() {
            self.reporter.set_complete();
        }
        self.events
            .publish(CompletionEvent::InstallComplete(Target::All));
        outcome
    }

    /// Verify, download and install. The install phase only starts when every download succeeded;
    /// otherwise the failures are reported and [`Orchestrator::retry_failed_downloads`] can follow.
    pub async fn run(&self) -> Result<RunReport> {
        self.ensure_configured()?;

        self.verify().await;
        let downloads = self.download().await;
        let mut report = RunReport {
            downloaded: downloads.succeeded,
            failed_downloads: downloads.failed,
            ..Default::default()
        };
        if !report.failed_downloads.is_empty() {
            log::warn!(
                "Install phase not started, failed downloads: {:?}",
                report.failed_downloads
            );
            return Ok(report);
        }

        let installs = self.install().await;
        report.installed = installs.succeeded;
        report.failed_installs = installs.failed;
        Ok(report)
    }
}
