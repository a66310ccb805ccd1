//! The per-component state machine.
//!
//! ```text
//! Unconfigured -> Detecting -> Skip ----------------------------------------------> Done
//!                           \-> NeedsInstall -> AwaitingDownload -> Downloading -> Downloaded
//!                               -> AwaitingInstall -> Installing -> Installed -> SettingUp -> Done
//! ```
//!
//! Any step after detection may end in `Failed`. The state is published on a watch channel;
//! the next unit of the install chain waits on it instead of polling.

use crate::catalog::{ArtifactFile, Credentials, Requirement};
use crate::config::InstallerConfig;
use crate::error::InstallError;
use crate::installer::core::downloader::{BatchReport, DownloadObserver, DownloadTask, Downloader};
use crate::installer::core::events::{CompletionEvent, EventBus, Target};
use crate::installer::core::traits::{InstallContext, Recipe};
use crate::installer::registry::UnitRegistry;
use crate::installer::types::{
    OptionDetail, OsType, ProgressReporter, SelectedOption, UnitState, OPTION_DETECTED,
    OPTION_INSTALL,
};
use crate::utils::hash::verify_file;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

struct UnitInner {
    options: BTreeMap<String, OptionDetail>,
    selected: SelectedOption,
    /// The current selection was made by a valid detection, not by the caller
    selected_by_detection: bool,
    references: u32,
    downloaded: bool,
    installed: bool,
    /// Local artifact copies whose checksum was confirmed this run
    verified: HashSet<PathBuf>,
    credentials: Option<Credentials>,
}

pub struct InstallableUnit {
    requirement: Arc<Requirement>,
    recipe: Box<dyn Recipe>,
    target_dir: PathBuf,
    download_dir: PathBuf,
    bundle_dir: PathBuf,
    os: OsType,
    downloader: Downloader,
    events: EventBus,
    inner: Mutex<UnitInner>,
    state: watch::Sender<UnitState>,
    install_after: Mutex<Option<Arc<InstallableUnit>>>,
}

impl std::fmt::Debug for InstallableUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallableUnit")
            .field("id", &self.requirement.id)
            .field("state", &self.state())
            .field("selected", &self.selected_option())
            .finish()
    }
}

impl InstallableUnit {
    pub fn new(
        requirement: Arc<Requirement>,
        recipe: Box<dyn Recipe>,
        config: &InstallerConfig,
        client: reqwest::Client,
        events: EventBus,
    ) -> Arc<Self> {
        let target_dir = config.install_root.join(requirement.target_folder());
        let selected = default_selection(&requirement);

        let mut options = BTreeMap::new();
        options.insert(
            OPTION_INSTALL.to_string(),
            OptionDetail {
                version: Some(requirement.version.clone()),
                location: Some(target_dir.clone()),
                valid: true,
                ..Default::default()
            },
        );

        let (state, _) = watch::channel(UnitState::Unconfigured);

        Arc::new(Self {
            recipe,
            target_dir,
            download_dir: config.download_dir.clone(),
            bundle_dir: config.bundle_dir.clone(),
            os: OsType::current(),
            downloader: Downloader::new(client, config.progress_interval())
                .with_idle_timeout(config.request_timeout()),
            events,
            inner: Mutex::new(UnitInner {
                options,
                selected,
                selected_by_detection: false,
                references: 0,
                downloaded: false,
                installed: false,
                verified: HashSet::new(),
                credentials: None,
            }),
            state,
            install_after: Mutex::new(None),
            requirement,
        })
    }

    fn inner(&self) -> MutexGuard<'_, UnitInner> {
        // A poisoned lock only means another holder panicked; the data is still consistent
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn id(&self) -> &str {
        &self.requirement.id
    }

    pub fn requirement(&self) -> &Arc<Requirement> {
        &self.requirement
    }

    pub fn target_dir(&self) -> &PathBuf {
        &self.target_dir
    }

    // ---------------------------------------------------------------------
    // State
    // ---------------------------------------------------------------------

    pub fn state(&self) -> UnitState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<UnitState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: UnitState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            log::debug!("[{}] {:?} -> {:?}", self.id(), previous, state);
        }
    }

    /// Settle the pre-download state from the current selection.
    fn settle_selection_state(&self) {
        if self.state() > UnitState::AwaitingDownload {
            return;
        }
        if self.will_install() {
            self.set_state(if self.is_downloaded() {
                UnitState::Downloaded
            } else {
                UnitState::AwaitingDownload
            });
        } else {
            self.set_state(UnitState::Skip);
        }
    }

    // ---------------------------------------------------------------------
    // Options and selection
    // ---------------------------------------------------------------------

    pub fn options(&self) -> BTreeMap<String, OptionDetail> {
        self.inner().options.clone()
    }

    pub fn option(&self, name: &str) -> Option<OptionDetail> {
        self.inner().options.get(name).cloned()
    }

    pub fn has_option(&self, name: &str) -> bool {
        self.inner().options.contains_key(name)
    }

    /// Register a product-specific option, e.g. a second detected installation.
    pub fn add_option(&self, name: &str, detail: OptionDetail) {
        self.inner().options.insert(name.to_string(), detail);
    }

    pub fn selected_option(&self) -> SelectedOption {
        self.inner().selected.clone()
    }

    /// Change the selection. `Detected` is always accepted: without a detected option it marks
    /// the unit as skipped. A variant must name an existing option.
    pub fn set_selected_option(&self, selected: SelectedOption) -> bool {
        {
            let mut inner = self.inner();
            if let SelectedOption::Variant(name) = &selected {
                if !inner.options.contains_key(name) {
                    log::warn!("[{}] cannot select unknown option '{}'", self.requirement.id, name);
                    return false;
                }
            }
            inner.selected = selected;
            inner.selected_by_detection = false;
        }
        self.settle_selection_state();
        true
    }

    pub fn will_install(&self) -> bool {
        self.inner().selected == SelectedOption::Install
    }

    /// Nothing to install and nothing usable detected.
    pub fn is_skipped(&self) -> bool {
        let inner = self.inner();
        inner.selected == SelectedOption::Detected && !inner.options.contains_key(OPTION_DETECTED)
    }

    /// Whether the run may proceed with this unit's current selection.
    pub fn is_configured(&self) -> bool {
        let inner = self.inner();
        match &inner.selected {
            SelectedOption::Install => true,
            SelectedOption::Detected => inner
                .options
                .get(OPTION_DETECTED)
                .map(|detail| detail.valid)
                .unwrap_or(true),
            SelectedOption::Variant(name) => inner
                .options
                .get(name)
                .map(|detail| detail.valid)
                .unwrap_or(false),
        }
    }

    /// A valid installation is already on the host.
    pub fn has_valid_detection(&self) -> bool {
        self.inner()
            .options
            .get(OPTION_DETECTED)
            .map(|detail| detail.valid)
            .unwrap_or(false)
    }

    pub fn references(&self) -> u32 {
        self.inner().references
    }

    pub fn add_reference(&self) -> u32 {
        let mut inner = self.inner();
        inner.references += 1;
        inner.references
    }

    pub fn remove_reference(&self) -> u32 {
        let mut inner = self.inner();
        inner.references = inner.references.saturating_sub(1);
        inner.references
    }

    pub fn set_credentials(&self, credentials: Credentials) {
        self.inner().credentials = Some(credentials);
    }

    pub fn is_downloaded(&self) -> bool {
        self.inner().downloaded
    }

    pub fn is_installed(&self) -> bool {
        self.inner().installed
    }

    /// Location of the component for this run.
    pub fn location(&self) -> Option<PathBuf> {
        let inner = self.inner();
        inner
            .options
            .get(inner.selected.as_str())
            .and_then(|detail| detail.location.clone())
    }

    // ---------------------------------------------------------------------
    // Detection
    // ---------------------------------------------------------------------

    /// Probe the host for an existing installation. A failing probe counts as "not installed".
    /// On success a `detected` option is added, validated against the recipe's version window,
    /// and selected when valid.
    pub async fn detect_existing_install(&self) -> Option<OptionDetail> {
        if !self.requirement.detectable {
            self.settle_selection_state();
            return None;
        }

        self.set_state(UnitState::Detecting);
        let found = match self.recipe.detect(&self.requirement).await {
            Ok(found) => found,
            Err(e) => {
                log::debug!("[{}] detection failed, treating as not installed: {:#}", self.id(), e);
                None
            }
        };

        let detail = found.map(|detection| {
            let verdict = self
                .recipe
                .version_window(&self.requirement)
                .check(&detection.version);
            OptionDetail {
                version: Some(detection.version),
                location: Some(detection.location),
                valid: verdict.valid,
                error: verdict.error,
                warning: verdict.warning,
            }
        });

        {
            let mut inner = self.inner();
            match &detail {
                Some(detail) => {
                    log::info!(
                        "[{}] detected version {:?} at {:?} (valid={}, warning={:?}, error={:?})",
                        self.requirement.id,
                        detail.version,
                        detail.location,
                        detail.valid,
                        detail.warning,
                        detail.error
                    );
                    inner.options.insert(OPTION_DETECTED.to_string(), detail.clone());
                    if detail.valid {
                        inner.selected = SelectedOption::Detected;
                        inner.selected_by_detection = true;
                    }
                }
                None => {
                    log::info!("[{}] no existing installation found", self.requirement.id);
                    inner.options.remove(OPTION_DETECTED);
                }
            }

            // An earlier detection picked this selection and no longer backs it
            let still_usable = detail.as_ref().map_or(false, |d| d.valid);
            if inner.selected_by_detection && !still_usable {
                inner.selected = default_selection(&self.requirement);
                inner.selected_by_detection = false;
                log::info!(
                    "[{}] previous detection is gone, selection reset to '{}'",
                    self.requirement.id,
                    inner.selected
                );
            }
        }

        self.settle_selection_state();
        detail
    }

    // ---------------------------------------------------------------------
    // Files
    // ---------------------------------------------------------------------

    /// Path of the bundled copy if it exists, the download location otherwise.
    pub fn artifact_path(&self, artifact: &ArtifactFile) -> PathBuf {
        let bundled = self.bundle_dir.join(&artifact.file_name);
        if bundled.exists() {
            bundled
        } else {
            self.download_dir.join(&artifact.file_name)
        }
    }

    pub fn bundled_copy_exists(&self) -> bool {
        let artifacts = self.requirement.artifacts();
        !artifacts.is_empty()
            && artifacts
                .iter()
                .all(|a| self.bundle_dir.join(&a.file_name).exists())
    }

    /// Verify already present artifacts. A missing file or a checksum mismatch leaves the unit
    /// not downloaded for this run.
    pub async fn check_files(&self) -> bool {
        let mut all_present = true;
        let mut verified = HashSet::new();

        for artifact in self.requirement.artifacts() {
            let path = self.artifact_path(&artifact);
            let ok = match &artifact.sha256sum {
                Some(expected) => verify_file(&path, expected).await,
                None => path.exists(),
            };
            if ok {
                verified.insert(path);
            } else {
                all_present = false;
            }
        }

        {
            let mut inner = self.inner();
            inner.verified = verified;
            inner.downloaded = all_present;
        }
        log::info!("[{}] file check: downloaded={}", self.id(), all_present);
        self.settle_selection_state();
        self.events
            .publish(CompletionEvent::CheckComplete(Target::unit(self.id())));
        all_present
    }

    /// Artifacts still to fetch, in declared order.
    pub fn pending_downloads(&self) -> Vec<DownloadTask> {
        let inner = self.inner();
        self.requirement
            .artifacts()
            .into_iter()
            .filter(|a| !self.bundle_dir.join(&a.file_name).exists())
            .filter_map(|a| {
                let destination = self.download_dir.join(&a.file_name);
                if inner.verified.contains(&destination) {
                    return None;
                }
                let url = a.effective_url()?.to_string();
                let mut task = DownloadTask::new(url, destination).with_size(a.size);
                if let Some(sha) = &a.sha256sum {
                    task = task.with_sha256(sha.clone());
                }
                if self.requirement.auth_required {
                    if let Some(creds) = &inner.credentials {
                        task = task.with_credentials(creds.clone());
                    }
                }
                Some(task)
            })
            .collect()
    }

    /// Fetch the component's artifacts. Succeeds without work when the unit is skipped,
    /// not selected for install, or shipped with the installer.
    pub async fn download_installer(
        &self,
        reporter: Arc<dyn ProgressReporter>,
        observer: &dyn DownloadObserver,
    ) -> BatchReport {
        if self.is_skipped() || !self.will_install() || self.is_downloaded() {
            return BatchReport::default();
        }

        let tasks = self.pending_downloads();
        if tasks.is_empty() {
            log::debug!("[{}] nothing to download", self.id());
            self.mark_downloaded();
            return BatchReport::default();
        }

        self.set_state(UnitState::Downloading);
        let report = self.downloader.download(tasks, reporter, observer).await;
        self.record_download(&report);
        report
    }

    /// Re-issue only the downloads that failed in earlier batches.
    pub async fn restart_download(
        &self,
        reporter: Arc<dyn ProgressReporter>,
        observer: &dyn DownloadObserver,
    ) -> BatchReport {
        self.set_state(UnitState::Downloading);
        let report = self.downloader.restart_download(reporter, observer).await;
        self.record_download(&report);
        report
    }

    pub fn has_failed_downloads(&self) -> bool {
        self.downloader.has_failures()
    }

    pub fn failed_downloads(&self) -> Vec<DownloadTask> {
        self.downloader.failed_tasks()
    }

    fn record_download(&self, report: &BatchReport) {
        {
            let mut inner = self.inner();
            inner.verified.extend(report.succeeded.iter().cloned());
        }
        if self.downloader.has_failures() {
            self.set_state(UnitState::AwaitingDownload);
        } else {
            self.mark_downloaded();
        }
    }

    fn mark_downloaded(&self) {
        self.inner().downloaded = true;
        self.set_state(UnitState::Downloaded);
        self.events
            .publish(CompletionEvent::DownloadingComplete(Target::unit(self.id())));
    }

    // ---------------------------------------------------------------------
    // Install chain
    // ---------------------------------------------------------------------

    /// Make `next` install after this unit.
    pub fn then_install(self: &Arc<Self>, next: &Arc<InstallableUnit>) {
        *next
            .install_after
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(self.clone());
    }

    pub fn clear_install_after(&self) {
        *self
            .install_after
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }

    /// Immediate chain predecessor, inert or not.
    pub fn install_after(&self) -> Option<Arc<InstallableUnit>> {
        self.install_after
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Nearest predecessor that actually installs something. Units that are skipped or use a
    /// detected installation are passed through.
    pub fn get_install_after(&self) -> Option<Arc<InstallableUnit>> {
        let mut current = self.install_after();
        while let Some(unit) = current {
            if unit.will_install() {
                return Some(unit);
            }
            current = unit.install_after();
        }
        None
    }

    /// Wait for the chain predecessor, run the recipe's installer, then `setup`.
    pub async fn install(
        &self,
        reporter: Arc<dyn ProgressReporter>,
        peers: &UnitRegistry,
    ) -> Result<(), InstallError> {
        if self.is_skipped() {
            self.set_state(UnitState::Done);
            self.publish_installed();
            return Ok(());
        }
        if !self.is_configured() {
            self.set_state(UnitState::Failed);
            return Err(InstallError::NotConfigured(self.id().to_string()));
        }

        self.set_state(UnitState::AwaitingInstall);
        if let Some(gate) = self.get_install_after() {
            log::debug!("[{}] waiting for '{}'", self.id(), gate.id());
            if !wait_for_release(&gate).await {
                self.set_state(UnitState::Failed);
                let err = InstallError::PredecessorFailed {
                    unit: self.id().to_string(),
                    predecessor: gate.id().to_string(),
                };
                reporter.set_failed(&err.to_string());
                return Err(err);
            }
        }

        if self.will_install() {
            if !self.is_downloaded() {
                self.set_state(UnitState::Failed);
                return Err(InstallError::NotDownloaded(self.id().to_string()));
            }

            self.set_state(UnitState::Installing);
            reporter.set_status(&format!("Installing {}", self.requirement.display_name));
            log::info!("[{}] installing into {:?}", self.id(), self.target_dir);

            let ctx = self.context(peers);
            if let Err(reason) = self
                .recipe
                .install_after_requirements(&ctx, reporter.clone())
                .await
            {
                self.set_state(UnitState::Failed);
                let err = InstallError::Recipe {
                    unit: self.id().to_string(),
                    reason,
                };
                log::error!("{}", err);
                reporter.set_failed(&err.to_string());
                return Err(err);
            }
            self.inner().installed = true;
        }

        self.set_state(UnitState::Installed);
        self.setup(reporter, peers).await
    }

    /// Product-specific post-install configuration.
    pub async fn setup(
        &self,
        reporter: Arc<dyn ProgressReporter>,
        peers: &UnitRegistry,
    ) -> Result<(), InstallError> {
        self.set_state(UnitState::SettingUp);
        let ctx = self.context(peers);
        if let Err(reason) = self.recipe.setup(&ctx, reporter.clone()).await {
            self.set_state(UnitState::Failed);
            let err = InstallError::Setup {
                unit: self.id().to_string(),
                reason,
            };
            log::error!("{}", err);
            reporter.set_failed(&err.to_string());
            return Err(err);
        }

        self.set_state(UnitState::Done);
        reporter.set_complete();
        log::info!("[{}] done", self.id());
        self.publish_installed();
        Ok(())
    }

    fn publish_installed(&self) {
        self.events
            .publish(CompletionEvent::InstallComplete(Target::unit(self.id())));
    }

    fn context<'a>(&'a self, peers: &'a UnitRegistry) -> InstallContext<'a> {
        let (selected, detected) = {
            let inner = self.inner();
            let detected = match &inner.selected {
                SelectedOption::Variant(name) => inner.options.get(name).cloned(),
                _ => inner.options.get(OPTION_DETECTED).cloned(),
            };
            (inner.selected.clone(), detected)
        };
        InstallContext {
            requirement: &self.requirement,
            target_dir: self.target_dir.clone(),
            artifacts: self
                .requirement
                .artifacts()
                .iter()
                .map(|a| self.artifact_path(a))
                .collect(),
            selected,
            detected,
            peers,
            os: self.os,
        }
    }
}

fn default_selection(requirement: &Requirement) -> SelectedOption {
    requirement
        .default_option
        .as_deref()
        .map(SelectedOption::parse)
        .unwrap_or(SelectedOption::Install)
}

/// Resolves `true` once `gate` has installed, `false` if it failed.
async fn wait_for_release(gate: &InstallableUnit) -> bool {
    let mut rx = gate.subscribe();
    let released = rx
        .wait_for(|state| state.releases_successor() || *state == UnitState::Failed)
        .await
        .map(|state| *state != UnitState::Failed)
        .unwrap_or(false);
    released
}
